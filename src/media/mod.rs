pub mod probe;
pub mod process;
pub mod workspace;

pub use probe::{wav_duration, MediaProbe};
pub use process::TranscodeRunner;
pub use workspace::Workspace;
