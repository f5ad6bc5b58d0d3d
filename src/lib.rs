pub mod analyze;
pub mod config;
pub mod error;
pub mod interactive;
pub mod media;
pub mod merge;
pub mod pipeline;
pub mod store;
pub mod sync;
pub mod voice;

pub use config::Config;
pub use error::{Result, VoiceoverError};
pub use merge::{MergeRequest, Merger};
pub use pipeline::{
    narrate_video, print_summary, MergeOutcome, PipelineConfig, PipelineResult,
    PipelineServices, PipelineStats,
};
pub use sync::{build_chain, compute_ratio, FilterChain, TempoRatio};
