use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, VoiceoverError};

/// Runs the external transcoding engine (FFmpeg) as a child process.
///
/// Arguments are handed to the OS as a discrete list, never through a shell.
#[derive(Debug, Clone)]
pub struct TranscodeRunner {
    program: PathBuf,
}

impl Default for TranscodeRunner {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl TranscodeRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn spawn_error(&self, source: std::io::Error) -> VoiceoverError {
        VoiceoverError::EngineNotFound {
            program: self.program.display().to_string(),
            source,
        }
    }

    /// Check that the engine can be launched at all.
    pub async fn check(&self) -> Result<()> {
        let output = Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(VoiceoverError::TranscodeFailed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        debug!("{} is available", self.program.display());
        Ok(())
    }

    /// Run the engine to completion.
    ///
    /// Stderr is drained while the process runs and returned in the error on a
    /// non-zero exit. With a `timeout`, the child is killed once it elapses.
    pub async fn run<I, S>(&self, args: I, timeout: Option<Duration>) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running {:?}", command.as_std());

        let mut child = command.spawn().map_err(|e| self.spawn_error(e))?;

        let stderr = tokio::spawn(drain(child.stderr.take()));

        let status = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!(
                        "{} exceeded {:?}, terminating",
                        self.program.display(),
                        limit
                    );
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill {}: {e}", self.program.display());
                    }
                    return Err(VoiceoverError::TranscodeTimeout(limit));
                }
            },
            None => child.wait().await,
        };
        let stderr_text = stderr.await.unwrap_or_default();

        let status = status?;
        if status.success() {
            return Ok(());
        }

        Err(VoiceoverError::TranscodeFailed {
            code: status.code().unwrap_or(-1),
            stderr: stderr_text,
        })
    }
}

/// Accumulate a diagnostic stream into one string as it arrives.
async fn drain<R>(stream: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(mut stream) = stream else {
        return String::new();
    };

    let mut collected = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => collected.extend_from_slice(&buf[..n]),
            Err(e) => {
                warn!("Stopped reading engine diagnostics: {e}");
                break;
            }
        }
    }

    String::from_utf8_lossy(&collected).into_owned()
}
