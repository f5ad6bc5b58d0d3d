use std::time::Duration;

use thiserror::Error;

/// Category of an upstream HTTP failure, derived from the status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    Unauthorized,
    RateLimited,
    InvalidRequest,
    Server,
    Other,
}

impl ApiErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ApiErrorKind::Unauthorized,
            429 => ApiErrorKind::RateLimited,
            400 | 404 | 413 | 422 => ApiErrorKind::InvalidRequest,
            500..=599 => ApiErrorKind::Server,
            _ => ApiErrorKind::Other,
        }
    }

    /// Caller-facing message for this category.
    pub fn user_message(&self, service: &str) -> String {
        match self {
            ApiErrorKind::Unauthorized => {
                format!("Invalid {service} API key. Check your configuration.")
            }
            ApiErrorKind::RateLimited => {
                format!("{service} API rate limit exceeded. Please try again later.")
            }
            ApiErrorKind::InvalidRequest => format!(
                "{service} rejected the request. The input might be too long or contain unsupported content."
            ),
            ApiErrorKind::Server => format!("{service} server error. Please try again later."),
            ApiErrorKind::Other => format!("{service} request failed."),
        }
    }
}

#[derive(Error, Debug)]
pub enum VoiceoverError {
    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Transcoding engine '{program}' could not be started: {source}")]
    EngineNotFound {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transcoding failed (exit code {code}): {stderr}")]
    TranscodeFailed { code: i32, stderr: String },

    #[error("Transcoding timed out after {0:?}")]
    TranscodeTimeout(Duration),

    #[error("Merge failed: {0}")]
    Merge(String),

    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("{service} API error ({status}): {message}")]
    Api {
        service: &'static str,
        status: u16,
        kind: ApiErrorKind,
        message: String,
    },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VoiceoverError {
    /// The engine binary could not be located or spawned at all.
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, VoiceoverError::EngineNotFound { .. })
    }

    /// The engine ran but did not finish successfully.
    pub fn is_exit_failure(&self) -> bool {
        matches!(
            self,
            VoiceoverError::TranscodeFailed { .. } | VoiceoverError::TranscodeTimeout(_)
        )
    }

    /// Diagnostic text captured from the engine, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            VoiceoverError::TranscodeFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, VoiceoverError>;
