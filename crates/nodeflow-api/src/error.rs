//! Error types for the open-API client

use nodeflow_core::{ConfigError, ExecutorError};

/// Open-API failures
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Client settings are invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A request url could not be built
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// A header value is not valid
    #[error("invalid header {name}")]
    Header {
        /// Header name
        name: &'static str,
    },

    /// Connection, timeout or body read failed
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// HTTP error status with an error body
    #[error("{}", remote_message(.message, .log_id.as_deref()))]
    Status {
        /// HTTP status code
        status: u16,
        /// Message from the error body
        message: String,
        /// Correlation id from the error body
        log_id: Option<String>,
    },

    /// Envelope with a non-zero code
    #[error("{}", remote_message(.message, .log_id.as_deref()))]
    Remote {
        /// Envelope code
        code: i64,
        /// Envelope message
        message: String,
        /// Correlation id
        log_id: Option<String>,
    },

    /// Body did not decode
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Successful envelope without data
    #[error("response carried no data")]
    MissingData,
}

fn remote_message(message: &str, log_id: Option<&str>) -> String {
    ExecutorError::remote(message, log_id.map(str::to_string)).to_string()
}

impl ApiError {
    /// Whether the remote side answered with an error
    #[inline]
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Status { .. } | Self::Remote { .. })
    }

    /// Whether the request never got a usable answer
    #[inline]
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Correlation id, when the remote side sent one
    #[must_use]
    pub fn log_id(&self) -> Option<&str> {
        match self {
            Self::Status { log_id, .. } | Self::Remote { log_id, .. } => log_id.as_deref(),
            _ => None,
        }
    }
}

impl From<ApiError> for ExecutorError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Status {
                message, log_id, ..
            }
            | ApiError::Remote {
                message, log_id, ..
            } => ExecutorError::Remote { message, log_id },
            other => ExecutorError::Other(other.to_string()),
        }
    }
}
