//! Error types for NodeFlow Core
//!
//! Provides error handling for:
//! - Per-unit executor failures (remote, transport, cancellation)
//! - Orchestration failures of the batch controller
//! - Selection problems (mixed templates, missing workflow)
//! - Field value conversion
//! - Configuration and host collaborators

use crate::types::{FailureCause, UnitId};

/// Message recorded for units whose handle was aborted before dispatch
pub const ABORTED_BEFORE_EXECUTION: &str = "aborted before execution";

/// Failure raised by a unit executor
///
/// Always captured into the unit's result; never aborts the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// Remote service reported an error
    #[error("{}", format_remote(.message, .log_id.as_deref()))]
    Remote {
        /// Human-readable message
        message: String,
        /// Correlation id for the remote logs
        log_id: Option<String>,
    },

    /// The unit's token fired while the request was in flight
    #[error("aborted during execution: {0}")]
    Cancelled(String),

    /// Any other error, message passed through
    #[error("{0}")]
    Other(String),
}

impl ExecutorError {
    /// Create remote error
    #[inline]
    pub fn remote(message: impl Into<String>, log_id: Option<String>) -> Self {
        Self::Remote {
            message: message.into(),
            log_id,
        }
    }

    /// Create pass-through error
    #[inline]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Failure classification for the unit result
    #[inline]
    #[must_use]
    pub fn cause(&self) -> FailureCause {
        match self {
            Self::Remote { .. } => FailureCause::Remote,
            Self::Cancelled(_) => FailureCause::Cancelled,
            Self::Other(_) => FailureCause::Other,
        }
    }

    /// Correlation id, if the transport exposed one
    #[inline]
    #[must_use]
    pub fn log_id(&self) -> Option<&str> {
        match self {
            Self::Remote { log_id, .. } => log_id.as_deref(),
            _ => None,
        }
    }
}

fn format_remote(message: &str, log_id: Option<&str>) -> String {
    match log_id {
        Some(id) => format!("{message}; logID: {id}"),
        None => message.to_string(),
    }
}

/// Orchestration failures of the batch controller
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    /// No cancellation handle registered for a dispatched unit
    #[error("no cancellation handle for unit {0}")]
    MissingHandle(UnitId),

    /// Orchestration task panicked or was torn down
    #[error("orchestration failed: {0}")]
    Orchestration(String),
}

/// Selection problems detected before submission
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    /// Selected items use more than one workflow template
    #[error("selection spans {count} workflow templates")]
    MixedTemplates {
        /// Distinct template count
        count: usize,
    },

    /// Selected items have no node flow
    #[error("selected work items have no node flow")]
    NoWorkflow,

    /// Nothing selected
    #[error("no work items selected")]
    Empty,
}

/// Field value conversion failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldValueError {
    /// Unknown field key
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// Value shape does not fit the field type
    #[error("field {field} expects {expected}")]
    InvalidShape {
        /// Field key
        field: String,
        /// Expected shape
        expected: &'static str,
    },

    /// Required field left empty
    #[error("field {0} is required")]
    Required(String),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading the file failed
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML did not parse
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid config value for {key}: {reason}")]
    Invalid {
        /// Offending key
        key: &'static str,
        /// Why it is invalid
        reason: String,
    },
}

/// Host collaborator failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// Client version does not support the capability
    #[error("not supported by this client{}", format_min_version(.min_version.as_deref()))]
    NotSupported {
        /// Minimum client version, when known
        min_version: Option<String>,
    },

    /// Host never became ready
    #[error("host not ready after {attempts} attempts")]
    NotReady {
        /// Polls performed
        attempts: u32,
    },

    /// Any other host failure
    #[error("internal error: {0}")]
    Internal(String),
}

fn format_min_version(min_version: Option<&str>) -> String {
    min_version
        .map(|v| format!(", requires {v} or later"))
        .unwrap_or_default()
}

impl HostError {
    /// Check if retrying could help
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotReady { .. } | Self::Internal(_))
    }
}
