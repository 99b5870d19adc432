//! Error types for submatch.
//!
//! All errors are strongly typed using thiserror. Each layer owns a small
//! enum and `MatchError` is the single type surfaced by the matcher, so
//! callers can pattern match on the failure class without string inspection.

use std::fmt;

use thiserror::Error;

use crate::storage::StorageError;

/// A modification event that cannot be scoped to a single resource.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("Modification event has no resource type")]
    MissingResourceType,

    #[error("Modification event has no resource id")]
    MissingResourceId,

    #[error("Invalid resource type '{value}'")]
    InvalidResourceType {
        value: String,
    },

    #[error("Invalid resource id '{value}'")]
    InvalidResourceId {
        value: String,
    },
}

/// Criteria that cannot be compiled into a structured query.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CriteriaError {
    #[error("Criteria string is empty")]
    Empty,

    #[error("Malformed criteria clause '{clause}': {reason}")]
    Malformed {
        clause: String,
        reason: String,
    },

    #[error("Unknown resource type '{resource_type}'")]
    UnknownResourceType {
        resource_type: String,
    },

    #[error("Unknown search parameter '{parameter}' for resource type {resource_type}")]
    UnknownParameter {
        resource_type: String,
        parameter: String,
    },

    #[error("Search parameter '{parameter}' is not supported in subscription criteria")]
    UnsupportedParameter {
        parameter: String,
    },

    #[error("Modifier ':{modifier}' is not supported on search parameter '{parameter}'")]
    UnsupportedModifier {
        parameter: String,
        modifier: String,
    },

    #[error("Invalid value '{value}' for search parameter '{parameter}': {reason}")]
    InvalidValue {
        parameter: String,
        value: String,
        reason: String,
    },
}

impl CriteriaError {
    pub(crate) fn malformed(clause: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            clause: clause.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_value(
        parameter: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            parameter: parameter.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Invalid matcher configuration.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to parse matcher configuration: {message}")]
    Parse {
        message: String,
    },

    #[error("Invalid matcher configuration: {reason}")]
    Invalid {
        reason: String,
    },
}

/// The point in a match call at which cancellation was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchStage {
    /// Waiting out the configured pre-match delay.
    Delay,
    /// Opening the unit of work or running the search.
    Query,
}

impl fmt::Display for MatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delay => write!(f, "pre-match delay"),
            Self::Query => write!(f, "query execution"),
        }
    }
}

/// Top-level error returned by the subscription matcher.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Invalid modification event: {0}")]
    InvalidEvent(#[from] EventError),

    #[error("Criteria validation failed: {0}")]
    CriteriaValidation(#[from] CriteriaError),

    #[error("Query execution failed: {0}")]
    QueryExecution(#[from] StorageError),

    #[error("Match cancelled during {stage}")]
    Cancelled {
        stage: MatchStage,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl MatchError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a cancellation error for the given stage.
    #[must_use]
    pub const fn cancelled(stage: MatchStage) -> Self {
        Self::Cancelled { stage }
    }

    /// Returns true if the event could not be scoped to a resource.
    #[must_use]
    pub const fn is_invalid_event(&self) -> bool {
        matches!(self, Self::InvalidEvent(_))
    }

    /// Returns true if the subscription criteria were rejected.
    #[must_use]
    pub const fn is_criteria_validation(&self) -> bool {
        matches!(self, Self::CriteriaValidation(_))
    }

    /// Returns true if the store failed while executing the query.
    #[must_use]
    pub const fn is_query_execution(&self) -> bool {
        matches!(self, Self::QueryExecution(_))
    }

    /// Returns true if the call was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns true if retrying the same call may succeed.
    ///
    /// The matcher never retries on its own; this only classifies.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::QueryExecution(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias for submatch operations.
pub type SubmatchResult<T> = Result<T, MatchError>;
