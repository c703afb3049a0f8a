//! Error taxonomy shared by the registry caches, the fetcher, the index
//! store, and the tool surface.
//!
//! Every per-request failure is a [`HarvestError`]. Callers that need a
//! wire-level classification use [`HarvestError::code`], which collapses the
//! taxonomy into the three codes exposed to agents.

use std::fmt;
use std::path::Path;

use thiserror::Error;

/// Failure raised while resolving, fetching, or persisting a component.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Malformed or missing request field. The caller's fault; never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The name resolves to nothing in any cache, override, or the index.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport failure talking to a registry.
    #[error("network error: {0}")]
    Network(String),

    /// A registry answered with something that is not the expected shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// The durable store could not be read or written.
    #[error("storage error: {context}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl HarvestError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn storage(action: &str, path: &Path, source: std::io::Error) -> Self {
        Self::Storage {
            context: format!("failed to {} {}", action, path.display()),
            source,
        }
    }

    /// Wire-level classification of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidInput(_) => ErrorCode::InvalidArguments,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Network(_) | Self::Parse(_) | Self::Storage { .. } => ErrorCode::Internal,
        }
    }
}

impl From<reqwest::Error> for HarvestError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Error codes surfaced to tool callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidArguments,
    NotFound,
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArguments => "invalid_arguments",
            Self::NotFound => "not_found",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies an application-level error.
///
/// Errors that carry a [`HarvestError`] anywhere in their chain keep its
/// code; everything else is `internal`.
pub fn classify(err: &anyhow::Error) -> ErrorCode {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<HarvestError>())
        .map(HarvestError::code)
        .unwrap_or(ErrorCode::Internal)
}
