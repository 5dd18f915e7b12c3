//! Errors returned by share operations.

use std::fmt::Display;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`ShareError`].
pub type ShareResult<T> = Result<T, ShareError>;

/// Outcome classes reported to the caller of a share operation.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum ShareError {
    /// The host is not in a state where the operation can run.
    #[error("{message}")]
    #[diagnostic(
        code(volshare::share::failed_precondition),
        help("Fix the volume device on the host before retrying")
    )]
    FailedPrecondition {
        /// The error message.
        message: String,
    },

    /// The request does not match what is found on the host.
    #[error("{message}")]
    #[diagnostic(code(volshare::share::invalid_argument))]
    InvalidArgument {
        /// The error message.
        message: String,
    },

    /// A host operation failed.
    #[error("{message}")]
    #[diagnostic(code(volshare::share::internal))]
    Internal {
        /// The error message.
        message: String,
    },
}

impl ShareError {
    /// Wrap a host error with the operation that failed.
    pub fn internal(context: impl Display, source: impl Display) -> Self {
        Self::Internal {
            message: format!("{context}: {source}"),
        }
    }

    /// A precondition failure.
    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::FailedPrecondition {
            message: message.into(),
        }
    }

    /// An invalid argument.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_keeps_context() {
        let err = ShareError::internal("failed to mount volume pvc-1", "device not found");
        assert_eq!(
            err.to_string(),
            "failed to mount volume pvc-1: device not found"
        );
    }
}
