//! Error types for validation, limiting and the invocation surface.
use std::time::Duration;

/// Boxed error used where the concrete store or service error type is erased.
pub type BoxError = tower::BoxError;

/// Message returned when a request is refused by the limiter.
pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please try again later.";

/// Caller-facing error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request payload did not carry a usable client identifier.
    InvalidArgument,
    /// The client has used up its allowance for the current window.
    ResourceExhausted,
    /// Infrastructure failure (storage, contention, inner service).
    Internal,
}

impl ErrorKind {
    /// Wire status string used by callable transports.
    pub fn status(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.status())
    }
}

/// Failures of the limiter itself. Rejections are not errors; see [`crate::rate_limit::Decision`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LimitError {
    /// The document store failed on read or write. Never retried.
    #[error("document store failure: {0}")]
    Store(#[source] BoxError),
    /// Every compare-and-set attempt lost to a concurrent writer.
    #[error("gave up after {attempts} conflicting writes")]
    Contention {
        /// Number of attempts made.
        attempts: u32,
    },
}

impl LimitError {
    pub(crate) fn store<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        LimitError::Store(err.into())
    }
}

/// Structured failure of a `rateLimitedAction` invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ActionError {
    #[error("{message}")]
    InvalidArgument {
        /// human-friendly description of the invalid input
        message: String,
    },
    #[error("{message}")]
    ResourceExhausted {
        /// human-friendly "try again later" text
        message: String,
        /// Earliest point at which one more action would fit.
        retry_after: Duration,
    },
    #[error("{message}")]
    Internal {
        /// underlying failure, surfaced as-is
        message: String,
    },
}

impl ActionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            ActionError::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            ActionError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ActionError::InvalidArgument { message }
            | ActionError::ResourceExhausted { message, .. }
            | ActionError::Internal { message } => message,
        }
    }

    pub fn rate_limited(retry_after: Duration) -> Self {
        ActionError::ResourceExhausted { message: RATE_LIMIT_MESSAGE.to_string(), retry_after }
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        ActionError::Internal { message: err.to_string() }
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, ActionError::InvalidArgument { .. })
    }

    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, ActionError::ResourceExhausted { .. })
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, ActionError::Internal { .. })
    }
}

impl From<crate::validate::ValidationError> for ActionError {
    fn from(err: crate::validate::ValidationError) -> Self {
        ActionError::InvalidArgument { message: err.to_string() }
    }
}

impl From<LimitError> for ActionError {
    fn from(err: LimitError) -> Self {
        ActionError::internal(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[test]
    fn kinds_map_to_wire_status() {
        assert_eq!(ErrorKind::InvalidArgument.status(), "INVALID_ARGUMENT");
        assert_eq!(ErrorKind::ResourceExhausted.status(), "RESOURCE_EXHAUSTED");
        assert_eq!(ErrorKind::Internal.to_string(), "INTERNAL");
    }

    #[test]
    fn rate_limited_carries_standard_message() {
        let err = ActionError::rate_limited(Duration::from_millis(250));
        assert!(err.is_resource_exhausted());
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(err.message(), "Rate limit exceeded. Please try again later.");
        assert_eq!(err.to_string(), err.message());
    }

    #[test]
    fn store_failure_keeps_source_and_becomes_internal() {
        let err = LimitError::store(io::Error::new(io::ErrorKind::Other, "disk gone"));
        assert!(err.source().is_some());
        let action: ActionError = err.into();
        assert!(action.is_internal());
        assert!(action.message().contains("disk gone"));
    }

    #[test]
    fn contention_display() {
        let err = LimitError::Contention { attempts: 3 };
        assert_eq!(err.to_string(), "gave up after 3 conflicting writes");
        assert!(err.source().is_none());
    }
}
