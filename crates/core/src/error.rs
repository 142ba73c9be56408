//! Error taxonomy shared by every adapter.

use serde::{Deserialize, Serialize};

/// Coarse error class callers match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    /// Optimistic-concurrency mismatch on update.
    Conflict,
    OperationNotSupported,
    InvalidArgument,
    ConnectionFailed,
    AuthenticationFailed,
    Canceled,
    DeadlineExceeded,
    Internal,
}

/// Adapter errors. `Op` and `RetriesExhausted` are wrappers and report the kind of what they wrap.
#[derive(Debug, thiserror::Error)]
pub enum O2Error {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("operation not supported: {0}")]
    NotSupported(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("canceled: {0}")]
    Canceled(String),
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),
    #[error("backend status {status}: {message}")]
    Backend { status: u16, code: Option<String>, message: String },
    #[error("request failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, #[source] last: Box<O2Error> },
    #[error("internal: {0}")]
    Internal(String),
    #[error("{op} {entity}: {source}")]
    Op { op: &'static str, entity: String, #[source] source: Box<O2Error> },
}

pub type O2Result<T> = Result<T, O2Error>;

impl O2Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            O2Error::NotFound(_) => ErrorKind::NotFound,
            O2Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            O2Error::Conflict(_) => ErrorKind::Conflict,
            O2Error::NotSupported(_) => ErrorKind::OperationNotSupported,
            O2Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            O2Error::ConnectionFailed(_) => ErrorKind::ConnectionFailed,
            O2Error::AuthenticationFailed(_) => ErrorKind::AuthenticationFailed,
            O2Error::Canceled(_) => ErrorKind::Canceled,
            O2Error::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            O2Error::Backend { status, .. } => kind_for_status(*status),
            O2Error::RetriesExhausted { last, .. } => last.kind(),
            O2Error::Internal(_) => ErrorKind::Internal,
            O2Error::Op { source, .. } => source.kind(),
        }
    }

    pub fn is(&self, kind: ErrorKind) -> bool { self.kind() == kind }

    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            O2Error::Backend { status, .. } => *status == 429 || (500..600).contains(status),
            O2Error::ConnectionFailed(_) => true,
            _ => false,
        }
    }

    /// True when the failure originated from the caller's context rather than the backend.
    pub fn is_context(&self) -> bool {
        matches!(self.kind(), ErrorKind::Canceled | ErrorKind::DeadlineExceeded)
    }

    /// Wrap with the failing operation and entity identifier.
    pub fn context(self, op: &'static str, entity: impl Into<String>) -> Self {
        O2Error::Op { op, entity: entity.into(), source: Box::new(self) }
    }

    pub fn not_supported(backend: &str, op: &str) -> Self {
        O2Error::NotSupported(format!("{} does not support {}", backend, op))
    }
}

fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        400 | 422 => ErrorKind::InvalidArgument,
        401 | 403 => ErrorKind::AuthenticationFailed,
        404 => ErrorKind::NotFound,
        409 => ErrorKind::Conflict,
        429 | 500..=599 => ErrorKind::ConnectionFailed,
        _ => ErrorKind::Internal,
    }
}

impl From<serde_json::Error> for O2Error {
    fn from(e: serde_json::Error) -> Self { O2Error::Internal(format!("json: {}", e)) }
}

/// `.op("get_resource", id)` on any `O2Result`.
pub trait OpContext<T> {
    fn op(self, op: &'static str, entity: impl Into<String>) -> O2Result<T>;
}

impl<T> OpContext<T> for O2Result<T> {
    fn op(self, op: &'static str, entity: impl Into<String>) -> O2Result<T> {
        self.map_err(|e| e.context(op, entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrappers_delegate_kind() {
        let e = O2Error::NotFound("pool p1".into()).context("get_resource_pool", "p1");
        assert_eq!(e.kind(), ErrorKind::NotFound);
        assert_eq!(e.to_string(), "get_resource_pool p1: not found: pool p1");

        let last = O2Error::Backend { status: 503, code: None, message: "busy".into() };
        let e = O2Error::RetriesExhausted { attempts: 3, last: Box::new(last) };
        assert_eq!(e.kind(), ErrorKind::ConnectionFailed);
        assert!(e.to_string().contains("3 attempts"));
    }

    #[test]
    fn status_mapping() {
        let b = |status| O2Error::Backend { status, code: None, message: String::new() };
        assert!(b(404).is(ErrorKind::NotFound));
        assert!(b(409).is(ErrorKind::Conflict));
        assert!(b(401).is(ErrorKind::AuthenticationFailed));
        assert!(b(403).is(ErrorKind::AuthenticationFailed));
        assert!(b(422).is(ErrorKind::InvalidArgument));
        assert!(b(418).is(ErrorKind::Internal));
        assert!(b(429).is_retryable());
        assert!(b(502).is_retryable());
        assert!(!b(400).is_retryable());
        assert!(!b(200).is_retryable());
    }

    #[test]
    fn context_errors_are_distinct() {
        assert!(O2Error::Canceled("x".into()).is_context());
        assert!(O2Error::DeadlineExceeded("x".into()).context("health", "dtias").is_context());
        assert!(!O2Error::ConnectionFailed("x".into()).is_context());
    }
}
