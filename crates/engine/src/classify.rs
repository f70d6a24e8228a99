//! Retryable-error classification
//!
//! The default predicate treats a small fixed set of transient-looking
//! conditions as retryable. A denylist of permanent conditions always wins
//! when both match.

use std::sync::Arc;

use crate::error::{ErrorKind, OperationError};

/// Predicate deciding whether an error is worth another attempt
pub type RetryablePredicate = Arc<dyn Fn(&OperationError) -> bool + Send + Sync>;

/// Message fragments that mark an error as transient
const TRANSIENT_PATTERNS: &[&str] = &[
    "429",
    "502",
    "503",
    "504",
    "too many requests",
    "rate limit",
    "temporarily",
    "service unavailable",
    "connection reset",
    "connection refused",
    "reset by peer",
    "timed out",
    "timeout",
    "network",
];

/// Message fragments that mark an error as permanent
const PERMANENT_PATTERNS: &[&str] = &[
    "invalid",
    "validation",
    "unauthorized",
    "forbidden",
    "permission denied",
    "authentication",
];

/// Default classification used when a component does not supply its own
pub fn is_transient(error: &OperationError) -> bool {
    match error.kind {
        ErrorKind::Validation | ErrorKind::Type | ErrorKind::Auth | ErrorKind::Cancelled => {
            return false
        }
        _ => {}
    }

    let message = error.message.to_lowercase();
    let code = error.code.as_deref().unwrap_or("").to_lowercase();
    let matches = |patterns: &[&'static str]| {
        patterns
            .iter()
            .any(|p| message.contains(*p) || code.contains(*p))
    };

    if matches(PERMANENT_PATTERNS) {
        return false;
    }

    match error.kind {
        ErrorKind::Connection
        | ErrorKind::Timeout
        | ErrorKind::RateLimited
        | ErrorKind::Unavailable => true,
        _ => matches(TRANSIENT_PATTERNS),
    }
}

/// The default predicate as a shareable closure
pub fn default_predicate() -> RetryablePredicate {
    Arc::new(is_transient)
}

/// Predicate that retries every error except cancellation
pub fn retry_all() -> RetryablePredicate {
    Arc::new(|e: &OperationError| e.kind != ErrorKind::Cancelled)
}

/// Predicate that never retries
pub fn retry_none() -> RetryablePredicate {
    Arc::new(|_: &OperationError| false)
}

/// Errors caused by the caller's own input rather than the dependency
pub fn is_caller_error(error: &OperationError) -> bool {
    matches!(error.kind, ErrorKind::Validation | ErrorKind::Type)
}

/// [`is_caller_error`] as a shareable closure, e.g. for breaker exclusion
pub fn caller_errors() -> RetryablePredicate {
    Arc::new(is_caller_error)
}
