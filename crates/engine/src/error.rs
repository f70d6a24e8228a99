//! Error taxonomy for units of work and engine operations

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::RecoveryOutcome;

/// Coarse classification of what went wrong inside a unit of work
///
/// The kind drives the default retryable predicate and severity detection.
/// `Other` falls back to message inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection refused/reset/aborted
    Connection,
    /// Deadline exceeded
    Timeout,
    /// Explicit throttling signal (HTTP 429 and friends)
    RateLimited,
    /// Upstream temporarily unavailable (HTTP 502/503/504)
    Unavailable,
    /// Input rejected by the remote side or by local validation
    Validation,
    /// Payload had an unexpected shape
    Type,
    /// Authentication or authorization failure
    Auth,
    /// Caller-initiated cancellation
    Cancelled,
    /// Anything else
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::Unavailable => "unavailable",
            Self::Validation => "validation",
            Self::Type => "type",
            Self::Auth => "auth",
            Self::Cancelled => "cancelled",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Severity levels, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Whether this severity warrants notifying a human
    pub fn should_alert(self) -> bool {
        self >= Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Error returned by a unit of work
///
/// # Example
///
/// ```
/// use recovery_engine::{ErrorKind, OperationError};
///
/// let err = OperationError::new(ErrorKind::RateLimited, "HTTP 429 from upstream")
///     .with_code("429");
/// assert_eq!(err.kind, ErrorKind::RateLimited);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationError {
    /// Human-readable message
    pub message: String,

    /// Classification used by the default retry predicate
    pub kind: ErrorKind,

    /// Error type/code for programmatic handling (e.g. an HTTP status)
    pub code: Option<String>,

    /// Additional error details (for debugging)
    pub details: Option<serde_json::Value>,
}

impl OperationError {
    /// Create an error of the given kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            code: None,
            details: None,
        }
    }

    /// Create an unclassified error; the message decides retryability
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub(crate) fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled by caller")
    }

    /// Set the error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Add error details
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Severity derived from the error kind
    pub fn severity(&self) -> Severity {
        match self.kind {
            ErrorKind::Cancelled => Severity::Info,
            ErrorKind::Connection
            | ErrorKind::Timeout
            | ErrorKind::RateLimited
            | ErrorKind::Unavailable => Severity::Warning,
            ErrorKind::Auth => Severity::Critical,
            ErrorKind::Validation | ErrorKind::Type | ErrorKind::Other => Severity::Error,
        }
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for OperationError {}

impl From<anyhow::Error> for OperationError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            return Self::new(kind_of_io(io_err.kind()), format!("{:#}", err));
        }
        Self::other(format!("{:#}", err))
    }
}

impl From<io::Error> for OperationError {
    fn from(err: io::Error) -> Self {
        Self::new(kind_of_io(err.kind()), err.to_string())
    }
}

impl From<serde_json::Error> for OperationError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorKind::Type, err.to_string())
    }
}

fn kind_of_io(kind: io::ErrorKind) -> ErrorKind {
    match kind {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe => ErrorKind::Connection,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorKind::Timeout,
        io::ErrorKind::PermissionDenied => ErrorKind::Auth,
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => ErrorKind::Validation,
        _ => ErrorKind::Other,
    }
}

/// Errors from engine-level operations (never from `execute_with_recovery`)
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// No component registered under this name
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    /// Configuration rejected at registration
    #[error("invalid configuration for component {component}: {reason}")]
    InvalidConfig { component: String, reason: String },

    /// Failed to read a components file
    #[error("failed to read components file {path}: {source}")]
    ConfigFile {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to parse a components file
    #[error("failed to parse components file {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Escalation webhook could not be set up
    #[error("escalation webhook: {0}")]
    Webhook(#[from] crate::escalation::EscalationError),
}

/// Adapter-side translation of a non-successful recovery outcome
///
/// The engine itself never raises on exhaustion; adapters that prefer `?`
/// can opt in through [`crate::RecoveryResult::into_result`].
#[derive(Debug, Clone, Error)]
pub enum RecoveryFailure {
    #[error("{component} is temporarily disabled due to repeated errors")]
    CircuitOpen { component: String },

    #[error("{component} is rate limited, try again later")]
    RateLimited { component: String },

    #[error("{operation} on {component} failed after {attempts} attempt(s): {last_error}")]
    Exhausted {
        component: String,
        operation: String,
        attempts: u32,
        outcome: RecoveryOutcome,
        last_error: String,
    },
}
