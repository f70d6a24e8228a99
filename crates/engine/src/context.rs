//! Per-call recovery context and result

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::duration_millis;
use crate::error::{OperationError, RecoveryFailure, Severity};

/// Final classification of one orchestrated call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// The unit of work succeeded
    Success,
    /// Still retrying; never returned to callers
    RetryPending,
    /// Rejected by the circuit breaker before any attempt
    CircuitOpen,
    /// Rejected by the component's rate limit before any attempt
    RateLimited,
    /// Retries exhausted, the fallback produced the value
    FallbackUsed,
    /// Retries exhausted, escalation handlers were notified
    Escalated,
    /// Retries exhausted under the `Abort` policy
    Aborted,
    /// Retries exhausted (or cancelled) with nothing else to try
    Failed,
}

impl RecoveryOutcome {
    /// Whether the caller got a value back
    pub fn has_value(self) -> bool {
        matches!(self, Self::Success | Self::FallbackUsed)
    }

    /// Whether the call was turned away without running the work
    pub fn is_rejection(self) -> bool {
        matches!(self, Self::CircuitOpen | Self::RateLimited)
    }
}

impl fmt::Display for RecoveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::RetryPending => "retry_pending",
            Self::CircuitOpen => "circuit_open",
            Self::RateLimited => "rate_limited",
            Self::FallbackUsed => "fallback_used",
            Self::Escalated => "escalated",
            Self::Aborted => "aborted",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Where a recorded error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    /// An attempt of the unit of work
    Attempt,
    /// The fallback
    Fallback,
    /// The caller cancelled the call
    Cancellation,
}

/// An error captured during a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedError {
    /// Attempt number the error belongs to (0 if no attempt had started)
    pub attempt: u32,
    pub source: ErrorSource,
    pub error: OperationError,
    pub at: DateTime<Utc>,
}

/// Everything that happened during one `execute_with_recovery` call
///
/// Built by the orchestrator and handed to the caller (and to escalation
/// handlers) once the outcome is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryContext {
    pub call_id: Uuid,
    pub component: String,
    pub operation: String,
    /// Attempts of the unit of work actually made
    pub attempts: u32,
    pub errors: Vec<RecordedError>,
    /// Sum of backoff delays scheduled between attempts
    #[serde(with = "duration_millis")]
    pub total_delay: Duration,
    pub outcome: RecoveryOutcome,
    pub fallback_used: bool,
    pub escalated: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RecoveryContext {
    pub(crate) fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            call_id: Uuid::now_v7(),
            component: component.into(),
            operation: operation.into(),
            attempts: 0,
            errors: Vec::new(),
            total_delay: Duration::ZERO,
            outcome: RecoveryOutcome::RetryPending,
            fallback_used: false,
            escalated: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn record_error(&mut self, source: ErrorSource, error: OperationError) {
        self.errors.push(RecordedError {
            attempt: self.attempts,
            source,
            error,
            at: Utc::now(),
        });
    }

    pub(crate) fn finish(&mut self, outcome: RecoveryOutcome) {
        self.outcome = outcome;
        self.finished_at = Some(Utc::now());
    }

    /// The most recent error raised by the unit of work itself
    ///
    /// Fallback errors never mask the attempt chain; if no attempt failed
    /// (e.g. cancelled before the first one), the latest error of any source
    /// is returned.
    pub fn last_error(&self) -> Option<&OperationError> {
        self.errors
            .iter()
            .rev()
            .find(|e| e.source == ErrorSource::Attempt)
            .or_else(|| self.errors.last())
            .map(|e| &e.error)
    }

    /// Highest severity among recorded errors
    pub fn severity(&self) -> Option<Severity> {
        self.errors.iter().map(|e| e.error.severity()).max()
    }

    pub fn was_cancelled(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.source == ErrorSource::Cancellation)
    }

    /// Wall-clock time spent in the call, once finished
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}

/// Value (if any) plus the context of the call that produced it
#[derive(Debug, Clone)]
pub struct RecoveryResult<T> {
    pub value: Option<T>,
    pub context: RecoveryContext,
}

impl<T> RecoveryResult<T> {
    pub fn outcome(&self) -> RecoveryOutcome {
        self.context.outcome
    }

    pub fn is_success(&self) -> bool {
        self.context.outcome == RecoveryOutcome::Success
    }

    /// Translate a non-value outcome into an error for `?`-style callers
    pub fn into_result(self) -> Result<T, RecoveryFailure> {
        if let Some(value) = self.value {
            return Ok(value);
        }

        let context = self.context;
        Err(match context.outcome {
            RecoveryOutcome::CircuitOpen => RecoveryFailure::CircuitOpen {
                component: context.component,
            },
            RecoveryOutcome::RateLimited => RecoveryFailure::RateLimited {
                component: context.component,
            },
            outcome => {
                let last_error = context
                    .last_error()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "unknown error".to_string());
                RecoveryFailure::Exhausted {
                    component: context.component,
                    operation: context.operation,
                    attempts: context.attempts,
                    outcome,
                    last_error,
                }
            }
        })
    }
}
