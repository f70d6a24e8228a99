//! # Unified Recovery Engine
//!
//! A single policy authority for calls into external integrations. For every
//! named *component* the engine decides whether an operation may run now,
//! how failures are retried, when a circuit stops further attempts and when a
//! human must be notified.
//!
//! ## Features
//!
//! - **Backoff**: exponential delays with bounded jitter
//! - **Circuit breakers**: one per component, with decaying failure counts
//!   and a bounded number of half-open probes
//! - **Fallback and escalation**: applied in a fixed order once retries are
//!   exhausted
//! - **Rate limiting**: optional per-component sliding window
//! - **Stats and error history**: per-component counters for dashboards
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      RecoveryEngine                          │
//! │  (execute_with_recovery: admission, retries, fallback)      │
//! └─────────────────────────────────────────────────────────────┘
//!          │                     │                      │
//!          ▼                     ▼                      ▼
//! ┌─────────────────┐  ┌──────────────────┐  ┌──────────────────────┐
//! │ComponentRegistry│  │  backoff::delay  │  │ EscalationDispatcher │
//! │ breaker, stats, │  │ (pure, seedable) │  │ (ordered handlers,   │
//! │ history, limit  │  │                  │  │  webhook notifier)   │
//! └─────────────────┘  └──────────────────┘  └──────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use recovery_engine::prelude::*;
//!
//! let engine = Arc::new(RecoveryEngine::from_env()?);
//! engine.register(
//!     "telegram_bot",
//!     ComponentConfig::new()
//!         .with_circuit(CircuitBreakerConfig::new().with_failure_threshold(3))
//!         .with_policy(RecoveryPolicy::Escalate),
//! )?;
//!
//! let result = engine
//!     .execute_with_recovery("telegram_bot", "send_message", |_attempt| async {
//!         send_message().await.map_err(OperationError::from)
//!     })
//!     .await;
//!
//! let delivered = result.into_result()?;
//! ```

pub mod backoff;
pub mod blocking;
pub mod circuit;
pub mod classify;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod protect;
pub mod rate_limit;
pub mod registry;
pub mod stats;

/// Prelude for common imports
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::blocking::BlockingRecovery;
    pub use crate::circuit::{CircuitBreakerConfig, CircuitState, CircuitStatus};
    pub use crate::config::{ComponentConfig, EngineConfig, RecoveryPolicy, RetrySettings};
    pub use crate::context::{RecoveryContext, RecoveryOutcome, RecoveryResult};
    pub use crate::engine::{ExecuteOptions, RecoveryEngine, RetryEvent};
    pub use crate::error::{ErrorKind, OperationError, RecoveryError, RecoveryFailure, Severity};
    pub use crate::escalation::{EscalationError, EscalationHandler};
    pub use crate::protect::Protected;
    pub use crate::rate_limit::RateLimitConfig;
}

// Re-export key types at crate root
pub use blocking::BlockingRecovery;
pub use circuit::{CircuitBreakerConfig, CircuitState, CircuitStatus, CircuitTransition};
pub use config::{
    ComponentConfig, ComponentDefinition, EngineConfig, FallbackFn, RecoveryPolicy, RetrySettings,
};
pub use context::{ErrorSource, RecordedError, RecoveryContext, RecoveryOutcome, RecoveryResult};
pub use engine::{
    ComponentSnapshot, ExecuteOptions, RecoveryEngine, RetryEvent, RetryListener,
    TransitionListener,
};
pub use error::{ErrorKind, OperationError, RecoveryError, RecoveryFailure, Severity};
pub use escalation::{
    CallbackHandler, DispatchReport, EscalationDispatcher, EscalationError, EscalationHandler,
    WebhookConfig, WebhookNotifier,
};
pub use protect::Protected;
pub use rate_limit::RateLimitConfig;
pub use stats::{HistoryEntry, OperationCounts, StatsSnapshot};
