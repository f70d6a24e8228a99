//! Escalation dispatch
//!
//! Handlers run in registration order once a call has exhausted its retries
//! under the `Escalate` policy. A handler that returns an error or panics is
//! logged and skipped; the remaining handlers still run.

mod webhook;

pub use webhook::{WebhookConfig, WebhookNotifier};

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use tracing::{debug, error};

use crate::context::RecoveryContext;

/// Errors raised by escalation handlers
#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    /// Handler-specific failure
    #[error("{0}")]
    Failed(String),

    /// Transport error talking to a notification endpoint
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("endpoint rejected notification: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Handler configuration is unusable
    #[error("configuration error: {0}")]
    Config(String),
}

impl EscalationError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Receives the context of calls that escalated
#[async_trait]
pub trait EscalationHandler: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str {
        "handler"
    }

    async fn escalate(&self, context: &RecoveryContext) -> Result<(), EscalationError>;
}

/// Adapts a synchronous closure into an [`EscalationHandler`]
pub struct CallbackHandler<F> {
    name: String,
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: Fn(&RecoveryContext) -> Result<(), EscalationError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, callback: F) -> Self {
        Self {
            name: name.into(),
            callback,
        }
    }
}

#[async_trait]
impl<F> EscalationHandler for CallbackHandler<F>
where
    F: Fn(&RecoveryContext) -> Result<(), EscalationError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn escalate(&self, context: &RecoveryContext) -> Result<(), EscalationError> {
        (self.callback)(context)
    }
}

/// Summary of one dispatch round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Ordered list of escalation handlers
#[derive(Default)]
pub struct EscalationDispatcher {
    handlers: RwLock<Vec<Arc<dyn EscalationHandler>>>,
}

impl EscalationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler; it runs after every handler added before it
    pub fn add(&self, handler: Arc<dyn EscalationHandler>) {
        self.handlers.write().push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Invoke every handler in order, isolating failures
    pub async fn dispatch(&self, context: &RecoveryContext) -> DispatchReport {
        let handlers: Vec<_> = self.handlers.read().clone();
        let mut report = DispatchReport::default();

        for handler in handlers {
            let result = AssertUnwindSafe(handler.escalate(context))
                .catch_unwind()
                .await;

            match result {
                Ok(Ok(())) => {
                    debug!(
                        handler = handler.name(),
                        component = %context.component,
                        "Escalation delivered"
                    );
                    report.delivered += 1;
                }
                Ok(Err(e)) => {
                    error!(
                        handler = handler.name(),
                        component = %context.component,
                        error = %e,
                        "Escalation handler failed"
                    );
                    report.failed += 1;
                }
                Err(panic) => {
                    error!(
                        handler = handler.name(),
                        component = %context.component,
                        panic = panic_message(&*panic),
                        "Escalation handler panicked"
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}

impl fmt::Debug for EscalationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .handlers
            .read()
            .iter()
            .map(|h| h.name().to_string())
            .collect();
        f.debug_struct("EscalationDispatcher")
            .field("handlers", &names)
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
