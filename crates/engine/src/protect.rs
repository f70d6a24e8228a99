//! Higher-order wrappers over the orchestrator

use std::future::Future;
use std::sync::Arc;

use crate::context::RecoveryResult;
use crate::engine::{ExecuteOptions, RecoveryEngine};
use crate::error::{OperationError, RecoveryFailure};

/// A function bound to a component and operation
///
/// Every call runs through [`RecoveryEngine::execute_with_recovery`]. The
/// argument is cloned for each attempt.
///
/// ```ignore
/// let send = engine.protect("telegram_bot", "send_message", |msg: Message| async move {
///     bot.send(msg).await.map_err(OperationError::from)
/// });
///
/// send.call(message).await?;
/// ```
pub struct Protected<F> {
    engine: Arc<RecoveryEngine>,
    component: String,
    operation: String,
    work: F,
}

impl<F> Protected<F> {
    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Run the wrapped function, returning the full recovery result
    pub async fn run<A, T, Fut>(&self, args: A) -> RecoveryResult<T>
    where
        F: Fn(A) -> Fut,
        A: Clone,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        self.engine
            .execute_with_recovery(&self.component, &self.operation, |_attempt| {
                (self.work)(args.clone())
            })
            .await
    }

    /// Run the wrapped function, translating non-value outcomes to errors
    pub async fn call<A, T, Fut>(&self, args: A) -> Result<T, RecoveryFailure>
    where
        F: Fn(A) -> Fut,
        A: Clone,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        self.run(args).await.into_result()
    }
}

impl<F> Clone for Protected<F>
where
    F: Clone,
{
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            component: self.component.clone(),
            operation: self.operation.clone(),
            work: self.work.clone(),
        }
    }
}

impl RecoveryEngine {
    /// Bind `work` to a component and operation
    pub fn protect<F>(
        self: &Arc<Self>,
        component: impl Into<String>,
        operation: impl Into<String>,
        work: F,
    ) -> Protected<F> {
        Protected {
            engine: Arc::clone(self),
            component: component.into(),
            operation: operation.into(),
            work,
        }
    }

    /// One-shot circuit protection: a single attempt, no retries
    ///
    /// Circuit admission and escalation still apply.
    pub async fn guarded<T, Fut>(
        &self,
        component: &str,
        operation: &str,
        work: impl FnOnce() -> Fut,
    ) -> RecoveryResult<T>
    where
        Fut: Future<Output = Result<T, OperationError>>,
    {
        let mut work = Some(work);
        let options = ExecuteOptions::new().with_max_attempts(1);
        self.execute_with_options(component, operation, options, move |_attempt| {
            let work = work.take();
            async move {
                match work {
                    Some(work) => work().await,
                    None => Err(OperationError::other("guarded work invoked twice")),
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitBreakerConfig;
    use crate::config::{ComponentConfig, RetrySettings};
    use crate::context::RecoveryOutcome;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn engine() -> Arc<RecoveryEngine> {
        let engine = Arc::new(RecoveryEngine::default());
        engine
            .register(
                "bot",
                ComponentConfig::new()
                    .with_retry(RetrySettings::fixed(Duration::from_millis(10), 3))
                    .with_retryable(|_| true)
                    .with_circuit(CircuitBreakerConfig::new().with_failure_threshold(1)),
            )
            .unwrap();
        engine
    }

    #[tokio::test(start_paused = true)]
    async fn test_protected_retries_with_cloned_args() {
        let engine = engine();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let send = engine.protect("bot", "send", move |text: String| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(OperationError::timeout("slow"))
                } else {
                    Ok(text.len())
                }
            }
        });

        assert_eq!(send.call("hello".to_string()).await.unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(send.component(), "bot");
    }

    #[tokio::test(start_paused = true)]
    async fn test_protected_call_reports_circuit_open() {
        let engine = engine();
        let fail = engine.protect("bot", "send", |_: ()| async {
            Err::<(), _>(OperationError::timeout("down"))
        });

        let err = fail.call(()).await.unwrap_err();
        assert!(matches!(err, RecoveryFailure::Exhausted { attempts: 3, .. }));

        let err = fail.call(()).await.unwrap_err();
        assert!(matches!(err, RecoveryFailure::CircuitOpen { .. }));
    }

    #[tokio::test]
    async fn test_guarded_runs_once() {
        let engine = RecoveryEngine::default();
        engine.register("payments", ComponentConfig::new()).unwrap();

        let calls = AtomicU32::new(0);
        let result = engine
            .guarded("payments", "charge", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(OperationError::timeout("gateway"))
            })
            .await;

        assert_eq!(result.outcome(), RecoveryOutcome::Failed);
        assert_eq!(result.context.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.circuit_status("payments").unwrap().consecutive_failures, 1);
    }
}
