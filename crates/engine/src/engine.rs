//! Recovery orchestrator
//!
//! [`RecoveryEngine::execute_with_recovery`] is the single entry point that
//! combines circuit admission, rate limiting, the retry loop with backoff,
//! fallback and escalation for one named component.
//!
//! The result type is unconstrained. A component's JSON fallback is decoded
//! only by [`RecoveryEngine::execute_decoded`]; callers with a typed degraded
//! value use [`RecoveryEngine::execute_with_fallback`].
//!
//! ```text
//! caller ─► circuit admission ─► rate limit ─► work ─┬─► success ─► breaker success
//!                                                    │
//!                                   retryable? ◄─────┘ failure
//!                                       │ yes: backoff sleep (cancellable), next attempt
//!                                       │ no / exhausted:
//!                                       ▼
//!                     breaker failure (once) ─► Fallback ─► Escalate ─► Abort ─► Failed
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, field, info, instrument, warn, Span};

use crate::backoff;
use crate::circuit::{CircuitBreaker, CircuitState, CircuitStatus, CircuitTransition};
use crate::config::{
    load_components_file, ComponentConfig, EngineConfig, FallbackFn, RecoveryPolicy,
};
use crate::context::{ErrorSource, RecordedError, RecoveryContext, RecoveryOutcome, RecoveryResult};
use crate::error::{OperationError, RecoveryError};
use crate::escalation::{
    CallbackHandler, EscalationDispatcher, EscalationError, EscalationHandler, WebhookNotifier,
};
use crate::registry::{ComponentEntry, ComponentRegistry};
use crate::stats::{HistoryEntry, StatsSnapshot};

/// Listener invoked on every circuit state change
pub type TransitionListener = Arc<dyn Fn(&str, CircuitTransition) + Send + Sync>;

/// A failed attempt that is about to be retried
#[derive(Debug, Clone, Copy)]
pub struct RetryEvent<'a> {
    pub component: &'a str,
    pub operation: &'a str,
    /// The attempt that just failed
    pub attempt: u32,
    pub error: &'a OperationError,
    /// Backoff before the next attempt
    pub delay: Duration,
}

/// Listener invoked before every backoff sleep
pub type RetryListener = Arc<dyn Fn(&RetryEvent<'_>) + Send + Sync>;

/// Per-call overrides for [`RecoveryEngine::execute_with_options`]
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Override the component's attempt budget (ignored without `Retry`)
    pub max_attempts: Option<u32>,

    /// Stops the call at the next backoff or before the next attempt
    pub cancellation: Option<CancellationToken>,
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Dashboard view of one component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSnapshot {
    pub name: String,
    pub policies: Vec<RecoveryPolicy>,
    pub circuit: CircuitStatus,
    pub stats: StatsSnapshot,
}

/// Gives back a half-open probe slot unless an outcome settled it
struct ProbeSlot<'a> {
    breaker: &'a CircuitBreaker,
    held: bool,
}

impl ProbeSlot<'_> {
    fn settle(&mut self) {
        self.held = false;
    }
}

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        if self.held {
            self.breaker.release_probe();
        }
    }
}

/// The recovery engine
///
/// Share it behind an `Arc`; every method takes `&self`.
///
/// # Example
///
/// ```ignore
/// use recovery_engine::prelude::*;
///
/// let engine = RecoveryEngine::new(EngineConfig::default());
/// engine.register("trading", ComponentConfig::new().with_policy(RecoveryPolicy::Escalate))?;
///
/// let result = engine
///     .execute_with_recovery("trading", "execute_trade", |_attempt| async {
///         place_order().await.map_err(OperationError::from)
///     })
///     .await;
///
/// match result.outcome() {
///     RecoveryOutcome::Success => {}
///     RecoveryOutcome::CircuitOpen => println!("trading is temporarily disabled"),
///     other => println!("trade failed: {other}"),
/// }
/// ```
pub struct RecoveryEngine {
    config: EngineConfig,
    registry: ComponentRegistry,
    escalation: EscalationDispatcher,
    unregistered: Arc<ComponentConfig>,
    transition_listeners: RwLock<Vec<TransitionListener>>,
    retry_listeners: RwLock<Vec<RetryListener>>,
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl RecoveryEngine {
    /// Create an engine with no components and no escalation handlers
    pub fn new(config: EngineConfig) -> Self {
        Self {
            registry: ComponentRegistry::new(config.error_history_size),
            escalation: EscalationDispatcher::new(),
            unregistered: Arc::new(ComponentConfig::unregistered(config.default_retry.clone())),
            transition_listeners: RwLock::new(Vec::new()),
            retry_listeners: RwLock::new(Vec::new()),
            config,
        }
    }

    /// Create an engine and apply the configured components file and webhook
    pub fn from_config(config: EngineConfig) -> Result<Self, RecoveryError> {
        let engine = Self::new(config);

        if let Some(path) = engine.config.components_file.clone() {
            let definitions = load_components_file(&path)?;
            info!(path = %path.display(), count = definitions.len(), "loading components file");
            for definition in definitions {
                let (name, config) = definition.into_config();
                engine.register(name, config)?;
            }
        }

        if let Some(webhook) = engine.config.webhook.clone() {
            info!(url = %webhook.url, "escalation webhook enabled");
            engine.add_escalation_handler(Arc::new(WebhookNotifier::new(webhook)?));
        }

        Ok(engine)
    }

    /// Create an engine from `RECOVERY_*` environment variables
    pub fn from_env() -> Result<Self, RecoveryError> {
        Self::from_config(EngineConfig::from_env())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register or replace a component's policy
    ///
    /// Replacing keeps breaker counters; use [`Self::reset_circuit`] to clear them.
    pub fn register(
        &self,
        name: impl Into<String>,
        config: ComponentConfig,
    ) -> Result<(), RecoveryError> {
        let name = name.into();
        let policies = config.policies.clone();
        if self.registry.register(name.clone(), config)? {
            info!(component = %name, ?policies, "registered component");
        } else {
            info!(component = %name, ?policies, "replaced component policy");
        }
        Ok(())
    }

    /// Remove a component; returns false if it was not registered
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.registry.unregister(name);
        if removed {
            info!(component = %name, "unregistered component");
        }
        removed
    }

    pub fn component_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Admission check for work run outside the orchestrator
    ///
    /// Unknown components and components without `CircuitBreak` are always
    /// admitted. A granted half-open admission holds a probe slot until
    /// [`Self::record_success`] or [`Self::record_failure`] is called.
    pub fn can_execute(&self, name: &str) -> bool {
        let Some(entry) = self.registry.get(name) else {
            return true;
        };
        if !entry.config().has_policy(RecoveryPolicy::CircuitBreak) {
            return true;
        }

        let admission = entry.breaker.try_acquire();
        self.notify_transition(name, admission.transition);
        admission.admitted
    }

    /// Report a success of work run outside the orchestrator
    pub fn record_success(&self, name: &str, operation: &str) {
        let Some(entry) = self.registry.get(name) else {
            return;
        };
        if entry.config().has_policy(RecoveryPolicy::CircuitBreak) {
            self.notify_transition(name, entry.breaker.record_success());
        }
        entry.stats.record_outcome(operation, RecoveryOutcome::Success);
    }

    /// Report a failure of work run outside the orchestrator
    pub fn record_failure(&self, name: &str, operation: &str, error: OperationError) {
        let Some(entry) = self.registry.get(name) else {
            return;
        };
        warn!(component = %name, %operation, error = %error, "failure reported");
        if entry.config().has_policy(RecoveryPolicy::CircuitBreak) {
            self.notify_transition(name, entry.breaker.record_failure());
        }
        entry.history.push(
            operation,
            RecordedError {
                attempt: 1,
                source: ErrorSource::Attempt,
                error,
                at: chrono::Utc::now(),
            },
        );
        entry.stats.record_outcome(operation, RecoveryOutcome::Failed);
    }

    /// Breaker snapshot; `None` for unknown components
    pub fn circuit_status(&self, name: &str) -> Option<CircuitStatus> {
        self.registry.get(name).map(|e| e.breaker.status())
    }

    /// Counter snapshot; `None` for unknown components
    pub fn stats(&self, name: &str) -> Option<StatsSnapshot> {
        self.registry.get(name).map(|e| e.stats.snapshot())
    }

    /// Up to `limit` recent errors, newest first
    pub fn recent_errors(&self, name: &str, limit: usize) -> Option<Vec<HistoryEntry>> {
        self.registry.get(name).map(|e| e.history.recent(limit))
    }

    pub fn snapshot(&self, name: &str) -> Option<ComponentSnapshot> {
        self.registry.get(name).map(|entry| ComponentSnapshot {
            name: entry.name().to_string(),
            policies: entry.config().policies.clone(),
            circuit: entry.breaker.status(),
            stats: entry.stats.snapshot(),
        })
    }

    /// Force a component's circuit closed with zeroed counters
    pub fn reset_circuit(&self, name: &str) -> Result<(), RecoveryError> {
        let entry = self
            .registry
            .get(name)
            .ok_or_else(|| RecoveryError::UnknownComponent(name.to_string()))?;
        info!(component = %name, "circuit reset");
        self.notify_transition(name, entry.breaker.reset());
        Ok(())
    }

    /// Add a synchronous escalation callback
    pub fn on_escalation<F>(&self, callback: F)
    where
        F: Fn(&RecoveryContext) -> Result<(), EscalationError> + Send + Sync + 'static,
    {
        let index = self.escalation.len();
        self.escalation.add(Arc::new(CallbackHandler::new(
            format!("callback-{index}"),
            callback,
        )));
    }

    /// Add an async escalation handler
    pub fn add_escalation_handler(&self, handler: Arc<dyn EscalationHandler>) {
        self.escalation.add(handler);
    }

    /// Observe circuit state changes
    pub fn on_circuit_transition<F>(&self, listener: F)
    where
        F: Fn(&str, CircuitTransition) + Send + Sync + 'static,
    {
        self.transition_listeners.write().push(Arc::new(listener));
    }

    /// Observe retries: called with the failed attempt and the upcoming delay
    pub fn on_retry<F>(&self, listener: F)
    where
        F: Fn(&RetryEvent<'_>) + Send + Sync + 'static,
    {
        self.retry_listeners.write().push(Arc::new(listener));
    }

    /// Run `work` under the component's recovery policy
    ///
    /// `work` receives the 1-based attempt number. The call never fails as a
    /// whole: inspect [`RecoveryResult::outcome`] or use
    /// [`RecoveryResult::into_result`].
    ///
    /// A component fallback produces JSON, so it is not applied here; see
    /// [`Self::execute_decoded`] and [`Self::execute_with_fallback`].
    pub async fn execute_with_recovery<T, F, Fut>(
        &self,
        component: &str,
        operation: &str,
        work: F,
    ) -> RecoveryResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        self.execute_with_options(component, operation, ExecuteOptions::default(), work)
            .await
    }

    /// [`Self::execute_with_recovery`] with per-call overrides
    pub async fn execute_with_options<T, F, Fut>(
        &self,
        component: &str,
        operation: &str,
        options: ExecuteOptions,
        work: F,
    ) -> RecoveryResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        self.run(component, operation, options, work, |_, _| {
            None::<std::future::Ready<Result<T, OperationError>>>
        })
        .await
    }

    /// Run `work`, decoding the component's JSON fallback into `T`
    ///
    /// A fallback value of the wrong shape counts as a failed fallback.
    pub async fn execute_decoded<T, F, Fut>(
        &self,
        component: &str,
        operation: &str,
        work: F,
    ) -> RecoveryResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
        T: DeserializeOwned,
    {
        self.execute_decoded_with_options(component, operation, ExecuteOptions::default(), work)
            .await
    }

    /// [`Self::execute_decoded`] with per-call overrides
    pub async fn execute_decoded_with_options<T, F, Fut>(
        &self,
        component: &str,
        operation: &str,
        options: ExecuteOptions,
        work: F,
    ) -> RecoveryResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
        T: DeserializeOwned,
    {
        self.run(component, operation, options, work, |ctx, fallback| {
            fallback.map(|fallback| {
                let produced = fallback(ctx);
                async move {
                    produced
                        .await
                        .and_then(|value| serde_json::from_value::<T>(value).map_err(OperationError::from))
                }
            })
        })
        .await
    }

    /// Run `work` with a typed fallback for this call
    ///
    /// `fallback` runs once attempts are exhausted, whether or not the
    /// component enables the `Fallback` policy, and takes the place of the
    /// component's own fallback.
    pub async fn execute_with_fallback<T, F, Fut, G, GFut>(
        &self,
        component: &str,
        operation: &str,
        fallback: G,
        work: F,
    ) -> RecoveryResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
        G: FnOnce(&RecoveryContext) -> GFut,
        GFut: Future<Output = Result<T, OperationError>>,
    {
        self.run(
            component,
            operation,
            ExecuteOptions::default(),
            work,
            move |ctx, _| Some(fallback(ctx)),
        )
        .await
    }

    #[instrument(skip(self, options, work, fallback), fields(call_id = field::Empty))]
    async fn run<T, F, Fut, G, GFut>(
        &self,
        component: &str,
        operation: &str,
        options: ExecuteOptions,
        mut work: F,
        fallback: G,
    ) -> RecoveryResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
        G: FnOnce(&RecoveryContext, Option<&FallbackFn>) -> Option<GFut>,
        GFut: Future<Output = Result<T, OperationError>>,
    {
        let mut ctx = RecoveryContext::new(component, operation);
        Span::current().record("call_id", field::display(ctx.call_id));

        let entry = self.registry.get(component);
        let entry = entry.as_deref();
        let config = match entry {
            Some(entry) => entry.config(),
            None => {
                debug!("component not registered, using default policy");
                Arc::clone(&self.unregistered)
            }
        };

        let breaker = entry
            .filter(|_| config.has_policy(RecoveryPolicy::CircuitBreak))
            .map(|e| &e.breaker);
        let mut probe = None;
        if let Some(breaker) = breaker {
            let admission = breaker.try_acquire();
            self.notify_transition(component, admission.transition);
            if !admission.admitted {
                debug!("rejected by open circuit");
                return self.finish(entry, ctx, RecoveryOutcome::CircuitOpen, None);
            }
            probe = Some(ProbeSlot {
                breaker,
                held: admission.probe,
            });
        }

        // After admission: circuit rejections must not use up window slots.
        // A half-open slot granted above is released when the guard drops.
        if let Some(limiter) = entry.and_then(|e| e.limiter()) {
            if !limiter.try_acquire() {
                debug!("rejected by rate limit");
                return self.finish(entry, ctx, RecoveryOutcome::RateLimited, None);
            }
        }

        let max_attempts = config.effective_max_attempts(options.max_attempts);
        let cancellation = options.cancellation;
        let mut cancelled = false;

        for attempt in 1..=max_attempts {
            if cancellation.as_ref().is_some_and(|t| t.is_cancelled()) {
                cancelled = true;
                break;
            }

            ctx.attempts = attempt;
            if attempt > 1 {
                if let Some(entry) = entry {
                    entry.stats.record_retry(operation);
                }
            }
            debug!(attempt, max_attempts, "running attempt");

            match work(attempt).await {
                Ok(value) => {
                    if let Some(breaker) = breaker {
                        self.notify_transition(component, breaker.record_success());
                    }
                    if let Some(probe) = probe.as_mut() {
                        probe.settle();
                    }
                    return self.finish(entry, ctx, RecoveryOutcome::Success, Some(value));
                }
                Err(error) => {
                    let retryable = (config.retryable)(&error);
                    warn!(attempt, max_attempts, retryable, error = %error, "attempt failed");
                    record_error(entry, &mut ctx, ErrorSource::Attempt, error);

                    if !retryable || attempt == max_attempts {
                        break;
                    }
                    if breaker.is_some_and(|b| b.is_open()) {
                        debug!("circuit opened during retries");
                        break;
                    }

                    let delay = backoff::delay(attempt, &config.retry, &mut rand::thread_rng());
                    ctx.total_delay += delay;
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
                    if let Some(recorded) = ctx.errors.last() {
                        self.notify_retry(&RetryEvent {
                            component,
                            operation,
                            attempt,
                            error: &recorded.error,
                            delay,
                        });
                    }

                    if !backoff_sleep(delay, cancellation.as_ref()).await {
                        cancelled = true;
                        break;
                    }
                }
            }
        }

        if cancelled {
            info!(attempts = ctx.attempts, "cancelled by caller");
            record_error(entry, &mut ctx, ErrorSource::Cancellation, OperationError::cancelled());
            // Dropping the probe slot gives it back; cancellation is not a failure
            drop(probe);
            return self.finish(entry, ctx, RecoveryOutcome::Failed, None);
        }

        if let Some(breaker) = breaker {
            let excluded = config
                .breaker_excluded
                .as_ref()
                .zip(ctx.errors.last())
                .is_some_and(|(predicate, recorded)| predicate(&recorded.error));
            if config.has_policy(RecoveryPolicy::Ignore) {
                debug!("failure not counted under ignore policy");
            } else if excluded {
                debug!("failure excluded from circuit breaker");
            } else {
                self.notify_transition(component, breaker.record_failure());
                if let Some(probe) = probe.as_mut() {
                    probe.settle();
                }
            }
        }
        drop(probe);

        let component_fallback = config
            .fallback
            .as_ref()
            .filter(|_| config.has_policy(RecoveryPolicy::Fallback));
        match fallback(&ctx, component_fallback) {
            Some(produced) => match produced.await {
                Ok(value) => {
                    info!(attempts = ctx.attempts, "fallback used");
                    ctx.fallback_used = true;
                    return self.finish(entry, ctx, RecoveryOutcome::FallbackUsed, Some(value));
                }
                Err(error) => {
                    warn!(error = %error, "fallback failed");
                    record_error(entry, &mut ctx, ErrorSource::Fallback, error);
                }
            },
            None if component_fallback.is_some() => {
                debug!("component fallback skipped, result type is not decoded");
            }
            None => {}
        }

        if config.has_policy(RecoveryPolicy::Escalate) {
            ctx.escalated = true;
            ctx.finish(RecoveryOutcome::Escalated);
            let last_error = ctx
                .last_error()
                .map(ToString::to_string)
                .unwrap_or_default();
            error!(attempts = ctx.attempts, error = %last_error, "escalating");
            let report = self.escalation.dispatch(&ctx).await;
            debug!(delivered = report.delivered, failed = report.failed, "escalation dispatched");
            return self.finish(entry, ctx, RecoveryOutcome::Escalated, None);
        }

        let outcome = if config.has_policy(RecoveryPolicy::Abort) {
            RecoveryOutcome::Aborted
        } else {
            RecoveryOutcome::Failed
        };
        self.finish(entry, ctx, outcome, None)
    }

    fn finish<T>(
        &self,
        entry: Option<&ComponentEntry>,
        mut ctx: RecoveryContext,
        outcome: RecoveryOutcome,
        value: Option<T>,
    ) -> RecoveryResult<T> {
        ctx.finish(outcome);
        if let Some(entry) = entry {
            entry.stats.record_outcome(&ctx.operation, outcome);
        }
        debug!(
            %outcome,
            attempts = ctx.attempts,
            total_delay_ms = ctx.total_delay.as_millis() as u64,
            "call finished"
        );
        RecoveryResult {
            value,
            context: ctx,
        }
    }

    fn notify_retry(&self, event: &RetryEvent<'_>) {
        let listeners: Vec<_> = self.retry_listeners.read().clone();
        for listener in listeners {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| listener(event)));
            if result.is_err() {
                error!(component = event.component, "retry listener panicked");
            }
        }
    }

    fn notify_transition(&self, component: &str, transition: Option<CircuitTransition>) {
        let Some(transition) = transition else {
            return;
        };

        match transition.to {
            CircuitState::Open => {
                warn!(component, from = %transition.from, "circuit opened")
            }
            CircuitState::HalfOpen => {
                info!(component, from = %transition.from, "circuit half-open, probing")
            }
            CircuitState::Closed => {
                info!(component, from = %transition.from, "circuit closed")
            }
        }

        let listeners: Vec<_> = self.transition_listeners.read().clone();
        for listener in listeners {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| listener(component, transition)));
            if result.is_err() {
                error!(component, "circuit transition listener panicked");
            }
        }
    }
}

impl std::fmt::Debug for RecoveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryEngine")
            .field("components", &self.registry.names())
            .field("escalation", &self.escalation)
            .finish()
    }
}

fn record_error(
    entry: Option<&ComponentEntry>,
    ctx: &mut RecoveryContext,
    source: ErrorSource,
    error: OperationError,
) {
    ctx.record_error(source, error);
    if let (Some(entry), Some(recorded)) = (entry, ctx.errors.last()) {
        entry.history.push(&ctx.operation, recorded.clone());
    }
}

/// Sleep for `delay`; returns false if the token fired first
async fn backoff_sleep(delay: Duration, cancellation: Option<&CancellationToken>) -> bool {
    match cancellation {
        Some(token) => tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = token.cancelled() => false,
        },
        None => {
            tokio::time::sleep(delay).await;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitBreakerConfig;
    use parking_lot::Mutex;

    #[test]
    fn test_transition_listener_panic_is_contained() {
        let engine = RecoveryEngine::default();
        engine
            .register(
                "trading",
                ComponentConfig::new()
                    .with_circuit(CircuitBreakerConfig::new().with_failure_threshold(1)),
            )
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        engine.on_circuit_transition(|_, _| panic!("listener bug"));
        let sink = seen.clone();
        engine.on_circuit_transition(move |name, t| sink.lock().push((name.to_string(), t.to)));

        engine.record_failure("trading", "execute_trade", OperationError::timeout("t"));
        engine.reset_circuit("trading").unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                ("trading".to_string(), CircuitState::Open),
                ("trading".to_string(), CircuitState::Closed),
            ]
        );
    }

    #[test]
    fn test_unknown_component_management() {
        let engine = RecoveryEngine::default();
        assert!(engine.can_execute("nobody"));
        assert!(engine.circuit_status("nobody").is_none());
        assert!(engine.stats("nobody").is_none());
        assert!(matches!(
            engine.reset_circuit("nobody"),
            Err(RecoveryError::UnknownComponent(_))
        ));
        // Reports for unknown components are dropped
        engine.record_failure("nobody", "op", OperationError::other("x"));
        assert!(!engine.unregister("nobody"));
    }

    #[test]
    fn test_external_reporting() {
        let engine = RecoveryEngine::default();
        engine
            .register(
                "bot",
                ComponentConfig::new()
                    .with_circuit(CircuitBreakerConfig::new().with_failure_threshold(2)),
            )
            .unwrap();

        assert!(engine.can_execute("bot"));
        engine.record_failure("bot", "send", OperationError::timeout("slow"));
        assert_eq!(engine.circuit_status("bot").unwrap().consecutive_failures, 1);

        engine.record_success("bot", "send");
        assert_eq!(engine.circuit_status("bot").unwrap().consecutive_failures, 0);

        engine.record_failure("bot", "send", OperationError::timeout("slow"));
        engine.record_failure("bot", "send", OperationError::timeout("slow"));
        assert!(!engine.can_execute("bot"));

        let stats = engine.stats("bot").unwrap();
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.failures, 3);
        assert_eq!(engine.recent_errors("bot", 10).unwrap().len(), 3);
    }

    #[test]
    fn test_snapshot() {
        let engine = RecoveryEngine::default();
        engine.register("trading", ComponentConfig::new()).unwrap();

        let snapshot = engine.snapshot("trading").unwrap();
        assert_eq!(snapshot.name, "trading");
        assert_eq!(
            snapshot.policies,
            vec![RecoveryPolicy::Retry, RecoveryPolicy::CircuitBreak]
        );
        assert_eq!(snapshot.circuit.state, CircuitState::Closed);
        assert_eq!(engine.component_names(), vec!["trading".to_string()]);
    }
}
