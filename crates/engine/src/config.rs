//! Component policy and engine configuration

use std::env;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::circuit::CircuitBreakerConfig;
use crate::classify::{self, RetryablePredicate};
use crate::context::RecoveryContext;
use crate::error::{OperationError, RecoveryError};
use crate::escalation::WebhookConfig;
use crate::rate_limit::RateLimitConfig;

/// Recovery policies a component opts into
///
/// `Retry` and `CircuitBreak` shape the attempt loop. The remaining policies
/// apply once retries are exhausted, in the fixed order
/// `Fallback` → `Escalate` → `Abort`. `Ignore` keeps exhausted failures from
/// counting against the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPolicy {
    Retry,
    CircuitBreak,
    Fallback,
    Escalate,
    Abort,
    Ignore,
}

impl fmt::Display for RecoveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Retry => "retry",
            Self::CircuitBreak => "circuit_break",
            Self::Fallback => "fallback",
            Self::Escalate => "escalate",
            Self::Abort => "abort",
            Self::Ignore => "ignore",
        };
        f.write_str(s)
    }
}

fn default_policies() -> Vec<RecoveryPolicy> {
    vec![RecoveryPolicy::Retry, RecoveryPolicy::CircuitBreak]
}

/// Retry loop and backoff settings
///
/// # Example
///
/// ```
/// use recovery_engine::RetrySettings;
/// use std::time::Duration;
///
/// let retry = RetrySettings::default()
///     .with_max_attempts(5)
///     .with_base_delay(Duration::from_millis(200))
///     .with_max_delay(Duration::from_secs(10));
///
/// // First retry after ~200ms, then ~400ms, ~800ms, ...
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    /// Maximum number of attempts (including the initial one)
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,

    /// Upper bound for any single delay
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,

    /// Backoff multiplier (e.g., 2.0 for exponential)
    pub multiplier: f64,

    /// Jitter fraction (0.0-1.0); 0.1 means ±10%
    pub jitter_fraction: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_fraction: 0.1,
        }
    }
}

impl RetrySettings {
    /// Settings that never retry
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter_fraction: 0.0,
        }
    }

    /// Fixed delay between attempts (no backoff, no jitter)
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: interval,
            max_delay: interval,
            multiplier: 1.0,
            jitter_fraction: 0.0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the jitter fraction (clamped to 0.0-1.0)
    pub fn with_jitter_fraction(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".into());
        }
        if self.base_delay > self.max_delay {
            return Err("base_delay must not exceed max_delay".into());
        }
        if !self.multiplier.is_finite() || self.multiplier <= 0.0 {
            return Err("multiplier must be a positive number".into());
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err("jitter_fraction must be within 0.0-1.0".into());
        }
        Ok(())
    }
}

/// Type-erased fallback producing a degraded result as JSON
pub type FallbackFn = Arc<
    dyn Fn(&RecoveryContext) -> BoxFuture<'static, Result<serde_json::Value, OperationError>>
        + Send
        + Sync,
>;

/// Policy for one component
///
/// Immutable once registered; re-registering swaps it atomically while the
/// breaker keeps its counters.
#[derive(Clone)]
pub struct ComponentConfig {
    pub retry: RetrySettings,
    pub circuit: CircuitBreakerConfig,
    pub retryable: RetryablePredicate,
    pub fallback: Option<FallbackFn>,
    pub policies: Vec<RecoveryPolicy>,
    pub rate_limit: Option<RateLimitConfig>,
    /// Exhausted failures matching this never count against the breaker
    pub breaker_excluded: Option<RetryablePredicate>,
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            circuit: CircuitBreakerConfig::default(),
            retryable: classify::default_predicate(),
            fallback: None,
            policies: default_policies(),
            rate_limit: None,
            breaker_excluded: None,
        }
    }
}

impl fmt::Debug for ComponentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentConfig")
            .field("retry", &self.retry)
            .field("circuit", &self.circuit)
            .field("fallback", &self.fallback.is_some())
            .field("policies", &self.policies)
            .field("rate_limit", &self.rate_limit)
            .field("breaker_excluded", &self.breaker_excluded.is_some())
            .finish()
    }
}

impl ComponentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy used for components nobody registered: retries, no breaker
    pub(crate) fn unregistered(retry: RetrySettings) -> Self {
        Self {
            retry,
            policies: vec![RecoveryPolicy::Retry],
            ..Self::default()
        }
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_circuit(mut self, circuit: CircuitBreakerConfig) -> Self {
        self.circuit = circuit;
        self
    }

    /// Replace the retryable predicate
    pub fn with_retryable<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&OperationError) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(predicate);
        self
    }

    /// Keep matching failures from tripping the breaker
    ///
    /// Checked against the last attempt error once retries are exhausted. A
    /// matching call does not count as a failure, and a half-open slot it
    /// held is handed back.
    pub fn with_breaker_excluded<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&OperationError) -> bool + Send + Sync + 'static,
    {
        self.breaker_excluded = Some(Arc::new(predicate));
        self
    }

    /// Replace the policy list
    pub fn with_policies(mut self, policies: impl IntoIterator<Item = RecoveryPolicy>) -> Self {
        self.policies = policies.into_iter().collect();
        self
    }

    /// Add a policy if not already present
    pub fn with_policy(mut self, policy: RecoveryPolicy) -> Self {
        if !self.policies.contains(&policy) {
            self.policies.push(policy);
        }
        self
    }

    /// Set a fallback and enable the `Fallback` policy
    ///
    /// The closure receives the context of the failed call; the future it
    /// returns must own everything it needs.
    pub fn with_fallback<F, Fut>(mut self, fallback: F) -> Self
    where
        F: Fn(&RecoveryContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, OperationError>> + Send + 'static,
    {
        self.fallback = Some(Arc::new(move |ctx: &RecoveryContext| fallback(ctx).boxed()));
        self.with_policy(RecoveryPolicy::Fallback)
    }

    /// Fallback that always yields the same value
    pub fn with_fallback_value(self, value: serde_json::Value) -> Self {
        self.with_fallback(move |_| {
            let value = value.clone();
            async move { Ok(value) }
        })
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    pub fn has_policy(&self, policy: RecoveryPolicy) -> bool {
        self.policies.contains(&policy)
    }

    /// Attempts allowed per call, honoring the `Retry` policy
    pub fn effective_max_attempts(&self, requested: Option<u32>) -> u32 {
        if self.has_policy(RecoveryPolicy::Retry) {
            requested.unwrap_or(self.retry.max_attempts).max(1)
        } else {
            1
        }
    }

    /// Check the configuration for contradictions
    pub fn validate(&self) -> Result<(), String> {
        self.retry.validate()?;
        self.circuit.validate()?;
        if let Some(rate_limit) = &self.rate_limit {
            rate_limit.validate()?;
        }
        Ok(())
    }
}

/// Serializable component description, e.g. from a JSON file
///
/// ```json
/// { "name": "telegram_bot",
///   "retry": { "max_attempts": 4, "base_delay": 500 },
///   "circuit": { "failure_threshold": 3, "cooldown": 60000 },
///   "policies": ["retry", "circuit_break", "escalate"] }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentDefinition {
    pub name: String,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub circuit: CircuitBreakerConfig,

    #[serde(default = "default_policies")]
    pub policies: Vec<RecoveryPolicy>,

    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,

    /// Static degraded response used as the fallback
    #[serde(default)]
    pub fallback_value: Option<serde_json::Value>,

    /// Keep validation and type errors from tripping the breaker
    #[serde(default)]
    pub exclude_caller_errors: bool,
}

impl ComponentDefinition {
    /// Build the runtime config using the default retry predicate
    pub fn into_config(self) -> (String, ComponentConfig) {
        let mut config = ComponentConfig::new()
            .with_retry(self.retry)
            .with_circuit(self.circuit)
            .with_policies(self.policies);
        config.rate_limit = self.rate_limit;
        if let Some(value) = self.fallback_value {
            config = config.with_fallback_value(value);
        }
        if self.exclude_caller_errors {
            config.breaker_excluded = Some(classify::caller_errors());
        }
        (self.name, config)
    }
}

/// Read a JSON array of [`ComponentDefinition`]
pub fn load_components_file(path: &Path) -> Result<Vec<ComponentDefinition>, RecoveryError> {
    let raw = std::fs::read_to_string(path).map_err(|source| RecoveryError::ConfigFile {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| RecoveryError::ConfigParse {
        path: path.display().to_string(),
        source,
    })
}

/// Engine-wide configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Retry settings applied to components nobody registered
    pub default_retry: RetrySettings,

    /// Recent errors kept per component
    pub error_history_size: usize,

    /// Optional JSON file of components to register at startup
    pub components_file: Option<PathBuf>,

    /// Optional webhook notified on escalation
    pub webhook: Option<WebhookConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_retry: RetrySettings::default(),
            error_history_size: 100,
            components_file: None,
            webhook: None,
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `RECOVERY_DEFAULT_MAX_ATTEMPTS`: attempts for unregistered components (default: 3)
    /// - `RECOVERY_DEFAULT_BASE_DELAY_MS`: base backoff delay (default: 1000)
    /// - `RECOVERY_DEFAULT_MAX_DELAY_MS`: backoff cap (default: 60000)
    /// - `RECOVERY_ERROR_HISTORY_SIZE`: recent errors kept per component (default: 100)
    /// - `RECOVERY_COMPONENTS_FILE`: JSON file of components to register
    /// - `RECOVERY_ESCALATION_WEBHOOK_URL` and friends: see [`WebhookConfig::from_env`]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mut default_retry = defaults.default_retry;
        if let Some(n) = env_parse::<u32>("RECOVERY_DEFAULT_MAX_ATTEMPTS") {
            default_retry = default_retry.with_max_attempts(n);
        }
        if let Some(ms) = env_parse::<u64>("RECOVERY_DEFAULT_BASE_DELAY_MS") {
            default_retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("RECOVERY_DEFAULT_MAX_DELAY_MS") {
            default_retry.max_delay = Duration::from_millis(ms);
        }

        Self {
            default_retry,
            error_history_size: env_parse("RECOVERY_ERROR_HISTORY_SIZE")
                .unwrap_or(defaults.error_history_size),
            components_file: env::var("RECOVERY_COMPONENTS_FILE")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            webhook: WebhookConfig::from_env(),
        }
    }

    pub fn with_default_retry(mut self, retry: RetrySettings) -> Self {
        self.default_retry = retry;
        self
    }

    pub fn with_error_history_size(mut self, size: usize) -> Self {
        self.error_history_size = size;
        self
    }

    pub fn with_webhook(mut self, webhook: WebhookConfig) -> Self {
        self.webhook = Some(webhook);
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Serde support for Option<Duration> as milliseconds
pub(crate) mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_defaults() {
        let retry = RetrySettings::default();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.base_delay, Duration::from_secs(1));
        assert_eq!(retry.max_delay, Duration::from_secs(60));
        assert_eq!(retry.multiplier, 2.0);
    }

    #[test]
    fn test_fixed_and_no_retry() {
        let fixed = RetrySettings::fixed(Duration::from_secs(5), 3);
        assert_eq!(fixed.base_delay, fixed.max_delay);
        assert_eq!(fixed.jitter_fraction, 0.0);
        assert_eq!(RetrySettings::no_retry().max_attempts, 1);
    }

    #[test]
    fn test_validate() {
        assert!(ComponentConfig::new().validate().is_ok());

        let mut bad = ComponentConfig::new();
        bad.retry.base_delay = Duration::from_secs(120);
        assert!(bad.validate().is_err());

        let mut bad = ComponentConfig::new();
        bad.retry.multiplier = 0.0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_effective_max_attempts() {
        let config = ComponentConfig::new().with_retry(RetrySettings::default().with_max_attempts(4));
        assert_eq!(config.effective_max_attempts(None), 4);
        assert_eq!(config.effective_max_attempts(Some(2)), 2);
        assert_eq!(config.effective_max_attempts(Some(0)), 1);

        let no_retry = config.with_policies([RecoveryPolicy::CircuitBreak]);
        assert_eq!(no_retry.effective_max_attempts(Some(10)), 1);
    }

    #[test]
    fn test_with_fallback_enables_policy() {
        let config = ComponentConfig::new().with_fallback_value(serde_json::json!("cached"));
        assert!(config.fallback.is_some());
        assert!(config.has_policy(RecoveryPolicy::Fallback));

        let config = config.with_policy(RecoveryPolicy::Fallback);
        assert_eq!(
            config
                .policies
                .iter()
                .filter(|p| **p == RecoveryPolicy::Fallback)
                .count(),
            1
        );
    }

    #[test]
    fn test_unregistered_has_no_breaker() {
        let config = ComponentConfig::unregistered(RetrySettings::default());
        assert!(config.has_policy(RecoveryPolicy::Retry));
        assert!(!config.has_policy(RecoveryPolicy::CircuitBreak));
    }

    #[test]
    fn test_component_definition_partial_json() {
        let definition: ComponentDefinition = serde_json::from_value(serde_json::json!({
            "name": "telegram_bot",
            "retry": { "max_attempts": 4, "base_delay": 500 },
            "circuit": { "failure_threshold": 3, "cooldown": 60000 },
            "policies": ["retry", "circuit_break", "escalate"]
        }))
        .unwrap();

        assert_eq!(definition.retry.max_attempts, 4);
        assert_eq!(definition.retry.base_delay, Duration::from_millis(500));
        assert_eq!(definition.retry.max_delay, Duration::from_secs(60));
        assert_eq!(definition.circuit.failure_threshold, 3);
        assert_eq!(definition.circuit.success_threshold, 2);

        let (name, config) = definition.into_config();
        assert_eq!(name, "telegram_bot");
        assert!(config.has_policy(RecoveryPolicy::Escalate));
        assert!(config.fallback.is_none());
        assert!(config.breaker_excluded.is_none());
    }

    #[test]
    fn test_component_definition_defaults() {
        let definition: ComponentDefinition =
            serde_json::from_value(serde_json::json!({ "name": "trading", "fallback_value": [] }))
                .unwrap();
        assert_eq!(definition.policies, default_policies());
        let (_, config) = definition.into_config();
        assert!(config.has_policy(RecoveryPolicy::Fallback));
    }

    #[test]
    fn test_component_definition_excludes_caller_errors() {
        let definition: ComponentDefinition = serde_json::from_value(serde_json::json!({
            "name": "telegram_bot",
            "exclude_caller_errors": true
        }))
        .unwrap();

        let (_, config) = definition.into_config();
        let excluded = config.breaker_excluded.unwrap();
        assert!(excluded(&OperationError::validation("chat not found")));
        assert!(!excluded(&OperationError::timeout("slow")));
    }

    #[test]
    fn test_load_components_file() {
        let dir = std::env::temp_dir().join(format!("recovery-config-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("components.json");
        std::fs::write(&path, r#"[{"name": "a"}, {"name": "b", "policies": ["retry"]}]"#).unwrap();

        let definitions = load_components_file(&path).unwrap();
        assert_eq!(definitions.len(), 2);
        assert_eq!(definitions[1].policies, vec![RecoveryPolicy::Retry]);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            load_components_file(&path),
            Err(RecoveryError::ConfigParse { .. })
        ));
        assert!(matches!(
            load_components_file(&dir.join("missing.json")),
            Err(RecoveryError::ConfigFile { .. })
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
