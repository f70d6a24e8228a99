//! Component registry
//!
//! Maps component names to their policy and live state. Each component owns
//! its breaker, counters, error history and rate limiter, so components never
//! contend on a shared lock.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::circuit::CircuitBreaker;
use crate::config::ComponentConfig;
use crate::error::RecoveryError;
use crate::rate_limit::SlidingWindow;
use crate::stats::{ErrorHistory, OperationStats};

/// Policy and live state for one registered component
pub struct ComponentEntry {
    name: String,
    config: RwLock<Arc<ComponentConfig>>,
    limiter: RwLock<Option<Arc<SlidingWindow>>>,
    pub(crate) breaker: CircuitBreaker,
    pub(crate) stats: OperationStats,
    pub(crate) history: ErrorHistory,
}

impl ComponentEntry {
    fn new(name: String, config: ComponentConfig, history_size: usize) -> Self {
        let limiter = config
            .rate_limit
            .clone()
            .map(|rl| Arc::new(SlidingWindow::new(rl)));
        Self {
            name,
            breaker: CircuitBreaker::new(config.circuit.clone()),
            config: RwLock::new(Arc::new(config)),
            limiter: RwLock::new(limiter),
            stats: OperationStats::new(),
            history: ErrorHistory::new(history_size),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current policy; callers keep the `Arc` for the duration of one call
    pub fn config(&self) -> Arc<ComponentConfig> {
        self.config.read().clone()
    }

    pub(crate) fn limiter(&self) -> Option<Arc<SlidingWindow>> {
        self.limiter.read().clone()
    }

    /// Swap policy, keeping breaker counters and stats
    fn replace_config(&self, config: ComponentConfig) {
        self.breaker.reconfigure(config.circuit.clone());

        {
            let mut limiter = self.limiter.write();
            let unchanged = match (limiter.as_ref(), config.rate_limit.as_ref()) {
                (Some(current), Some(next)) => current.config() == next,
                (None, None) => true,
                _ => false,
            };
            if !unchanged {
                *limiter = config
                    .rate_limit
                    .clone()
                    .map(|rl| Arc::new(SlidingWindow::new(rl)));
            }
        }

        *self.config.write() = Arc::new(config);
    }
}

impl fmt::Debug for ComponentEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentEntry")
            .field("name", &self.name)
            .field("config", &self.config.read())
            .field("breaker", &self.breaker.status())
            .finish()
    }
}

/// Registry of components keyed by name
#[derive(Debug)]
pub struct ComponentRegistry {
    components: DashMap<String, Arc<ComponentEntry>>,
    history_size: usize,
}

impl ComponentRegistry {
    /// Create an empty registry keeping `history_size` recent errors per component
    pub fn new(history_size: usize) -> Self {
        Self {
            components: DashMap::new(),
            history_size,
        }
    }

    /// Register or replace a component's policy
    ///
    /// Replacing keeps the breaker's counters, stats and history; only the
    /// thresholds change. Returns `true` if the component was new.
    pub fn register(
        &self,
        name: impl Into<String>,
        config: ComponentConfig,
    ) -> Result<bool, RecoveryError> {
        let name = name.into();
        config
            .validate()
            .map_err(|reason| RecoveryError::InvalidConfig {
                component: name.clone(),
                reason,
            })?;

        match self.components.entry(name) {
            Entry::Occupied(entry) => {
                entry.get().replace_config(config);
                Ok(false)
            }
            Entry::Vacant(entry) => {
                let component = ComponentEntry::new(entry.key().clone(), config, self.history_size);
                entry.insert(Arc::new(component));
                Ok(true)
            }
        }
    }

    /// Remove a component and all of its state
    pub fn unregister(&self, name: &str) -> bool {
        self.components.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ComponentEntry>> {
        self.components.get(name).map(|e| Arc::clone(e.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// Registered component names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.components.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::circuit::{CircuitBreakerConfig, CircuitState};
    use crate::config::{ComponentDefinition, RetrySettings};
    use crate::rate_limit::RateLimitConfig;

    fn config(threshold: u32) -> ComponentConfig {
        ComponentConfig::new()
            .with_circuit(CircuitBreakerConfig::new().with_failure_threshold(threshold))
    }

    #[test]
    fn test_register_and_get() {
        let registry = ComponentRegistry::new(10);
        assert!(registry.get("trading").is_none());

        assert!(registry.register("trading", config(3)).unwrap());
        let entry = registry.get("trading").unwrap();
        assert_eq!(entry.name(), "trading");
        assert_eq!(entry.config().circuit.failure_threshold, 3);
        assert_eq!(registry.names(), vec!["trading".to_string()]);
    }

    #[test]
    fn test_replace_keeps_counters() {
        let registry = ComponentRegistry::new(10);
        registry.register("trading", config(5)).unwrap();

        let entry = registry.get("trading").unwrap();
        entry.breaker.record_failure();
        entry.breaker.record_failure();

        assert!(!registry.register("trading", config(3)).unwrap());
        let entry = registry.get("trading").unwrap();
        assert_eq!(entry.breaker.status().consecutive_failures, 2);
        assert_eq!(entry.config().circuit.failure_threshold, 3);

        // The new threshold applies to the next failure
        entry.breaker.record_failure();
        assert_eq!(entry.breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_replace_rebuilds_limiter_only_on_change() {
        let registry = ComponentRegistry::new(10);
        let limited = config(3).with_rate_limit(RateLimitConfig::new(1, Duration::from_secs(60)));
        registry.register("bot", limited.clone()).unwrap();

        let entry = registry.get("bot").unwrap();
        assert!(entry.limiter().unwrap().try_acquire());

        registry.register("bot", limited).unwrap();
        assert!(!entry.limiter().unwrap().try_acquire());

        registry.register("bot", config(3)).unwrap();
        assert!(entry.limiter().is_none());
    }

    #[test]
    fn test_unregister_drops_state() {
        let registry = ComponentRegistry::new(10);
        registry.register("trading", config(1)).unwrap();
        registry.get("trading").unwrap().breaker.record_failure();

        assert!(registry.unregister("trading"));
        assert!(!registry.unregister("trading"));

        registry.register("trading", config(1)).unwrap();
        assert_eq!(
            registry.get("trading").unwrap().breaker.state(),
            CircuitState::Closed
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let registry = ComponentRegistry::new(10);
        let mut bad = ComponentConfig::new().with_retry(RetrySettings::default());
        bad.retry.max_attempts = 0;

        let err = registry.register("broken", bad).unwrap_err();
        assert!(matches!(err, RecoveryError::InvalidConfig { .. }));
        assert!(!registry.contains("broken"));
    }

    #[test]
    fn test_zero_breaker_settings_from_json_rejected() {
        let registry = ComponentRegistry::new(10);
        let definitions = [
            r#"{"name":"x","circuit":{"failure_threshold":1,"cooldown":1000,"half_open_max_probes":0}}"#,
            r#"{"name":"x","circuit":{"failure_threshold":0}}"#,
            r#"{"name":"x","circuit":{"success_threshold":0}}"#,
        ];

        for json in definitions {
            let definition: ComponentDefinition = serde_json::from_str(json).unwrap();
            let (name, config) = definition.into_config();
            let err = registry.register(name, config).unwrap_err();
            assert!(
                matches!(err, RecoveryError::InvalidConfig { ref component, .. } if component == "x"),
                "{json} should be rejected, got {err:?}"
            );
        }
        assert!(!registry.contains("x"));

        let ok: ComponentDefinition =
            serde_json::from_str(r#"{"name":"x","circuit":{"half_open_max_probes":2}}"#).unwrap();
        let (name, config) = ok.into_config();
        assert!(registry.register(name, config).unwrap());
    }
}
