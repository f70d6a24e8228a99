//! Per-component sliding-window rate limit

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::{duration_millis, option_duration_millis};

/// Sliding-window limit: at most `max_calls` admissions per `window`,
/// optionally spaced at least `min_interval` apart
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    pub max_calls: u32,

    #[serde(with = "duration_millis")]
    pub window: Duration,

    #[serde(default, with = "option_duration_millis")]
    pub min_interval: Option<Duration>,
}

impl RateLimitConfig {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            min_interval: None,
        }
    }

    /// Require a minimum gap between consecutive admissions
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = Some(interval);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.max_calls == 0 {
            return Err("rate_limit.max_calls must be at least 1".into());
        }
        if self.window.is_zero() {
            return Err("rate_limit.window must be non-zero".into());
        }
        Ok(())
    }
}

/// Admission timestamps within the current window
#[derive(Debug)]
pub struct SlidingWindow {
    config: RateLimitConfig,
    admitted: Mutex<VecDeque<Instant>>,
}

impl SlidingWindow {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            admitted: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admit and record a call, or refuse it
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> bool {
        let mut admitted = self.admitted.lock();

        while let Some(oldest) = admitted.front() {
            if now.saturating_duration_since(*oldest) >= self.config.window {
                admitted.pop_front();
            } else {
                break;
            }
        }

        if let (Some(gap), Some(last)) = (self.config.min_interval, admitted.back()) {
            if now.saturating_duration_since(*last) < gap {
                return false;
            }
        }

        if admitted.len() >= self.config.max_calls as usize {
            return false;
        }

        admitted.push_back(now);
        true
    }

    /// Admissions currently counted against the window
    pub fn in_window(&self) -> usize {
        self.admitted.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_within_window() {
        let window = SlidingWindow::new(RateLimitConfig::new(2, Duration::from_secs(60)));
        let now = Instant::now();

        assert!(window.try_acquire_at(now));
        assert!(window.try_acquire_at(now + Duration::from_secs(1)));
        assert!(!window.try_acquire_at(now + Duration::from_secs(2)));
        assert_eq!(window.in_window(), 2);
    }

    #[test]
    fn test_window_slides() {
        let window = SlidingWindow::new(RateLimitConfig::new(2, Duration::from_secs(60)));
        let now = Instant::now();

        assert!(window.try_acquire_at(now));
        assert!(window.try_acquire_at(now + Duration::from_secs(30)));
        assert!(!window.try_acquire_at(now + Duration::from_secs(59)));
        // The first admission has aged out
        assert!(window.try_acquire_at(now + Duration::from_secs(60)));
        assert!(!window.try_acquire_at(now + Duration::from_secs(61)));
    }

    #[test]
    fn test_min_interval() {
        let config = RateLimitConfig::new(10, Duration::from_secs(60))
            .with_min_interval(Duration::from_secs(10));
        let window = SlidingWindow::new(config);
        let now = Instant::now();

        assert!(window.try_acquire_at(now));
        assert!(!window.try_acquire_at(now + Duration::from_secs(5)));
        assert!(window.try_acquire_at(now + Duration::from_secs(10)));
    }

    #[test]
    fn test_refusals_are_not_recorded() {
        let window = SlidingWindow::new(RateLimitConfig::new(1, Duration::from_secs(10)));
        let now = Instant::now();

        assert!(window.try_acquire_at(now));
        for s in 1..10 {
            assert!(!window.try_acquire_at(now + Duration::from_secs(s)));
        }
        assert!(window.try_acquire_at(now + Duration::from_secs(10)));
    }

    #[test]
    fn test_validate() {
        assert!(RateLimitConfig::new(0, Duration::from_secs(1)).validate().is_err());
        assert!(RateLimitConfig::new(1, Duration::ZERO).validate().is_err());
        assert!(RateLimitConfig::new(5, Duration::from_secs(1)).validate().is_ok());
    }

    #[test]
    fn test_config_json() {
        let config: RateLimitConfig =
            serde_json::from_str(r#"{"max_calls": 5, "window": 60000}"#).unwrap();
        assert_eq!(config.window, Duration::from_secs(60));
        assert_eq!(config.min_interval, None);
    }
}
