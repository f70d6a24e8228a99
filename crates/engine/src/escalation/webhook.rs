// Webhook escalation notifier
//
// Posts the escalated call's context as JSON to an HTTP endpoint (a chat
// relay, a pager bridge, ...). Repeated alerts for the same component,
// error kind and operation are suppressed for a cooldown period.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{EscalationError, EscalationHandler};
use crate::context::RecoveryContext;
use crate::error::Severity;

/// Webhook notifier configuration
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Endpoint receiving POSTed alerts
    pub url: String,

    /// Minimum time between alerts sharing a dedup key
    pub cooldown: Duration,

    /// Alerts below this severity are dropped
    pub min_severity: Severity,

    /// HTTP request timeout
    pub timeout: Duration,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cooldown: Duration::from_secs(300),
            min_severity: Severity::Warning,
            timeout: Duration::from_secs(10),
        }
    }

    /// Create configuration from environment variables
    ///
    /// Returns None if `RECOVERY_ESCALATION_WEBHOOK_URL` is not set.
    /// `RECOVERY_ESCALATION_COOLDOWN_SECS` overrides the 300s cooldown and
    /// `RECOVERY_ESCALATION_MIN_SEVERITY` (debug/info/warning/error/critical)
    /// the severity floor.
    pub fn from_env() -> Option<Self> {
        let url = env::var("RECOVERY_ESCALATION_WEBHOOK_URL").ok()?;
        if url.is_empty() {
            return None;
        }

        let mut config = Self::new(url);
        if let Some(secs) = env::var("RECOVERY_ESCALATION_COOLDOWN_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.cooldown = Duration::from_secs(secs);
        }
        if let Some(severity) = env::var("RECOVERY_ESCALATION_MIN_SEVERITY")
            .ok()
            .and_then(|v| serde_json::from_value(serde_json::Value::String(v.to_lowercase())).ok())
        {
            config.min_severity = severity;
        }
        Some(config)
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: String,
    severity: Severity,
    context: &'a RecoveryContext,
}

/// Escalation handler that POSTs alerts to a webhook
pub struct WebhookNotifier {
    config: WebhookConfig,
    client: Client,
    last_sent: Mutex<HashMap<String, Instant>>,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> Result<Self, EscalationError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EscalationError::Config(e.to_string()))?;

        Ok(Self {
            config,
            client,
            last_sent: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// Dedup key: component, error kind and operation
    fn alert_key(context: &RecoveryContext) -> String {
        let kind = context
            .last_error()
            .map(|e| e.kind.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        format!("{}:{}:{}", context.component, kind, context.operation)
    }

    /// Claim `key` for one send; `None` while an earlier alert is in cooldown
    ///
    /// Returns the previous send time so a failed send can hand it back.
    fn reserve(&self, key: &str, now: Instant) -> Option<Option<Instant>> {
        let mut last_sent = self.last_sent.lock();
        let previous = last_sent.get(key).copied();
        if previous.is_some_and(|at| now.saturating_duration_since(at) < self.config.cooldown) {
            return None;
        }
        last_sent.insert(key.to_string(), now);
        Some(previous)
    }

    fn release(&self, key: &str, previous: Option<Instant>) {
        let mut last_sent = self.last_sent.lock();
        match previous {
            Some(at) => {
                last_sent.insert(key.to_string(), at);
            }
            None => {
                last_sent.remove(key);
            }
        }
    }

    async fn deliver(&self, payload: &WebhookPayload<'_>) -> Result<(), EscalationError> {
        let response = self
            .client
            .post(&self.config.url)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EscalationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    fn message(context: &RecoveryContext, severity: Severity) -> String {
        let last_error = context
            .last_error()
            .map(ToString::to_string)
            .unwrap_or_else(|| "no error recorded".to_string());
        format!(
            "[{}] {}.{} {} after {} attempt(s): {}",
            severity.to_string().to_uppercase(),
            context.component,
            context.operation,
            context.outcome,
            context.attempts,
            last_error
        )
    }
}

#[async_trait]
impl EscalationHandler for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn escalate(&self, context: &RecoveryContext) -> Result<(), EscalationError> {
        let severity = context.severity().unwrap_or(Severity::Error);
        if severity < self.config.min_severity {
            debug!(component = %context.component, %severity, "Below alert threshold");
            return Ok(());
        }

        let key = Self::alert_key(context);
        let Some(previous) = self.reserve(&key, Instant::now()) else {
            debug!(key = %key, "Alert suppressed by cooldown");
            return Ok(());
        };

        let payload = WebhookPayload {
            text: Self::message(context, severity),
            severity,
            context,
        };

        if let Err(e) = self.deliver(&payload).await {
            self.release(&key, previous);
            return Err(e);
        }

        info!(component = %context.component, operation = %context.operation, "Escalation alert sent");
        Ok(())
    }
}
