//! Operator alerts for machine faults

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub machine: String,
    pub severity: Severity,
    pub message: String,
}

impl Alert {
    pub fn warning(machine: &str, message: impl Into<String>) -> Self {
        Self {
            machine: machine.to_string(),
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn fatal(machine: &str, message: impl Into<String>) -> Self {
        Self {
            machine: machine.to_string(),
            severity: Severity::Fatal,
            message: message.into(),
        }
    }
}

/// Where operator alerts go
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, alert: Alert);
}

/// Posts alerts to a chat webhook (`{"content": ...}` body). Without a URL
/// alerts are only logged.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }

    async fn post(&self, url: &str, alert: &Alert) -> Result<(), NotifyError> {
        let body = serde_json::json!({
            "content": format!("[{}] {}: {}", severity_label(alert.severity), alert.machine, alert.message),
        });

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(NotifyError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Warning => "WARN",
        Severity::Fatal => "FATAL",
    }
}

#[async_trait]
impl AlertSink for WebhookNotifier {
    async fn send(&self, alert: Alert) {
        match alert.severity {
            Severity::Warning => warn!(machine = %alert.machine, "{}", alert.message),
            Severity::Fatal => error!(machine = %alert.machine, "{}", alert.message),
        }

        let Some(url) = self.url.as_deref() else {
            return;
        };
        if let Err(e) = self.post(url, &alert).await {
            error!(machine = %alert.machine, error = %e, "Failed to deliver operator alert");
        }
    }
}

/// Alert delivery errors
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Webhook returned {status}: {body}")]
    Api { status: u16, body: String },
}
