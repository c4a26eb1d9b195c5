//! Operator notifications.
//!
//! Notifiers are fire-and-forget: delivery failures are logged and never
//! reach the engine or the watcher.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};

use stageline_core::epoch_secs;

const SUCCESS_COLOR: &str = "#36a64f";
const FAILURE_COLOR: &str = "#ff0000";

/// Who asked for what. Copied into every notification about the command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotifyContext {
    /// The command as the operator issued it, e.g. `/promote qa web`.
    pub command: String,
    pub initiator: String,
}

impl NotifyContext {
    pub fn new(command: impl Into<String>, initiator: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            initiator: initiator.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    Failure,
}

/// A rendered notification, as delivered to [`ChannelNotifier`] receivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub severity: Severity,
    pub context: NotifyContext,
    pub message: String,
    pub timestamp: u64,
}

impl Notification {
    pub fn new(severity: Severity, context: &NotifyContext, message: &str) -> Self {
        Self {
            severity,
            context: context.clone(),
            message: message.to_string(),
            timestamp: epoch_secs(),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_success(&self, context: &NotifyContext, message: &str);
    async fn notify_failure(&self, context: &NotifyContext, message: &str);
}

/// Writes notifications to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify_success(&self, context: &NotifyContext, message: &str) {
        info!(command = %context.command, initiator = %context.initiator, "{message}");
    }

    async fn notify_failure(&self, context: &NotifyContext, message: &str) {
        warn!(command = %context.command, initiator = %context.initiator, "{message}");
    }
}

/// Forwards notifications into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            warn!("notification receiver dropped");
        }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify_success(&self, context: &NotifyContext, message: &str) {
        self.send(Notification::new(Severity::Success, context, message));
    }

    async fn notify_failure(&self, context: &NotifyContext, message: &str) {
        self.send(Notification::new(Severity::Failure, context, message));
    }
}

/// Posts Slack-style attachments to an incoming-webhook URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn post(&self, notification: Notification) {
        let payload = webhook_payload(&notification);
        match self.client.post(&self.url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                warn!(status = %resp.status(), command = %notification.context.command, "webhook rejected notification")
            }
            Err(e) => {
                warn!(error = %e, command = %notification.context.command, "failed to post notification")
            }
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_success(&self, context: &NotifyContext, message: &str) {
        self.post(Notification::new(Severity::Success, context, message))
            .await;
    }

    async fn notify_failure(&self, context: &NotifyContext, message: &str) {
        self.post(Notification::new(Severity::Failure, context, message))
            .await;
    }
}

/// Render one attachment: command pretext, colour bar, initiator field.
pub fn webhook_payload(notification: &Notification) -> serde_json::Value {
    let color = match notification.severity {
        Severity::Success => SUCCESS_COLOR,
        Severity::Failure => FAILURE_COLOR,
    };
    json!({
        "attachments": [{
            "pretext": format!("*Command:* `{}`", notification.context.command),
            "text": notification.message,
            "color": color,
            "fields": [{
                "title": "Initializer",
                "value": notification.context.initiator,
                "short": true,
            }],
            "ts": notification.timestamp,
        }]
    })
}
