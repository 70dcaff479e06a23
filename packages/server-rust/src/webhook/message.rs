//! Incoming-webhook payload and its delivery.

use std::thread;
use std::time::Duration;

use reqlog_core::Level;
use serde::{Deserialize, Serialize};

/// Fixed severity to attachment-color table.
pub const LEVEL_COLORS: [(Level, &str); 5] = [
    (Level::Debug, "#9B30FF"),
    (Level::Info, "good"),
    (Level::Warn, "warning"),
    (Level::Error, "danger"),
    (Level::Fatal, "danger"),
];

/// Attachment color for `level`, if the table has one.
#[must_use]
pub fn level_color(level: Level) -> Option<&'static str> {
    LEVEL_COLORS
        .iter()
        .find(|(candidate, _)| *candidate == level)
        .map(|(_, color)| *color)
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookMessage {
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub fallback: String,
    pub text: String,
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("webhook delivery thread panicked")]
    Panicked,
}

/// Synchronous delivery of a message to a webhook endpoint.
pub trait Notifier: Send + Sync {
    /// Posts `message` to `url`, returning once the endpoint has answered.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when the request fails or the endpoint answers with a
    /// non-success status.
    fn post(&self, url: &str, message: &WebhookMessage) -> Result<(), NotifyError>;
}

pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Posts JSON over HTTP.
///
/// Each delivery runs a blocking client on a scoped thread, so it may be called
/// from inside an async runtime without stalling the runtime's own blocking rules.
#[derive(Debug, Clone, Copy)]
pub struct HttpNotifier {
    timeout: Duration,
}

impl HttpNotifier {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFY_TIMEOUT)
    }
}

impl Notifier for HttpNotifier {
    fn post(&self, url: &str, message: &WebhookMessage) -> Result<(), NotifyError> {
        let timeout = self.timeout;
        thread::scope(|scope| {
            scope
                .spawn(|| send_blocking(timeout, url, message))
                .join()
                .unwrap_or_else(|_| Err(NotifyError::Panicked))
        })
    }
}

fn send_blocking(timeout: Duration, url: &str, message: &WebhookMessage) -> Result<(), NotifyError> {
    let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
    let response = client.post(url).json(message).send()?;
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    Err(NotifyError::Rejected {
        status: status.as_u16(),
        body: response.text().unwrap_or_default(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
