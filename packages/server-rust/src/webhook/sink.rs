//! Sink decorator that forwards qualifying entries to a webhook.

use std::fmt;
use std::sync::Arc;

use reqlog_core::field::flatten;
use reqlog_core::{Entry, Field, Level, Sink, SinkError};

use super::message::{level_color, Attachment, HttpNotifier, Notifier, WebhookMessage};

/// Key of the field added to the local entry when delivery fails.
pub const WEBHOOK_ERROR_KEY: &str = "webhook_error";

const WEBHOOK_ERROR_TEXT: &str = "send event to webhook error";

/// Wraps an inner sink. Entries at or above `min_level` are additionally posted to
/// the webhook; the inner sink is always written, and its result is the result of
/// the decorator.
///
/// Context fields added through [`Sink::with`] are kept on the decorator itself, so
/// webhook payloads see the full field history.
pub struct WebhookSink {
    inner: Arc<dyn Sink>,
    notifier: Arc<dyn Notifier>,
    hook_url: Arc<str>,
    min_level: Level,
    fields: Vec<Field>,
}

impl WebhookSink {
    pub fn new(
        inner: Arc<dyn Sink>,
        notifier: Arc<dyn Notifier>,
        hook_url: impl Into<Arc<str>>,
        min_level: Level,
    ) -> Self {
        Self {
            inner,
            notifier,
            hook_url: hook_url.into(),
            min_level,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn min_level(&self) -> Level {
        self.min_level
    }

    fn render(entry: &Entry, fields: &[Field]) -> WebhookMessage {
        let mut text = entry.message.clone();
        for (key, value) in flatten(fields) {
            text.push('\n');
            text.push_str(key);
            text.push_str(": ");
            text.push_str(&value.to_string());
        }
        WebhookMessage {
            attachments: vec![Attachment {
                color: level_color(entry.level).map(str::to_string),
                fallback: entry.message.clone(),
                text,
            }],
        }
    }
}

impl Sink for WebhookSink {
    fn enabled(&self, level: Level) -> bool {
        self.inner.enabled(level)
    }

    fn check(&self, entry: &Entry) -> bool {
        self.inner.check(entry)
    }

    fn with(&self, fields: &[Field]) -> Arc<dyn Sink> {
        let mut accumulated = self.fields.clone();
        accumulated.extend_from_slice(fields);
        Arc::new(WebhookSink {
            inner: self.inner.with(&[]),
            notifier: self.notifier.clone(),
            hook_url: self.hook_url.clone(),
            min_level: self.min_level,
            fields: accumulated,
        })
    }

    fn write(&self, entry: &Entry, fields: &[Field]) -> Result<(), SinkError> {
        let mut merged = Vec::with_capacity(self.fields.len() + fields.len() + 2);
        merged.extend_from_slice(&self.fields);
        merged.extend_from_slice(fields);

        if entry.level >= self.min_level {
            let message = Self::render(entry, &merged);
            if let Err(err) = self.notifier.post(&self.hook_url, &message) {
                merged.push(Field::error(&err));
                merged.push(Field::string(WEBHOOK_ERROR_KEY, WEBHOOK_ERROR_TEXT));
            }
        }

        self.inner.write(entry, &merged)
    }

    fn sync(&self) -> Result<(), SinkError> {
        self.inner.sync()
    }
}

impl fmt::Debug for WebhookSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookSink")
            .field("hook_url", &self.hook_url)
            .field("min_level", &self.min_level)
            .field("fields", &self.fields.len())
            .finish_non_exhaustive()
    }
}

/// Sink factory decorating a sink with webhook delivery over HTTP.
pub fn wrapper(
    hook_url: impl Into<Arc<str>>,
    min_level: Level,
) -> impl Fn(Arc<dyn Sink>) -> Arc<dyn Sink> {
    wrapper_with_notifier(hook_url, min_level, Arc::new(HttpNotifier::default()))
}

/// Like [`wrapper`], delivering through `notifier`.
pub fn wrapper_with_notifier(
    hook_url: impl Into<Arc<str>>,
    min_level: Level,
    notifier: Arc<dyn Notifier>,
) -> impl Fn(Arc<dyn Sink>) -> Arc<dyn Sink> {
    let hook_url: Arc<str> = hook_url.into();
    move |inner: Arc<dyn Sink>| -> Arc<dyn Sink> {
        Arc::new(WebhookSink::new(
            inner,
            notifier.clone(),
            hook_url.clone(),
            min_level,
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
