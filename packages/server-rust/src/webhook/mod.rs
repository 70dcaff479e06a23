//! Webhook notification sink.
//!
//! - [`message`]: Payload model, color table and the [`Notifier`] delivery seam
//! - [`sink`]: The [`WebhookSink`] decorator and its factories

pub mod message;
pub mod sink;

pub use message::{
    level_color, Attachment, HttpNotifier, Notifier, NotifyError, WebhookMessage, LEVEL_COLORS,
};
pub use sink::{wrapper, wrapper_with_notifier, WebhookSink, WEBHOOK_ERROR_KEY};
