//! Sink that forwards entries to the `tracing` dispatcher.
//!
//! `tracing` fields are static, so entry fields travel as a single `fields` value
//! holding a JSON object. `Fatal` maps to `tracing::Level::ERROR`.

use std::sync::Arc;

use crate::field::{flatten, Field};
use crate::level::Level;
use crate::sink::{Entry, Sink, SinkError};

/// Target used for every forwarded event.
pub const TARGET: &str = "reqlog";

#[derive(Debug, Clone)]
pub struct TracingSink {
    level: Level,
    context: Vec<Field>,
}

impl TracingSink {
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self {
            level,
            context: Vec::new(),
        }
    }
}

fn render(fields: &[Field]) -> String {
    let object: serde_json::Map<String, serde_json::Value> = flatten(fields)
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_json()))
        .collect();
    serde_json::Value::Object(object).to_string()
}

impl Sink for TracingSink {
    fn enabled(&self, level: Level) -> bool {
        level >= self.level
    }

    fn with(&self, fields: &[Field]) -> Arc<dyn Sink> {
        let mut context = self.context.clone();
        context.extend_from_slice(fields);
        Arc::new(TracingSink {
            level: self.level,
            context,
        })
    }

    fn write(&self, entry: &Entry, fields: &[Field]) -> Result<(), SinkError> {
        let mut all = Vec::with_capacity(self.context.len() + fields.len());
        all.extend_from_slice(&self.context);
        all.extend_from_slice(fields);
        let rendered = render(&all);
        let message = entry.message.as_str();

        match entry.level {
            Level::Debug => tracing::debug!(target: TARGET, fields = %rendered, "{message}"),
            Level::Info => tracing::info!(target: TARGET, fields = %rendered, "{message}"),
            Level::Warn => tracing::warn!(target: TARGET, fields = %rendered, "{message}"),
            Level::Error | Level::Fatal => {
                tracing::error!(target: TARGET, level_name = entry.level.as_str(), fields = %rendered, "{message}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_produces_flat_json_object() {
        let rendered = render(&[
            Field::string("service", "example.Service"),
            Field::int("attempt", 2),
            Field::string("service", "other.Service"),
        ]);
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["service"], "other.Service");
        assert_eq!(value["attempt"], 2);
    }

    #[test]
    fn write_without_subscriber_succeeds() {
        let sink = TracingSink::new(Level::Debug).with(&[Field::string("requestId", "r")]);
        assert!(sink.write(&Entry::new(Level::Fatal, "down"), &[]).is_ok());
    }

    #[test]
    fn level_policy_applies() {
        let sink = TracingSink::new(Level::Info);
        assert!(!sink.enabled(Level::Debug));
        assert!(sink.enabled(Level::Error));
    }
}
