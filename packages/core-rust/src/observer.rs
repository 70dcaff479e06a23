//! In-memory sink that records entries for inspection in tests.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::field::{Field, Value};
use crate::level::Level;
use crate::sink::{Entry, Sink, SinkError};

/// An entry captured by [`ObservedSink`], with its context and call fields concatenated.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedEntry {
    pub entry: Entry,
    pub context: Vec<Field>,
}

impl LoggedEntry {
    /// Value of the last field named `key`.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.context
            .iter()
            .rev()
            .find(|field| field.key == key)
            .map(|field| &field.value)
    }

    /// Number of fields named `key`.
    #[must_use]
    pub fn count_field(&self, key: &str) -> usize {
        self.context.iter().filter(|field| field.key == key).count()
    }
}

/// Shared view over the entries recorded by an [`ObservedSink`] and its children.
#[derive(Debug, Clone, Default)]
pub struct ObservedLogs {
    entries: Arc<Mutex<Vec<LoggedEntry>>>,
}

impl ObservedLogs {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Snapshot of all entries in write order.
    #[must_use]
    pub fn all(&self) -> Vec<LoggedEntry> {
        self.entries.lock().clone()
    }

    /// Removes and returns all entries.
    #[must_use]
    pub fn take_all(&self) -> Vec<LoggedEntry> {
        std::mem::take(&mut *self.entries.lock())
    }

    #[must_use]
    pub fn filter_level(&self, level: Level) -> Vec<LoggedEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|logged| logged.entry.level == level)
            .cloned()
            .collect()
    }

    /// Entries whose message starts with `prefix`.
    #[must_use]
    pub fn filter_message_prefix(&self, prefix: &str) -> Vec<LoggedEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|logged| logged.entry.message.starts_with(prefix))
            .cloned()
            .collect()
    }
}

/// Sink that keeps every accepted entry in memory.
#[derive(Debug, Clone)]
pub struct ObservedSink {
    level: Level,
    context: Vec<Field>,
    logs: ObservedLogs,
}

impl ObservedSink {
    /// Creates a sink recording entries at `level` and above, and the handle to read them.
    #[must_use]
    pub fn new(level: Level) -> (Self, ObservedLogs) {
        let logs = ObservedLogs::default();
        let sink = Self {
            level,
            context: Vec::new(),
            logs: logs.clone(),
        };
        (sink, logs)
    }
}

impl Sink for ObservedSink {
    fn enabled(&self, level: Level) -> bool {
        level >= self.level
    }

    fn with(&self, fields: &[Field]) -> Arc<dyn Sink> {
        let mut context = self.context.clone();
        context.extend_from_slice(fields);
        Arc::new(ObservedSink {
            level: self.level,
            context,
            logs: self.logs.clone(),
        })
    }

    fn write(&self, entry: &Entry, fields: &[Field]) -> Result<(), SinkError> {
        let mut context = Vec::with_capacity(self.context.len() + fields.len());
        context.extend_from_slice(&self.context);
        context.extend_from_slice(fields);
        self.logs.entries.lock().push(LoggedEntry {
            entry: entry.clone(),
            context,
        });
        Ok(())
    }
}
