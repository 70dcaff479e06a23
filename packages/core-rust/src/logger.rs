//! The immutable, cheaply cloneable logger handle.

use std::fmt;
use std::sync::Arc;

use crate::field::{Field, Value};
use crate::level::Level;
use crate::sink::{Entry, NopSink, Sink};

/// Logger pre-bound with a set of context fields.
///
/// `with` never mutates the receiver: it returns a new logger whose sink is the
/// receiver's sink extended with the new fields. Clones share the same sink.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn Sink>,
    fields: Arc<[Field]>,
}

impl Logger {
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self {
            sink,
            fields: Arc::from(Vec::new()),
        }
    }

    /// Logger that discards everything.
    #[must_use]
    pub fn nop() -> Self {
        Self::new(Arc::new(NopSink))
    }

    /// Returns a child logger carrying `fields` in addition to the current ones.
    #[must_use]
    pub fn with(&self, fields: &[Field]) -> Self {
        if fields.is_empty() {
            return self.clone();
        }
        let mut all = Vec::with_capacity(self.fields.len() + fields.len());
        all.extend_from_slice(&self.fields);
        all.extend_from_slice(fields);
        Self {
            sink: self.sink.with(fields),
            fields: Arc::from(all),
        }
    }

    /// Context fields bound to this logger, oldest first.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Value of the most recently bound field named `key`.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields
            .iter()
            .rev()
            .find(|field| field.key == key)
            .map(|field| &field.value)
    }

    #[must_use]
    pub fn sink(&self) -> &Arc<dyn Sink> {
        &self.sink
    }

    #[must_use]
    pub fn enabled(&self, level: Level) -> bool {
        self.sink.enabled(level)
    }

    /// Writes an entry if the sink accepts it. Sink failures are reported through
    /// `tracing` and never returned to the caller.
    pub fn log(&self, level: Level, message: impl Into<String>, fields: &[Field]) {
        let entry = Entry::new(level, message);
        if !self.sink.check(&entry) {
            return;
        }
        if let Err(err) = self.sink.write(&entry, fields) {
            tracing::warn!(error = %err, level = %level, "log sink write failed");
        }
    }

    pub fn debug(&self, message: impl Into<String>, fields: &[Field]) {
        self.log(Level::Debug, message, fields);
    }

    pub fn info(&self, message: impl Into<String>, fields: &[Field]) {
        self.log(Level::Info, message, fields);
    }

    pub fn warn(&self, message: impl Into<String>, fields: &[Field]) {
        self.log(Level::Warn, message, fields);
    }

    pub fn error(&self, message: impl Into<String>, fields: &[Field]) {
        self.log(Level::Error, message, fields);
    }

    /// Records at `Fatal` severity. The process keeps running.
    pub fn fatal(&self, message: impl Into<String>, fields: &[Field]) {
        self.log(Level::Fatal, message, fields);
    }

    /// Flushes the underlying sink, reporting failures through `tracing`.
    pub fn sync(&self) {
        if let Err(err) = self.sink.sync() {
            tracing::warn!(error = %err, "log sink sync failed");
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}
