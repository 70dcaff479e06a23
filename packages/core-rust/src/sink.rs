//! The sink capability and the `Tee` sink chain.
//!
//! A [`Sink`] is the unit a [`Logger`](crate::Logger) writes through. Sinks own their
//! severity policy (`enabled`), accumulate context fields (`with`) and encode or
//! forward entries (`write`). Decorators wrap another `Arc<dyn Sink>` and enumerate
//! this exact surface rather than inheriting anything from the wrapped value.

use std::sync::Arc;
use std::time::SystemTime;

use crate::field::Field;
use crate::level::Level;

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// A single log event, without its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub level: Level,
    pub message: String,
    pub time: SystemTime,
}

impl Entry {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            time: SystemTime::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sink trait
// ---------------------------------------------------------------------------

/// Errors raised while writing an entry to a sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("sink encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{} of the chained sinks failed: {}", .0.len(), join_errors(.0))]
    Chain(Vec<SinkError>),
}

fn join_errors(errors: &[SinkError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Destination for log entries.
pub trait Sink: Send + Sync {
    /// Whether entries at `level` are recorded by this sink.
    fn enabled(&self, level: Level) -> bool;

    /// Decides whether `entry` should be written. Defaults to the level policy.
    fn check(&self, entry: &Entry) -> bool {
        self.enabled(entry.level)
    }

    /// Returns a child sink with `fields` added to its context.
    fn with(&self, fields: &[Field]) -> Arc<dyn Sink>;

    /// Writes `entry` with its call-site `fields`.
    ///
    /// # Errors
    ///
    /// Returns an error when the entry could not be recorded.
    fn write(&self, entry: &Entry, fields: &[Field]) -> Result<(), SinkError>;

    /// Flushes buffered output.
    ///
    /// # Errors
    ///
    /// Returns an error when the flush fails.
    fn sync(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// NopSink
// ---------------------------------------------------------------------------

/// Sink that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopSink;

impl Sink for NopSink {
    fn enabled(&self, _level: Level) -> bool {
        false
    }

    fn with(&self, _fields: &[Field]) -> Arc<dyn Sink> {
        Arc::new(NopSink)
    }

    fn write(&self, _entry: &Entry, _fields: &[Field]) -> Result<(), SinkError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tee
// ---------------------------------------------------------------------------

/// Ordered fan-out over several sinks.
///
/// Each sink applies its own severity policy: an entry is written to every sink whose
/// `check` accepts it. A failing sink does not stop the remaining ones.
#[derive(Clone)]
pub struct Tee {
    sinks: Vec<Arc<dyn Sink>>,
}

impl Tee {
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self { sinks }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Sink for Tee {
    fn enabled(&self, level: Level) -> bool {
        self.sinks.iter().any(|sink| sink.enabled(level))
    }

    fn check(&self, entry: &Entry) -> bool {
        self.sinks.iter().any(|sink| sink.check(entry))
    }

    fn with(&self, fields: &[Field]) -> Arc<dyn Sink> {
        Arc::new(Tee {
            sinks: self.sinks.iter().map(|sink| sink.with(fields)).collect(),
        })
    }

    fn write(&self, entry: &Entry, fields: &[Field]) -> Result<(), SinkError> {
        let errors: Vec<SinkError> = self
            .sinks
            .iter()
            .filter(|sink| sink.check(entry))
            .filter_map(|sink| sink.write(entry, fields).err())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SinkError::Chain(errors))
        }
    }

    fn sync(&self) -> Result<(), SinkError> {
        let errors: Vec<SinkError> = self
            .sinks
            .iter()
            .filter_map(|sink| sink.sync().err())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SinkError::Chain(errors))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::ObservedSink;

    /// Sink that accepts everything and always fails.
    struct FailingSink;

    impl Sink for FailingSink {
        fn enabled(&self, _level: Level) -> bool {
            true
        }

        fn with(&self, _fields: &[Field]) -> Arc<dyn Sink> {
            Arc::new(FailingSink)
        }

        fn write(&self, _entry: &Entry, _fields: &[Field]) -> Result<(), SinkError> {
            Err(SinkError::Io(std::io::Error::other("disk full")))
        }
    }

    #[test]
    fn tee_respects_each_sink_level() {
        let (debug_sink, debug_logs) = ObservedSink::new(Level::Debug);
        let (error_sink, error_logs) = ObservedSink::new(Level::Error);
        let tee = Tee::new(vec![Arc::new(debug_sink), Arc::new(error_sink)]);

        let entry = Entry::new(Level::Info, "hello");
        assert!(tee.check(&entry));
        tee.write(&entry, &[]).unwrap();

        assert_eq!(debug_logs.len(), 1);
        assert_eq!(error_logs.len(), 0);
    }

    #[test]
    fn tee_keeps_writing_after_a_failure() {
        let (observed, logs) = ObservedSink::new(Level::Debug);
        let tee = Tee::new(vec![Arc::new(FailingSink), Arc::new(observed)]);

        let err = tee.write(&Entry::new(Level::Warn, "careful"), &[]).unwrap_err();
        assert!(matches!(err, SinkError::Chain(ref errors) if errors.len() == 1));
        assert!(err.to_string().contains("disk full"));
        assert_eq!(logs.len(), 1);
    }

    #[test]
    fn tee_with_propagates_fields_to_every_sink() {
        let (first, first_logs) = ObservedSink::new(Level::Debug);
        let (second, second_logs) = ObservedSink::new(Level::Debug);
        let tee = Tee::new(vec![Arc::new(first), Arc::new(second)]);

        let child = tee.with(&[Field::string("requestId", "abc")]);
        child.write(&Entry::new(Level::Info, "hi"), &[]).unwrap();

        for logs in [first_logs, second_logs] {
            let all = logs.all();
            assert_eq!(all[0].field("requestId").and_then(|v| v.as_str()), Some("abc"));
        }
    }

    #[test]
    fn nop_sink_is_disabled() {
        assert!(!NopSink.enabled(Level::Fatal));
        assert!(NopSink.write(&Entry::new(Level::Fatal, "x"), &[]).is_ok());
    }
}
