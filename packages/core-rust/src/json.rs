//! JSON-lines sink for production output.

use std::io::Write;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use parking_lot::Mutex;

use crate::field::Field;
use crate::level::Level;
use crate::sink::{Entry, Sink, SinkError};

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Writes one JSON object per entry: `level`, `ts`, `msg`, then context fields and
/// call fields in order.
///
/// Duplicate keys are written as they occur; readers keep the last one.
#[derive(Clone)]
pub struct JsonSink {
    writer: SharedWriter,
    level: Level,
    context: Vec<Field>,
}

impl JsonSink {
    pub fn new<W: Write + Send + 'static>(writer: W, level: Level) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
            level,
            context: Vec::new(),
        }
    }

    /// Sink writing to standard output.
    #[must_use]
    pub fn stdout(level: Level) -> Self {
        Self::new(std::io::stdout(), level)
    }

    fn encode(&self, entry: &Entry, fields: &[Field]) -> Result<String, SinkError> {
        let ts = entry
            .time
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |d| d.as_secs_f64());

        let mut line = String::with_capacity(128);
        line.push_str("{\"level\":");
        line.push_str(&serde_json::to_string(entry.level.as_str())?);
        line.push_str(",\"ts\":");
        line.push_str(&serde_json::to_string(&ts)?);
        line.push_str(",\"msg\":");
        line.push_str(&serde_json::to_string(&entry.message)?);
        for field in self.context.iter().chain(fields) {
            line.push(',');
            line.push_str(&serde_json::to_string(field.key.as_ref())?);
            line.push(':');
            line.push_str(&serde_json::to_string(&field.value.to_json())?);
        }
        line.push_str("}\n");
        Ok(line)
    }
}

impl Sink for JsonSink {
    fn enabled(&self, level: Level) -> bool {
        level >= self.level
    }

    fn with(&self, fields: &[Field]) -> Arc<dyn Sink> {
        let mut child = self.clone();
        child.context.extend_from_slice(fields);
        Arc::new(child)
    }

    fn write(&self, entry: &Entry, fields: &[Field]) -> Result<(), SinkError> {
        let line = self.encode(entry, fields)?;
        self.writer.lock().write_all(line.as_bytes())?;
        Ok(())
    }

    fn sync(&self) -> Result<(), SinkError> {
        self.writer.lock().flush()?;
        Ok(())
    }
}
