//! Transport over any byte sink

use crate::core::{FormattedEntry, LoggerError, Result, Transport};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;

/// Writes one line per entry to a boxed `Write`
pub struct StreamTransport {
    writer: Mutex<Box<dyn Write + Send>>,
    name: String,
}

impl StreamTransport {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            name: "stream".to_string(),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout()).with_name("stdout")
    }

    pub fn stderr() -> Self {
        Self::new(io::stderr()).with_name("stderr")
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn fail(&self, e: io::Error) -> LoggerError {
        LoggerError::transport(&self.name, e.to_string())
    }
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Transport for StreamTransport {
    fn write(&self, record: &FormattedEntry) -> Result<()> {
        let line = record.output.to_text();
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line).map_err(|e| self.fail(e))
    }

    fn write_batch(&self, records: &[FormattedEntry]) -> Result<()> {
        let mut writer = self.writer.lock();
        for record in records {
            writeln!(writer, "{}", record.output).map_err(|e| self.fail(e))?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.writer.lock().flush().map_err(|e| self.fail(e))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Clonable in-memory byte sink, handy for capturing stream output
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer contents decoded lossily as UTF-8
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LogEntry, LogLevel, Renderable};
    use serde_json::json;

    #[test]
    fn test_writes_lines() {
        let buffer = SharedBuffer::new();
        let transport = StreamTransport::new(buffer.clone());
        let records = [
            FormattedEntry::new(
                LogEntry::new(LogLevel::Info, "one"),
                Renderable::Text("line one".into()),
            ),
            FormattedEntry::new(
                LogEntry::new(LogLevel::Info, "two"),
                Renderable::Structured(json!({"msg": "two"})),
            ),
        ];
        transport.write(&records[0]).unwrap();
        transport.write_batch(&records[1..]).unwrap();
        transport.flush().unwrap();

        assert_eq!(buffer.lines(), vec!["line one", r#"{"msg":"two"}"#]);
    }

    #[test]
    fn test_write_failure_names_transport() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let transport = StreamTransport::new(Broken).with_name("pipe");
        let record = FormattedEntry::new(
            LogEntry::new(LogLevel::Error, "x"),
            Renderable::Text("x".into()),
        );
        let err = transport.write(&record).unwrap_err();
        assert!(matches!(err, LoggerError::Transport { ref name, .. } if name == "pipe"));
    }
}
