//! Console transport implementation

use crate::core::{FormattedEntry, LogLevel, Result, Transport};
use std::io::Write;

/// Prints formatter output, one line per entry
///
/// Entries at or above the stderr threshold (`Warn` by default, so `Error`
/// and `Warn`) go to stderr, everything else to stdout. Coloring is the
/// formatter's job.
#[derive(Debug, Clone)]
pub struct ConsoleTransport {
    stderr_threshold: LogLevel,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self {
            stderr_threshold: LogLevel::Warn,
        }
    }

    /// Route levels up to and including `level` to stderr;
    /// `Silent` sends everything to stdout
    #[must_use]
    pub fn with_stderr_threshold(mut self, level: LogLevel) -> Self {
        self.stderr_threshold = level;
        self
    }

    pub fn uses_stderr(&self, level: LogLevel) -> bool {
        LogLevel::should_log(self.stderr_threshold, level)
    }
}

impl Default for ConsoleTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ConsoleTransport {
    fn write(&self, record: &FormattedEntry) -> Result<()> {
        let line = record.output.to_text();
        if self.uses_stderr(record.entry.level) {
            writeln!(std::io::stderr().lock(), "{}", line)?;
        } else {
            writeln!(std::io::stdout().lock(), "{}", line)?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        // Flush both stdout and stderr since we write to both
        std::io::stdout().flush()?;
        std::io::stderr().flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_routing() {
        let console = ConsoleTransport::new();
        assert!(console.uses_stderr(LogLevel::Error));
        assert!(console.uses_stderr(LogLevel::Warn));
        assert!(!console.uses_stderr(LogLevel::Info));
        assert!(!console.uses_stderr(LogLevel::Silly));

        let quiet = ConsoleTransport::new().with_stderr_threshold(LogLevel::Silent);
        assert!(!quiet.uses_stderr(LogLevel::Error));
    }
}
