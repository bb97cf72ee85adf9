//! File transport with size-based rotation
//!
//! Backups are named `<file>.1` (newest) to `<file>.N`; with compression
//! enabled rotated backups become `<file>.N.gz`.

use crate::core::{FormattedEntry, LoggerError, Result, Transport};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const MAX_DELETION_FAILURES: usize = 5;
const COMPRESSION_CHUNK: usize = 64 * 1024;

/// When and how the log file is rotated
///
/// # Examples
///
/// ```
/// use rust_log_pipeline::transports::RotationPolicy;
///
/// // Rotate at 50 MB, keep 3 gzipped backups
/// let policy = RotationPolicy::new()
///     .with_max_bytes(50 * 1024 * 1024)
///     .with_max_backups(3)
///     .with_compression(true);
/// assert_eq!(policy.max_bytes, Some(50 * 1024 * 1024));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Size that triggers rotation; `None` never rotates
    pub max_bytes: Option<u64>,
    pub max_backups: usize,
    pub compress: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: Some(10 * 1024 * 1024),
            max_backups: 5,
            compress: false,
        }
    }
}

impl RotationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain append, no rotation
    pub fn never() -> Self {
        Self {
            max_bytes: None,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes.max(1));
        self
    }

    #[must_use]
    pub fn with_max_backups(mut self, count: usize) -> Self {
        self.max_backups = count;
        self
    }

    #[must_use]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }
}

struct FileState {
    writer: Option<BufWriter<File>>,
    current_size: u64,
    deletion_failures: usize,
}

/// Appends formatter output to a file, one line per entry
///
/// # Example
///
/// ```no_run
/// use rust_log_pipeline::prelude::*;
/// use rust_log_pipeline::transports::{FileTransport, RotationPolicy};
///
/// let file = FileTransport::with_policy(
///     "logs/app.log",
///     RotationPolicy::new().with_max_bytes(1024 * 1024).with_max_backups(3),
/// )?;
/// let logger = Logger::builder().transport(file).build();
/// logger.info("written to logs/app.log");
/// # Ok::<(), rust_log_pipeline::core::LoggerError>(())
/// ```
pub struct FileTransport {
    path: PathBuf,
    policy: RotationPolicy,
    state: Mutex<FileState>,
}

impl FileTransport {
    /// Append-only file with no rotation
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_policy(path, RotationPolicy::never())
    }

    /// Opens (creating parent directories) and appends to `path`
    pub fn with_policy(path: impl AsRef<Path>, policy: RotationPolicy) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                LoggerError::io_operation(
                    "creating log directory",
                    parent.display().to_string(),
                    e,
                )
            })?;
        }
        let (file, size) = open_append(&path)?;

        Ok(Self {
            path,
            policy,
            state: Mutex::new(FileState {
                writer: Some(BufWriter::new(file)),
                current_size: size,
                deletion_failures: 0,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    /// Bytes written to the current file, including what it held on open
    pub fn current_size(&self) -> u64 {
        self.state.lock().current_size
    }

    /// Path of uncompressed backup `index`
    pub fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "app.log".into());
        name.push(format!(".{}", index));
        self.path.with_file_name(name)
    }

    /// Path backup `index` has once compressed
    pub fn compressed_backup_path(&self, index: usize) -> PathBuf {
        Self::compressed_path(&self.backup_path(index))
    }

    fn compressed_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".gz");
        PathBuf::from(name)
    }

    fn should_rotate(&self, state: &FileState, incoming: u64) -> bool {
        match self.policy.max_bytes {
            Some(max) => state.current_size > 0 && state.current_size + incoming > max,
            None => false,
        }
    }

    fn write_line(&self, state: &mut FileState, line: &str) -> Result<()> {
        let bytes = line.len() as u64 + 1;
        if self.should_rotate(state, bytes) {
            if let Err(e) = self.rotate(state) {
                eprintln!(
                    "[LOGGER WARNING] Rotation of {} failed: {}. Continuing with current file.",
                    self.path.display(),
                    e
                );
                if state.writer.is_none() {
                    let (file, size) = open_append(&self.path)?;
                    state.writer = Some(BufWriter::new(file));
                    state.current_size = size;
                }
                // let the file outgrow the limit instead of retrying every line
                state.current_size = 0;
            }
        }

        let writer = state
            .writer
            .as_mut()
            .ok_or_else(|| LoggerError::transport("file", "writer not initialized"))?;
        writeln!(writer, "{}", line).map_err(|e| {
            LoggerError::io_operation("writing log entry", self.path.display().to_string(), e)
        })?;
        state.current_size += bytes;
        Ok(())
    }

    fn rotate(&self, state: &mut FileState) -> Result<()> {
        if let Some(mut writer) = state.writer.take() {
            writer.flush().map_err(|e| {
                LoggerError::io_operation(
                    "flushing before rotation",
                    self.path.display().to_string(),
                    e,
                )
            })?;
        }

        if self.policy.max_backups == 0 {
            let file = File::create(&self.path).map_err(|e| {
                LoggerError::io_operation("truncating log file", self.path.display().to_string(), e)
            })?;
            state.writer = Some(BufWriter::new(file));
            state.current_size = 0;
            return Ok(());
        }

        self.remove_oldest(state)?;

        for index in (1..self.policy.max_backups).rev() {
            let from = self.backup_path(index);
            let to = self.backup_path(index + 1);
            let (from_gz, to_gz) = (Self::compressed_path(&from), Self::compressed_path(&to));
            if from_gz.exists() {
                rename_replacing(&from_gz, &to_gz)?;
            }
            if from.exists() {
                rename_replacing(&from, &to)?;
            }
        }

        let first = self.backup_path(1);
        if self.path.exists() {
            rename_replacing(&self.path, &first)?;
            if self.policy.compress {
                compress_file(&first, &Self::compressed_path(&first))?;
            }
        }

        let (file, size) = open_append(&self.path)?;
        state.writer = Some(BufWriter::new(file));
        state.current_size = size;
        Ok(())
    }

    fn remove_oldest(&self, state: &mut FileState) -> Result<()> {
        let oldest = self.backup_path(self.policy.max_backups);
        let mut failed = false;
        for candidate in [Self::compressed_path(&oldest), oldest] {
            if !candidate.exists() {
                continue;
            }
            if let Err(e) = fs::remove_file(&candidate) {
                failed = true;
                eprintln!(
                    "[LOGGER WARNING] Failed to remove oldest backup {}: {} (failure #{}/{})",
                    candidate.display(),
                    e,
                    state.deletion_failures + 1,
                    MAX_DELETION_FAILURES
                );
            }
        }

        if !failed {
            state.deletion_failures = 0;
            return Ok(());
        }
        state.deletion_failures += 1;
        if state.deletion_failures >= MAX_DELETION_FAILURES {
            return Err(LoggerError::transport(
                "file",
                format!(
                    "rotation aborted: could not delete old backups {} consecutive times",
                    state.deletion_failures
                ),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for FileTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTransport")
            .field("path", &self.path)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn open_append(path: &Path) -> Result<(File, u64)> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LoggerError::io_operation("opening log file", path.display().to_string(), e))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

fn rename_replacing(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // some platforms refuse to rename over an existing file
    if to.exists() {
        let _ = fs::remove_file(to);
    }
    fs::rename(from, to).map_err(|e| {
        LoggerError::io_operation(
            "rotating log file",
            format!("{} -> {}", from.display(), to.display()),
            e,
        )
    })
}

/// Streams `path` into `gz_path` through a temp file; the source is removed
/// only once the archive is complete
fn compress_file(path: &Path, gz_path: &Path) -> Result<()> {
    let mut temp_name = gz_path.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let cleanup = |e: std::io::Error, operation: &str| {
        let _ = fs::remove_file(&temp_path);
        LoggerError::io_operation(operation, temp_path.display().to_string(), e)
    };

    let input = File::open(path)
        .map_err(|e| LoggerError::io_operation("compressing log file", path.display().to_string(), e))?;
    let output = File::create(&temp_path).map_err(|e| cleanup(e, "creating archive"))?;

    let mut reader = BufReader::with_capacity(COMPRESSION_CHUNK, input);
    let mut encoder = flate2::write::GzEncoder::new(
        BufWriter::with_capacity(COMPRESSION_CHUNK, output),
        flate2::Compression::default(),
    );
    let mut chunk = vec![0u8; COMPRESSION_CHUNK];
    loop {
        let read = reader.read(&mut chunk).map_err(|e| cleanup(e, "reading backup"))?;
        if read == 0 {
            break;
        }
        encoder
            .write_all(&chunk[..read])
            .map_err(|e| cleanup(e, "writing archive"))?;
    }
    encoder
        .finish()
        .and_then(|mut out| out.flush())
        .map_err(|e| cleanup(e, "finishing archive"))?;

    fs::rename(&temp_path, gz_path).map_err(|e| cleanup(e, "moving archive into place"))?;

    if let Err(e) = fs::remove_file(path) {
        eprintln!(
            "[LOGGER WARNING] Compressed {} but could not remove the original: {}",
            path.display(),
            e
        );
    }
    Ok(())
}

impl Transport for FileTransport {
    fn write(&self, record: &FormattedEntry) -> Result<()> {
        let line = record.output.to_text();
        let mut state = self.state.lock();
        self.write_line(&mut state, &line)
    }

    fn write_batch(&self, records: &[FormattedEntry]) -> Result<()> {
        let mut state = self.state.lock();
        for record in records {
            self.write_line(&mut state, &record.output.to_text())?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(ref mut writer) = state.writer {
            writer.flush().map_err(|e| {
                LoggerError::io_operation("flushing log file", self.path.display().to_string(), e)
            })?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}

impl Drop for FileTransport {
    fn drop(&mut self) {
        if let Some(mut writer) = self.state.get_mut().writer.take() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LogEntry, LogLevel, Renderable};
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    fn record(text: &str) -> FormattedEntry {
        FormattedEntry::new(
            LogEntry::new(LogLevel::Info, text),
            Renderable::Text(text.to_string()),
        )
    }

    #[test]
    fn test_appends_lines_and_creates_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/app.log");
        let transport = FileTransport::new(&path).unwrap();

        transport.write(&record("first")).unwrap();
        transport.write(&record("second")).unwrap();
        transport.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
        assert_eq!(transport.current_size(), 13);
    }

    #[test]
    fn test_reopen_continues_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        {
            let transport = FileTransport::new(&path).unwrap();
            transport.write(&record("before")).unwrap();
        }
        let transport = FileTransport::new(&path).unwrap();
        assert_eq!(transport.current_size(), 7);
        transport.write(&record("after")).unwrap();
        transport.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "before\nafter\n");
    }

    #[test]
    fn test_rotation_keeps_max_backups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let policy = RotationPolicy::new().with_max_bytes(10).with_max_backups(2);
        let transport = FileTransport::with_policy(&path, policy).unwrap();

        // every 9-byte line fills the file, so each new line rotates
        for i in 0..5 {
            transport.write(&record(&format!("line-{:03}", i))).unwrap();
        }
        transport.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "line-004\n");
        assert_eq!(
            fs::read_to_string(transport.backup_path(1)).unwrap(),
            "line-003\n"
        );
        assert_eq!(
            fs::read_to_string(transport.backup_path(2)).unwrap(),
            "line-002\n"
        );
        assert!(!transport.backup_path(3).exists());
    }

    #[test]
    fn test_rotation_without_backups_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let policy = RotationPolicy::new().with_max_bytes(10).with_max_backups(0);
        let transport = FileTransport::with_policy(&path, policy).unwrap();

        transport.write(&record("line-one")).unwrap();
        transport.write(&record("line-two")).unwrap();
        transport.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "line-two\n");
        assert!(!transport.backup_path(1).exists());
    }

    #[test]
    fn test_compressed_backups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let policy = RotationPolicy::new()
            .with_max_bytes(10)
            .with_max_backups(2)
            .with_compression(true);
        let transport = FileTransport::with_policy(&path, policy).unwrap();

        for i in 0..3 {
            transport.write(&record(&format!("line-{:03}", i))).unwrap();
        }
        transport.flush().unwrap();

        let newest = transport.compressed_backup_path(1);
        assert!(newest.exists());
        assert!(!transport.backup_path(1).exists());

        let mut text = String::new();
        GzDecoder::new(File::open(&newest).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "line-001\n");
        assert!(transport.compressed_backup_path(2).exists());
    }

    #[test]
    fn test_never_rotates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let transport = FileTransport::new(&path).unwrap();
        for i in 0..100 {
            transport.write(&record(&format!("entry {}", i))).unwrap();
        }
        transport.flush().unwrap();
        assert!(!transport.backup_path(1).exists());
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 100);
    }
}
