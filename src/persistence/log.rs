//! Append-only event token log.
//!
//! Each ingestion request appends one block: the newline-terminated tokens
//! of its batch. Blocks are written whole or not at all:
//! - An exclusive lock serializes physical appends, so blocks never interleave
//! - A failed write truncates the file back to its length before the block
//!
//! # Provisioning
//!
//! The log file must already exist. A missing file is reported as
//! [`AppendLogError::Missing`] instead of being created, so a deployment that
//! forgot to provision the log fails loudly.
//!
//! # fsync Strategy
//!
//! Every block is synced before `append` returns.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::{trace, warn};

/// Errors that can occur while appending to the log.
#[derive(Debug, Error)]
pub enum AppendLogError {
    /// The log file has not been provisioned.
    #[error("log file does not exist: {}", .0.display())]
    Missing(PathBuf),

    /// The log path exists but is not a regular file.
    #[error("log path is not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    /// IO error during the append.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for log operations.
pub type Result<T> = std::result::Result<T, AppendLogError>;

/// Where a block landed in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendReceipt {
    /// Byte offset of the first byte of the block.
    pub offset: u64,
    /// Length of the block in bytes.
    pub bytes: u64,
}

/// Destination for extracted event tokens.
///
/// The ingestion endpoint only depends on this trait, which keeps the
/// storage step swappable in tests.
pub trait BatchSink: Send + Sync {
    /// Appends `content` as one contiguous block.
    fn append(&self, content: &str) -> Result<AppendReceipt>;
}

/// An append-only text log at a fixed path.
#[derive(Debug)]
pub struct AppendLog {
    /// Path to the log file.
    path: PathBuf,
    /// Held for the duration of one physical append.
    lock: Mutex<()>,
}

impl AppendLog {
    /// Creates a writer for the log at `path`. Does not touch the filesystem.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        AppendLog {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Returns the path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the log file has been provisioned.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Appends `content` to the log as one block.
    ///
    /// Empty content writes nothing but still requires the log to exist.
    ///
    /// # Errors
    ///
    /// Returns `AppendLogError::Missing` if the file does not exist,
    /// `AppendLogError::NotAFile` if the path is a directory or similar, and
    /// `AppendLogError::Io` if the write or fsync fails. After a failed write
    /// the file is truncated back to its previous length.
    pub fn append(&self, content: &str) -> Result<AppendReceipt> {
        // The guard protects no data, so a poisoned lock is still usable.
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        self.check_provisioned()?;

        let mut file = match OpenOptions::new().append(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(AppendLogError::Missing(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let offset = file.metadata()?.len();
        if content.is_empty() {
            return Ok(AppendReceipt { offset, bytes: 0 });
        }

        let written = file
            .write_all(content.as_bytes())
            .and_then(|()| file.sync_all());

        if let Err(e) = written {
            if let Err(rollback) = file.set_len(offset) {
                warn!(
                    path = %self.path.display(),
                    offset,
                    error = %rollback,
                    "Failed to roll back partial append"
                );
            }
            return Err(e.into());
        }

        trace!(path = %self.path.display(), offset, bytes = content.len(), "Appended block");

        Ok(AppendReceipt {
            offset,
            bytes: content.len() as u64,
        })
    }

    fn check_provisioned(&self) -> Result<()> {
        match fs::metadata(&self.path) {
            Ok(meta) if meta.is_file() => Ok(()),
            Ok(_) => Err(AppendLogError::NotAFile(self.path.clone())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(AppendLogError::Missing(self.path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl BatchSink for AppendLog {
    fn append(&self, content: &str) -> Result<AppendReceipt> {
        AppendLog::append(self, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs::File;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn provisioned_log(dir: &Path) -> AppendLog {
        let path = dir.join("batch_content.txt");
        File::create(&path).unwrap();
        AppendLog::new(path)
    }

    // ─── Basic functionality tests ───

    #[test]
    fn append_writes_block() {
        let dir = tempdir().unwrap();
        let log = provisioned_log(dir.path());

        let receipt = log.append("a\nb\nc\n").unwrap();

        assert_eq!(receipt, AppendReceipt { offset: 0, bytes: 6 });
        assert_eq!(fs::read_to_string(log.path()).unwrap(), "a\nb\nc\n");
    }

    #[test]
    fn blocks_are_contiguous_and_ordered() {
        let dir = tempdir().unwrap();
        let log = provisioned_log(dir.path());

        log.append("a\nb\nc\n").unwrap();
        let second = log.append("d\n").unwrap();

        assert_eq!(second.offset, 6);
        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().collect::<Vec<_>>(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn existing_content_is_preserved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("batch_content.txt");
        fs::write(&path, "header line\n").unwrap();
        let log = AppendLog::new(&path);

        let receipt = log.append("x\n").unwrap();

        assert_eq!(receipt.offset, 12);
        assert_eq!(fs::read_to_string(&path).unwrap(), "header line\nx\n");
    }

    #[test]
    fn empty_content_writes_nothing() {
        let dir = tempdir().unwrap();
        let log = provisioned_log(dir.path());
        log.append("a\n").unwrap();

        let receipt = log.append("").unwrap();

        assert_eq!(receipt, AppendReceipt { offset: 2, bytes: 0 });
        assert_eq!(fs::read_to_string(log.path()).unwrap(), "a\n");
    }

    // ─── Provisioning tests ───

    #[test]
    fn missing_file_is_not_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("batch_content.txt");
        let log = AppendLog::new(&path);

        assert!(!log.exists());
        let err = log.append("a\n").unwrap_err();

        assert!(matches!(err, AppendLogError::Missing(p) if p == path));
        assert!(!path.exists(), "append must never create the log");
    }

    #[test]
    fn directory_is_rejected() {
        let dir = tempdir().unwrap();
        let log = AppendLog::new(dir.path());

        let err = log.append("a\n").unwrap_err();
        assert!(matches!(err, AppendLogError::NotAFile(_)));
    }

    #[test]
    fn works_through_trait_object() {
        let dir = tempdir().unwrap();
        let sink: Arc<dyn BatchSink> = Arc::new(provisioned_log(dir.path()));

        sink.append("via trait\n").unwrap();

        let content = fs::read_to_string(dir.path().join("batch_content.txt")).unwrap();
        assert_eq!(content, "via trait\n");
    }

    // ─── Concurrency tests ───

    #[test]
    fn concurrent_blocks_never_interleave() {
        const WRITERS: usize = 8;
        const LINES: usize = 64;

        let dir = tempdir().unwrap();
        let log = Arc::new(provisioned_log(dir.path()));

        let handles: Vec<_> = (0..WRITERS)
            .map(|writer| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    let block: String = (0..LINES).map(|i| format!("w{writer}-{i}\n")).collect();
                    log.append(&block).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let content = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), WRITERS * LINES);

        let mut seen_writers = Vec::new();
        for block in lines.chunks(LINES) {
            let writer = block[0].split('-').next().unwrap().to_string();
            for (i, line) in block.iter().enumerate() {
                assert_eq!(*line, format!("{writer}-{i}"), "block interleaved");
            }
            assert!(!seen_writers.contains(&writer));
            seen_writers.push(writer);
        }
        assert_eq!(seen_writers.len(), WRITERS);
    }

    // ─── Property tests ───

    proptest! {
        /// Appending blocks in sequence yields their exact concatenation.
        #[test]
        fn sequential_appends_concatenate(
            blocks in prop::collection::vec(
                prop::collection::vec("[A-Za-z0-9 :]{1,10}", 0..6),
                1..10,
            )
        ) {
            let dir = tempdir().unwrap();
            let log = provisioned_log(dir.path());

            let mut expected = String::new();
            for block in &blocks {
                let content: String = block.iter().map(|t| format!("{t}\n")).collect();
                let receipt = log.append(&content).unwrap();
                prop_assert_eq!(receipt.offset, expected.len() as u64);
                prop_assert_eq!(receipt.bytes, content.len() as u64);
                expected.push_str(&content);
            }

            prop_assert_eq!(fs::read_to_string(log.path()).unwrap(), expected);
        }
    }
}
