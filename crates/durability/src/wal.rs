//! Write-ahead log
//!
//! An append-only file of [`Transaction`] records, one JSON document per
//! line, in commit order.
//!
//! ## Write path
//!
//! 1. Serialize the transaction and terminate it with `\n`
//! 2. Write the whole line to the end of the file
//! 3. fsync if the durability mode requires it
//! 4. Only then may the caller apply the mutation and acknowledge it
//!
//! If a write fails midway the file is cut back to its last good length so
//! a torn line never prefixes the next record. If that cut also fails the
//! handle refuses further appends until the log is reopened, which trims
//! the torn tail.
//!
//! ## Read path
//!
//! Records are decoded in file order. A line that fails to decode is logged
//! and skipped; replay is keyed on `(origin_node, sequence)` so skipping is
//! never worse than the record not having been written. A final line without
//! a trailing newline is a torn write from a crash and is reported as such.
//!
//! ## Truncation
//!
//! The log is emptied exactly when a checkpoint has been durably written.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use geostore_core::{GeoError, Transaction};
use tracing::{debug, error, info, warn};

use crate::mode::DurabilityMode;

/// Cumulative log operation counters.
///
/// These counters accumulate over the lifetime of the log handle and are
/// never reset, not even by truncation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalCounters {
    /// Total successful appends
    pub appends: u64,
    /// Total fsync calls
    pub sync_calls: u64,
    /// Total bytes written
    pub bytes_written: u64,
    /// Total truncations (one per successful checkpoint)
    pub truncations: u64,
}

/// A record that could not be decoded during a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    /// 1-based line number in the log file
    pub line: usize,
    /// Decoder message
    pub reason: String,
}

/// Result of reading the whole log.
#[derive(Debug, Default)]
pub struct WalReadResult {
    /// Decoded transactions, in file order
    pub transactions: Vec<Transaction>,
    /// Lines that failed to decode
    pub skipped: Vec<SkippedRecord>,
    /// True if the final line had no newline and failed to decode
    pub torn_tail: bool,
}

/// Write-ahead log errors
#[derive(Debug, thiserror::Error)]
pub enum WalError {
    /// IO error
    #[error("WAL I/O error: {0}")]
    Io(#[from] io::Error),

    /// A transaction could not be serialized
    #[error("WAL encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// A partial write could not be cut back; the handle must be reopened
    #[error("WAL ends in a partial record at byte {len}; reopen the log")]
    Unusable {
        /// Last good length
        len: u64,
    },
}

impl From<WalError> for GeoError {
    fn from(e: WalError) -> Self {
        match e {
            WalError::Io(io) => GeoError::Io(io),
            WalError::Encode(err) => GeoError::Io(io::Error::new(io::ErrorKind::InvalidData, err)),
            unusable @ WalError::Unusable { .. } => GeoError::Io(io::Error::other(unusable)),
        }
    }
}

fn ends_with_newline(path: &Path) -> io::Result<bool> {
    let mut f = File::open(path)?;
    f.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    f.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Cut an unterminated final line left by a crash mid-append.
fn trim_torn_tail(path: &Path, file: &File) -> io::Result<u64> {
    let bytes = fs::read(path)?;
    let keep = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |pos| pos as u64 + 1);
    warn!(
        path = %path.display(),
        dropped = bytes.len() as u64 - keep,
        "Trimming torn WAL tail before appending"
    );
    file.set_len(keep)?;
    file.sync_all()?;
    Ok(keep)
}

/// Append handle on the write-ahead log file.
pub struct TransactionLog {
    path: PathBuf,
    file: File,
    durability: DurabilityMode,
    len: u64,
    records: u64,
    unusable: bool,
    counters: WalCounters,
}

impl TransactionLog {
    /// Open the log for appending, creating it if missing.
    pub fn open(path: impl AsRef<Path>, durability: DurabilityMode) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut len = file.metadata()?.len();
        if len > 0 && !ends_with_newline(&path)? {
            len = trim_torn_tail(&path, &file)?;
        }

        debug!(path = %path.display(), len, %durability, "Opened transaction log");

        Ok(TransactionLog {
            path,
            file,
            durability,
            len,
            records: 0,
            unusable: false,
            counters: WalCounters::default(),
        })
    }

    /// Append one transaction and push it to the configured durability level.
    ///
    /// Fails with [`WalError::Unusable`] once a partial write could not be
    /// repaired.
    pub fn append(&mut self, txn: &Transaction) -> Result<(), WalError> {
        if self.unusable {
            return Err(WalError::Unusable { len: self.len });
        }
        let mut line = serde_json::to_vec(txn)?;
        line.push(b'\n');

        if let Err(e) = self.write_line(&line) {
            // Cut any partial line so the next append starts on a clean boundary
            if let Err(repair) = self.file.set_len(self.len) {
                error!(
                    path = %self.path.display(),
                    len = self.len,
                    error = %repair,
                    "Failed to trim partial WAL write; refusing further appends"
                );
                self.unusable = true;
            }
            return Err(e.into());
        }

        self.len += line.len() as u64;
        self.records += 1;
        self.counters.appends += 1;
        self.counters.bytes_written += line.len() as u64;
        Ok(())
    }

    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.file.write_all(line)?;
        self.file.flush()?;
        if self.durability.requires_fsync() {
            self.file.sync_data()?;
            self.counters.sync_calls += 1;
        }
        Ok(())
    }

    /// Empty the log. Only call after a checkpoint covering it is durable.
    pub fn truncate(&mut self) -> Result<(), WalError> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.counters.sync_calls += 1;
        self.counters.truncations += 1;

        info!(
            path = %self.path.display(),
            bytes_removed = self.len,
            records_removed = self.records,
            "WAL truncated"
        );

        self.len = 0;
        self.records = 0;
        // An empty file has no partial record left
        self.unusable = false;
        Ok(())
    }

    /// False once a failed append could not be cut back.
    pub fn is_usable(&self) -> bool {
        !self.unusable
    }

    /// Log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file length in bytes
    pub fn len_bytes(&self) -> u64 {
        self.len
    }

    /// Records appended through this handle since open or the last truncation
    pub fn records_since_truncate(&self) -> u64 {
        self.records
    }

    /// Durability mode in effect
    pub fn durability(&self) -> DurabilityMode {
        self.durability
    }

    /// Lifetime counters
    pub fn counters(&self) -> &WalCounters {
        &self.counters
    }

    /// Read every record in the log at `path`.
    ///
    /// A missing file is an empty log, not an error.
    pub fn read_all(path: impl AsRef<Path>) -> Result<WalReadResult, WalError> {
        let path = path.as_ref();
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(WalReadResult::default()),
            Err(e) => return Err(e.into()),
        };

        let mut result = WalReadResult::default();
        let ends_clean = bytes.last().map_or(true, |b| *b == b'\n');
        let lines: Vec<&[u8]> = bytes.split(|b| *b == b'\n').collect();
        let last_index = lines.len().saturating_sub(1);

        for (index, raw) in lines.into_iter().enumerate() {
            let line = raw.trim_ascii();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_slice::<Transaction>(line) {
                Ok(txn) => result.transactions.push(txn),
                Err(e) if index == last_index && !ends_clean => {
                    warn!(
                        path = %path.display(),
                        line = index + 1,
                        error = %e,
                        "Discarding torn WAL tail"
                    );
                    result.torn_tail = true;
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        line = index + 1,
                        error = %e,
                        "Skipping undecodable WAL record"
                    );
                    result.skipped.push(SkippedRecord {
                        line: index + 1,
                        reason: e.to_string(),
                    });
                }
            }
        }

        debug!(
            path = %path.display(),
            records = result.transactions.len(),
            skipped = result.skipped.len(),
            "Read transaction log"
        );
        Ok(result)
    }
}
