//! Recovery: checkpoint load followed by log replay
//!
//! Recovery rebuilds in-memory state from the data directory in three steps:
//!
//! 1. Discard any temporary checkpoint left by an interrupted write
//! 2. Hand the durable checkpoint (if any) to the target
//! 3. Replay every decodable log record, in file order
//!
//! The target decides whether a replayed record is applied. With the vector
//! clock rule, records already covered by the checkpoint are skipped, so
//! replaying the same log twice yields the same state.

use geostore_core::{GeoError, Transaction};
use tracing::{info, warn};

use crate::checkpoint::{CheckpointData, CheckpointError, CheckpointStore};
use crate::paths::DataPaths;
use crate::wal::{TransactionLog, WalError};

/// State that can be rebuilt by recovery.
pub trait RecoveryTarget {
    /// Replace all state with the checkpoint contents.
    fn restore_checkpoint(&mut self, data: CheckpointData);

    /// Offer one replayed transaction. Returns `true` if it was applied.
    fn replay(&mut self, txn: Transaction) -> bool;
}

/// Statistics from one recovery pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryStats {
    /// A checkpoint file was found and loaded
    pub checkpoint_loaded: bool,
    /// Features restored from the checkpoint
    pub checkpoint_features: usize,
    /// An interrupted checkpoint write was cleaned up
    pub temp_checkpoint_removed: bool,
    /// Log records decoded
    pub records_read: usize,
    /// Log records the target applied
    pub records_applied: usize,
    /// Log records the target rejected as already applied
    pub records_skipped: usize,
    /// Log lines that failed to decode
    pub records_corrupt: usize,
    /// The log ended in a torn write
    pub torn_tail: bool,
}

impl RecoveryStats {
    /// Check if any records were applied
    pub fn has_records(&self) -> bool {
        self.records_applied > 0
    }
}

/// Recovery errors
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// Checkpoint could not be read
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Log could not be read
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),
}

impl From<RecoveryError> for GeoError {
    fn from(e: RecoveryError) -> Self {
        match e {
            RecoveryError::Checkpoint(e) => e.into(),
            RecoveryError::Wal(e) => e.into(),
        }
    }
}

/// Drives recovery for one data directory.
#[derive(Debug, Clone)]
pub struct RecoveryCoordinator {
    paths: DataPaths,
}

impl RecoveryCoordinator {
    /// Coordinator for the data directory at `paths`
    pub fn new(paths: DataPaths) -> Self {
        RecoveryCoordinator { paths }
    }

    /// Rebuild `target` from the checkpoint and the log.
    pub fn recover<T: RecoveryTarget>(&self, target: &mut T) -> Result<RecoveryStats, RecoveryError> {
        let mut stats = RecoveryStats::default();
        let store = CheckpointStore::new(&self.paths);

        stats.temp_checkpoint_removed = store.cleanup_temp()?;

        if let Some(data) = store.load()? {
            stats.checkpoint_loaded = true;
            stats.checkpoint_features = data.len();
            target.restore_checkpoint(data);
        }

        let log = TransactionLog::read_all(self.paths.log())?;
        stats.records_corrupt = log.skipped.len();
        stats.torn_tail = log.torn_tail;

        for skipped in &log.skipped {
            warn!(
                line = skipped.line,
                reason = %skipped.reason,
                "Skipping undecodable log record"
            );
        }

        for txn in log.transactions {
            stats.records_read += 1;
            if target.replay(txn) {
                stats.records_applied += 1;
            } else {
                stats.records_skipped += 1;
            }
        }

        info!(
            root = %self.paths.root().display(),
            checkpoint = stats.checkpoint_loaded,
            features = stats.checkpoint_features,
            replayed = stats.records_applied,
            skipped = stats.records_skipped,
            corrupt = stats.records_corrupt,
            torn_tail = stats.torn_tail,
            "Recovery complete"
        );

        Ok(stats)
    }
}
