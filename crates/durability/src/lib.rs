//! Durability layer for geostore
//!
//! This crate handles everything that touches disk:
//!
//! - WAL: append-only log with one JSON record per committed transaction
//! - Durability modes: Always, Standard (default)
//! - Checkpoints: crash-safe full snapshots of the feature table and vector clock
//! - Recovery: checkpoint load followed by idempotent log replay
//! - Data directory layout

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod mode;
pub mod paths;
pub mod recovery;
pub mod wal;

pub use checkpoint::{CheckpointData, CheckpointError, CheckpointInfo, CheckpointStore};
pub use mode::DurabilityMode;
pub use paths::{
    DataPaths, CHECKPOINT_FILE_NAME, CHECKPOINT_TMP_FILE_NAME, CONFIG_FILE_NAME, LOG_FILE_NAME,
};
pub use recovery::{RecoveryCoordinator, RecoveryError, RecoveryStats, RecoveryTarget};
pub use wal::{SkippedRecord, TransactionLog, WalCounters, WalError, WalReadResult};
