//! Engine counters returned by the `Stats` command.

use geostore_core::VectorClock;
use serde::Serialize;

use crate::config::Role;

/// Point-in-time view of engine state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Node name
    pub node: String,
    /// Configured role
    pub role: Role,
    /// Features in the table
    pub features: usize,
    /// Entries in the spatial index
    pub index_entries: usize,
    /// Sequence number the next local mutation will get
    pub next_sequence: u64,
    /// Highest applied sequence per origin
    pub vclock: VectorClock,
    /// Log records appended since the last checkpoint
    pub wal_records: u64,
    /// Checkpoints written since start
    pub checkpoints: u64,
}
