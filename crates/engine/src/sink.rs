//! Seam between the engine and replication fan-out.

use geostore_core::Transaction;

/// Receives every transaction the leader commits, after the client reply.
///
/// Called on the engine's processing thread, so implementations must not
/// block: hand the transaction off to per-peer queues and return.
pub trait ReplicationSink: Send + Sync {
    /// Forward a committed transaction to peers.
    fn broadcast(&self, txn: &Transaction);
}

/// Sink for nodes with nothing to stream to.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReplication;

impl ReplicationSink for NoReplication {
    fn broadcast(&self, _txn: &Transaction) {}
}
