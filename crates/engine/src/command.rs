//! Commands accepted by the engine's processing thread.
//!
//! Every operation on engine state is a variant of [`Command`] carrying a
//! one-shot reply channel. The processing thread pops commands one at a time,
//! so the order it dequeues them in is the total order of application.
//!
//! | Command | Roles | Writes log | Broadcasts |
//! |---------|-------|------------|------------|
//! | Insert / Replace / Delete | leader | yes | yes |
//! | Search / Stats | any | no | no |
//! | Checkpoint | any | truncates | no |
//! | ApplyReplicated | any | no | no |
//! | Shutdown | any | final checkpoint | no |

use geostore_core::{BoundingRect, Feature, GeoError, GeoResult, Transaction};
use geostore_durability::CheckpointInfo;
use tokio::sync::oneshot;

use crate::stats::EngineStats;

/// Reply channel for a command producing `T`.
pub type Reply<T> = oneshot::Sender<GeoResult<T>>;

/// An operation on engine state.
#[derive(Debug)]
pub enum Command {
    /// Add a feature. Returns the assigned sequence number.
    Insert {
        /// Feature to store
        feature: Feature,
        /// Reply channel
        reply: Reply<u64>,
    },

    /// Swap the stored version of a feature. Returns the assigned sequence number.
    Replace {
        /// New version of the feature
        feature: Feature,
        /// Reply channel
        reply: Reply<u64>,
    },

    /// Remove a feature by id. Returns the assigned sequence number.
    Delete {
        /// Id of the feature to remove
        id: String,
        /// Reply channel
        reply: Reply<u64>,
    },

    /// Range query.
    Search {
        /// Query rectangle
        rect: BoundingRect,
        /// Reply channel
        reply: Reply<Vec<Feature>>,
    },

    /// Snapshot state and truncate the log.
    Checkpoint {
        /// Reply channel
        reply: Reply<CheckpointInfo>,
    },

    /// Apply a transaction received from another node. Returns whether it was new.
    ApplyReplicated {
        /// Transaction as received
        txn: Transaction,
        /// Reply channel
        reply: Reply<bool>,
    },

    /// Read-only engine counters.
    Stats {
        /// Reply channel
        reply: Reply<EngineStats>,
    },

    /// Final checkpoint, then stop accepting commands.
    Shutdown {
        /// Reply channel
        reply: Reply<()>,
    },
}

impl Command {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Insert { .. } => "insert",
            Command::Replace { .. } => "replace",
            Command::Delete { .. } => "delete",
            Command::Search { .. } => "search",
            Command::Checkpoint { .. } => "checkpoint",
            Command::ApplyReplicated { .. } => "apply_replicated",
            Command::Stats { .. } => "stats",
            Command::Shutdown { .. } => "shutdown",
        }
    }

    /// Fail the command without executing it.
    pub fn reject(self, err: GeoError) {
        // A dropped receiver means the caller gave up; nothing to report
        match self {
            Command::Insert { reply, .. }
            | Command::Replace { reply, .. }
            | Command::Delete { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Command::Search { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Command::Checkpoint { reply } => {
                let _ = reply.send(Err(err));
            }
            Command::ApplyReplicated { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Command::Stats { reply } => {
                let _ = reply.send(Err(err));
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(Err(err));
            }
        }
    }
}
