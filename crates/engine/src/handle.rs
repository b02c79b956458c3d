//! Cloneable entry point to a running engine.

use std::sync::mpsc::Sender;
use std::sync::Arc;

use geostore_core::{BoundingRect, Feature, FeatureCollection, GeoError, GeoResult, Transaction};
use geostore_durability::CheckpointInfo;
use tokio::sync::oneshot;

use crate::command::{Command, Reply};
use crate::stats::EngineStats;

/// Sends commands to the engine's processing thread and awaits replies.
///
/// Every method fails with [`GeoError::ShuttingDown`] once the engine has
/// stopped accepting commands.
#[derive(Clone)]
pub struct EngineHandle {
    tx: Sender<Command>,
    node: Arc<str>,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle").field("node", &self.node).finish()
    }
}

impl EngineHandle {
    pub(crate) fn new(tx: Sender<Command>, node: String) -> Self {
        EngineHandle {
            tx,
            node: node.into(),
        }
    }

    /// Name of the node this engine runs as.
    pub fn node(&self) -> &str {
        &self.node
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> GeoResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| GeoError::ShuttingDown)?;
        rx.await.map_err(|_| GeoError::ShuttingDown)?
    }

    /// Insert a feature (leader only). Returns its sequence number.
    pub async fn insert(&self, feature: Feature) -> GeoResult<u64> {
        self.request(|reply| Command::Insert { feature, reply }).await
    }

    /// Replace a feature (leader only). Returns its sequence number.
    pub async fn replace(&self, feature: Feature) -> GeoResult<u64> {
        self.request(|reply| Command::Replace { feature, reply }).await
    }

    /// Delete a feature by id (leader only). Returns its sequence number.
    pub async fn delete(&self, id: impl Into<String>) -> GeoResult<u64> {
        let id = id.into();
        self.request(|reply| Command::Delete { id, reply }).await
    }

    /// Features intersecting the rectangle spanned by two corners.
    ///
    /// Corners may be given in any order.
    pub async fn search(&self, min: [f64; 2], max: [f64; 2]) -> GeoResult<Vec<Feature>> {
        let rect = BoundingRect::new(min, max);
        self.request(|reply| Command::Search { rect, reply }).await
    }

    /// Same as [`search`](Self::search), wrapped as a GeoJSON feature collection.
    pub async fn search_collection(
        &self,
        min: [f64; 2],
        max: [f64; 2],
    ) -> GeoResult<FeatureCollection> {
        Ok(self.search(min, max).await?.into())
    }

    /// Snapshot state to the checkpoint file and truncate the log.
    pub async fn checkpoint(&self) -> GeoResult<CheckpointInfo> {
        self.request(|reply| Command::Checkpoint { reply }).await
    }

    /// Apply a transaction received from another node.
    ///
    /// Returns `false` if the vector clock shows it was already applied.
    pub async fn apply_replicated(&self, txn: Transaction) -> GeoResult<bool> {
        self.request(|reply| Command::ApplyReplicated { txn, reply })
            .await
    }

    /// Engine counters.
    pub async fn stats(&self) -> GeoResult<EngineStats> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Write a final checkpoint and stop the engine.
    pub async fn shutdown(&self) -> GeoResult<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}
