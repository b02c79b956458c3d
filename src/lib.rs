//! geostore - a replicated in-memory geospatial feature store
//!
//! A node keeps GeoJSON features in memory, indexes them by bounding
//! rectangle, logs every mutation before applying it, and streams
//! committed transactions from the leader to its followers.
//!
//! # Quick Start
//!
//! ```ignore
//! use geostore::{Feature, Geometry, Node};
//!
//! let node = Node::start("./data").await?;
//! let handle = node.handle();
//!
//! handle.insert(Feature::new("cafe", Geometry::point(2.35, 48.85))).await?;
//! let hits = handle.search([2.0, 48.0], [3.0, 49.0]).await?;
//!
//! node.shutdown().await?;
//! ```
//!
//! # Architecture
//!
//! All reads and writes go through an [`EngineHandle`], which forwards them
//! to the node's single processing thread. [`Node`] wires that thread to the
//! replication layer according to the node's `geostore.toml`.

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use geostore_durability::{DataPaths, RecoveryStats};
use geostore_engine::{Engine, NoReplication, ReplicationSink};
use geostore_replication::{Broadcaster, ReplicationListener};
use tracing::{info, warn};

pub use geostore_core::{
    Action, BoundingRect, Feature, FeatureCollection, GeoError, GeoResult, Geometry, Position,
    Transaction, VectorClock,
};
pub use geostore_durability::{CheckpointInfo, DurabilityMode};
pub use geostore_engine::{EngineHandle, EngineStats, NodeConfig, PeerConfig, ReplicationConfig, Role};
pub use geostore_replication::{PeerState, PeerStatus};

/// A running node: engine thread plus its replication endpoints.
pub struct Node {
    config: NodeConfig,
    paths: DataPaths,
    engine: Engine,
    handle: EngineHandle,
    broadcaster: Option<Arc<Broadcaster>>,
    listener: Option<ReplicationListener>,
}

impl Node {
    /// Start a node from the data directory at `data_dir`.
    ///
    /// Writes a default `geostore.toml` on first start.
    pub async fn start(data_dir: impl AsRef<Path>) -> GeoResult<Node> {
        let paths = DataPaths::from_root(data_dir);
        paths.create_directories()?;
        NodeConfig::write_default_if_missing(&paths.config())?;
        let config = NodeConfig::from_file(&paths.config())?;
        Self::start_with_config(paths.root(), config).await
    }

    /// Start a node with an explicit configuration. The config file in
    /// `data_dir` is not read.
    pub async fn start_with_config(data_dir: impl AsRef<Path>, config: NodeConfig) -> GeoResult<Node> {
        config.validate()?;
        let paths = DataPaths::from_root(data_dir);

        let broadcaster = match (config.role.is_leader(), config.replication.peers.is_empty()) {
            (true, false) => Some(Arc::new(Broadcaster::new(&config.replication))),
            (false, false) => {
                warn!(node = %config.node, "Peers are ignored on a follower");
                None
            }
            _ => None,
        };
        let sink: Arc<dyn ReplicationSink> = match &broadcaster {
            Some(b) => Arc::clone(b) as Arc<dyn ReplicationSink>,
            None => Arc::new(NoReplication),
        };

        // Recovery reads the whole log; keep it off the async workers
        let engine = {
            let config = config.clone();
            let paths = paths.clone();
            tokio::task::spawn_blocking(move || Engine::start(&config, &paths, sink))
                .await
                .map_err(|e| GeoError::Io(io::Error::other(e)))??
        };
        let handle = engine.handle();

        let listener = match config.replication.listen {
            Some(addr) => Some(ReplicationListener::bind(addr, handle.clone()).await?),
            None => None,
        };
        if let Some(b) = &broadcaster {
            b.start();
        }

        info!(
            node = %config.node,
            role = %config.role,
            data_dir = %paths.root().display(),
            listen = ?listener.as_ref().map(|l| l.local_addr()),
            peers = config.replication.peers.len(),
            "Node started"
        );

        Ok(Node {
            config,
            paths,
            engine,
            handle,
            broadcaster,
            listener,
        })
    }

    /// A cloneable client for this node's engine.
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Configuration the node was started with.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Data directory layout.
    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    /// What recovery found on startup.
    pub fn recovery_stats(&self) -> &RecoveryStats {
        self.engine.recovery_stats()
    }

    /// Bound replication address, if this node listens.
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(|l| l.local_addr())
    }

    /// Status of each outbound peer link. Empty on followers.
    pub fn peers(&self) -> Vec<PeerStatus> {
        self.broadcaster
            .as_ref()
            .map(|b| b.peers())
            .unwrap_or_default()
    }

    /// Stop the node.
    ///
    /// Inbound replication stops first, then the engine writes its final
    /// checkpoint, then the peer links close.
    pub async fn shutdown(self) -> GeoResult<()> {
        let Node {
            config,
            engine,
            handle,
            broadcaster,
            listener,
            ..
        } = self;

        if let Some(listener) = &listener {
            listener.shutdown().await;
        }
        let result = handle.shutdown().await;
        if let Some(b) = &broadcaster {
            b.shutdown().await;
        }
        drop(handle);
        tokio::task::spawn_blocking(move || engine.join())
            .await
            .map_err(|e| GeoError::Io(io::Error::other(e)))?;

        info!(node = %config.node, "Node stopped");
        result
    }
}
