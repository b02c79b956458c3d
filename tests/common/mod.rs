//! Shared test utilities for the integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::fs::{self, OpenOptions};
use std::io::Write as IoWrite;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use geostore::{
    Action, BoundingRect, EngineHandle, EngineStats, Feature, GeoError, Geometry, Node, NodeConfig,
    PeerConfig, PeerState, Role, Transaction,
};
use tempfile::TempDir;

// ============================================================================
// Configuration
// ============================================================================

/// Leader config with fast reconnects and no periodic checkpoints.
pub fn leader_config(name: &str) -> NodeConfig {
    let mut config = NodeConfig::new(name, Role::Leader);
    config.checkpoint_interval_ms = 0;
    config.replication.connect_timeout_ms = 500;
    config.replication.write_timeout_ms = 500;
    config.replication.reconnect_backoff_ms = 50;
    config
}

/// Follower config listening on `listen`.
pub fn follower_config(name: &str, listen: SocketAddr) -> NodeConfig {
    let mut config = NodeConfig::new(name, Role::Follower);
    config.checkpoint_interval_ms = 0;
    config.replication.listen = Some(listen);
    config
}

/// A loopback address with an ephemeral port.
pub fn any_port() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

/// Reserve a loopback port that nothing is listening on yet.
pub fn free_port() -> SocketAddr {
    let listener = StdTcpListener::bind(any_port()).expect("bind ephemeral port");
    listener.local_addr().expect("local addr")
}

pub fn peer(name: &str, addr: SocketAddr) -> PeerConfig {
    PeerConfig {
        name: name.to_string(),
        addr: addr.to_string(),
    }
}

// ============================================================================
// TestNode - a node in a temp directory that can be restarted
// ============================================================================

pub struct TestNode {
    pub node: Option<Node>,
    pub dir: TempDir,
    pub config: NodeConfig,
}

impl TestNode {
    /// Start a node with `config` in a fresh temp directory.
    pub async fn start(config: NodeConfig) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        Self::start_in(dir, config).await
    }

    /// Start a node with `config` in an existing directory.
    pub async fn start_in(dir: TempDir, config: NodeConfig) -> Self {
        let node = Node::start_with_config(dir.path(), config.clone())
            .await
            .expect("Failed to start node");
        TestNode {
            node: Some(node),
            dir,
            config,
        }
    }

    pub async fn leader(name: &str) -> Self {
        Self::start(leader_config(name)).await
    }

    pub async fn follower(name: &str) -> Self {
        Self::start(follower_config(name, any_port())).await
    }

    pub fn node(&self) -> &Node {
        self.node.as_ref().expect("node is stopped")
    }

    pub fn handle(&self) -> EngineHandle {
        self.node().handle()
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.node().listen_addr().expect("node is not listening")
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.path().join("transactions.log")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.path().join("checkpoint.json")
    }

    pub async fn stop(&mut self) {
        if let Some(node) = self.node.take() {
            node.shutdown().await.expect("clean shutdown");
        }
    }

    /// Start again in the same directory after [`stop`](Self::stop).
    pub async fn resume(&mut self) {
        assert!(self.node.is_none(), "node is still running");
        let node = Node::start_with_config(self.dir.path(), self.config.clone())
            .await
            .expect("Failed to restart node");
        self.node = Some(node);
    }

    /// Clean shutdown followed by a start in the same directory.
    ///
    /// A listening node rebinds the address it had before.
    pub async fn restart(&mut self) {
        self.pin_listen_addr();
        self.stop().await;
        self.resume().await;
    }

    /// Make the next start bind the address currently bound.
    pub fn pin_listen_addr(&mut self) {
        if let Some(addr) = self.node.as_ref().and_then(|n| n.listen_addr()) {
            self.config.replication.listen = Some(addr);
        }
    }

    /// Copy the data directory as it is right now, without a final
    /// checkpoint, and start a fresh node from the copy.
    ///
    /// This is what a process kill leaves behind.
    pub async fn crash_copy(&self) -> TestNode {
        let copy = tempfile::tempdir().expect("Failed to create temp dir");
        copy_data_dir(self.dir.path(), copy.path());
        let mut config = self.config.clone();
        config.replication.listen = None;
        config.replication.peers.clear();
        TestNode::start_in(copy, config).await
    }
}

pub fn copy_data_dir(from: &Path, to: &Path) {
    for entry in fs::read_dir(from).expect("read data dir") {
        let entry = entry.expect("dir entry");
        if entry.file_type().expect("file type").is_file() {
            fs::copy(entry.path(), to.join(entry.file_name())).expect("copy file");
        }
    }
}

// ============================================================================
// Features and file helpers
// ============================================================================

pub fn point(id: &str, x: f64, y: f64) -> Feature {
    Feature::new(id, Geometry::point(x, y))
}

pub fn rect(min: [f64; 2], max: [f64; 2]) -> BoundingRect {
    BoundingRect::new(min, max)
}

/// Sorted ids of `features`.
pub fn ids(features: &[Feature]) -> Vec<String> {
    let mut ids: Vec<String> = features
        .iter()
        .map(|f| f.key().expect("feature id").to_string())
        .collect();
    ids.sort();
    ids
}

pub fn append_bytes(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .expect("open for append");
    file.write_all(bytes).expect("append bytes");
}

pub fn line_count(path: &Path) -> usize {
    fs::read_to_string(path)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

// ============================================================================
// Waiting
// ============================================================================

/// Poll `handle` until `vclock[origin]` reaches `seq`.
pub async fn wait_for_clock(handle: &EngineHandle, origin: &str, seq: u64) -> EngineStats {
    for _ in 0..500 {
        let stats = handle.stats().await.expect("stats");
        if stats.vclock.get(origin) >= seq {
            return stats;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} never reached {}@{}", handle.node(), origin, seq);
}

/// Poll until `check` holds on the node's peer links.
pub async fn wait_for_peers(node: &Node, check: impl Fn(&[geostore::PeerStatus]) -> bool) {
    for _ in 0..500 {
        if check(&node.peers()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("peer links never reached the expected state: {:?}", node.peers());
}
