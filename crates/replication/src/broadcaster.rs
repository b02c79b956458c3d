//! Leader fan-out.
//!
//! [`Broadcaster`] is the engine's [`ReplicationSink`]. A broadcast never
//! blocks the engine thread: the transaction is pushed onto a bounded
//! in-memory backlog and `try_send` onto each streaming peer's queue. Peer
//! I/O happens in one actor task per peer.
//!
//! The backlog holds the most recent `backlog_capacity` transactions and is
//! re-sent to a peer every time it (re)connects. Followers discard the
//! duplicates through the vector clock. A follower that was away for longer
//! than the backlog covers keeps a gap.

use std::collections::VecDeque;
use std::sync::Arc;

use geostore_core::Transaction;
use geostore_engine::{ReplicationConfig, ReplicationSink};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::peer::{run_link, Backlog, LinkSettings, PeerLink, PeerStatus};

struct Shared {
    backlog: Mutex<VecDeque<Arc<Transaction>>>,
    backlog_capacity: usize,
    peers: Vec<Arc<PeerLink>>,
}

impl Backlog for Shared {
    fn attach(
        &self,
        link: &PeerLink,
        capacity: usize,
    ) -> (Vec<Arc<Transaction>>, mpsc::Receiver<Arc<Transaction>>) {
        // Holding the backlog lock orders this against broadcast(): every
        // transaction is either in the snapshot or enqueued afterwards.
        let backlog = self.backlog.lock();
        let rx = link.begin_streaming(capacity);
        (backlog.iter().cloned().collect(), rx)
    }
}

/// Streams committed transactions to every configured peer.
pub struct Broadcaster {
    shared: Arc<Shared>,
    settings: LinkSettings,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Broadcaster {
    /// Build links for the peers in `config`. Nothing is dialed until
    /// [`start`](Self::start).
    pub fn new(config: &ReplicationConfig) -> Self {
        let peers = config
            .peers
            .iter()
            .map(|p| Arc::new(PeerLink::new(p.name.clone(), p.addr.clone())))
            .collect();
        let (shutdown, _) = watch::channel(false);

        Broadcaster {
            shared: Arc::new(Shared {
                backlog: Mutex::new(VecDeque::with_capacity(config.backlog_capacity)),
                backlog_capacity: config.backlog_capacity,
                peers,
            }),
            settings: LinkSettings {
                connect_timeout: config.connect_timeout(),
                write_timeout: config.write_timeout(),
                reconnect_backoff: config.reconnect_backoff(),
                queue_capacity: config.peer_queue_capacity.max(1),
            },
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn one actor task per peer on the current tokio runtime.
    ///
    /// Calling it again while running is a no-op.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }
        for link in &self.shared.peers {
            tasks.push(tokio::spawn(run_link(
                Arc::clone(link),
                Arc::clone(&self.shared),
                self.settings,
                self.shutdown.subscribe(),
            )));
        }
        info!(peers = self.shared.peers.len(), "Replication links started");
    }

    /// Close every peer connection and wait for the actors to exit.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Peer link task failed");
            }
        }
        debug!("Replication links stopped");
    }

    /// Status of every peer link.
    pub fn peers(&self) -> Vec<PeerStatus> {
        self.shared.peers.iter().map(|p| p.status()).collect()
    }

    /// Number of transactions currently held for reconnect replay.
    pub fn backlog_len(&self) -> usize {
        self.shared.backlog.lock().len()
    }
}

impl ReplicationSink for Broadcaster {
    fn broadcast(&self, txn: &Transaction) {
        let txn = Arc::new(txn.clone());
        let mut backlog = self.shared.backlog.lock();
        if self.shared.backlog_capacity > 0 {
            if backlog.len() == self.shared.backlog_capacity {
                backlog.pop_front();
            }
            backlog.push_back(Arc::clone(&txn));
        }
        for peer in &self.shared.peers {
            peer.enqueue(&txn);
        }
    }
}
