//! Leader-side connection to one follower.
//!
//! Each peer has a link (shared state the broadcaster enqueues into) and an
//! actor task that owns the socket:
//!
//! ```text
//! Disconnected ──dial──▶ Connecting ──ok──▶ Streaming
//!      ▲                     │                  │
//!      └──── backoff ◀── error ◀── write error / timeout / queue dropped
//! ```
//!
//! Transactions are enqueued only while the link is `Streaming`. On reaching
//! `Streaming` the actor first re-sends the broadcaster's backlog, then
//! drains its queue.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use geostore_core::Transaction;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::codec::TransactionCodec;
use crate::error::ReplicationError;

type Queue = mpsc::Sender<Arc<Transaction>>;

/// Connection state of a peer link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// No connection; waiting to dial
    Disconnected,
    /// Dial in progress
    Connecting,
    /// Connected and receiving transactions
    Streaming,
}

impl PeerState {
    fn as_u8(self) -> u8 {
        match self {
            PeerState::Disconnected => 0,
            PeerState::Connecting => 1,
            PeerState::Streaming => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => PeerState::Connecting,
            2 => PeerState::Streaming,
            _ => PeerState::Disconnected,
        }
    }
}

/// Point-in-time view of one peer link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStatus {
    /// Peer name
    pub name: String,
    /// Dial address
    pub addr: String,
    /// Current state
    pub state: PeerState,
    /// Successful connections so far
    pub connects: u64,
    /// Transactions written to the socket
    pub sent: u64,
    /// Times the queue overflowed and the peer was dropped
    pub overflows: u64,
}

/// Timeouts and sizes for a peer link.
#[derive(Debug, Clone, Copy)]
pub struct LinkSettings {
    /// Dial timeout
    pub connect_timeout: Duration,
    /// Per-frame write timeout
    pub write_timeout: Duration,
    /// Delay between dial attempts
    pub reconnect_backoff: Duration,
    /// Bounded queue size
    pub queue_capacity: usize,
}

/// Shared state of one peer link.
#[derive(Debug)]
pub struct PeerLink {
    name: String,
    addr: String,
    state: AtomicU8,
    queue: Mutex<Option<Queue>>,
    connects: AtomicU64,
    sent: AtomicU64,
    overflows: AtomicU64,
}

impl PeerLink {
    /// New link, initially `Disconnected`.
    pub fn new(name: impl Into<String>, addr: impl Into<String>) -> Self {
        PeerLink {
            name: name.into(),
            addr: addr.into(),
            state: AtomicU8::new(PeerState::Disconnected.as_u8()),
            queue: Mutex::new(None),
            connects: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            overflows: AtomicU64::new(0),
        }
    }

    /// Peer name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state
    pub fn state(&self) -> PeerState {
        PeerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: PeerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Snapshot of the link's counters.
    pub fn status(&self) -> PeerStatus {
        PeerStatus {
            name: self.name.clone(),
            addr: self.addr.clone(),
            state: self.state(),
            connects: self.connects.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
        }
    }

    /// Non-blocking enqueue. Drops the peer if its queue is full.
    pub(crate) fn enqueue(&self, txn: &Arc<Transaction>) {
        if self.state() != PeerState::Streaming {
            return;
        }
        let mut queue = self.queue.lock();
        let Some(tx) = queue.as_ref() else {
            return;
        };
        match tx.try_send(Arc::clone(txn)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.overflows.fetch_add(1, Ordering::Relaxed);
                warn!(
                    peer = %self.name,
                    sequence = txn.sequence,
                    "Peer queue full, disconnecting peer"
                );
                // Closing the queue ends the actor's stream loop
                *queue = None;
                self.set_state(PeerState::Disconnected);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                *queue = None;
                self.set_state(PeerState::Disconnected);
            }
        }
    }

    /// Install a fresh queue and mark the link `Streaming`.
    ///
    /// Must be called with the broadcaster's backlog lock held.
    pub(crate) fn begin_streaming(&self, capacity: usize) -> mpsc::Receiver<Arc<Transaction>> {
        let (tx, rx) = mpsc::channel(capacity);
        *self.queue.lock() = Some(tx);
        self.connects.fetch_add(1, Ordering::Relaxed);
        self.set_state(PeerState::Streaming);
        rx
    }

    fn disconnect(&self) {
        *self.queue.lock() = None;
        self.set_state(PeerState::Disconnected);
    }
}

/// Source of the transactions a reconnecting peer is sent first.
pub(crate) trait Backlog: Send + Sync {
    /// Snapshot the backlog and start streaming on `link` atomically with
    /// respect to concurrent broadcasts.
    fn attach(
        &self,
        link: &PeerLink,
        capacity: usize,
    ) -> (Vec<Arc<Transaction>>, mpsc::Receiver<Arc<Transaction>>);
}

/// Actor loop for one peer: dial, stream, back off, repeat until shutdown.
pub(crate) async fn run_link<B: Backlog>(
    link: Arc<PeerLink>,
    backlog: Arc<B>,
    settings: LinkSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        link.set_state(PeerState::Connecting);
        match dial(&link, settings.connect_timeout).await {
            Ok(stream) => {
                let mut framed = Framed::new(stream, TransactionCodec::new());
                let (replay, rx) = backlog.attach(&link, settings.queue_capacity);
                info!(
                    peer = %link.name,
                    addr = %link.addr,
                    backlog = replay.len(),
                    "Peer connected"
                );

                let result = tokio::select! {
                    r = stream_to_peer(&link, &mut framed, replay, rx, settings.write_timeout) => r,
                    _ = shutdown.changed() => Ok(()),
                };
                link.disconnect();
                match result {
                    Ok(()) => debug!(peer = %link.name, "Peer link closed"),
                    Err(e) => warn!(peer = %link.name, error = %e, "Peer disconnected"),
                }
            }
            Err(e) => {
                link.set_state(PeerState::Disconnected);
                debug!(peer = %link.name, addr = %link.addr, error = %e, "Dial failed");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(settings.reconnect_backoff) => {}
            _ = shutdown.changed() => break,
        }
    }
    link.disconnect();
    debug!(peer = %link.name, "Peer link stopped");
}

async fn dial(link: &PeerLink, connect_timeout: Duration) -> Result<TcpStream, ReplicationError> {
    let stream = timeout(connect_timeout, TcpStream::connect(link.addr.as_str()))
        .await
        .map_err(|_| ReplicationError::Timeout {
            peer: link.name.clone(),
            op: "connect",
        })??;
    stream.set_nodelay(true)?;
    Ok(stream)
}

enum Event {
    Outbound(Option<Arc<Transaction>>),
    Inbound(Option<Result<Transaction, ReplicationError>>),
}

async fn stream_to_peer(
    link: &PeerLink,
    framed: &mut Framed<TcpStream, TransactionCodec>,
    replay: Vec<Arc<Transaction>>,
    mut rx: mpsc::Receiver<Arc<Transaction>>,
    write_timeout: Duration,
) -> Result<(), ReplicationError> {
    for txn in replay {
        send(link, framed, txn, write_timeout).await?;
    }

    loop {
        // Followers never write back; a readable socket means EOF or garbage
        let event = tokio::select! {
            msg = rx.recv() => Event::Outbound(msg),
            read = framed.next() => Event::Inbound(read),
        };
        match event {
            Event::Outbound(Some(txn)) => send(link, framed, txn, write_timeout).await?,
            Event::Outbound(None) => {
                return Err(ReplicationError::QueueDropped {
                    peer: link.name.clone(),
                })
            }
            Event::Inbound(None) => {
                return Err(ReplicationError::PeerClosed {
                    peer: link.name.clone(),
                })
            }
            Event::Inbound(Some(Err(e))) => return Err(e),
            Event::Inbound(Some(Ok(txn))) => {
                debug!(
                    peer = %link.name,
                    sequence = txn.sequence,
                    "Ignoring unexpected frame from follower"
                );
            }
        }
    }
}

async fn send(
    link: &PeerLink,
    framed: &mut Framed<TcpStream, TransactionCodec>,
    txn: Arc<Transaction>,
    write_timeout: Duration,
) -> Result<(), ReplicationError> {
    let sequence = txn.sequence;
    timeout(write_timeout, framed.send(txn))
        .await
        .map_err(|_| ReplicationError::Timeout {
            peer: link.name.clone(),
            op: "write",
        })??;
    link.sent.fetch_add(1, Ordering::Relaxed);
    debug!(peer = %link.name, sequence, "Sent transaction");
    Ok(())
}
