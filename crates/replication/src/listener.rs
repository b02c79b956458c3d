//! Follower-side replication endpoint.
//!
//! Accepts connections from the leader and feeds every received
//! transaction into [`EngineHandle::apply_replicated`]. A read error or a
//! malformed frame ends that connection only; the listener keeps accepting.

use std::net::SocketAddr;

use futures_util::StreamExt;
use geostore_core::{GeoError, GeoResult};
use geostore_engine::EngineHandle;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::codec::TransactionCodec;
use crate::error::ReplicationError;

/// A bound replication listener and its accept task.
pub struct ReplicationListener {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReplicationListener {
    /// Bind `addr` and start accepting on the current tokio runtime.
    pub async fn bind(addr: SocketAddr, engine: EngineHandle) -> GeoResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown, rx) = watch::channel(false);

        info!(node = %engine.node(), addr = %local_addr, "Replication listener bound");
        let task = tokio::spawn(accept_loop(listener, engine, rx));

        Ok(ReplicationListener {
            local_addr,
            shutdown,
            task: Mutex::new(Some(task)),
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and close every open replication connection.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Replication listener task failed");
            }
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    engine: EngineHandle,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = Vec::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    debug!(peer = %peer, "Accepted replication connection");
                    connections.retain(|c: &JoinHandle<()>| !c.is_finished());
                    connections.push(tokio::spawn(serve_connection(
                        socket,
                        peer,
                        engine.clone(),
                        shutdown.clone(),
                    )));
                }
                Err(e) => warn!(error = %e, "Replication accept failed"),
            },
            _ = shutdown.changed() => break,
        }
    }
    for conn in connections {
        let _ = conn.await;
    }
    debug!("Replication listener stopped");
}

async fn serve_connection(
    socket: TcpStream,
    peer: SocketAddr,
    engine: EngineHandle,
    mut shutdown: watch::Receiver<bool>,
) {
    let result = tokio::select! {
        r = apply_stream(socket, &engine) => r,
        _ = shutdown.changed() => Ok(0),
    };
    match result {
        Ok(applied) => debug!(peer = %peer, applied, "Replication connection closed"),
        Err(e) => warn!(peer = %peer, error = %e, "Replication connection dropped"),
    }
}

async fn apply_stream(socket: TcpStream, engine: &EngineHandle) -> Result<u64, ReplicationError> {
    let mut frames = FramedRead::new(socket, TransactionCodec::new());
    let mut applied = 0;

    while let Some(frame) = frames.next().await {
        let txn = frame?;
        let (origin, sequence) = (txn.origin_node.clone(), txn.sequence);
        match engine.apply_replicated(txn).await {
            Ok(true) => applied += 1,
            Ok(false) => debug!(origin = %origin, sequence, "Duplicate transaction skipped"),
            Err(GeoError::ShuttingDown) => return Err(GeoError::ShuttingDown.into()),
            Err(e) => warn!(origin = %origin, sequence, error = %e, "Replicated apply failed"),
        }
    }
    Ok(applied)
}
