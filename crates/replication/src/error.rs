//! Replication error types

use std::io;

use geostore_core::GeoError;
use thiserror::Error;

/// Errors on a single replication connection.
///
/// None of these ever reach the client that issued the mutation; they only
/// end the affected connection.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// Socket or framing failure
    #[error("replication I/O error: {0}")]
    Io(#[from] io::Error),

    /// A frame did not hold a valid transaction
    #[error("malformed transaction frame: {0}")]
    Decode(#[source] serde_json::Error),

    /// A transaction could not be serialized
    #[error("failed to encode transaction: {0}")]
    Encode(#[source] serde_json::Error),

    /// Dial or write did not finish in time
    #[error("{op} to peer {peer} timed out")]
    Timeout {
        /// Peer name
        peer: String,
        /// What timed out
        op: &'static str,
    },

    /// The peer's queue overflowed or was closed
    #[error("send queue for peer {peer} was dropped")]
    QueueDropped {
        /// Peer name
        peer: String,
    },

    /// The remote end closed the connection
    #[error("peer {peer} closed the connection")]
    PeerClosed {
        /// Peer name
        peer: String,
    },

    /// The local engine rejected an apply
    #[error("engine error: {0}")]
    Engine(#[from] GeoError),
}

impl From<ReplicationError> for GeoError {
    fn from(e: ReplicationError) -> Self {
        let reason = e.to_string();
        match e {
            ReplicationError::Io(io) => GeoError::Io(io),
            ReplicationError::Decode(err) => GeoError::decode(err.to_string()),
            ReplicationError::Engine(err) => err,
            ReplicationError::Timeout { peer, .. }
            | ReplicationError::QueueDropped { peer }
            | ReplicationError::PeerClosed { peer } => GeoError::Connection { peer, reason },
            ReplicationError::Encode(_) => GeoError::Connection {
                peer: String::new(),
                reason,
            },
        }
    }
}
