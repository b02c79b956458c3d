//! Error types for geostore
//!
//! This module defines the error taxonomy shared by every layer.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! | Category | Variants | Surfaced as |
//! |----------|----------|-------------|
//! | Role | `NotLeader` | 409 |
//! | Validation | `InvalidIdentity`, `Decode` | 400 |
//! | Not Found | `NotFound` | 404 |
//! | System | `Io`, `Connection`, `InvalidConfig` | 500 |
//! | Lifecycle | `ShuttingDown` | 503 |

use std::io;
use thiserror::Error;

/// Result type alias for geostore operations
pub type GeoResult<T> = std::result::Result<T, GeoError>;

/// Error types for the geostore engine
#[derive(Debug, Error)]
pub enum GeoError {
    /// A mutation was attempted on a replica that is not the leader
    #[error("node {node} is not the leader")]
    NotLeader {
        /// Name of the node that rejected the mutation
        node: String,
    },

    /// The feature lacks a usable string id
    #[error("invalid feature identity: {reason}")]
    InvalidIdentity {
        /// Why the id was rejected
        reason: String,
    },

    /// The feature id is not present in the feature table
    #[error("feature not found: {id}")]
    NotFound {
        /// The missing id
        id: String,
    },

    /// Log or checkpoint read/write failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed transaction or checkpoint document
    #[error("decode error: {reason}")]
    Decode {
        /// Decoder message
        reason: String,
    },

    /// Peer dial/read/write failure
    #[error("connection to {peer} failed: {reason}")]
    Connection {
        /// Peer name or address
        peer: String,
        /// Underlying failure
        reason: String,
    },

    /// Node configuration could not be loaded or is invalid
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What was wrong
        reason: String,
    },

    /// The command processor has stopped accepting commands
    #[error("engine is shutting down")]
    ShuttingDown,
}

impl GeoError {
    /// Create an `InvalidIdentity` error
    pub fn invalid_identity(reason: impl Into<String>) -> Self {
        GeoError::InvalidIdentity {
            reason: reason.into(),
        }
    }

    /// Create a `NotFound` error
    pub fn not_found(id: impl Into<String>) -> Self {
        GeoError::NotFound { id: id.into() }
    }

    /// Create a `Decode` error
    pub fn decode(reason: impl Into<String>) -> Self {
        GeoError::Decode {
            reason: reason.into(),
        }
    }

    /// Create an `InvalidConfig` error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        GeoError::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// HTTP status class a facade should surface for this error
    pub fn status_code(&self) -> u16 {
        match self {
            GeoError::InvalidIdentity { .. } | GeoError::Decode { .. } => 400,
            GeoError::NotFound { .. } => 404,
            GeoError::NotLeader { .. } => 409,
            GeoError::Io(_) | GeoError::Connection { .. } | GeoError::InvalidConfig { .. } => 500,
            GeoError::ShuttingDown => 503,
        }
    }

    /// True for errors caused by the caller rather than the node
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

impl From<serde_json::Error> for GeoError {
    fn from(e: serde_json::Error) -> Self {
        match e.classify() {
            serde_json::error::Category::Io => GeoError::Io(e.into()),
            _ => GeoError::decode(e.to_string()),
        }
    }
}
