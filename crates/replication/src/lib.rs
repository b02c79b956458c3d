//! Leader→follower replication for geostore
//!
//! - `codec`: length-delimited JSON transaction frames
//! - `peer`: per-peer link state machine and actor task
//! - `broadcaster`: the leader's [`ReplicationSink`](geostore_engine::ReplicationSink)
//! - `listener`: the follower's accept loop feeding `apply_replicated`
//!
//! Replication is fire-and-forget: the leader never waits for followers and
//! followers never acknowledge. Idempotency comes from the vector clock on
//! the receiving engine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod broadcaster;
pub mod codec;
pub mod error;
pub mod listener;
pub mod peer;

pub use broadcaster::Broadcaster;
pub use codec::{TransactionCodec, MAX_FRAME_LENGTH};
pub use error::ReplicationError;
pub use listener::ReplicationListener;
pub use peer::{PeerState, PeerStatus};
