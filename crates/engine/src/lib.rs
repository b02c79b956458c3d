//! Command processor for geostore
//!
//! A single thread owns all mutable state and applies commands in the order
//! it dequeues them:
//!
//! - `config`: `geostore.toml` node configuration
//! - `state`: feature table, spatial index and vector clock
//! - `command`: the command set and reply channels
//! - `engine`: recovery, the processing loop, checkpointing
//! - `handle`: async client for the processing thread
//! - `sink`: hand-off point to replication

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod config;
pub mod engine;
pub mod handle;
pub mod sink;
pub mod state;
pub mod stats;

pub use command::Command;
pub use config::{NodeConfig, PeerConfig, ReplicationConfig, Role};
pub use engine::Engine;
pub use handle::EngineHandle;
pub use sink::{NoReplication, ReplicationSink};
pub use state::EngineState;
pub use stats::EngineStats;
