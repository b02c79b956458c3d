//! Integration tests for durability.
//!
//! These run a full node lifecycle (start → write → stop or crash → start)
//! against a real data directory. Log framing, checkpoint swap and replay
//! logic are unit tested in crates/durability.

#[path = "../common/mod.rs"]
mod common;

mod crash_recovery;
mod history;
mod restart;
