//! The command processor.
//!
//! One dedicated thread owns the feature table, spatial index, sequence
//! counter, vector clock, log and checkpoint store. Everything else talks to
//! it through [`EngineHandle`](crate::EngineHandle) by sending a
//! [`Command`] and waiting on the reply.
//!
//! ## Leader mutation order
//!
//! 1. Validate role, feature id and geometry
//! 2. Assign the next sequence number (consumed even if the append fails)
//! 3. Append the transaction to the log
//! 4. Apply it to table and index, advancing `vclock[self]`
//! 5. Reply to the caller
//! 6. Hand the transaction to the replication sink
//!
//! A failed append leaves in-memory state untouched.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use geostore_core::{Action, Feature, GeoError, GeoResult, Transaction};
use geostore_durability::{
    CheckpointInfo, CheckpointStore, DataPaths, RecoveryCoordinator, RecoveryStats,
    TransactionLog,
};
use tracing::{debug, error, info, warn};

use crate::command::{Command, Reply};
use crate::config::{NodeConfig, Role};
use crate::handle::EngineHandle;
use crate::sink::ReplicationSink;
use crate::state::EngineState;
use crate::stats::EngineStats;

/// A running engine: the processing thread plus a handle to it.
pub struct Engine {
    handle: EngineHandle,
    recovery: RecoveryStats,
    thread: Option<JoinHandle<()>>,
}

impl Engine {
    /// Recover state from `paths` and start the processing thread.
    ///
    /// Returns only after recovery has finished, so no command is ever
    /// served against partially rebuilt state.
    pub fn start(
        config: &NodeConfig,
        paths: &DataPaths,
        sink: Arc<dyn ReplicationSink>,
    ) -> GeoResult<Engine> {
        config.validate()?;
        paths.create_directories()?;

        let mut state = EngineState::new();
        let recovery = RecoveryCoordinator::new(paths.clone()).recover(&mut state)?;
        let sequence = state.vclock().get(&config.node);
        let log = TransactionLog::open(paths.log(), config.durability_mode()?)?;

        info!(
            node = %config.node,
            role = %config.role,
            features = state.len(),
            next_sequence = sequence + 1,
            "Engine recovered"
        );

        let processor = Processor {
            node: config.node.clone(),
            role: config.role,
            state,
            sequence,
            log,
            checkpoints: CheckpointStore::new(paths),
            checkpoint_interval: config.checkpoint_interval(),
            last_checkpoint: Instant::now(),
            dirty: false,
            checkpoint_count: 0,
            sink,
        };

        let (tx, rx) = mpsc::channel();
        let thread = std::thread::Builder::new()
            .name(format!("geostore-engine-{}", config.node))
            .spawn(move || processor.run(rx))?;

        Ok(Engine {
            handle: EngineHandle::new(tx, config.node.clone()),
            recovery,
            thread: Some(thread),
        })
    }

    /// A cloneable handle for submitting commands.
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// What recovery found on startup.
    pub fn recovery_stats(&self) -> &RecoveryStats {
        &self.recovery
    }

    /// Wait for the processing thread to exit.
    ///
    /// The thread exits after a `Shutdown` command or once every handle
    /// has been dropped.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(node = %self.handle.node(), "Engine thread panicked");
            }
        }
    }
}

struct Processor {
    node: String,
    role: Role,
    state: EngineState,
    sequence: u64,
    log: TransactionLog,
    checkpoints: CheckpointStore,
    checkpoint_interval: Option<Duration>,
    last_checkpoint: Instant,
    dirty: bool,
    checkpoint_count: u64,
    sink: Arc<dyn ReplicationSink>,
}

impl Processor {
    fn run(mut self, rx: Receiver<Command>) {
        debug!(node = %self.node, "Engine thread started");

        loop {
            let next = match self.checkpoint_interval {
                Some(interval) => {
                    let wait = interval.saturating_sub(self.last_checkpoint.elapsed());
                    rx.recv_timeout(wait)
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match next {
                Ok(Command::Shutdown { reply }) => {
                    let result = self.checkpoint().map(|_| ());
                    if let Err(e) = &result {
                        error!(node = %self.node, error = %e, "Final checkpoint failed");
                    }
                    let _ = reply.send(result);
                    break;
                }
                Ok(cmd) => {
                    self.handle(cmd);
                    if self.checkpoint_due() {
                        self.periodic_checkpoint();
                    }
                }
                Err(RecvTimeoutError::Timeout) => self.periodic_checkpoint(),
                Err(RecvTimeoutError::Disconnected) => {
                    if let Err(e) = self.checkpoint() {
                        error!(node = %self.node, error = %e, "Final checkpoint failed");
                    }
                    break;
                }
            }
        }

        // Commands that raced with shutdown
        while let Ok(cmd) = rx.try_recv() {
            cmd.reject(GeoError::ShuttingDown);
        }
        info!(node = %self.node, "Engine stopped");
    }

    fn handle(&mut self, cmd: Command) {
        debug!(node = %self.node, command = cmd.name(), "Processing command");

        match cmd {
            Command::Insert { feature, reply } => {
                let result = self.mutate(Action::Insert, feature);
                self.finish_mutation(result, reply);
            }
            Command::Replace { feature, reply } => {
                let result = self.mutate(Action::Replace, feature);
                self.finish_mutation(result, reply);
            }
            Command::Delete { id, reply } => {
                let result = self.delete(id);
                self.finish_mutation(result, reply);
            }
            Command::Search { rect, reply } => {
                let _ = reply.send(Ok(self.state.search(&rect)));
            }
            Command::Checkpoint { reply } => {
                let _ = reply.send(self.checkpoint());
            }
            Command::ApplyReplicated { txn, reply } => {
                // Our own sequence numbers are only ever assigned here
                if txn.origin_node == self.node {
                    warn!(
                        node = %self.node,
                        sequence = txn.sequence,
                        "Ignoring replicated transaction carrying this node's origin"
                    );
                    let _ = reply.send(Ok(false));
                    return;
                }
                let applied = self.state.apply_if_new(&txn);
                if applied {
                    self.dirty = true;
                } else {
                    debug!(
                        origin = %txn.origin_node,
                        sequence = txn.sequence,
                        "Skipping already-applied transaction"
                    );
                }
                let _ = reply.send(Ok(applied));
            }
            Command::Stats { reply } => {
                let _ = reply.send(Ok(self.stats()));
            }
            Command::Shutdown { reply } => {
                // Handled in run()
                let _ = reply.send(Err(GeoError::ShuttingDown));
            }
        }
    }

    fn finish_mutation(&mut self, result: GeoResult<Transaction>, reply: Reply<u64>) {
        match result {
            Ok(txn) => {
                let _ = reply.send(Ok(txn.sequence));
                self.sink.broadcast(&txn);
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    fn ensure_leader(&self) -> GeoResult<()> {
        match self.role {
            Role::Leader => Ok(()),
            Role::Follower => Err(GeoError::NotLeader {
                node: self.node.clone(),
            }),
        }
    }

    fn mutate(&mut self, action: Action, feature: Feature) -> GeoResult<Transaction> {
        self.ensure_leader()?;
        feature.key()?;
        feature.geometry.validate()?;
        self.commit(action, feature)
    }

    fn delete(&mut self, id: String) -> GeoResult<Transaction> {
        self.ensure_leader()?;
        if id.is_empty() {
            return Err(GeoError::invalid_identity("feature id is empty"));
        }
        // The record carries the last stored version so its rectangle is recoverable
        let feature = self
            .state
            .get(&id)
            .cloned()
            .ok_or_else(|| GeoError::not_found(id))?;
        self.commit(Action::Delete, feature)
    }

    fn commit(&mut self, action: Action, feature: Feature) -> GeoResult<Transaction> {
        self.sequence += 1;
        let txn = Transaction::new(action, self.node.as_str(), self.sequence, feature);

        if let Err(e) = self.log.append(&txn) {
            warn!(
                node = %self.node,
                sequence = txn.sequence,
                error = %e,
                "Log append failed; mutation not applied"
            );
            return Err(e.into());
        }

        let applied = self.state.apply_if_new(&txn);
        debug_assert!(applied, "local commit rejected by the vector clock");
        if !applied {
            // Logged but not applied: the clock is ahead of our counter
            error!(
                node = %self.node,
                sequence = txn.sequence,
                clock = self.state.vclock().get(&self.node),
                "Committed transaction was not applied"
            );
        }
        self.dirty = true;
        debug!(
            node = %self.node,
            action = %txn.action,
            sequence = txn.sequence,
            "Committed transaction"
        );
        Ok(txn)
    }

    fn checkpoint(&mut self) -> GeoResult<CheckpointInfo> {
        let info = self.checkpoints.write(&self.state.checkpoint_data())?;
        // Only reached once the snapshot is durable
        self.log.truncate()?;

        self.last_checkpoint = Instant::now();
        self.dirty = false;
        self.checkpoint_count += 1;
        Ok(info)
    }

    fn checkpoint_due(&self) -> bool {
        self.checkpoint_interval
            .is_some_and(|interval| self.last_checkpoint.elapsed() >= interval)
    }

    fn periodic_checkpoint(&mut self) {
        if !self.dirty {
            self.last_checkpoint = Instant::now();
            return;
        }
        if let Err(e) = self.checkpoint() {
            warn!(node = %self.node, error = %e, "Periodic checkpoint failed");
            // Retry after another full interval rather than spinning
            self.last_checkpoint = Instant::now();
        }
    }

    fn stats(&self) -> EngineStats {
        EngineStats {
            node: self.node.clone(),
            role: self.role,
            features: self.state.len(),
            index_entries: self.state.index_len(),
            next_sequence: self.sequence + 1,
            vclock: self.state.vclock().clone(),
            wal_records: self.log.records_since_truncate(),
            checkpoints: self.checkpoint_count,
        }
    }
}
