//! In-memory engine state: feature table, spatial index, vector clock.
//!
//! The feature table is authoritative. The index is derived and kept in
//! lockstep: every table mutation is paired with exactly one index mutation
//! using the rectangle of the geometry being added or removed.

use std::collections::{BTreeMap, BTreeSet};

use geostore_core::{Action, BoundingRect, Feature, Transaction, VectorClock};
use geostore_durability::{CheckpointData, RecoveryTarget};
use geostore_index::SpatialIndex;
use tracing::warn;

/// Feature table plus its derived index and the vector clock.
#[derive(Debug, Default)]
pub struct EngineState {
    features: BTreeMap<String, Feature>,
    index: SpatialIndex,
    vclock: VectorClock,
}

impl EngineState {
    /// Empty state.
    pub fn new() -> Self {
        EngineState::default()
    }

    /// Apply `txn` only if the vector clock admits it.
    ///
    /// Returns `true` if the transaction was applied. A transaction whose
    /// feature has no usable id is dropped without touching the clock.
    pub fn apply_if_new(&mut self, txn: &Transaction) -> bool {
        let id = match txn.feature.key() {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    origin = %txn.origin_node,
                    sequence = txn.sequence,
                    error = %e,
                    "Dropping transaction without a usable feature id"
                );
                return false;
            }
        };
        if !self.vclock.observe(&txn.origin_node, txn.sequence) {
            return false;
        }
        self.apply_to_table(txn.action, id, &txn.feature);
        true
    }

    fn apply_to_table(&mut self, action: Action, id: &str, feature: &Feature) {
        // The index entry must be removed with the rectangle it was inserted under
        if let Some(old) = self.features.remove(id) {
            self.index.remove(&old.bounding_rect(), id);
        }
        match action {
            Action::Insert | Action::Replace => {
                self.index.insert(feature.bounding_rect(), id);
                self.features.insert(id.to_string(), feature.clone());
            }
            Action::Delete => {}
        }
    }

    /// Features whose bounding rectangle intersects `rect`.
    pub fn search(&self, rect: &BoundingRect) -> Vec<Feature> {
        self.index
            .search(rect)
            .into_iter()
            .filter_map(|id| self.features.get(id).cloned())
            .collect()
    }

    /// Stored feature by id.
    pub fn get(&self, id: &str) -> Option<&Feature> {
        self.features.get(id)
    }

    /// True if `id` is stored.
    pub fn contains(&self, id: &str) -> bool {
        self.features.contains_key(id)
    }

    /// Number of stored features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// True if no features are stored.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Number of index entries.
    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    /// Current vector clock.
    pub fn vclock(&self) -> &VectorClock {
        &self.vclock
    }

    /// Snapshot of the table and clock for the checkpoint store.
    pub fn checkpoint_data(&self) -> CheckpointData {
        CheckpointData {
            features: self.features.clone(),
            vclock: self.vclock.clone(),
        }
    }

    /// Check that every table entry has exactly one matching index entry.
    pub fn is_consistent(&self) -> bool {
        if self.index.len() != self.features.len() {
            return false;
        }
        let mut seen = BTreeSet::new();
        self.index.entries().all(|(rect, id)| {
            seen.insert(id) && self.features.get(id).map(|f| f.bounding_rect()) == Some(rect)
        })
    }
}

impl RecoveryTarget for EngineState {
    fn restore_checkpoint(&mut self, data: CheckpointData) {
        self.index = SpatialIndex::bulk_load(
            data.features
                .iter()
                .map(|(id, f)| (f.bounding_rect(), id.clone())),
        );
        self.features = data.features;
        self.vclock = data.vclock;
    }

    fn replay(&mut self, txn: Transaction) -> bool {
        self.apply_if_new(&txn)
    }
}
