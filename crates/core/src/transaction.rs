//! Transactions and the per-origin vector clock.
//!
//! A [`Transaction`] is the unit of both the write-ahead log and
//! replication. Its `(origin_node, sequence)` pair is the idempotency key:
//! the [`VectorClock`] remembers the highest sequence applied per origin and
//! admits a transaction only if its sequence is strictly greater.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GeoResult;
use crate::feature::Feature;

/// Mutation kind carried by a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Add (or overwrite) a feature
    Insert,
    /// Swap the stored feature for a new version
    Replace,
    /// Remove a feature
    Delete,
}

impl Action {
    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Insert => "insert",
            Action::Replace => "replace",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One committed mutation.
///
/// Wire format (log line and replication frame):
///
/// ```json
/// {"action":"insert","originNode":"storage1","sequence":7,"feature":{...}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// What the transaction does
    pub action: Action,
    /// Node whose engine produced the transaction
    pub origin_node: String,
    /// Per-origin sequence number, strictly increasing, never reused
    pub sequence: u64,
    /// The feature inserted/replaced, or the last stored version for deletes
    pub feature: Feature,
}

impl Transaction {
    /// Create a transaction.
    pub fn new(
        action: Action,
        origin_node: impl Into<String>,
        sequence: u64,
        feature: Feature,
    ) -> Self {
        Transaction {
            action,
            origin_node: origin_node.into(),
            sequence,
            feature,
        }
    }

    /// Serialize as a single JSON document (no trailing newline).
    pub fn to_json(&self) -> GeoResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a single JSON document.
    pub fn from_json(bytes: &[u8]) -> GeoResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Highest sequence applied locally, per origin node.
///
/// Monotonically non-decreasing per key for the life of a node. Used only
/// for deduplication, never for ordering across origins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock(BTreeMap<String, u64>);

impl VectorClock {
    /// Empty clock.
    pub fn new() -> Self {
        VectorClock::default()
    }

    /// Highest applied sequence for `node` (0 if never seen).
    pub fn get(&self, node: &str) -> u64 {
        self.0.get(node).copied().unwrap_or(0)
    }

    /// Would a transaction `(node, sequence)` be applied?
    pub fn admits(&self, node: &str, sequence: u64) -> bool {
        sequence > self.get(node)
    }

    /// Record `(node, sequence)` if it advances the clock.
    ///
    /// Returns `true` if the clock moved, meaning the caller should apply
    /// the corresponding transaction.
    pub fn observe(&mut self, node: &str, sequence: u64) -> bool {
        if !self.admits(node, sequence) {
            return false;
        }
        self.0.insert(node.to_string(), sequence);
        true
    }

    /// Iterate `(node, sequence)` pairs in node order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of origins tracked.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no origin has been observed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        VectorClock(iter.into_iter().collect())
    }
}
