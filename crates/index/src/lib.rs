//! Spatial index for geostore
//!
//! A thin wrapper over an R-tree keyed by [`BoundingRect`]. Each entry pairs
//! a rectangle with an opaque reference (the feature id). The wrapper offers
//! exactly three mutations/queries:
//!
//! - `insert(rect, id)`
//! - `remove(rect, id)`: exact match on both rectangle and id
//! - `search(rect)`: every entry whose rectangle intersects the query
//!
//! Removal needs the rectangle the entry was inserted with, so callers must
//! compute it from the feature's *stored* geometry before replacing it.

#![warn(missing_docs)]
#![warn(clippy::all)]

use geostore_core::BoundingRect;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, RTreeObject, AABB};

type Entry = GeomWithData<Rectangle<[f64; 2]>, String>;

fn to_rectangle(rect: &BoundingRect) -> Rectangle<[f64; 2]> {
    Rectangle::from_corners(rect.min, rect.max)
}

fn to_envelope(rect: &BoundingRect) -> AABB<[f64; 2]> {
    AABB::from_corners(rect.min, rect.max)
}

/// Rectangle-keyed spatial index over feature ids.
#[derive(Debug, Default)]
pub struct SpatialIndex {
    tree: RTree<Entry>,
}

impl SpatialIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        SpatialIndex { tree: RTree::new() }
    }

    /// Build an index in one pass from `(rect, id)` pairs.
    ///
    /// Used when rebuilding from a loaded checkpoint; bulk loading produces a
    /// better-balanced tree than repeated inserts.
    pub fn bulk_load<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (BoundingRect, String)>,
    {
        let entries: Vec<Entry> = entries
            .into_iter()
            .map(|(rect, id)| GeomWithData::new(to_rectangle(&rect), id))
            .collect();
        tracing::debug!(entries = entries.len(), "Bulk loading spatial index");
        SpatialIndex {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Insert an entry.
    pub fn insert(&mut self, rect: BoundingRect, id: impl Into<String>) {
        self.tree
            .insert(GeomWithData::new(to_rectangle(&rect), id.into()));
    }

    /// Remove the entry matching both `rect` and `id` exactly.
    ///
    /// Returns `false` if no such entry exists.
    pub fn remove(&mut self, rect: &BoundingRect, id: &str) -> bool {
        let entry = GeomWithData::new(to_rectangle(rect), id.to_string());
        self.tree.remove(&entry).is_some()
    }

    /// Ids of every entry whose rectangle intersects `rect`.
    ///
    /// Order is unspecified but stable for a given tree state.
    pub fn search(&self, rect: &BoundingRect) -> Vec<&str> {
        self.tree
            .locate_in_envelope_intersecting(&to_envelope(rect))
            .map(|entry| entry.data.as_str())
            .collect()
    }

    /// Every `(rect, id)` entry, in tree order.
    pub fn entries(&self) -> impl Iterator<Item = (BoundingRect, &str)> {
        self.tree.iter().map(|entry| {
            let env = entry.geom().envelope();
            (
                BoundingRect {
                    min: env.lower(),
                    max: env.upper(),
                },
                entry.data.as_str(),
            )
        })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// True if the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
