//! Core types for geostore
//!
//! This crate defines the foundational types used throughout the system:
//! - Geometry: GeoJSON geometry values and bounding rectangles
//! - Feature: identified geographic records and feature collections
//! - Transaction: the unit of logging and replication
//! - VectorClock: per-origin highest-applied sequence table
//! - Error: the shared error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod feature;
pub mod geometry;
pub mod transaction;

pub use error::{GeoError, GeoResult};
pub use feature::{Feature, FeatureCollection};
pub use geometry::{BoundingRect, Geometry, Position};
pub use transaction::{Action, Transaction, VectorClock};
