//! GeoJSON features and feature collections.
//!
//! A [`Feature`] is identified by its `id`. On the wire the id may be any
//! JSON value, but only a non-empty string is a usable identity; everything
//! else is rejected with `InvalidIdentity` when the feature reaches the engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{GeoError, GeoResult};
use crate::geometry::{BoundingRect, Geometry};

/// A uniquely identified geographic record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature {
    /// Feature identity; must be a non-empty string to be stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Geometry the feature is indexed by
    pub geometry: Geometry,
    /// Opaque key/value properties
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Feature {
    /// Create a feature with a string id and no properties.
    pub fn new(id: impl Into<String>, geometry: Geometry) -> Self {
        Feature {
            id: Some(Value::String(id.into())),
            geometry,
            properties: Map::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// The usable string identity of this feature.
    pub fn key(&self) -> GeoResult<&str> {
        match &self.id {
            Some(Value::String(s)) if !s.is_empty() => Ok(s.as_str()),
            Some(Value::String(_)) => Err(GeoError::invalid_identity("feature id is empty")),
            Some(other) => Err(GeoError::invalid_identity(format!(
                "feature id must be a string, got {}",
                other
            ))),
            None => Err(GeoError::invalid_identity("feature has no id")),
        }
    }

    /// Bounding rectangle of the current geometry.
    pub fn bounding_rect(&self) -> BoundingRect {
        self.geometry.bounding_rect()
    }
}

/// A GeoJSON feature collection, the shape range queries are returned in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection {
    /// Member features
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    /// Number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// True if there are no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl From<Vec<Feature>> for FeatureCollection {
    fn from(features: Vec<Feature>) -> Self {
        FeatureCollection { features }
    }
}
