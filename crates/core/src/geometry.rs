//! GeoJSON geometry values and bounding-rectangle derivation.
//!
//! Geometries serialize exactly as GeoJSON geometry objects: a `type`
//! discriminator plus `coordinates` (or `geometries` for collections).
//! The only derived quantity the store needs is the axis-aligned
//! [`BoundingRect`], which keys the spatial index.
//!
//! Coordinates must be finite: JSON has no encoding for NaN or infinity,
//! so such a value could be acknowledged but never read back.

use serde::{Deserialize, Serialize};

use crate::error::{GeoError, GeoResult};

/// A GeoJSON position: `[x, y]` with an optional altitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Position {
    /// Longitude / easting
    pub x: f64,
    /// Latitude / northing
    pub y: f64,
    /// Optional altitude, carried through untouched
    pub z: Option<f64>,
}

impl Position {
    /// Create a 2D position.
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y, z: None }
    }

    /// True if every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.map_or(true, f64::is_finite)
    }
}

impl TryFrom<Vec<f64>> for Position {
    type Error = String;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        if values.iter().any(|v| !v.is_finite()) {
            return Err("position coordinates must be finite".to_string());
        }
        match values.as_slice() {
            [x, y] => Ok(Position::new(*x, *y)),
            [x, y, z] => Ok(Position {
                x: *x,
                y: *y,
                z: Some(*z),
            }),
            other => Err(format!(
                "position must have 2 or 3 elements, got {}",
                other.len()
            )),
        }
    }
}

impl From<Position> for Vec<f64> {
    fn from(p: Position) -> Self {
        match p.z {
            Some(z) => vec![p.x, p.y, z],
            None => vec![p.x, p.y],
        }
    }
}

impl From<[f64; 2]> for Position {
    fn from(xy: [f64; 2]) -> Self {
        Position::new(xy[0], xy[1])
    }
}

/// A GeoJSON geometry object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    /// Single position
    Point {
        /// The point
        coordinates: Position,
    },
    /// Several unconnected positions
    MultiPoint {
        /// The points
        coordinates: Vec<Position>,
    },
    /// Connected line
    LineString {
        /// Vertices in order
        coordinates: Vec<Position>,
    },
    /// Several lines
    MultiLineString {
        /// One vertex list per line
        coordinates: Vec<Vec<Position>>,
    },
    /// Polygon with an exterior ring and optional holes
    Polygon {
        /// Rings, exterior first
        coordinates: Vec<Vec<Position>>,
    },
    /// Several polygons
    MultiPolygon {
        /// One ring list per polygon
        coordinates: Vec<Vec<Vec<Position>>>,
    },
    /// Heterogeneous collection
    GeometryCollection {
        /// Member geometries
        geometries: Vec<Geometry>,
    },
}

impl Geometry {
    /// Shorthand for a point geometry.
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point {
            coordinates: Position::new(x, y),
        }
    }

    /// Shorthand for a line string through the given vertices.
    pub fn line_string(points: &[[f64; 2]]) -> Self {
        Geometry::LineString {
            coordinates: points.iter().copied().map(Position::from).collect(),
        }
    }

    /// Shorthand for a polygon with a single exterior ring.
    pub fn polygon(ring: &[[f64; 2]]) -> Self {
        Geometry::Polygon {
            coordinates: vec![ring.iter().copied().map(Position::from).collect()],
        }
    }

    /// GeoJSON type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point { .. } => "Point",
            Geometry::MultiPoint { .. } => "MultiPoint",
            Geometry::LineString { .. } => "LineString",
            Geometry::MultiLineString { .. } => "MultiLineString",
            Geometry::Polygon { .. } => "Polygon",
            Geometry::MultiPolygon { .. } => "MultiPolygon",
            Geometry::GeometryCollection { .. } => "GeometryCollection",
        }
    }

    /// Visit every position in the geometry.
    pub fn for_each_position(&self, f: &mut impl FnMut(&Position)) {
        match self {
            Geometry::Point { coordinates } => f(coordinates),
            Geometry::MultiPoint { coordinates } | Geometry::LineString { coordinates } => {
                coordinates.iter().for_each(f)
            }
            Geometry::MultiLineString { coordinates } | Geometry::Polygon { coordinates } => {
                coordinates.iter().flatten().for_each(f)
            }
            Geometry::MultiPolygon { coordinates } => {
                coordinates.iter().flatten().flatten().for_each(f)
            }
            Geometry::GeometryCollection { geometries } => {
                for g in geometries {
                    g.for_each_position(f);
                }
            }
        }
    }

    /// True if the geometry contains no positions at all.
    pub fn is_empty(&self) -> bool {
        let mut empty = true;
        self.for_each_position(&mut |_| empty = false);
        empty
    }

    /// Check that every position is finite.
    ///
    /// Fails with `Decode` naming the first offending position.
    pub fn validate(&self) -> GeoResult<()> {
        let mut bad: Option<Position> = None;
        self.for_each_position(&mut |p| {
            if bad.is_none() && !p.is_finite() {
                bad = Some(*p);
            }
        });
        match bad {
            None => Ok(()),
            Some(p) => Err(GeoError::decode(format!(
                "{} has a non-finite position {:?}",
                self.type_name(),
                Vec::<f64>::from(p)
            ))),
        }
    }

    /// Axis-aligned bounding rectangle of every position.
    ///
    /// An empty geometry yields the zero-area rectangle at the origin.
    pub fn bounding_rect(&self) -> BoundingRect {
        let mut rect: Option<BoundingRect> = None;
        self.for_each_position(&mut |p| {
            rect = Some(match rect {
                None => BoundingRect::point(p.x, p.y),
                Some(r) => r.expand(p.x, p.y),
            });
        });
        rect.unwrap_or_else(|| BoundingRect::point(0.0, 0.0))
    }
}

/// Axis-aligned bounding rectangle.
///
/// Used only as the spatial index key; never persisted on its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingRect {
    /// Lower-left corner `(x, y)`
    pub min: [f64; 2],
    /// Upper-right corner `(x, y)`
    pub max: [f64; 2],
}

impl BoundingRect {
    /// Build a rectangle from two corners in any order.
    pub fn new(a: [f64; 2], b: [f64; 2]) -> Self {
        BoundingRect {
            min: [a[0].min(b[0]), a[1].min(b[1])],
            max: [a[0].max(b[0]), a[1].max(b[1])],
        }
    }

    /// Zero-area rectangle at a single coordinate.
    pub fn point(x: f64, y: f64) -> Self {
        BoundingRect {
            min: [x, y],
            max: [x, y],
        }
    }

    /// Grow the rectangle to include `(x, y)`.
    pub fn expand(self, x: f64, y: f64) -> Self {
        BoundingRect {
            min: [self.min[0].min(x), self.min[1].min(y)],
            max: [self.max[0].max(x), self.max[1].max(y)],
        }
    }

    /// Closed-interval intersection test (touching edges intersect).
    pub fn intersects(&self, other: &BoundingRect) -> bool {
        self.min[0] <= other.max[0]
            && self.max[0] >= other.min[0]
            && self.min[1] <= other.max[1]
            && self.max[1] >= other.min[1]
    }

    /// Check whether the rectangle contains a point.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min[0] && x <= self.max[0] && y >= self.min[1] && y <= self.max[1]
    }
}
