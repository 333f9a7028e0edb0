// types.rs
use geo_types::{coord, Coord, LineString, MultiPoint, Point, Polygon, Rect};
use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use std::rc::Rc;

/// A position in whatever projection the owning source works in.
pub type Coordinate = Coord<f64>;

/// Axis-aligned bounds in a source's projection. `Rect` keeps min <= max,
/// and two extents are equal when all four bounds are.
pub type Extent = Rect<f64>;

/// Features are shared between the wrapped source, the cluster output and
/// consumers; identity is `Rc::ptr_eq`.
pub type FeatureRef = Rc<Feature>;

pub fn extent_from_bounds(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Extent {
    Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y })
}

/// `[min_x, min_y, max_x, max_y]`, the bbox order clustering queries take.
pub fn bbox(extent: &Extent) -> [f64; 4] {
    let (min, max) = (extent.min(), extent.max());
    [min.x, min.y, max.x, max.y]
}

/// Feature geometry. Serializes as a GeoJSON geometry object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "GeoJsonGeometry", into = "GeoJsonGeometry")]
pub enum Geometry {
    Point(Point<f64>),
    MultiPoint(MultiPoint<f64>),
    LineString(LineString<f64>),
    Polygon(Polygon<f64>),
}

impl Geometry {
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::LineString(_) => "LineString",
            Geometry::Polygon(_) => "Polygon",
        }
    }

    /// Applies `f` to every coordinate, keeping the geometry type.
    pub fn map_coordinates<F: Fn(Coordinate) -> Coordinate>(&self, f: F) -> Geometry {
        let ring = |line: &LineString<f64>| -> LineString<f64> {
            line.coords().map(|c| f(*c)).collect()
        };
        match self {
            Geometry::Point(p) => Geometry::Point(Point::from(f(p.0))),
            Geometry::MultiPoint(points) => Geometry::MultiPoint(
                points.iter().map(|p| Point::from(f(p.0))).collect()
            ),
            Geometry::LineString(line) => Geometry::LineString(ring(line)),
            Geometry::Polygon(polygon) => Geometry::Polygon(Polygon::new(
                ring(polygon.exterior()),
                polygon.interiors().iter().map(ring).collect(),
            )),
        }
    }
}

// GeoJSON wire shape of `Geometry`
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
enum GeoJsonGeometry {
    Point([f64; 2]),
    MultiPoint(Vec<[f64; 2]>),
    LineString(Vec<[f64; 2]>),
    Polygon(Vec<Vec<[f64; 2]>>),
}

impl From<GeoJsonGeometry> for Geometry {
    fn from(raw: GeoJsonGeometry) -> Self {
        match raw {
            GeoJsonGeometry::Point(c) => Geometry::Point(Point::from(c)),
            GeoJsonGeometry::MultiPoint(coords) => Geometry::MultiPoint(MultiPoint::from(coords)),
            GeoJsonGeometry::LineString(coords) => Geometry::LineString(LineString::from(coords)),
            GeoJsonGeometry::Polygon(rings) => {
                let mut rings = rings.into_iter().map(LineString::from);
                let exterior = rings.next().unwrap_or_else(|| LineString::new(Vec::new()));
                Geometry::Polygon(Polygon::new(exterior, rings.collect()))
            },
        }
    }
}

impl From<Geometry> for GeoJsonGeometry {
    fn from(geometry: Geometry) -> Self {
        let positions = |line: &LineString<f64>| -> Vec<[f64; 2]> {
            line.coords().map(|c| [c.x, c.y]).collect()
        };
        match geometry {
            Geometry::Point(p) => GeoJsonGeometry::Point([p.x(), p.y()]),
            Geometry::MultiPoint(points) => GeoJsonGeometry::MultiPoint(
                points.iter().map(|p| [p.x(), p.y()]).collect()
            ),
            Geometry::LineString(line) => GeoJsonGeometry::LineString(positions(&line)),
            Geometry::Polygon(polygon) => GeoJsonGeometry::Polygon(
                std::iter::once(polygon.exterior())
                    .chain(polygon.interiors())
                    .map(positions)
                    .collect()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureId {
    Number(u64),
    Text(String),
}

/// Cluster metadata carried by the synthetic features a cluster source emits.
#[derive(Debug, Clone)]
pub struct ClusterInfo {
    pub is_cluster: bool,
    /// Engine identifier, present only when `is_cluster` is set
    pub cluster_id: Option<u64>,
    pub point_count: usize,
    /// Eagerly resolved members; `None` in on-demand mode
    pub features: Option<Vec<FeatureRef>>,
}

#[derive(Debug, Clone, Default)]
pub struct Feature {
    pub id: Option<FeatureId>,
    pub geometry: Option<Geometry>,
    pub properties: Map<String, Value>,
    pub cluster: Option<ClusterInfo>,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry: Some(geometry),
            ..Default::default()
        }
    }

    pub fn point<C: Into<Coordinate>>(coord: C) -> Self {
        Self::new(Geometry::Point(Point::from(coord.into())))
    }

    pub fn with_id<I: Into<FeatureId>>(mut self, id: I) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_property<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn is_cluster(&self) -> bool {
        self.cluster.as_ref().map_or(false, |c| c.is_cluster)
    }

    pub fn cluster_id(&self) -> Option<u64> {
        self.cluster.as_ref().and_then(|c| c.cluster_id)
    }

    /// Members attached when the feature was materialized outside on-demand mode.
    pub fn cluster_features(&self) -> Option<&[FeatureRef]> {
        self.cluster.as_ref().and_then(|c| c.features.as_deref())
    }
}

impl From<u64> for FeatureId {
    fn from(id: u64) -> Self {
        FeatureId::Number(id)
    }
}

impl From<&str> for FeatureId {
    fn from(id: &str) -> Self {
        FeatureId::Text(id.to_string())
    }
}

impl From<String> for FeatureId {
    fn from(id: String) -> Self {
        FeatureId::Text(id)
    }
}
