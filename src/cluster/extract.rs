// cluster/extract.rs
use geo_types::Point;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::proj::{self, Projection};
use crate::types::{Coordinate, Feature, Geometry};

/// A point handed to the clustering engine, in longitude/latitude.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterPoint {
    pub lon_lat: Coordinate,
    pub properties: Map<String, Value>,
}

/// Turns a feature (in the source's projection) into clustering input.
/// An empty result leaves the feature out of clustering.
pub type PointExtractor = Box<dyn Fn(&Feature, Projection) -> Result<Vec<ClusterPoint>>>;

pub fn default_extractor() -> PointExtractor {
    Box::new(point_geometry)
}

/// Accepts point geometries only. Anything else is a configuration error
/// that a custom extractor has to handle.
pub fn point_geometry(feature: &Feature, projection: Projection) -> Result<Vec<ClusterPoint>> {
    match &feature.geometry {
        Some(Geometry::Point(point)) => Ok(vec![ClusterPoint {
            lon_lat: proj::to_lon_lat(point.0, projection),
            properties: feature.properties.clone(),
        }]),
        Some(other) => Err(Error::unsupported_geometry(other.kind())),
        None => Err(Error::unsupported_geometry("no geometry")),
    }
}

/// One clustering point per vertex of a `Point` or `MultiPoint`; other
/// geometries are skipped.
pub fn point_vertices(feature: &Feature, projection: Projection) -> Result<Vec<ClusterPoint>> {
    let points: &[Point<f64>] = match &feature.geometry {
        Some(Geometry::Point(point)) => std::slice::from_ref(point),
        Some(Geometry::MultiPoint(points)) => &points.0,
        _ => return Ok(Vec::new()),
    };
    Ok(points.iter()
        .map(|p| ClusterPoint {
            lon_lat: proj::to_lon_lat(p.0, projection),
            properties: feature.properties.clone(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{coord, LineString, MultiPoint, Polygon};

    #[test]
    fn default_extractor_projects_points() {
        let feature = Feature::point([0.0, 0.0]).with_property("kind", "cafe");
        let points = point_geometry(&feature, Projection::WebMercator).unwrap();
        assert_eq!(points.len(), 1);
        assert!(points[0].lon_lat.x.abs() < 1e-9 && points[0].lon_lat.y.abs() < 1e-9);
        assert_eq!(points[0].properties.get("kind"), Some(&Value::from("cafe")));
    }

    #[test]
    fn default_extractor_rejects_other_geometries() {
        let line = Feature::new(Geometry::LineString(LineString::from(vec![[0.0, 0.0], [1.0, 1.0]])));
        match point_geometry(&line, Projection::WebMercator) {
            Err(Error::UnsupportedGeometry(kind)) => assert_eq!(kind, "LineString"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(point_geometry(&Feature::default(), Projection::Geographic).is_err());
    }

    #[test]
    fn vertex_extractor_expands_multipoints() {
        let feature = Feature::new(Geometry::MultiPoint(MultiPoint::from(vec![[1.0, 2.0], [3.0, 4.0]])));
        let points = point_vertices(&feature, Projection::Geographic).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].lon_lat, coord! { x: 3.0, y: 4.0 });

        let polygon = Feature::new(Geometry::Polygon(Polygon::new(
            LineString::from(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]),
            Vec::new(),
        )));
        assert!(point_vertices(&polygon, Projection::Geographic).unwrap().is_empty());
    }
}
