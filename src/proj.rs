//! Web Mercator and geographic projections, and transforms between them.
//!
//! Only the two projections a web map clusters in are supported; anything
//! else is rejected with `Error::UnknownProjection`.

use std::f64::consts::PI;
use std::fmt;
use serde::{Serialize, Deserialize};
use crate::error::{Error, Result};
use geo_types::{coord, Rect};
use crate::types::{extent_from_bounds, Coordinate, Extent};

/// Sphere radius used by EPSG:3857
pub const RADIUS: f64 = 6378137.0;
pub const HALF_SIZE: f64 = PI * RADIUS;

const WEB_MERCATOR_CODES: &[&str] = &[
    "EPSG:3857",
    "EPSG:102100",
    "EPSG:102113",
    "EPSG:900913",
    "http://www.opengis.net/def/crs/EPSG/0/3857",
    "urn:ogc:def:crs:EPSG::3857",
];

const GEOGRAPHIC_CODES: &[&str] = &[
    "EPSG:4326",
    "CRS:84",
    "WGS84",
    "http://www.opengis.net/def/crs/EPSG/0/4326",
    "urn:ogc:def:crs:EPSG::4326",
    "urn:ogc:def:crs:OGC:1.3:CRS84",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Projection {
    /// Spherical Mercator in meters
    WebMercator,
    /// Longitude/latitude in degrees
    Geographic,
}

impl Projection {
    pub fn from_code(code: &str) -> Result<Self> {
        let code = code.trim().trim_matches('"');
        if WEB_MERCATOR_CODES.iter().any(|c| c.eq_ignore_ascii_case(code)) {
            Ok(Projection::WebMercator)
        } else if GEOGRAPHIC_CODES.iter().any(|c| c.eq_ignore_ascii_case(code)) {
            Ok(Projection::Geographic)
        } else {
            Err(Error::UnknownProjection(code.to_string()))
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Projection::WebMercator => "EPSG:3857",
            Projection::Geographic => "EPSG:4326",
        }
    }

    /// Whether coordinates in `self` can be used as-is in `other`.
    pub fn equivalent(&self, other: &Projection) -> bool {
        self == other
    }

    pub fn extent(&self) -> Extent {
        match self {
            Projection::WebMercator => extent_from_bounds(-HALF_SIZE, -HALF_SIZE, HALF_SIZE, HALF_SIZE),
            Projection::Geographic => extent_from_bounds(-180.0, -90.0, 180.0, 90.0),
        }
    }
}

impl Default for Projection {
    fn default() -> Self {
        Projection::WebMercator
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

fn lon_lat_to_mercator(coord: Coordinate) -> Coordinate {
    let x = RADIUS * coord.x.to_radians();
    let mut y = RADIUS * (PI * (coord.y + 90.0) / 360.0).tan().ln();
    // Poles map to infinity; pin them to the square world.
    if y > HALF_SIZE {
        y = HALF_SIZE;
    } else if y < -HALF_SIZE {
        y = -HALF_SIZE;
    }
    coord! { x: x, y: y }
}

fn mercator_to_lon_lat(coord: Coordinate) -> Coordinate {
    let lon = 180.0 * coord.x / HALF_SIZE;
    let lat = 360.0 * (coord.y / RADIUS).exp().atan() / PI - 90.0;
    coord! { x: lon, y: lat }
}

pub fn transform(coord: Coordinate, from: Projection, to: Projection) -> Coordinate {
    match (from, to) {
        (Projection::Geographic, Projection::WebMercator) => lon_lat_to_mercator(coord),
        (Projection::WebMercator, Projection::Geographic) => mercator_to_lon_lat(coord),
        _ => coord,
    }
}

/// Transforms an extent through its corners. Both supported transforms are
/// monotonic per axis, so the corners bound the result.
pub fn transform_extent(extent: &Extent, from: Projection, to: Projection) -> Extent {
    if from.equivalent(&to) {
        return *extent;
    }
    let (min, max) = (extent.min(), extent.max());
    let corners = [
        min,
        coord! { x: max.x, y: min.y },
        max,
        coord! { x: min.x, y: max.y },
    ].map(|c| transform(c, from, to));

    let (mut low, mut high) = (corners[0], corners[0]);
    for c in &corners[1..] {
        low = coord! { x: low.x.min(c.x), y: low.y.min(c.y) };
        high = coord! { x: high.x.max(c.x), y: high.y.max(c.y) };
    }
    Rect::new(low, high)
}

pub fn to_lon_lat(coord: Coordinate, projection: Projection) -> Coordinate {
    transform(coord, projection, Projection::Geographic)
}

pub fn from_lon_lat(coord: Coordinate, projection: Projection) -> Coordinate {
    transform(coord, Projection::Geographic, projection)
}
