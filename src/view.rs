//! Zoom/resolution bookkeeping for the map a cluster source renders into.

use std::cell::Cell;
use log::trace;
use crate::error::{Error, Result};
use crate::proj::Projection;
use geo_types::coord;
use crate::types::{extent_from_bounds, Coordinate, Extent};

/// Pixel size of the tile grid the zoom ladder is derived from
pub const TILE_SIZE: f64 = 256.0;
pub const DEFAULT_MIN_ZOOM: f64 = 0.0;
pub const DEFAULT_MAX_ZOOM: f64 = 28.0;

/// What a cluster source needs to know about the map view.
pub trait View {
    fn min_zoom(&self) -> f64;
    fn max_zoom(&self) -> f64;
    /// Fractional zoom level for a resolution in projection units per pixel.
    fn zoom_for_resolution(&self, resolution: f64) -> f64;
    fn zoom(&self) -> f64;
}

#[derive(Debug)]
pub struct MapView {
    projection: Projection,
    /// Resolution at zoom 0
    base_resolution: f64,
    zoom_factor: f64,
    min_zoom: f64,
    max_zoom: f64,
    center: Cell<Coordinate>,
    resolution: Cell<f64>,
}

impl MapView {
    pub fn new(projection: Projection) -> Self {
        let base_resolution = projection.extent().width() / TILE_SIZE;
        Self {
            projection,
            base_resolution,
            zoom_factor: 2.0,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            center: Cell::new(coord! { x: 0.0, y: 0.0 }),
            resolution: Cell::new(base_resolution),
        }
    }

    pub fn with_zoom_range(mut self, min_zoom: f64, max_zoom: f64) -> Result<Self> {
        if !(min_zoom.is_finite() && max_zoom.is_finite()) || min_zoom < 0.0 || min_zoom > max_zoom {
            return Err(Error::config(format!(
                "Invalid zoom range: min_zoom={} max_zoom={}", min_zoom, max_zoom
            )));
        }
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self.set_zoom(self.zoom().clamp(min_zoom, max_zoom));
        Ok(self)
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn resolution(&self) -> f64 {
        self.resolution.get()
    }

    pub fn set_resolution(&self, resolution: f64) {
        trace!("View resolution set to {}", resolution);
        self.resolution.set(resolution);
    }

    pub fn resolution_for_zoom(&self, zoom: f64) -> f64 {
        self.base_resolution / self.zoom_factor.powf(zoom)
    }

    pub fn set_zoom(&self, zoom: f64) {
        self.set_resolution(self.resolution_for_zoom(zoom));
    }

    pub fn center(&self) -> Coordinate {
        self.center.get()
    }

    pub fn set_center(&self, center: Coordinate) {
        self.center.set(center);
    }

    /// Extent covered by a viewport of `size` pixels at the current center and resolution.
    pub fn calculate_extent(&self, size: [f64; 2]) -> Extent {
        let resolution = self.resolution();
        let center = self.center();
        let half_width = resolution * size[0] / 2.0;
        let half_height = resolution * size[1] / 2.0;
        extent_from_bounds(
            center.x - half_width,
            center.y - half_height,
            center.x + half_width,
            center.y + half_height,
        )
    }
}

impl View for MapView {
    fn min_zoom(&self) -> f64 {
        self.min_zoom
    }

    fn max_zoom(&self) -> f64 {
        self.max_zoom
    }

    fn zoom_for_resolution(&self, resolution: f64) -> f64 {
        (self.base_resolution / resolution).ln() / self.zoom_factor.ln()
    }

    fn zoom(&self) -> f64 {
        self.zoom_for_resolution(self.resolution())
    }
}
