// src/config/subsystems/view.rs

use geo_types::coord;
use serde::{Serialize, Deserialize};
use crate::error::{Error, Result};
use crate::config::FromIni;
use crate::proj::Projection;
use crate::types::Extent;
use crate::view::{MapView, DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM, TILE_SIZE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewConfig {
    pub projection: Projection,
    pub min_zoom: f64,
    pub max_zoom: f64,

    // Initial viewport
    pub zoom: f64,
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            projection: Projection::WebMercator,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            zoom: 0.0,
            center_x: 0.0,
            center_y: 0.0,
            width: TILE_SIZE,
            height: TILE_SIZE,
        }
    }
}

fn parse_number(key: &str, value: &str) -> Result<f64> {
    match value.parse::<f64>() {
        Ok(number) if number.is_finite() => Ok(number),
        _ => Err(Error::Config(format!("Invalid {}: {}", key, value))),
    }
}

impl FromIni for ViewConfig {
    fn from_ini_section(&mut self, section_name: &str, key: &str, value: &str) -> Option<Result<()>> {
        if section_name != "view" {
            return None;
        }

        let target = match key {
            "projection" => {
                return Some(Projection::from_code(value).map(|projection| {
                    self.projection = projection;
                }));
            },
            "min_zoom" => &mut self.min_zoom,
            "max_zoom" => &mut self.max_zoom,
            "zoom" => &mut self.zoom,
            "center_x" => &mut self.center_x,
            "center_y" => &mut self.center_y,
            "width" => &mut self.width,
            "height" => &mut self.height,
            _ => return None,
        };

        Some(parse_number(key, value).map(|number| *target = number))
    }
}

impl ViewConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_zoom < 0.0 || self.min_zoom > self.max_zoom {
            return Err(Error::Config(format!(
                "min_zoom ({}) must be >= 0 and not exceed max_zoom ({})", self.min_zoom, self.max_zoom
            )));
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(Error::Config(
                "viewport width and height must be greater than 0".to_string()
            ));
        }
        Ok(())
    }

    pub fn build_view(&self) -> Result<MapView> {
        let view = MapView::new(self.projection).with_zoom_range(self.min_zoom, self.max_zoom)?;
        view.set_center(coord! { x: self.center_x, y: self.center_y });
        view.set_zoom(self.zoom.clamp(self.min_zoom, self.max_zoom));
        Ok(view)
    }

    /// Extent of the configured viewport on `view`.
    pub fn viewport_extent(&self, view: &MapView) -> Extent {
        view.calculate_extent([self.width, self.height])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::View;

    #[test]
    fn parses_numbers_and_projection() {
        let mut config = ViewConfig::default();
        assert!(config.from_ini_section("view", "projection", "EPSG:4326").unwrap().is_ok());
        assert!(config.from_ini_section("view", "zoom", "3").unwrap().is_ok());
        assert!(config.from_ini_section("view", "max_zoom", "18").unwrap().is_ok());
        assert_eq!(config.projection, Projection::Geographic);
        assert_eq!(config.zoom, 3.0);
        assert!(config.from_ini_section("view", "zoom", "far").unwrap().is_err());
        assert!(config.from_ini_section("view", "projection", "EPSG:2056").unwrap().is_err());
    }

    #[test]
    fn builds_view_at_configured_zoom() {
        let config = ViewConfig { zoom: 4.0, max_zoom: 20.0, ..Default::default() };
        let view = config.build_view().unwrap();
        assert!((view.zoom() - 4.0).abs() < 1e-9);
        assert_eq!(view.max_zoom(), 20.0);
        let extent = config.viewport_extent(&view);
        assert!((extent.width() - view.resolution() * 256.0).abs() < 1e-6);
    }
}
