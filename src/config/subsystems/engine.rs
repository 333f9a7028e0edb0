// src/config/subsystems/engine.rs

use serde::{Serialize, Deserialize};
use crate::error::{Error, Result};
use crate::config::FromIni;
use crate::engine::SuperclusterOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Tile extent the cluster radius is measured in
    pub tile_extent: f64,
    /// Minimum number of points to form a cluster
    pub min_points: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let defaults = SuperclusterOptions::default();
        Self {
            tile_extent: defaults.extent,
            min_points: defaults.min_points,
        }
    }
}

impl FromIni for EngineConfig {
    fn from_ini_section(&mut self, section_name: &str, key: &str, value: &str) -> Option<Result<()>> {
        if section_name != "engine" {
            return None;
        }

        match key {
            "extent" => {
                match value.parse::<f64>() {
                    Ok(extent) if extent.is_finite() && extent > 0.0 => {
                        self.tile_extent = extent;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid extent (must be > 0): {}", value)
                    ))),
                }
            },
            "min_points" => {
                match value.parse::<usize>() {
                    Ok(min_points) if min_points >= 2 => {
                        self.min_points = min_points;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid min_points (must be >= 2): {}", value)
                    ))),
                }
            },
            _ => None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.tile_extent.is_finite() || self.tile_extent <= 0.0 {
            return Err(Error::Config(
                "tile extent must be greater than 0".to_string()
            ));
        }
        if self.min_points < 2 {
            return Err(Error::Config(
                "min_points must be at least 2".to_string()
            ));
        }
        Ok(())
    }
}
