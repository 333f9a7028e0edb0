// src/config/subsystems/cluster.rs

use serde::{Serialize, Deserialize};
use crate::error::{Error, Result};
use crate::config::FromIni;
use crate::cluster::DEFAULT_RADIUS;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    // Clustering distance in pixels
    pub radius: f64,
    pub on_demand: bool,

    // Passed through to the cluster source untouched
    pub wrap_x: bool,
    pub attributions: Vec<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            radius: DEFAULT_RADIUS,
            on_demand: false,
            wrap_x: true,
            attributions: Vec::new(),
        }
    }
}

impl FromIni for ClusterConfig {
    fn from_ini_section(&mut self, section_name: &str, key: &str, value: &str) -> Option<Result<()>> {
        if section_name != "cluster" {
            return None;
        }

        match key {
            "radius" => {
                match value.parse::<f64>() {
                    Ok(radius) if radius.is_finite() && radius >= 0.0 => {
                        self.radius = radius;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid radius (must be a number >= 0): {}", value)
                    ))),
                }
            },
            "on_demand" => {
                match value.parse() {
                    Ok(flag) => {
                        self.on_demand = flag;
                        Some(Ok(()))
                    },
                    Err(_) => Some(Err(Error::Config(
                        format!("Invalid on_demand value (must be true/false): {}", value)
                    ))),
                }
            },
            "wrap_x" => {
                match value.parse() {
                    Ok(flag) => {
                        self.wrap_x = flag;
                        Some(Ok(()))
                    },
                    Err(_) => Some(Err(Error::Config(
                        format!("Invalid wrap_x value (must be true/false): {}", value)
                    ))),
                }
            },
            "attributions" => {
                // Comma separated, optionally quoted
                self.attributions = value.trim_matches('"')
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                Some(Ok(()))
            },
            _ => None,
        }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.radius.is_finite() || self.radius < 0.0 {
            return Err(Error::Config(
                format!("radius must be a finite number >= 0: {}", self.radius)
            ));
        }
        Ok(())
    }
}
