pub mod subsystems;

use serde::{Serialize, Deserialize};
use std::path::Path;
use std::fs;
use std::rc::Rc;
use crate::cluster::ClusterSourceOptions;
use crate::error::{Error, Result};
use crate::source::SharedSource;
use log::{trace, warn};

pub trait FromIni {
    fn from_ini_section(&mut self, section_name: &str, key: &str, value: &str) -> Option<Result<()>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoClusterConfig {
    pub cluster: subsystems::ClusterConfig,
    pub engine: subsystems::EngineConfig,
    pub view: subsystems::ViewConfig,
}

impl GeoClusterConfig {
    pub fn validate(&self) -> Result<()> {
        self.cluster.validate()?;
        self.engine.validate()?;
        self.view.validate()?;
        Ok(())
    }

    pub fn from_ini<P: AsRef<Path>>(path: P) -> Result<Self> {
        let absolute_path = std::fs::canonicalize(&path)
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        trace!("Loading configuration from: {:?}", absolute_path);

        let content = fs::read_to_string(&path)?;
        Self::from_ini_str(&content)
    }

    pub fn from_ini_str(content: &str) -> Result<Self> {
        let mut config = Self::default();
        let mut current_section = String::new();

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                current_section = line[1..line.len()-1].trim().to_string();
                trace!("  Line {}: Found section: [{}]", line_num + 1, current_section);
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();

                // Delegate to appropriate subsystem config
                let handled = match current_section.as_str() {
                    "cluster" => config.cluster.from_ini_section(&current_section, key, value),
                    "engine" => config.engine.from_ini_section(&current_section, key, value),
                    "view" => config.view.from_ini_section(&current_section, key, value),
                    _ => None,
                };

                match handled {
                    Some(Ok(())) => {},
                    Some(Err(e)) => {
                        return Err(Error::Config(format!("Line {}: {}", line_num + 1, e)));
                    },
                    None => {
                        warn!("Unrecognized config key: {}={} in section [{}]", key, value, current_section);
                    },
                }
            } else {
                warn!("Ignoring malformed config line {}: {}", line_num + 1, line);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Cluster source options for `source` and `view` with these settings applied.
    pub fn cluster_source_options<S, V>(&self, source: SharedSource<S>, view: Rc<V>) -> ClusterSourceOptions<S, V> {
        ClusterSourceOptions::new(source, view)
            .radius(self.cluster.radius)
            .on_demand(self.cluster.on_demand)
            .wrap_x(self.cluster.wrap_x)
            .attributions(self.cluster.attributions.clone())
            .min_points(self.engine.min_points)
            .tile_extent(self.engine.tile_extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proj::Projection;
    use std::io::Write;

    const SAMPLE: &str = "
# clustering for the demo map
[cluster]
radius = 40
on_demand = true
attributions = \"© OpenStreetMap contributors\"

[engine]
min_points = 3

[view]
projection = EPSG:3857
zoom = 5
max_zoom = 20
unknown = 1
";

    #[test]
    fn parses_all_sections() {
        let config = GeoClusterConfig::from_ini_str(SAMPLE).unwrap();
        assert_eq!(config.cluster.radius, 40.0);
        assert!(config.cluster.on_demand);
        assert_eq!(config.cluster.attributions.len(), 1);
        assert_eq!(config.engine.min_points, 3);
        assert_eq!(config.engine.tile_extent, 512.0);
        assert_eq!(config.view.projection, Projection::WebMercator);
        assert_eq!(config.view.zoom, 5.0);
        assert_eq!(config.view.max_zoom, 20.0);
    }

    #[test]
    fn bad_values_are_config_errors() {
        let err = GeoClusterConfig::from_ini_str("[cluster]\nradius = wide\n").unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.starts_with("Line 2")));

        let err = GeoClusterConfig::from_ini_str("[view]\nmin_zoom = 9\nmax_zoom = 4\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = GeoClusterConfig::from_ini(file.path()).unwrap();
        assert_eq!(config.cluster.radius, 40.0);

        assert!(matches!(
            GeoClusterConfig::from_ini(file.path().with_extension("missing")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = GeoClusterConfig::from_ini_str("").unwrap();
        assert_eq!(config.cluster.radius, crate::cluster::DEFAULT_RADIUS);
        assert!(config.cluster.wrap_x);
        assert_eq!(config.view.max_zoom, 28.0);
    }
}
