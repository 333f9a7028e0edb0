//! geocluster clusters the point features of a map feature source on the fly.
//! A `ClusterSource` wraps any `FeatureSource`, rebuilds a hierarchical
//! clustering index whenever the wrapped source changes, and serves cluster
//! features for the extent and resolution a map layer asks for.

// Module declarations
pub mod error;
pub mod types;
pub mod proj;
pub mod view;
pub mod source;
pub mod engine;
pub mod cluster;
pub mod config;

// Re-exports
pub use error::{Error, Result};
pub use types::{ClusterInfo, Coordinate, Extent, Feature, FeatureId, FeatureRef, Geometry};
pub use proj::Projection;
pub use view::{MapView, View};
pub use source::{FeatureSource, SharedSource, VectorSource};
pub use engine::{Supercluster, SuperclusterOptions};
pub use cluster::{ClusterSource, ClusterSourceOptions};

// Re-export the config from config module
pub use config::GeoClusterConfig;
