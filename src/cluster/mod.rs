// cluster/mod.rs
pub mod arena;
pub mod extract;
pub mod source;

pub use self::arena::{FeatureArena, FeatureIndex};
pub use self::extract::{default_extractor, point_geometry, point_vertices, ClusterPoint, PointExtractor};
pub use self::source::{ClusterSource, ClusterSourceOptions, PointTag, DEFAULT_RADIUS};
