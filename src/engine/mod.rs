// engine/mod.rs
pub mod spatial;
pub mod supercluster;

pub use self::supercluster::{
    abbreviate_count,
    ClusterResult,
    GeoPoint,
    Supercluster,
    SuperclusterOptions,
    MAX_SUPPORTED_ZOOM,
};
