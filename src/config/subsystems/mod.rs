pub mod cluster;
pub mod engine;
pub mod view;

pub use cluster::ClusterConfig;
pub use engine::EngineConfig;
pub use view::ViewConfig;
