pub mod config;
pub mod params;
pub mod snapshot;
pub mod traits;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{
    BlendConfig, ColonyConfig, CoralConfig, NetworkConfig, OutputConfig, RunConfig, SeedMeshConfig,
    SnapshotFormat,
};
pub use params::ColonyParams;
pub use snapshot::Snapshot;
pub use traits::{MorphogenTraits, Traits};
pub use vecmath::{clamp, Vec3};
