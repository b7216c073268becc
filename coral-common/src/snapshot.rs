use serde::{Deserialize, Serialize};

/// Colony-level measurements recorded after a growth step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Number of completed growth steps.
    pub age: u32,
    pub n_polyps: usize,
    /// Summed light over live polyps, before the depth gradient is applied.
    pub light: f32,
    pub collection: f32,
    pub energy: f32,
    /// Enclosed mesh volume.
    pub volume: f32,
    pub fitness: f32,
}
