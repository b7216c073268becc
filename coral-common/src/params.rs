use serde::{Deserialize, Serialize};

/// Fixed network inputs: light, collection, energy and a constant bias bit.
pub const BASE_INPUTS: usize = 4;
/// Fixed network outputs: the growth magnitude.
pub const BASE_OUTPUTS: usize = 1;
/// Inputs added when polar direction sensing is enabled.
pub const POLAR_INPUTS: usize = 4;

/// Colony parameters derived from the configuration, used frequently during simulation steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColonyParams {
    // Dimensions
    pub max_polyps: usize,
    pub n_signals: usize,
    pub n_memory: usize,
    pub n_morphogens: usize,
    pub morphogen_thresholds: usize,
    pub morphogen_steps: u32,
    pub use_polar_direction: bool,

    // Growth
    pub max_growth: f32,
    pub max_face_growth: f32, // Face area multiple of the seed mean that triggers division
    pub max_defect: f32,      // Angle defect above which a vertex is smoothed

    // Environment
    pub light_amount: f32,
    pub gradient_bottom: f32,
    pub gradient_height: f32,
    pub save_flow_data: bool,

    // Blend constants
    pub smooth_keep: f32,
    pub smooth_pull: f32,
    pub light_center: f32,
    pub diffusion_self_weight: f32,
}

impl ColonyParams {
    /// Width of the controller input vector these parameters require.
    pub fn num_inputs(&self) -> usize {
        BASE_INPUTS
            + self.n_memory
            + self.n_signals
            + self.n_morphogens * (self.morphogen_thresholds - 1)
            + POLAR_INPUTS * self.use_polar_direction as usize
    }

    /// Width of the controller output vector these parameters require.
    pub fn num_outputs(&self) -> usize {
        BASE_OUTPUTS + self.n_memory + self.n_signals + self.n_morphogens
    }
}

impl Default for ColonyParams {
    fn default() -> Self {
        ColonyParams {
            max_polyps: 1000,
            n_signals: 0,
            n_memory: 0,
            n_morphogens: 0,
            morphogen_thresholds: 2,
            morphogen_steps: 0,
            use_polar_direction: false,
            max_growth: 0.05,
            max_face_growth: 1.5,
            max_defect: 0.6,
            light_amount: 0.5,
            gradient_bottom: 1.0,
            gradient_height: 0.0,
            save_flow_data: false,
            smooth_keep: 0.66,
            smooth_pull: 0.33,
            light_center: 0.5,
            diffusion_self_weight: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_widths_follow_dimensions() {
        let params = ColonyParams {
            n_memory: 2,
            n_signals: 3,
            n_morphogens: 2,
            morphogen_thresholds: 3,
            use_polar_direction: true,
            ..ColonyParams::default()
        };
        assert_eq!(params.num_inputs(), 4 + 2 + 3 + 2 * 2 + 4);
        assert_eq!(params.num_outputs(), 1 + 2 + 3 + 2);
    }
}
