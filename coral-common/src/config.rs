use crate::params::ColonyParams;
use crate::traits::Traits;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

// Configuration for the run as a whole
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RunConfig {
    pub steps: u32,
    #[serde(default = "default_record_interval")]
    pub record_interval_steps: u32,
    pub seed: u64,
    #[serde(default = "default_n_colonies")]
    pub n_colonies: usize,
}

fn default_record_interval() -> u32 {
    1
}

fn default_n_colonies() -> usize {
    1
}

// Where the starting surface comes from
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SeedMeshConfig {
    /// Wavefront .obj file. When absent an icosphere is generated.
    #[serde(default)]
    pub obj_path: Option<String>,
    #[serde(default = "default_subdivisions")]
    pub subdivisions: u32,
    #[serde(default = "default_radius")]
    pub radius: f32,
}

fn default_subdivisions() -> u32 {
    2
}

fn default_radius() -> f32 {
    1.0
}

impl Default for SeedMeshConfig {
    fn default() -> Self {
        SeedMeshConfig {
            obj_path: None,
            subdivisions: default_subdivisions(),
            radius: default_radius(),
        }
    }
}

// Colony dimensions and environment parameters
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ColonyConfig {
    pub max_polyps: usize,
    pub max_growth: f32,
    pub n_signals: usize,
    pub n_memory: usize,
    pub n_morphogens: usize,
    #[serde(default = "default_morphogen_thresholds")]
    pub morphogen_thresholds: usize,
    #[serde(default)]
    pub morphogen_steps: u32,
    #[serde(default)]
    pub use_polar_direction: bool,
    /// Weight of light (vs. collection) in the energy blend.
    pub light_amount: f32,
    pub max_face_growth: f32,
    pub max_defect: f32,
    #[serde(default = "default_gradient_bottom")]
    pub gradient_bottom: f32,
    #[serde(default)]
    pub gradient_height: f32,
    #[serde(default)]
    pub save_flow_data: bool,
}

fn default_morphogen_thresholds() -> usize {
    2
}

fn default_gradient_bottom() -> f32 {
    1.0
}

// Blend constants of the smoothing, light and diffusion passes
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct BlendConfig {
    #[serde(default = "default_smooth_keep")]
    pub smooth_keep: f32,
    #[serde(default = "default_smooth_pull")]
    pub smooth_pull: f32,
    #[serde(default = "default_half")]
    pub light_center: f32,
    #[serde(default = "default_half")]
    pub diffusion_self_weight: f32,
}

fn default_smooth_keep() -> f32 {
    0.66
}

fn default_smooth_pull() -> f32 {
    0.33
}

fn default_half() -> f32 {
    0.5
}

impl Default for BlendConfig {
    fn default() -> Self {
        BlendConfig {
            smooth_keep: default_smooth_keep(),
            smooth_pull: default_smooth_pull(),
            light_center: default_half(),
            diffusion_self_weight: default_half(),
        }
    }
}

// Shape of the generated controller
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct NetworkConfig {
    #[serde(default = "default_hidden")]
    pub hidden: usize,
    #[serde(default = "default_weight_std")]
    pub weight_std: f32,
}

fn default_hidden() -> usize {
    8
}

fn default_weight_std() -> f32 {
    1.0
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            hidden: default_hidden(),
            weight_std: default_weight_std(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    Json,
    Bincode,
    Messagepack,
}

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_directory")]
    pub directory: String,
    pub base_filename: String,
    #[serde(default = "default_true")]
    pub save_stats: bool,
    #[serde(default)]
    pub save_positions: bool,
    #[serde(default = "default_format")]
    pub format: SnapshotFormat,
}

fn default_directory() -> String {
    ".".to_string()
}

fn default_true() -> bool {
    true
}

fn default_format() -> SnapshotFormat {
    SnapshotFormat::Json
}

// Main configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CoralConfig {
    pub run: RunConfig,
    #[serde(default)]
    pub seed_mesh: SeedMeshConfig,
    pub colony: ColonyConfig,
    #[serde(default)]
    pub blend: BlendConfig,
    pub traits: Traits,
    #[serde(default)]
    pub network: NetworkConfig,
    pub output: OutputConfig,
}

impl CoralConfig {
    /// Loads the configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: CoralConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.colony;
        if c.max_polyps == 0 {
            anyhow::bail!("max_polyps must be greater than 0.");
        }
        if c.max_growth < 0.0 {
            anyhow::bail!("max_growth must not be negative.");
        }
        if c.morphogen_thresholds == 0 {
            anyhow::bail!("morphogen_thresholds must be at least 1.");
        }
        if !(0.0..=1.0).contains(&c.light_amount) {
            anyhow::bail!("light_amount must lie in [0, 1].");
        }
        if c.max_face_growth <= 0.0 {
            anyhow::bail!("max_face_growth must be positive.");
        }
        if !(0.0..=1.0).contains(&c.gradient_bottom) {
            anyhow::bail!("gradient_bottom must lie in [0, 1].");
        }
        if c.gradient_height < 0.0 {
            anyhow::bail!("gradient_height must not be negative.");
        }
        if !(0.0..=1.0).contains(&self.blend.diffusion_self_weight) {
            anyhow::bail!("diffusion_self_weight must lie in [0, 1].");
        }
        if self.run.record_interval_steps == 0 {
            anyhow::bail!("record_interval_steps must be greater than 0.");
        }
        if self.seed_mesh.obj_path.is_none() && self.seed_mesh.radius <= 0.0 {
            anyhow::bail!("seed_mesh.radius must be positive.");
        }
        self.traits.validate(c.n_signals, c.n_morphogens)?;
        Ok(())
    }

    /// Converts the configuration into the parameters used at runtime.
    pub fn get_colony_params(&self) -> ColonyParams {
        let c = &self.colony;
        ColonyParams {
            max_polyps: c.max_polyps,
            max_growth: c.max_growth,
            n_signals: c.n_signals,
            n_memory: c.n_memory,
            n_morphogens: c.n_morphogens,
            morphogen_thresholds: c.morphogen_thresholds,
            morphogen_steps: c.morphogen_steps,
            use_polar_direction: c.use_polar_direction,
            light_amount: c.light_amount,
            max_face_growth: c.max_face_growth,
            max_defect: c.max_defect,
            gradient_bottom: c.gradient_bottom,
            gradient_height: c.gradient_height,
            save_flow_data: c.save_flow_data,
            smooth_keep: self.blend.smooth_keep,
            smooth_pull: self.blend.smooth_pull,
            light_center: self.blend.light_center,
            diffusion_self_weight: self.blend.diffusion_self_weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [run]
        steps = 10
        seed = 7

        [colony]
        max_polyps = 500
        max_growth = 0.05
        n_signals = 2
        n_memory = 1
        n_morphogens = 1
        light_amount = 0.5
        max_face_growth = 1.5
        max_defect = 0.6

        [traits]
        energy_diffuse_steps = 2
        signal_decay = [0.1, 0.2]
        signal_diffuse_steps = [1, 3]

        [[traits.morphogens]]
        feed = 0.03
        kill = 0.06

        [output]
        base_filename = "coral"
    "#;

    #[test]
    fn minimal_config_fills_defaults() {
        let config = CoralConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.run.record_interval_steps, 1);
        assert_eq!(config.run.n_colonies, 1);
        assert_eq!(config.seed_mesh.subdivisions, 2);
        assert_eq!(config.colony.morphogen_thresholds, 2);
        assert_eq!(config.output.format, SnapshotFormat::Json);

        let params = config.get_colony_params();
        assert_eq!(params.smooth_keep, 0.66);
        assert_eq!(params.smooth_pull, 0.33);
        assert_eq!(params.light_center, 0.5);
        assert_eq!(params.diffusion_self_weight, 0.5);
        assert_eq!(params.num_inputs(), 4 + 1 + 2 + 1);
        assert_eq!(params.num_outputs(), 1 + 1 + 2 + 1);
    }

    #[test]
    fn trait_length_mismatch_is_rejected() {
        let broken = MINIMAL.replace("signal_decay = [0.1, 0.2]", "signal_decay = [0.1]");
        assert!(CoralConfig::from_toml_str(&broken).is_err());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let broken = MINIMAL.replace("max_polyps = 500", "max_polyps = 0");
        assert!(CoralConfig::from_toml_str(&broken).is_err());
    }

    #[test]
    fn snapshot_format_parses_lowercase() {
        let with_format = MINIMAL.replace(
            "base_filename = \"coral\"",
            "base_filename = \"coral\"\nformat = \"messagepack\"",
        );
        let config = CoralConfig::from_toml_str(&with_format).unwrap();
        assert_eq!(config.output.format, SnapshotFormat::Messagepack);
    }
}
