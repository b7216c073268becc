use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Reaction parameters for a single morphogen channel.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct MorphogenTraits {
    pub feed: f32,
    pub kill: f32,
    #[serde(default = "default_diffusion_u")]
    pub diffusion_u: f32,
    #[serde(default = "default_diffusion_v")]
    pub diffusion_v: f32,
}

fn default_diffusion_u() -> f32 {
    0.5
}

fn default_diffusion_v() -> f32 {
    0.25
}

impl Default for MorphogenTraits {
    fn default() -> Self {
        MorphogenTraits {
            feed: 0.0367,
            kill: 0.0649,
            diffusion_u: default_diffusion_u(),
            diffusion_v: default_diffusion_v(),
        }
    }
}

/// Evolved per-colony traits.
///
/// Per-signal and per-morphogen values are fixed-length vectors indexed by
/// channel, checked against the colony dimensions once by [`Traits::validate`].
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Traits {
    /// Diffusion iterations applied to the energy field each step.
    pub energy_diffuse_steps: u32,
    /// Fraction of each signal channel lost per step, in `[0, 1]`.
    pub signal_decay: Vec<f32>,
    /// Diffusion iterations per signal channel.
    pub signal_diffuse_steps: Vec<u32>,
    #[serde(default)]
    pub morphogens: Vec<MorphogenTraits>,
}

impl Traits {
    /// Uniform traits for `n_signals` channels and `n_morphogens` morphogens.
    pub fn uniform(n_signals: usize, n_morphogens: usize, decay: f32, diffuse_steps: u32) -> Self {
        Traits {
            energy_diffuse_steps: diffuse_steps,
            signal_decay: vec![decay; n_signals],
            signal_diffuse_steps: vec![diffuse_steps; n_signals],
            morphogens: vec![MorphogenTraits::default(); n_morphogens],
        }
    }

    pub fn validate(&self, n_signals: usize, n_morphogens: usize) -> Result<()> {
        if self.signal_decay.len() != n_signals {
            anyhow::bail!(
                "signal_decay has {} entries but n_signals is {}.",
                self.signal_decay.len(),
                n_signals
            );
        }
        if self.signal_diffuse_steps.len() != n_signals {
            anyhow::bail!(
                "signal_diffuse_steps has {} entries but n_signals is {}.",
                self.signal_diffuse_steps.len(),
                n_signals
            );
        }
        if self.morphogens.len() != n_morphogens {
            anyhow::bail!(
                "{} morphogen trait entries given but n_morphogens is {}.",
                self.morphogens.len(),
                n_morphogens
            );
        }
        if let Some(d) = self.signal_decay.iter().find(|d| !(0.0..=1.0).contains(*d)) {
            anyhow::bail!("signal_decay values must lie in [0, 1], got {}.", d);
        }
        Ok(())
    }
}
