//! Polyp controller interface and a small feedforward reference network.
//!
//! The growth engine only ever calls [`Network::activate`] through a shared
//! reference, so a single controller can drive every polyp of every colony.

use anyhow::Result;
use rand::Rng;
use rand_distr::Normal;

/// An evolved controller evaluated once per polyp per step.
pub trait Network: Send + Sync {
    fn num_inputs(&self) -> usize;
    fn num_outputs(&self) -> usize;
    /// Pure forward evaluation. `inputs.len()` equals [`Network::num_inputs`].
    fn activate(&self, inputs: &[f32]) -> Vec<f32>;
}

/// One hidden tanh layer, tanh outputs.
#[derive(Clone, Debug)]
pub struct Mlp {
    n_inputs: usize,
    n_hidden: usize,
    n_outputs: usize,
    // Row-major: w_ih[i * n_hidden + j], w_ho[j * n_outputs + k]
    w_ih: Vec<f32>,
    b_h: Vec<f32>,
    w_ho: Vec<f32>,
    b_o: Vec<f32>,
}

impl Mlp {
    pub fn weight_count(n_inputs: usize, n_hidden: usize, n_outputs: usize) -> usize {
        n_inputs * n_hidden + n_hidden + n_hidden * n_outputs + n_outputs
    }

    /// Create a network from an iterator of weights in `w_ih, b_h, w_ho, b_o` order.
    pub fn from_weights(
        n_inputs: usize,
        n_hidden: usize,
        n_outputs: usize,
        weights: impl IntoIterator<Item = f32>,
    ) -> Result<Self> {
        let needed = Self::weight_count(n_inputs, n_hidden, n_outputs);
        let weights: Vec<f32> = weights.into_iter().take(needed).collect();
        if weights.len() != needed {
            anyhow::bail!("insufficient weights: need {} elements, got {}", needed, weights.len());
        }

        let (w_ih, rest) = weights.split_at(n_inputs * n_hidden);
        let (b_h, rest) = rest.split_at(n_hidden);
        let (w_ho, b_o) = rest.split_at(n_hidden * n_outputs);

        Ok(Self {
            n_inputs,
            n_hidden,
            n_outputs,
            w_ih: w_ih.to_vec(),
            b_h: b_h.to_vec(),
            w_ho: w_ho.to_vec(),
            b_o: b_o.to_vec(),
        })
    }

    /// Normally distributed weights with standard deviation `weight_std`.
    pub fn random<R: Rng>(
        n_inputs: usize,
        n_hidden: usize,
        n_outputs: usize,
        weight_std: f32,
        rng: &mut R,
    ) -> Result<Self> {
        let dist = Normal::new(0.0f32, weight_std)
            .map_err(|e| anyhow::anyhow!("Invalid weight distribution (std {}): {}", weight_std, e))?;
        let count = Self::weight_count(n_inputs, n_hidden, n_outputs);
        let weights: Vec<f32> = (0..count).map(|_| rng.sample(dist)).collect();
        Self::from_weights(n_inputs, n_hidden, n_outputs, weights)
    }
}

impl Network for Mlp {
    fn num_inputs(&self) -> usize {
        self.n_inputs
    }

    fn num_outputs(&self) -> usize {
        self.n_outputs
    }

    fn activate(&self, inputs: &[f32]) -> Vec<f32> {
        assert_eq!(inputs.len(), self.n_inputs, "controller input width mismatch");

        let mut hidden = self.b_h.clone();
        for (i, &x) in inputs.iter().enumerate() {
            let row = &self.w_ih[i * self.n_hidden..(i + 1) * self.n_hidden];
            for (h, &w) in hidden.iter_mut().zip(row) {
                *h += x * w;
            }
        }
        for h in &mut hidden {
            *h = h.tanh();
        }

        let mut output = self.b_o.clone();
        for (j, &h) in hidden.iter().enumerate() {
            let row = &self.w_ho[j * self.n_outputs..(j + 1) * self.n_outputs];
            for (o, &w) in output.iter_mut().zip(row) {
                *o += h * w;
            }
        }
        for o in &mut output {
            *o = o.tanh();
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn weight_count_matches_dimensions() {
        assert_eq!(Mlp::weight_count(8, 16, 4), 8 * 16 + 16 + 16 * 4 + 4);
    }

    #[test]
    fn from_weights_rejects_short_input() {
        assert!(Mlp::from_weights(3, 2, 1, vec![0.0; 5]).is_err());
    }

    #[test]
    fn zero_weights_give_zero_outputs() {
        let net = Mlp::from_weights(3, 4, 2, std::iter::repeat(0.0)).unwrap();
        assert_eq!(net.activate(&[1.0, -1.0, 0.5]), vec![0.0, 0.0]);
    }

    #[test]
    fn activation_is_bounded_and_deterministic() {
        let mut rng = StdRng::seed_from_u64(3);
        let net = Mlp::random(5, 6, 3, 2.0, &mut rng).unwrap();
        let inputs = [0.3, -0.7, 1.0, 0.0, 0.9];
        let a = net.activate(&inputs);
        let b = net.activate(&inputs);
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        assert!(a.iter().all(|o| (-1.0..=1.0).contains(o)));
    }
}
