use coral_common::{MorphogenTraits, Traits};

/// Substrate concentration of an undisturbed polyp.
const RESTING_U: f32 = 1.0;

/// Gray-Scott reaction-diffusion over the polyp graph.
///
/// `u` is the substrate and `v` the activator; both are stored as
/// `n_morphogens × capacity` matrices indexed by polyp id. Controllers raise
/// `v` through [`Morphogens::deposit`], which consumes `u` as the reaction runs.
#[derive(Debug)]
pub struct Morphogens {
    n_morphogens: usize,
    capacity: usize,
    traits: Vec<MorphogenTraits>,
    u: Vec<f32>,
    v: Vec<f32>,
    next_u: Vec<f32>,
    next_v: Vec<f32>,
}

impl Morphogens {
    pub fn new(capacity: usize, traits: &Traits, n_morphogens: usize) -> Self {
        Self {
            n_morphogens,
            capacity,
            traits: traits.morphogens.clone(),
            u: vec![RESTING_U; n_morphogens * capacity],
            v: vec![0.0; n_morphogens * capacity],
            next_u: vec![0.0; capacity],
            next_v: vec![0.0; capacity],
        }
    }

    /// Substrate concentration of morphogen `m` at `polyp`.
    pub fn u(&self, m: usize, polyp: usize) -> f32 {
        self.u[m * self.capacity + polyp]
    }

    /// Activator concentration of morphogen `m` at `polyp`.
    #[cfg(test)]
    pub fn v(&self, m: usize, polyp: usize) -> f32 {
        self.v[m * self.capacity + polyp]
    }

    /// Resets a freshly created polyp to the resting state.
    pub fn init_polyp(&mut self, polyp: usize) {
        for m in 0..self.n_morphogens {
            self.u[m * self.capacity + polyp] = RESTING_U;
            self.v[m * self.capacity + polyp] = 0.0;
        }
    }

    /// Adds activator at a polyp, saturating at 1.
    pub fn deposit(&mut self, m: usize, polyp: usize, amount: f32) {
        let v = &mut self.v[m * self.capacity + polyp];
        *v = (*v + amount.max(0.0)).min(1.0);
    }

    /// Runs `n_steps` explicit reaction-diffusion steps over the first
    /// `neighbors.len()` polyps.
    pub fn update(&mut self, n_steps: u32, neighbors: &[Vec<usize>]) {
        let n = neighbors.len();
        for _ in 0..n_steps {
            for m in 0..self.n_morphogens {
                let t = &self.traits[m];
                let (feed, kill, diffusion_u, diffusion_v) = (t.feed, t.kill, t.diffusion_u, t.diffusion_v);
                let base = m * self.capacity;
                let u = &self.u[base..base + n];
                let v = &self.v[base..base + n];

                for i in 0..n {
                    let ns = &neighbors[i];
                    let (lap_u, lap_v) = if ns.is_empty() {
                        (0.0, 0.0)
                    } else {
                        let k = ns.len() as f32;
                        (
                            ns.iter().map(|&j| u[j]).sum::<f32>() / k - u[i],
                            ns.iter().map(|&j| v[j]).sum::<f32>() / k - v[i],
                        )
                    };
                    let uvv = u[i] * v[i] * v[i];
                    self.next_u[i] = (u[i] + diffusion_u * lap_u - uvv + feed * (1.0 - u[i])).clamp(0.0, 1.0);
                    self.next_v[i] = (v[i] + diffusion_v * lap_v + uvv - (feed + kill) * v[i]).clamp(0.0, 1.0);
                }

                self.u[base..base + n].copy_from_slice(&self.next_u[..n]);
                self.v[base..base + n].copy_from_slice(&self.next_v[..n]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(n: usize) -> Vec<Vec<usize>> {
        (0..n).map(|i| vec![(i + n - 1) % n, (i + 1) % n]).collect()
    }

    #[test]
    fn resting_state_is_stable() {
        let traits = Traits::uniform(0, 2, 0.0, 0);
        let mut morphogens = Morphogens::new(8, &traits, 2);
        morphogens.update(20, &ring(8));
        for m in 0..2 {
            for i in 0..8 {
                assert!((morphogens.u(m, i) - 1.0).abs() < 1e-6);
                assert_eq!(morphogens.v(m, i), 0.0);
            }
        }
    }

    #[test]
    fn deposit_spreads_and_consumes_substrate() {
        let traits = Traits::uniform(0, 1, 0.0, 0);
        let mut morphogens = Morphogens::new(8, &traits, 1);
        morphogens.deposit(0, 0, 0.8);
        morphogens.update(5, &ring(8));
        assert!(morphogens.v(0, 1) > 0.0);
        assert!(morphogens.u(0, 0) < 1.0);
        for i in 0..8 {
            assert!((0.0..=1.0).contains(&morphogens.u(0, i)));
            assert!((0.0..=1.0).contains(&morphogens.v(0, i)));
        }
    }

    #[test]
    fn init_polyp_resets_reused_slot() {
        let traits = Traits::uniform(0, 1, 0.0, 0);
        let mut morphogens = Morphogens::new(4, &traits, 1);
        morphogens.deposit(0, 3, 1.0);
        morphogens.init_polyp(3);
        assert_eq!(morphogens.v(0, 3), 0.0);
        assert_eq!(morphogens.u(0, 3), 1.0);
    }
}
