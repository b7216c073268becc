use coral_common::{ColonyParams, Vec3};

/// Holds the per-polyp state vectors of a colony.
///
/// Every vector is allocated to `capacity` up front and indexed by polyp id.
/// Ids are handed out in order and never reused; only `[0, len)` is live and
/// the accessors below expose exactly that range.
#[derive(Debug)]
pub struct PolypStore {
    n_polyps: usize,
    capacity: usize,
    n_signals: usize,
    n_memory: usize,
    num_inputs: usize,

    pub(crate) positions: Vec<Vec3>,
    pub(crate) positions_next: Vec<Vec3>,
    pub(crate) normals: Vec<Vec3>,

    pub(crate) light: Vec<f32>,
    pub(crate) flow: Vec<f32>,
    pub(crate) gravity: Vec<f32>,
    pub(crate) collection: Vec<f32>,
    pub(crate) energy: Vec<f32>,
    pub(crate) collided: Vec<bool>,

    // Row-major, one row per polyp
    pub(crate) signals: Vec<f32>,
    pub(crate) memory: Vec<f32>,
    pub(crate) inputs: Vec<f32>,

    /// Mesh vertex bound to each live polyp.
    vertices: Vec<usize>,
}

impl PolypStore {
    pub fn new(params: &ColonyParams) -> Self {
        let capacity = params.max_polyps;
        let num_inputs = params.num_inputs();

        Self {
            n_polyps: 0,
            capacity,
            n_signals: params.n_signals,
            n_memory: params.n_memory,
            num_inputs,

            positions: vec![Vec3::zero(); capacity],
            positions_next: vec![Vec3::zero(); capacity],
            normals: vec![Vec3::zero(); capacity],

            light: vec![0.0; capacity],
            flow: vec![0.0; capacity],
            gravity: vec![0.0; capacity],
            collection: vec![0.0; capacity],
            energy: vec![0.0; capacity],
            collided: vec![false; capacity],

            signals: vec![0.0; capacity * params.n_signals],
            memory: vec![0.0; capacity * params.n_memory],
            inputs: vec![0.0; capacity * num_inputs],

            vertices: Vec::with_capacity(capacity),
        }
    }

    /// Allocates the next polyp id for `vertex`.
    ///
    /// `neighbor_polyps` lists the polyp bound to each mesh neighbor of the
    /// vertex (`None` for a neighbor without one). The new signal vector is the
    /// mean over all neighbors, with unbound or silent neighbors still counted
    /// in the denominator. Returns `None` when the store is full.
    pub fn create(&mut self, vertex: usize, position: Vec3, neighbor_polyps: &[Option<usize>]) -> Option<usize> {
        if self.is_full() {
            return None;
        }

        let idx = self.n_polyps;
        self.n_polyps += 1;
        self.vertices.push(vertex);
        self.positions[idx] = position;
        self.positions_next[idx] = position;

        let ns = self.n_signals;
        if ns > 0 && !neighbor_polyps.is_empty() {
            let mut sum = vec![0.0f32; ns];
            for &neighbor in neighbor_polyps.iter().flatten() {
                let row = &self.signals[neighbor * ns..(neighbor + 1) * ns];
                for (s, &v) in sum.iter_mut().zip(row) {
                    *s += v;
                }
            }
            let count = neighbor_polyps.len() as f32;
            for (dst, s) in self.signals[idx * ns..(idx + 1) * ns].iter_mut().zip(sum) {
                *dst = s / count;
            }
        }

        Some(idx)
    }

    pub fn len(&self) -> usize {
        self.n_polyps
    }

    pub fn is_empty(&self) -> bool {
        self.n_polyps == 0
    }

    pub fn is_full(&self) -> bool {
        self.n_polyps == self.capacity
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn vertex_of(&self, polyp: usize) -> usize {
        self.vertices[polyp]
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions[..self.n_polyps]
    }

    pub fn normals(&self) -> &[Vec3] {
        &self.normals[..self.n_polyps]
    }

    pub fn light(&self) -> &[f32] {
        &self.light[..self.n_polyps]
    }

    pub fn flow(&self) -> &[f32] {
        &self.flow[..self.n_polyps]
    }

    pub fn gravity(&self) -> &[f32] {
        &self.gravity[..self.n_polyps]
    }

    pub fn collection(&self) -> &[f32] {
        &self.collection[..self.n_polyps]
    }

    pub fn energy(&self) -> &[f32] {
        &self.energy[..self.n_polyps]
    }

    pub fn collided(&self) -> &[bool] {
        &self.collided[..self.n_polyps]
    }

    pub fn signals(&self, polyp: usize) -> &[f32] {
        assert!(polyp < self.n_polyps, "polyp {} is not live", polyp);
        &self.signals[polyp * self.n_signals..(polyp + 1) * self.n_signals]
    }

    pub fn signals_mut(&mut self, polyp: usize) -> &mut [f32] {
        assert!(polyp < self.n_polyps, "polyp {} is not live", polyp);
        &mut self.signals[polyp * self.n_signals..(polyp + 1) * self.n_signals]
    }

    pub fn memory(&self, polyp: usize) -> &[f32] {
        assert!(polyp < self.n_polyps, "polyp {} is not live", polyp);
        &self.memory[polyp * self.n_memory..(polyp + 1) * self.n_memory]
    }

    pub fn inputs(&self, polyp: usize) -> &[f32] {
        assert!(polyp < self.n_polyps, "polyp {} is not live", polyp);
        &self.inputs[polyp * self.num_inputs..(polyp + 1) * self.num_inputs]
    }

    /// Copies one signal channel of the live polyps into a contiguous vector.
    pub(crate) fn signal_channel(&self, channel: usize) -> Vec<f32> {
        (0..self.n_polyps)
            .map(|i| self.signals[i * self.n_signals + channel])
            .collect()
    }

    pub(crate) fn set_signal_channel(&mut self, channel: usize, values: &[f32]) {
        assert_eq!(values.len(), self.n_polyps);
        for (i, &v) in values.iter().enumerate() {
            self.signals[i * self.n_signals + channel] = v;
        }
    }

    /// Applies per-channel exponential decay and clamps every live signal to `[0, 1]`.
    pub(crate) fn decay_signals(&mut self, decay: &[f32]) {
        let ns = self.n_signals;
        for row in self.signals[..self.n_polyps * ns].chunks_mut(ns.max(1)) {
            for (s, &d) in row.iter_mut().zip(decay) {
                *s = (*s * (1.0 - d)).clamp(0.0, 1.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(max_polyps: usize, n_signals: usize) -> PolypStore {
        PolypStore::new(&ColonyParams {
            max_polyps,
            n_signals,
            ..ColonyParams::default()
        })
    }

    #[test]
    fn new_signal_averages_over_all_neighbors() {
        let mut polyps = store(4, 2);
        let a = polyps.create(0, Vec3::zero(), &[]).unwrap();
        let b = polyps.create(1, Vec3::zero(), &[]).unwrap();
        polyps.signals_mut(a).copy_from_slice(&[1.0, 0.0]);
        polyps.signals_mut(b).copy_from_slice(&[0.0, 0.0]);

        let c = polyps.create(2, Vec3::zero(), &[Some(a), Some(b)]).unwrap();
        assert_eq!(polyps.signals(c), &[0.5, 0.0]);
    }

    #[test]
    fn unbound_neighbors_dilute_the_signal() {
        let mut polyps = store(4, 1);
        let a = polyps.create(0, Vec3::zero(), &[]).unwrap();
        polyps.signals_mut(a)[0] = 0.9;
        let b = polyps.create(1, Vec3::zero(), &[Some(a), None, None]).unwrap();
        assert!((polyps.signals(b)[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn isolated_vertex_gets_zero_signal() {
        let mut polyps = store(2, 3);
        let a = polyps.create(0, Vec3::zero(), &[]).unwrap();
        assert_eq!(polyps.signals(a), &[0.0, 0.0, 0.0]);
        assert!(polyps.signals(a).iter().all(|s| s.is_finite()));
    }

    #[test]
    fn create_is_a_no_op_at_capacity() {
        let mut polyps = store(2, 0);
        assert_eq!(polyps.create(5, Vec3::zero(), &[]), Some(0));
        assert_eq!(polyps.create(6, Vec3::new(1.0, 0.0, 0.0), &[]), Some(1));
        assert!(polyps.is_full());
        assert_eq!(polyps.create(7, Vec3::zero(), &[]), None);
        assert_eq!(polyps.len(), 2);
        assert_eq!(polyps.vertex_of(1), 6);
        assert_eq!(polyps.positions().len(), 2);
    }

    #[test]
    fn decay_then_clamp_keeps_signals_in_unit_range() {
        let mut polyps = store(2, 2);
        let a = polyps.create(0, Vec3::zero(), &[]).unwrap();
        polyps.signals_mut(a).copy_from_slice(&[2.0, -0.5]);
        polyps.decay_signals(&[0.25, 0.1]);
        assert_eq!(polyps.signals(a), &[1.0, 0.0]);

        polyps.signals_mut(a).copy_from_slice(&[0.8, 0.5]);
        polyps.decay_signals(&[0.25, 0.0]);
        assert!((polyps.signals(a)[0] - 0.6).abs() < 1e-6);
        assert_eq!(polyps.signals(a)[1], 0.5);
    }
}
