use crate::collisions::CollisionManager;
use crate::diffusion::DiffusionSolver;
use crate::fields::{Environment, FlowData};
use crate::growth::grow_polyps;
use crate::mesh::Mesh;
use crate::morphogens::Morphogens;
use crate::network::Network;
use crate::polyps::PolypStore;
use anyhow::Result;
use coral_common::{ColonyParams, Snapshot, Traits, Vec3};
use log::{debug, info, warn};
use std::sync::Arc;

/// Polyp spacing as a fraction of the seed mesh's mean edge length.
const POLYP_SIZE_FACTOR: f32 = 0.5;
/// Flow voxel size as a fraction of the seed mesh's mean edge length.
const VOXEL_FACTOR: f32 = 0.8;

/// One simulated coral: the polyps, the surface they live on and the
/// services that act on them.
///
/// The polyp arrays are the authoritative copy of every polyp's position.
/// They are pushed into the mesh before mesh operators run and pulled back
/// afterwards, so the mesh never holds positions the polyps do not agree with
/// at a phase boundary.
pub struct Colony {
    pub(crate) params: ColonyParams,
    pub(crate) traits: Traits,
    pub(crate) network: Arc<dyn Network>,
    environment: Arc<dyn Environment>,

    pub(crate) mesh: Mesh,
    pub(crate) polyps: PolypStore,
    pub(crate) morphogens: Morphogens,
    pub(crate) collisions: CollisionManager,
    diffusion: DiffusionSolver,

    // Constants fixed by the seed mesh
    max_face_area: f32,
    pub(crate) voxel_length: f32,
    /// Centroid of the seed mesh, used for polar direction inputs.
    pub(crate) origin: Vec3,

    pub(crate) age: u32,
    pub(crate) light: f32,
    pub(crate) collection: f32,
    pub(crate) energy: f32,
    pub(crate) volume: f32,
    start_light: f32,
    start_collection: f32,
    pub(crate) flow_data: Option<FlowData>,

    recorded_snapshots: Vec<Snapshot>,
}

impl Colony {
    /// Builds a colony from a seed mesh, creating one polyp per seed vertex
    /// until capacity is reached, and computes the initial attributes.
    pub fn new(
        mesh: Mesh,
        network: Arc<dyn Network>,
        environment: Arc<dyn Environment>,
        traits: Traits,
        params: ColonyParams,
    ) -> Result<Self> {
        traits.validate(params.n_signals, params.n_morphogens)?;
        if network.num_inputs() != params.num_inputs() {
            anyhow::bail!(
                "Controller takes {} inputs but the colony provides {}.",
                network.num_inputs(),
                params.num_inputs()
            );
        }
        if network.num_outputs() != params.num_outputs() {
            anyhow::bail!(
                "Controller produces {} outputs but the colony expects {}.",
                network.num_outputs(),
                params.num_outputs()
            );
        }
        if mesh.num_faces() == 0 {
            anyhow::bail!("Seed mesh has no faces.");
        }
        if mesh.num_vertices() > params.max_polyps {
            warn!(
                "Seed mesh has {} vertices but capacity is {}; the remainder stay without polyps.",
                mesh.num_vertices(),
                params.max_polyps
            );
        }

        let target_edge_len = mesh.mean_edge_length();
        let max_face_area = mesh.mean_face_area() * params.max_face_growth;
        let origin = mesh.positions().iter().fold(Vec3::zero(), |acc, &p| acc + p) / mesh.num_vertices() as f32;

        let mut colony = Self {
            polyps: PolypStore::new(&params),
            morphogens: Morphogens::new(params.max_polyps, &traits, params.n_morphogens),
            collisions: CollisionManager::new(target_edge_len * POLYP_SIZE_FACTOR, params.max_polyps),
            diffusion: DiffusionSolver::new(params.diffusion_self_weight, params.max_polyps),
            max_face_area,
            voxel_length: target_edge_len * VOXEL_FACTOR,
            origin,
            age: 0,
            light: 0.0,
            collection: 0.0,
            energy: 0.0,
            volume: 0.0,
            start_light: 0.0,
            start_collection: 0.0,
            flow_data: None,
            recorded_snapshots: Vec::new(),
            params,
            traits,
            network,
            environment,
            mesh,
        };

        for vertex in 0..colony.mesh.num_vertices() {
            colony.create_polyp(vertex);
        }

        colony.update_attributes();
        colony.start_light = colony.light;
        colony.start_collection = colony.collection;
        Ok(colony)
    }

    /// Advances the colony by one growth step.
    pub fn step(&mut self) {
        grow_polyps(self);

        self.push_positions();
        self.mesh.relax();
        let smoothed = self.smooth_sharp();
        self.pull_positions();
        debug!("Age {}: smoothed {} sharp vertices.", self.age, smoothed);

        self.polyp_division();
        self.update_attributes();
        self.age += 1;
    }

    /// Binds a new polyp to `vertex`. Returns `None` once the colony is at capacity.
    ///
    /// Panics if `vertex` already has a polyp; nothing is allocated in that case.
    pub fn create_polyp(&mut self, vertex: usize) -> Option<usize> {
        assert!(
            self.mesh.polyp_of(vertex).is_none(),
            "vertex {} already has a polyp",
            vertex
        );
        if self.polyps.is_full() {
            return None;
        }

        let neighbor_polyps: Vec<Option<usize>> = self
            .mesh
            .neighbors(vertex)
            .iter()
            .map(|&n| self.mesh.polyp_of(n))
            .collect();
        let idx = self
            .polyps
            .create(vertex, self.mesh.position(vertex), &neighbor_polyps)?;
        self.mesh.bind_polyp(vertex, idx);
        self.morphogens.init_polyp(idx);
        self.collisions.new_vert(idx);
        Some(idx)
    }

    /// Copies the authoritative polyp positions into the mesh.
    fn push_positions(&mut self) {
        for i in 0..self.polyps.len() {
            let vertex = self.polyps.vertex_of(i);
            self.mesh.set_position(vertex, self.polyps.positions[i]);
        }
    }

    /// Copies mesh positions back into the polyp arrays after a mesh operator.
    fn pull_positions(&mut self) {
        for i in 0..self.polyps.len() {
            let vertex = self.polyps.vertex_of(i);
            self.polyps.positions[i] = self.mesh.position(vertex);
        }
    }

    fn pull_normals(&mut self) {
        for i in 0..self.polyps.len() {
            let vertex = self.polyps.vertex_of(i);
            self.polyps.normals[i] = self.mesh.normal(vertex);
        }
    }

    /// Pulls vertices with a large angle defect toward their neighbors.
    ///
    /// Neighbor positions are read from a snapshot taken before the pass, so
    /// the result does not depend on vertex order. Returns the number of
    /// vertices moved.
    fn smooth_sharp(&mut self) -> usize {
        self.mesh.calculate_defect();
        let snapshot = self.mesh.positions().to_vec();
        let (keep, pull) = (self.params.smooth_keep, self.params.smooth_pull);

        let mut smoothed = 0;
        for vertex in 0..snapshot.len() {
            if self.mesh.defect(vertex).abs() <= self.params.max_defect {
                continue;
            }
            if let Some(centroid) = self.mesh.neighbor_centroid(vertex, &snapshot) {
                self.mesh.set_position(vertex, snapshot[vertex].blend(keep, centroid, pull));
                smoothed += 1;
            }
        }
        smoothed
    }

    /// Splits overgrown faces and gives every new vertex a polyp.
    ///
    /// Only faces present at the start of the pass are considered, and the
    /// pass stops as soon as the vertices created would fill the colony.
    fn polyp_division(&mut self) {
        let capacity = self.params.max_polyps;
        let n_faces = self.mesh.num_faces();
        let mut created = 0usize;

        for face in 0..n_faces {
            let remaining = capacity.saturating_sub(self.polyps.len() + created);
            if remaining == 0 {
                break;
            }
            if self.mesh.face_area(face) > self.max_face_area && self.mesh.split(face, remaining).is_some() {
                created += 1;
            }
        }

        let before = self.polyps.len();
        for vertex in 0..self.mesh.num_vertices() {
            if self.mesh.polyp_of(vertex).is_none() {
                self.create_polyp(vertex);
            }
        }
        if created > 0 {
            debug!(
                "Age {}: split {} faces, polyps {} -> {}.",
                self.age,
                created,
                before,
                self.polyps.len()
            );
        }
    }

    /// Polyp-indexed adjacency of the live polyps. Neighbors without a polyp are left out.
    pub(crate) fn polyp_neighbors(&self) -> Vec<Vec<usize>> {
        (0..self.polyps.len())
            .map(|i| {
                self.mesh
                    .neighbors(self.polyps.vertex_of(i))
                    .iter()
                    .filter_map(|&v| self.mesh.polyp_of(v))
                    .collect()
            })
            .collect()
    }

    /// Recomputes geometry, environment fields, signals, morphogens and energy.
    pub fn update_attributes(&mut self) {
        let n = self.polyps.len();
        self.push_positions();
        self.mesh.calculate_normals();
        self.mesh.calculate_defect();
        self.mesh.calculate_curvature();
        self.pull_normals();

        let light = self.environment.light(&self.mesh, &self.polyps);
        assert_eq!(light.len(), n, "light field does not cover the live polyps");
        let center = self.params.light_center;
        for (dst, l) in self.polyps.light[..n].iter_mut().zip(light) {
            let l = if l.is_finite() { l } else { 0.0 };
            // Unlit polyps stay exactly zero
            *dst = if l != 0.0 { (l - center) * 2.0 } else { 0.0 };
        }

        let flow = self
            .environment
            .flow(&self.mesh, &self.polyps, self.voxel_length, self.params.save_flow_data);
        assert_eq!(flow.flow.len(), n, "flow field does not cover the live polyps");
        assert_eq!(flow.collection.len(), n, "collection field does not cover the live polyps");
        self.polyps.flow[..n].copy_from_slice(&flow.flow);
        for (dst, c) in self.polyps.collection[..n].iter_mut().zip(flow.collection) {
            *dst = if c.is_finite() { c } else { 0.0 };
        }
        if self.params.save_flow_data {
            self.flow_data = flow.grid;
        }

        let gravity = self.environment.gravity(&self.mesh, &self.polyps);
        assert_eq!(gravity.len(), n, "gravity field does not cover the live polyps");
        self.polyps.gravity[..n].copy_from_slice(&gravity);

        self.polyps.decay_signals(&self.traits.signal_decay);

        let neighbors = self.polyp_neighbors();
        self.morphogens.update(self.params.morphogen_steps, &neighbors);
        self.calculate_energy();
        self.apply_height_scale();
        self.diffuse(&neighbors);
        self.volume = self.mesh.volume();

        for l in &mut self.polyps.light[..n] {
            if !l.is_finite() {
                *l = 0.0;
            }
        }
    }

    /// Per-polyp energy as a light/collection blend, and the colony totals.
    fn calculate_energy(&mut self) {
        let n = self.polyps.len();
        let la = self.params.light_amount;
        for i in 0..n {
            self.polyps.energy[i] = la * self.polyps.light[i] + (1.0 - la) * self.polyps.collection[i];
        }
        self.light = self.polyps.light().iter().sum();
        self.collection = self.polyps.collection().iter().sum();
        self.energy = self.polyps.energy().iter().sum();
    }

    /// Scales light and collection from `gradient_bottom` at height 0 up to 1 at `gradient_height`.
    fn apply_height_scale(&mut self) {
        let bottom = self.params.gradient_bottom;
        let height = self.params.gradient_height;
        if height == 0.0 {
            return;
        }
        for i in 0..self.polyps.len() {
            let y = self.polyps.positions[i].y;
            let scale = bottom + (y / height).min(1.0) * (1.0 - bottom);
            self.polyps.collection[i] *= scale;
            self.polyps.light[i] *= scale;
        }
    }

    /// Diffuses energy and every signal channel across the polyp graph.
    fn diffuse(&mut self, neighbors: &[Vec<usize>]) {
        let n = self.polyps.len();
        self.diffusion
            .diffuse(&mut self.polyps.energy[..n], neighbors, self.traits.energy_diffuse_steps);

        for channel in 0..self.params.n_signals {
            let steps = self.traits.signal_diffuse_steps[channel];
            if steps == 0 {
                continue;
            }
            let mut values = self.polyps.signal_channel(channel);
            self.diffusion.diffuse(&mut values, neighbors, steps);
            self.polyps.set_signal_channel(channel, &values);
        }
    }

    /// Total colony energy.
    pub fn fitness(&self) -> f32 {
        self.energy
    }

    /// Logs the colony totals behind [`Colony::fitness`].
    pub fn report_fitness(&self, label: &str) {
        info!(
            "{}: n_polyps={} light={:.4} (start {:.4}) collection={:.4} (start {:.4}) energy={:.4} volume={:.4}",
            label,
            self.polyps.len(),
            self.light,
            self.start_light,
            self.collection,
            self.start_collection,
            self.energy,
            self.volume
        );
    }

    /// Records the current colony totals.
    pub fn record_snapshot(&mut self) {
        let snapshot = Snapshot {
            age: self.age,
            n_polyps: self.polyps.len(),
            light: self.light,
            collection: self.collection,
            energy: self.energy,
            volume: self.volume,
            fitness: self.fitness(),
        };
        self.recorded_snapshots.push(snapshot);
    }

    pub fn recorded_snapshots(&self) -> &[Snapshot] {
        &self.recorded_snapshots
    }

    pub fn polyps(&self) -> &PolypStore {
        &self.polyps
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    #[cfg(test)]
    pub fn morphogens(&self) -> &Morphogens {
        &self.morphogens
    }

    pub fn params(&self) -> &ColonyParams {
        &self.params
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn n_polyps(&self) -> usize {
        self.polyps.len()
    }

    pub fn light(&self) -> f32 {
        self.light
    }

    pub fn collection(&self) -> f32 {
        self.collection
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }
}
