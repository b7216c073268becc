//! Light, water flow and gravity fields sampled by the colony each step.

use crate::mesh::Mesh;
use crate::polyps::PolypStore;
use coral_common::Vec3;
use serde::{Deserialize, Serialize};

/// Flow speed multiplier applied when a voxel is occupied by a polyp.
const FLOW_SHADOW: f32 = 0.5;
/// Flow speed recovered per free voxel downstream of an obstacle.
const FLOW_RECOVERY: f32 = 0.1;
/// Empty voxels added around the colony bounding box.
const GRID_PADDING: usize = 2;

/// Voxelised flow speed around the colony, saved next to an export when requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowData {
    pub origin: [f32; 3],
    pub dims: [usize; 3],
    /// Speed per voxel in x-fastest order.
    pub speed: Vec<f32>,
}

impl FlowData {
    fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.dims[1] + y) * self.dims[0] + x
    }
}

/// Output of [`Environment::flow`] for the live polyps.
#[derive(Debug, Clone)]
pub struct FlowResult {
    pub flow: Vec<f32>,
    pub collection: Vec<f32>,
    pub grid: Option<FlowData>,
}

/// The physical surroundings of a colony.
///
/// Every method returns one finite value per live polyp; light and
/// collection lie in `[0, 1]`.
pub trait Environment: Send + Sync {
    /// Light capture probability per polyp. Exactly `0.0` means unlit.
    fn light(&self, mesh: &Mesh, polyps: &PolypStore) -> Vec<f32>;
    fn flow(&self, mesh: &Mesh, polyps: &PolypStore, voxel_length: f32, capture_grid: bool) -> FlowResult;
    fn gravity(&self, mesh: &Mesh, polyps: &PolypStore) -> Vec<f32>;
}

/// Overhead light and a steady current along +x.
#[derive(Debug, Clone)]
pub struct DirectionalEnvironment {
    pub light_dir: Vec3,
}

impl Default for DirectionalEnvironment {
    fn default() -> Self {
        Self { light_dir: Vec3::up() }
    }
}

impl DirectionalEnvironment {
    fn flow_grid(polyps: &PolypStore, voxel_length: f32) -> FlowData {
        let positions = polyps.positions();
        let mut lo = Vec3::new(f32::MAX, f32::MAX, f32::MAX);
        let mut hi = Vec3::new(f32::MIN, f32::MIN, f32::MIN);
        for p in positions {
            lo = Vec3::new(lo.x.min(p.x), lo.y.min(p.y), lo.z.min(p.z));
            hi = Vec3::new(hi.x.max(p.x), hi.y.max(p.y), hi.z.max(p.z));
        }
        let pad = GRID_PADDING as f32 * voxel_length;
        let origin = lo - Vec3::new(pad, pad, pad);
        let extent = hi - lo;
        let dim = |e: f32| (e / voxel_length).floor() as usize + 1 + 2 * GRID_PADDING;
        let dims = [dim(extent.x), dim(extent.y), dim(extent.z)];

        let mut occupied = vec![false; dims[0] * dims[1] * dims[2]];
        let mut grid = FlowData {
            origin: origin.to_array(),
            dims,
            speed: vec![0.0; occupied.len()],
        };
        for &p in positions {
            if let Some([x, y, z]) = voxel_of(&grid, p, voxel_length) {
                let i = grid.index(x, y, z);
                occupied[i] = true;
            }
        }

        // Sweep each row downstream, attenuating behind occupied voxels
        for z in 0..dims[2] {
            for y in 0..dims[1] {
                let mut s = 1.0f32;
                for x in 0..dims[0] {
                    let i = grid.index(x, y, z);
                    if occupied[i] {
                        s *= FLOW_SHADOW;
                        grid.speed[i] = 0.0;
                    } else {
                        s = (s + FLOW_RECOVERY).min(1.0);
                        grid.speed[i] = s;
                    }
                }
            }
        }
        grid
    }
}

fn voxel_of(grid: &FlowData, p: Vec3, voxel_length: f32) -> Option<[usize; 3]> {
    let rel = (p - Vec3::from_array(grid.origin)) / voxel_length;
    let coords = [rel.x, rel.y, rel.z];
    let mut out = [0usize; 3];
    for k in 0..3 {
        if !coords[k].is_finite() || coords[k] < 0.0 {
            return None;
        }
        let c = coords[k].floor() as usize;
        if c >= grid.dims[k] {
            return None;
        }
        out[k] = c;
    }
    Some(out)
}

impl Environment for DirectionalEnvironment {
    fn light(&self, _mesh: &Mesh, polyps: &PolypStore) -> Vec<f32> {
        let dir = self.light_dir.normalize_or_zero();
        polyps
            .normals()
            .iter()
            .map(|n| n.dot(dir).clamp(0.0, 1.0))
            .collect()
    }

    fn flow(&self, _mesh: &Mesh, polyps: &PolypStore, voxel_length: f32, capture_grid: bool) -> FlowResult {
        let n = polyps.len();
        if n == 0 || voxel_length <= 0.0 {
            return FlowResult {
                flow: vec![0.0; n],
                collection: vec![0.0; n],
                grid: None,
            };
        }

        let grid = Self::flow_grid(polyps, voxel_length);
        let flow: Vec<f32> = polyps
            .positions()
            .iter()
            .zip(polyps.normals())
            .map(|(&p, &normal)| {
                // Sample the water just outside the surface
                let probe = p + normal * voxel_length;
                voxel_of(&grid, probe, voxel_length)
                    .map(|[x, y, z]| grid.speed[grid.index(x, y, z)])
                    .unwrap_or(1.0)
            })
            .collect();
        let collection = flow.iter().map(|f| f.clamp(0.0, 1.0)).collect();

        FlowResult {
            flow,
            collection,
            grid: capture_grid.then_some(grid),
        }
    }

    fn gravity(&self, _mesh: &Mesh, polyps: &PolypStore) -> Vec<f32> {
        // Overhang: how strongly the surface faces the sea floor
        polyps
            .normals()
            .iter()
            .map(|n| (-n.dot(Vec3::up())).clamp(0.0, 1.0))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coral_common::ColonyParams;

    fn store_with(points: &[(Vec3, Vec3)]) -> PolypStore {
        let mut store = PolypStore::new(&ColonyParams {
            max_polyps: points.len(),
            ..ColonyParams::default()
        });
        for (v, &(p, n)) in points.iter().enumerate() {
            let idx = store.create(v, p, &[]).unwrap();
            store.normals[idx] = n;
        }
        store
    }

    #[test]
    fn downward_facing_polyps_are_unlit() {
        let mesh = Mesh::icosphere(0, 1.0);
        let store = store_with(&[
            (Vec3::zero(), Vec3::up()),
            (Vec3::zero(), -Vec3::up()),
            (Vec3::zero(), Vec3::new(1.0, 0.0, 0.0)),
        ]);
        let light = DirectionalEnvironment::default().light(&mesh, &store);
        assert_eq!(light, vec![1.0, 0.0, 0.0]);
        let gravity = DirectionalEnvironment::default().gravity(&mesh, &store);
        assert_eq!(gravity, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn downstream_polyp_collects_less() {
        let mesh = Mesh::icosphere(0, 1.0);
        let up = Vec3::up();
        let store = store_with(&[
            (Vec3::new(0.0, 0.0, 0.0), -Vec3::new(1.0, 0.0, 0.0)),
            (Vec3::new(0.2, 0.0, 0.0), up),
            (Vec3::new(0.6, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)),
        ]);
        let result = DirectionalEnvironment::default().flow(&mesh, &store, 0.2, true);
        assert_eq!(result.flow.len(), 3);
        assert!(result.flow.iter().all(|f| f.is_finite() && (0.0..=1.0).contains(f)));
        // Upstream face sees undisturbed water
        assert_eq!(result.flow[0], 1.0);
        assert!(result.flow[2] < 1.0);
        let grid = result.grid.unwrap();
        assert_eq!(grid.speed.len(), grid.dims.iter().product::<usize>());
    }
}
