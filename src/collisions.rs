use coral_common::Vec3;
use std::collections::HashMap;

type CellKey = (i32, i32, i32);

/// Keeps moving polyps from pushing through non-adjacent parts of the surface.
///
/// Registered polyps are bucketed into a uniform hash grid with cell size
/// `polyp_size`, so a query only has to scan the 3x3x3 block around the target.
#[derive(Debug)]
pub struct CollisionManager {
    polyp_size: f32,
    inv_cell_size: f32,
    registered: Vec<bool>,
    grid: HashMap<CellKey, Vec<usize>>,
}

impl CollisionManager {
    pub fn new(polyp_size: f32, capacity: usize) -> Self {
        let inv_cell_size = if polyp_size > 1e-9 { 1.0 / polyp_size } else { 0.0 };
        Self {
            polyp_size,
            inv_cell_size,
            registered: vec![false; capacity],
            grid: HashMap::new(),
        }
    }

    /// Registers a polyp for future collision queries.
    pub fn new_vert(&mut self, polyp: usize) {
        self.registered[polyp] = true;
    }

    #[inline(always)]
    fn cell_of(&self, p: Vec3) -> CellKey {
        (
            (p.x * self.inv_cell_size).floor() as i32,
            (p.y * self.inv_cell_size).floor() as i32,
            (p.z * self.inv_cell_size).floor() as i32,
        )
    }

    /// Rebuckets every registered polyp from `positions`.
    pub fn rebuild(&mut self, positions: &[Vec3]) {
        self.grid.values_mut().for_each(Vec::clear);
        for (idx, &p) in positions.iter().enumerate() {
            if self.registered[idx] {
                let key = self.cell_of(p);
                self.grid.entry(key).or_default().push(idx);
            }
        }
    }

    /// Whether moving `polyp` to `target` would bring it closer than
    /// `polyp_size` to a registered polyp outside its mesh neighborhood.
    ///
    /// Moves that increase the separation from an already close polyp are allowed.
    pub fn is_blocked(&self, polyp: usize, target: Vec3, positions: &[Vec3], neighbors: &[usize]) -> bool {
        if self.inv_cell_size == 0.0 {
            return false;
        }
        let current = positions[polyp];
        let min_dist_sq = self.polyp_size * self.polyp_size;
        let (cx, cy, cz) = self.cell_of(target);

        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let Some(bucket) = self.grid.get(&(cx + dx, cy + dy, cz + dz)) else {
                        continue;
                    };
                    for &other in bucket {
                        if other == polyp || neighbors.contains(&other) {
                            continue;
                        }
                        let p = positions[other];
                        let d_target = target.distance_squared(p);
                        if d_target < min_dist_sq && d_target < current.distance_squared(p) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(positions: &[Vec3]) -> CollisionManager {
        let mut m = CollisionManager::new(0.5, positions.len());
        for i in 0..positions.len() {
            m.new_vert(i);
        }
        m.rebuild(positions);
        m
    }

    #[test]
    fn approaching_a_distant_polyp_is_blocked() {
        let positions = [Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)];
        let m = manager(&positions);
        assert!(m.is_blocked(0, Vec3::new(0.8, 0.0, 0.0), &positions, &[]));
        assert!(!m.is_blocked(0, Vec3::new(0.2, 0.0, 0.0), &positions, &[]));
    }

    #[test]
    fn mesh_neighbors_never_block() {
        let positions = [Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)];
        let m = manager(&positions);
        assert!(!m.is_blocked(0, Vec3::new(0.8, 0.0, 0.0), &positions, &[1]));
    }

    #[test]
    fn moving_away_from_a_close_polyp_is_allowed() {
        let positions = [Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.3, 0.0, 0.0)];
        let m = manager(&positions);
        assert!(!m.is_blocked(0, Vec3::new(-0.1, 0.0, 0.0), &positions, &[]));
    }

    #[test]
    fn unregistered_polyps_are_ignored() {
        let positions = [Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)];
        let mut m = CollisionManager::new(0.5, 2);
        m.new_vert(0);
        m.rebuild(&positions);
        assert!(!m.is_blocked(0, Vec3::new(0.9, 0.0, 0.0), &positions, &[]));
    }
}
