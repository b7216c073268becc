/// Explicit neighbor-averaging diffusion over the polyp adjacency graph.
///
/// One iteration sets every value to `w * old + (1 - w) * mean(old over neighbors)`.
/// All new values are computed from the pre-iteration field into a scratch buffer
/// and committed together, so the result does not depend on polyp order.
/// Polyps without neighbors keep their value.
#[derive(Debug, Clone)]
pub struct DiffusionSolver {
    self_weight: f32,
    buffer: Vec<f32>,
}

impl DiffusionSolver {
    pub fn new(self_weight: f32, capacity: usize) -> Self {
        Self {
            self_weight,
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Runs `iterations` smoothing passes over `field`.
    ///
    /// `neighbors[i]` lists the indices adjacent to `i`; every index must be
    /// below `field.len()`.
    pub fn diffuse(&mut self, field: &mut [f32], neighbors: &[Vec<usize>], iterations: u32) {
        assert_eq!(
            field.len(),
            neighbors.len(),
            "diffusion field and adjacency cover different polyp counts"
        );
        for _ in 0..iterations {
            self.iterate(field, neighbors);
        }
    }

    fn iterate(&mut self, field: &mut [f32], neighbors: &[Vec<usize>]) {
        let w = self.self_weight;
        self.buffer.clear();
        self.buffer.extend(field.iter().zip(neighbors).map(|(&old, ns)| {
            if ns.is_empty() {
                return old;
            }
            let mean = ns.iter().map(|&n| field[n]).sum::<f32>() / ns.len() as f32;
            w * old + (1.0 - w) * mean
        }));
        field.copy_from_slice(&self.buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;

    fn mesh_graph(mesh: &Mesh) -> Vec<Vec<usize>> {
        (0..mesh.num_vertices()).map(|v| mesh.neighbors(v).to_vec()).collect()
    }

    #[test]
    fn preserves_sum_on_uniform_degree_graph() {
        let ico = Mesh::icosphere(0, 1.0);
        let graph = mesh_graph(&ico);
        let mut field: Vec<f32> = (0..12).map(|i| (i * i % 7) as f32 * 0.3).collect();
        let before: f32 = field.iter().sum();

        let mut solver = DiffusionSolver::new(0.5, 12);
        solver.diffuse(&mut field, &graph, 5);
        let after: f32 = field.iter().sum();
        assert!((before - after).abs() < 1e-4, "{} vs {}", before, after);
    }

    #[test]
    fn iteration_reads_pre_iteration_values() {
        // Path 0 - 1 - 2
        let graph = vec![vec![1], vec![0, 2], vec![1]];
        let mut field = vec![1.0, 0.0, 0.0];
        DiffusionSolver::new(0.5, 3).diffuse(&mut field, &graph, 1);
        // In-place updates would have fed 0.5 from polyp 0 into polyp 1.
        assert_eq!(field, vec![0.5, 0.25, 0.0]);
    }

    #[test]
    fn isolated_polyps_are_left_unchanged() {
        let graph = vec![vec![], vec![2], vec![1]];
        let mut field = vec![3.0, 1.0, 0.0];
        DiffusionSolver::new(0.5, 3).diffuse(&mut field, &graph, 4);
        assert_eq!(field[0], 3.0);
        assert!(field.iter().all(|v| v.is_finite()));
        assert!((field[1] - 0.5).abs() < 1e-6);
        assert!((field[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn constant_field_is_a_fixed_point() {
        let sphere = Mesh::icosphere(2, 1.0);
        let graph = mesh_graph(&sphere);
        let mut field = vec![0.7; graph.len()];
        DiffusionSolver::new(0.5, graph.len()).diffuse(&mut field, &graph, 3);
        assert!(field.iter().all(|v| (v - 0.7).abs() < 1e-6));
    }
}
