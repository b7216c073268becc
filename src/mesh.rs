use anyhow::{Context, Result};
use coral_common::Vec3;
use log::debug;
use std::collections::HashMap;
use std::f32::consts::PI;
use std::path::Path;

/// Tangential relaxation strength applied by [`Mesh::relax`].
const RELAX_STRENGTH: f32 = 0.25;

/// Positions and faces in export order.
#[derive(Debug, Clone)]
pub struct MeshExport {
    pub positions: Vec<Vec3>,
    pub faces: Vec<[usize; 3]>,
}

/// Triangle mesh with stable integer vertex and face ids.
///
/// Vertices are never removed, so an id handed out once stays valid for the
/// lifetime of the mesh. Each vertex carries a small side table (currently the
/// id of the polyp bound to it) plus the geometric annotations refreshed by
/// [`Mesh::calculate_normals`], [`Mesh::calculate_defect`] and
/// [`Mesh::calculate_curvature`].
#[derive(Debug, Clone)]
pub struct Mesh {
    positions: Vec<Vec3>,
    faces: Vec<[usize; 3]>,
    neighbors: Vec<Vec<usize>>,
    normals: Vec<Vec3>,
    defect: Vec<f32>,
    curvature: Vec<f32>,
    polyp: Vec<Option<usize>>,
}

impl Mesh {
    /// Builds a mesh from vertex positions and triangles, validating indices.
    pub fn from_parts(positions: Vec<Vec3>, faces: Vec<[usize; 3]>) -> Result<Self> {
        let n = positions.len();
        for (f, face) in faces.iter().enumerate() {
            if face.iter().any(|&v| v >= n) {
                anyhow::bail!("Face {} references a vertex outside 0..{}.", f, n);
            }
            if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
                anyhow::bail!("Face {} is degenerate: {:?}.", f, face);
            }
        }

        let mut neighbors = vec![Vec::new(); n];
        for face in &faces {
            for k in 0..3 {
                let a = face[k];
                let b = face[(k + 1) % 3];
                if !neighbors[a].contains(&b) {
                    neighbors[a].push(b);
                }
                if !neighbors[b].contains(&a) {
                    neighbors[b].push(a);
                }
            }
        }

        Ok(Mesh {
            positions,
            faces,
            neighbors,
            normals: vec![Vec3::zero(); n],
            defect: vec![0.0; n],
            curvature: vec![0.0; n],
            polyp: vec![None; n],
        })
    }

    /// Loads a Wavefront .obj file. Polygons are fan-triangulated.
    pub fn from_obj<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let text = std::fs::read_to_string(path_ref)
            .with_context(|| format!("Failed to read mesh file '{}'", path_ref.display()))?;
        Self::parse_obj(&text).with_context(|| format!("Failed to parse mesh file '{}'", path_ref.display()))
    }

    pub fn parse_obj(text: &str) -> Result<Self> {
        let mut positions = Vec::new();
        let mut faces = Vec::new();

        for (line_no, line) in text.lines().enumerate() {
            let mut tokens = line.split_whitespace();
            match tokens.next() {
                Some("v") => {
                    let coords: Vec<f32> = tokens
                        .take(3)
                        .map(|t| t.parse::<f32>())
                        .collect::<Result<_, _>>()
                        .with_context(|| format!("Bad vertex on line {}", line_no + 1))?;
                    if coords.len() != 3 {
                        anyhow::bail!("Vertex on line {} needs three coordinates.", line_no + 1);
                    }
                    positions.push(Vec3::new(coords[0], coords[1], coords[2]));
                }
                Some("f") => {
                    let corners: Vec<usize> = tokens
                        .map(|t| {
                            // "i", "i/t" and "i/t/n" all start with the position index
                            let index = t.split('/').next().unwrap_or(t);
                            index.parse::<usize>()
                        })
                        .collect::<Result<_, _>>()
                        .with_context(|| format!("Bad face on line {}", line_no + 1))?;
                    if corners.len() < 3 || corners.contains(&0) {
                        anyhow::bail!("Face on line {} needs at least three 1-based indices.", line_no + 1);
                    }
                    for k in 1..corners.len() - 1 {
                        faces.push([corners[0] - 1, corners[k] - 1, corners[k + 1] - 1]);
                    }
                }
                _ => {}
            }
        }

        if faces.is_empty() {
            anyhow::bail!("Mesh has no faces.");
        }
        Self::from_parts(positions, faces)
    }

    /// Generates an icosphere centred on the origin.
    pub fn icosphere(subdivisions: u32, radius: f32) -> Self {
        let t = (1.0 + 5.0f32.sqrt()) / 2.0;
        let mut positions: Vec<Vec3> = [
            (-1.0, t, 0.0),
            (1.0, t, 0.0),
            (-1.0, -t, 0.0),
            (1.0, -t, 0.0),
            (0.0, -1.0, t),
            (0.0, 1.0, t),
            (0.0, -1.0, -t),
            (0.0, 1.0, -t),
            (t, 0.0, -1.0),
            (t, 0.0, 1.0),
            (-t, 0.0, -1.0),
            (-t, 0.0, 1.0),
        ]
        .iter()
        .map(|&(x, y, z)| Vec3::new(x, y, z).normalize_or_zero())
        .collect();

        let mut faces: Vec<[usize; 3]> = vec![
            [0, 11, 5],
            [0, 5, 1],
            [0, 1, 7],
            [0, 7, 10],
            [0, 10, 11],
            [1, 5, 9],
            [5, 11, 4],
            [11, 10, 2],
            [10, 7, 6],
            [7, 1, 8],
            [3, 9, 4],
            [3, 4, 2],
            [3, 2, 6],
            [3, 6, 8],
            [3, 8, 9],
            [4, 9, 5],
            [2, 4, 11],
            [6, 2, 10],
            [8, 6, 7],
            [9, 8, 1],
        ];

        for _ in 0..subdivisions {
            let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
            let mut midpoint = |a: usize, b: usize, positions: &mut Vec<Vec3>| -> usize {
                let key = (a.min(b), a.max(b));
                *midpoints.entry(key).or_insert_with(|| {
                    let m = ((positions[a] + positions[b]) * 0.5).normalize_or_zero();
                    positions.push(m);
                    positions.len() - 1
                })
            };

            let mut next = Vec::with_capacity(faces.len() * 4);
            for &[a, b, c] in &faces {
                let ab = midpoint(a, b, &mut positions);
                let bc = midpoint(b, c, &mut positions);
                let ca = midpoint(c, a, &mut positions);
                next.push([a, ab, ca]);
                next.push([b, bc, ab]);
                next.push([c, ca, bc]);
                next.push([ab, bc, ca]);
            }
            faces = next;
        }

        let positions = positions.into_iter().map(|p| p * radius).collect();
        // Indices are generated above and always valid
        Self::from_parts(positions, faces).unwrap_or_else(|e| panic!("icosphere construction failed: {e}"))
    }

    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn position(&self, vertex: usize) -> Vec3 {
        self.positions[vertex]
    }

    pub fn set_position(&mut self, vertex: usize, p: Vec3) {
        self.positions[vertex] = p;
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn neighbors(&self, vertex: usize) -> &[usize] {
        &self.neighbors[vertex]
    }

    pub fn normal(&self, vertex: usize) -> Vec3 {
        self.normals[vertex]
    }

    pub fn defect(&self, vertex: usize) -> f32 {
        self.defect[vertex]
    }

    pub fn curvature(&self, vertex: usize) -> f32 {
        self.curvature[vertex]
    }

    pub fn polyp_of(&self, vertex: usize) -> Option<usize> {
        self.polyp[vertex]
    }

    pub fn bind_polyp(&mut self, vertex: usize, polyp: usize) {
        assert!(
            self.polyp[vertex].is_none(),
            "vertex {} is already bound to polyp {:?}",
            vertex,
            self.polyp[vertex]
        );
        self.polyp[vertex] = Some(polyp);
    }

    pub fn translate(&mut self, offset: Vec3) {
        for p in &mut self.positions {
            *p += offset;
        }
    }

    pub fn face_area(&self, face: usize) -> f32 {
        let [a, b, c] = self.faces[face];
        let (pa, pb, pc) = (self.positions[a], self.positions[b], self.positions[c]);
        0.5 * (pb - pa).cross(pc - pa).length()
    }

    pub fn mean_face_area(&self) -> f32 {
        if self.faces.is_empty() {
            return 0.0;
        }
        (0..self.faces.len()).map(|f| self.face_area(f)).sum::<f32>() / self.faces.len() as f32
    }

    pub fn mean_edge_length(&self) -> f32 {
        let mut total = 0.0;
        let mut count = 0usize;
        for (v, ns) in self.neighbors.iter().enumerate() {
            for &n in ns.iter().filter(|&&n| n > v) {
                total += self.positions[v].distance(self.positions[n]);
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            total / count as f32
        }
    }

    /// Mean position of a vertex's neighbors, or `None` for an isolated vertex.
    pub fn neighbor_centroid(&self, vertex: usize, positions: &[Vec3]) -> Option<Vec3> {
        let ns = &self.neighbors[vertex];
        if ns.is_empty() {
            return None;
        }
        let mut sum = Vec3::zero();
        for &n in ns {
            sum += positions[n];
        }
        Some(sum / ns.len() as f32)
    }

    /// Splits a face by inserting a vertex at its centroid.
    ///
    /// At most `max_new_vertices` vertices may be created; with no remaining
    /// budget the mesh is left untouched and `None` is returned. Otherwise the
    /// id of the new vertex is returned.
    pub fn split(&mut self, face: usize, max_new_vertices: usize) -> Option<usize> {
        if max_new_vertices == 0 {
            return None;
        }
        let [a, b, c] = self.faces[face];
        let m = self.positions.len();
        let centroid = (self.positions[a] + self.positions[b] + self.positions[c]) / 3.0;

        self.positions.push(centroid);
        self.normals.push(Vec3::zero());
        self.defect.push(0.0);
        self.curvature.push(0.0);
        self.polyp.push(None);
        self.neighbors.push(vec![a, b, c]);
        for v in [a, b, c] {
            self.neighbors[v].push(m);
        }

        self.faces[face] = [a, b, m];
        self.faces.push([b, c, m]);
        self.faces.push([c, a, m]);
        Some(m)
    }

    /// Moves vertices tangentially toward their neighbor centroid. Topology is unchanged.
    pub fn relax(&mut self) {
        self.calculate_normals();
        let snapshot = self.positions.clone();
        let mut moved = 0usize;
        for v in 0..snapshot.len() {
            if let Some(centroid) = self.neighbor_centroid(v, &snapshot) {
                let delta = centroid - snapshot[v];
                let n = self.normals[v];
                let tangential = delta - n * delta.dot(n);
                self.positions[v] = snapshot[v] + tangential * RELAX_STRENGTH;
                moved += 1;
            }
        }
        debug!("Relaxed {} vertices.", moved);
    }

    /// Area-weighted vertex normals.
    pub fn calculate_normals(&mut self) {
        self.normals.iter_mut().for_each(|n| *n = Vec3::zero());
        for &[a, b, c] in &self.faces {
            let (pa, pb, pc) = (self.positions[a], self.positions[b], self.positions[c]);
            let face_normal = (pb - pa).cross(pc - pa);
            self.normals[a] += face_normal;
            self.normals[b] += face_normal;
            self.normals[c] += face_normal;
        }
        for n in &mut self.normals {
            *n = n.normalize_or_zero();
        }
    }

    /// Angle defect: `2π` (or `π` on a boundary) minus the sum of incident face angles.
    pub fn calculate_defect(&mut self) {
        let mut angle_sum = vec![0.0f32; self.positions.len()];
        let mut edge_faces: HashMap<(usize, usize), u32> = HashMap::new();

        for &face in &self.faces {
            for k in 0..3 {
                let v = face[k];
                let p = self.positions[v];
                let e1 = (self.positions[face[(k + 1) % 3]] - p).normalize_or_zero();
                let e2 = (self.positions[face[(k + 2) % 3]] - p).normalize_or_zero();
                angle_sum[v] += e1.dot(e2).clamp(-1.0, 1.0).acos();

                let (a, b) = (face[k], face[(k + 1) % 3]);
                *edge_faces.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }

        let mut boundary = vec![false; self.positions.len()];
        for (&(a, b), &count) in &edge_faces {
            if count == 1 {
                boundary[a] = true;
                boundary[b] = true;
            }
        }

        for (v, d) in self.defect.iter_mut().enumerate() {
            let full = if boundary[v] { PI } else { 2.0 * PI };
            *d = full - angle_sum[v];
        }
    }

    /// Umbrella-operator mean curvature estimate; positive where the surface is convex.
    /// Requires up to date normals.
    pub fn calculate_curvature(&mut self) {
        for v in 0..self.positions.len() {
            let p = self.positions[v];
            self.curvature[v] = match self.neighbor_centroid(v, &self.positions) {
                Some(centroid) => {
                    let ns = &self.neighbors[v];
                    let mean_len =
                        ns.iter().map(|&n| p.distance(self.positions[n])).sum::<f32>() / ns.len() as f32;
                    if mean_len > 1e-9 {
                        2.0 * (p - centroid).dot(self.normals[v]) / (mean_len * mean_len)
                    } else {
                        0.0
                    }
                }
                None => 0.0,
            };
        }
    }

    /// Signed enclosed volume; positive for a closed mesh with outward-facing winding.
    pub fn volume(&self) -> f32 {
        self.faces
            .iter()
            .map(|&[a, b, c]| self.positions[a].dot(self.positions[b].cross(self.positions[c])))
            .sum::<f32>()
            / 6.0
    }

    pub fn export(&self) -> MeshExport {
        MeshExport {
            positions: self.positions.clone(),
            faces: self.faces.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icosphere_counts() {
        let ico = Mesh::icosphere(0, 1.0);
        assert_eq!(ico.num_vertices(), 12);
        assert_eq!(ico.num_faces(), 20);
        assert!((0..12).all(|v| ico.neighbors(v).len() == 5));

        let sphere = Mesh::icosphere(2, 1.0);
        assert_eq!(sphere.num_vertices(), 162);
        assert_eq!(sphere.num_faces(), 320);
    }

    #[test]
    fn icosphere_volume_approaches_ball() {
        let sphere = Mesh::icosphere(2, 1.0);
        let v = sphere.volume();
        assert!(v > 3.6 && v < 4.0 * PI / 3.0, "volume {}", v);
    }

    #[test]
    fn defect_sums_to_four_pi_on_closed_surface() {
        let mut sphere = Mesh::icosphere(1, 1.0);
        sphere.calculate_defect();
        let total: f32 = (0..sphere.num_vertices()).map(|v| sphere.defect(v)).sum();
        assert!((total - 4.0 * PI).abs() < 1e-3, "total defect {}", total);
    }

    #[test]
    fn normals_point_outward_and_curvature_is_positive() {
        let mut sphere = Mesh::icosphere(2, 2.0);
        sphere.calculate_normals();
        sphere.calculate_curvature();
        for v in 0..sphere.num_vertices() {
            let outward = sphere.position(v).normalize_or_zero();
            assert!(sphere.normal(v).dot(outward) > 0.99);
            // Roughly 1 / radius
            assert!((sphere.curvature(v) - 0.5).abs() < 0.1, "curvature {}", sphere.curvature(v));
        }
    }

    #[test]
    fn split_inserts_centroid_and_respects_budget() {
        let mut mesh = Mesh::icosphere(0, 1.0);
        let area = mesh.face_area(0);
        assert_eq!(mesh.split(0, 0), None);
        assert_eq!(mesh.num_vertices(), 12);

        let m = mesh.split(0, 1).unwrap();
        assert_eq!(m, 12);
        assert_eq!(mesh.num_faces(), 22);
        assert_eq!(mesh.neighbors(m).len(), 3);
        let [a, b, c] = [0, 11, 5];
        for v in [a, b, c] {
            assert!(mesh.neighbors(v).contains(&m));
        }
        let split_area: f32 = [0, 20, 21].iter().map(|&f| mesh.face_area(f)).sum();
        assert!((split_area - area).abs() < 1e-5);
    }

    #[test]
    fn relax_keeps_topology() {
        let mut mesh = Mesh::icosphere(1, 1.0);
        let faces = mesh.export().faces;
        mesh.relax();
        assert_eq!(mesh.export().faces, faces);
        assert!(mesh.positions().iter().all(|p| p.is_finite()));
    }

    #[test]
    fn parse_obj_triangulates_quads() {
        let text = "# unit square\nv 0 0 0\nv 1 0 0\nv 1 0 1\nv 0 0 1\nf 1/1 2/2 3/3 4/4\n";
        let mesh = Mesh::parse_obj(text).unwrap();
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.export().faces, vec![[0, 1, 2], [0, 2, 3]]);
        assert!((mesh.mean_face_area() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn parse_obj_rejects_out_of_range_faces() {
        assert!(Mesh::parse_obj("v 0 0 0\nv 1 0 0\nf 1 2 3\n").is_err());
        assert!(Mesh::parse_obj("v 0 0 0\n").is_err());
    }
}
