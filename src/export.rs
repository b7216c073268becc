//! `.coral.obj` export.
//!
//! A `.coral.obj` file is a Wavefront mesh with polyp attributes added on top,
//! so ordinary mesh tools can still read it:
//!
//! 1. a `#coral` header line naming the per-polyp attributes in order,
//! 2. one `c` line per vertex holding those attribute values, in the same
//!    order as the `v` lines.
//!
//! Vertex colors on the `v` lines repeat the first three attributes.

use crate::colony::Colony;
use anyhow::{Context, Result};
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Appended to the export path for the flow grid companion file.
pub const FLOW_GRID_SUFFIX: &str = ".flow_grid.bin";

/// Attribute names in `c` line order.
pub fn attribute_header(n_morphogens: usize, n_signals: usize) -> Vec<String> {
    let mut header = Vec::with_capacity(n_morphogens + n_signals + 4);
    header.extend((0..n_morphogens).map(|i| format!("mu_{}", i)));
    header.extend((0..n_signals).map(|i| format!("sig_{}", i)));
    header.extend(["light", "collection", "energy", "curvature"].map(String::from));
    header
}

impl Colony {
    /// Writes the colony to `path`, plus the flow grid companion when flow capture is enabled.
    pub fn export<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path_ref = path.as_ref();
        let file = File::create(path_ref)
            .with_context(|| format!("Failed to create export file '{}'", path_ref.display()))?;
        let mut out = BufWriter::new(file);
        self.write_coral_obj(&mut out)?;
        out.flush()?;
        info!("Exported {} polyps to {}", self.n_polyps(), path_ref.display());

        if self.params.save_flow_data {
            if let Some(flow_data) = &self.flow_data {
                let mut flow_path = path_ref.as_os_str().to_owned();
                flow_path.push(FLOW_GRID_SUFFIX);
                let file = File::create(&flow_path)
                    .with_context(|| format!("Failed to create flow grid file {:?}", flow_path))?;
                bincode::serialize_into(BufWriter::new(file), &(self.voxel_length, flow_data))
                    .context("Failed to serialize flow grid")?;
            }
        }
        Ok(())
    }

    /// Per-vertex attribute rows in mesh vertex order.
    ///
    /// Vertices left without a polyp (seed vertices beyond capacity) get zeros
    /// except for their curvature.
    pub fn attribute_rows(&self) -> Vec<Vec<f32>> {
        let header_len = self.params.n_morphogens + self.params.n_signals + 4;
        (0..self.mesh.num_vertices())
            .map(|vertex| {
                let curvature = self.mesh.curvature(vertex);
                match self.mesh.polyp_of(vertex) {
                    Some(i) => {
                        let mut row = Vec::with_capacity(header_len);
                        row.extend((0..self.params.n_morphogens).map(|m| self.morphogens.u(m, i)));
                        row.extend_from_slice(self.polyps.signals(i));
                        row.extend([
                            self.polyps.light[i],
                            self.polyps.collection[i],
                            self.polyps.energy[i],
                            curvature,
                        ]);
                        row
                    }
                    None => {
                        let mut row = vec![0.0; header_len];
                        row[header_len - 1] = curvature;
                        row
                    }
                }
            })
            .collect()
    }

    pub fn write_coral_obj<W: Write>(&self, out: &mut W) -> Result<()> {
        let header = attribute_header(self.params.n_morphogens, self.params.n_signals);
        let rows = self.attribute_rows();
        for row in &rows {
            assert_eq!(row.len(), header.len(), "attribute row does not match the #coral header");
        }

        writeln!(out, "#Exported from coral_growth")?;
        writeln!(
            out,
            "#attr light:{:.6} collection:{:.6} energy:{:.6}",
            self.light, self.collection, self.energy
        )?;
        writeln!(out, "#coral {}", header.join(" "))?;

        let mesh_data = self.mesh.export();
        for (p, row) in mesh_data.positions.iter().zip(&rows) {
            writeln!(
                out,
                "v {:.6} {:.6} {:.6} {:.6} {:.6} {:.6}",
                p.x, p.y, p.z, row[0], row[1], row[2]
            )?;
        }
        write!(out, "\n\n")?;

        for row in &rows {
            let values: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(out, "c {}", values.join(" "))?;
        }

        writeln!(out)?;
        for [a, b, c] in &mesh_data.faces {
            writeln!(out, "f {} {} {}", a + 1, b + 1, c + 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colony::tests::{colony, params};
    use crate::mesh::Mesh;

    fn exported(c: &Colony) -> String {
        let mut buf = Vec::new();
        c.write_coral_obj(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn header_lists_morphogens_signals_then_fixed_attributes() {
        assert_eq!(
            attribute_header(2, 1).join(" "),
            "mu_0 mu_1 sig_0 light collection energy curvature"
        );
        assert_eq!(attribute_header(0, 0).len(), 4);
    }

    #[test]
    fn export_layout_matches_mesh() {
        let mut c = colony(Mesh::icosphere(1, 1.0), params(200, 1, 2));
        c.step();
        let text = exported(&c);

        let coral_line = text.lines().find(|l| l.starts_with("#coral ")).unwrap();
        assert_eq!(coral_line, "#coral mu_0 mu_1 sig_0 light collection energy curvature");

        let v_lines: Vec<&str> = text.lines().filter(|l| l.starts_with("v ")).collect();
        let c_lines: Vec<&str> = text.lines().filter(|l| l.starts_with("c ")).collect();
        let f_lines: Vec<&str> = text.lines().filter(|l| l.starts_with("f ")).collect();
        assert_eq!(v_lines.len(), c.mesh().num_vertices());
        assert_eq!(c_lines.len(), c.mesh().num_vertices());
        assert_eq!(f_lines.len(), c.mesh().num_faces());

        for line in &v_lines {
            assert_eq!(line.split_whitespace().count(), 7);
        }
        for line in &c_lines {
            let values: Vec<f32> = line.split_whitespace().skip(1).map(|t| t.parse().unwrap()).collect();
            assert_eq!(values.len(), 7);
        }

        let mut seen_one = false;
        for line in &f_lines {
            for idx in line.split_whitespace().skip(1).map(|t| t.parse::<usize>().unwrap()) {
                assert!(idx >= 1 && idx <= v_lines.len());
                seen_one |= idx == 1;
            }
        }
        assert!(seen_one);
    }

    #[test]
    fn export_round_trips_through_obj_parser() {
        let c = colony(Mesh::icosphere(1, 1.0), params(200, 0, 0));
        let text = exported(&c);
        let reloaded = Mesh::parse_obj(&text).unwrap();
        assert_eq!(reloaded.num_vertices(), c.mesh().num_vertices());
        assert_eq!(reloaded.export().faces, c.mesh().export().faces);
    }

    #[test]
    fn vertices_without_polyps_export_zero_rows() {
        let c = colony(Mesh::icosphere(2, 1.0), params(100, 1, 0));
        let rows = c.attribute_rows();
        assert_eq!(rows.len(), 162);
        let unbound = (0..162).find(|&v| c.mesh().polyp_of(v).is_none()).unwrap();
        assert!(rows[unbound][..4].iter().all(|&v| v == 0.0));
        assert_eq!(rows[unbound][4], c.mesh().curvature(unbound));
    }

    #[test]
    fn export_writes_flow_grid_companion() {
        let mut p = params(200, 0, 0);
        p.save_flow_data = true;
        let c = colony(Mesh::icosphere(1, 1.0), p);
        let dir = std::env::temp_dir().join(format!("coral-export-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test.coral.obj");
        c.export(&path).unwrap();

        let companion = dir.join(format!("test.coral.obj{}", FLOW_GRID_SUFFIX));
        let file = File::open(&companion).unwrap();
        let (voxel_length, grid): (f32, crate::fields::FlowData) = bincode::deserialize_from(file).unwrap();
        assert!(voxel_length > 0.0);
        assert_eq!(grid.speed.len(), grid.dims.iter().product::<usize>());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
