use crate::colony::Colony;
use coral_common::{clamp, Vec3};

/// Activator added per unit of controller morphogen output.
const MORPHOGEN_DEPOSIT: f32 = 0.1;

/// Evaluates the controller for every live polyp and moves it along its normal.
///
/// All controller outputs are computed and next positions buffered before
/// any polyp moves, so collision checks see the positions from the start of
/// the phase.
pub(crate) fn grow_polyps(colony: &mut Colony) {
    let n = colony.polyps.len();
    let neighbors = colony.polyp_neighbors();
    colony.collisions.rebuild(&colony.polyps.positions[..n]);

    let n_memory = colony.params.n_memory;
    let n_signals = colony.params.n_signals;

    for i in 0..n {
        fill_inputs(colony, i);
        let outputs = colony.network.activate(colony.polyps.inputs(i));
        assert_eq!(
            outputs.len(),
            colony.params.num_outputs(),
            "controller output width changed after construction"
        );

        let (growth, rest) = outputs.split_at(1);
        let (memory, rest) = rest.split_at(n_memory);
        let (signals, morphogens) = rest.split_at(n_signals);

        colony.polyps.memory[i * n_memory..(i + 1) * n_memory].copy_from_slice(memory);
        // Emission only raises a signal; decay is what lowers it
        for (s, &out) in colony.polyps.signals_mut(i).iter_mut().zip(signals) {
            *s = s.max(clamp(out, 0.0, 1.0));
        }
        for (m, &out) in morphogens.iter().enumerate() {
            colony.morphogens.deposit(m, i, clamp(out, 0.0, 1.0) * MORPHOGEN_DEPOSIT);
        }

        let distance = colony.params.max_growth * clamp(growth[0], 0.0, 1.0);
        let current = colony.polyps.positions[i];
        let target = current + colony.polyps.normals[i] * distance;
        let blocked = distance > 0.0
            && colony
                .collisions
                .is_blocked(i, target, &colony.polyps.positions[..n], &neighbors[i]);

        colony.polyps.collided[i] = blocked;
        colony.polyps.positions_next[i] = if blocked || !target.is_finite() { current } else { target };
    }

    colony.polyps.positions[..n].copy_from_slice(&colony.polyps.positions_next[..n]);
}

/// Writes the controller input row for polyp `i`:
/// light, collection, energy, bias, memory, signals, morphogen threshold bits, polar direction.
fn fill_inputs(colony: &mut Colony, i: usize) {
    let num_inputs = colony.polyps.num_inputs();
    let thresholds = colony.params.morphogen_thresholds;

    let mut row = Vec::with_capacity(num_inputs);
    row.push(colony.polyps.light[i]);
    row.push(colony.polyps.collection[i]);
    row.push(colony.polyps.energy[i]);
    row.push(1.0);
    row.extend_from_slice(colony.polyps.memory(i));
    row.extend_from_slice(colony.polyps.signals(i));

    for m in 0..colony.params.n_morphogens {
        let level = colony.morphogens.u(m, i);
        for t in 1..thresholds {
            row.push(if level > t as f32 / thresholds as f32 { 1.0 } else { 0.0 });
        }
    }

    if colony.params.use_polar_direction {
        row.extend_from_slice(&polar_direction(colony.polyps.positions[i] - colony.origin));
    }

    debug_assert_eq!(row.len(), num_inputs);
    colony.polyps.inputs[i * num_inputs..(i + 1) * num_inputs].copy_from_slice(&row);
}

/// Azimuth and elevation of an offset from the colony origin, as cosine/sine pairs.
fn polar_direction(offset: Vec3) -> [f32; 4] {
    let azimuth = offset.z.atan2(offset.x);
    let horizontal = (offset.x * offset.x + offset.z * offset.z).sqrt();
    let elevation = offset.y.atan2(horizontal);
    [azimuth.cos(), azimuth.sin(), elevation.cos(), elevation.sin()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colony::tests::{colony, params};
    use crate::mesh::Mesh;

    #[test]
    fn polyps_move_outward_along_normals() {
        let mut c = colony(Mesh::icosphere(1, 1.0), params(200, 1, 1));
        let before: Vec<f32> = c.polyps().positions().iter().map(|p| p.length()).collect();
        grow_polyps(&mut c);
        for (i, p) in c.polyps().positions().iter().enumerate() {
            assert!(p.length() >= before[i] - 1e-6);
            assert!(p.length() <= before[i] + c.params().max_growth + 1e-6);
        }
        assert!(c.polyps().positions().iter().zip(&before).any(|(p, &b)| p.length() > b + 1e-4));
    }

    #[test]
    fn controller_outputs_reach_memory_and_signals() {
        let mut c = colony(Mesh::icosphere(1, 1.0), params(200, 2, 1));
        grow_polyps(&mut c);
        for i in 0..c.n_polyps() {
            assert!(c.polyps().memory(i)[0] > 0.0);
            assert!(c.polyps().signals(i).iter().all(|&s| s > 0.0 && s <= 1.0));
            assert!(c.morphogens().v(0, i) > 0.0);
        }
    }

    #[test]
    fn controller_can_only_raise_signals() {
        let mut c = colony(Mesh::icosphere(1, 1.0), params(200, 2, 0));
        c.polyps.signals_mut(0).copy_from_slice(&[1.0, 0.0]);
        grow_polyps(&mut c);
        let s = c.polyps().signals(0);
        // Saturated channel keeps its level; the empty one picks up the emission
        assert_eq!(s[0], 1.0);
        assert!(s[1] > 0.0 && s[1] < 1.0);
    }

    #[test]
    fn input_row_layout() {
        let mut p = params(200, 2, 1);
        p.use_polar_direction = true;
        let mut c = colony(Mesh::icosphere(0, 1.0), p);
        fill_inputs(&mut c, 0);
        let row = c.polyps().inputs(0).to_vec();
        assert_eq!(row.len(), 4 + 1 + 2 + 2 + 4);
        assert_eq!(row[3], 1.0);
        // Resting substrate sits above both thresholds
        assert_eq!(&row[7..9], &[1.0, 1.0]);
        let polar = &row[9..13];
        assert!((polar[0] * polar[0] + polar[1] * polar[1] - 1.0).abs() < 1e-5);
        assert!((polar[2] * polar[2] + polar[3] * polar[3] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn polar_direction_of_straight_up() {
        let [_, _, cos_e, sin_e] = polar_direction(Vec3::new(0.0, 2.0, 0.0));
        assert!(cos_e.abs() < 1e-6);
        assert!((sin_e - 1.0).abs() < 1e-6);
    }
}
