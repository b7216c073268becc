use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, trace, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

mod colony;
mod collisions;
mod diffusion;
mod export;
mod fields;
mod growth;
mod mesh;
mod morphogens;
mod network;
mod polyps;

use colony::Colony;
use coral_common::{CoralConfig, Snapshot, SnapshotFormat, Vec3};
use fields::{DirectionalEnvironment, Environment};
use mesh::Mesh;
use network::{Mlp, Network};

/// Command-line arguments for the growth driver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the config.toml file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Directory for exports and snapshots (overrides output.directory)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Number of growth steps (overrides run.steps)
    #[arg(long)]
    steps: Option<u32>,
}

/// Summary of a finished colony run.
struct ColonyOutcome {
    index: usize,
    fitness: f32,
    n_polyps: usize,
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();

    info!("Starting coral growth driver...");

    // --- Load Configuration ---
    let mut config = CoralConfig::load(&args.config)?;
    if let Some(steps) = args.steps {
        config.run.steps = steps;
    }
    let output_dir = args
        .output_dir
        .unwrap_or_else(|| PathBuf::from(&config.output.directory));
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory '{}'", output_dir.display()))?;

    // --- Seed Mesh ---
    let seed_mesh = match &config.seed_mesh.obj_path {
        Some(path) => {
            info!("Loading seed mesh from {}", path);
            Mesh::from_obj(path)?
        }
        None => {
            let mut sphere = Mesh::icosphere(config.seed_mesh.subdivisions, config.seed_mesh.radius);
            // Rest the sphere on the sea floor
            sphere.translate(Vec3::new(0.0, config.seed_mesh.radius, 0.0));
            sphere
        }
    };
    info!(
        "Seed mesh: {} vertices, {} faces.",
        seed_mesh.num_vertices(),
        seed_mesh.num_faces()
    );

    let params = config.get_colony_params();
    debug!("Colony Parameters: {:#?}", params);
    info!(
        "Controller width: {} inputs, {} outputs.",
        params.num_inputs(),
        params.num_outputs()
    );
    info!(
        "Running {} colonies on {} Rayon threads.",
        config.run.n_colonies,
        rayon::current_num_threads()
    );

    let environment: Arc<dyn Environment> = Arc::new(DirectionalEnvironment::default());
    let start_time = Instant::now();

    let outcomes: Vec<Result<ColonyOutcome>> = (0..config.run.n_colonies)
        .into_par_iter()
        .map(|index| run_colony(index, &config, &seed_mesh, environment.clone(), &output_dir))
        .collect();

    let mut best: Option<ColonyOutcome> = None;
    for outcome in outcomes {
        match outcome {
            Ok(outcome) => {
                if best.as_ref().map_or(true, |b| outcome.fitness > b.fitness) {
                    best = Some(outcome);
                }
            }
            Err(e) => {
                error!("Colony run failed: {:#}", e);
                anyhow::bail!("Colony run failed.");
            }
        }
    }

    if let Some(best) = best {
        info!(
            "Best colony: #{} with fitness {:.4} ({} polyps).",
            best.index, best.fitness, best.n_polyps
        );
    }
    info!(
        "All colonies finished in {:.3} seconds.",
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Grows one colony with its own controller and writes its outputs.
fn run_colony(
    index: usize,
    config: &CoralConfig,
    seed_mesh: &Mesh,
    environment: Arc<dyn Environment>,
    output_dir: &Path,
) -> Result<ColonyOutcome> {
    let params = config.get_colony_params();
    let mut rng = StdRng::seed_from_u64(config.run.seed.wrapping_add(index as u64));
    let network: Arc<dyn Network> = Arc::new(Mlp::random(
        params.num_inputs(),
        config.network.hidden,
        params.num_outputs(),
        config.network.weight_std,
        &mut rng,
    )?);

    let mut colony = Colony::new(
        seed_mesh.clone(),
        network,
        environment,
        config.traits.clone(),
        params,
    )
    .with_context(|| format!("Failed to build colony #{}", index))?;
    info!("Colony #{}: initialized with {} polyps.", index, colony.n_polyps());

    // --- Initial Snapshot (age = 0) ---
    colony.record_snapshot();

    let total_steps = config.run.steps;
    let record_interval = config.run.record_interval_steps;
    let start_time = Instant::now();
    for step in 0..total_steps {
        let step_start_time = Instant::now();
        colony.step();
        trace!(
            "Colony #{}: step [{}/{}] completed in {:.2} ms ({} polyps blocked)",
            index,
            step + 1,
            total_steps,
            step_start_time.elapsed().as_secs_f64() * 1000.0,
            colony.polyps().collided().iter().filter(|&&c| c).count()
        );

        let is_last_step = step + 1 == total_steps;
        if (step + 1) % record_interval == 0 || is_last_step {
            colony.record_snapshot();
            info!(
                "Colony #{}: age {} | Polyps: {} | Light: {:.4} | Collection: {:.4} | Volume: {:.4} | Elapsed: {:.2} s",
                index,
                colony.age(),
                colony.n_polyps(),
                colony.light(),
                colony.collection(),
                colony.volume(),
                start_time.elapsed().as_secs_f64()
            );
        }
    }

    colony.report_fitness(&format!("Colony #{}", index));
    debug!(
        "Colony #{}: final mesh has {} vertices and {} faces.",
        index,
        colony.mesh().num_vertices(),
        colony.mesh().num_faces()
    );

    // --- Save Outputs ---
    let stem = format!("{}_{}", config.output.base_filename, index);
    colony.export(output_dir.join(format!("{}.coral.obj", stem)))?;

    if config.output.save_stats {
        save_snapshots(output_dir, &stem, config.output.format, colony.recorded_snapshots())?;
    } else {
        debug!("Skipping snapshots for colony #{} as per config.", index);
    }

    if config.output.save_positions {
        save_positions(&output_dir.join(format!("{}_positions.csv", stem)), &colony)?;
    }

    Ok(ColonyOutcome {
        index,
        fitness: colony.fitness(),
        n_polyps: colony.n_polyps(),
    })
}

/// Writes the recorded snapshots in the configured format.
fn save_snapshots(output_dir: &Path, stem: &str, format: SnapshotFormat, snapshots: &[Snapshot]) -> Result<()> {
    match format {
        SnapshotFormat::Json => {
            let filename = output_dir.join(format!("{}_snapshots.json", stem));
            let json_string = serde_json::to_string(snapshots).context("Error serializing snapshots to JSON")?;
            let mut file = File::create(&filename)
                .with_context(|| format!("Error creating snapshot file '{}'", filename.display()))?;
            file.write_all(json_string.as_bytes())?;
            info!("Snapshots saved to {}", filename.display());
        }
        SnapshotFormat::Bincode => {
            // Binary format (much more compact)
            let filename = output_dir.join(format!("{}_snapshots.bin", stem));
            let file = File::create(&filename)
                .with_context(|| format!("Error creating snapshot file '{}'", filename.display()))?;
            bincode::serialize_into(BufWriter::new(file), snapshots)
                .context("Error serializing snapshots to bincode")?;
            info!("Snapshots saved to {} (binary format)", filename.display());
        }
        SnapshotFormat::Messagepack => {
            let filename = output_dir.join(format!("{}_snapshots.msgpack", stem));
            let mut file = BufWriter::new(
                File::create(&filename)
                    .with_context(|| format!("Error creating snapshot file '{}'", filename.display()))?,
            );
            rmp_serde::encode::write(&mut file, snapshots).context("Error serializing snapshots to MessagePack")?;
            file.flush()?;
            info!("Snapshots saved to {} (MessagePack format)", filename.display());
        }
    }
    Ok(())
}

/// Writes the final polyp positions and per-polyp fields as CSV.
fn save_positions(filename: &Path, colony: &Colony) -> Result<()> {
    let mut writer = csv::Writer::from_path(filename)
        .with_context(|| format!("Error creating CSV file '{}'", filename.display()))?;
    writer.write_record(["polyp", "x", "y", "z", "light", "flow", "gravity", "energy"])?;
    let polyps = colony.polyps();
    for (i, p) in polyps.positions().iter().enumerate() {
        writer.write_record(&[
            i.to_string(),
            format!("{:.4}", p.x),
            format!("{:.4}", p.y),
            format!("{:.4}", p.z),
            format!("{:.4}", polyps.light()[i]),
            format!("{:.4}", polyps.flow()[i]),
            format!("{:.4}", polyps.gravity()[i]),
            format!("{:.4}", polyps.energy()[i]),
        ])?;
    }
    writer.flush()?;
    if polyps.is_empty() {
        warn!("Colony has no polyps; {} only holds a header.", filename.display());
    }
    info!("Final positions saved to {}", filename.display());
    Ok(())
}
