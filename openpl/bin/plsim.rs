//! plsim - voxelise a scene and run one FDTD impulse simulation.
//!
//! This program is free software: you can redistribute and/or modify
//! it under the terms of the GNU General Public License as published by
//! the Free Software Foundation, either version 3 of the License, or
//! (at your option) any later version.
//!
//! This program is distributed in the hope that it will be useful,
//! but WITHOUT ANY WARRANTY; without even the implied warranty of
//! MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//! GNU General Public License for more details.
//!
//! You should have received a copy of the GNU General Public License
//! along with this program.  If not, see <https://www.gnu.org/licenses/>.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use openpl::{box_mesh, FdtdConfig, Quaternion, System, Vec3, VoxelStatus};

/// Voxelise a box scatterer inside a free-air volume and simulate the
/// impulse response between a source and a listener.
#[derive(Parser, Debug)]
#[command(name = "plsim", version, about)]
struct Args {
    /// JSON run configuration; built-in defaults are used if omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the number of simulated time steps
    #[arg(long)]
    steps: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunConfig {
    /// Simulation parameters; the voxel edge is derived from these.
    #[serde(default)]
    fdtd: FdtdConfig,
    /// Extent of the simulation volume, metres, centred on the origin.
    #[serde(default = "default_domain_size")]
    domain_size: [f64; 3],
    /// Centre of the box scatterer.
    #[serde(default)]
    obstacle_center: [f64; 3],
    /// Half-extent of the box scatterer.
    #[serde(default = "default_obstacle_half")]
    obstacle_half: [f64; 3],
    /// Wall absorption coefficient of the scatterer.
    #[serde(default = "default_wall_absorptivity")]
    wall_absorptivity: f64,
    /// Impulse injection point.
    #[serde(default = "default_source")]
    source: [f64; 3],
    /// Impulse response capture point.
    #[serde(default = "default_listener")]
    listener: [f64; 3],
}

fn default_domain_size() -> [f64; 3] {
    [10.0, 10.0, 10.0]
}
fn default_obstacle_half() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}
fn default_wall_absorptivity() -> f64 {
    0.75
}
fn default_source() -> [f64; 3] {
    [-3.5, 0.0, 0.0]
}
fn default_listener() -> [f64; 3] {
    [3.5, 0.0, 0.0]
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            fdtd: FdtdConfig::default(),
            domain_size: default_domain_size(),
            obstacle_center: [0.0, 0.0, 0.0],
            obstacle_half: default_obstacle_half(),
            wall_absorptivity: default_wall_absorptivity(),
            source: default_source(),
            listener: default_listener(),
        }
    }
}

fn vec3(a: [f64; 3]) -> Vec3 {
    Vec3::new(a[0], a[1], a[2])
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => RunConfig::default(),
    };
    if let Some(steps) = args.steps {
        config.fdtd.time_steps = steps;
    }

    run(config)
}

fn run(config: RunConfig) -> Result<()> {
    let cell_size = config.fdtd.spatial_step();
    info!(
        "spatial step {:.3} m, time step {:.3e} s, sampling rate {:.0} Hz",
        cell_size,
        config.fdtd.time_step(),
        config.fdtd.sampling_rate()
    );

    let system = System::new(config.fdtd.clone());
    let mut scene = system.create_scene();

    let (vertices, indices) = box_mesh(vec3(config.obstacle_center), vec3(config.obstacle_half));
    scene.add_mesh_with_material(
        Vec3::ZERO,
        Quaternion::IDENTITY,
        Vec3::splat(1.0),
        &vertices,
        &indices,
        config.wall_absorptivity,
    )?;
    scene.add_source_location(vec3(config.source))?;
    let listener = scene.add_listener_location(vec3(config.listener))?;

    scene.voxelise(Vec3::ZERO, vec3(config.domain_size), cell_size)?;
    while scene.voxelisation_status() == VoxelStatus::Ongoing {
        std::thread::sleep(std::time::Duration::from_millis(20));
    }

    let voxels = scene.voxels_count()?;
    let solid = scene
        .lattice()
        .map(|l| l.cells.iter().filter(|c| !c.is_air()).count())
        .unwrap_or(0);
    info!("lattice ready: {} voxels, {} solid", voxels, solid);

    info!("simulating {} steps", config.fdtd.time_steps);
    scene.simulate()?;

    let response = scene.impulse_response(listener)?;
    let (peak_step, peak) = response
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.abs().partial_cmp(&b.1.abs()).unwrap())
        .map(|(i, &p)| (i, p))
        .unwrap_or((0, 0.0));
    let arrival = response.iter().position(|&p| p.abs() > 1e-9);

    println!("voxels:        {}", voxels);
    println!("solid voxels:  {}", solid);
    println!("samples:       {}", response.len());
    match arrival {
        Some(step) => println!(
            "first arrival: step {} ({:.2} ms)",
            step,
            step as f64 * config.fdtd.time_step() * 1000.0
        ),
        None => println!("first arrival: none within the simulated window"),
    }
    println!("peak:          {:+.3e} at step {}", peak, peak_step);

    Ok(())
}
