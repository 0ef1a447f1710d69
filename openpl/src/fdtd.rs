//! FDTD kernel: time-stepped simulation of the linearised acoustic wave
//! equation on the voxel lattice.
//!
//! The scheme is a Yee-style staggered grid: pressure lives at cell centres,
//! particle velocity on cell faces (each cell stores the velocity of its
//! three lower faces). One time step is, in order:
//!
//! 1. pressure update from the particle-velocity divergence,
//! 2. the three velocity-component updates from pressure gradients, with a
//!    locally reactive wall term derived from the per-cell rigidity and
//!    absorption,
//! 3. a first-order absorbing layer on the x and z boundary faces,
//! 4. source injection into the excitation cell,
//! 5. a full-state snapshot into the simulation grid.
//!
//! Cells reading past the lattice edge take a zero-initialised ghost
//! neighbour. The snapshot captures the end-of-step state, so column `t` of
//! the grid includes step `t`'s injection.

use log::debug;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{PlError, Result};
use crate::lattice::{VoxelCell, VoxelLattice};

/// Speed of sound in air, m/s.
pub const SPEED_OF_SOUND: f64 = 343.21;

/// Minimum modelled frequency, Hz.
pub const MIN_FREQUENCY: f64 = 275.0;

/// Simulation parameters. Everything else (spatial step, time step,
/// sampling rate, update coefficient) is derived from these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FdtdConfig {
    /// Speed of sound in m/s.
    #[serde(default = "default_speed_of_sound")]
    pub speed_of_sound: f64,
    /// Minimum modelled frequency in Hz; fixes the spatial resolution.
    #[serde(default = "default_min_frequency")]
    pub min_frequency: f64,
    /// Number of time steps retained in the simulation grid.
    #[serde(default = "default_time_steps")]
    pub time_steps: usize,
    /// Peak amplitude of the Gaussian source pulse.
    #[serde(default = "default_pulse_amplitude")]
    pub pulse_amplitude: f64,
}

fn default_speed_of_sound() -> f64 {
    SPEED_OF_SOUND
}
fn default_min_frequency() -> f64 {
    MIN_FREQUENCY
}
fn default_time_steps() -> usize {
    300
}
fn default_pulse_amplitude() -> f64 {
    1.0
}

impl Default for FdtdConfig {
    fn default() -> Self {
        Self {
            speed_of_sound: default_speed_of_sound(),
            min_frequency: default_min_frequency(),
            time_steps: default_time_steps(),
            pulse_amplitude: default_pulse_amplitude(),
        }
    }
}

impl FdtdConfig {
    /// Wavelength of the minimum modelled frequency, metres.
    pub fn min_wavelength(&self) -> f64 {
        self.speed_of_sound / self.min_frequency
    }

    /// Required spatial step: the lattice cell size must match this for the
    /// derived constants to hold.
    pub fn spatial_step(&self) -> f64 {
        self.min_wavelength() / 3.5
    }

    /// Time step satisfying the CFL condition.
    pub fn time_step(&self) -> f64 {
        self.spatial_step() / (self.speed_of_sound * 1.5)
    }

    /// Output sampling rate, Hz.
    pub fn sampling_rate(&self) -> f64 {
        1.0 / self.time_step()
    }

    /// Dimensionless update coefficient `K = c * dt / dx`; appears in every
    /// pressure and velocity update.
    pub fn update_coefficient(&self) -> f64 {
        self.speed_of_sound * self.time_step() / self.spatial_step()
    }
}

/// Pre-computed Gaussian excitation pulse, one sample per time step.
///
/// Sample `i` is `A * exp(-((i*dt - 2*sigma)^2 / sigma^2))` with
/// `sigma = 1 / (0.5 * pi * f_min)`.
pub fn gaussian_pulse(config: &FdtdConfig) -> Array1<f64> {
    let sigma = 1.0 / (0.5 * std::f64::consts::PI * config.min_frequency);
    let dt = config.time_step();
    Array1::from_shape_fn(config.time_steps, |i| {
        let t = i as f64 * dt - 2.0 * sigma;
        config.pulse_amplitude * (-(t * t) / (sigma * sigma)).exp()
    })
}

/// Plain-data snapshot of one cell at one time step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CellState {
    pub pressure: f64,
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
    pub beta: f64,
    pub absorptivity: f64,
}

impl From<&VoxelCell> for CellState {
    fn from(cell: &VoxelCell) -> Self {
        Self {
            pressure: cell.pressure,
            vx: cell.vx,
            vy: cell.vy,
            vz: cell.vz,
            beta: cell.beta,
            absorptivity: cell.absorptivity,
        }
    }
}

/// The retained `(cell, time)` history of a simulation run.
pub struct SimulationGrid {
    /// Full cell state; entry `(i, t)` is cell `i` at the end of step `t`.
    pub data: Array2<CellState>,
    /// Per-axis cell counts of the lattice that produced this grid.
    pub counts: (usize, usize, usize),
}

impl SimulationGrid {
    fn allocate(cells: usize, steps: usize, counts: (usize, usize, usize)) -> Self {
        Self {
            data: Array2::from_elem((cells, steps), CellState::default()),
            counts,
        }
    }

    /// Number of lattice cells covered.
    pub fn cells(&self) -> usize {
        self.data.nrows()
    }

    /// Number of retained time steps.
    pub fn steps(&self) -> usize {
        self.data.ncols()
    }

    /// Pressure time series at one cell; this is the raw impulse response
    /// captured at that location.
    pub fn pressure_history(&self, cell: usize) -> Array1<f64> {
        Array1::from_iter(self.data.row(cell).iter().map(|s| s.pressure))
    }
}

/// Run the FDTD simulation, injecting the pulse at `source_cell`.
///
/// Resets the lattice's acoustic state, then advances `config.time_steps`
/// steps, recording every step into the grid slot. An existing grid of
/// matching shape is reused; otherwise a fresh one is allocated.
pub fn simulate(
    lattice: &mut VoxelLattice,
    config: &FdtdConfig,
    source_cell: usize,
    grid_slot: &mut Option<SimulationGrid>,
) -> Result<()> {
    if lattice.is_empty() {
        return Err(PlError::LatticeMissing);
    }
    let n = lattice.len();
    if source_cell >= n {
        return Err(PlError::QueryIndexOutOfRange {
            index: source_cell,
            count: n,
        });
    }

    let steps = config.time_steps;
    let mut grid = match grid_slot.take() {
        Some(g) if g.data.dim() == (n, steps) => g,
        _ => SimulationGrid::allocate(n, steps, lattice.counts),
    };
    grid.counts = lattice.counts;

    lattice.reset_acoustic_state();
    let pulse = gaussian_pulse(config);
    let k = config.update_coefficient();
    debug!(
        "fdtd: {} cells, {} steps, dx = {:.4} m, dt = {:.3e} s, K = {:.4}",
        n,
        steps,
        config.spatial_step(),
        config.time_step(),
        k
    );

    for t in 0..steps {
        update_pressure(lattice, k);
        update_velocity(lattice, k, Axis::X);
        update_velocity(lattice, k, Axis::Y);
        update_velocity(lattice, k, Axis::Z);
        absorb_boundary_faces(lattice);
        lattice.cells[source_cell].pressure += pulse[t];
        snapshot(lattice, &mut grid, t);
    }

    *grid_slot = Some(grid);
    Ok(())
}

/// Pressure update: `P <- beta * (P - K * div(v))`, where the divergence
/// reads each axis's next-neighbour face velocity with a zero ghost past the
/// lattice edge. Reads only step `t-1` velocities, so it runs in place.
fn update_pressure(lattice: &mut VoxelLattice, k: f64) {
    let (nx, ny, nz) = lattice.counts;
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let i = lattice.cell_index(x, y, z);
                let vx_next = if x + 1 < nx {
                    lattice.cells[lattice.cell_index(x + 1, y, z)].vx
                } else {
                    0.0
                };
                let vy_next = if y + 1 < ny {
                    lattice.cells[lattice.cell_index(x, y + 1, z)].vy
                } else {
                    0.0
                };
                let vz_next = if z + 1 < nz {
                    lattice.cells[lattice.cell_index(x, y, z + 1)].vz
                } else {
                    0.0
                };
                let cell = &lattice.cells[i];
                let div =
                    (vx_next - cell.vx) + (vy_next - cell.vy) + (vz_next - cell.vz);
                let updated = cell.beta * (cell.pressure - k * div);
                lattice.cells[i].pressure = updated;
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Axis {
    X,
    Y,
    Z,
}

/// Velocity update along one axis, for every interior cell (start index 1).
///
/// The `beta(prev) - beta(this)` factor flips the sign of the wall term
/// depending on which side of an air/wall interface the cell sits, giving a
/// locally reactive boundary with admittance `Y = (1 - a) / (1 + a)`.
fn update_velocity(lattice: &mut VoxelLattice, k: f64, axis: Axis) {
    let (nx, ny, nz) = lattice.counts;
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let prev_coords = match axis {
                    Axis::X if x > 0 => (x - 1, y, z),
                    Axis::Y if y > 0 => (x, y - 1, z),
                    Axis::Z if z > 0 => (x, y, z - 1),
                    _ => continue,
                };
                let prev =
                    lattice.cells[lattice.cell_index(prev_coords.0, prev_coords.1, prev_coords.2)];
                let i = lattice.cell_index(x, y, z);
                let cur = lattice.cells[i];

                let y_prev = (1.0 - prev.absorptivity) / (1.0 + prev.absorptivity);
                let y_cur = (1.0 - cur.absorptivity) / (1.0 + cur.absorptivity);

                let grad = cur.pressure - prev.pressure;
                let velocity = match axis {
                    Axis::X => cur.vx,
                    Axis::Y => cur.vy,
                    Axis::Z => cur.vz,
                };
                let air_update = velocity - k * grad;

                let y_boundary = cur.beta * y_prev + prev.beta * y_cur;
                let wall_update =
                    y_boundary * (prev.pressure * prev.beta + cur.pressure * cur.beta);

                let updated =
                    cur.beta * prev.beta * air_update + (prev.beta - cur.beta) * wall_update;
                match axis {
                    Axis::X => lattice.cells[i].vx = updated,
                    Axis::Y => lattice.cells[i].vy = updated,
                    Axis::Z => lattice.cells[i].vz = updated,
                }
            }
        }
    }
}

/// First-order Mur-style absorber on the domain boundary.
///
/// Contract: the x = 0 and x = X-1 faces overwrite the face-normal velocity
/// with `vx = -P` and `vx = +P`; the z = 0 and z = Z-1 faces likewise with
/// `vz = -P` and `vz = +P`. The y faces stay rigid (ghost-zero). Face cells
/// are walked through the lexicographic index mapping.
fn absorb_boundary_faces(lattice: &mut VoxelLattice) {
    let (nx, ny, nz) = lattice.counts;
    for z in 0..nz {
        for y in 0..ny {
            let lo = lattice.cell_index(0, y, z);
            lattice.cells[lo].vx = -lattice.cells[lo].pressure;
            let hi = lattice.cell_index(nx - 1, y, z);
            lattice.cells[hi].vx = lattice.cells[hi].pressure;
        }
    }
    for y in 0..ny {
        for x in 0..nx {
            let lo = lattice.cell_index(x, y, 0);
            lattice.cells[lo].vz = -lattice.cells[lo].pressure;
            let hi = lattice.cell_index(x, y, nz - 1);
            lattice.cells[hi].vz = lattice.cells[hi].pressure;
        }
    }
}

fn snapshot(lattice: &VoxelLattice, grid: &mut SimulationGrid, t: usize) {
    for (i, cell) in lattice.cells.iter().enumerate() {
        grid.data[[i, t]] = CellState::from(cell);
    }
}
