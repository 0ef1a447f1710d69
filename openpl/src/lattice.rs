//! The voxel lattice: a dense cubic-cell grid over the simulation volume.
//!
//! Cells are stored in a flat vector under the lexicographic mapping
//! `i = x + y * X + z * X * Y`. Each cell carries its world-space centre,
//! the rigidity flag `beta` (1 = open air, 0 = solid wall), a wall
//! absorption coefficient, and the acoustic state (pressure plus three
//! staggered particle-velocity components living on the cell's lower faces).

use serde::{Deserialize, Serialize};

use crate::error::{PlError, Result};
use crate::geometry::{Aabb, Vec3};

/// Per-axis cell counts of the isotropic grid covering `size` with cubic
/// cells of edge `cell_size`.
///
/// The x count is the number of whole cells along x; the y and z counts may
/// round up by one so the grid covers the box. Cells stay cubic to
/// numerical precision regardless of rounding.
pub fn isotropic_grid_counts(size: &Vec3, cell_size: f64) -> (usize, usize, usize) {
    let nx = (size.x / cell_size).floor() as usize;
    let ny = ((size.y / cell_size) - 1e-9).ceil() as usize;
    let nz = ((size.z / cell_size) - 1e-9).ceil() as usize;
    (nx, ny, nz)
}

/// One cubic cell of the lattice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoxelCell {
    /// Cell centre in world space; set at construction, immutable thereafter.
    pub world_pos: Vec3,
    /// Rigidity: 1.0 = open air, 0.0 = solid wall.
    pub beta: f64,
    /// Wall absorption coefficient in `[0, 1]`; 0 for air cells.
    pub absorptivity: f64,
    /// Current pressure sample.
    pub pressure: f64,
    /// Particle velocity on the cell's x-minus face.
    pub vx: f64,
    /// Particle velocity on the cell's y-minus face.
    pub vy: f64,
    /// Particle velocity on the cell's z-minus face.
    pub vz: f64,
}

impl VoxelCell {
    /// A fresh open-air cell at `world_pos` with zero acoustic state.
    pub fn air(world_pos: Vec3) -> Self {
        Self {
            world_pos,
            beta: 1.0,
            absorptivity: 0.0,
            pressure: 0.0,
            vx: 0.0,
            vy: 0.0,
            vz: 0.0,
        }
    }

    /// True if this cell is open air.
    pub fn is_air(&self) -> bool {
        self.beta != 0.0
    }
}

/// The voxel lattice: bounds, per-axis cell counts, cell edge length and the
/// flat cell vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoxelLattice {
    /// Bounding box of the simulation volume.
    pub bounds: Aabb,
    /// Per-axis cell counts `(X, Y, Z)`.
    pub counts: (usize, usize, usize),
    /// Cell edge length in metres; cells are cubic.
    pub cell_size: f64,
    /// All cells, ordered by `i = x + y * X + z * X * Y`.
    pub cells: Vec<VoxelCell>,
}

impl VoxelLattice {
    /// Build an all-air lattice over the box `[center - size/2, center + size/2]`.
    ///
    /// The x count is `floor(size.x / cell_size)`; the y and z counts follow
    /// the isotropic grid rule and may round up by one so the cubic cells
    /// cover the box. Centres form the unique isotropic grid of
    /// `X * Y * Z` points symmetric about the box centre.
    ///
    /// Fails with an invalid-parameter error when no cell fits along some
    /// axis, and with a degenerate-lattice error if any axis count comes out
    /// zero (an internal invariant breach).
    pub fn build(center: Vec3, size: Vec3, cell_size: f64) -> Result<Self> {
        if size.x < cell_size || size.y < cell_size || size.z < cell_size {
            return Err(PlError::CellLargerThanDomain {
                cell_size,
                size_x: size.x,
                size_y: size.y,
                size_z: size.z,
            });
        }

        let bounds = Aabb::from_center_size(center, size);

        let (nx, ny, nz) = isotropic_grid_counts(&size, cell_size);
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(PlError::DegenerateLattice {
                x: nx,
                y: ny,
                z: nz,
            });
        }

        let origin = Vec3::new(
            center.x - (nx as f64 - 1.0) * cell_size / 2.0,
            center.y - (ny as f64 - 1.0) * cell_size / 2.0,
            center.z - (nz as f64 - 1.0) * cell_size / 2.0,
        );

        let mut cells = Vec::with_capacity(nx * ny * nz);
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let pos = Vec3::new(
                        origin.x + x as f64 * cell_size,
                        origin.y + y as f64 * cell_size,
                        origin.z + z as f64 * cell_size,
                    );
                    cells.push(VoxelCell::air(pos));
                }
            }
        }

        Ok(Self {
            bounds,
            counts: (nx, ny, nz),
            cell_size,
            cells,
        })
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True if the lattice holds no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Flat index of the cell at lattice coordinates `(x, y, z)`.
    #[inline]
    pub fn cell_index(&self, x: usize, y: usize, z: usize) -> usize {
        let (nx, ny, _) = self.counts;
        x + y * nx + z * nx * ny
    }

    /// Lattice coordinates of the cell at flat index `i`.
    #[inline]
    pub fn cell_coords(&self, i: usize) -> (usize, usize, usize) {
        let (nx, ny, _) = self.counts;
        let x = i % nx;
        let y = (i / nx) % ny;
        let z = i / (nx * ny);
        (x, y, z)
    }

    /// Flat index of the cell whose cube contains `pos`, clamped to the
    /// lattice for positions outside the bounds.
    pub fn cell_at_position(&self, pos: &Vec3) -> usize {
        let (nx, ny, nz) = self.counts;
        let clamp_axis = |v: f64, min: f64, n: usize| -> usize {
            let i = ((v - min) / self.cell_size).floor();
            if i < 0.0 {
                0
            } else {
                (i as usize).min(n - 1)
            }
        };
        // The centre grid is symmetric about the box centre, so the cube
        // edges start at the first centre minus half a cell.
        let first = self.cells[0].world_pos;
        let x = clamp_axis(pos.x, first.x - self.cell_size / 2.0, nx);
        let y = clamp_axis(pos.y, first.y - self.cell_size / 2.0, ny);
        let z = clamp_axis(pos.z, first.z - self.cell_size / 2.0, nz);
        self.cell_index(x, y, z)
    }

    /// The cube occupied by cell `i` (centre plus/minus half the edge).
    pub fn cell_cube(&self, i: usize) -> Aabb {
        Aabb::from_center_size(self.cells[i].world_pos, Vec3::splat(self.cell_size))
    }

    /// Zero all pressure and particle-velocity samples, leaving occupancy
    /// (`beta`, `absorptivity`) untouched.
    pub fn reset_acoustic_state(&mut self) {
        for cell in &mut self.cells {
            cell.pressure = 0.0;
            cell.vx = 0.0;
            cell.vy = 0.0;
            cell.vz = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_for_exact_division() {
        let lat = VoxelLattice::build(Vec3::ZERO, Vec3::splat(10.0), 1.0).unwrap();
        assert_eq!(lat.counts, (10, 10, 10));
        assert_eq!(lat.len(), 1000);
    }

    #[test]
    fn test_counts_round_up_to_fill_the_box() {
        let lat = VoxelLattice::build(Vec3::ZERO, Vec3::new(10.0, 10.4, 10.4), 1.0).unwrap();
        assert_eq!(lat.counts, (10, 11, 11));
    }

    #[test]
    fn test_rejects_cell_larger_than_domain() {
        let err = VoxelLattice::build(Vec3::ZERO, Vec3::splat(1.0), 2.0).unwrap_err();
        assert!(matches!(err, PlError::CellLargerThanDomain { .. }));
    }

    #[test]
    fn test_index_mapping_roundtrip() {
        let lat = VoxelLattice::build(Vec3::ZERO, Vec3::new(4.0, 3.0, 2.0), 1.0).unwrap();
        assert_eq!(lat.counts, (4, 3, 2));
        for i in 0..lat.len() {
            let (x, y, z) = lat.cell_coords(i);
            assert_eq!(lat.cell_index(x, y, z), i);
        }
        // Lexicographic: x runs fastest.
        assert_eq!(lat.cell_index(1, 0, 0), 1);
        assert_eq!(lat.cell_index(0, 1, 0), 4);
        assert_eq!(lat.cell_index(0, 0, 1), 12);
    }

    #[test]
    fn test_centres_symmetric_about_box_centre() {
        let lat = VoxelLattice::build(Vec3::ZERO, Vec3::splat(10.0), 1.0).unwrap();
        let first = lat.cells[0].world_pos;
        let last = lat.cells[lat.len() - 1].world_pos;
        assert!((first.x + last.x).abs() < 1e-12);
        assert!((first.y + last.y).abs() < 1e-12);
        assert!((first.z + last.z).abs() < 1e-12);
        assert!((first.x - (-4.5)).abs() < 1e-12);
        // Cell 0 is the minimum corner cell.
        assert!(lat.bounds.contains_point(&first));
    }

    #[test]
    fn test_cell_at_position_hits_the_containing_cube() {
        let lat = VoxelLattice::build(Vec3::ZERO, Vec3::splat(10.0), 1.0).unwrap();
        let i = lat.cell_at_position(&Vec3::new(0.2, 0.2, 0.2));
        let cube = lat.cell_cube(i);
        assert!(cube.contains_point(&Vec3::new(0.2, 0.2, 0.2)));
        // Clamping: far outside still returns a valid cell.
        let j = lat.cell_at_position(&Vec3::splat(100.0));
        assert_eq!(j, lat.len() - 1);
    }

    #[test]
    fn test_fresh_lattice_is_all_air() {
        let lat = VoxelLattice::build(Vec3::ZERO, Vec3::splat(4.0), 1.0).unwrap();
        assert!(lat.cells.iter().all(|c| c.beta == 1.0
            && c.absorptivity == 0.0
            && c.pressure == 0.0
            && c.vx == 0.0
            && c.vy == 0.0
            && c.vz == 0.0));
    }
}
