//! The voxeliser: rasterises world-space meshes into the lattice.
//!
//! Every cell starts as open air. For each mesh the voxeliser culls
//! candidate cells by bounding-box overlap, then samples nine points per
//! candidate (the cell centre plus its eight corners) against the
//! point-in-closed-mesh test. A cell is marked solid when at least three
//! samples land inside; a cell straddling the surface with fewer inside
//! points stays air. When several meshes claim the same cell, the
//! last-ingested mesh wins.

use log::{debug, warn};
use ndarray::Array2;
use rayon::prelude::*;

use crate::error::Result;
use crate::geometry::Vec3;
use crate::lattice::VoxelLattice;
use crate::mesh::MeshMatrix;

/// Samples per candidate cell: the centre plus eight corners.
const SAMPLES_PER_CELL: usize = 9;

/// Minimum number of inside samples for a cell to count as solid.
const SOLID_SAMPLE_THRESHOLD: usize = 3;

/// Rasterise `meshes` into `lattice`, assigning occupancy and absorptivity.
///
/// Re-initialises every cell to air first, so a lattice can be refilled
/// after the mesh list changes. Meshes whose bounding box misses the
/// lattice are skipped; a mesh that overlaps the bounds but claims no
/// candidate cells logs a warning and is skipped (internal invariant
/// breach, not an error).
pub fn fill_voxels(lattice: &mut VoxelLattice, meshes: &[MeshMatrix]) -> Result<()> {
    for cell in &mut lattice.cells {
        cell.beta = 1.0;
        cell.absorptivity = 0.0;
    }

    for (mesh_idx, mesh) in meshes.iter().enumerate() {
        let mesh_bounds = mesh.aabb();
        if !lattice.bounds.intersects(&mesh_bounds) {
            debug!(
                "mesh {} lies outside the lattice bounds; skipping",
                mesh_idx
            );
            continue;
        }

        let snapshot: &VoxelLattice = lattice;
        let candidates: Vec<usize> = (0..snapshot.len())
            .filter(|&i| snapshot.cell_cube(i).intersects(&mesh_bounds))
            .collect();

        if candidates.is_empty() {
            warn!(
                "no candidate cells for mesh {} despite bounding-box overlap",
                mesh_idx
            );
            continue;
        }

        let half = snapshot.cell_size / 2.0;
        let solid: Vec<usize> = candidates
            .par_iter()
            .filter(|&&i| {
                let samples = cell_sample_points(&snapshot.cells[i].world_pos, half);
                let inside = mesh.contains_points(&samples);
                let hits = inside.iter().filter(|&&flag| flag == 1).count();
                hits >= SOLID_SAMPLE_THRESHOLD
            })
            .copied()
            .collect();

        debug!(
            "mesh {}: {} candidate cells, {} solid",
            mesh_idx,
            candidates.len(),
            solid.len()
        );

        for i in solid {
            let cell = &mut lattice.cells[i];
            cell.beta = 0.0;
            cell.absorptivity = mesh.absorptivity;
        }
    }

    Ok(())
}

/// The nine sample points of a cell as a `(3, 9)` query matrix: the centre,
/// then the eight corners at centre offset by half the edge on each axis.
fn cell_sample_points(center: &Vec3, half: f64) -> Array2<f64> {
    let mut q = Array2::<f64>::zeros((3, SAMPLES_PER_CELL));
    q[[0, 0]] = center.x;
    q[[1, 0]] = center.y;
    q[[2, 0]] = center.z;
    let mut col = 1;
    for &dx in &[-half, half] {
        for &dy in &[-half, half] {
            for &dz in &[-half, half] {
                q[[0, col]] = center.x + dx;
                q[[1, col]] = center.y + dy;
                q[[2, col]] = center.z + dz;
                col += 1;
            }
        }
    }
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Quaternion;
    use crate::mesh::box_mesh;

    fn make_box(half: f64, absorptivity: f64) -> MeshMatrix {
        let (verts, idx) = box_mesh(Vec3::ZERO, Vec3::splat(half));
        MeshMatrix::from_world_mesh(
            Vec3::ZERO,
            Quaternion::IDENTITY,
            Vec3::splat(1.0),
            &verts,
            &idx,
        )
        .unwrap()
        .with_absorptivity(absorptivity)
        .unwrap()
    }

    fn ten_cube_lattice() -> VoxelLattice {
        VoxelLattice::build(Vec3::ZERO, Vec3::splat(10.0), 1.0).unwrap()
    }

    /// Whether the majority rule should mark the cell at `centre` solid for
    /// an origin-centred box of half-extent `bh`: with half-integer cell
    /// centres the corner samples sit on integer coordinates, so the inside
    /// count per axis is 2, 1 or 0 depending on how deep the cell sits.
    fn expected_solid(centre: &Vec3, bh: f64) -> bool {
        let per_axis = |a: f64| -> usize {
            [a - 0.5, a + 0.5]
                .iter()
                .filter(|&&c| c.abs() < bh)
                .count()
        };
        let corners = per_axis(centre.x) * per_axis(centre.y) * per_axis(centre.z);
        let centre_in =
            centre.x.abs() < bh && centre.y.abs() < bh && centre.z.abs() < bh;
        corners + centre_in as usize >= SOLID_SAMPLE_THRESHOLD
    }

    #[test]
    fn test_box_marks_interior_cells_solid() {
        let mut lat = ten_cube_lattice();
        let mesh = make_box(2.2, 0.75);
        fill_voxels(&mut lat, &[mesh]).unwrap();

        let mut solid_count = 0;
        for i in 0..lat.len() {
            let cell = &lat.cells[i];
            let expect = expected_solid(&cell.world_pos, 2.2);
            if expect {
                assert_eq!(cell.beta, 0.0, "cell {} should be solid", i);
                assert_eq!(cell.absorptivity, 0.75);
                solid_count += 1;
            } else {
                assert_eq!(cell.beta, 1.0, "cell {} should be air", i);
                assert_eq!(cell.absorptivity, 0.0);
            }
        }
        // 64 fully-interior cells plus 96 face-layer cells with 4 corner hits.
        assert_eq!(solid_count, 160);
    }

    #[test]
    fn test_straddling_cells_with_few_hits_stay_air() {
        // A unit box puts at most one sample inside any cell, so the
        // majority rule leaves the whole lattice as air.
        let mut lat = ten_cube_lattice();
        let mesh = make_box(0.5, 0.75);
        fill_voxels(&mut lat, &[mesh]).unwrap();
        assert!(lat.cells.iter().all(|c| c.beta == 1.0));
    }

    #[test]
    fn test_last_mesh_wins_on_shared_cells() {
        let mut lat = ten_cube_lattice();
        let outer = make_box(2.2, 0.7);
        let inner = make_box(1.2, 0.3);
        fill_voxels(&mut lat, &[outer, inner]).unwrap();

        // Deep-interior cell claimed by both: the later mesh's material wins.
        let core = lat.cell_at_position(&Vec3::splat(0.5));
        assert_eq!(lat.cells[core].beta, 0.0);
        assert_eq!(lat.cells[core].absorptivity, 0.3);

        // Cell only the outer box reaches keeps the first material.
        let shell = lat.cell_at_position(&Vec3::new(2.5, 0.5, 0.5));
        assert_eq!(lat.cells[shell].beta, 0.0);
        assert_eq!(lat.cells[shell].absorptivity, 0.7);
    }

    #[test]
    fn test_mesh_outside_lattice_is_skipped() {
        let mut lat = ten_cube_lattice();
        let (verts, idx) = box_mesh(Vec3::splat(100.0), Vec3::splat(2.0));
        let far = MeshMatrix::from_world_mesh(
            Vec3::ZERO,
            Quaternion::IDENTITY,
            Vec3::splat(1.0),
            &verts,
            &idx,
        )
        .unwrap();
        fill_voxels(&mut lat, &[far]).unwrap();
        assert!(lat.cells.iter().all(|c| c.beta == 1.0));
    }

    #[test]
    fn test_refill_resets_previous_occupancy() {
        let mut lat = ten_cube_lattice();
        fill_voxels(&mut lat, &[make_box(2.2, 0.75)]).unwrap();
        assert!(lat.cells.iter().any(|c| c.beta == 0.0));
        fill_voxels(&mut lat, &[]).unwrap();
        assert!(lat.cells.iter().all(|c| c.beta == 1.0 && c.absorptivity == 0.0));
    }

    #[test]
    fn test_occupancy_invariants_hold() {
        let mut lat = ten_cube_lattice();
        fill_voxels(&mut lat, &[make_box(2.2, 0.75)]).unwrap();
        for cell in &lat.cells {
            assert!(cell.beta == 0.0 || cell.beta == 1.0);
            assert!((0.0..=1.0).contains(&cell.absorptivity));
            if cell.beta == 0.0 {
                assert!(cell.absorptivity > 0.0);
            }
        }
    }
}
