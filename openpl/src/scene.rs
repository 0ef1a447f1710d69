//! The scene facade: meshes, listener/source locations, the lattice, the
//! simulation grid and the voxeliser worker behind one public surface.
//!
//! The lifecycle is strictly linear: register meshes, voxelise, simulate,
//! query. Voxelisation runs asynchronously; the lattice-dependent queries
//! no-op gracefully (success with zero-valued outputs) while the worker is
//! busy, and `simulate` joins the worker before touching the lattice. List
//! mutations while the worker is in flight are rejected rather than left
//! undefined.

use std::sync::Weak;

use log::{info, warn};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{PlError, Result};
use crate::fdtd::{self, FdtdConfig, SimulationGrid};
use crate::geometry::{Quaternion, Vec3};
use crate::lattice::VoxelLattice;
use crate::mesh::MeshMatrix;
use crate::system::SystemInner;
use crate::voxelizer;
use crate::worker::{VoxelStatus, VoxelWorker};

/// The serialisable public state of a scene: registered meshes plus the
/// listener and source location lists. Re-importing an exported state is a
/// semantic no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneState {
    pub meshes: Vec<MeshMatrix>,
    pub listeners: Vec<Vec3>,
    pub sources: Vec<Vec3>,
}

/// A simulation scene. Created from a [`crate::system::System`]; owns its
/// meshes, lattice, grid and worker exclusively.
pub struct Scene {
    system: Weak<SystemInner>,
    meshes: Vec<MeshMatrix>,
    listeners: Vec<Vec3>,
    sources: Vec<Vec3>,
    lattice: Option<VoxelLattice>,
    grid: Option<SimulationGrid>,
    worker: VoxelWorker,
}

impl Scene {
    pub(crate) fn new(system: Weak<SystemInner>) -> Self {
        Self {
            system,
            meshes: Vec::new(),
            listeners: Vec::new(),
            sources: Vec::new(),
            lattice: None,
            grid: None,
            worker: VoxelWorker::new(),
        }
    }

    fn config(&self) -> Result<FdtdConfig> {
        self.system
            .upgrade()
            .map(|inner| inner.config.clone())
            .ok_or(PlError::SystemReleased)
    }

    fn ensure_lists_mutable(&self) -> Result<()> {
        if self.worker.status() == VoxelStatus::Ongoing {
            return Err(PlError::VoxelisationInFlight);
        }
        Ok(())
    }

    // ========================================================================
    // Mesh and location lists
    // ========================================================================

    /// Ingest an engine mesh under a world transform with the default wall
    /// material. Returns the mesh's stable index.
    pub fn add_mesh(
        &mut self,
        position: Vec3,
        rotation: Quaternion,
        scale: Vec3,
        vertices: &[Vec3],
        indices: &[u32],
    ) -> Result<usize> {
        self.ensure_lists_mutable()?;
        let mesh = MeshMatrix::from_world_mesh(position, rotation, scale, vertices, indices)?;
        self.meshes.push(mesh);
        Ok(self.meshes.len() - 1)
    }

    /// Like [`Scene::add_mesh`] with an explicit wall absorption coefficient.
    #[allow(clippy::too_many_arguments)]
    pub fn add_mesh_with_material(
        &mut self,
        position: Vec3,
        rotation: Quaternion,
        scale: Vec3,
        vertices: &[Vec3],
        indices: &[u32],
        absorptivity: f64,
    ) -> Result<usize> {
        self.ensure_lists_mutable()?;
        let mesh = MeshMatrix::from_world_mesh(position, rotation, scale, vertices, indices)?
            .with_absorptivity(absorptivity)?;
        self.meshes.push(mesh);
        Ok(self.meshes.len() - 1)
    }

    /// Remove a mesh by index; later indices shift down by one.
    pub fn remove_mesh(&mut self, index: usize) -> Result<()> {
        self.ensure_lists_mutable()?;
        if index >= self.meshes.len() {
            return Err(PlError::RemovalIndexOutOfRange {
                index,
                count: self.meshes.len(),
            });
        }
        self.meshes.remove(index);
        Ok(())
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Register a listener location; returns its stable index.
    pub fn add_listener_location(&mut self, location: Vec3) -> Result<usize> {
        self.ensure_lists_mutable()?;
        self.listeners.push(location);
        Ok(self.listeners.len() - 1)
    }

    pub fn remove_listener_location(&mut self, index: usize) -> Result<()> {
        self.ensure_lists_mutable()?;
        if index >= self.listeners.len() {
            return Err(PlError::RemovalIndexOutOfRange {
                index,
                count: self.listeners.len(),
            });
        }
        self.listeners.remove(index);
        Ok(())
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Register a source location; returns its stable index.
    pub fn add_source_location(&mut self, location: Vec3) -> Result<usize> {
        self.ensure_lists_mutable()?;
        self.sources.push(location);
        Ok(self.sources.len() - 1)
    }

    pub fn remove_source_location(&mut self, index: usize) -> Result<()> {
        self.ensure_lists_mutable()?;
        if index >= self.sources.len() {
            return Err(PlError::RemovalIndexOutOfRange {
                index,
                count: self.sources.len(),
            });
        }
        self.sources.remove(index);
        Ok(())
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    // ========================================================================
    // Voxelisation
    // ========================================================================

    /// Kick off asynchronous voxelisation of the volume
    /// `[center - size/2, center + size/2]` with cubic cells of edge
    /// `cell_size`.
    ///
    /// Validates synchronously and fails fast: no meshes registered, or a
    /// cell that fits nowhere in the volume, leave the scene unchanged. A
    /// request while a job is already running is accepted and ignored.
    pub fn voxelise(&mut self, center: Vec3, size: Vec3, cell_size: f64) -> Result<()> {
        if self.meshes.is_empty() {
            return Err(PlError::NoMeshes);
        }
        if size.x < cell_size || size.y < cell_size || size.z < cell_size {
            return Err(PlError::CellLargerThanDomain {
                cell_size,
                size_x: size.x,
                size_y: size.y,
                size_z: size.z,
            });
        }

        let meshes = self.meshes.clone();
        self.worker.start(move || {
            let mut lattice = VoxelLattice::build(center, size, cell_size)?;
            voxelizer::fill_voxels(&mut lattice, &meshes)?;
            Ok(lattice)
        });
        Ok(())
    }

    /// Poll the voxeliser worker.
    pub fn voxelisation_status(&self) -> VoxelStatus {
        self.worker.status()
    }

    /// Collect a finished voxelisation without blocking. A failed job is
    /// logged and discarded; the previous lattice (if any) stays in place.
    fn harvest_lattice(&mut self) {
        if let Some(result) = self.worker.try_harvest() {
            match result {
                Ok(lattice) => {
                    info!(
                        "voxelisation finished: {} x {} x {} cells",
                        lattice.counts.0, lattice.counts.1, lattice.counts.2
                    );
                    self.lattice = Some(lattice);
                }
                Err(e) => warn!("voxelisation failed: {}", e),
            }
        }
    }

    // ========================================================================
    // Simulation
    // ========================================================================

    /// Run the FDTD simulation, injecting at the first registered source
    /// location. Blocks until any in-flight voxelisation completes.
    pub fn simulate(&mut self) -> Result<()> {
        let source = *self.sources.first().ok_or(PlError::NoSourceLocations)?;
        self.simulate_from(source)
    }

    /// Run the FDTD simulation, injecting at the cell containing `position`.
    pub fn simulate_from(&mut self, position: Vec3) -> Result<()> {
        if let Some(result) = self.worker.join() {
            self.lattice = Some(result?);
        }
        let config = self.config()?;
        let lattice = self.lattice.as_mut().ok_or(PlError::LatticeMissing)?;
        let source_cell = lattice.cell_at_position(&position);
        fdtd::simulate(lattice, &config, source_cell, &mut self.grid)
    }

    /// The retained `(cell, time)` history of the last simulation.
    pub fn simulation_grid(&self) -> Option<&SimulationGrid> {
        self.grid.as_ref()
    }

    /// Pressure time series at the cell containing listener `index`; this
    /// is the impulse response captured there by the last simulation.
    pub fn impulse_response(&self, listener_index: usize) -> Result<Array1<f64>> {
        let location = self.listeners.get(listener_index).ok_or(
            PlError::QueryIndexOutOfRange {
                index: listener_index,
                count: self.listeners.len(),
            },
        )?;
        let lattice = self.lattice.as_ref().ok_or(PlError::LatticeMissing)?;
        let grid = self.grid.as_ref().ok_or(PlError::LatticeMissing)?;
        Ok(grid.pressure_history(lattice.cell_at_position(location)))
    }

    // ========================================================================
    // Lattice queries
    // ========================================================================

    /// Number of voxels. Returns 0 (success) while voxelisation is running
    /// or before any lattice exists, so a host render loop can no-op.
    pub fn voxels_count(&mut self) -> Result<usize> {
        self.harvest_lattice();
        Ok(self.lattice.as_ref().map(VoxelLattice::len).unwrap_or(0))
    }

    /// World-space centre of voxel `index`; zero while voxelisation is
    /// running or before any lattice exists.
    pub fn voxel_location(&mut self, index: usize) -> Result<Vec3> {
        self.harvest_lattice();
        match self.lattice.as_ref() {
            None => Ok(Vec3::ZERO),
            Some(lattice) => {
                if index >= lattice.len() {
                    return Err(PlError::QueryIndexOutOfRange {
                        index,
                        count: lattice.len(),
                    });
                }
                Ok(lattice.cells[index].world_pos)
            }
        }
    }

    /// Absorptivity of voxel `index`; zero while voxelisation is running or
    /// before any lattice exists.
    pub fn voxel_absorptivity(&mut self, index: usize) -> Result<f64> {
        self.harvest_lattice();
        match self.lattice.as_ref() {
            None => Ok(0.0),
            Some(lattice) => {
                if index >= lattice.len() {
                    return Err(PlError::QueryIndexOutOfRange {
                        index,
                        count: lattice.len(),
                    });
                }
                Ok(lattice.cells[index].absorptivity)
            }
        }
    }

    /// Direct access to the lattice, if one has been built and collected.
    pub fn lattice(&self) -> Option<&VoxelLattice> {
        self.lattice.as_ref()
    }

    // ========================================================================
    // Public-state serialisation
    // ========================================================================

    /// Export the scene's public state (meshes + location lists).
    pub fn export_state(&self) -> SceneState {
        SceneState {
            meshes: self.meshes.clone(),
            listeners: self.listeners.clone(),
            sources: self.sources.clone(),
        }
    }

    /// Replace the scene's public state with an exported one. The lattice
    /// and grid are untouched; re-voxelise to make them consistent.
    pub fn import_state(&mut self, state: SceneState) -> Result<()> {
        self.ensure_lists_mutable()?;
        self.meshes = state.meshes;
        self.listeners = state.listeners;
        self.sources = state.sources;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::box_mesh;
    use crate::system::System;

    fn scene_with_box(system: &System) -> Scene {
        let mut scene = system.create_scene();
        let (verts, idx) = box_mesh(Vec3::ZERO, Vec3::splat(2.2));
        scene
            .add_mesh(
                Vec3::ZERO,
                Quaternion::IDENTITY,
                Vec3::splat(1.0),
                &verts,
                &idx,
            )
            .unwrap();
        scene
    }

    #[test]
    fn test_mesh_handles_are_sequential() {
        let system = System::default();
        let mut scene = system.create_scene();
        let (verts, idx) = box_mesh(Vec3::ZERO, Vec3::splat(1.0));
        for expected in 0..3 {
            let handle = scene
                .add_mesh(
                    Vec3::ZERO,
                    Quaternion::IDENTITY,
                    Vec3::splat(1.0),
                    &verts,
                    &idx,
                )
                .unwrap();
            assert_eq!(handle, expected);
        }
    }

    #[test]
    fn test_add_then_remove_mesh_roundtrip() {
        let system = System::default();
        let mut scene = system.create_scene();
        let (verts, idx) = box_mesh(Vec3::ZERO, Vec3::splat(1.0));
        let before = scene.export_state();
        let handle = scene
            .add_mesh(
                Vec3::ZERO,
                Quaternion::IDENTITY,
                Vec3::splat(1.0),
                &verts,
                &idx,
            )
            .unwrap();
        scene.remove_mesh(handle).unwrap();
        assert_eq!(scene.export_state(), before);
    }

    #[test]
    fn test_removal_out_of_range_leaves_list_unchanged() {
        let system = System::default();
        let mut scene = system.create_scene();
        let handle = scene.add_listener_location(Vec3::ZERO).unwrap();
        assert_eq!(handle, 0);
        let err = scene.remove_listener_location(1).unwrap_err();
        assert!(matches!(err, PlError::RemovalIndexOutOfRange { index: 1, count: 1 }));
        assert_eq!(scene.listener_count(), 1);
    }

    #[test]
    fn test_voxelise_without_meshes_is_generic_error() {
        let system = System::default();
        let mut scene = system.create_scene();
        let err = scene
            .voxelise(Vec3::ZERO, Vec3::splat(10.0), 1.0)
            .unwrap_err();
        assert!(matches!(err, PlError::NoMeshes));
        assert!(err.is_generic());
    }

    #[test]
    fn test_voxelise_with_oversized_cell_is_invalid_param() {
        let system = System::default();
        let mut scene = scene_with_box(&system);
        let err = scene
            .voxelise(Vec3::ZERO, Vec3::splat(1.0), 2.0)
            .unwrap_err();
        assert!(err.is_invalid_param());
        // No lattice was built.
        assert_eq!(scene.voxels_count().unwrap(), 0);
    }

    #[test]
    fn test_queries_noop_until_worker_finishes_then_report() {
        let system = System::default();
        let mut scene = scene_with_box(&system);
        scene.voxelise(Vec3::ZERO, Vec3::splat(10.0), 1.0).unwrap();

        // While the worker runs the count stays zero; afterwards it is the
        // true cell count. Both may be observed depending on timing.
        loop {
            let status = scene.voxelisation_status();
            let count = scene.voxels_count().unwrap();
            match status {
                VoxelStatus::Ongoing => assert!(count == 0 || count == 1000),
                _ => {
                    if count == 1000 {
                        break;
                    }
                }
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert_eq!(scene.voxels_count().unwrap(), 1000);
    }

    #[test]
    fn test_voxel_queries_after_voxelise() {
        let system = System::default();
        let mut scene = scene_with_box(&system);
        scene.add_source_location(Vec3::ZERO).unwrap();
        scene.voxelise(Vec3::ZERO, Vec3::splat(10.0), 1.0).unwrap();
        // simulate joins the worker, so queries are deterministic after it.
        scene.simulate().unwrap();

        let count = scene.voxels_count().unwrap();
        assert_eq!(count, 1000);
        let lattice = scene.lattice().unwrap();
        let centre = lattice.cells[0].world_pos;
        assert_eq!(scene.voxel_location(0).unwrap(), centre);
        assert!(matches!(
            scene.voxel_location(5000),
            Err(PlError::QueryIndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_list_mutation_rejected_while_voxelising() {
        let system = System::default();
        let mut scene = scene_with_box(&system);
        scene.voxelise(Vec3::ZERO, Vec3::splat(10.0), 0.25).unwrap();
        if scene.voxelisation_status() == VoxelStatus::Ongoing {
            let err = scene.add_listener_location(Vec3::ZERO);
            assert!(matches!(err, Err(PlError::VoxelisationInFlight)) || err.is_ok());
        }
    }

    #[test]
    fn test_scene_state_json_roundtrip() {
        let system = System::default();
        let mut scene = scene_with_box(&system);
        scene.add_listener_location(Vec3::new(1.0, 2.0, 3.0)).unwrap();
        scene.add_source_location(Vec3::new(-1.0, 0.0, 0.5)).unwrap();

        let state = scene.export_state();
        let json = serde_json::to_string(&state).unwrap();
        let restored: SceneState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);

        let mut other = system.create_scene();
        other.import_state(restored).unwrap();
        assert_eq!(other.export_state(), state);
    }

    #[test]
    fn test_simulate_without_sources_is_generic_error() {
        let system = System::default();
        let mut scene = scene_with_box(&system);
        scene.voxelise(Vec3::ZERO, Vec3::splat(10.0), 1.0).unwrap();
        let err = scene.simulate().unwrap_err();
        assert!(matches!(err, PlError::NoSourceLocations));
    }

    #[test]
    fn test_simulate_without_voxelise_is_generic_error() {
        let system = System::default();
        let mut scene = system.create_scene();
        scene.add_source_location(Vec3::ZERO).unwrap();
        let err = scene.simulate().unwrap_err();
        assert!(matches!(err, PlError::LatticeMissing));
    }
}
