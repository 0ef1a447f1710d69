//! OpenPL - Open Propagation Library
//!
//! Wave-based sound propagation for interactive audio. Given triangle
//! meshes in world space and an axis-aligned simulation volume, the library
//! - discretises the volume into a regular voxel lattice,
//! - classifies each voxel as open air or solid wall with an absorption
//!   coefficient (9-sample point-in-mesh majority rule),
//! - runs a time-stepped FDTD simulation of the linearised acoustic wave
//!   equation, retaining the full `(cell, time)` pressure/velocity history
//!   after injecting a Gaussian impulse at a source cell.
//!
//! Voxelisation runs on a single worker thread beside the caller and is
//! polled through the scene facade; the FDTD kernel runs synchronously on
//! the calling thread.
//!
//! # Example
//!
//! ```no_run
//! use openpl::{box_mesh, Quaternion, System, Vec3};
//!
//! let system = System::default();
//! let mut scene = system.create_scene();
//!
//! let (vertices, indices) = box_mesh(Vec3::ZERO, Vec3::splat(2.0));
//! scene
//!     .add_mesh(Vec3::ZERO, Quaternion::IDENTITY, Vec3::splat(1.0), &vertices, &indices)
//!     .unwrap();
//! scene.add_source_location(Vec3::ZERO).unwrap();
//!
//! let cell = system.config().spatial_step();
//! scene.voxelise(Vec3::ZERO, Vec3::splat(10.0), cell).unwrap();
//! scene.simulate().unwrap();
//!
//! let voxels = scene.voxels_count().unwrap();
//! println!("simulated {} voxels", voxels);
//! ```

/// Error types and the crate-wide `Result` alias.
pub mod error;
/// FDTD kernel, derived physical constants and the simulation grid.
pub mod fdtd;
/// C embedding surface: opaque handles and flat result codes.
pub mod ffi;
/// Vectors, quaternions and axis-aligned boxes.
pub mod geometry;
/// The voxel lattice and its index mapping.
pub mod lattice;
/// Mesh ingestion and point-in-mesh queries.
pub mod mesh;
/// The scene facade and its serialisable public state.
pub mod scene;
/// The owning system object.
pub mod system;
/// Mesh rasterisation into the lattice.
pub mod voxelizer;
/// The single-shot asynchronous voxelisation worker.
pub mod worker;

pub use error::{PlError, Result};
pub use fdtd::{
    gaussian_pulse, CellState, FdtdConfig, SimulationGrid, MIN_FREQUENCY, SPEED_OF_SOUND,
};
pub use geometry::{Aabb, Quaternion, Vec3};
pub use lattice::{isotropic_grid_counts, VoxelCell, VoxelLattice};
pub use mesh::{box_mesh, points_in_mesh, MeshMatrix, DEFAULT_ABSORPTIVITY};
pub use scene::{Scene, SceneState};
pub use system::System;
pub use voxelizer::fill_voxels;
pub use worker::{VoxelStatus, VoxelWorker};
