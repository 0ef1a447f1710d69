//! Error types for the openpl crate.
//!
//! This module provides a unified error type for all propagation-library
//! operations. Every fallible operation validates its inputs up front and
//! leaves state unchanged on failure; diagnostics go through the `log`
//! facade, never through the error value itself.

use thiserror::Error;

/// Error type for openpl operations.
///
/// Two broad classes surface through the API: parameter-validation failures
/// the caller can fix and retry, and internal/no-work-possible failures that
/// are not retryable without changing scene state. [`PlError::is_invalid_param`]
/// distinguishes the two; the FFI layer folds them into result codes.
#[derive(Debug, Error)]
pub enum PlError {
    /// A mesh was supplied with fewer than 4 vertices.
    #[error("can't create geometry from a mesh with only {vertex_count} vertices")]
    MeshTooSmall {
        /// Number of vertices supplied.
        vertex_count: usize,
    },

    /// A mesh index stream was too short or not a multiple of 3.
    #[error("can't create mesh: {index_count} indices is not a valid triangle stream")]
    InvalidIndexStream {
        /// Number of indices supplied.
        index_count: usize,
    },

    /// A triangle index referenced a vertex that does not exist.
    #[error("triangle index {index} out of range for {vertex_count} vertices")]
    VertexIndexOutOfRange {
        /// The offending vertex index.
        index: usize,
        /// Number of vertices in the mesh.
        vertex_count: usize,
    },

    /// A mesh material absorptivity was outside the valid range.
    #[error("mesh absorptivity {value} outside (0, 1]")]
    InvalidAbsorptivity {
        /// The offending absorptivity value.
        value: f64,
    },

    /// The requested cell size does not fit inside the simulation volume.
    #[error("no voxels of edge {cell_size} fit inside a volume of {size_x} x {size_y} x {size_z}")]
    CellLargerThanDomain {
        /// Requested cell edge length in metres.
        cell_size: f64,
        /// Domain extent along x.
        size_x: f64,
        /// Domain extent along y.
        size_y: f64,
        /// Domain extent along z.
        size_z: f64,
    },

    /// A voxel query used an index past the end of the lattice.
    #[error("voxel query index {index} out of range for {count} cells")]
    QueryIndexOutOfRange {
        /// The offending cell index.
        index: usize,
        /// Number of cells in the lattice.
        count: usize,
    },

    /// Voxelisation was requested with no meshes registered.
    #[error("no meshes registered; voxelisation has nothing to rasterise")]
    NoMeshes,

    /// Lattice construction produced a zero cell count along some axis.
    #[error("degenerate lattice: axis counts {x} x {y} x {z}")]
    DegenerateLattice {
        /// Cell count along x.
        x: usize,
        /// Cell count along y.
        y: usize,
        /// Cell count along z.
        z: usize,
    },

    /// A list removal used an index past the end of the list.
    #[error("removal index {index} out of range for list of {count}")]
    RemovalIndexOutOfRange {
        /// The offending list index.
        index: usize,
        /// Length of the list.
        count: usize,
    },

    /// Simulation was requested with no source locations registered.
    #[error("no source locations registered; nowhere to inject the impulse")]
    NoSourceLocations,

    /// Simulation was requested before any successful voxelisation.
    #[error("no voxel lattice available; run voxelisation first")]
    LatticeMissing,

    /// A list mutation arrived while the voxeliser worker was running.
    #[error("scene lists can't be mutated while voxelisation is in flight")]
    VoxelisationInFlight,

    /// The owning system was released while a scene still referenced it.
    #[error("owning system was released before the scene")]
    SystemReleased,
}

/// Result type alias for openpl operations.
pub type Result<T> = std::result::Result<T, PlError>;

impl PlError {
    /// Returns true if the caller supplied invalid inputs and can fix and retry.
    pub fn is_invalid_param(&self) -> bool {
        matches!(
            self,
            PlError::MeshTooSmall { .. }
                | PlError::InvalidIndexStream { .. }
                | PlError::VertexIndexOutOfRange { .. }
                | PlError::InvalidAbsorptivity { .. }
                | PlError::CellLargerThanDomain { .. }
                | PlError::QueryIndexOutOfRange { .. }
        )
    }

    /// Returns true if this is an internal invariant violation or a
    /// no-work-possible state, not retryable without changing scene state.
    pub fn is_generic(&self) -> bool {
        !self.is_invalid_param()
    }
}
