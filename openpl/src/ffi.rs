//! C Foreign Function Interface for the propagation library.
//!
//! This is the embedding surface for game engines: opaque [`System`] and
//! [`Scene`] handles, raw out-pointers, and a flat result code on every
//! call. A host creates a system, creates a scene from it, pushes meshes
//! and listener/source locations, voxelises, simulates, then reads back
//! per-voxel state.
//!
//! # Safety
//!
//! All functions taking raw pointers require valid, non-null pointers
//! (nulls are rejected with `PL_ERR_INVALID_PARAM` rather than dereferenced).
//! Handles must be released with their matching `_release` call, scene
//! before system. Handles are not thread-safe; drive each scene from one
//! thread.

use std::os::raw::c_int;

use crate::error::{PlError, Result};
use crate::geometry::{Quaternion, Vec3};
use crate::scene::Scene;
use crate::system::System;

// ============================================================================
// C-compatible types
// ============================================================================

/// C-compatible 3D vector.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PlVec3 {
    /// X component (metres).
    pub x: f64,
    /// Y component (metres).
    pub y: f64,
    /// Z component (metres).
    pub z: f64,
}

/// C-compatible quaternion.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PlQuaternion {
    /// W component (scalar/real part).
    pub w: f64,
    /// X component (imaginary i).
    pub x: f64,
    /// Y component (imaginary j).
    pub y: f64,
    /// Z component (imaginary k).
    pub z: f64,
}

/// Result code returned by every FFI function.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlResult {
    /// Operation succeeded.
    Ok = 0,
    /// Internal invariant violation or no work possible.
    Err = 1,
    /// Caller-supplied inputs failed validation; fix and retry.
    ErrInvalidParam = 2,
}

impl From<&PlError> for PlResult {
    fn from(e: &PlError) -> Self {
        if e.is_invalid_param() {
            PlResult::ErrInvalidParam
        } else {
            PlResult::Err
        }
    }
}

fn fold<T>(result: Result<T>) -> PlResult {
    match result {
        Ok(_) => PlResult::Ok,
        Err(e) => PlResult::from(&e),
    }
}

impl PlVec3 {
    fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    fn from_vec3(v: Vec3) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

impl PlQuaternion {
    fn to_quaternion(self) -> Quaternion {
        Quaternion::new(self.w, self.x, self.y, self.z)
    }
}

// ============================================================================
// System lifecycle
// ============================================================================

/// Create a library system with default simulation settings.
/// Returns an opaque pointer; free it with [`pl_system_release`].
#[no_mangle]
pub extern "C" fn pl_system_create() -> *mut System {
    Box::into_raw(Box::new(System::default()))
}

/// Release a system created by [`pl_system_create`].
///
/// # Safety
/// `system` must be a pointer from `pl_system_create`, not yet released.
#[no_mangle]
pub unsafe extern "C" fn pl_system_release(system: *mut System) -> PlResult {
    if system.is_null() {
        return PlResult::ErrInvalidParam;
    }
    drop(Box::from_raw(system));
    PlResult::Ok
}

// ============================================================================
// Scene lifecycle
// ============================================================================

/// Create a scene owned by `system`; the handle lands in `out_scene`.
///
/// # Safety
/// `system` must be a live system handle and `out_scene` a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn pl_scene_create(
    system: *const System,
    out_scene: *mut *mut Scene,
) -> PlResult {
    let system = match system.as_ref() {
        Some(s) => s,
        None => return PlResult::ErrInvalidParam,
    };
    if out_scene.is_null() {
        return PlResult::ErrInvalidParam;
    }
    *out_scene = Box::into_raw(Box::new(system.create_scene()));
    PlResult::Ok
}

/// Release a scene created by [`pl_scene_create`]. Joins any in-flight
/// voxelisation.
///
/// # Safety
/// `scene` must be a pointer from `pl_scene_create`, not yet released.
#[no_mangle]
pub unsafe extern "C" fn pl_scene_release(scene: *mut Scene) -> PlResult {
    if scene.is_null() {
        return PlResult::ErrInvalidParam;
    }
    drop(Box::from_raw(scene));
    PlResult::Ok
}

// ============================================================================
// Mesh and location lists
// ============================================================================

/// Ingest a game mesh under a world transform; the stable mesh index lands
/// in `out_index`.
///
/// # Safety
/// `scene` must be a live scene handle; `vertices` must point at
/// `vertices_len` vectors and `indices` at `indices_len` ints;
/// `out_index` must be valid.
#[no_mangle]
pub unsafe extern "C" fn pl_scene_add_mesh(
    scene: *mut Scene,
    position: PlVec3,
    rotation: PlQuaternion,
    scale: PlVec3,
    vertices: *const PlVec3,
    vertices_len: c_int,
    indices: *const c_int,
    indices_len: c_int,
    out_index: *mut c_int,
) -> PlResult {
    let scene = match scene.as_mut() {
        Some(s) => s,
        None => return PlResult::ErrInvalidParam,
    };
    if vertices.is_null() || indices.is_null() || out_index.is_null() {
        return PlResult::ErrInvalidParam;
    }
    if vertices_len < 0 || indices_len < 0 {
        return PlResult::ErrInvalidParam;
    }

    let raw_vertices = std::slice::from_raw_parts(vertices, vertices_len as usize);
    let raw_indices = std::slice::from_raw_parts(indices, indices_len as usize);

    let verts: Vec<Vec3> = raw_vertices.iter().map(|v| v.to_vec3()).collect();
    let mut idx = Vec::with_capacity(raw_indices.len());
    for &i in raw_indices {
        if i < 0 {
            return PlResult::ErrInvalidParam;
        }
        idx.push(i as u32);
    }

    match scene.add_mesh(
        position.to_vec3(),
        rotation.to_quaternion(),
        scale.to_vec3(),
        &verts,
        &idx,
    ) {
        Ok(index) => {
            *out_index = index as c_int;
            PlResult::Ok
        }
        Err(e) => PlResult::from(&e),
    }
}

/// Remove the mesh at `index`; later mesh indices shift down by one.
///
/// # Safety
/// `scene` must be a live scene handle.
#[no_mangle]
pub unsafe extern "C" fn pl_scene_remove_mesh(scene: *mut Scene, index: c_int) -> PlResult {
    let scene = match scene.as_mut() {
        Some(s) => s,
        None => return PlResult::ErrInvalidParam,
    };
    if index < 0 {
        return PlResult::Err;
    }
    fold(scene.remove_mesh(index as usize))
}

/// Register a listener location; its stable index lands in `out_index`.
///
/// # Safety
/// `scene` must be a live scene handle and `out_index` valid.
#[no_mangle]
pub unsafe extern "C" fn pl_scene_add_listener(
    scene: *mut Scene,
    location: PlVec3,
    out_index: *mut c_int,
) -> PlResult {
    let scene = match scene.as_mut() {
        Some(s) => s,
        None => return PlResult::ErrInvalidParam,
    };
    if out_index.is_null() {
        return PlResult::ErrInvalidParam;
    }
    match scene.add_listener_location(location.to_vec3()) {
        Ok(index) => {
            *out_index = index as c_int;
            PlResult::Ok
        }
        Err(e) => PlResult::from(&e),
    }
}

/// Remove the listener location at `index`.
///
/// # Safety
/// `scene` must be a live scene handle.
#[no_mangle]
pub unsafe extern "C" fn pl_scene_remove_listener(scene: *mut Scene, index: c_int) -> PlResult {
    let scene = match scene.as_mut() {
        Some(s) => s,
        None => return PlResult::ErrInvalidParam,
    };
    if index < 0 {
        return PlResult::Err;
    }
    fold(scene.remove_listener_location(index as usize))
}

/// Register a source location; its stable index lands in `out_index`.
///
/// # Safety
/// `scene` must be a live scene handle and `out_index` valid.
#[no_mangle]
pub unsafe extern "C" fn pl_scene_add_source(
    scene: *mut Scene,
    location: PlVec3,
    out_index: *mut c_int,
) -> PlResult {
    let scene = match scene.as_mut() {
        Some(s) => s,
        None => return PlResult::ErrInvalidParam,
    };
    if out_index.is_null() {
        return PlResult::ErrInvalidParam;
    }
    match scene.add_source_location(location.to_vec3()) {
        Ok(index) => {
            *out_index = index as c_int;
            PlResult::Ok
        }
        Err(e) => PlResult::from(&e),
    }
}

/// Remove the source location at `index`.
///
/// # Safety
/// `scene` must be a live scene handle.
#[no_mangle]
pub unsafe extern "C" fn pl_scene_remove_source(scene: *mut Scene, index: c_int) -> PlResult {
    let scene = match scene.as_mut() {
        Some(s) => s,
        None => return PlResult::ErrInvalidParam,
    };
    if index < 0 {
        return PlResult::Err;
    }
    fold(scene.remove_source_location(index as usize))
}

// ============================================================================
// Voxelisation and simulation
// ============================================================================

/// Kick off asynchronous voxelisation of the volume centred on `center`
/// with extent `size` and cubic cells of edge `cell_size`.
///
/// # Safety
/// `scene` must be a live scene handle.
#[no_mangle]
pub unsafe extern "C" fn pl_scene_voxelise(
    scene: *mut Scene,
    center: PlVec3,
    size: PlVec3,
    cell_size: f64,
) -> PlResult {
    let scene = match scene.as_mut() {
        Some(s) => s,
        None => return PlResult::ErrInvalidParam,
    };
    fold(scene.voxelise(center.to_vec3(), size.to_vec3(), cell_size))
}

/// Run the FDTD simulation from the first registered source location.
/// Blocks until any in-flight voxelisation completes.
///
/// # Safety
/// `scene` must be a live scene handle.
#[no_mangle]
pub unsafe extern "C" fn pl_scene_simulate(scene: *mut Scene) -> PlResult {
    let scene = match scene.as_mut() {
        Some(s) => s as *mut Scene,
        None => return PlResult::ErrInvalidParam,
    };
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        (*scene).simulate()
    }));
    match outcome {
        Ok(result) => fold(result),
        Err(_) => PlResult::Err,
    }
}

// ============================================================================
// Voxel queries
// ============================================================================

/// Number of voxels in the lattice; zero while voxelisation is running or
/// before any lattice exists.
///
/// # Safety
/// `scene` must be a live scene handle and `out_count` valid.
#[no_mangle]
pub unsafe extern "C" fn pl_scene_voxel_count(
    scene: *mut Scene,
    out_count: *mut c_int,
) -> PlResult {
    let scene = match scene.as_mut() {
        Some(s) => s,
        None => return PlResult::ErrInvalidParam,
    };
    if out_count.is_null() {
        return PlResult::ErrInvalidParam;
    }
    match scene.voxels_count() {
        Ok(count) => {
            *out_count = count as c_int;
            PlResult::Ok
        }
        Err(e) => PlResult::from(&e),
    }
}

/// World-space centre of voxel `index`; zero while voxelisation is running.
///
/// # Safety
/// `scene` must be a live scene handle and `out_location` valid.
#[no_mangle]
pub unsafe extern "C" fn pl_scene_voxel_location(
    scene: *mut Scene,
    index: c_int,
    out_location: *mut PlVec3,
) -> PlResult {
    let scene = match scene.as_mut() {
        Some(s) => s,
        None => return PlResult::ErrInvalidParam,
    };
    if out_location.is_null() || index < 0 {
        return PlResult::ErrInvalidParam;
    }
    match scene.voxel_location(index as usize) {
        Ok(location) => {
            *out_location = PlVec3::from_vec3(location);
            PlResult::Ok
        }
        Err(e) => PlResult::from(&e),
    }
}

/// Wall absorptivity of voxel `index`; zero while voxelisation is running
/// and for air cells.
///
/// # Safety
/// `scene` must be a live scene handle and `out_absorptivity` valid.
#[no_mangle]
pub unsafe extern "C" fn pl_scene_voxel_absorptivity(
    scene: *mut Scene,
    index: c_int,
    out_absorptivity: *mut f64,
) -> PlResult {
    let scene = match scene.as_mut() {
        Some(s) => s,
        None => return PlResult::ErrInvalidParam,
    };
    if out_absorptivity.is_null() || index < 0 {
        return PlResult::ErrInvalidParam;
    }
    match scene.voxel_absorptivity(index as usize) {
        Ok(absorptivity) => {
            *out_absorptivity = absorptivity;
            PlResult::Ok
        }
        Err(e) => PlResult::from(&e),
    }
}
