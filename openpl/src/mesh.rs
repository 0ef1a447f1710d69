//! Triangle mesh ingestion and point-in-mesh queries.
//!
//! Meshes arrive from the host engine as raw vertex/index streams with a
//! world transform and are stored as dense matrices: a `(3, Nv)` vertex
//! matrix (column `i` holds vertex `i`) and a `(3, Nt)` index matrix
//! (column `j` holds the three vertex indices of triangle `j`,
//! counter-clockwise seen from outside).
//!
//! The voxeliser consumes two primitives defined here: the mesh bounding box
//! and a robust "which of these query points lies inside this closed mesh"
//! test based on ray-crossing parity.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{PlError, Result};
use crate::geometry::{Aabb, Quaternion, Vec3};

/// Default wall absorption coefficient assigned to cells claimed by a mesh
/// that carries no explicit material.
pub const DEFAULT_ABSORPTIVITY: f64 = 0.75;

/// A world-space triangle mesh in dense matrix form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshMatrix {
    /// Vertex positions, shape `(3, Nv)`; column `i` is vertex `i`'s xyz.
    pub vertices: Array2<f64>,
    /// Triangle indices, shape `(3, Nt)`; column `j` is triangle `j`.
    pub indices: Array2<usize>,
    /// Wall absorption coefficient applied to cells this mesh claims,
    /// in `(0, 1]`.
    pub absorptivity: f64,
}

impl MeshMatrix {
    /// Ingest a raw engine mesh under a world transform.
    ///
    /// The transform reproduces the post-multiplied call sequence
    /// `scale(S); rotate(Q); translate(P)`, which composes to
    /// `M = scale * rotate * translate`: each local vertex is translated
    /// first, then rotated, then scaled, and the result lands in the vertex
    /// matrix. The index stream is copied verbatim into the `(3, Ni/3)`
    /// index matrix.
    ///
    /// # Arguments
    /// * `position` - world-space translation `P`
    /// * `rotation` - world-space rotation `Q` (normalised)
    /// * `scale` - world-space per-axis scale `S`
    /// * `vertices` - local-space vertex positions, at least 4
    /// * `indices` - triangle index stream, at least 4 entries, multiple of 3
    pub fn from_world_mesh(
        position: Vec3,
        rotation: Quaternion,
        scale: Vec3,
        vertices: &[Vec3],
        indices: &[u32],
    ) -> Result<Self> {
        if vertices.len() < 4 {
            return Err(PlError::MeshTooSmall {
                vertex_count: vertices.len(),
            });
        }
        if indices.len() < 4 || indices.len() % 3 != 0 {
            return Err(PlError::InvalidIndexStream {
                index_count: indices.len(),
            });
        }
        for &i in indices {
            if i as usize >= vertices.len() {
                return Err(PlError::VertexIndexOutOfRange {
                    index: i as usize,
                    vertex_count: vertices.len(),
                });
            }
        }

        let nv = vertices.len();
        let mut v = Array2::<f64>::zeros((3, nv));
        for (col, vert) in vertices.iter().enumerate() {
            let world = rotation.rotate_vec(*vert + position).scale_by(&scale);
            v[[0, col]] = world.x;
            v[[1, col]] = world.y;
            v[[2, col]] = world.z;
        }

        let nt = indices.len() / 3;
        let mut idx = Array2::<usize>::zeros((3, nt));
        for t in 0..nt {
            idx[[0, t]] = indices[3 * t] as usize;
            idx[[1, t]] = indices[3 * t + 1] as usize;
            idx[[2, t]] = indices[3 * t + 2] as usize;
        }

        Ok(Self {
            vertices: v,
            indices: idx,
            absorptivity: DEFAULT_ABSORPTIVITY,
        })
    }

    /// Attach a wall material absorption coefficient, replacing the default.
    pub fn with_absorptivity(mut self, absorptivity: f64) -> Result<Self> {
        if !(absorptivity > 0.0 && absorptivity <= 1.0) {
            return Err(PlError::InvalidAbsorptivity {
                value: absorptivity,
            });
        }
        self.absorptivity = absorptivity;
        Ok(self)
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.ncols()
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.ncols()
    }

    /// Bounding box from the per-row min/max of the vertex matrix.
    pub fn aabb(&self) -> Aabb {
        let mut min = Vec3::splat(f64::INFINITY);
        let mut max = Vec3::splat(f64::NEG_INFINITY);
        for col in 0..self.vertices.ncols() {
            let x = self.vertices[[0, col]];
            let y = self.vertices[[1, col]];
            let z = self.vertices[[2, col]];
            min.x = min.x.min(x);
            min.y = min.y.min(y);
            min.z = min.z.min(z);
            max.x = max.x.max(x);
            max.y = max.y.max(y);
            max.z = max.z.max(z);
        }
        Aabb::new(min, max)
    }

    /// Test a batch of query points against this mesh.
    ///
    /// See [`points_in_mesh`] for the contract.
    pub fn contains_points(&self, queries: &Array2<f64>) -> Array1<u8> {
        points_in_mesh(&self.vertices, &self.indices, queries)
    }
}

/// Classify which query points lie inside a closed triangle mesh.
///
/// Takes `V (3, Nv)`, `I (3, Nt)` and `Q (3, Nq)` and returns an `Nq`-length
/// 0/1 vector. Each point casts a ray along +z and counts triangle
/// crossings; odd parity means inside. A tiny xy perturbation keeps the ray
/// off shared edges and vertices, where a crossing would otherwise be
/// double-counted. The mesh is treated as closed; small defects in
/// watertightness are tolerated by the parity rule.
pub fn points_in_mesh(
    vertices: &Array2<f64>,
    indices: &Array2<usize>,
    queries: &Array2<f64>,
) -> Array1<u8> {
    let nq = queries.ncols();
    let mut inside = Array1::<u8>::zeros(nq);

    for q in 0..nq {
        // Perturb xy to avoid hitting shared edges/vertices exactly.
        let origin = [
            queries[[0, q]] + 1.23e-10,
            queries[[1, q]] + 2.34e-10,
            queries[[2, q]],
        ];

        let mut crossings = 0u32;
        for t in 0..indices.ncols() {
            let i0 = indices[[0, t]];
            let i1 = indices[[1, t]];
            let i2 = indices[[2, t]];
            let v0 = [
                vertices[[0, i0]],
                vertices[[1, i0]],
                vertices[[2, i0]],
            ];
            let v1 = [
                vertices[[0, i1]],
                vertices[[1, i1]],
                vertices[[2, i1]],
            ];
            let v2 = [
                vertices[[0, i2]],
                vertices[[1, i2]],
                vertices[[2, i2]],
            ];
            if ray_triangle_z(&origin, &v0, &v1, &v2).is_some() {
                crossings += 1;
            }
        }

        inside[q] = (crossings % 2 == 1) as u8;
    }

    inside
}

/// Moller-Trumbore ray-triangle intersection for a ray along +z.
///
/// Returns `Some(t)` if the ray from `origin` in direction `[0, 0, 1]`
/// intersects the triangle at parameter `t > 0`.
fn ray_triangle_z(origin: &[f64; 3], v0: &[f64; 3], v1: &[f64; 3], v2: &[f64; 3]) -> Option<f64> {
    let e1 = [v1[0] - v0[0], v1[1] - v0[1], v1[2] - v0[2]];
    let e2 = [v2[0] - v0[0], v2[1] - v0[1], v2[2] - v0[2]];

    // P = D x E2 with D = [0, 0, 1]
    let px = -e2[1];
    let py = e2[0];

    let det = e1[0] * px + e1[1] * py;
    if det.abs() < 1e-12 {
        return None; // ray parallel to triangle
    }
    let inv_det = 1.0 / det;

    let tx = origin[0] - v0[0];
    let ty = origin[1] - v0[1];
    let tz = origin[2] - v0[2];

    let u = (tx * px + ty * py) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    // Q = T x E1; D . Q is just the z component
    let qx = ty * e1[2] - tz * e1[1];
    let qy = tz * e1[0] - tx * e1[2];
    let qz = tx * e1[1] - ty * e1[0];

    let v = qz * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = (e2[0] * qx + e2[1] * qy + e2[2] * qz) * inv_det;
    if t > 0.0 {
        Some(t)
    } else {
        None
    }
}

/// Build an axis-aligned closed box mesh spanning `center +- half`.
///
/// 8 vertices, 12 triangles, wound counter-clockwise seen from outside.
/// Used by tests and the demo binary as the canonical room/obstacle shape.
pub fn box_mesh(center: Vec3, half: Vec3) -> (Vec<Vec3>, Vec<u32>) {
    let c = center;
    let h = half;
    let vertices = vec![
        Vec3::new(c.x - h.x, c.y - h.y, c.z - h.z), // 0
        Vec3::new(c.x + h.x, c.y - h.y, c.z - h.z), // 1
        Vec3::new(c.x + h.x, c.y + h.y, c.z - h.z), // 2
        Vec3::new(c.x - h.x, c.y + h.y, c.z - h.z), // 3
        Vec3::new(c.x - h.x, c.y - h.y, c.z + h.z), // 4
        Vec3::new(c.x + h.x, c.y - h.y, c.z + h.z), // 5
        Vec3::new(c.x + h.x, c.y + h.y, c.z + h.z), // 6
        Vec3::new(c.x - h.x, c.y + h.y, c.z + h.z), // 7
    ];
    let indices = vec![
        0, 2, 1, 0, 3, 2, // bottom (z-)
        4, 5, 6, 4, 6, 7, // top (z+)
        0, 1, 5, 0, 5, 4, // front (y-)
        2, 3, 7, 2, 7, 6, // back (y+)
        0, 4, 7, 0, 7, 3, // left (x-)
        1, 2, 6, 1, 6, 5, // right (x+)
    ];
    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> MeshMatrix {
        let (verts, idx) = box_mesh(Vec3::ZERO, Vec3::splat(0.5));
        MeshMatrix::from_world_mesh(
            Vec3::ZERO,
            Quaternion::IDENTITY,
            Vec3::splat(1.0),
            &verts,
            &idx,
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_too_few_vertices() {
        let verts = vec![Vec3::ZERO, Vec3::splat(1.0), Vec3::new(1.0, 0.0, 0.0)];
        let idx = vec![0, 1, 2, 0, 2, 1];
        let err = MeshMatrix::from_world_mesh(
            Vec3::ZERO,
            Quaternion::IDENTITY,
            Vec3::splat(1.0),
            &verts,
            &idx,
        )
        .unwrap_err();
        assert!(matches!(err, PlError::MeshTooSmall { vertex_count: 3 }));
    }

    #[test]
    fn test_rejects_non_triangle_index_stream() {
        let (verts, _) = box_mesh(Vec3::ZERO, Vec3::splat(0.5));
        let err = MeshMatrix::from_world_mesh(
            Vec3::ZERO,
            Quaternion::IDENTITY,
            Vec3::splat(1.0),
            &verts,
            &[0, 1, 2, 3, 4],
        )
        .unwrap_err();
        assert!(matches!(err, PlError::InvalidIndexStream { index_count: 5 }));
    }

    #[test]
    fn test_rejects_out_of_range_index() {
        let (verts, _) = box_mesh(Vec3::ZERO, Vec3::splat(0.5));
        let err = MeshMatrix::from_world_mesh(
            Vec3::ZERO,
            Quaternion::IDENTITY,
            Vec3::splat(1.0),
            &verts,
            &[0, 1, 99, 0, 1, 2],
        )
        .unwrap_err();
        assert!(matches!(err, PlError::VertexIndexOutOfRange { index: 99, .. }));
    }

    #[test]
    fn test_transform_translate_then_rotate_then_scale() {
        let (verts, idx) = box_mesh(Vec3::ZERO, Vec3::splat(0.5));
        // 90 degrees about +z; scale 2 along x; translate +10 along y.
        let half = std::f64::consts::FRAC_PI_4;
        let q = Quaternion::new(half.cos(), 0.0, 0.0, half.sin());
        let mesh = MeshMatrix::from_world_mesh(
            Vec3::new(0.0, 10.0, 0.0),
            q,
            Vec3::new(2.0, 1.0, 1.0),
            &verts,
            &idx,
        )
        .unwrap();
        // Local (0.5, -0.5, -0.5) -> translated (0.5, 9.5, -0.5) ->
        // rotated (-9.5, 0.5, -0.5) -> scaled (-19, 0.5, -0.5). Vertex 1.
        assert!((mesh.vertices[[0, 1]] + 19.0).abs() < 1e-12);
        assert!((mesh.vertices[[1, 1]] - 0.5).abs() < 1e-12);
        assert!((mesh.vertices[[2, 1]] + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_aabb_of_unit_box() {
        let mesh = unit_box();
        let bb = mesh.aabb();
        assert_eq!(bb.min, Vec3::splat(-0.5));
        assert_eq!(bb.max, Vec3::splat(0.5));
    }

    #[test]
    fn test_points_in_mesh_parity() {
        let mesh = unit_box();
        let mut queries = Array2::<f64>::zeros((3, 4));
        // inside
        queries[[0, 0]] = 0.0;
        queries[[1, 0]] = 0.0;
        queries[[2, 0]] = 0.0;
        // inside, off-centre
        queries[[0, 1]] = 0.3;
        queries[[1, 1]] = -0.2;
        queries[[2, 1]] = 0.1;
        // outside, beside the box
        queries[[0, 2]] = 0.9;
        queries[[1, 2]] = 0.0;
        queries[[2, 2]] = 0.0;
        // outside, above the box (ray exits without crossing)
        queries[[0, 3]] = 0.0;
        queries[[1, 3]] = 0.0;
        queries[[2, 3]] = 0.9;
        let inside = mesh.contains_points(&queries);
        assert_eq!(inside.to_vec(), vec![1, 1, 0, 0]);
    }

    #[test]
    fn test_absorptivity_validation() {
        let mesh = unit_box();
        assert!(mesh.clone().with_absorptivity(0.4).is_ok());
        assert!(matches!(
            mesh.clone().with_absorptivity(0.0),
            Err(PlError::InvalidAbsorptivity { .. })
        ));
        assert!(matches!(
            mesh.with_absorptivity(1.5),
            Err(PlError::InvalidAbsorptivity { .. })
        ));
    }
}
