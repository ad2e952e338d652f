//! Indexed triangle meshes retained on the CPU.
//!
//! Models keep their vertex and index arrays for the whole scene load cycle:
//! the GPU assembly concatenates them into device buffers and the probe
//! baker extracts packed triangle lists from them.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

/// One mesh vertex, padded to 64 bytes for direct upload.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    /// Material-section index within the owning model.
    pub material_index: u32,
    pub normal: Vec3,
    pub _pad0: f32,
    pub tangent: Vec4,
    pub uv: Vec2,
    pub _pad1: Vec2,
}

impl Vertex {
    #[must_use]
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2, material_index: u32) -> Self {
        Self {
            position,
            material_index,
            normal,
            _pad0: 0.0,
            tangent: Vec4::new(1.0, 0.0, 0.0, 1.0),
            uv,
            _pad1: Vec2::ZERO,
        }
    }
}

/// An indexed triangle mesh with a tight local AABB and the material ids of
/// its sections.
#[derive(Clone, Debug)]
pub struct Model {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    aabb_min: Vec3,
    aabb_max: Vec3,
    /// Material id per section; `Vertex::material_index` indexes into this.
    section_materials: Vec<u32>,
}

impl Model {
    /// Builds a model, computing the AABB from the supplied vertices.
    /// Indices referencing past the vertex array are clamped out.
    #[must_use]
    pub fn new(vertices: Vec<Vertex>, mut indices: Vec<u32>, section_materials: Vec<u32>) -> Self {
        let limit = vertices.len() as u32;
        let before = indices.len();
        indices.retain(|&i| i < limit);
        if indices.len() != before {
            log::warn!(
                "model dropped {} out-of-range indices",
                before - indices.len()
            );
        }

        let mut aabb_min = Vec3::splat(f32::INFINITY);
        let mut aabb_max = Vec3::splat(f32::NEG_INFINITY);
        for v in &vertices {
            aabb_min = aabb_min.min(v.position);
            aabb_max = aabb_max.max(v.position);
        }
        if vertices.is_empty() {
            aabb_min = Vec3::ZERO;
            aabb_max = Vec3::ZERO;
        }

        Self {
            vertices,
            indices,
            aabb_min,
            aabb_max,
            section_materials,
        }
    }

    #[must_use]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[must_use]
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    #[must_use]
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    #[must_use]
    pub fn aabb(&self) -> (Vec3, Vec3) {
        (self.aabb_min, self.aabb_max)
    }

    #[must_use]
    pub fn section_materials(&self) -> &[u32] {
        &self.section_materials
    }

    #[must_use]
    pub fn section_count(&self) -> usize {
        self.section_materials.len()
    }

    /// Accumulates per-triangle tangents into the vertex array. Called once
    /// on load for meshes whose source lacked TANGENT data.
    pub fn generate_tangents(&mut self) {
        let mut accumulated = vec![Vec3::ZERO; self.vertices.len()];

        for tri in self.indices.chunks_exact(3) {
            let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let (v0, v1, v2) = (&self.vertices[i0], &self.vertices[i1], &self.vertices[i2]);

            let edge1 = v1.position - v0.position;
            let edge2 = v2.position - v0.position;
            let duv1 = v1.uv - v0.uv;
            let duv2 = v2.uv - v0.uv;

            let det = duv1.x * duv2.y - duv2.x * duv1.y;
            let tangent = if det.abs() > 1e-8 {
                (edge1 * duv2.y - edge2 * duv1.y) / det
            } else {
                edge1
            };

            for &i in &[i0, i1, i2] {
                accumulated[i] += tangent;
            }
        }

        for (vertex, tangent) in self.vertices.iter_mut().zip(accumulated) {
            let t = tangent - vertex.normal * vertex.normal.dot(tangent);
            let t = if t.length_squared() > 1e-12 {
                t.normalize()
            } else {
                vertex.normal.any_orthonormal_vector()
            };
            vertex.tangent = t.extend(1.0);
        }
    }

    /// Axis-aligned box spanning `p0..p1`, one material section.
    #[must_use]
    pub fn create_box(p0: Vec3, p1: Vec3, material_id: u32) -> Self {
        let min = p0.min(p1);
        let max = p0.max(p1);

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        // (normal, four corners counter-clockwise seen from outside)
        let faces: [(Vec3, [Vec3; 4]); 6] = [
            (
                Vec3::NEG_X,
                [
                    Vec3::new(min.x, min.y, min.z),
                    Vec3::new(min.x, min.y, max.z),
                    Vec3::new(min.x, max.y, max.z),
                    Vec3::new(min.x, max.y, min.z),
                ],
            ),
            (
                Vec3::X,
                [
                    Vec3::new(max.x, min.y, max.z),
                    Vec3::new(max.x, min.y, min.z),
                    Vec3::new(max.x, max.y, min.z),
                    Vec3::new(max.x, max.y, max.z),
                ],
            ),
            (
                Vec3::NEG_Y,
                [
                    Vec3::new(min.x, min.y, min.z),
                    Vec3::new(max.x, min.y, min.z),
                    Vec3::new(max.x, min.y, max.z),
                    Vec3::new(min.x, min.y, max.z),
                ],
            ),
            (
                Vec3::Y,
                [
                    Vec3::new(min.x, max.y, max.z),
                    Vec3::new(max.x, max.y, max.z),
                    Vec3::new(max.x, max.y, min.z),
                    Vec3::new(min.x, max.y, min.z),
                ],
            ),
            (
                Vec3::NEG_Z,
                [
                    Vec3::new(max.x, min.y, min.z),
                    Vec3::new(min.x, min.y, min.z),
                    Vec3::new(min.x, max.y, min.z),
                    Vec3::new(max.x, max.y, min.z),
                ],
            ),
            (
                Vec3::Z,
                [
                    Vec3::new(min.x, min.y, max.z),
                    Vec3::new(max.x, min.y, max.z),
                    Vec3::new(max.x, max.y, max.z),
                    Vec3::new(min.x, max.y, max.z),
                ],
            ),
        ];

        let uvs = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];

        for (normal, corners) in faces {
            let base = vertices.len() as u32;
            for (corner, uv) in corners.into_iter().zip(uvs) {
                vertices.push(Vertex::new(corner, normal, uv, 0));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self::new(vertices, indices, vec![material_id])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_aabb_is_tight() {
        let model = Model::create_box(Vec3::new(-1.0, 0.0, -2.0), Vec3::new(1.0, 3.0, 2.0), 0);
        let (min, max) = model.aabb();
        assert_eq!(min, Vec3::new(-1.0, 0.0, -2.0));
        assert_eq!(max, Vec3::new(1.0, 3.0, 2.0));
        assert_eq!(model.index_count(), 36);
        assert_eq!(model.vertex_count(), 24);
    }

    #[test]
    fn out_of_range_indices_are_dropped() {
        let vertices = vec![
            Vertex::new(Vec3::ZERO, Vec3::Y, Vec2::ZERO, 0),
            Vertex::new(Vec3::X, Vec3::Y, Vec2::ZERO, 0),
            Vertex::new(Vec3::Z, Vec3::Y, Vec2::ZERO, 0),
        ];
        let model = Model::new(vertices, vec![0, 1, 2, 0, 1, 9], vec![0]);
        assert_eq!(model.indices(), &[0, 1, 2, 0, 1]);
    }

    #[test]
    fn tangents_are_orthogonal_to_normals() {
        let mut model = Model::create_box(Vec3::ZERO, Vec3::ONE, 0);
        model.generate_tangents();
        for v in model.vertices() {
            assert!(v.normal.dot(v.tangent.truncate()).abs() < 1e-4);
            assert!((v.tangent.truncate().length() - 1.0).abs() < 1e-4);
        }
    }
}
