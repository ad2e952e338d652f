//! Bounding-volume hierarchies for the CPU ray path.
//!
//! Two levels, mirroring the GPU acceleration-structure split: a [`Bvh`]
//! built per model over packed triangles (BLAS) and a second [`Bvh`] built
//! over instance bounds (TLAS). Traversal is an explicit-stack walk over a
//! flat node array; leaves intersect with Möller–Trumbore.
//!
//! Instance records store the *transposed* (row-major) world transform.
//! Ray queries transform face normals object→world by multiplying
//! `vec4(n, 0) * M` against that matrix; revisit this convention if the
//! module is ever replaced by an external BVH crate.

use glam::{Mat4, Vec3, Vec4};

const LEAF_SIZE: usize = 4;
const TRI_EPSILON: f32 = 1e-7;

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    #[must_use]
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut aabb = Self::EMPTY;
        for p in points {
            aabb.grow(p);
        }
        aabb
    }

    pub fn grow(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn union_with(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    #[must_use]
    pub fn centroid(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Transforms all eight corners and rebounds.
    #[must_use]
    pub fn transformed(&self, world: &Mat4) -> Aabb {
        let mut out = Aabb::EMPTY;
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.grow(world.transform_point3(corner));
        }
        out
    }

    /// Slab test. Returns the entry distance when the ray hits the box
    /// within `[0, max_t]`.
    #[must_use]
    pub fn intersect(&self, origin: Vec3, inv_dir: Vec3, max_t: f32) -> Option<f32> {
        let t0 = (self.min - origin) * inv_dir;
        let t1 = (self.max - origin) * inv_dir;
        let t_min = t0.min(t1);
        let t_max = t0.max(t1);
        let near = t_min.max_element().max(0.0);
        let far = t_max.min_element().min(max_t);
        (near <= far).then_some(near)
    }
}

/// One triangle as three packed float4 positions (w unused), the layout the
/// baker feeds the builder.
#[derive(Clone, Copy, Debug)]
pub struct Triangle {
    pub v0: Vec4,
    pub v1: Vec4,
    pub v2: Vec4,
}

impl Triangle {
    #[must_use]
    pub fn aabb(&self) -> Aabb {
        Aabb::from_points([self.v0.truncate(), self.v1.truncate(), self.v2.truncate()])
    }
}

/// A ray hit: distance, primitive index within the BLAS, instance index
/// within the TLAS.
#[derive(Clone, Copy, Debug)]
pub struct Hit {
    pub t: f32,
    pub prim: u32,
    pub instance: u32,
}

#[derive(Clone, Copy, Debug)]
struct BvhNode {
    aabb: Aabb,
    /// Child index for interior nodes, first primitive slot for leaves.
    left_first: u32,
    /// Zero for interior nodes.
    count: u32,
}

/// A flat binary BVH over an arbitrary primitive set. Construction is a
/// median split along the longest centroid axis.
pub struct Bvh {
    nodes: Vec<BvhNode>,
    indices: Vec<u32>,
}

impl Bvh {
    /// Builds over per-primitive bounds. An empty slice yields a hierarchy
    /// that rejects every query.
    #[must_use]
    pub fn build(bounds: &[Aabb]) -> Self {
        let mut indices: Vec<u32> = (0..bounds.len() as u32).collect();
        let mut nodes = Vec::with_capacity(bounds.len().max(1) * 2);

        let root_aabb = bounds
            .iter()
            .fold(Aabb::EMPTY, |mut acc, b| {
                acc.union_with(b);
                acc
            });
        nodes.push(BvhNode {
            aabb: root_aabb,
            left_first: 0,
            count: bounds.len() as u32,
        });

        if !bounds.is_empty() {
            Self::subdivide(0, bounds, &mut nodes, &mut indices);
        }

        Self { nodes, indices }
    }

    fn subdivide(node_idx: usize, bounds: &[Aabb], nodes: &mut Vec<BvhNode>, indices: &mut [u32]) {
        let (first, count) = {
            let node = &nodes[node_idx];
            (node.left_first as usize, node.count as usize)
        };
        if count <= LEAF_SIZE {
            return;
        }

        let slice = &mut indices[first..first + count];
        let mut centroid_bounds = Aabb::EMPTY;
        for &i in slice.iter() {
            centroid_bounds.grow(bounds[i as usize].centroid());
        }
        let extent = centroid_bounds.max - centroid_bounds.min;
        let axis = if extent.x > extent.y && extent.x > extent.z {
            0
        } else if extent.y > extent.z {
            1
        } else {
            2
        };
        if extent[axis] < 1e-6 {
            return;
        }

        slice.sort_unstable_by(|&a, &b| {
            let ca = bounds[a as usize].centroid()[axis];
            let cb = bounds[b as usize].centroid()[axis];
            ca.total_cmp(&cb)
        });
        let mid = count / 2;

        let left_idx = nodes.len();
        let make_node = |first: usize, count: usize, bounds: &[Aabb], indices: &[u32]| {
            let mut aabb = Aabb::EMPTY;
            for &i in &indices[first..first + count] {
                aabb.union_with(&bounds[i as usize]);
            }
            BvhNode {
                aabb,
                left_first: first as u32,
                count: count as u32,
            }
        };
        nodes.push(make_node(first, mid, bounds, indices));
        nodes.push(make_node(first + mid, count - mid, bounds, indices));

        nodes[node_idx].left_first = left_idx as u32;
        nodes[node_idx].count = 0;

        Self::subdivide(left_idx, bounds, nodes, indices);
        Self::subdivide(left_idx + 1, bounds, nodes, indices);
    }

    #[must_use]
    pub fn root_aabb(&self) -> Aabb {
        self.nodes[0].aabb
    }

    /// Walks the hierarchy, calling `visit(prim_index)` for every primitive
    /// in a leaf whose bounds pass the slab test. `visit` returns the
    /// current max-t, letting callers shrink the search as hits are found;
    /// returning a negative value terminates the walk (any-hit queries).
    pub fn traverse(
        &self,
        origin: Vec3,
        inv_dir: Vec3,
        mut max_t: f32,
        mut visit: impl FnMut(u32) -> f32,
    ) {
        if self.indices.is_empty() {
            return;
        }
        let mut stack = [0u32; 64];
        let mut depth = 0usize;
        stack[0] = 0;
        depth += 1;

        while depth > 0 {
            depth -= 1;
            let node = &self.nodes[stack[depth] as usize];
            if node.aabb.intersect(origin, inv_dir, max_t).is_none() {
                continue;
            }
            if node.count > 0 {
                let first = node.left_first as usize;
                for &prim in &self.indices[first..first + node.count as usize] {
                    let t = visit(prim);
                    if t < 0.0 {
                        return;
                    }
                    max_t = max_t.min(t);
                }
            } else if depth + 2 <= stack.len() {
                stack[depth] = node.left_first;
                stack[depth + 1] = node.left_first + 1;
                depth += 2;
            }
        }
    }
}

/// Möller–Trumbore intersection. Returns the hit distance in `(0, max_t)`.
#[must_use]
pub fn intersect_triangle(origin: Vec3, dir: Vec3, tri: &Triangle, max_t: f32) -> Option<f32> {
    let v0 = tri.v0.truncate();
    let edge1 = tri.v1.truncate() - v0;
    let edge2 = tri.v2.truncate() - v0;

    let p = dir.cross(edge2);
    let det = edge1.dot(p);
    if det.abs() < TRI_EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = origin - v0;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(edge1);
    let v = dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = edge2.dot(q) * inv_det;
    (t > TRI_EPSILON && t < max_t).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_triangle() -> Triangle {
        Triangle {
            v0: Vec4::new(0.0, 0.0, 0.0, 0.0),
            v1: Vec4::new(1.0, 0.0, 0.0, 0.0),
            v2: Vec4::new(0.0, 1.0, 0.0, 0.0),
        }
    }

    #[test]
    fn triangle_hit_and_miss() {
        let tri = unit_triangle();
        let hit = intersect_triangle(Vec3::new(0.25, 0.25, -1.0), Vec3::Z, &tri, 100.0);
        assert!(hit.is_some());
        assert!((hit.unwrap() - 1.0).abs() < 1e-5);

        let miss = intersect_triangle(Vec3::new(2.0, 2.0, -1.0), Vec3::Z, &tri, 100.0);
        assert!(miss.is_none());
    }

    #[test]
    fn empty_bvh_rejects_queries() {
        let bvh = Bvh::build(&[]);
        let mut visited = 0;
        bvh.traverse(Vec3::ZERO, Vec3::splat(1.0), 100.0, |_| {
            visited += 1;
            100.0
        });
        assert_eq!(visited, 0);
    }

    #[test]
    fn bvh_finds_the_right_leaf() {
        let tris: Vec<Triangle> = (0..32)
            .map(|i| {
                let x = i as f32 * 2.0;
                Triangle {
                    v0: Vec4::new(x, 0.0, 0.0, 0.0),
                    v1: Vec4::new(x + 1.0, 0.0, 0.0, 0.0),
                    v2: Vec4::new(x, 1.0, 0.0, 0.0),
                }
            })
            .collect();
        let bounds: Vec<Aabb> = tris.iter().map(Triangle::aabb).collect();
        let bvh = Bvh::build(&bounds);

        let origin = Vec3::new(10.25, 0.25, -5.0);
        let mut best: Option<(u32, f32)> = None;
        bvh.traverse(origin, Vec3::Z.recip(), 100.0, |prim| {
            let max_t = best.map_or(100.0, |(_, t)| t);
            if let Some(t) = intersect_triangle(origin, Vec3::Z, &tris[prim as usize], max_t) {
                best = Some((prim, t));
            }
            best.map_or(100.0, |(_, t)| t)
        });

        let (prim, t) = best.expect("ray should hit a triangle");
        assert_eq!(prim, 5);
        assert!((t - 5.0).abs() < 1e-5);
    }
}
