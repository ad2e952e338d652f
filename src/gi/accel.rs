//! Scene acceleration structure for the CPU ray path.
//!
//! `init_bvh` extracts packed triangle lists (plus face normals and
//! material sections) from every model and builds one BLAS each.
//! `update_bvh` rebuilds the instance list from the visible nodes and
//! publishes a fresh [`TraceContext`] snapshot behind an `Arc`; bake
//! workers clone the snapshot at dispatch, so a scene reload can never
//! free trace state while a query is in flight. The §5 rule still applies:
//! loads cancel and drain outstanding parallel tasks before rebuilding.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use glam::{Mat4, Vec3, Vec4};
use parking_lot::Mutex;

use crate::gi::bvh::{Aabb, Bvh, Hit, Triangle, intersect_triangle};
use crate::gi::packing::pack_unorm4x8;
use crate::render::uniforms::SHADOWMAP_SIZE;
use crate::scene::scene::Scene;
use crate::tasks::TaskCoordinator;

/// Rays are capped at this distance; the probe baker only cares about
/// nearby geometry.
pub const TRACE_MAX_T: f32 = 11.0;

/// Shadow rays stop just short of the target to avoid self-occlusion.
pub const OCCLUSION_BIAS: f32 = 0.02;

const DIR_EPSILON: f32 = 1e-12;

/// Per-triangle auxiliary data parallel to the BLAS triangle list.
#[derive(Clone, Copy, Debug)]
pub struct TriangleInfo {
    /// Object-space face normal computed from the edges.
    pub normal: Vec3,
    /// Material-section index taken from the first vertex.
    pub section: u32,
}

/// Per-model trace data: raw triangles, aux table, built BLAS.
pub struct BlasContext {
    pub triangles: Vec<Triangle>,
    pub infos: Vec<TriangleInfo>,
    pub bvh: Bvh,
}

/// One placed model in the trace scene.
#[derive(Clone, Copy, Debug)]
pub struct TraceInstance {
    pub blas_idx: u32,
    /// Row-major world transform (the transpose of the engine's
    /// column-major matrix) — the convention the normal transform relies
    /// on.
    pub transform: Mat4,
    pub inv_world: Mat4,
    pub world_aabb: Aabb,
    /// Per-section diffuse colour packed 8-8-8-8.
    pub packed_diffuse: [u32; 16],
    /// Per-section original material ids.
    pub material_ids: [u32; 16],
    pub instance_id: u32,
}

/// A resolved ray hit.
#[derive(Clone, Copy, Debug)]
pub struct TraceHit {
    pub t: f32,
    /// World-space face normal.
    pub normal: Vec3,
    /// Resolved material id (instance override applied).
    pub material_id: u32,
    pub instance_index: u32,
    /// Packed 8-8-8-8 diffuse of the hit section.
    pub packed_diffuse: u32,
}

/// Immutable trace snapshot shared with workers.
pub struct TraceContext {
    pub blas: Arc<Vec<BlasContext>>,
    pub instances: Vec<TraceInstance>,
    pub tlas: Bvh,
}

impl TraceContext {
    /// Closest-hit query. A zero-length direction returns no hit.
    #[must_use]
    pub fn trace(&self, origin: Vec3, dir: Vec3, max_t: f32) -> Option<TraceHit> {
        if dir.length_squared() < DIR_EPSILON || self.instances.is_empty() {
            return None;
        }

        let inv_dir = dir.recip();
        let mut best: Option<Hit> = None;
        let mut best_t = max_t;

        self.tlas.traverse(origin, inv_dir, max_t, |inst_idx| {
            let instance = &self.instances[inst_idx as usize];
            let blas = &self.blas[instance.blas_idx as usize];

            let local_origin = instance.inv_world.transform_point3(origin);
            let local_dir = instance.inv_world.transform_vector3(dir);
            if local_dir.length_squared() < DIR_EPSILON {
                return best_t;
            }
            let local_inv_dir = local_dir.recip();

            blas.bvh.traverse(local_origin, local_inv_dir, best_t, |prim| {
                if let Some(t) = intersect_triangle(
                    local_origin,
                    local_dir,
                    &blas.triangles[prim as usize],
                    best_t,
                ) {
                    best_t = t;
                    best = Some(Hit {
                        t,
                        prim,
                        instance: inst_idx,
                    });
                }
                best_t
            });
            best_t
        });

        best.map(|hit| self.resolve_hit(&hit))
    }

    fn resolve_hit(&self, hit: &Hit) -> TraceHit {
        let instance = &self.instances[hit.instance as usize];
        let blas = &self.blas[instance.blas_idx as usize];
        let info = &blas.infos[hit.prim as usize];

        // The stored matrix is row-major, so `M^T * n` is the world-space
        // normal the engine's column-major convention expects.
        let world = instance.transform.transpose();
        let normal = (world * info.normal.extend(0.0)).truncate().normalize_or_zero();

        let section = (info.section as usize).min(15);
        TraceHit {
            t: hit.t,
            normal,
            material_id: instance.material_ids[section],
            instance_index: hit.instance,
            packed_diffuse: instance.packed_diffuse[section],
        }
    }

    /// Any-hit query from `origin` toward `target`, biased short of the
    /// target. Degenerate segments count as unoccluded.
    #[must_use]
    pub fn occluded(&self, origin: Vec3, target: Vec3) -> bool {
        let dir = target - origin;
        let distance = dir.length() - OCCLUSION_BIAS;
        if distance <= 0.0 || self.instances.is_empty() {
            return false;
        }
        let dir = dir.normalize();
        let inv_dir = dir.recip();

        let mut hit = false;
        self.tlas.traverse(origin, inv_dir, distance, |inst_idx| {
            if hit {
                return -1.0;
            }
            let instance = &self.instances[inst_idx as usize];
            let blas = &self.blas[instance.blas_idx as usize];

            let local_origin = instance.inv_world.transform_point3(origin);
            let local_dir = instance.inv_world.transform_vector3(dir);
            if local_dir.length_squared() < DIR_EPSILON {
                return distance;
            }
            let local_inv_dir = local_dir.recip();

            blas.bvh.traverse(local_origin, local_inv_dir, distance, |prim| {
                if intersect_triangle(
                    local_origin,
                    local_dir,
                    &blas.triangles[prim as usize],
                    distance,
                )
                .is_some()
                {
                    hit = true;
                    return -1.0;
                }
                distance
            });
            if hit { -1.0 } else { distance }
        });
        hit
    }
}

/// Builds the per-model BLAS set from the scene's retained meshes.
#[must_use]
pub fn build_blas(scene: &Scene) -> Arc<Vec<BlasContext>> {
    let start = std::time::Instant::now();

    let mut contexts = Vec::with_capacity(scene.models().len());
    for model in scene.models() {
        let vertices = model.vertices();
        let mut triangles = Vec::with_capacity(model.indices().len() / 3);
        let mut infos = Vec::with_capacity(triangles.capacity());

        for tri in model.indices().chunks_exact(3) {
            let v0 = &vertices[tri[0] as usize];
            let v1 = &vertices[tri[1] as usize];
            let v2 = &vertices[tri[2] as usize];

            let edge1 = v1.position - v0.position;
            let edge2 = v2.position - v1.position;
            let normal = edge1.cross(edge2).normalize_or_zero();

            triangles.push(Triangle {
                v0: v0.position.extend(0.0),
                v1: v1.position.extend(0.0),
                v2: v2.position.extend(0.0),
            });
            infos.push(TriangleInfo {
                normal,
                section: v0.material_index,
            });
        }

        let bounds: Vec<Aabb> = triangles.iter().map(Triangle::aabb).collect();
        let bvh = Bvh::build(&bounds);
        contexts.push(BlasContext {
            triangles,
            infos,
            bvh,
        });
    }

    log::info!(
        "built {} BLAS in {:.0?}",
        contexts.len(),
        start.elapsed()
    );
    Arc::new(contexts)
}

/// Rebuilds the instance list from the visible nodes and publishes a fresh
/// trace snapshot.
#[must_use]
pub fn build_trace_context(scene: &Scene, blas: &Arc<Vec<BlasContext>>) -> Arc<TraceContext> {
    let mut instances = Vec::new();

    for (_, node) in scene.nodes() {
        let Some(model_id) = node.model_id() else {
            continue;
        };
        if !node.visible() || (model_id as usize) >= blas.len() {
            continue;
        }
        let Some(model) = scene.model(model_id) else {
            continue;
        };

        let world = node.world_transform();
        let mut packed_diffuse = [pack_unorm4x8(Vec4::ONE); 16];
        let mut material_ids = [0u32; 16];
        for slot in 0..16 {
            let material_id = node
                .materials()
                .get(slot)
                .or_else(|| model.section_materials().get(slot))
                .copied()
                .unwrap_or(0);
            material_ids[slot] = material_id;
            if let Some(material) = scene.material(material_id) {
                packed_diffuse[slot] = pack_unorm4x8(material.diffuse);
            }
        }

        let (aabb_min, aabb_max) = model.aabb();
        let local_aabb = Aabb {
            min: aabb_min,
            max: aabb_max,
        };

        instances.push(TraceInstance {
            blas_idx: model_id,
            transform: world.transpose(),
            inv_world: world.inverse(),
            world_aabb: local_aabb.transformed(&world),
            packed_diffuse,
            material_ids,
            instance_id: node.instance_id(),
        });
    }

    let bounds: Vec<Aabb> = instances.iter().map(|i| i.world_aabb).collect();
    let tlas = Bvh::build(&bounds);

    Arc::new(TraceContext {
        blas: blas.clone(),
        instances,
        tlas,
    })
}

// ============================================================================
// Sun shadow map
// ============================================================================

/// CPU-baked screen-space sun shadow map, tiled across the worker pool.
/// Finished tiles queue up for the main thread to upload.
pub struct ShadowMapBake {
    size: usize,
    tile: usize,
    depths: Arc<Vec<AtomicU32>>,
    ready_tiles: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl Default for ShadowMapBake {
    fn default() -> Self {
        Self::new(SHADOWMAP_SIZE, 256)
    }
}

impl ShadowMapBake {
    #[must_use]
    pub fn new(size: usize, tile: usize) -> Self {
        let depths = Arc::new(
            (0..size * size)
                .map(|_| AtomicU32::new(0f32.to_bits()))
                .collect::<Vec<_>>(),
        );
        Self {
            size,
            tile,
            depths,
            ready_tiles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn tile_size(&self) -> usize {
        self.tile
    }

    /// Dispatches one parallel task per tile. Each task shoots one ray per
    /// texel from the inverse sun view-projection and records the closest
    /// hit depth in NDC; its completion queues the tile rect for upload.
    pub fn dispatch(
        &self,
        ctx: &Arc<TraceContext>,
        sun_view_projection: Mat4,
        sun_direction: Vec3,
        coordinator: &TaskCoordinator,
    ) {
        let inv_lvp = sun_view_projection.inverse();
        let tiles_per_row = self.size / self.tile;

        for tile_y in 0..tiles_per_row {
            for tile_x in 0..tiles_per_row {
                let start_x = tile_x * self.tile;
                let start_y = tile_y * self.tile;
                let size = self.size;
                let tile = self.tile;
                let ctx = ctx.clone();
                let depths = self.depths.clone();
                let ready = self.ready_tiles.clone();

                let _ = coordinator.add_parallel_task(
                    move |_| {
                        for y in 0..tile {
                            for x in 0..tile {
                                let px = start_x + x;
                                let py = start_y + y;
                                let ndc_x =
                                    (px as f32 / (size - 1) as f32) * 2.0 - 1.0;
                                let ndc_y =
                                    1.0 - (py as f32 / (size - 1) as f32) * 2.0;

                                let world = inv_lvp
                                    * Vec4::new(ndc_x, ndc_y, 0.0, 1.0);
                                let origin = world.truncate() / world.w;

                                if let Some(hit) =
                                    ctx.trace(origin, sun_direction, 10_000.0)
                                {
                                    let hit_point =
                                        origin + sun_direction * hit.t;
                                    let clip = sun_view_projection
                                        * hit_point.extend(1.0);
                                    let depth =
                                        (clip.z / clip.w).clamp(0.0, 1.0);
                                    depths[py * size + px].store(
                                        depth.to_bits(),
                                        Ordering::Relaxed,
                                    );
                                }
                            }
                        }
                    },
                    Some(Box::new(move |_| {
                        ready.lock().push((start_x as u32, start_y as u32));
                    })),
                );
            }
        }
    }

    /// Tiles whose rays finished since the last call, ready for upload.
    #[must_use]
    pub fn drain_ready_tiles(&self) -> Vec<(u32, u32)> {
        std::mem::take(&mut *self.ready_tiles.lock())
    }

    /// Copies one tile out as tightly packed f32 depths.
    #[must_use]
    pub fn tile_data(&self, start_x: u32, start_y: u32) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.tile * self.tile);
        for y in 0..self.tile {
            let row = (start_y as usize + y) * self.size + start_x as usize;
            for x in 0..self.tile {
                out.push(f32::from_bits(self.depths[row + x].load(Ordering::Relaxed)));
            }
        }
        out
    }
}
