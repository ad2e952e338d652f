//! The ambient-probe baker.
//!
//! Each probe is refined by [`process_cube`] in one of four per-cube states:
//! `Iterate` progressively re-traces the six axial faces, `Copy` snapshots
//! the cube into the shadow lattice, `Blur` filters a 3x3x3 neighbourhood
//! out of that snapshot, and `Fence` is a scheduling token that defers
//! dispatch until the in-flight batch drains. The blur pass reads only the
//! shadow lattice and writes only the live one, so worker interleaving
//! within a pass cannot alias.

use std::sync::Arc;

use glam::{Vec3, Vec4};

use crate::gi::accel::{TRACE_MAX_T, TraceContext};
use crate::gi::packing::{
    WangRng, lerp_packed_color, pack_rgb10a2, unpack_rgb10a2, unpack_unorm4x8,
};
use crate::gi::probe::{
    AmbientCube, CubeGrid, FACE_DIRS, GridConfig, INFO_ACTIVE, INFO_BLURRED, INFO_ITERATION,
    INFO_MATERIAL,
};
use crate::scene::scene::Scene;

/// Column-group edge length in probes; groups cover the full Z range.
pub const GROUP_SIZE: usize = 16;

/// Reference intensities that normalize emitter power into pack range.
const SUN_REFERENCE: f32 = 500.0;
const SKY_REFERENCE: f32 = 100.0;

/// Surface offset applied before secondary rays.
const SHADING_BIAS: f32 = 0.01;

/// Per-cube processing states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CubeProc {
    Iterate,
    Copy,
    Blur,
    /// Queue token: blocks dequeue until previously dispatched tasks drain.
    Fence,
}

/// Which lattice a group record targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BakerKind {
    Near,
    Far,
}

/// One schedulable unit of bake work: a 16x16 probe column group.
#[derive(Clone, Copy, Debug)]
pub struct GroupRecord {
    pub x: i32,
    pub z: i32,
    pub proc: CubeProc,
    pub baker: BakerKind,
}

/// A quad light reduced to what the bake shading needs.
#[derive(Clone, Copy, Debug)]
pub struct BakeLight {
    pub position: Vec3,
    pub normal: Vec3,
    pub area: f32,
    pub power: Vec4,
}

/// Scene lighting captured by value at dispatch time, so workers never
/// chase the live scene.
#[derive(Clone, Debug, Default)]
pub struct BakeEnvironment {
    pub lights: Vec<BakeLight>,
    pub sun_direction: Option<Vec3>,
    pub sun_intensity: f32,
    pub has_sky: bool,
    pub sky_intensity: f32,
}

impl BakeEnvironment {
    #[must_use]
    pub fn from_scene(scene: &Scene) -> Self {
        let lights = scene
            .lights()
            .iter()
            .map(|light| {
                let power = scene
                    .material(light.material_index)
                    .map_or(Vec4::ONE, |m| m.diffuse);
                BakeLight {
                    position: light.center(),
                    normal: light.normal(),
                    area: light.area(),
                    power,
                }
            })
            .collect();

        let env = scene.environment();
        Self {
            lights,
            sun_direction: env.has_sun.then(|| env.sun_direction()),
            sun_intensity: env.sun_intensity,
            has_sky: env.has_sky,
            sky_intensity: env.sky_intensity,
        }
    }

    /// Sky radiance along `dir`, normalized to pack range.
    #[must_use]
    pub fn sky_radiance(&self, dir: Vec3) -> Vec4 {
        if !self.has_sky {
            return Vec4::new(0.0, 0.0, 0.0, 1.0);
        }
        let up = dir.y * 0.5 + 0.5;
        let horizon = Vec3::new(0.8, 0.85, 0.95);
        let zenith = Vec3::new(0.4, 0.6, 1.0);
        let tint = horizon.lerp(zenith, up) * (self.sky_intensity / SKY_REFERENCE);
        tint.extend(1.0)
    }
}

/// One probe lattice plus its blur-source shadow copy.
pub struct ProbeBaker {
    grid: Arc<CubeGrid>,
    shadow: Arc<CubeGrid>,
}

impl ProbeBaker {
    #[must_use]
    pub fn new(config: GridConfig) -> Self {
        Self {
            grid: Arc::new(CubeGrid::new(config)),
            shadow: Arc::new(CubeGrid::new(config)),
        }
    }

    #[must_use]
    pub fn config(&self) -> &GridConfig {
        self.grid.config()
    }

    #[must_use]
    pub fn grid(&self) -> &Arc<CubeGrid> {
        &self.grid
    }

    #[must_use]
    pub fn shadow(&self) -> &Arc<CubeGrid> {
        &self.shadow
    }

    pub fn clear(&self) {
        self.grid.clear();
        self.shadow.clear();
    }

    /// Upload-ready copy of the live lattice.
    #[must_use]
    pub fn snapshot(&self) -> Vec<AmbientCube> {
        self.grid.snapshot()
    }
}

/// Runs one processing state on the cube at `(x, y, z)`. Touches exactly
/// that cube, plus its direct neighbours as read sources during `Blur`.
pub fn process_cube(
    grid: &CubeGrid,
    shadow: &CubeGrid,
    x: usize,
    y: usize,
    z: usize,
    proc: CubeProc,
    ctx: &TraceContext,
    env: &BakeEnvironment,
    rng: &mut WangRng,
) {
    let config = *grid.config();
    if !config.contains(x as i32, y as i32, z as i32) {
        return;
    }
    let idx = config.index(x, y, z);

    match proc {
        CubeProc::Fence => {}
        CubeProc::Iterate => iterate_cube(grid, &config, idx, x, y, z, ctx, env, rng),
        CubeProc::Copy => {
            let cube = grid.load(idx);
            shadow.store(idx, &cube);
        }
        CubeProc::Blur => blur_cube(grid, shadow, &config, idx, x, y, z),
    }
}

#[allow(clippy::too_many_arguments)]
fn iterate_cube(
    grid: &CubeGrid,
    config: &GridConfig,
    idx: usize,
    x: usize,
    y: usize,
    z: usize,
    ctx: &TraceContext,
    env: &BakeEnvironment,
    rng: &mut WangRng,
) {
    let probe_pos = config.probe_position(x, y, z);

    grid.set_info(idx, INFO_ACTIVE, 1);
    let iteration = grid.info(idx, INFO_ITERATION) + 1;
    grid.set_info(idx, INFO_ITERATION, iteration);

    if let Some(material_id) = inside_material(ctx, probe_pos, config.unit) {
        grid.set_info(idx, INFO_ACTIVE, 0);
        grid.set_info(idx, INFO_MATERIAL, material_id);
        return;
    }
    grid.set_info(idx, INFO_MATERIAL, 0);

    let weight = if iteration == 1 { 1.0 } else { 0.5 };

    for (face, axis) in FACE_DIRS.iter().enumerate() {
        // Jitter the axial probe ray; the running average integrates the
        // noise over iterations.
        let jitter = Vec3::new(
            rng.next_f32() - 0.5,
            rng.next_f32() - 0.5,
            rng.next_f32() - 0.5,
        ) * 0.3;
        let dir = (*axis + jitter).normalize();

        let (bounce, sky, distance) = match ctx.trace(probe_pos, dir, TRACE_MAX_T) {
            Some(hit) => {
                let albedo = unpack_unorm4x8(hit.packed_diffuse);
                let hit_pos = probe_pos + dir * hit.t;
                let shade_pos = hit_pos + hit.normal * SHADING_BIAS;

                let direct = gather_direct_light(ctx, env, shade_pos, hit.normal);
                let indirect = fetch_indirect(grid, config, hit_pos, hit.normal);
                let bounce = (albedo.truncate() * (direct + indirect.truncate())).extend(1.0);

                (bounce, Vec4::new(0.0, 0.0, 0.0, 1.0), hit.t / TRACE_MAX_T)
            }
            None => (Vec4::new(0.0, 0.0, 0.0, 1.0), env.sky_radiance(dir), 1.0),
        };

        grid.set_direct(
            idx,
            face,
            pack_rgb10a2(Vec4::new(distance, distance, distance, 1.0)),
        );
        grid.set_bounce(idx, face, lerp_packed_color(grid.bounce(idx, face), bounce, weight));
        grid.set_sky(idx, face, lerp_packed_color(grid.sky(idx, face), sky, weight));
    }
}

/// Detects a probe buried in geometry: a short axial ray hitting a back
/// face means the probe sits inside that surface. Returns the material id
/// recorded on the inactive cube.
fn inside_material(ctx: &TraceContext, probe_pos: Vec3, unit: f32) -> Option<u32> {
    let reach = unit * 2.0;
    for dir in FACE_DIRS {
        if let Some(hit) = ctx.trace(probe_pos, dir, reach) {
            if hit.normal.dot(dir) > 0.0 {
                return Some(hit.material_id);
            }
        }
    }
    None
}

/// One-bounce direct lighting at a surface point: every quad light is
/// sampled at its center with a shadow ray, plus the sun when present.
fn gather_direct_light(
    ctx: &TraceContext,
    env: &BakeEnvironment,
    position: Vec3,
    normal: Vec3,
) -> Vec3 {
    let mut total = Vec3::ZERO;

    for light in &env.lights {
        let to_light = light.position - position;
        let dist_sq = to_light.length_squared().max(1e-4);
        let dir = to_light / dist_sq.sqrt();

        let cos_surface = normal.dot(dir);
        if cos_surface <= 0.0 {
            continue;
        }
        let cos_light = light.normal.dot(-dir).abs();
        if ctx.occluded(position, light.position) {
            continue;
        }

        let geometry = cos_surface * cos_light * light.area / (std::f32::consts::PI * dist_sq);
        total += light.power.truncate() * geometry;
    }

    if let Some(sun_dir) = env.sun_direction {
        let to_sun = -sun_dir;
        let cos_surface = normal.dot(to_sun);
        if cos_surface > 0.0 && !ctx.occluded(position, position + to_sun * 100.0) {
            total += Vec3::ONE * (env.sun_intensity / SUN_REFERENCE) * cos_surface;
        }
    }

    total
}

/// Trilinear probe-grid feedback at a surface point. Inactive probes are
/// skipped; positions outside the lattice fall back to white so geometry
/// beyond the grid is not darkened.
fn fetch_indirect(grid: &CubeGrid, config: &GridConfig, position: Vec3, normal: Vec3) -> Vec4 {
    let pos = (position - config.offset) / config.unit;
    let max_xy = (config.size_xy - 1) as f32;
    let max_z = (config.size_z - 1) as f32;
    if pos.x < 0.0
        || pos.y < 0.0
        || pos.z < 0.0
        || pos.x > max_xy
        || pos.y > max_z
        || pos.z > max_xy
    {
        return Vec4::ONE;
    }

    let base = pos.floor();
    let frac = pos - base;

    let mut total_weight = 0.0;
    let mut result = Vec4::ZERO;

    for corner in 0..8 {
        let ox = corner & 1;
        let oy = (corner >> 1) & 1;
        let oz = (corner >> 2) & 1;

        let px = base.x as i32 + ox;
        let py = base.y as i32 + oy;
        let pz = base.z as i32 + oz;
        if !config.contains(px, py, pz) {
            continue;
        }
        let idx = config.index(px as usize, py as usize, pz as usize);
        if grid.info(idx, INFO_ACTIVE) != 1 {
            continue;
        }

        let wx = if ox == 0 { 1.0 - frac.x } else { frac.x };
        let wy = if oy == 0 { 1.0 - frac.y } else { frac.y };
        let wz = if oz == 0 { 1.0 - frac.z } else { frac.z };
        let weight = wx * wy * wz;

        result += sample_cube_faces(grid, idx, normal) * weight;
        total_weight += weight;
    }

    if total_weight > 0.0 {
        result / total_weight
    } else {
        Vec4::splat(0.05)
    }
}

/// Six-axis (HL2-style) basis lookup: blends the three faces the normal
/// points toward, weighted by the squared normal components.
fn sample_cube_faces(grid: &CubeGrid, idx: usize, normal: Vec3) -> Vec4 {
    let n_sq = normal * normal;
    let face_x = if normal.x >= 0.0 { 4 } else { 5 };
    let face_y = if normal.y >= 0.0 { 2 } else { 3 };
    let face_z = if normal.z >= 0.0 { 0 } else { 1 };

    unpack_rgb10a2(grid.bounce(idx, face_x)) * n_sq.x
        + unpack_rgb10a2(grid.bounce(idx, face_y)) * n_sq.y
        + unpack_rgb10a2(grid.bounce(idx, face_z)) * n_sq.z
}

fn blur_cube(
    grid: &CubeGrid,
    shadow: &CubeGrid,
    config: &GridConfig,
    idx: usize,
    x: usize,
    y: usize,
    z: usize,
) {
    grid.set_info(idx, INFO_BLURRED, 0);

    let mut total_weight = 0.0f32;
    let mut bounce_acc = [Vec4::ZERO; 6];
    let mut sky_acc = [Vec4::ZERO; 6];

    for dy in -1i32..=1 {
        for dz in -1i32..=1 {
            for dx in -1i32..=1 {
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                let nz = z as i32 + dz;
                if !config.contains(nx, ny, nz) {
                    continue;
                }

                let neighbor = config.index(nx as usize, ny as usize, nz as usize);
                if shadow.info(neighbor, INFO_ACTIVE) != 1 {
                    continue;
                }

                let dist = Vec3::new(dx as f32, dy as f32, dz as f32).length();
                let weight = 1.0 / (1.0 + dist);

                for face in 0..6 {
                    bounce_acc[face] += unpack_rgb10a2(shadow.bounce(neighbor, face)) * weight;
                    sky_acc[face] += unpack_rgb10a2(shadow.sky(neighbor, face)) * weight;
                }
                total_weight += weight;
            }
        }
    }

    if total_weight > 0.0 {
        let inv = 1.0 / total_weight;
        for face in 0..6 {
            grid.set_bounce(idx, face, pack_rgb10a2(bounce_acc[face] * inv));
            grid.set_sky(idx, face, pack_rgb10a2(sky_acc[face] * inv));
        }
        grid.set_info(idx, INFO_BLURRED, 1);
    }
}
