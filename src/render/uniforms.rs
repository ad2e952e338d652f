//! Per-frame GPU data model.
//!
//! [`UniformBufferObject`] is the fixed, 16-byte-aligned constant block
//! consumed by every back-end's shaders and mirrored by the CPU-side
//! shading in the probe baker. [`NodeProxy`] and [`IndirectDrawCommand`]
//! are the flattened per-node records the scene assembly writes each frame.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::scene::camera::Camera;
use crate::scene::environment::Environment;
use crate::settings::UserSettings;

/// Near-grid probe lattice edge length in X and Z.
pub const CUBE_SIZE_XY: usize = 200;
/// Near-grid probe lattice height in Y.
pub const CUBE_SIZE_Z: usize = 50;
/// Near-grid cell size in world units.
pub const CUBE_UNIT: f32 = 0.25;
/// Near-grid world-space origin, centring the lattice on the scene.
pub const CUBE_OFFSET: [f32; 3] = [
    -(CUBE_SIZE_XY as f32) / 2.0 * CUBE_UNIT,
    -1.5 * CUBE_UNIT,
    -(CUBE_SIZE_XY as f32) / 2.0 * CUBE_UNIT,
];
/// Far-grid cell size in world units.
pub const CUBE_UNIT_FAR: f32 = 1.0;
/// Far-grid world-space origin.
pub const CUBE_OFFSET_FAR: [f32; 3] = [
    -(CUBE_SIZE_XY as f32) / 2.0 * CUBE_UNIT_FAR,
    -1.5 * CUBE_UNIT_FAR,
    -(CUBE_SIZE_XY as f32) / 2.0 * CUBE_UNIT_FAR,
];

/// CPU shadow-map resolution (square).
pub const SHADOWMAP_SIZE: usize = 4096;

/// Upper bound used when sizing the proxy and indirect-draw buffers.
pub const MAX_NODES: usize = 65_535;

/// Flattened per-node record uploaded to the GPU.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct NodeProxy {
    pub instance_id: u32,
    pub model_id: u32,
    pub reserved0: u32,
    pub reserved1: u32,
    pub world: Mat4,
    pub prev_world: Mat4,
    pub material_ids: [u32; 16],
}

/// Instanced indexed-draw record, field order matching
/// `VkDrawIndexedIndirectCommand`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct IndirectDrawCommand {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
}

/// Result of a GPU ray cast, read back from the ray-query back-ends.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RayCastResult {
    pub hit_point: Vec4,
    pub normal: Vec4,
    pub t: f32,
    pub instance_id: u32,
    pub material_id: u32,
    pub hitted: u32,
}

/// Per-frame constants shared by every back-end.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model_view: Mat4,
    pub projection: Mat4,
    pub model_view_inverse: Mat4,
    pub projection_inverse: Mat4,
    pub view_projection: Mat4,
    pub prev_view_projection: Mat4,

    /// x, y, width, height of the swap-chain render region.
    pub viewport_rect: Vec4,
    pub sun_direction: Vec4,
    pub sun_color: Vec4,
    pub sky_color: Vec4,

    pub aperture: f32,
    pub focus_distance: f32,
    pub sky_rotation: f32,
    pub heatmap_scale: f32,

    pub paper_white_nit: f32,
    pub sky_intensity: f32,
    pub sky_idx: u32,
    pub total_frames: u32,

    pub max_bounces: u32,
    pub samples_per_pixel: u32,
    pub current_bounces: u32,
    pub random_seed: u32,

    pub light_count: u32,
    pub has_sky: u32,
    pub show_heatmap: u32,
    pub use_checkerboard: u32,

    pub temporal_frames: u32,
    pub has_sun: u32,
    pub hdr_output: u32,
    pub adaptive_sample: u32,

    pub adaptive_variance: f32,
    pub adaptive_steps: u32,
    pub taa: u32,
    pub selected_id: u32,

    pub show_edge: u32,
    pub progressive_render: u32,
    pub bf_sigma: f32,
    pub bf_sigma_lum: f32,

    pub bf_sigma_normal: f32,
    pub bf_size: u32,
    pub bake_with_gpu: u32,
    pub reserved0: u32,
}

impl Default for UniformBufferObject {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Everything frame-varying the UBO composition needs besides the scene.
#[derive(Clone, Copy, Debug)]
pub struct FrameInputs {
    /// x, y of the render-region offset.
    pub viewport_offset: (u32, u32),
    /// Width, height of the render region in pixels.
    pub viewport_extent: (u32, u32),
    pub total_frames: u32,
    pub selected_id: u32,
    pub light_count: u32,
    pub random_seed: u32,
    pub progressive: bool,
    pub hdr_output: bool,
}

/// Composes the per-frame uniform block. Pure so it can be exercised
/// without a device; the engine stashes the result as `prev` for the next
/// frame.
#[must_use]
pub fn build_uniform_buffer(
    camera: &Camera,
    env: &Environment,
    settings: &UserSettings,
    inputs: &FrameInputs,
    prev: &UniformBufferObject,
) -> UniformBufferObject {
    let mut ubo = UniformBufferObject::default();

    ubo.model_view = camera.model_view;

    let (width, height) = inputs.viewport_extent;
    let aspect = width.max(1) as f32 / height.max(1) as f32;
    let mut projection = Mat4::perspective_rh(
        camera.field_of_view.to_radians(),
        aspect,
        0.1,
        10_000.0,
    );
    // Flip Y for the target coordinate system.
    projection.y_axis.y *= -1.0;

    // Device pre-rotation: compose a 90 degree z-rotation and swap aspect.
    #[cfg(target_os = "android")]
    {
        let mut rotated = Mat4::perspective_rh(
            camera.field_of_view.to_radians(),
            height.max(1) as f32 / width.max(1) as f32,
            0.1,
            10_000.0,
        );
        rotated.y_axis.y *= -1.0;
        projection =
            Mat4::from_rotation_z(std::f32::consts::FRAC_PI_2) * rotated;
    }
    ubo.projection = projection;

    ubo.model_view_inverse = ubo.model_view.inverse();
    ubo.projection_inverse = ubo.projection.inverse();
    ubo.view_projection = ubo.projection * ubo.model_view;
    ubo.prev_view_projection = if prev.total_frames == 0 {
        ubo.view_projection
    } else {
        prev.view_projection
    };

    ubo.viewport_rect = Vec4::new(
        inputs.viewport_offset.0 as f32,
        inputs.viewport_offset.1 as f32,
        width as f32,
        height as f32,
    );

    ubo.aperture = camera.aperture;
    ubo.focus_distance = camera.focal_distance;

    ubo.sun_direction = env.sun_direction().extend(0.0);
    ubo.sun_color = Vec4::new(1.0, 1.0, 1.0, 0.0) * env.sun_intensity;
    ubo.sky_color = Vec4::new(0.4, 0.6, 1.0, 0.0) * 4.0 * env.sky_intensity;
    ubo.sky_rotation = env.sky_rotation;
    ubo.sky_intensity = env.sky_intensity;
    ubo.sky_idx = env.sky_idx.max(0) as u32;
    ubo.has_sky = u32::from(env.has_sky);
    ubo.has_sun = u32::from(env.has_sun && env.sun_intensity > 0.0);

    ubo.total_frames = inputs.total_frames;
    ubo.selected_id = inputs.selected_id;
    ubo.light_count = inputs.light_count;
    ubo.random_seed = inputs.random_seed;

    ubo.max_bounces = settings.max_bounces;
    ubo.current_bounces = settings.bounces;
    ubo.samples_per_pixel = settings.samples;
    ubo.adaptive_sample = u32::from(settings.adaptive_sample);
    ubo.adaptive_variance = settings.adaptive_variance;
    ubo.adaptive_steps = settings.adaptive_steps;
    ubo.taa = u32::from(settings.taa);

    ubo.show_heatmap = u32::from(settings.show_heatmap);
    ubo.heatmap_scale = settings.heatmap_scale;
    ubo.use_checkerboard = u32::from(settings.use_checkerboard);
    ubo.show_edge = u32::from(settings.show_edge);

    ubo.temporal_frames = if inputs.progressive {
        1024 / settings.temporal_frames.max(1)
    } else {
        settings.temporal_frames
    };
    ubo.progressive_render = u32::from(inputs.progressive);
    ubo.hdr_output = u32::from(inputs.hdr_output);
    ubo.paper_white_nit = settings.paper_white_nit;

    ubo.bf_sigma = settings.denoise_sigma;
    ubo.bf_sigma_lum = settings.denoise_sigma_lum;
    ubo.bf_sigma_normal = settings.denoise_sigma_normal;
    ubo.bf_size = if settings.denoiser {
        settings.denoise_size
    } else {
        0
    };

    ubo.bake_with_gpu = u32::from(settings.bake_with_gpu);

    ubo
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_are_16_byte_multiples() {
        assert_eq!(std::mem::size_of::<UniformBufferObject>() % 16, 0);
        assert_eq!(std::mem::size_of::<NodeProxy>() % 16, 0);
        assert_eq!(std::mem::size_of::<IndirectDrawCommand>(), 20);
    }

    #[test]
    fn grid_constants_match_layout() {
        assert_eq!(CUBE_OFFSET, [-25.0, -0.375, -25.0]);
        assert_eq!(CUBE_SIZE_XY * CUBE_SIZE_XY * CUBE_SIZE_Z, 2_000_000);
    }
}
