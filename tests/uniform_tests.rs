//! Uniform-Buffer Composition Tests
//!
//! Tests for:
//! - Motion-vector chain: PrevViewProjection preservation across frames
//! - First-frame seeding (prev == current)
//! - Y-flip and inverse consistency
//! - Settings and environment propagation into the block

use glam::{Mat4, Vec3, Vec4};

use ember::UserSettings;
use ember::render::uniforms::{FrameInputs, UniformBufferObject, build_uniform_buffer};
use ember::scene::camera::Camera;
use ember::scene::environment::Environment;

fn fixed_camera() -> Camera {
    let mut camera = Camera::looking_at("test", Vec3::new(0.0, 1.0, 5.0), Vec3::ZERO);
    camera.field_of_view = 45.0;
    camera.aperture = 0.1;
    camera.focal_distance = 5.0;
    camera
}

fn inputs(total_frames: u32) -> FrameInputs {
    FrameInputs {
        viewport_offset: (0, 0),
        viewport_extent: (1280, 720),
        total_frames,
        selected_id: u32::MAX,
        light_count: 1,
        random_seed: 7,
        progressive: false,
        hdr_output: false,
    }
}

#[test]
fn first_frame_seeds_prev_view_projection() {
    let ubo = build_uniform_buffer(
        &fixed_camera(),
        &Environment::new(),
        &UserSettings::default(),
        &inputs(0),
        &UniformBufferObject::default(),
    );
    assert_eq!(ubo.prev_view_projection, ubo.view_projection);
}

#[test]
fn static_camera_preserves_view_projection_chain() {
    let camera = fixed_camera();
    let env = Environment::new();
    let settings = UserSettings::default();

    // Frame 10 establishes the chain; frame 11 keeps the camera identical.
    let frame10 = build_uniform_buffer(
        &camera,
        &env,
        &settings,
        &inputs(10),
        &UniformBufferObject {
            total_frames: 9,
            view_projection: Mat4::IDENTITY,
            ..Default::default()
        },
    );
    let frame11 = build_uniform_buffer(&camera, &env, &settings, &inputs(11), &frame10);

    assert_eq!(frame11.prev_view_projection, frame10.view_projection);
    assert_eq!(frame11.view_projection, frame10.view_projection);
    assert_eq!(frame11.prev_view_projection, frame11.view_projection);
}

#[test]
fn moving_camera_carries_the_prior_view_projection() {
    let env = Environment::new();
    let settings = UserSettings::default();

    let frame_a = build_uniform_buffer(
        &fixed_camera(),
        &env,
        &settings,
        &inputs(5),
        &UniformBufferObject {
            total_frames: 4,
            ..Default::default()
        },
    );

    let mut moved = fixed_camera();
    moved.model_view = Mat4::look_at_rh(Vec3::new(2.0, 1.0, 5.0), Vec3::ZERO, Vec3::Y);
    let frame_b = build_uniform_buffer(&moved, &env, &settings, &inputs(6), &frame_a);

    assert_eq!(frame_b.prev_view_projection, frame_a.view_projection);
    assert_ne!(frame_b.view_projection, frame_b.prev_view_projection);
}

#[test]
fn projection_flips_y_and_inverts_cleanly() {
    let ubo = build_uniform_buffer(
        &fixed_camera(),
        &Environment::new(),
        &UserSettings::default(),
        &inputs(1),
        &UniformBufferObject::default(),
    );

    assert!(ubo.projection.y_axis.y < 0.0, "Y must be flipped");

    let round_trip = ubo.projection * ubo.projection_inverse;
    for (a, b) in round_trip
        .to_cols_array()
        .iter()
        .zip(Mat4::IDENTITY.to_cols_array().iter())
    {
        assert!((a - b).abs() < 1e-4);
    }

    let view_round_trip = ubo.model_view * ubo.model_view_inverse;
    for (a, b) in view_round_trip
        .to_cols_array()
        .iter()
        .zip(Mat4::IDENTITY.to_cols_array().iter())
    {
        assert!((a - b).abs() < 1e-4);
    }
}

#[test]
fn settings_and_environment_propagate() {
    let mut env = Environment::new();
    env.has_sun = true;
    env.sun_intensity = 250.0;
    env.sky_intensity = 40.0;
    env.sky_idx = 3;

    let mut settings = UserSettings::default();
    settings.samples = 16;
    settings.bounces = 2;
    settings.max_bounces = 8;
    settings.denoiser = true;
    settings.denoise_size = 7;

    let frame = FrameInputs {
        viewport_offset: (8, 16),
        viewport_extent: (640, 480),
        total_frames: 3,
        selected_id: 42,
        light_count: 5,
        random_seed: 1,
        progressive: false,
        hdr_output: true,
    };
    let ubo = build_uniform_buffer(
        &fixed_camera(),
        &env,
        &settings,
        &frame,
        &UniformBufferObject::default(),
    );

    assert_eq!(ubo.viewport_rect, Vec4::new(8.0, 16.0, 640.0, 480.0));
    assert_eq!(ubo.samples_per_pixel, 16);
    assert_eq!(ubo.current_bounces, 2);
    assert_eq!(ubo.max_bounces, 8);
    assert_eq!(ubo.bf_size, 7);
    assert_eq!(ubo.selected_id, 42);
    assert_eq!(ubo.light_count, 5);
    assert_eq!(ubo.has_sun, 1);
    assert_eq!(ubo.sky_idx, 3);
    assert_eq!(ubo.hdr_output, 1);
    assert!((ubo.sun_direction.truncate().length() - 1.0).abs() < 1e-5);
}

#[test]
fn progressive_mode_adjusts_temporal_frames() {
    let mut settings = UserSettings::default();
    settings.temporal_frames = 8;

    let mut frame = inputs(1);
    frame.progressive = true;
    let ubo = build_uniform_buffer(
        &fixed_camera(),
        &Environment::new(),
        &settings,
        &frame,
        &UniformBufferObject::default(),
    );
    assert_eq!(ubo.temporal_frames, 128);
    assert_eq!(ubo.progressive_render, 1);
}
