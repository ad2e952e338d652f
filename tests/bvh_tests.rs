//! CPU Ray-Path Integration Tests
//!
//! Tests for:
//! - Closest-hit queries against the instanced Cornell scene
//! - Normal transformation through instance transforms
//! - Occlusion queries, the self-occlusion bias, and total misses
//! - Degenerate rays (zero-length direction)

use glam::Vec3;

use ember::Scene;
use ember::assets::cornell::create_cornell_box;
use ember::gi::accel::{TRACE_MAX_T, build_blas, build_trace_context};

fn cornell_context() -> (Scene, std::sync::Arc<ember::gi::accel::TraceContext>) {
    let (content, environment) = create_cornell_box();
    let mut scene = Scene::new();
    scene.set_environment(environment);
    scene.reload(content);
    scene.tick(0.0);

    let blas = build_blas(&scene);
    let ctx = build_trace_context(&scene, &blas);
    (scene, ctx)
}

#[test]
fn context_instances_one_per_visible_model_node() {
    let (scene, ctx) = cornell_context();
    assert_eq!(ctx.instances.len(), 3);
    assert_eq!(scene.models().len(), 2);
    assert_eq!(ctx.blas.len(), 2);
}

#[test]
fn ray_hits_back_wall_with_inward_normal() {
    let (_scene, ctx) = cornell_context();

    let hit = ctx
        .trace(Vec3::new(0.0, 1.0, 0.5), Vec3::NEG_Z, TRACE_MAX_T)
        .expect("back wall in range");
    assert!((hit.t - 1.5).abs() < 1e-4);
    assert!((hit.normal - Vec3::Z).length() < 1e-4, "normal points inward");
}

#[test]
fn side_walls_resolve_their_materials() {
    let (_scene, ctx) = cornell_context();

    let left = ctx
        .trace(Vec3::new(0.0, 1.0, 0.0), Vec3::NEG_X, TRACE_MAX_T)
        .expect("left wall");
    assert_eq!(left.material_id, 1, "left wall is the red slot");

    let right = ctx
        .trace(Vec3::new(0.0, 1.0, 0.0), Vec3::X, TRACE_MAX_T)
        .expect("right wall");
    assert_eq!(right.material_id, 2, "right wall is the green slot");
}

#[test]
fn instanced_box_intersects_under_its_transform() {
    let (scene, ctx) = cornell_context();

    // The short box sits around (0.35, 0..0.55, 0.35); a downward ray
    // above it must hit the box top, not the floor.
    let hit = ctx
        .trace(Vec3::new(0.35, 1.5, 0.35), Vec3::NEG_Y, TRACE_MAX_T)
        .expect("short box top");
    assert!((hit.t - 0.95).abs() < 1e-3, "t was {}", hit.t);
    assert!((hit.normal - Vec3::Y).length() < 1e-3);

    let instance = &ctx.instances[hit.instance_index as usize];
    let node_key = scene
        .get_node_by_instance_id(instance.instance_id)
        .expect("instance maps back to a node");
    assert_eq!(scene.node(node_key).unwrap().name(), "box1");
}

#[test]
fn zero_length_direction_returns_no_hit() {
    let (_scene, ctx) = cornell_context();
    assert!(ctx.trace(Vec3::new(0.0, 1.0, 0.0), Vec3::ZERO, TRACE_MAX_T).is_none());
    assert!(!ctx.occluded(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 1.0, 0.0)));
}

#[test]
fn ray_outside_every_instance_aabb_is_unoccluded() {
    let (_scene, ctx) = cornell_context();
    // Entirely above and beside the room.
    assert!(!ctx.occluded(Vec3::new(10.0, 10.0, 10.0), Vec3::new(20.0, 10.0, 10.0)));
}

#[test]
fn occlusion_respects_blockers_and_bias() {
    let (_scene, ctx) = cornell_context();

    // Floor point to the ceiling light centre: clear.
    let light = Vec3::new(0.0, 1.99, 0.0);
    assert!(!ctx.occluded(Vec3::new(0.0, 0.01, -0.8), light));

    // A point under the short box looking at the light: blocked.
    assert!(ctx.occluded(Vec3::new(0.35, 0.01, 0.35), light));

    // The bias keeps a point lying on the light plane from occluding
    // itself.
    assert!(!ctx.occluded(Vec3::new(0.0, 1.99, 0.0), light));
}

#[test]
fn invisible_nodes_are_excluded_from_the_instance_list() {
    let (mut scene, _) = cornell_context();
    let key = scene.get_node("box0").expect("box0 exists");
    scene.node_mut(key).unwrap().set_visible(false);
    scene.tick(0.0);

    let blas = build_blas(&scene);
    let ctx = build_trace_context(&scene, &blas);
    assert_eq!(ctx.instances.len(), 2);
}
