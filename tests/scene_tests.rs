//! Scene Graph & GPU Assembly Integration Tests
//!
//! Tests for:
//! - Node hierarchy: world = parent.world * local, prev-transform capture
//! - Proxy flattening: grouping by model, contiguity, deterministic rebuild
//! - Motion epsilon keeping the scene dirty for one extra frame
//! - The Cornell scene counts from the end-to-end scenarios

use glam::{Mat4, Quat, Vec3};

use ember::Scene;
use ember::assets::cornell::create_cornell_box;
use ember::scene::node::Node;
use ember::scene::scene::SELECTED_NONE;

fn cornell_scene() -> Scene {
    let (content, environment) = create_cornell_box();
    let mut scene = Scene::new();
    scene.set_environment(environment);
    scene.reload(content);
    scene
}

// ============================================================================
// Cornell scene: flatten counts
// ============================================================================

#[test]
fn cornell_box_flattens_to_expected_counts() {
    let mut scene = cornell_scene();
    scene.tick(0.016);

    assert!(scene.update_nodes().expect("flatten succeeds"));
    assert_eq!(scene.node_proxies().len(), 3);
    assert_eq!(scene.indirect_draw_batch_count(), 2);
    assert_eq!(scene.light_count(), 1);
}

#[test]
fn proxies_are_grouped_by_model_and_contiguous() {
    let mut scene = cornell_scene();
    scene.tick(0.016);
    let _ = scene.update_nodes().expect("flatten succeeds");

    let proxies = scene.node_proxies();
    // All instances of one model form a contiguous run.
    let mut last_model = 0;
    for proxy in proxies {
        assert!(proxy.model_id >= last_model, "proxies must be model-sorted");
        last_model = proxy.model_id;
    }

    let draws = scene.indirect_draws();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].instance_count, 1);
    assert_eq!(draws[1].instance_count, 2);
    assert_eq!(draws[1].first_instance, 1);
    assert_eq!(draws[0].first_index, 0);
    assert_eq!(
        draws[1].first_index,
        scene.models()[0].index_count(),
        "second batch starts after the first model's indices"
    );
}

#[test]
fn proxy_world_matches_node_world() {
    let mut scene = cornell_scene();
    scene.tick(0.016);
    let _ = scene.update_nodes().expect("flatten succeeds");

    for proxy in scene.node_proxies() {
        let key = scene
            .get_node_by_instance_id(proxy.instance_id)
            .expect("proxy references a live node");
        let node = scene.node(key).expect("live node");
        assert_eq!(proxy.world, node.world_transform());
        assert_eq!(Some(proxy.model_id), node.model_id());
    }
}

#[test]
fn rebuild_with_same_inputs_is_byte_identical() {
    let mut a = cornell_scene();
    let mut b = cornell_scene();
    a.tick(0.0);
    b.tick(0.0);
    let _ = a.update_nodes().expect("flatten succeeds");
    let _ = b.update_nodes().expect("flatten succeeds");

    assert_eq!(
        bytemuck::cast_slice::<_, u8>(a.node_proxies()),
        bytemuck::cast_slice::<_, u8>(b.node_proxies())
    );
    assert_eq!(
        bytemuck::cast_slice::<_, u8>(a.indirect_draws()),
        bytemuck::cast_slice::<_, u8>(b.indirect_draws())
    );
}

#[test]
fn instance_ids_are_stable_across_rebuilds() {
    let mut scene = cornell_scene();
    scene.tick(0.0);
    let key = scene.get_node("box1").expect("box1 exists");
    let id_before = scene.node(key).unwrap().instance_id();

    let (content, _) = create_cornell_box();
    scene.reload(content);
    let key = scene.get_node("box1").expect("box1 exists after reload");
    assert_eq!(scene.node(key).unwrap().instance_id(), id_before);
}

#[test]
fn reload_resets_selection() {
    let mut scene = cornell_scene();
    scene.set_selected_id(2);
    let (content, _) = create_cornell_box();
    scene.reload(content);
    assert_eq!(scene.selected_id(), SELECTED_NONE);
}

// ============================================================================
// Hierarchy
// ============================================================================

#[test]
fn world_transform_is_parent_times_local() {
    let mut scene = Scene::new();
    let parent = scene.add_node(Node::new(
        "parent",
        Vec3::new(1.0, 0.0, 0.0),
        Quat::IDENTITY,
        Vec3::ONE,
        None,
        0,
    ));
    let child = scene.add_child(
        parent,
        Node::new(
            "child",
            Vec3::new(0.0, 2.0, 0.0),
            Quat::IDENTITY,
            Vec3::ONE,
            None,
            1,
        ),
    );

    scene.tick(0.016);

    let child_world = scene.node(child).unwrap().world_transform();
    let expected = Mat4::from_translation(Vec3::new(1.0, 2.0, 0.0));
    assert!((child_world.w_axis - expected.w_axis).length() < 1e-5);

    let parent_world = scene.node(parent).unwrap().world_transform();
    let local = scene.node(child).unwrap().local_transform();
    let recomposed = parent_world * local;
    assert_eq!(child_world, recomposed);
}

#[test]
fn attach_reparents_in_two_steps() {
    let mut scene = Scene::new();
    let a = scene.add_node(Node::new(
        "a",
        Vec3::ZERO,
        Quat::IDENTITY,
        Vec3::ONE,
        None,
        0,
    ));
    let b = scene.add_node(Node::new(
        "b",
        Vec3::ZERO,
        Quat::IDENTITY,
        Vec3::ONE,
        None,
        1,
    ));
    let child = scene.add_node(Node::new(
        "child",
        Vec3::ZERO,
        Quat::IDENTITY,
        Vec3::ONE,
        None,
        2,
    ));

    scene.attach(child, a);
    assert_eq!(scene.node(child).unwrap().parent(), Some(a));
    assert!(scene.node(a).unwrap().children().contains(&child));

    scene.attach(child, b);
    assert!(!scene.node(a).unwrap().children().contains(&child));
    assert!(scene.node(b).unwrap().children().contains(&child));
}

#[test]
fn remove_node_removes_subtree() {
    let mut scene = Scene::new();
    let root = scene.add_node(Node::new(
        "root",
        Vec3::ZERO,
        Quat::IDENTITY,
        Vec3::ONE,
        None,
        0,
    ));
    let child = scene.add_child(
        root,
        Node::new("child", Vec3::ZERO, Quat::IDENTITY, Vec3::ONE, None, 1),
    );

    scene.remove_node(root);
    assert!(scene.node(root).is_none());
    assert!(scene.node(child).is_none());
    assert_eq!(scene.node_count(), 0);
}

// ============================================================================
// Previous-frame transforms & motion
// ============================================================================

#[test]
fn prev_transform_is_captured_before_mutation() {
    let mut scene = cornell_scene();
    scene.tick(0.016);

    let key = scene.get_node("box1").expect("box1 exists");
    let world_before = scene.node(key).unwrap().world_transform();

    scene
        .node_mut(key)
        .unwrap()
        .set_translation(Vec3::new(0.35, 0.5, 0.35));
    scene.tick(0.016);

    let node = scene.node(key).unwrap();
    assert_eq!(node.prev_world_transform(), world_before);
    assert_ne!(node.world_transform(), world_before);
}

#[test]
fn motion_keeps_scene_dirty_for_one_extra_frame() {
    let mut scene = cornell_scene();
    scene.tick(0.016);
    let _ = scene.update_nodes().expect("initial flatten");

    let key = scene.get_node("box1").expect("box1 exists");
    scene
        .node_mut(key)
        .unwrap()
        .set_translation(Vec3::new(0.35, 0.8, 0.35));

    scene.tick(0.016);
    assert!(scene.update_nodes().unwrap(), "moved frame rebuilds");

    scene.tick(0.016);
    assert!(
        scene.update_nodes().unwrap(),
        "frame after motion rebuilds once more so motion vectors settle"
    );

    scene.tick(0.016);
    assert!(!scene.update_nodes().unwrap(), "settled scene stops rebuilding");
}

// ============================================================================
// Bad references
// ============================================================================

#[test]
fn missing_model_reference_is_skipped() {
    let (mut content, _) = create_cornell_box();
    content.nodes.push({
        let mut desc = ember::scene::scene::NodeDesc::with_model("broken", 99, 77);
        desc.translation = Vec3::new(0.0, 0.5, 0.0);
        desc
    });

    let mut scene = Scene::new();
    scene.reload(content);
    scene.tick(0.016);

    assert!(scene.update_nodes().expect("flatten still succeeds"));
    assert_eq!(scene.node_proxies().len(), 3, "broken node contributes nothing");
}
