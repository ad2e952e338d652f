//! Animation Track Tests
//!
//! Tests for:
//! - Channel sampling: lerp, slerp, clamping, exact key boundaries
//! - Track playback: advance, wrap, play/stop
//! - Track application to named nodes through the scene tick

use glam::{Quat, Vec3};

use ember::Scene;
use ember::assets::cornell::create_cornell_box_animated;
use ember::scene::animation::{AnimationTrack, Channel, Keyframe};

fn vec_channel(pairs: &[(f32, Vec3)]) -> Channel<Vec3> {
    Channel::new(
        pairs
            .iter()
            .map(|&(time, value)| Keyframe { time, value })
            .collect(),
    )
}

// ============================================================================
// Channel sampling
// ============================================================================

#[test]
fn linear_channel_interpolates_between_keys() {
    let channel = vec_channel(&[(0.0, Vec3::ZERO), (2.0, Vec3::new(2.0, 0.0, 0.0))]);

    let mid = channel.sample(1.0).expect("sample");
    assert!((mid.x - 1.0).abs() < 1e-5);

    let quarter = channel.sample(0.5).expect("sample");
    assert!((quarter.x - 0.5).abs() < 1e-5);
}

#[test]
fn sampling_on_a_key_boundary_uses_weight_zero_or_one() {
    let channel = vec_channel(&[
        (0.0, Vec3::ZERO),
        (1.0, Vec3::new(10.0, 0.0, 0.0)),
        (2.0, Vec3::new(-4.0, 0.0, 0.0)),
    ]);

    // Exactly on the middle key: the key's own value, no blending.
    let exact = channel.sample(1.0).expect("sample");
    assert_eq!(exact, Vec3::new(10.0, 0.0, 0.0));

    let start = channel.sample(0.0).expect("sample");
    assert_eq!(start, Vec3::ZERO);
    let end = channel.sample(2.0).expect("sample");
    assert_eq!(end, Vec3::new(-4.0, 0.0, 0.0));
}

#[test]
fn sampling_clamps_outside_the_key_range() {
    let channel = vec_channel(&[(1.0, Vec3::X), (2.0, Vec3::Y)]);
    assert_eq!(channel.sample(0.0).expect("sample"), Vec3::X);
    assert_eq!(channel.sample(9.0).expect("sample"), Vec3::Y);
}

#[test]
fn empty_channel_samples_to_none() {
    let channel: Channel<Vec3> = Channel::default();
    assert!(channel.sample(0.5).is_none());
}

#[test]
fn rotation_channel_slerps() {
    let channel = Channel::new(vec![
        Keyframe {
            time: 0.0,
            value: Quat::IDENTITY,
        },
        Keyframe {
            time: 1.0,
            value: Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
        },
    ]);

    let half = channel.sample(0.5).expect("sample");
    let expected = Quat::from_rotation_y(std::f32::consts::FRAC_PI_4);
    assert!(half.angle_between(expected) < 1e-4);
}

// ============================================================================
// Track playback
// ============================================================================

#[test]
fn track_advance_wraps_at_duration() {
    let mut track = AnimationTrack::new(
        "node",
        vec_channel(&[(0.0, Vec3::ZERO), (2.0, Vec3::X)]),
        Channel::default(),
        Channel::default(),
    );
    assert!((track.duration() - 2.0).abs() < 1e-6);

    track.advance(1.0);
    assert_eq!(track.time(), 0.0, "stopped tracks do not advance");

    track.play();
    track.advance(1.5);
    assert!((track.time() - 1.5).abs() < 1e-5);
    track.advance(1.0);
    assert!((track.time() - 0.5).abs() < 1e-5, "time wraps at duration");

    track.stop();
    track.advance(1.0);
    assert!((track.time() - 0.5).abs() < 1e-5);
}

// ============================================================================
// Scene integration
// ============================================================================

#[test]
fn playing_tracks_move_their_named_nodes() {
    let (content, environment) = create_cornell_box_animated();
    let mut scene = Scene::new();
    scene.set_environment(environment);
    scene.reload(content);

    let key = scene.get_node("box1").expect("animated node exists");
    let before = scene.node(key).unwrap().translation();

    scene.play_all_tracks();
    scene.tick(1.0);

    let after = scene.node(key).unwrap().translation();
    assert!(
        (after.y - before.y).abs() > 0.1,
        "one second into the track the box has lifted"
    );

    // World transform follows the track application within the same tick.
    let world_y = scene.node(key).unwrap().world_transform().w_axis.y;
    assert!((world_y - after.y).abs() < 1e-5);
}

#[test]
fn stopped_tracks_leave_nodes_alone() {
    let (content, environment) = create_cornell_box_animated();
    let mut scene = Scene::new();
    scene.set_environment(environment);
    scene.reload(content);

    let key = scene.get_node("box1").expect("animated node exists");
    let before = scene.node(key).unwrap().translation();

    scene.tick(1.0);
    assert_eq!(scene.node(key).unwrap().translation(), before);
}
