//! Built-in procedural scenes.
//!
//! The Cornell box is the engine's smoke-test scene: one room model with
//! coloured walls and a ceiling light section, one shared box model placed
//! twice, a single quad area light and an interior camera.

use glam::{Quat, Vec2, Vec3};

use crate::scene::animation::AnimationTrack;
use crate::scene::camera::Camera;
use crate::scene::environment::Environment;
use crate::scene::light::QuadLight;
use crate::scene::material::Material;
use crate::scene::model::{Model, Vertex};
use crate::scene::scene::{NodeDesc, SceneContent};

/// Room half-extent in X/Z; the room spans `[-1, 1] x [0, 2] x [-1, 1]`.
const ROOM_HALF: f32 = 1.0;
const ROOM_HEIGHT: f32 = 2.0;
const LIGHT_HALF: f32 = 0.25;
const LIGHT_Y: f32 = ROOM_HEIGHT - 0.01;

/// Material slots of the Cornell scene.
const MAT_WHITE: u32 = 0;
const MAT_RED: u32 = 1;
const MAT_GREEN: u32 = 2;
const MAT_LIGHT: u32 = 3;

fn quad(
    vertices: &mut Vec<Vertex>,
    indices: &mut Vec<u32>,
    corners: [Vec3; 4],
    normal: Vec3,
    section: u32,
) {
    let base = vertices.len() as u32;
    let uvs = [
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(0.0, 1.0),
    ];
    for (corner, uv) in corners.into_iter().zip(uvs) {
        vertices.push(Vertex::new(corner, normal, uv, section));
    }
    indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
}

/// The room interior: five walls plus the ceiling light quad, normals
/// pointing inward. Sections: white, red, green, light.
fn cornell_room_model() -> Model {
    let h = ROOM_HALF;
    let top = ROOM_HEIGHT;
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    // Floor (+Y up).
    quad(
        &mut vertices,
        &mut indices,
        [
            Vec3::new(-h, 0.0, -h),
            Vec3::new(h, 0.0, -h),
            Vec3::new(h, 0.0, h),
            Vec3::new(-h, 0.0, h),
        ],
        Vec3::Y,
        MAT_WHITE,
    );
    // Ceiling (-Y down).
    quad(
        &mut vertices,
        &mut indices,
        [
            Vec3::new(-h, top, h),
            Vec3::new(h, top, h),
            Vec3::new(h, top, -h),
            Vec3::new(-h, top, -h),
        ],
        Vec3::NEG_Y,
        MAT_WHITE,
    );
    // Back wall (+Z toward the camera).
    quad(
        &mut vertices,
        &mut indices,
        [
            Vec3::new(-h, 0.0, -h),
            Vec3::new(-h, top, -h),
            Vec3::new(h, top, -h),
            Vec3::new(h, 0.0, -h),
        ],
        Vec3::Z,
        MAT_WHITE,
    );
    // Left wall, red (+X inward).
    quad(
        &mut vertices,
        &mut indices,
        [
            Vec3::new(-h, 0.0, h),
            Vec3::new(-h, top, h),
            Vec3::new(-h, top, -h),
            Vec3::new(-h, 0.0, -h),
        ],
        Vec3::X,
        MAT_RED,
    );
    // Right wall, green (-X inward).
    quad(
        &mut vertices,
        &mut indices,
        [
            Vec3::new(h, 0.0, -h),
            Vec3::new(h, top, -h),
            Vec3::new(h, top, h),
            Vec3::new(h, 0.0, h),
        ],
        Vec3::NEG_X,
        MAT_GREEN,
    );
    // Ceiling light quad (facing down).
    quad(
        &mut vertices,
        &mut indices,
        [
            Vec3::new(-LIGHT_HALF, LIGHT_Y, LIGHT_HALF),
            Vec3::new(LIGHT_HALF, LIGHT_Y, LIGHT_HALF),
            Vec3::new(LIGHT_HALF, LIGHT_Y, -LIGHT_HALF),
            Vec3::new(-LIGHT_HALF, LIGHT_Y, -LIGHT_HALF),
        ],
        Vec3::NEG_Y,
        MAT_LIGHT,
    );

    let mut model = Model::new(
        vertices,
        indices,
        vec![MAT_WHITE, MAT_RED, MAT_GREEN, MAT_LIGHT],
    );
    model.generate_tangents();
    model
}

/// The classic Cornell box: room + two boxes, one area light, one camera.
#[must_use]
pub fn create_cornell_box() -> (SceneContent, Environment) {
    let room = cornell_room_model();
    let mut unit_box = Model::create_box(
        Vec3::new(-0.5, 0.0, -0.5),
        Vec3::new(0.5, 1.0, 0.5),
        MAT_WHITE,
    );
    unit_box.generate_tangents();

    let materials = vec![
        Material::lambertian(Vec3::new(0.73, 0.73, 0.73)),
        Material::lambertian(Vec3::new(0.65, 0.05, 0.05)),
        Material::lambertian(Vec3::new(0.12, 0.45, 0.15)),
        Material::diffuse_light(Vec3::new(15.0, 15.0, 15.0)),
    ];

    let lights = vec![QuadLight::new(
        Vec3::new(-LIGHT_HALF, LIGHT_Y, -LIGHT_HALF),
        Vec3::new(LIGHT_HALF, LIGHT_Y, -LIGHT_HALF),
        Vec3::new(-LIGHT_HALF, LIGHT_Y, LIGHT_HALF),
        MAT_LIGHT,
    )];

    let mut tall = NodeDesc::with_model("box0", 1, 1);
    tall.translation = Vec3::new(-0.35, 0.0, -0.3);
    tall.rotation = Quat::from_rotation_y(0.3);
    tall.scale = Vec3::new(0.55, 1.2, 0.55);

    let mut short = NodeDesc::with_model("box1", 1, 2);
    short.translation = Vec3::new(0.35, 0.0, 0.35);
    short.rotation = Quat::from_rotation_y(-0.25);
    short.scale = Vec3::new(0.55, 0.55, 0.55);

    let content = SceneContent {
        nodes: vec![NodeDesc::with_model("cornellbox", 0, 0), tall, short],
        models: vec![room, unit_box],
        materials,
        lights,
        tracks: Vec::new(),
    };

    let mut environment = Environment::new();
    environment.has_sky = false;
    environment.has_sun = false;
    environment.cameras = vec![{
        let mut camera = Camera::looking_at(
            "interior",
            Vec3::new(0.0, 1.0, 3.4),
            Vec3::new(0.0, 1.0, 0.0),
        );
        camera.field_of_view = 40.0;
        camera
    }];

    (content, environment)
}

/// A variant with an animated box, exercising track playback.
#[must_use]
pub fn create_cornell_box_animated() -> (SceneContent, Environment) {
    use crate::scene::animation::{Channel, Keyframe};

    let (mut content, environment) = create_cornell_box();

    let translation = Channel::new(vec![
        Keyframe {
            time: 0.0,
            value: Vec3::new(0.35, 0.0, 0.35),
        },
        Keyframe {
            time: 2.0,
            value: Vec3::new(0.35, 0.6, 0.35),
        },
        Keyframe {
            time: 4.0,
            value: Vec3::new(0.35, 0.0, 0.35),
        },
    ]);
    content.tracks.push(AnimationTrack::new(
        "box1",
        translation,
        Channel::default(),
        Channel::default(),
    ));

    (content, environment)
}
