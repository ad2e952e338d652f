//! glTF scene import.
//!
//! Consumes `.glb` / `.gltf` (embedded or external buffers). Triangle
//! primitives with POSITION / NORMAL / TEXCOORD_0 / TANGENT are supported;
//! tangents are generated when the source lacks them. Honoured extensions:
//! `KHR_materials_ior`, `KHR_materials_transmission` (factor > 0.8 turns
//! the material Dielectric) and `KHR_materials_emissive_strength`. Scene
//! `extras` drive the environment; a node `extras.arealight` promotes the
//! node's mesh footprint to a quad area light; file cameras become the
//! scene camera list.

use std::path::Path;

use glam::{Mat4, Quat, Vec2, Vec3};

use crate::errors::Result;
use crate::scene::animation::{AnimationTrack, Channel, Keyframe};
use crate::scene::camera::Camera;
use crate::scene::environment::Environment;
use crate::scene::light::QuadLight;
use crate::scene::material::{Material, MaterialFeatures, MaterialModel};
use crate::scene::model::{Model, Vertex};
use crate::scene::scene::{NodeDesc, SceneContent};

/// Transmission above this threshold makes a material Dielectric.
const TRANSMISSION_DIELECTRIC: f32 = 0.8;

fn extras_value(extras: &gltf::json::Extras) -> Option<serde_json::Value> {
    extras
        .as_ref()
        .and_then(|raw| serde_json::from_str(raw.get()).ok())
}

fn extras_f32(value: &Option<serde_json::Value>, key: &str) -> Option<f32> {
    value.as_ref()?.get(key)?.as_f64().map(|v| v as f32)
}

fn extras_bool(value: &Option<serde_json::Value>, key: &str) -> Option<bool> {
    let v = value.as_ref()?.get(key)?;
    v.as_bool().or_else(|| v.as_i64().map(|i| i != 0))
}

fn convert_material(material: &gltf::Material) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let base = pbr.base_color_factor();
    let extras = extras_value(material.extras());

    let transmission = material
        .transmission()
        .map_or(0.0, |t| t.transmission_factor());
    let ior = material.ior().unwrap_or(1.45);
    let emissive_strength = material.emissive_strength().unwrap_or(1.0);
    let emissive = Vec3::from(material.emissive_factor()) * emissive_strength;

    let mut out = if emissive.max_element() > 0.0 {
        Material::diffuse_light(emissive)
    } else if transmission > TRANSMISSION_DIELECTRIC {
        Material::dielectric(ior, pbr.roughness_factor())
    } else if pbr.metallic_factor() > 0.5 {
        Material::metallic(Vec3::new(base[0], base[1], base[2]), pbr.roughness_factor())
    } else {
        let mut mat = Material::lambertian(Vec3::new(base[0], base[1], base[2]));
        mat.fuzziness = pbr.roughness_factor();
        mat
    };

    out.diffuse.w = base[3];
    out.metalness = pbr.metallic_factor();
    out.refraction_index = ior;
    out.refraction_index2 = extras_f32(&extras, "ior2").unwrap_or(ior);

    if let Some(info) = pbr.base_color_texture() {
        out.diffuse_texture_id = info.texture().index() as i32;
    }
    if let Some(normal) = material.normal_texture() {
        out.normal_texture_id = normal.texture().index() as i32;
        out.normal_scale = normal.scale();
    }
    if let Some(info) = pbr.metallic_roughness_texture() {
        out.mra_texture_id = info.texture().index() as i32;
    }

    out
}

fn convert_mesh(mesh: &gltf::Mesh, buffers: &[gltf::buffer::Data]) -> Model {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    let mut section_materials = Vec::new();
    let mut needs_tangents = false;

    for primitive in mesh.primitives() {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            log::warn!("skipping non-triangle primitive in mesh '{:?}'", mesh.name());
            continue;
        }

        let section = section_materials.len() as u32;
        section_materials.push(primitive.material().index().unwrap_or(0) as u32);

        let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()][..]));
        let Some(positions) = reader.read_positions() else {
            continue;
        };
        let positions: Vec<[f32; 3]> = positions.collect();
        let normals: Vec<[f32; 3]> = reader
            .read_normals()
            .map(Iterator::collect)
            .unwrap_or_default();
        let uvs: Vec<[f32; 2]> = reader
            .read_tex_coords(0)
            .map(|t| t.into_f32().collect())
            .unwrap_or_default();
        let tangents: Vec<[f32; 4]> = reader
            .read_tangents()
            .map(Iterator::collect)
            .unwrap_or_default();
        if tangents.is_empty() {
            needs_tangents = true;
        }

        let base_vertex = vertices.len() as u32;
        for (i, position) in positions.iter().enumerate() {
            let normal = normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]);
            let uv = uvs.get(i).copied().unwrap_or([0.0, 0.0]);
            let mut vertex = Vertex::new(
                Vec3::from(*position),
                Vec3::from(normal),
                Vec2::from(uv),
                section,
            );
            if let Some(tangent) = tangents.get(i) {
                vertex.tangent = (*tangent).into();
            }
            vertices.push(vertex);
        }

        match reader.read_indices() {
            Some(read) => {
                indices.extend(read.into_u32().map(|i| i + base_vertex));
            }
            None => {
                indices.extend(base_vertex..base_vertex + positions.len() as u32);
            }
        }
    }

    let mut model = Model::new(vertices, indices, section_materials);
    if needs_tangents {
        model.generate_tangents();
    }
    model
}

fn apply_scene_extras(env: &mut Environment, extras: &Option<serde_json::Value>) {
    if let Some(idx) = extras_f32(extras, "SkyIdx") {
        env.sky_idx = idx as i32;
    }
    if let Some(intensity) = extras_f32(extras, "SkyIntensity") {
        env.sky_intensity = intensity;
    }
    if let Some(rotation) = extras_f32(extras, "SkyRotation") {
        env.sky_rotation = rotation;
    }
    if let Some(intensity) = extras_f32(extras, "SunIntensity") {
        env.sun_intensity = intensity;
    }
    if let Some(rotation) = extras_f32(extras, "SunRotation") {
        env.sun_rotation = rotation;
    }
    if let Some(with_sun) = extras_bool(extras, "WithSun") {
        env.has_sun = with_sun;
    }
    if let Some(speed) = extras_f32(extras, "CamSpeed") {
        env.control_speed = speed;
    }
    if extras_bool(extras, "NoSky") == Some(true) {
        env.has_sky = false;
    }
}

/// Promotes a node with `extras.arealight` to a quad area light spanning
/// the top face of its mesh AABB, normal along world +Y.
fn promote_area_light(
    node_world: Mat4,
    model: &Model,
    material_index: u32,
) -> QuadLight {
    let (min, max) = model.aabb();
    let p0 = node_world.transform_point3(Vec3::new(min.x, max.y, min.z));
    let p1 = node_world.transform_point3(Vec3::new(max.x, max.y, min.z));
    let p3 = node_world.transform_point3(Vec3::new(min.x, max.y, max.z));
    QuadLight::new(p0, p1, p3, material_index)
}

fn read_animations(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
) -> Vec<AnimationTrack> {
    let mut tracks: Vec<AnimationTrack> = Vec::new();

    for animation in document.animations() {
        for channel in animation.channels() {
            let target = channel.target();
            let node_name = target
                .node()
                .name()
                .map_or_else(|| format!("node_{}", target.node().index()), String::from);

            let reader = channel.reader(|buffer| Some(&buffers[buffer.index()][..]));
            let Some(inputs) = reader.read_inputs() else {
                continue;
            };
            let times: Vec<f32> = inputs.collect();
            let Some(outputs) = reader.read_outputs() else {
                continue;
            };

            let position = tracks.iter().position(|t| t.node_name == node_name);
            let mut track = match position {
                Some(i) => tracks.remove(i),
                None => AnimationTrack::default(),
            };
            track.node_name = node_name;

            use gltf::animation::util::ReadOutputs;
            match outputs {
                ReadOutputs::Translations(values) => {
                    track.translation = Channel::new(
                        times
                            .iter()
                            .zip(values)
                            .map(|(&time, v)| Keyframe {
                                time,
                                value: Vec3::from(v),
                            })
                            .collect(),
                    );
                }
                ReadOutputs::Rotations(values) => {
                    track.rotation = Channel::new(
                        times
                            .iter()
                            .zip(values.into_f32())
                            .map(|(&time, v)| Keyframe {
                                time,
                                value: Quat::from_array(v),
                            })
                            .collect(),
                    );
                }
                ReadOutputs::Scales(values) => {
                    track.scale = Channel::new(
                        times
                            .iter()
                            .zip(values)
                            .map(|(&time, v)| Keyframe {
                                time,
                                value: Vec3::from(v),
                            })
                            .collect(),
                    );
                }
                ReadOutputs::MorphTargetWeights(_) => {}
            }
            tracks.push(track);
        }
    }

    // Rebuild so durations cover every channel.
    tracks
        .into_iter()
        .map(|t| AnimationTrack::new(t.node_name.clone(), t.translation, t.rotation, t.scale))
        .collect()
}

/// Loads a glTF file into scene content plus environment settings.
pub fn load_gltf_scene(path: &Path) -> Result<(SceneContent, Environment)> {
    let (document, buffers, _images) = gltf::import(path)?;

    let materials: Vec<Material> = document.materials().map(|m| convert_material(&m)).collect();
    let materials = if materials.is_empty() {
        vec![Material::default()]
    } else {
        materials
    };

    let textured = materials
        .iter()
        .filter(|m| m.get_features().intersects(MaterialFeatures::USE_MAP))
        .count();
    log::debug!(
        "imported {} materials ({textured} textured)",
        materials.len()
    );

    let models: Vec<Model> = document
        .meshes()
        .map(|mesh| convert_mesh(&mesh, &buffers))
        .collect();

    let mut environment = Environment::new();
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next());
    if let Some(scene) = &scene {
        apply_scene_extras(&mut environment, &extras_value(scene.extras()));
    }

    let mut nodes = Vec::new();
    let mut lights = Vec::new();
    let mut instance_id = 0u32;

    if let Some(scene) = &scene {
        let mut stack: Vec<(gltf::Node, Option<usize>, Mat4)> = scene
            .nodes()
            .map(|node| (node, None, Mat4::IDENTITY))
            .collect();

        while let Some((node, parent, parent_world)) = stack.pop() {
            let (translation, rotation, scale) = node.transform().decomposed();
            let translation = Vec3::from(translation);
            let rotation = Quat::from_array(rotation);
            let scale = Vec3::from(scale);
            let world = parent_world
                * Mat4::from_scale_rotation_translation(scale, rotation, translation);

            let name = node
                .name()
                .map_or_else(|| format!("node_{}", node.index()), String::from);
            let extras = extras_value(node.extras());
            let model_id = node.mesh().map(|mesh| mesh.index() as u32);

            if let Some(camera) = node.camera() {
                if let gltf::camera::Projection::Perspective(perspective) =
                    camera.projection()
                {
                    let mut cam = Camera::new(camera.name().unwrap_or(name.as_str()));
                    cam.model_view = world.inverse();
                    cam.field_of_view = perspective.yfov().to_degrees();
                    if let Some(aperture) = extras_f32(&extras, "F-Stop") {
                        cam.aperture = aperture;
                    }
                    if let Some(focus) = extras_f32(&extras, "FocalDistance") {
                        cam.focal_distance = focus;
                    }
                    environment.cameras.push(cam);
                }
            }

            if extras_bool(&extras, "arealight") == Some(true) {
                if let Some(model_id) = model_id {
                    if let Some(model) = models.get(model_id as usize) {
                        let material_index =
                            model.section_materials().first().copied().unwrap_or(0);
                        lights.push(promote_area_light(world, model, material_index));
                    }
                }
            }

            let node_index = nodes.len();
            nodes.push(NodeDesc {
                name,
                translation,
                rotation,
                scale,
                model_id,
                materials: model_id
                    .and_then(|id| models.get(id as usize))
                    .map(|m| m.section_materials().to_vec())
                    .unwrap_or_default(),
                visible: true,
                parent,
                instance_id,
            });
            instance_id += 1;

            for child in node.children() {
                stack.push((child, Some(node_index), world));
            }
        }
    }

    if environment.cameras.is_empty() {
        environment.cameras.push(Camera::looking_at(
            "auto",
            Vec3::new(0.0, 1.0, 5.0),
            Vec3::ZERO,
        ));
    }

    // Emissive materials referenced by promoted lights stay emissive even
    // if the exporter tagged them Lambertian.
    for light in &lights {
        if let Some(material) = materials.get(light.material_index as usize) {
            if material.model() != MaterialModel::DiffuseLight {
                log::debug!(
                    "area-light material {} is not emissive",
                    light.material_index
                );
            }
        }
    }

    let tracks = read_animations(&document, &buffers);

    Ok((
        SceneContent {
            nodes,
            models,
            materials,
            lights,
            tracks,
        },
        environment,
    ))
}
