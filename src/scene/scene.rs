//! The scene: node hierarchy, resources, animation playback, and the
//! flattened per-frame arrays consumed by the GPU assembly.

use glam::{Mat4, Quat, Vec3};
use slotmap::SlotMap;

use crate::errors::{EmberError, Result};
use crate::render::uniforms::{IndirectDrawCommand, MAX_NODES, NodeProxy};
use crate::scene::NodeKey;
use crate::scene::animation::AnimationTrack;
use crate::scene::camera::Camera;
use crate::scene::environment::Environment;
use crate::scene::light::QuadLight;
use crate::scene::material::Material;
use crate::scene::model::Model;
use crate::scene::node::Node;

/// Sentinel for "nothing selected".
pub const SELECTED_NONE: u32 = u32::MAX;

/// Movement threshold above which a node keeps the scene dirty so the next
/// frame rebuilds the proxies again (motion-vector continuity).
const MOTION_EPSILON: f32 = 0.01;

/// Flat description of one node as produced by the loaders. `parent` is an
/// index into the same list and must precede the child.
#[derive(Clone, Debug)]
pub struct NodeDesc {
    pub name: String,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub model_id: Option<u32>,
    pub materials: Vec<u32>,
    pub visible: bool,
    pub parent: Option<usize>,
    pub instance_id: u32,
}

impl NodeDesc {
    #[must_use]
    pub fn with_model(name: impl Into<String>, model_id: u32, instance_id: u32) -> Self {
        Self {
            name: name.into(),
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            model_id: Some(model_id),
            materials: Vec::new(),
            visible: true,
            parent: None,
            instance_id,
        }
    }
}

/// Everything a scene load produces, ready to swap into the live scene.
#[derive(Clone, Debug, Default)]
pub struct SceneContent {
    pub nodes: Vec<NodeDesc>,
    pub models: Vec<Model>,
    pub materials: Vec<Material>,
    pub lights: Vec<QuadLight>,
    pub tracks: Vec<AnimationTrack>,
}

fn max_abs_diff(a: &Mat4, b: &Mat4) -> f32 {
    a.to_cols_array()
        .iter()
        .zip(b.to_cols_array().iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max)
}

/// The scene graph and resource tables.
pub struct Scene {
    nodes: SlotMap<NodeKey, Node>,
    root_nodes: Vec<NodeKey>,

    models: Vec<Model>,
    materials: Vec<Material>,
    lights: Vec<QuadLight>,
    tracks: Vec<AnimationTrack>,

    environment: Environment,
    render_camera: Camera,

    selected_id: u32,
    dirty: bool,
    env_dirty: bool,
    warned_bad_model: bool,

    node_proxies: Vec<NodeProxy>,
    indirect_draws: Vec<IndirectDrawCommand>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            root_nodes: Vec::new(),
            models: Vec::new(),
            materials: Vec::new(),
            lights: Vec::new(),
            tracks: Vec::new(),
            environment: Environment::new(),
            render_camera: Camera::default(),
            selected_id: SELECTED_NONE,
            dirty: true,
            env_dirty: true,
            warned_bad_model: false,
            node_proxies: Vec::new(),
            indirect_draws: Vec::new(),
        }
    }

    // ========================================================================
    // Content lifecycle
    // ========================================================================

    /// Replaces all scene content, resets the selection and marks the scene
    /// dirty. Material-override lists longer than the model's section count
    /// are truncated.
    pub fn reload(&mut self, content: SceneContent) {
        self.nodes.clear();
        self.root_nodes.clear();

        self.models = content.models;
        self.materials = content.materials;
        self.lights = content.lights;
        self.tracks = content.tracks;

        let mut keys = Vec::with_capacity(content.nodes.len());
        for desc in content.nodes {
            let mut node = Node::new(
                desc.name,
                desc.translation,
                desc.rotation,
                desc.scale,
                desc.model_id,
                desc.instance_id,
            );
            node.set_visible(desc.visible);

            let mut overrides = desc.materials;
            if let Some(model_id) = desc.model_id {
                if let Some(model) = self.models.get(model_id as usize) {
                    if overrides.len() > model.section_count() {
                        overrides.truncate(model.section_count());
                    }
                }
            }
            node.set_materials(&overrides);

            let parent_key = desc.parent.and_then(|i: usize| keys.get(i).copied());
            let key = self.nodes.insert(node);
            keys.push(key);

            if let Some(parent_key) = parent_key {
                self.nodes[key].parent = Some(parent_key);
                self.nodes[parent_key].children.push(key);
            } else {
                self.root_nodes.push(key);
            }
        }

        self.selected_id = SELECTED_NONE;
        self.dirty = true;
        self.env_dirty = true;
        self.warned_bad_model = false;

        self.recompute_transforms();
        // A fresh load has no motion history.
        for (_, node) in &mut self.nodes {
            node.prev_world_transform = node.world_transform;
        }
    }

    // ========================================================================
    // Node management
    // ========================================================================

    /// Inserts a node at the scene root.
    pub fn add_node(&mut self, node: Node) -> NodeKey {
        let key = self.nodes.insert(node);
        self.root_nodes.push(key);
        self.dirty = true;
        key
    }

    /// Inserts a node as a child of `parent`.
    pub fn add_child(&mut self, parent: NodeKey, node: Node) -> NodeKey {
        let key = self.nodes.insert(node);
        if self.nodes.contains_key(parent) {
            self.nodes[key].parent = Some(parent);
            self.nodes[parent].children.push(key);
        } else {
            log::error!("add_child: parent not found, inserting at root");
            self.root_nodes.push(key);
        }
        self.dirty = true;
        key
    }

    /// Re-parents `child` under `parent`. Detachment is two-step: remove
    /// from the old parent's child set, then rewrite the parent link.
    pub fn attach(&mut self, child: NodeKey, parent: NodeKey) {
        if child == parent {
            log::warn!("cannot attach a node to itself");
            return;
        }
        if !self.nodes.contains_key(child) || !self.nodes.contains_key(parent) {
            return;
        }

        match self.nodes[child].parent {
            Some(old_parent) => {
                if let Some(node) = self.nodes.get_mut(old_parent) {
                    node.children.retain(|&k| k != child);
                }
            }
            None => self.root_nodes.retain(|&k| k != child),
        }

        self.nodes[parent].children.push(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[child].local_dirty = true;
        self.dirty = true;
    }

    /// Removes a node and its whole subtree.
    pub fn remove_node(&mut self, key: NodeKey) {
        let Some(node) = self.nodes.get(key) else {
            return;
        };
        let parent = node.parent;

        let mut to_remove = Vec::new();
        let mut stack = vec![key];
        while let Some(k) = stack.pop() {
            to_remove.push(k);
            if let Some(n) = self.nodes.get(k) {
                stack.extend_from_slice(&n.children);
            }
        }

        match parent {
            Some(parent) => {
                if let Some(p) = self.nodes.get_mut(parent) {
                    p.children.retain(|&k| k != key);
                }
            }
            None => self.root_nodes.retain(|&k| k != key),
        }

        for k in to_remove {
            self.nodes.remove(k);
        }
        self.dirty = true;
    }

    #[must_use]
    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.dirty = true;
        self.nodes.get_mut(key)
    }

    /// Name lookup; O(N) is acceptable here.
    #[must_use]
    pub fn get_node(&self, name: &str) -> Option<NodeKey> {
        self.nodes
            .iter()
            .find(|(_, node)| node.name() == name)
            .map(|(key, _)| key)
    }

    #[must_use]
    pub fn get_node_by_instance_id(&self, id: u32) -> Option<NodeKey> {
        self.nodes
            .iter()
            .find(|(_, node)| node.instance_id() == id)
            .map(|(key, _)| key)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeKey, &Node)> {
        self.nodes.iter()
    }

    // ========================================================================
    // Per-frame update
    // ========================================================================

    /// Advances animation tracks and recomputes world transforms top-down.
    /// Previous-frame transforms are captured exactly once, before any
    /// mutation.
    pub fn tick(&mut self, dt: f32) {
        for (_, node) in &mut self.nodes {
            node.prev_world_transform = node.world_transform;
        }

        let mut applications: Vec<(NodeKey, Option<Vec3>, Option<Quat>, Option<Vec3>)> =
            Vec::new();
        for track in &mut self.tracks {
            if !track.playing() {
                continue;
            }
            track.advance(dt);
            let (t, r, s) = track.sample();
            if let Some(key) = self
                .nodes
                .iter()
                .find(|(_, node)| node.name() == track.node_name)
                .map(|(key, _)| key)
            {
                applications.push((key, t, r, s));
            }
        }
        for (key, t, r, s) in applications {
            if let Some(node) = self.nodes.get_mut(key) {
                if let Some(t) = t {
                    node.set_translation(t);
                }
                if let Some(r) = r {
                    node.set_rotation(r);
                }
                if let Some(s) = s {
                    node.set_scale(s);
                }
            }
        }

        self.recompute_transforms();
    }

    /// Top-down world-transform recompute over an explicit stack; avoids
    /// deep recursion and repeated arena lookups.
    fn recompute_transforms(&mut self) {
        let mut stack: Vec<(NodeKey, Mat4, bool)> = Vec::with_capacity(64);
        for &root in self.root_nodes.iter().rev() {
            stack.push((root, Mat4::IDENTITY, false));
        }

        while let Some((key, parent_world, parent_changed)) = stack.pop() {
            let (world, changed) = {
                let Some(node) = self.nodes.get_mut(key) else {
                    continue;
                };
                let local_changed = node.recalc_local();
                let needs_update = local_changed || parent_changed;
                if needs_update {
                    node.world_transform = parent_world * node.local_transform;
                }
                (node.world_transform, needs_update)
            };

            if changed {
                self.dirty = true;
            }

            if let Some(node) = self.nodes.get(key) {
                for &child in node.children.iter().rev() {
                    stack.push((child, world, changed));
                }
            }
        }
    }

    /// Regenerates the flat proxy and indirect-draw arrays, grouped by
    /// model id so every model's instances are contiguous. Returns true iff
    /// the arrays were rebuilt this frame.
    ///
    /// A node that moved more than an epsilon since the previous frame
    /// keeps the scene dirty, so the following frame rebuilds again and
    /// motion vectors stay continuous.
    pub fn update_nodes(&mut self) -> Result<bool> {
        if !self.dirty || self.nodes.is_empty() {
            return Ok(false);
        }
        self.dirty = false;

        // Out-of-range model references are skipped below; log them once.
        if !self.warned_bad_model {
            for (_, node) in &self.nodes {
                if let Some(model_id) = node.model_id() {
                    if model_id as usize >= self.models.len() && node.visible() {
                        log::warn!(
                            "node '{}' references missing model {model_id}",
                            node.name()
                        );
                        self.warned_bad_model = true;
                    }
                }
            }
        }

        self.node_proxies.clear();
        self.indirect_draws.clear();

        let mut index_offset = 0u32;
        let mut vertex_offset = 0i32;
        let mut first_instance = 0u32;

        for (model_id, model) in self.models.iter().enumerate() {
            let mut instance_count = 0u32;
            for (_, node) in &self.nodes {
                if node.model_id() != Some(model_id as u32) || !node.visible() {
                    continue;
                }

                if max_abs_diff(&node.world_transform, &node.prev_world_transform)
                    > MOTION_EPSILON
                {
                    self.dirty = true;
                }

                let mut material_ids = [0u32; 16];
                for (slot, id) in material_ids.iter_mut().enumerate() {
                    *id = node
                        .materials()
                        .get(slot)
                        .or_else(|| model.section_materials().get(slot))
                        .copied()
                        .unwrap_or(0);
                }

                self.node_proxies.push(NodeProxy {
                    instance_id: node.instance_id(),
                    model_id: model_id as u32,
                    reserved0: 0,
                    reserved1: 0,
                    world: node.world_transform,
                    prev_world: node.prev_world_transform,
                    material_ids,
                });
                instance_count += 1;
            }

            self.indirect_draws.push(IndirectDrawCommand {
                index_count: model.index_count(),
                instance_count,
                first_index: index_offset,
                vertex_offset,
                first_instance,
            });

            index_offset += model.index_count();
            vertex_offset += model.vertex_count() as i32;
            first_instance += instance_count;
        }

        if self.node_proxies.len() > MAX_NODES {
            return Err(EmberError::Capacity {
                context: "node proxy buffer",
                requested: self.node_proxies.len(),
                capacity: MAX_NODES,
            });
        }

        Ok(true)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn node_proxies(&self) -> &[NodeProxy] {
        &self.node_proxies
    }

    #[must_use]
    pub fn indirect_draws(&self) -> &[IndirectDrawCommand] {
        &self.indirect_draws
    }

    #[must_use]
    pub fn indirect_draw_batch_count(&self) -> u32 {
        self.indirect_draws.len() as u32
    }

    #[must_use]
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    #[must_use]
    pub fn model(&self, id: u32) -> Option<&Model> {
        self.models.get(id as usize)
    }

    #[must_use]
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    #[must_use]
    pub fn material(&self, id: u32) -> Option<&Material> {
        self.materials.get(id as usize)
    }

    #[must_use]
    pub fn lights(&self) -> &[QuadLight] {
        &self.lights
    }

    #[must_use]
    pub fn light_count(&self) -> u32 {
        self.lights.len() as u32
    }

    #[must_use]
    pub fn tracks(&self) -> &[AnimationTrack] {
        &self.tracks
    }

    pub fn tracks_mut(&mut self) -> &mut [AnimationTrack] {
        &mut self.tracks
    }

    pub fn play_all_tracks(&mut self) {
        for track in &mut self.tracks {
            track.play();
        }
    }

    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    pub fn set_environment(&mut self, environment: Environment) {
        self.environment = environment;
    }

    #[must_use]
    pub fn render_camera(&self) -> &Camera {
        &self.render_camera
    }

    pub fn set_render_camera(&mut self, camera: Camera) {
        self.render_camera = camera;
    }

    #[must_use]
    pub fn selected_id(&self) -> u32 {
        self.selected_id
    }

    pub fn set_selected_id(&mut self, id: u32) {
        self.selected_id = id;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Flags the environment as changed so global illumination rebakes.
    pub fn mark_env_dirty(&mut self) {
        self.env_dirty = true;
    }

    /// Consumes the environment-dirty flag.
    pub fn take_env_dirty(&mut self) -> bool {
        std::mem::take(&mut self.env_dirty)
    }
}
