//! Scene nodes.
//!
//! A node is one placement of a model. Nodes live in the scene's arena and
//! reference each other through generational [`NodeKey`]s, so a stale handle
//! can never resurrect a recycled slot. Parent links are plain keys (weak);
//! child lists own the subtree.

use glam::{Mat4, Quat, Vec3};
use smallvec::SmallVec;

use crate::scene::NodeKey;

/// Upper bound on per-section material overrides, matching the GPU proxy.
pub const MAX_MATERIAL_SLOTS: usize = 16;

/// One placement of a model in the scene.
///
/// Transform setters only record the new TRS values; callers batch their
/// edits and the scene recomputes local and world matrices top-down during
/// its tick. The previous-frame world transform is captured exactly once
/// per tick, before any mutation, and feeds motion vectors.
#[derive(Clone, Debug)]
pub struct Node {
    name: String,
    /// Stable id, unique within the scene and preserved across rebuilds.
    instance_id: u32,
    /// Index into the scene model table, `None` for pure transform nodes.
    model_id: Option<u32>,

    translation: Vec3,
    rotation: Quat,
    scale: Vec3,

    /// Per-section material overrides, at most [`MAX_MATERIAL_SLOTS`].
    materials: SmallVec<[u32; MAX_MATERIAL_SLOTS]>,
    visible: bool,

    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: Vec<NodeKey>,

    pub(crate) local_transform: Mat4,
    pub(crate) world_transform: Mat4,
    pub(crate) prev_world_transform: Mat4,
    pub(crate) local_dirty: bool,
}

impl Node {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        translation: Vec3,
        rotation: Quat,
        scale: Vec3,
        model_id: Option<u32>,
        instance_id: u32,
    ) -> Self {
        let local =
            Mat4::from_scale_rotation_translation(scale, rotation, translation);
        Self {
            name: name.into(),
            instance_id,
            model_id,
            translation,
            rotation,
            scale,
            materials: SmallVec::new(),
            visible: true,
            parent: None,
            children: Vec::new(),
            local_transform: local,
            world_transform: local,
            prev_world_transform: local,
            local_dirty: true,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    #[must_use]
    pub fn model_id(&self) -> Option<u32> {
        self.model_id
    }

    pub fn set_model_id(&mut self, model_id: Option<u32>) {
        self.model_id = model_id;
    }

    #[must_use]
    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    #[must_use]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    #[must_use]
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Records a new translation. The local matrix is recomputed by the
    /// next scene tick (or an explicit [`recalc_local`](Self::recalc_local)).
    pub fn set_translation(&mut self, translation: Vec3) {
        self.translation = translation;
        self.local_dirty = true;
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.local_dirty = true;
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.local_dirty = true;
    }

    #[must_use]
    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    #[must_use]
    pub fn materials(&self) -> &[u32] {
        &self.materials
    }

    /// Replaces the material override list, truncating past the proxy limit.
    pub fn set_materials(&mut self, materials: &[u32]) {
        if materials.len() > MAX_MATERIAL_SLOTS {
            log::warn!(
                "node '{}': {} material overrides truncated to {MAX_MATERIAL_SLOTS}",
                self.name,
                materials.len()
            );
        }
        self.materials = materials
            .iter()
            .copied()
            .take(MAX_MATERIAL_SLOTS)
            .collect();
    }

    #[must_use]
    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    #[must_use]
    pub fn local_transform(&self) -> Mat4 {
        self.local_transform
    }

    #[must_use]
    pub fn world_transform(&self) -> Mat4 {
        self.world_transform
    }

    #[must_use]
    pub fn prev_world_transform(&self) -> Mat4 {
        self.prev_world_transform
    }

    /// Recomputes the local matrix from TRS. Returns true when it changed.
    pub fn recalc_local(&mut self) -> bool {
        if !self.local_dirty {
            return false;
        }
        self.local_transform = Mat4::from_scale_rotation_translation(
            self.scale,
            self.rotation,
            self.translation,
        );
        self.local_dirty = false;
        true
    }
}
