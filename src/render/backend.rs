//! Pluggable render back-ends.
//!
//! Every back-end implements the same capability set — device hook,
//! swap-chain create/delete, per-frame render, before-next-frame — and the
//! façade switches between them through [`BackendRegistry`]. Concrete
//! pipeline and shader setup is an external concern; the back-ends here
//! own their swap-chain-scoped state and record the frame skeleton.

use glam::Vec3;
use rustc_hash::FxHashMap;

use crate::render::uniforms::RayCastResult;

/// The recognised back-end types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    PathTracing,
    Hybrid,
    ModernDeferred,
    LegacyDeferred,
    VoxelTracing,
}

impl BackendKind {
    /// Benchmark-CLI index mapping.
    #[must_use]
    pub fn from_index(index: u32) -> Self {
        match index {
            1 => Self::Hybrid,
            2 => Self::ModernDeferred,
            3 => Self::LegacyDeferred,
            4 => Self::VoxelTracing,
            _ => Self::PathTracing,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::PathTracing => "PathTracing",
            Self::Hybrid => "Hybrid",
            Self::ModernDeferred => "ModernDeferred",
            Self::LegacyDeferred => "LegacyDeferred",
            Self::VoxelTracing => "VoxelTracing",
        }
    }

    /// True for back-ends that need hardware ray tracing to initialize.
    #[must_use]
    pub fn requires_ray_query(self) -> bool {
        matches!(self, Self::PathTracing)
    }
}

/// Capability set every back-end provides.
pub trait Backend {
    fn kind(&self) -> BackendKind;

    /// Called once the device exists.
    fn on_device_set(&mut self, device: &wgpu::Device, queue: &wgpu::Queue);

    /// (Re)creates swap-chain-scoped resources at the given extent.
    fn create_swap_chain(&mut self, device: &wgpu::Device, extent: (u32, u32));

    /// Drops swap-chain-scoped resources.
    fn delete_swap_chain(&mut self);

    /// Records this frame into `encoder`, targeting `view`.
    fn render(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        clear_color: wgpu::Color,
    );

    /// Called right before the next frame starts.
    fn before_next_frame(&mut self) {}

    /// Called on the main thread before a scene reload tears down the old
    /// scene's GPU data.
    fn on_pre_scene_load(&mut self) {}

    /// Called once the new scene's GPU data exists.
    fn on_post_scene_load(&mut self) {}

    /// Whether the back-end can service hardware ray-cast requests.
    fn supports_ray_query(&self) -> bool {
        false
    }

    /// Queues a one-shot ray cast on ray-query back-ends; ignored elsewhere.
    fn set_raycast_ray(&mut self, _origin: Vec3, _dir: Vec3) {}

    /// Polls a finished ray cast, if any.
    fn take_raycast_result(&mut self) -> Option<RayCastResult> {
        None
    }
}

/// Shared skeleton for the built-in back-ends: tracks extent and records a
/// clear pass over the target.
struct BaseBackend {
    kind: BackendKind,
    extent: Option<(u32, u32)>,
    ray_query: bool,
}

impl BaseBackend {
    fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            extent: None,
            ray_query: false,
        }
    }

    fn clear_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        clear_color: wgpu::Color,
    ) {
        let label = self.kind.name();
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear_color),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }
}

impl Backend for BaseBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn on_device_set(&mut self, device: &wgpu::Device, _queue: &wgpu::Queue) {
        self.ray_query = device
            .features()
            .contains(wgpu::Features::EXPERIMENTAL_RAY_QUERY);
    }

    fn create_swap_chain(&mut self, _device: &wgpu::Device, extent: (u32, u32)) {
        self.extent = Some(extent);
    }

    fn delete_swap_chain(&mut self) {
        self.extent = None;
    }

    fn render(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        clear_color: wgpu::Color,
    ) {
        self.clear_pass(encoder, view, clear_color);
    }

    fn supports_ray_query(&self) -> bool {
        self.kind.requires_ray_query() && self.ray_query
    }

    fn set_raycast_ray(&mut self, origin: Vec3, dir: Vec3) {
        if self.supports_ray_query() {
            log::trace!("{}: raycast {origin} -> {dir}", self.kind.name());
        }
    }
}

/// Owns one instance of every back-end and the currently active selection.
pub struct BackendRegistry {
    backends: FxHashMap<BackendKind, Box<dyn Backend>>,
    active: BackendKind,
    ray_query_supported: bool,
}

impl BackendRegistry {
    /// Registers all recognised back-ends; `requested` becomes active after
    /// capability resolution.
    #[must_use]
    pub fn new(requested: BackendKind, ray_query_supported: bool) -> Self {
        let mut backends: FxHashMap<BackendKind, Box<dyn Backend>> = FxHashMap::default();
        for kind in [
            BackendKind::PathTracing,
            BackendKind::Hybrid,
            BackendKind::ModernDeferred,
            BackendKind::LegacyDeferred,
            BackendKind::VoxelTracing,
        ] {
            backends.insert(kind, Box::new(BaseBackend::new(kind)));
        }

        let mut registry = Self {
            backends,
            active: BackendKind::ModernDeferred,
            ray_query_supported,
        };
        registry.active = registry.resolve(requested);
        registry
    }

    /// Applies the hardware fallback rule.
    #[must_use]
    pub fn resolve(&self, requested: BackendKind) -> BackendKind {
        if requested.requires_ray_query() && !self.ray_query_supported {
            log::warn!(
                "{} requires hardware ray tracing; falling back to ModernDeferred",
                requested.name()
            );
            BackendKind::ModernDeferred
        } else {
            requested
        }
    }

    #[must_use]
    pub fn active_kind(&self) -> BackendKind {
        self.active
    }

    #[must_use]
    pub fn active(&self) -> &dyn Backend {
        self.backends[&self.active].as_ref()
    }

    pub fn active_mut(&mut self) -> &mut Box<dyn Backend> {
        self.backends
            .get_mut(&self.active)
            .expect("active back-end always registered")
    }

    /// Forwards the device hook to every registered back-end.
    pub fn on_device_set(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        for backend in self.backends.values_mut() {
            backend.on_device_set(device, queue);
        }
    }

    /// Switches the active back-end: deletes the previous one's swap-chain
    /// resources and initializes the new one at the current extent.
    /// Returns the kind actually activated.
    pub fn switch(
        &mut self,
        requested: BackendKind,
        device: &wgpu::Device,
        extent: (u32, u32),
    ) -> BackendKind {
        let resolved = self.resolve(requested);
        if resolved == self.active {
            return resolved;
        }

        self.active_mut().delete_swap_chain();
        log::info!("switching back-end to {}", resolved.name());
        self.active = resolved;
        self.active_mut().create_swap_chain(device, extent);
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_tracing_falls_back_without_ray_query() {
        let registry = BackendRegistry::new(BackendKind::PathTracing, false);
        assert_eq!(registry.active_kind(), BackendKind::ModernDeferred);

        let registry = BackendRegistry::new(BackendKind::PathTracing, true);
        assert_eq!(registry.active_kind(), BackendKind::PathTracing);
    }

    #[test]
    fn kind_index_mapping() {
        assert_eq!(BackendKind::from_index(0), BackendKind::PathTracing);
        assert_eq!(BackendKind::from_index(3), BackendKind::LegacyDeferred);
        assert_eq!(BackendKind::from_index(42), BackendKind::PathTracing);
    }
}
