//! Device, surface and frame-loop plumbing.
//!
//! [`Renderer`] owns the wgpu instance, device, queue and surface, plus the
//! back-end registry and the GPU timer. The engine drives it once per
//! frame; all swap-chain operations stay on the main thread.

pub mod backend;
pub mod capture;
pub mod scene_buffers;
pub mod timing;
pub mod uniforms;

use std::sync::Arc;

use winit::window::Window;

use crate::errors::{EmberError, Result};
use crate::render::backend::{BackendKind, BackendRegistry};
use crate::render::timing::GpuTimer;
use crate::settings::RendererSettings;
use crate::tasks::TaskCoordinator;

/// Optional device features requested when the adapter offers them.
fn optional_features(adapter: &wgpu::Adapter) -> wgpu::Features {
    let wanted = wgpu::Features::TIMESTAMP_QUERY
        | wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS
        | wgpu::Features::EXPERIMENTAL_RAY_QUERY
        | wgpu::Features::EXPERIMENTAL_RAY_TRACING_ACCELERATION_STRUCTURE;
    adapter.features() & wanted
}

pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    settings: RendererSettings,

    registry: BackendRegistry,
    gpu_timer: GpuTimer,

    ray_query_supported: bool,
    has_swap_chain: bool,
    frame_count: u32,
}

impl Renderer {
    /// Creates the device and configures the surface for `window`.
    pub fn new(
        window: Arc<Window>,
        settings: RendererSettings,
        requested_backend: BackendKind,
    ) -> Result<Self> {
        pollster::block_on(Self::new_async(window, settings, requested_backend))
    }

    async fn new_async(
        window: Arc<Window>,
        settings: RendererSettings,
        requested_backend: BackendKind,
    ) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| EmberError::AdapterRequestFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: settings.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| {
                EmberError::AdapterRequestFailed("no compatible adapter".into())
            })?;

        let features = optional_features(&adapter);
        let ray_query_supported =
            features.contains(wgpu::Features::EXPERIMENTAL_RAY_QUERY);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("EmberDevice"),
                    required_features: features,
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await?;

        let size = window.inner_size();
        let mut config = surface
            .get_default_config(&adapter, size.width.max(1), size.height.max(1))
            .ok_or_else(|| {
                EmberError::AdapterRequestFailed("surface incompatible with adapter".into())
            })?;
        config.usage |= wgpu::TextureUsages::COPY_SRC;
        config.present_mode = if settings.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        surface.configure(&device, &config);

        log::info!(
            "renderer up: {} ({}x{}, ray query: {ray_query_supported})",
            adapter.get_info().name,
            config.width,
            config.height
        );

        let mut registry = BackendRegistry::new(requested_backend, ray_query_supported);
        registry.on_device_set(&device, &queue);
        registry
            .active_mut()
            .create_swap_chain(&device, (config.width, config.height));

        let gpu_timer = GpuTimer::new(&device, &queue);

        Ok(Self {
            device,
            queue,
            surface,
            config,
            settings,
            registry,
            gpu_timer,
            ray_query_supported,
            has_swap_chain: true,
            frame_count: 0,
        })
    }

    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    #[must_use]
    pub fn extent(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Offset of the render region inside the surface.
    #[must_use]
    pub fn render_offset(&self) -> (u32, u32) {
        (0, 0)
    }

    #[must_use]
    pub fn supports_ray_query(&self) -> bool {
        self.ray_query_supported
    }

    /// True for float/extended-range surface formats.
    #[must_use]
    pub fn is_hdr(&self) -> bool {
        matches!(
            self.config.format,
            wgpu::TextureFormat::Rgba16Float | wgpu::TextureFormat::Rgb10a2Unorm
        )
    }

    #[must_use]
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    #[must_use]
    pub fn has_swap_chain(&self) -> bool {
        self.has_swap_chain
    }

    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        self.registry.active_kind()
    }

    pub fn registry_mut(&mut self) -> &mut BackendRegistry {
        &mut self.registry
    }

    #[must_use]
    pub fn gpu_timer(&self) -> &GpuTimer {
        &self.gpu_timer
    }

    /// Switches the active back-end, applying the hardware fallback rule.
    pub fn switch_backend(&mut self, requested: BackendKind) -> BackendKind {
        let extent = self.extent();
        self.registry.switch(requested, &self.device, extent)
    }

    /// Reconfigures the surface after a resize.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.registry.active_mut().delete_swap_chain();
        self.registry
            .active_mut()
            .create_swap_chain(&self.device, (width, height));
    }

    /// Drops swap-chain-scoped resources ahead of a scene reload.
    pub fn delete_swap_chain(&mut self) {
        self.registry.active_mut().delete_swap_chain();
        self.has_swap_chain = false;
    }

    /// Recreates swap-chain-scoped resources after a scene reload.
    pub fn create_swap_chain(&mut self) {
        let extent = self.extent();
        self.surface.configure(&self.device, &self.config);
        self.registry.active_mut().create_swap_chain(&self.device, extent);
        self.has_swap_chain = true;
    }

    /// Blocks until the device is idle.
    pub fn wait_idle(&self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }

    /// Renders and presents one frame. `capture` names a pending screen
    /// shot; capture errors are contained and logged so the frame still
    /// presents.
    pub fn draw_frame(
        &mut self,
        capture: Option<String>,
        coordinator: &TaskCoordinator,
    ) -> Result<()> {
        if !self.has_swap_chain {
            return Ok(());
        }

        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("surface lost; reconfiguring");
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => return Ok(()),
            Err(e) => return Err(EmberError::DeviceLost(e.to_string())),
        };

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("EmberFrame"),
            });

        self.gpu_timer.begin_frame();
        self.gpu_timer.mark(&mut encoder, "frame");
        self.registry
            .active_mut()
            .render(&mut encoder, &view, self.settings.clear_color);
        self.gpu_timer.mark(&mut encoder, "post");
        self.gpu_timer.resolve(&mut encoder);

        self.queue.submit(std::iter::once(encoder.finish()));

        if let Some(filename) = capture {
            if let Err(e) = capture::capture_texture(
                &self.device,
                &self.queue,
                &frame.texture,
                &filename,
                coordinator,
            ) {
                log::error!("screen capture failed: {e}");
            }
        }

        self.gpu_timer.read(&self.device);

        frame.present();
        self.frame_count += 1;
        Ok(())
    }
}
