//! Engine façade.
//!
//! [`Engine`] owns the renderer, scene, CPU acceleration structure and task
//! coordinator, and drives the per-frame pipeline: time advance, pending
//! back-end switch, scene tick, deferred tasks, probe-bake progress,
//! uniform composition, back-end dispatch, capture and present. It also
//! brokers scene switching, GPU ray casts and aux drawing for the game
//! instance.

use std::sync::Arc;
use std::time::Instant;

use glam::{Vec2, Vec3, Vec4};
use parking_lot::Mutex;
use winit::window::Window;

use crate::assets::{self, ParsedScene};
use crate::errors::Result;
use crate::gi::CpuAccelerationStructure;
use crate::render::Renderer;
use crate::render::backend::BackendKind;
use crate::render::capture::ScreenCapture;
use crate::render::scene_buffers::SceneBuffers;
use crate::render::timing::CpuTimer;
use crate::render::uniforms::{self, FrameInputs, RayCastResult, UniformBufferObject};
use crate::scene::camera::Camera;
use crate::scene::scene::Scene;
use crate::settings::{RendererSettings, UserSettings};
use crate::tasks::TaskCoordinator;

/// Engine lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineStatus {
    Starting,
    Running,
    Loading,
    AsyncPreparing,
}

/// Per-frame hook surface for applications embedding the engine.
#[allow(unused_variables)]
pub trait GameInstance {
    fn on_init(&mut self, engine: &mut Engine) {}
    fn on_tick(&mut self, engine: &mut Engine, delta_seconds: f64) {}
    fn on_destroy(&mut self, engine: &mut Engine) {}

    fn on_scene_loaded(&mut self, engine: &mut Engine, scene_name: &str) {}
    fn on_scene_unloaded(&mut self, engine: &mut Engine) {}

    /// Returns true when the instance overrode the render camera.
    fn override_render_camera(&self, camera: &mut Camera) -> bool {
        false
    }

    fn on_ray_hit(&mut self, engine: &mut Engine, result: &RayCastResult) {}
}

/// Default no-op game instance.
pub struct NullGameInstance;

impl GameInstance for NullGameInstance {}

/// Receiver for 2-D aux primitives (the immediate-mode UI in the full
/// product; a trait seam here).
pub trait AuxDrawSink {
    fn draw_line(&mut self, from: Vec2, to: Vec2, size: f32, color: Vec4);
    fn draw_point(&mut self, position: Vec2, size: f32, color: Vec4);
}

/// Task run every frame until it returns true.
pub type TickedTask = Box<dyn FnMut(&mut Engine, f64) -> bool>;

struct TimerTask {
    trigger_time: f64,
    period: f64,
    task: Box<dyn FnMut(&mut Engine) -> bool>,
}

struct PendingParse {
    slot: Arc<Mutex<Option<Result<ParsedScene>>>>,
    /// Load sequence this parse belongs to; a newer request supersedes it.
    seq: u64,
}

type RayCastCallback = Box<dyn FnMut(RayCastResult) -> bool>;

pub struct Engine {
    renderer: Renderer,
    scene: Scene,
    scene_gpu: Option<SceneBuffers>,
    scene_name: String,

    accel: CpuAccelerationStructure,
    coordinator: TaskCoordinator,

    user_settings: UserSettings,
    requested_backend: BackendKind,

    status: EngineStatus,
    timer: CpuTimer,
    smoothed_delta: f64,
    total_frames: u32,
    progressive: bool,
    close_requested: bool,

    prev_ubo: UniformBufferObject,
    capture: ScreenCapture,

    ticked_tasks: Vec<TickedTask>,
    timer_tasks: Vec<TimerTask>,
    pending_parse: Option<PendingParse>,
    load_seq: u64,
    pending_raycasts: Vec<RayCastCallback>,

    game: Option<Box<dyn GameInstance>>,
    aux_sink: Option<Box<dyn AuxDrawSink>>,
}

impl Engine {
    /// Start phase: device, surface, back-end registry, empty scene, game
    /// init. The engine leaves in `Running` state.
    pub fn new(
        window: Arc<Window>,
        renderer_settings: RendererSettings,
        user_settings: UserSettings,
        game: Box<dyn GameInstance>,
    ) -> Result<Self> {
        let requested_backend = user_settings.renderer;
        let renderer = Renderer::new(window, renderer_settings, requested_backend)?;

        let mut engine = Self {
            renderer,
            scene: Scene::new(),
            scene_gpu: None,
            scene_name: String::new(),
            accel: CpuAccelerationStructure::new(),
            coordinator: TaskCoordinator::new(),
            user_settings,
            requested_backend,
            status: EngineStatus::Starting,
            timer: CpuTimer::new(),
            smoothed_delta: 0.0,
            total_frames: 0,
            progressive: false,
            close_requested: false,
            prev_ubo: UniformBufferObject::default(),
            capture: ScreenCapture::default(),
            ticked_tasks: Vec::new(),
            timer_tasks: Vec::new(),
            pending_parse: None,
            load_seq: 0,
            pending_raycasts: Vec::new(),
            game: Some(game),
            aux_sink: None,
        };

        engine.status = EngineStatus::Running;
        let _ = engine.with_game(|game, engine| game.on_init(engine));
        Ok(engine)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    #[must_use]
    pub fn scene_name(&self) -> &str {
        &self.scene_name
    }

    #[must_use]
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    #[must_use]
    pub fn coordinator(&self) -> &TaskCoordinator {
        &self.coordinator
    }

    #[must_use]
    pub fn acceleration_structure(&self) -> &CpuAccelerationStructure {
        &self.accel
    }

    #[must_use]
    pub fn user_settings(&self) -> &UserSettings {
        &self.user_settings
    }

    pub fn user_settings_mut(&mut self) -> &mut UserSettings {
        &mut self.user_settings
    }

    #[must_use]
    pub fn status(&self) -> EngineStatus {
        self.status
    }

    #[must_use]
    pub fn total_frames(&self) -> u32 {
        self.total_frames
    }

    #[must_use]
    pub fn time(&self) -> f64 {
        self.timer.elapsed_seconds()
    }

    #[must_use]
    pub fn delta_seconds(&self) -> f64 {
        self.timer.dt_seconds()
    }

    #[must_use]
    pub fn smooth_delta_seconds(&self) -> f64 {
        self.smoothed_delta
    }

    pub fn set_progressive_rendering(&mut self, enable: bool) {
        self.progressive = enable;
    }

    #[must_use]
    pub fn is_progressive_rendering(&self) -> bool {
        self.progressive
    }

    pub fn set_aux_sink(&mut self, sink: Box<dyn AuxDrawSink>) {
        self.aux_sink = Some(sink);
    }

    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.renderer.resize(width, height);
    }

    // ========================================================================
    // Deferred tasks
    // ========================================================================

    /// Runs `task` every frame until it returns true.
    pub fn add_ticked_task(&mut self, task: TickedTask) {
        self.ticked_tasks.push(task);
    }

    /// Runs `task` every `delay` seconds until it returns true.
    pub fn add_timer_task(&mut self, delay: f64, task: Box<dyn FnMut(&mut Engine) -> bool>) {
        self.timer_tasks.push(TimerTask {
            trigger_time: self.time() + delay,
            period: delay,
            task,
        });
    }

    // ========================================================================
    // Frame tick
    // ========================================================================

    /// One frame. Returns true when the application should close.
    pub fn tick(&mut self) -> Result<bool> {
        // Before-next-frame: pump worker completions, let the back-end
        // recycle per-frame state.
        self.coordinator.tick();
        self.renderer.registry_mut().active_mut().before_next_frame();

        // Delta time first, then a pending back-end change, then the EMA
        // smoothing used for display.
        self.timer.tick();
        let delta = self.timer.dt_seconds();

        if self.user_settings.renderer != self.requested_backend {
            self.requested_backend = self.user_settings.renderer;
            let resolved = self.renderer.switch_backend(self.requested_backend);
            if resolved != self.requested_backend {
                self.user_settings.renderer = resolved;
                self.requested_backend = resolved;
            }
        }

        let alpha = (delta / 60.0 * 100.0).clamp(0.0, 1.0);
        self.smoothed_delta += (delta - self.smoothed_delta) * alpha;

        self.scene.tick(delta as f32);

        self.finish_pending_scene_load()?;

        if self.status == EngineStatus::Running {
            let _ = self.with_game(|game, engine| game.on_tick(engine, delta));
        }

        self.run_ticked_tasks(delta);
        self.run_timer_tasks();

        self.deliver_raycast_results();

        // Probe baker progress; a completed batch coalesces into one
        // upload here.
        if self.accel.tick(&self.scene, &self.coordinator) {
            if let Some(gpu) = &self.scene_gpu {
                gpu.upload_probes(
                    self.renderer.queue(),
                    &self.accel.near_baker().snapshot(),
                    &self.accel.far_baker().snapshot(),
                );
            }
        }
        self.upload_ready_shadow_tiles();

        // Node flatten decision + GPU upload.
        match self.scene.update_nodes() {
            Ok(true) => {
                if let Some(gpu) = &self.scene_gpu {
                    gpu.upload_nodes(
                        self.renderer.queue(),
                        self.scene.node_proxies(),
                        self.scene.indirect_draws(),
                    )?;
                }
                self.accel.update_bvh(&self.scene);
            }
            Ok(false) => {}
            Err(e) => log::error!("node flatten failed: {e}"),
        }

        // Uniform composition for the active camera.
        let ubo = self.compute_uniform_buffer();
        if let Some(gpu) = &self.scene_gpu {
            gpu.upload_uniforms(self.renderer.queue(), &ubo);
        }

        // Environment changes (sun toggled or moved) rebake GI.
        if self.scene.take_env_dirty() && self.accel.context().is_some() {
            self.accel.async_process_full(&self.coordinator);
            self.accel.gen_shadow_map(&self.scene, &self.coordinator);
        }

        // Draw, capture, present.
        let capture = self.capture.take_pending();
        self.renderer.draw_frame(capture, &self.coordinator)?;

        self.prev_ubo = ubo;
        self.total_frames = self.total_frames.wrapping_add(1);

        Ok(self.close_requested)
    }

    /// End phase: stops the game instance and drains the workers.
    pub fn end(&mut self) {
        let _ = self.with_game(|game, engine| game.on_destroy(engine));
        self.coordinator.flush();
        self.renderer.wait_idle();
    }

    fn with_game<R>(&mut self, f: impl FnOnce(&mut dyn GameInstance, &mut Engine) -> R) -> Option<R> {
        let mut game = self.game.take()?;
        let result = f(game.as_mut(), self);
        self.game = Some(game);
        Some(result)
    }

    fn run_ticked_tasks(&mut self, delta: f64) {
        let mut tasks = std::mem::take(&mut self.ticked_tasks);
        tasks.retain_mut(|task| !task(self, delta));
        // Tasks spawned while running land behind the survivors.
        tasks.append(&mut self.ticked_tasks);
        self.ticked_tasks = tasks;
    }

    fn run_timer_tasks(&mut self) {
        let now = self.time();
        let mut tasks = std::mem::take(&mut self.timer_tasks);
        tasks.retain_mut(|entry| {
            if now <= entry.trigger_time {
                return true;
            }
            entry.trigger_time = now + entry.period;
            !(entry.task)(self)
        });
        tasks.append(&mut self.timer_tasks);
        self.timer_tasks = tasks;
    }

    // ========================================================================
    // Uniform composition
    // ========================================================================

    fn compute_uniform_buffer(&mut self) -> UniformBufferObject {
        let mut camera = self.scene.render_camera().clone();
        if let Some(game) = &self.game {
            let _ = game.override_render_camera(&mut camera);
        }

        let inputs = FrameInputs {
            viewport_offset: self.renderer.render_offset(),
            viewport_extent: self.renderer.extent(),
            total_frames: self.total_frames,
            selected_id: self.scene.selected_id(),
            light_count: self.scene.light_count(),
            random_seed: rand::random(),
            progressive: self.progressive,
            hdr_output: self.renderer.is_hdr(),
        };

        let ubo = uniforms::build_uniform_buffer(
            &camera,
            self.scene.environment(),
            &self.user_settings,
            &inputs,
            &self.prev_ubo,
        );

        if ubo.has_sun != self.prev_ubo.has_sun || ubo.sun_direction != self.prev_ubo.sun_direction
        {
            self.scene.mark_env_dirty();
        }

        ubo
    }

    // ========================================================================
    // Scene switching
    // ========================================================================

    /// Requests an asynchronous scene switch. The parse runs on a worker at
    /// priority 1 once the engine is Running; installation happens on the
    /// main thread. A newer request supersedes an unfinished one, so only
    /// the latest load ever reaches the scene-loaded hook.
    pub fn request_load_scene(&mut self, scene_file: impl Into<String>) {
        self.load_seq += 1;
        let seq = self.load_seq;
        let mut armed = Some(scene_file.into());
        self.add_ticked_task(Box::new(move |engine, _| {
            if seq != engine.load_seq {
                // A newer request took over.
                return true;
            }
            if engine.status != EngineStatus::Running {
                return false;
            }
            if let Some(path) = armed.take() {
                engine.begin_scene_load(&path, seq);
            }
            true
        }));
    }

    fn begin_scene_load(&mut self, scene_file: &str, seq: u64) {
        // No worker may observe the old trace context after this point.
        self.coordinator.cancel_all_parallel_tasks();
        self.coordinator.wait_for_all_parallel_tasks();

        self.status = EngineStatus::Loading;
        log::info!("loading scene [{scene_file}]");

        let slot = Arc::new(Mutex::new(None));
        let worker_slot = slot.clone();
        let path = scene_file.to_string();

        let _ = self.coordinator.add_task(
            move |_| {
                let started = Instant::now();
                let result = assets::load_scene(&path);
                match &result {
                    Ok(parsed) => log::info!(
                        "parsed scene [{}] on cpu in {:.2?}",
                        parsed.name,
                        started.elapsed()
                    ),
                    Err(e) => log::error!("failed to parse scene [{path}]: {e}"),
                }
                *worker_slot.lock() = Some(result);
            },
            None,
            1,
        );

        // A still-unfinished previous parse is dropped here; its slot has
        // no reader left, so exactly one scene-loaded hook can fire.
        self.pending_parse = Some(PendingParse { slot, seq });
    }

    fn finish_pending_scene_load(&mut self) -> Result<()> {
        let Some(pending) = &self.pending_parse else {
            return Ok(());
        };
        let Some(result) = pending.slot.lock().take() else {
            return Ok(());
        };
        let seq = pending.seq;
        self.pending_parse = None;

        if seq != self.load_seq {
            log::info!("discarding superseded scene load");
            self.status = EngineStatus::Running;
            return Ok(());
        }

        match result {
            Ok(parsed) => self.install_scene(parsed),
            Err(e) => {
                // Keep the previous scene and return to Running.
                log::error!("scene load failed: {e}");
                self.status = EngineStatus::Running;
                Ok(())
            }
        }
    }

    fn install_scene(&mut self, parsed: ParsedScene) -> Result<()> {
        let started = Instant::now();

        self.renderer.wait_idle();
        self.renderer.delete_swap_chain();
        self.renderer.registry_mut().active_mut().on_pre_scene_load();
        let _ = self.with_game(|game, engine| game.on_scene_unloaded(engine));
        self.pending_raycasts.clear();

        let ParsedScene {
            name,
            content,
            environment,
        } = parsed;

        self.scene.environment_mut().reset();
        self.scene.set_environment(environment);
        self.scene.reload(content);

        self.scene_gpu = Some(SceneBuffers::new(
            self.renderer.device(),
            &self.scene,
            self.renderer.supports_ray_query(),
            self.accel.near_baker().config().cube_count(),
            self.accel.far_baker().config().cube_count(),
        )?);

        self.accel.init_bvh(&self.scene);

        self.user_settings.camera_index = 0;
        if let Some(camera) = self.scene.environment().cameras.first() {
            self.scene.set_render_camera(camera.clone());
        }

        self.total_frames = 0;
        self.renderer.registry_mut().active_mut().on_post_scene_load();
        self.renderer.create_swap_chain();

        // Initial flatten + upload so the first frame draws the new scene.
        if self.scene.update_nodes()? {
            if let Some(gpu) = &self.scene_gpu {
                gpu.upload_nodes(
                    self.renderer.queue(),
                    self.scene.node_proxies(),
                    self.scene.indirect_draws(),
                )?;
            }
        }

        self.accel.async_process_full(&self.coordinator);
        self.accel.gen_shadow_map(&self.scene, &self.coordinator);
        let _ = self.scene.take_env_dirty();

        self.scene_name = name.clone();
        self.status = EngineStatus::Running;
        let _ = self.with_game(|game, engine| game.on_scene_loaded(engine, &name));

        log::info!("installed scene [{name}] in {:.2?}", started.elapsed());
        Ok(())
    }

    // ========================================================================
    // Ray casts
    // ========================================================================

    /// Dispatches a GPU ray cast when the active back-end supports hardware
    /// ray tracing; otherwise a no-op placeholder.
    pub fn ray_cast_gpu(&mut self, origin: Vec3, dir: Vec3, callback: RayCastCallback) {
        let backend = self.renderer.registry_mut().active_mut();
        if backend.supports_ray_query() {
            backend.set_raycast_ray(origin, dir);
            self.pending_raycasts.push(callback);
        }
    }

    fn deliver_raycast_results(&mut self) {
        if self.pending_raycasts.is_empty() {
            return;
        }
        while let Some(result) = self
            .renderer
            .registry_mut()
            .active_mut()
            .take_raycast_result()
        {
            if let Some(mut callback) = self.pending_raycasts.pop() {
                if !callback(result) {
                    self.pending_raycasts.push(callback);
                }
                let _ = self.with_game(|game, engine| game.on_ray_hit(engine, &result));
            }
        }
    }

    // ========================================================================
    // Screen capture
    // ========================================================================

    /// Schedules a screen shot for the next present.
    pub fn request_screen_shot(&mut self, filename: Option<String>) {
        self.capture.request(filename);
    }

    fn upload_ready_shadow_tiles(&mut self) {
        let tiles = self.accel.shadow_map().drain_ready_tiles();
        if tiles.is_empty() {
            return;
        }
        let Some(gpu) = &self.scene_gpu else {
            return;
        };
        let tile_size = self.accel.shadow_map().tile_size() as u32;
        for (x, y) in tiles {
            let depths = self.accel.shadow_map().tile_data(x, y);
            gpu.upload_shadow_tile(self.renderer.queue(), (x, y), tile_size, &depths);
        }
    }

    // ========================================================================
    // Aux drawing
    // ========================================================================

    /// Projects a world position through the previous frame's
    /// view-projection into screen space. `z` carries the NDC depth.
    #[must_use]
    pub fn project_world_to_screen(&self, world: Vec3) -> Vec3 {
        let (offset_x, offset_y) = self.renderer.render_offset();
        let (width, height) = self.renderer.extent();

        let clip = self.prev_ubo.view_projection * world.extend(1.0);
        let ndc = clip / clip.w.max(1e-6);
        Vec3::new(
            (ndc.x + 1.0) * width as f32 / 2.0 + offset_x as f32,
            (ndc.y + 1.0) * height as f32 / 2.0 + offset_y as f32,
            ndc.z,
        )
    }

    /// Unprojects a screen position into a world-space ray.
    #[must_use]
    pub fn screen_to_world_ray(&self, screen: Vec2) -> (Vec3, Vec3) {
        let (offset_x, offset_y) = self.renderer.render_offset();
        let (width, height) = self.renderer.extent();

        let pixel = screen - Vec2::new(offset_x as f32, offset_y as f32);
        let uv = pixel / Vec2::new(width as f32, height as f32) * 2.0 - Vec2::ONE;

        let origin = self.prev_ubo.model_view_inverse * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let target = self.prev_ubo.projection_inverse * Vec4::new(uv.x, uv.y, 1.0, 1.0);
        let dir = self.prev_ubo.model_view_inverse
            * target.truncate().normalize().extend(0.0);

        (origin.truncate(), dir.truncate())
    }

    /// Draws a world-space line through the aux sink, clipped at the far
    /// plane.
    pub fn draw_aux_line(&mut self, from: Vec3, to: Vec3, color: Vec4, size: f32) {
        let a = self.project_world_to_screen(from);
        let b = self.project_world_to_screen(to);
        if a.z < 1.0 && b.z < 1.0 {
            if let Some(sink) = &mut self.aux_sink {
                sink.draw_line(Vec2::new(a.x, a.y), Vec2::new(b.x, b.y), size, color);
            }
        }
    }

    /// Draws a world-space AABB as twelve aux lines.
    pub fn draw_aux_box(&mut self, min: Vec3, max: Vec3, color: Vec4, size: f32) {
        let corners = |x: f32, y: f32, z: f32| Vec3::new(x, y, z);
        let lines = [
            (corners(min.x, min.y, min.z), corners(max.x, min.y, min.z)),
            (corners(max.x, min.y, min.z), corners(max.x, max.y, min.z)),
            (corners(max.x, max.y, min.z), corners(min.x, max.y, min.z)),
            (corners(min.x, max.y, min.z), corners(min.x, min.y, min.z)),
            (corners(min.x, min.y, max.z), corners(max.x, min.y, max.z)),
            (corners(max.x, min.y, max.z), corners(max.x, max.y, max.z)),
            (corners(max.x, max.y, max.z), corners(min.x, max.y, max.z)),
            (corners(min.x, max.y, max.z), corners(min.x, min.y, max.z)),
            (corners(min.x, min.y, min.z), corners(min.x, min.y, max.z)),
            (corners(max.x, min.y, min.z), corners(max.x, min.y, max.z)),
            (corners(max.x, max.y, min.z), corners(max.x, max.y, max.z)),
            (corners(min.x, max.y, min.z), corners(min.x, max.y, max.z)),
        ];
        for (from, to) in lines {
            self.draw_aux_line(from, to, color, size);
        }
    }

    /// Draws a world-space point. A nonzero tick duration installs a
    /// ticked task that redraws and counts down to zero.
    pub fn draw_aux_point(&mut self, location: Vec3, color: Vec4, size: f32, duration_ticks: i32) {
        if duration_ticks > 0 {
            let mut remaining = duration_ticks;
            self.add_ticked_task(Box::new(move |engine, _| {
                let projected = engine.project_world_to_screen(location);
                if projected.z < 1.0 {
                    if let Some(sink) = &mut engine.aux_sink {
                        sink.draw_point(Vec2::new(projected.x, projected.y), size, color);
                    }
                }
                remaining -= 1;
                remaining <= 0
            }));
        } else {
            let projected = self.project_world_to_screen(location);
            if projected.z < 1.0 {
                if let Some(sink) = &mut self.aux_sink {
                    sink.draw_point(Vec2::new(projected.x, projected.y), size, color);
                }
            }
        }
    }
}
