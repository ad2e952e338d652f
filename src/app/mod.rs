//! Winit application shim: owns the window and drives [`Engine`] from the
//! event loop. Game instances embed the engine through this module.

use std::sync::Arc;

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::engine::{Engine, GameInstance, NullGameInstance};
use crate::errors::Result;
use crate::settings::{RendererSettings, UserSettings};

/// Scenes addressable by `--renderer`-style CLI index.
pub const SCENE_LIST: &[&str] = &["0cornellbox.proc", "0cornellbox_anim.proc"];

struct App {
    renderer_settings: RendererSettings,
    user_settings: Option<UserSettings>,
    game: Option<Box<dyn GameInstance>>,
    engine: Option<Engine>,
    window: Option<Arc<Window>>,
}

impl App {
    fn new(user_settings: UserSettings, game: Box<dyn GameInstance>) -> Self {
        Self {
            renderer_settings: RendererSettings::default(),
            user_settings: Some(user_settings),
            game: Some(game),
            engine: None,
            window: None,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.engine.is_some() {
            return;
        }

        let attributes = Window::default_attributes().with_title("ember");
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };

        let Some(user_settings) = self.user_settings.take() else {
            return;
        };
        let scene_index = user_settings.scene_index.min(SCENE_LIST.len() - 1);
        let game = self.game.take().unwrap_or_else(|| Box::new(NullGameInstance));

        match Engine::new(window.clone(), self.renderer_settings.clone(), user_settings, game) {
            Ok(mut engine) => {
                engine.request_load_scene(SCENE_LIST[scene_index]);
                self.engine = Some(engine);
                self.window = Some(window);
            }
            Err(e) => {
                log::error!("engine start failed: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(engine) = &mut self.engine else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => engine.resize(size.width, size.height),
            WindowEvent::RedrawRequested => match engine.tick() {
                Ok(true) => event_loop.exit(),
                Ok(false) => {}
                Err(e) => {
                    log::error!("frame failed: {e}");
                    event_loop.exit();
                }
            },
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(engine) = &mut self.engine {
            engine.end();
        }
    }
}

/// Runs the engine under winit with the given game instance. CLI arguments
/// (benchmark surface: `--renderer`, `--samples`, `--temporal`,
/// `--bounces`, scene index) are applied to the user settings first.
pub fn run(mut user_settings: UserSettings, game: Box<dyn GameInstance>) -> Result<()> {
    env_logger::init();
    user_settings.apply_cli(std::env::args().skip(1));

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(user_settings, game);
    event_loop.run_app(&mut app)?;
    Ok(())
}
