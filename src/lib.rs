#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::too_many_lines)]

//! Ember — a hybrid GPU/CPU global-illumination rendering engine.
//!
//! The core is a tiled, multi-threaded CPU probe baker over a BVH of the
//! static scene, a scene graph flattened into per-frame GPU arrays, a
//! render-loop skeleton with pluggable back-ends, and the worker-pool
//! primitive all asynchronous work (baking, scene loads, capture) runs on.

pub mod app;
pub mod assets;
pub mod engine;
pub mod errors;
pub mod gi;
pub mod render;
pub mod scene;
pub mod settings;
pub mod tasks;

pub use engine::{Engine, EngineStatus, GameInstance};
pub use errors::{EmberError, Result};
pub use gi::CpuAccelerationStructure;
pub use render::Renderer;
pub use render::backend::BackendKind;
pub use render::uniforms::UniformBufferObject;
pub use scene::{Camera, Environment, Material, MaterialFeatures, Model, Node, QuadLight, Scene};
pub use settings::{RendererSettings, UserSettings};
pub use tasks::TaskCoordinator;
