//! Scene graph and scene-level data model.
//!
//! The scene owns the node hierarchy, models, materials, lights, animation
//! tracks and environment, and produces the flattened per-frame arrays
//! (node proxies, indirect draws) the render layer uploads.

pub mod animation;
pub mod camera;
pub mod environment;
pub mod light;
pub mod material;
pub mod model;
pub mod node;
#[allow(clippy::module_inception)]
pub mod scene;

slotmap::new_key_type! {
    /// Generational handle to a [`Node`](node::Node) in the scene arena.
    pub struct NodeKey;
}

pub use animation::{AnimationTrack, Channel, Keyframe};
pub use camera::Camera;
pub use environment::Environment;
pub use light::QuadLight;
pub use material::{Material, MaterialFeatures, MaterialModel};
pub use model::{Model, Vertex};
pub use node::Node;
pub use scene::{NodeDesc, Scene, SceneContent};
