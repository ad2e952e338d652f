//! Render camera state.

use glam::{Mat4, Vec3};

/// A camera as carried by the scene: the view matrix plus the lens
/// parameters the uniform buffer and depth-of-field paths read.
///
/// One authoritative `field_of_view` value; input-side smoothing (e.g.
/// scroll-wheel zoom) belongs to the UI layer, not here.
#[derive(Clone, Debug)]
pub struct Camera {
    pub name: String,
    pub model_view: Mat4,
    /// Vertical field of view in degrees.
    pub field_of_view: f32,
    pub aperture: f32,
    pub focal_distance: f32,
}

impl Camera {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model_view: Mat4::IDENTITY,
            field_of_view: 45.0,
            aperture: 0.0,
            focal_distance: 10.0,
        }
    }

    /// Positions the camera at `eye` looking at `center`.
    #[must_use]
    pub fn looking_at(name: impl Into<String>, eye: Vec3, center: Vec3) -> Self {
        let mut camera = Self::new(name);
        camera.model_view = Mat4::look_at_rh(eye, center, Vec3::Y);
        camera
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new("default")
    }
}
