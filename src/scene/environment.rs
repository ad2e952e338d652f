//! Environment settings: sky, sun, camera list.

use glam::{Mat4, Vec3};

use crate::scene::camera::Camera;

/// Scene-level environment: HDRI sky selection, the optional sun, and the
/// cameras found in the scene file.
#[derive(Clone, Debug)]
pub struct Environment {
    pub control_speed: f32,
    pub gamma_correction: bool,
    pub has_sky: bool,
    pub has_sun: bool,
    pub sky_idx: i32,
    /// Sun azimuth in radians.
    pub sun_rotation: f32,
    /// Sky rotation in radians.
    pub sky_rotation: f32,
    pub sky_intensity: f32,
    pub sun_intensity: f32,
    pub cameras: Vec<Camera>,
}

impl Environment {
    #[must_use]
    pub fn new() -> Self {
        let mut env = Self {
            control_speed: 0.0,
            gamma_correction: false,
            has_sky: false,
            has_sun: false,
            sky_idx: 0,
            sun_rotation: 0.0,
            sky_rotation: 0.0,
            sky_intensity: 0.0,
            sun_intensity: 0.0,
            cameras: Vec::new(),
        };
        env.reset();
        env
    }

    /// Restores the defaults applied before every scene load.
    pub fn reset(&mut self) {
        self.control_speed = 5.0;
        self.gamma_correction = true;
        self.has_sky = true;
        self.has_sun = false;
        self.sky_idx = 0;
        self.sun_intensity = 500.0;
        self.sky_intensity = 100.0;
        self.sky_rotation = 0.0;
        self.sun_rotation = 0.5;
        self.cameras.clear();
    }

    /// Downward sun direction derived from the azimuth rotation.
    #[must_use]
    pub fn sun_direction(&self) -> Vec3 {
        Vec3::new(self.sun_rotation.sin(), -1.0, self.sun_rotation.cos()).normalize()
    }

    /// Orthographic light view-projection covering the probe volume, used
    /// by the CPU shadow-map tiler.
    #[must_use]
    pub fn sun_view_projection(&self) -> Mat4 {
        let dir = self.sun_direction();
        let eye = -dir * 100.0;
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let projection = Mat4::orthographic_rh(-50.0, 50.0, -50.0, 50.0, 0.1, 500.0);
        projection * view
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_restores_defaults() {
        let mut env = Environment::new();
        env.has_sun = true;
        env.sky_intensity = 1.0;
        env.cameras.push(Camera::default());
        env.reset();
        assert!(!env.has_sun);
        assert!(env.has_sky);
        assert_eq!(env.sky_intensity, 100.0);
        assert!(env.cameras.is_empty());
    }

    #[test]
    fn sun_direction_points_down() {
        let env = Environment::new();
        assert!(env.sun_direction().y < 0.0);
        assert!((env.sun_direction().length() - 1.0).abs() < 1e-5);
    }
}
