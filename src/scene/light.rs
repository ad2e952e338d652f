//! Quad area lights.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// A quad area light: three corner positions spanning the quad plus a
/// packed normal whose w component carries the quad area.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct QuadLight {
    pub p0: Vec4,
    pub p1: Vec4,
    pub p3: Vec4,
    /// xyz: unit normal, w: area.
    pub normal_area: Vec4,
    /// Material slot providing the emitter power.
    pub material_index: u32,
    pub reserved0: u32,
    pub reserved1: u32,
    pub reserved2: u32,
}

impl QuadLight {
    /// Builds a light from a corner, two edge endpoints and the material
    /// carrying its emission.
    #[must_use]
    pub fn new(p0: Vec3, p1: Vec3, p3: Vec3, material_index: u32) -> Self {
        let e1 = p1 - p0;
        let e3 = p3 - p0;
        let cross = e1.cross(e3);
        let area = cross.length();
        let normal = if area > 1e-8 { cross / area } else { Vec3::Y };
        Self {
            p0: p0.extend(1.0),
            p1: p1.extend(1.0),
            p3: p3.extend(1.0),
            normal_area: normal.extend(area),
            material_index,
            reserved0: 0,
            reserved1: 0,
            reserved2: 0,
        }
    }

    /// Center of the quad, used by the baker for direct-light sampling.
    #[must_use]
    pub fn center(&self) -> Vec3 {
        self.p1.truncate().lerp(self.p3.truncate(), 0.5)
    }

    #[must_use]
    pub fn normal(&self) -> Vec3 {
        self.normal_area.truncate()
    }

    #[must_use]
    pub fn area(&self) -> f32 {
        self.normal_area.w
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_light_derives_normal_and_area() {
        let light = QuadLight::new(
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 1.0),
            0,
        );
        assert!((light.area() - 1.0).abs() < 1e-5);
        assert!((light.normal().abs() - Vec3::Y).length() < 1e-5);
    }
}
