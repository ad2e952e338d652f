//! Shading parameters, laid out for direct GPU upload.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

bitflags! {
    /// Capabilities a material actually uses, derived from its fields.
    /// Shader permutations and upload paths key off these rather than
    /// re-inspecting texture indices.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MaterialFeatures: u32 {
        const USE_MAP        = 1 << 0;
        const USE_NORMAL_MAP = 1 << 1;
        const USE_MRA_MAP    = 1 << 2;
        const EMISSIVE       = 1 << 3;
        const LAYERED_IOR    = 1 << 4;
    }
}

/// Which shading model a material uses. Stored as a raw `u32` inside
/// [`Material`] so the struct stays Pod.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum MaterialModel {
    Lambertian = 0,
    Metallic = 1,
    Dielectric = 2,
    Isotropic = 3,
    DiffuseLight = 4,
    Mixture = 5,
}

impl MaterialModel {
    #[must_use]
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Metallic,
            2 => Self::Dielectric,
            3 => Self::Isotropic,
            4 => Self::DiffuseLight,
            5 => Self::Mixture,
            _ => Self::Lambertian,
        }
    }
}

/// Shading parameters for one material slot.
///
/// vec3/vec4 members align on 16 bytes in shaders; the struct is padded to
/// a 16-byte multiple so material tables can be uploaded verbatim.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Material {
    /// Base colour (rgba).
    pub diffuse: Vec4,
    /// Diffuse texture index, -1 for none.
    pub diffuse_texture_id: i32,
    /// Metal fuzziness / roughness.
    pub fuzziness: f32,
    /// Dielectric refraction index.
    pub refraction_index: f32,
    /// Shading model tag, see [`MaterialModel`].
    pub material_model: u32,
    /// Metalness factor.
    pub metalness: f32,
    /// Second refraction index for layered IOR.
    pub refraction_index2: f32,
    /// Normal-map texture index, -1 for none.
    pub normal_texture_id: i32,
    /// Metallic-roughness-AO texture index, -1 for none.
    pub mra_texture_id: i32,
    /// Normal-map scale.
    pub normal_scale: f32,
    pub reserved0: f32,
    pub reserved1: f32,
    pub reserved2: f32,
}

impl Material {
    fn base(diffuse: Vec4, fuzziness: f32, refraction_index: f32, model: MaterialModel) -> Self {
        Self {
            diffuse,
            diffuse_texture_id: -1,
            fuzziness,
            refraction_index,
            material_model: model as u32,
            metalness: 0.0,
            refraction_index2: refraction_index,
            normal_texture_id: -1,
            mra_texture_id: -1,
            normal_scale: 1.0,
            reserved0: 0.0,
            reserved1: 0.0,
            reserved2: 0.0,
        }
    }

    #[must_use]
    pub fn lambertian(diffuse: Vec3) -> Self {
        Self::base(diffuse.extend(1.0), 1.0, 1.45, MaterialModel::Lambertian)
    }

    #[must_use]
    pub fn metallic(diffuse: Vec3, fuzziness: f32) -> Self {
        let mut mat = Self::base(diffuse.extend(1.0), fuzziness, 1.45, MaterialModel::Metallic);
        mat.metalness = 1.0;
        mat
    }

    #[must_use]
    pub fn dielectric(refraction_index: f32, fuzziness: f32) -> Self {
        Self::base(
            Vec4::new(0.7, 0.7, 1.0, 1.0),
            fuzziness,
            refraction_index,
            MaterialModel::Dielectric,
        )
    }

    #[must_use]
    pub fn isotropic(diffuse: Vec3, refraction_index: f32, fuzziness: f32) -> Self {
        Self::base(
            diffuse.extend(1.0),
            fuzziness,
            refraction_index,
            MaterialModel::Isotropic,
        )
    }

    #[must_use]
    pub fn diffuse_light(emission: Vec3) -> Self {
        Self::base(emission.extend(1.0), 0.0, 0.0, MaterialModel::DiffuseLight)
    }

    #[must_use]
    pub fn model(&self) -> MaterialModel {
        MaterialModel::from_raw(self.material_model)
    }

    #[must_use]
    pub fn get_features(&self) -> MaterialFeatures {
        let mut features = MaterialFeatures::empty();
        if self.diffuse_texture_id >= 0 {
            features |= MaterialFeatures::USE_MAP;
        }
        if self.normal_texture_id >= 0 {
            features |= MaterialFeatures::USE_NORMAL_MAP;
        }
        if self.mra_texture_id >= 0 {
            features |= MaterialFeatures::USE_MRA_MAP;
        }
        if self.is_emissive() {
            features |= MaterialFeatures::EMISSIVE;
        }
        if (self.refraction_index2 - self.refraction_index).abs() > 1e-6 {
            features |= MaterialFeatures::LAYERED_IOR;
        }
        features
    }

    /// True for emissive materials the baker treats as light sources.
    #[must_use]
    pub fn is_emissive(&self) -> bool {
        self.model() == MaterialModel::DiffuseLight
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::lambertian(Vec3::splat(0.8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_is_16_byte_aligned() {
        assert_eq!(std::mem::size_of::<Material>() % 16, 0);
        assert_eq!(std::mem::align_of::<Material>(), 16);
    }

    #[test]
    fn model_tag_round_trip() {
        let mat = Material::dielectric(1.5, 0.0);
        assert_eq!(mat.model(), MaterialModel::Dielectric);
        assert_eq!(MaterialModel::from_raw(99), MaterialModel::Lambertian);
    }

    #[test]
    fn features_track_textures_and_model() {
        let mut mat = Material::lambertian(Vec3::ONE);
        assert_eq!(mat.get_features(), MaterialFeatures::empty());

        mat.diffuse_texture_id = 0;
        mat.normal_texture_id = 2;
        mat.refraction_index2 = mat.refraction_index + 0.3;
        let features = mat.get_features();
        assert!(features.contains(MaterialFeatures::USE_MAP));
        assert!(features.contains(MaterialFeatures::USE_NORMAL_MAP));
        assert!(features.contains(MaterialFeatures::LAYERED_IOR));
        assert!(!features.contains(MaterialFeatures::USE_MRA_MAP));

        assert!(
            Material::diffuse_light(Vec3::ONE)
                .get_features()
                .contains(MaterialFeatures::EMISSIVE)
        );
    }
}
