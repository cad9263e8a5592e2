//! Material definitions for deferred shading

use crate::resources::TextureId;
use glam::{Vec3, Vec4};

/// Geometry shader variant a material is drawn with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Faceted normals derived from screen-space position derivatives
    Flat,
    /// Interpolated vertex normals
    Smooth,
    /// Vertex normals plus a diffuse texture
    Textured,
}

impl ShaderKind {
    pub fn required_attributes(self) -> &'static [&'static str] {
        match self {
            ShaderKind::Flat => &["position"],
            ShaderKind::Smooth => &["position", "normal"],
            ShaderKind::Textured => &["position", "normal", "texcoord"],
        }
    }
}

/// Shadow filtering parameters shared by every draw of a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowParams {
    pub bias: f32,
    pub samples: u32,
    pub spread: f32,
}

/// Per-frame shading state, read-only while draws are recorded
#[derive(Debug, Clone, PartialEq)]
pub struct ShadingContext {
    pub toon: bool,
    pub outline_threshold: f32,
    pub ambient: Vec3,
    pub background: Vec4,
    pub shadow: Option<ShadowParams>,
    pub has_static_environment: bool,
}

impl Default for ShadingContext {
    fn default() -> Self {
        Self {
            toon: false,
            outline_threshold: 0.5,
            ambient: Vec3::splat(0.1),
            background: Vec4::new(0.0, 0.0, 0.0, 1.0),
            shadow: None,
            has_static_environment: false,
        }
    }
}

/// Material parameters as written into the G-buffer by the geometry pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialUniform {
    pub diffuse: Vec4,
    /// rgb specular color, w = shininess / 256
    pub specular: Vec4,
    /// x = reflectivity, y = environment slot / 255, z = emission, w = outline weight
    pub params: Vec4,
}

/// Phong material with optional reflections, emission and toon outline
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub diffuse: Vec4,
    pub specular: Vec3,
    pub shininess: f32,
    pub reflectivity: f32,
    pub emission: f32,
    pub outline: f32,
    pub diffuse_texture: Option<TextureId>,
    shader: ShaderKind,
    attributes: Vec<&'static str>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            diffuse: Vec4::ONE,
            specular: Vec3::splat(0.5),
            shininess: 32.0,
            reflectivity: 0.0,
            emission: 0.0,
            outline: 1.0,
            diffuse_texture: None,
            shader: ShaderKind::Smooth,
            attributes: ShaderKind::Smooth.required_attributes().to_vec(),
        }
    }
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_shader(mut self, shader: ShaderKind) -> Self {
        let extra: Vec<_> = self
            .attributes
            .iter()
            .copied()
            .filter(|a| !self.shader.required_attributes().contains(a))
            .collect();
        self.shader = shader;
        self.attributes = shader.required_attributes().to_vec();
        self.attributes.extend(extra);
        self
    }

    pub fn with_diffuse(mut self, color: Vec4) -> Self {
        self.diffuse = color;
        self
    }

    pub fn with_specular(mut self, color: Vec3, shininess: f32) -> Self {
        self.specular = color;
        self.shininess = shininess;
        self
    }

    pub fn with_reflectivity(mut self, reflectivity: f32) -> Self {
        self.reflectivity = reflectivity.clamp(0.0, 1.0);
        self
    }

    pub fn with_emission(mut self, emission: f32) -> Self {
        self.emission = emission.max(0.0);
        self
    }

    pub fn with_outline(mut self, weight: f32) -> Self {
        self.outline = weight.clamp(0.0, 1.0);
        self
    }

    pub fn with_texture(mut self, texture: TextureId) -> Self {
        self.diffuse_texture = Some(texture);
        self.with_shader(ShaderKind::Textured)
    }

    /// Require an extra named vertex attribute, e.g. `"tangent"`
    pub fn with_required_attribute(mut self, name: &'static str) -> Self {
        if !self.attributes.contains(&name) {
            self.attributes.push(name);
        }
        self
    }

    pub fn shader(&self) -> ShaderKind {
        self.shader
    }

    pub fn required_attributes(&self) -> &[&'static str] {
        &self.attributes
    }

    /// Resolve the parameters written for one draw.
    ///
    /// `env_slot` is 0 for no environment, 1 for the static environment and
    /// `2 + k` for dynamic cube map `k`.
    pub fn bind(&self, ctx: &ShadingContext, env_slot: u32) -> MaterialUniform {
        let slot = match env_slot {
            _ if self.reflectivity <= 0.0 => 0,
            1 if !ctx.has_static_environment => 0,
            slot => slot,
        };
        let reflectivity = if slot == 0 { 0.0 } else { self.reflectivity };
        let outline = if ctx.toon { self.outline } else { 0.0 };

        MaterialUniform {
            diffuse: self.diffuse,
            specular: self
                .specular
                .extend((self.shininess / 256.0).clamp(0.0, 1.0)),
            params: Vec4::new(reflectivity, slot as f32 / 255.0, self.emission, outline),
        }
    }

    // Preset materials

    pub fn plastic(color: Vec3) -> Self {
        Self::new("plastic")
            .with_diffuse(color.extend(1.0))
            .with_specular(Vec3::splat(0.6), 64.0)
    }

    pub fn matte(color: Vec3) -> Self {
        Self::new("matte")
            .with_diffuse(color.extend(1.0))
            .with_specular(Vec3::ZERO, 1.0)
    }

    pub fn mirror() -> Self {
        Self::new("mirror")
            .with_diffuse(Vec4::new(0.2, 0.2, 0.2, 1.0))
            .with_specular(Vec3::ONE, 128.0)
            .with_reflectivity(0.9)
    }

    pub fn faceted(color: Vec3) -> Self {
        Self::plastic(color).with_shader(ShaderKind::Flat)
    }

    pub fn emissive(color: Vec3, strength: f32) -> Self {
        Self::new("emissive")
            .with_diffuse(color.extend(1.0))
            .with_emission(strength)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_textured_material_requires_texcoords() {
        let material = Material::new("brick").with_texture(TextureId(0));
        assert_eq!(material.shader(), ShaderKind::Textured);
        assert!(material.required_attributes().contains(&"texcoord"));
    }

    #[test]
    fn test_extra_attributes_survive_shader_changes() {
        let material = Material::new("aniso")
            .with_required_attribute("tangent")
            .with_shader(ShaderKind::Flat);
        assert_eq!(material.required_attributes(), &["position", "tangent"]);
    }

    #[test]
    fn test_bind_drops_missing_static_environment() {
        let ctx = ShadingContext::default();
        let uniform = Material::mirror().bind(&ctx, 1);
        assert_eq!(uniform.params.x, 0.0);
        assert_eq!(uniform.params.y, 0.0);

        let with_env = ShadingContext {
            has_static_environment: true,
            ..Default::default()
        };
        let uniform = Material::mirror().bind(&with_env, 1);
        assert!((uniform.params.x - 0.9).abs() < 1e-6);
        assert!((uniform.params.y * 255.0 - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_outline_only_written_with_toon_shading() {
        let material = Material::plastic(Vec3::ONE).with_outline(0.8);
        assert_eq!(material.bind(&ShadingContext::default(), 0).params.w, 0.0);

        let toon = ShadingContext {
            toon: true,
            ..Default::default()
        };
        assert!((material.bind(&toon, 0).params.w - 0.8).abs() < 1e-6);
    }
}
