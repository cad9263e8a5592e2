//! Deferred rendering pipeline
//!
//! Every displayed frame runs the same pass sequence, once per sub-pass:
//! 1. Geometry pass - Renders draw items into the G-buffer
//! 2. Gradient pass - Screen-space depth and normal gradients for outlines
//! 3. Lighting pass - Fullscreen Phong resolve with shadows and reflections
//! 4. Post-processing - Bloom, G-buffer preview or a plain blit to the output
//!
//! A shadow map is rendered first when a visible light casts shadows, then
//! six cube faces for each dynamic reflection probe, then the main view.

pub mod cube_map;
pub mod frame;
pub mod framebuffer;
pub mod gbuffer_pass;
pub mod gpu_cache;
pub mod gradient_pass;
pub mod lighting_pass;
pub mod postprocess;
pub mod renderer;
pub mod shader_cache;
pub mod shadow_pass;
pub mod targets;
pub mod uniforms;

pub use cube_map::DynamicCubeMap;
pub use frame::{EnvironmentBindings, FrameData, FrameKind, ShadowBinding};
pub use framebuffer::{AttachmentSpec, FramebufferTarget, RenderPassScope, TargetBinding};
pub use gbuffer_pass::GeometryPass;
pub use gradient_pass::GradientPass;
pub use lighting_pass::{LightArray, LightingPass};
pub use postprocess::{BloomPass, PresentMode, PresentPass};
pub use renderer::DeferredRenderer;
pub use shadow_pass::ShadowPass;
pub use targets::FrameTargets;

use crate::error::{RenderError, RenderResult};
use glam::{Vec3, Vec4};

/// Size of the light array in the lighting shader
pub const MAX_SHADER_LIGHTS: u32 = 16;

/// Reflection probes beyond this count are not rendered
pub const MAX_DYNAMIC_CUBE_MAPS: usize = 4;

/// Bloom parameters
#[derive(Debug, Clone, PartialEq)]
pub struct BloomSettings {
    /// Lit color above this value bleeds into its neighbours
    pub threshold: f32,
    pub intensity: f32,
    /// Blur taps on each side of the center texel
    pub radius: u32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            intensity: 0.6,
            radius: 6,
        }
    }
}

/// Shadow map parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowSettings {
    /// Square map size in texels; `None` follows the viewport size
    pub resolution: Option<u32>,
    /// Vertical field of view of the light, in degrees
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub bias: f32,
    /// PCF taps per axis
    pub samples: u32,
    /// Distance between PCF taps, in texels
    pub spread: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            resolution: Some(1024),
            fov: 90.0,
            near: 0.1,
            far: 50.0,
            bias: 0.002,
            samples: 3,
            spread: 1.0,
        }
    }
}

/// Configuration for the Deferred pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredConfig {
    /// Maximum number of lights, at most `MAX_SHADER_LIGHTS`
    pub max_lights: u32,
    /// Enable bloom post-processing
    pub enable_bloom: bool,
    pub bloom: BloomSettings,
    pub toon_shading: bool,
    /// Gradient sum above which a toon pixel is drawn as outline
    pub outline_threshold: f32,
    pub ambient: Vec3,
    pub clear_color: Vec4,
    pub shadow: ShadowSettings,
    pub cube_map_near: f32,
    pub cube_map_far: f32,
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self {
            max_lights: 8,
            enable_bloom: false,
            bloom: BloomSettings::default(),
            toon_shading: false,
            outline_threshold: 0.5,
            ambient: Vec3::splat(0.08),
            clear_color: Vec4::new(0.02, 0.02, 0.03, 1.0),
            shadow: ShadowSettings::default(),
            cube_map_near: 0.05,
            cube_map_far: 100.0,
        }
    }
}

impl DeferredConfig {
    pub fn validate(&self) -> RenderResult<()> {
        if self.max_lights == 0 || self.max_lights > MAX_SHADER_LIGHTS {
            return Err(RenderError::Config(format!(
                "max_lights must be in 1..={}, got {}",
                MAX_SHADER_LIGHTS, self.max_lights
            )));
        }
        if !(self.shadow.near > 0.0 && self.shadow.far > self.shadow.near) {
            return Err(RenderError::Config(format!(
                "shadow depth range {}..{} is empty",
                self.shadow.near, self.shadow.far
            )));
        }
        if !(self.cube_map_near > 0.0 && self.cube_map_far > self.cube_map_near) {
            return Err(RenderError::Config(format!(
                "cube map depth range {}..{} is empty",
                self.cube_map_near, self.cube_map_far
            )));
        }
        if self.shadow.resolution == Some(0) {
            return Err(RenderError::Config("shadow resolution must be positive".into()));
        }
        Ok(())
    }
}

/// Raw G-buffer channel shown instead of the lit image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GBufferChannel {
    Diffuse,
    Normal,
    Position,
    Specular,
    MaterialParams,
    Gradient,
}

impl GBufferChannel {
    pub const COUNT: usize = 6;

    pub const ALL: [GBufferChannel; Self::COUNT] = [
        GBufferChannel::Diffuse,
        GBufferChannel::Normal,
        GBufferChannel::Position,
        GBufferChannel::Specular,
        GBufferChannel::MaterialParams,
        GBufferChannel::Gradient,
    ];

    pub fn from_index(index: usize) -> RenderResult<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(RenderError::InvalidPreviewIndex {
                index,
                count: Self::COUNT,
            })
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(DeferredConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_light_limit_is_bounded_by_shader() {
        let config = DeferredConfig {
            max_lights: MAX_SHADER_LIGHTS + 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RenderError::Config(_))));

        let config = DeferredConfig {
            max_lights: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_depth_ranges_must_be_positive() {
        let mut config = DeferredConfig::default();
        config.shadow.far = config.shadow.near;
        assert!(config.validate().is_err());

        let config = DeferredConfig {
            cube_map_near: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_preview_index_round_trips() {
        for (i, channel) in GBufferChannel::ALL.iter().enumerate() {
            assert_eq!(GBufferChannel::from_index(i).unwrap(), *channel);
            assert_eq!(channel.index(), i);
        }
        assert_eq!(
            GBufferChannel::from_index(6),
            Err(RenderError::InvalidPreviewIndex { index: 6, count: 6 })
        );
    }
}
