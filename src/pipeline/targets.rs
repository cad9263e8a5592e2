//! Intermediate render targets of one sub-pass size

use crate::backend::traits::*;
use crate::backend::types::ChannelType;
use crate::error::RenderResult;

use super::framebuffer::{AttachmentSpec, FramebufferTarget};

pub const GBUFFER_DIFFUSE: &str = "gbuffer.diffuse";
pub const GBUFFER_POSITION: &str = "gbuffer.position";
pub const GBUFFER_MATERIAL0: &str = "gbuffer.material0";
pub const GBUFFER_MATERIAL1: &str = "gbuffer.material1";
pub const GBUFFER_DEPTH: &str = "gbuffer.depth";
pub const GRADIENT: &str = "gradient";
pub const LIT: &str = "lit";
pub const BLOOM: &str = "bloom";
/// Swapchain image or cube face view the post-process pass writes
pub const OUTPUT: &str = "output";

/// Color attachment indices of the G-buffer target
pub mod gbuffer {
    pub const DIFFUSE: usize = 0;
    pub const POSITION: usize = 1;
    pub const MATERIAL0: usize = 2;
    pub const MATERIAL1: usize = 3;
}

/// rgb diffuse + normal x, eye position + normal y, specular + shininess,
/// reflectivity / env slot / emission / outline
const GBUFFER_SPECS: [AttachmentSpec; 4] = [
    AttachmentSpec::new("diffuse", 4, ChannelType::F16),
    AttachmentSpec::new("position", 4, ChannelType::F32),
    AttachmentSpec::new("material0", 4, ChannelType::U8),
    AttachmentSpec::new("material1", 4, ChannelType::U8),
];

const GRADIENT_SPECS: [AttachmentSpec; 1] = [AttachmentSpec::new("gradient", 4, ChannelType::F16)];
const LIT_SPECS: [AttachmentSpec; 1] = [AttachmentSpec::new("lit", 4, ChannelType::F16)];
const BLOOM_SPECS: [AttachmentSpec; 1] = [AttachmentSpec::new("bloom", 4, ChannelType::F16)];

/// G-buffer, gradient, lit and bloom targets for one viewport size
#[derive(Debug)]
pub struct FrameTargets {
    pub gbuffer: FramebufferTarget,
    pub gradient: FramebufferTarget,
    pub lit: FramebufferTarget,
    pub bloom: FramebufferTarget,
}

impl FrameTargets {
    pub fn new(backend: &mut dyn GraphicsBackend, label: &str, width: u32, height: u32) -> RenderResult<Self> {
        Ok(Self {
            gbuffer: FramebufferTarget::new(
                backend,
                &format!("{}.gbuffer", label),
                width,
                height,
                &GBUFFER_SPECS,
                true,
            )?,
            gradient: FramebufferTarget::new(
                backend,
                &format!("{}.gradient", label),
                width,
                height,
                &GRADIENT_SPECS,
                false,
            )?,
            lit: FramebufferTarget::new(backend, &format!("{}.lit", label), width, height, &LIT_SPECS, false)?,
            bloom: FramebufferTarget::new(
                backend,
                &format!("{}.bloom", label),
                width,
                height,
                &BLOOM_SPECS,
                false,
            )?,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        self.gbuffer.size()
    }

    /// Views for every graph resource except the output
    pub fn views(&self) -> RenderResult<Vec<(&'static str, TextureViewHandle)>> {
        Ok(vec![
            (GBUFFER_DIFFUSE, self.gbuffer.color_view(gbuffer::DIFFUSE)?),
            (GBUFFER_POSITION, self.gbuffer.color_view(gbuffer::POSITION)?),
            (GBUFFER_MATERIAL0, self.gbuffer.color_view(gbuffer::MATERIAL0)?),
            (GBUFFER_MATERIAL1, self.gbuffer.color_view(gbuffer::MATERIAL1)?),
            (GBUFFER_DEPTH, self.gbuffer.depth_view()?),
            (GRADIENT, self.gradient.color_view(0)?),
            (LIT, self.lit.color_view(0)?),
            (BLOOM, self.bloom.color_view(0)?),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::TextureFormat;
    use crate::backend::RecordingBackend;

    #[test]
    fn test_gbuffer_layout() {
        let mut backend = RecordingBackend::new(64, 64);
        let targets = FrameTargets::new(&mut backend, "main", 64, 48).unwrap();
        assert_eq!(
            targets.gbuffer.color_format(gbuffer::POSITION).unwrap(),
            TextureFormat::Rgba32Float
        );
        assert_eq!(
            targets.gbuffer.color_format(gbuffer::MATERIAL1).unwrap(),
            TextureFormat::Rgba8Unorm
        );
        assert_eq!(targets.size(), (64, 48));
        // 4 G-buffer colors, depth, gradient, lit, bloom
        assert_eq!(backend.live_texture_count(), 8);
    }

    #[test]
    fn test_views_are_distinct() {
        let mut backend = RecordingBackend::new(16, 16);
        let targets = FrameTargets::new(&mut backend, "main", 16, 16).unwrap();
        let views = targets.views().unwrap();
        let unique: std::collections::HashSet<_> = views.iter().map(|(_, v)| *v).collect();
        assert_eq!(unique.len(), views.len());
        assert!(views.iter().all(|(name, _)| *name != OUTPUT));
    }
}
