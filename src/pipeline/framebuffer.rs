//! Render target sets with selective binding
//!
//! A `FramebufferTarget` owns a fixed list of color attachments and an
//! optional depth attachment, all of one size. Passes bind any subset of the
//! color attachments; the returned `RenderPassScope` ends the render pass
//! when dropped, so an early `?` return never leaves a pass open.

use std::ops::{Deref, DerefMut};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::backend::GpuTexture;
use crate::error::{RenderError, RenderResult};

/// One color attachment: debug name, channel count (1, 3 or 4) and datatype
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentSpec {
    pub name: &'static str,
    pub channels: u32,
    pub ty: ChannelType,
}

impl AttachmentSpec {
    pub const fn new(name: &'static str, channels: u32, ty: ChannelType) -> Self {
        Self { name, channels, ty }
    }

    pub fn format(&self) -> RenderResult<TextureFormat> {
        TextureFormat::for_channels(self.channels, self.ty).ok_or_else(|| {
            RenderError::InvalidAttachment(format!(
                "{}: {} channels of {:?} is not a render format",
                self.name, self.channels, self.ty
            ))
        })
    }
}

/// Which attachments a pass renders into and whether they start cleared
#[derive(Debug, Clone)]
pub struct TargetBinding {
    pub label: String,
    /// Indices into the target's color attachments, in shader output order
    pub colors: Vec<usize>,
    pub depth: bool,
    /// Clear color for the bound colors; depth clears to 1.0. `None` loads.
    pub clear: Option<[f32; 4]>,
}

impl TargetBinding {
    pub fn all(label: &str, target: &FramebufferTarget, clear: Option<[f32; 4]>) -> Self {
        Self {
            label: label.to_string(),
            colors: (0..target.color_count()).collect(),
            depth: target.has_depth(),
            clear,
        }
    }
}

#[derive(Debug)]
struct ColorAttachmentTexture {
    spec: AttachmentSpec,
    texture: GpuTexture,
}

/// Owned color and depth textures of one size
#[derive(Debug)]
pub struct FramebufferTarget {
    label: String,
    width: u32,
    height: u32,
    colors: Vec<ColorAttachmentTexture>,
    depth: Option<GpuTexture>,
}

impl FramebufferTarget {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        label: &str,
        width: u32,
        height: u32,
        colors: &[AttachmentSpec],
        depth: bool,
    ) -> RenderResult<Self> {
        let width = width.max(1);
        let height = height.max(1);
        let usage = TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING;

        let colors = colors
            .iter()
            .map(|spec| {
                let desc = TextureDescriptor {
                    label: Some(format!("{}.{}", label, spec.name)),
                    width,
                    height,
                    array_layers: 1,
                    format: spec.format()?,
                    usage,
                };
                let texture = GpuTexture::new(backend, desc, &TextureViewDescriptor::default())?;
                Ok(ColorAttachmentTexture {
                    spec: *spec,
                    texture,
                })
            })
            .collect::<RenderResult<Vec<_>>>()?;

        let depth = if depth {
            let desc = TextureDescriptor {
                label: Some(format!("{}.depth", label)),
                width,
                height,
                array_layers: 1,
                format: TextureFormat::Depth32Float,
                usage,
            };
            Some(GpuTexture::new(backend, desc, &TextureViewDescriptor::default())?)
        } else {
            None
        };

        log::info!(
            "Created target '{}' {}x{} with {} color attachment(s){}",
            label,
            width,
            height,
            colors.len(),
            if depth.is_some() { " and depth" } else { "" }
        );

        Ok(Self {
            label: label.to_string(),
            width,
            height,
            colors,
            depth,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn color_count(&self) -> usize {
        self.colors.len()
    }

    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }

    fn color(&self, index: usize) -> RenderResult<&ColorAttachmentTexture> {
        self.colors.get(index).ok_or_else(|| {
            RenderError::InvalidAttachment(format!(
                "{}: color attachment {} of {}",
                self.label,
                index,
                self.colors.len()
            ))
        })
    }

    pub fn color_view(&self, index: usize) -> RenderResult<TextureViewHandle> {
        Ok(self.color(index)?.texture.view())
    }

    pub fn color_format(&self, index: usize) -> RenderResult<TextureFormat> {
        Ok(self.color(index)?.texture.desc().format)
    }

    pub fn color_spec(&self, index: usize) -> RenderResult<AttachmentSpec> {
        Ok(self.color(index)?.spec)
    }

    pub fn depth_view(&self) -> RenderResult<TextureViewHandle> {
        self.depth
            .as_ref()
            .map(GpuTexture::view)
            .ok_or_else(|| RenderError::InvalidAttachment(format!("{}: no depth attachment", self.label)))
    }

    /// Begin a render pass into the selected attachments
    pub fn bind<'a>(
        &self,
        backend: &'a mut dyn GraphicsBackend,
        binding: &TargetBinding,
    ) -> RenderResult<RenderPassScope<'a>> {
        let load_op = match binding.clear {
            Some(color) => LoadOp::Clear(color),
            None => LoadOp::Load,
        };

        let color_attachments = binding
            .colors
            .iter()
            .map(|&index| {
                Ok(ColorAttachment {
                    view: self.color_view(index)?,
                    load_op: load_op.clone(),
                    store_op: StoreOp::Store,
                })
            })
            .collect::<RenderResult<Vec<_>>>()?;

        let depth_stencil_attachment = if binding.depth {
            Some(DepthStencilAttachment {
                view: self.depth_view()?,
                depth_load_op: if binding.clear.is_some() {
                    LoadOp::Clear([1.0, 0.0, 0.0, 0.0])
                } else {
                    LoadOp::Load
                },
                depth_store_op: StoreOp::Store,
                depth_clear_value: 1.0,
            })
        } else {
            None
        };

        let desc = RenderPassDescriptor {
            label: Some(binding.label.clone()),
            color_attachments,
            depth_stencil_attachment,
        };
        Ok(RenderPassScope::begin(backend, &desc, self.width, self.height))
    }
}

/// An open render pass; ends the pass when dropped
pub struct RenderPassScope<'a> {
    backend: &'a mut dyn GraphicsBackend,
}

impl<'a> RenderPassScope<'a> {
    /// Begin `desc` and cover the full `width` x `height` viewport
    pub fn begin(
        backend: &'a mut dyn GraphicsBackend,
        desc: &RenderPassDescriptor,
        width: u32,
        height: u32,
    ) -> Self {
        backend.begin_render_pass(desc);
        backend.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
        Self { backend }
    }
}

impl<'a> Deref for RenderPassScope<'a> {
    type Target = dyn GraphicsBackend + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.backend
    }
}

impl<'a> DerefMut for RenderPassScope<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.backend
    }
}

impl Drop for RenderPassScope<'_> {
    fn drop(&mut self) {
        self.backend.end_render_pass();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{RecordedCommand, RecordingBackend};

    const SPECS: [AttachmentSpec; 3] = [
        AttachmentSpec::new("color", 3, ChannelType::U8),
        AttachmentSpec::new("hdr", 4, ChannelType::F16),
        AttachmentSpec::new("mask", 1, ChannelType::F32),
    ];

    #[test]
    fn test_three_channels_are_padded() {
        let mut backend = RecordingBackend::new(64, 64);
        let target = FramebufferTarget::new(&mut backend, "test", 32, 16, &SPECS, true).unwrap();
        assert_eq!(target.color_format(0).unwrap(), TextureFormat::Rgba8Unorm);
        assert_eq!(target.color_format(2).unwrap(), TextureFormat::R32Float);
        assert_eq!(target.size(), (32, 16));
        assert_eq!(backend.live_texture_count(), 4);
    }

    #[test]
    fn test_partial_binding_attaches_only_selected_colors() {
        let mut backend = RecordingBackend::new(64, 64);
        let target = FramebufferTarget::new(&mut backend, "test", 32, 32, &SPECS, true).unwrap();
        let binding = TargetBinding {
            label: "partial".into(),
            colors: vec![2, 0],
            depth: false,
            clear: None,
        };
        {
            let _scope = target.bind(&mut backend, &binding).unwrap();
        }

        assert_eq!(
            backend.commands()[0],
            RecordedCommand::BeginRenderPass {
                label: Some("partial".into()),
                color_views: vec![target.color_view(2).unwrap(), target.color_view(0).unwrap()],
                depth_view: None,
            }
        );
        assert_eq!(backend.commands().last(), Some(&RecordedCommand::EndRenderPass));
    }

    #[test]
    fn test_out_of_range_attachment_opens_no_pass() {
        let mut backend = RecordingBackend::new(64, 64);
        let target = FramebufferTarget::new(&mut backend, "test", 8, 8, &SPECS, false).unwrap();
        let binding = TargetBinding {
            label: "bad".into(),
            colors: vec![5],
            depth: false,
            clear: None,
        };
        assert!(matches!(
            target.bind(&mut backend, &binding),
            Err(RenderError::InvalidAttachment(_))
        ));
        let depth = TargetBinding {
            colors: vec![],
            depth: true,
            ..binding
        };
        assert!(target.bind(&mut backend, &depth).is_err());
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn test_unsupported_channel_count_is_rejected() {
        let mut backend = RecordingBackend::new(64, 64);
        let specs = [AttachmentSpec::new("rg", 2, ChannelType::F16)];
        assert!(FramebufferTarget::new(&mut backend, "test", 8, 8, &specs, false).is_err());
    }

    #[test]
    fn test_dropped_target_releases_textures() {
        let mut backend = RecordingBackend::new(64, 64);
        let target = FramebufferTarget::new(&mut backend, "test", 8, 8, &SPECS, true).unwrap();
        drop(target);
        for _ in 0..=crate::backend::deferred::MAX_FRAMES_IN_FLIGHT {
            backend.begin_frame().unwrap();
            backend.end_frame().unwrap();
        }
        assert_eq!(backend.live_texture_count(), 0);
    }
}
