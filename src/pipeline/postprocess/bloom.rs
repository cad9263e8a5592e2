//! Bloom post-processing effect
//!
//! First half of a separable blur: keeps the lit color above the threshold
//! and blurs it horizontally into the bloom target. The present pass blurs
//! vertically and adds the result.

use super::{PostUniform, GAUSSIAN_WGSL};
use crate::backend::traits::*;
use crate::backend::types::*;
use crate::backend::{GpuBindGroup, GpuBuffer};
use crate::error::{RenderError, RenderResult};
use crate::pipeline::frame::FrameData;
use crate::pipeline::framebuffer::TargetBinding;
use crate::pipeline::shader_cache::{draw_fullscreen, fullscreen_pipeline};
use crate::pipeline::{targets, BloomSettings};
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use glam::Vec4;
use std::any::Any;

struct BloomState {
    layout: BindGroupLayoutHandle,
    pipeline: RenderPipelineHandle,
    uniform: GpuBuffer,
}

/// Bloom threshold and horizontal blur pass
pub struct BloomPass {
    pub settings: BloomSettings,
    lit: Option<ResourceId>,
    bloom: Option<ResourceId>,
    state: Option<BloomState>,
}

impl BloomPass {
    pub fn new(settings: BloomSettings) -> Self {
        Self {
            settings,
            lit: None,
            bloom: None,
            state: None,
        }
    }

    fn uniform(&self) -> PostUniform {
        PostUniform {
            params: Vec4::new(
                self.settings.intensity,
                self.settings.radius as f32,
                0.0,
                self.settings.threshold,
            ),
        }
    }
}

impl Default for BloomPass {
    fn default() -> Self {
        Self::new(BloomSettings::default())
    }
}

impl RenderPass for BloomPass {
    fn name(&self) -> &str {
        "Bloom"
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        self.lit = ctx.resource(targets::LIT);
        self.bloom = ctx.resource(targets::BLOOM);
        if let Some(lit) = self.lit {
            ctx.read(lit);
        }
        if let Some(bloom) = self.bloom {
            ctx.write(bloom, ResourceUsage::RenderTarget);
        }
    }

    fn prepare(&mut self, backend: &mut dyn GraphicsBackend) -> RenderResult<()> {
        if self.state.is_some() {
            return Ok(());
        }
        let layout = backend.create_bind_group_layout(&[
            BindGroupLayoutEntry::uniform(0, ShaderStageFlags::FRAGMENT),
            BindGroupLayoutEntry::texture(1, TextureSampleType::Float { filterable: false }),
        ])?;
        let pipeline = backend.create_render_pipeline(&fullscreen_pipeline(
            "Bloom".into(),
            &format!("{}\n{}", GAUSSIAN_WGSL, BLOOM_SHADER),
            "fs_main",
            vec![layout],
            vec![TextureFormat::Rgba16Float.into()],
        ))?;
        let uniform = GpuBuffer::new(
            backend,
            &BufferDescriptor {
                label: Some("bloom uniform".into()),
                size: std::mem::size_of::<PostUniform>() as u64,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            },
        )?;
        self.state = Some(BloomState {
            layout,
            pipeline,
            uniform,
        });
        Ok(())
    }

    fn is_enabled(&self, frame: &FrameData) -> bool {
        frame.bloom
    }

    fn execute(&mut self, ctx: &mut PassExecuteContext) -> RenderResult<()> {
        if self.state.is_none() {
            self.prepare(&mut *ctx.backend)?;
        }
        let uniform = self.uniform();
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| RenderError::Config("bloom pipeline missing after prepare".into()))?;
        let lit = self
            .lit
            .ok_or_else(|| RenderError::InvalidAttachment("bloom input not registered".into()))?;

        ctx.backend
            .write_buffer(state.uniform.handle(), 0, bytemuck::bytes_of(&uniform));
        let entries = [
            (0, BindGroupEntry::Buffer(state.uniform.handle())),
            (1, BindGroupEntry::Texture(ctx.texture(lit)?)),
        ];
        let bind_group = GpuBindGroup::new(&mut *ctx.backend, state.layout, &entries)?;

        let target = &ctx.targets.bloom;
        let mut pass = target.bind(&mut *ctx.backend, &TargetBinding::all("Bloom", target, Some([0.0; 4])))?;
        pass.set_render_pipeline(state.pipeline);
        pass.set_bind_group(0, bind_group.handle());
        draw_fullscreen(&mut *pass);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub const BLOOM_SHADER: &str = r#"
struct PostUniforms {
    params: vec4<f32>,
}

@group(0) @binding(0) var<uniform> post: PostUniforms;
@group(0) @binding(1) var lit_texture: texture_2d<f32>;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let size = vec2<i32>(textureDimensions(lit_texture));
    let center = vec2<i32>(input.position.xy);
    let radius = i32(post.params.y);
    let threshold = post.params.w;

    var sum = vec3<f32>(0.0);
    var total = 0.0;
    for (var i = -radius; i <= radius; i += 1) {
        let texel = vec2<i32>(clamp(center.x + i, 0, size.x - 1), center.y);
        let color = textureLoad(lit_texture, texel, 0).rgb;
        let bright = max(color - vec3<f32>(threshold), vec3<f32>(0.0));
        let w = gaussian(i, radius);
        sum += bright * w;
        total += w;
    }
    return vec4<f32>(sum / total, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_carries_settings() {
        let pass = BloomPass::new(BloomSettings {
            threshold: 0.9,
            intensity: 0.4,
            radius: 3,
        });
        assert_eq!(pass.uniform().params, Vec4::new(0.4, 3.0, 0.0, 0.9));
    }
}
