//! Final pass writing into the frame output
//!
//! The output is the swapchain image for the main view and a cube face for
//! probe sub-passes, so pipelines are compiled per output format.

use super::{PostUniform, GAUSSIAN_WGSL};
use crate::backend::traits::*;
use crate::backend::types::*;
use crate::backend::{GpuBindGroup, GpuBuffer};
use crate::error::{RenderError, RenderResult};
use crate::pipeline::frame::FrameData;
use crate::pipeline::framebuffer::RenderPassScope;
use crate::pipeline::shader_cache::{draw_fullscreen, fullscreen_pipeline, PipelineCache};
use crate::pipeline::{targets, BloomSettings, GBufferChannel};
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use glam::Vec4;
use std::any::Any;

/// Which branch of the present shader runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentMode {
    /// Copy the lit image
    Blit,
    /// Add the vertically blurred bloom target to the lit image
    Bloom,
    /// Show one raw G-buffer channel
    Preview(GBufferChannel),
}

impl PresentMode {
    /// Bloom wins over a preview; previews only apply to the main view
    pub fn select(frame: &FrameData) -> Self {
        if frame.bloom {
            PresentMode::Bloom
        } else if let Some(channel) = frame.active_preview() {
            PresentMode::Preview(channel)
        } else {
            PresentMode::Blit
        }
    }

    fn entry_point(self) -> &'static str {
        match self {
            PresentMode::Blit => "fs_blit",
            PresentMode::Bloom => "fs_bloom",
            PresentMode::Preview(_) => "fs_preview",
        }
    }

    fn pipeline_key(self) -> u8 {
        match self {
            PresentMode::Blit => 0,
            PresentMode::Bloom => 1,
            PresentMode::Preview(_) => 2,
        }
    }
}

const INPUTS: [&str; 7] = [
    targets::LIT,
    targets::BLOOM,
    targets::GBUFFER_DIFFUSE,
    targets::GBUFFER_POSITION,
    targets::GBUFFER_MATERIAL0,
    targets::GBUFFER_MATERIAL1,
    targets::GRADIENT,
];

struct PresentState {
    layout: BindGroupLayoutHandle,
    uniform: GpuBuffer,
}

/// Present pass
pub struct PresentPass {
    pub bloom: BloomSettings,
    inputs: Vec<ResourceId>,
    output: Option<ResourceId>,
    state: Option<PresentState>,
    pipelines: PipelineCache<(TextureFormat, u8)>,
    last_mode: Option<PresentMode>,
}

impl PresentPass {
    pub fn new(bloom: BloomSettings) -> Self {
        Self {
            bloom,
            inputs: Vec::new(),
            output: None,
            state: None,
            pipelines: PipelineCache::new("present"),
            last_mode: None,
        }
    }

    /// Mode used by the most recent execution
    pub fn last_mode(&self) -> Option<PresentMode> {
        self.last_mode
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    fn uniform(&self, mode: PresentMode) -> PostUniform {
        let channel = match mode {
            PresentMode::Preview(channel) => channel.index() as f32,
            _ => 0.0,
        };
        PostUniform {
            params: Vec4::new(
                self.bloom.intensity,
                self.bloom.radius as f32,
                channel,
                self.bloom.threshold,
            ),
        }
    }
}

impl Default for PresentPass {
    fn default() -> Self {
        Self::new(BloomSettings::default())
    }
}

impl RenderPass for PresentPass {
    fn name(&self) -> &str {
        "Present"
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        self.inputs = INPUTS.iter().filter_map(|name| ctx.resource(name)).collect();
        for &input in &self.inputs {
            ctx.read(input);
        }
        self.output = ctx.resource(targets::OUTPUT);
        if let Some(output) = self.output {
            ctx.write(output, ResourceUsage::RenderTarget);
        }
    }

    fn prepare(&mut self, backend: &mut dyn GraphicsBackend) -> RenderResult<()> {
        if self.state.is_some() {
            return Ok(());
        }
        let mut entries = vec![BindGroupLayoutEntry::uniform(0, ShaderStageFlags::FRAGMENT)];
        for binding in 1..=INPUTS.len() as u32 {
            entries.push(BindGroupLayoutEntry::texture(
                binding,
                TextureSampleType::Float { filterable: false },
            ));
        }
        let layout = backend.create_bind_group_layout(&entries)?;
        let uniform = GpuBuffer::new(
            backend,
            &BufferDescriptor {
                label: Some("present uniform".into()),
                size: std::mem::size_of::<PostUniform>() as u64,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            },
        )?;
        self.state = Some(PresentState { layout, uniform });
        Ok(())
    }

    fn execute(&mut self, ctx: &mut PassExecuteContext) -> RenderResult<()> {
        if self.state.is_none() {
            self.prepare(&mut *ctx.backend)?;
        }
        if self.inputs.len() != INPUTS.len() {
            return Err(RenderError::InvalidAttachment("present inputs not registered".into()));
        }
        let output = self
            .output
            .ok_or_else(|| RenderError::InvalidAttachment("present output not registered".into()))?;

        let mode = PresentMode::select(ctx.frame);
        let uniform = self.uniform(mode);
        let format = ctx.frame.output_format;
        let layout = self
            .state
            .as_ref()
            .map(|state| state.layout)
            .ok_or_else(|| RenderError::Config("present layout missing after prepare".into()))?;
        let pipeline = self
            .pipelines
            .get_or_create(&mut *ctx.backend, (format, mode.pipeline_key()), |(format, _)| {
                fullscreen_pipeline(
                    format!("Present {:?}", mode),
                    &format!("{}\n{}", GAUSSIAN_WGSL, PRESENT_SHADER),
                    mode.entry_point(),
                    vec![layout],
                    vec![format.into()],
                )
            })?;
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| RenderError::Config("present layout missing after prepare".into()))?;

        ctx.backend
            .write_buffer(state.uniform.handle(), 0, bytemuck::bytes_of(&uniform));
        let mut entries = vec![(0, BindGroupEntry::Buffer(state.uniform.handle()))];
        for (binding, &input) in (1u32..).zip(&self.inputs) {
            entries.push((binding, BindGroupEntry::Texture(ctx.texture(input)?)));
        }
        let bind_group = GpuBindGroup::new(&mut *ctx.backend, state.layout, &entries)?;

        let view = ctx.texture(output)?;
        let (width, height) = ctx.targets.size();
        let desc = RenderPassDescriptor {
            label: Some("Present".into()),
            color_attachments: vec![ColorAttachment {
                view,
                load_op: LoadOp::Clear([0.0, 0.0, 0.0, 1.0]),
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: None,
        };
        {
            let mut pass = RenderPassScope::begin(&mut *ctx.backend, &desc, width, height);
            pass.set_render_pipeline(pipeline);
            pass.set_bind_group(0, bind_group.handle());
            draw_fullscreen(&mut *pass);
        }
        self.last_mode = Some(mode);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub const PRESENT_SHADER: &str = r#"
struct PostUniforms {
    params: vec4<f32>,
}

@group(0) @binding(0) var<uniform> post: PostUniforms;
@group(0) @binding(1) var lit_texture: texture_2d<f32>;
@group(0) @binding(2) var bloom_texture: texture_2d<f32>;
@group(0) @binding(3) var gbuffer_diffuse: texture_2d<f32>;
@group(0) @binding(4) var gbuffer_position: texture_2d<f32>;
@group(0) @binding(5) var gbuffer_material0: texture_2d<f32>;
@group(0) @binding(6) var gbuffer_material1: texture_2d<f32>;
@group(0) @binding(7) var gradient_texture: texture_2d<f32>;

@fragment
fn fs_blit(input: VertexOutput) -> @location(0) vec4<f32> {
    let texel = vec2<i32>(input.position.xy);
    return vec4<f32>(textureLoad(lit_texture, texel, 0).rgb, 1.0);
}

@fragment
fn fs_bloom(input: VertexOutput) -> @location(0) vec4<f32> {
    let size = vec2<i32>(textureDimensions(bloom_texture));
    let center = vec2<i32>(input.position.xy);
    let radius = i32(post.params.y);

    var sum = vec3<f32>(0.0);
    var total = 0.0;
    for (var i = -radius; i <= radius; i += 1) {
        let texel = vec2<i32>(center.x, clamp(center.y + i, 0, size.y - 1));
        let w = gaussian(i, radius);
        sum += textureLoad(bloom_texture, texel, 0).rgb * w;
        total += w;
    }
    let lit = textureLoad(lit_texture, center, 0).rgb;
    return vec4<f32>(lit + post.params.x * sum / total, 1.0);
}

@fragment
fn fs_preview(input: VertexOutput) -> @location(0) vec4<f32> {
    let texel = vec2<i32>(input.position.xy);
    let g0 = textureLoad(gbuffer_diffuse, texel, 0);
    let g1 = textureLoad(gbuffer_position, texel, 0);
    var color = vec3<f32>(0.0);
    switch (i32(post.params.z)) {
        case 0: {
            color = g0.rgb;
        }
        case 1: {
            let n = vec3<f32>(g0.a, g1.a, sqrt(max(1.0 - g0.a * g0.a - g1.a * g1.a, 0.0)));
            color = n * 0.5 + vec3<f32>(0.5);
        }
        case 2: {
            color = abs(g1.xyz) / (vec3<f32>(1.0) + abs(g1.xyz));
        }
        case 3: {
            color = textureLoad(gbuffer_material0, texel, 0).rgb;
        }
        case 4: {
            color = textureLoad(gbuffer_material1, texel, 0).rgb;
        }
        default: {
            color = textureLoad(gradient_texture, texel, 0).rgb;
        }
    }
    return vec4<f32>(color, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_uniform_carries_channel() {
        let pass = PresentPass::default();
        let params = pass.uniform(PresentMode::Preview(GBufferChannel::Specular)).params;
        assert_eq!(params.z, 3.0);
        assert_eq!(pass.uniform(PresentMode::Blit).params.z, 0.0);
    }

    #[test]
    fn test_preview_modes_share_a_pipeline() {
        let a = PresentMode::Preview(GBufferChannel::Diffuse);
        let b = PresentMode::Preview(GBufferChannel::Gradient);
        assert_eq!(a.pipeline_key(), b.pipeline_key());
        assert_ne!(PresentMode::Blit.pipeline_key(), PresentMode::Bloom.pipeline_key());
        assert_eq!(b.entry_point(), "fs_preview");
    }
}
