//! Screen-space depth and normal gradients
//!
//! Compares every G-buffer texel with its 3x3 neighbourhood. Red holds the
//! largest relative eye-depth difference, green the largest normal
//! difference (`1 - dot`). Toon shading draws an outline where their sum
//! exceeds the outline threshold.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::backend::GpuBindGroup;
use crate::error::{RenderError, RenderResult};
use crate::pipeline::framebuffer::TargetBinding;
use crate::pipeline::shader_cache::{draw_fullscreen, fullscreen_pipeline};
use crate::pipeline::targets;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use std::any::Any;

#[derive(Debug, Clone, Copy)]
struct GradientState {
    layout: BindGroupLayoutHandle,
    pipeline: RenderPipelineHandle,
}

/// Gradient pass
pub struct GradientPass {
    diffuse: Option<ResourceId>,
    position: Option<ResourceId>,
    gradient: Option<ResourceId>,
    state: Option<GradientState>,
}

impl GradientPass {
    pub fn new() -> Self {
        Self {
            diffuse: None,
            position: None,
            gradient: None,
            state: None,
        }
    }
}

impl Default for GradientPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for GradientPass {
    fn name(&self) -> &str {
        "Gradient"
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        self.diffuse = ctx.resource(targets::GBUFFER_DIFFUSE);
        self.position = ctx.resource(targets::GBUFFER_POSITION);
        self.gradient = ctx.resource(targets::GRADIENT);

        for input in [self.diffuse, self.position].into_iter().flatten() {
            ctx.read(input);
        }
        if let Some(gradient) = self.gradient {
            ctx.write(gradient, ResourceUsage::RenderTarget);
        }
    }

    fn prepare(&mut self, backend: &mut dyn GraphicsBackend) -> RenderResult<()> {
        if self.state.is_some() {
            return Ok(());
        }
        let layout = backend.create_bind_group_layout(&[
            BindGroupLayoutEntry::texture(0, TextureSampleType::Float { filterable: false }),
            BindGroupLayoutEntry::texture(1, TextureSampleType::Float { filterable: false }),
        ])?;
        let pipeline = backend.create_render_pipeline(&fullscreen_pipeline(
            "Gradient".into(),
            GRADIENT_SHADER,
            "fs_main",
            vec![layout],
            vec![TextureFormat::Rgba16Float.into()],
        ))?;
        self.state = Some(GradientState { layout, pipeline });
        Ok(())
    }

    fn execute(&mut self, ctx: &mut PassExecuteContext) -> RenderResult<()> {
        if self.state.is_none() {
            self.prepare(&mut *ctx.backend)?;
        }
        let state = self
            .state
            .ok_or_else(|| RenderError::Config("gradient pipeline missing after prepare".into()))?;

        let (Some(diffuse), Some(position)) = (self.diffuse, self.position) else {
            return Err(RenderError::InvalidAttachment("gradient inputs not registered".into()));
        };
        let entries = [
            (0, BindGroupEntry::Texture(ctx.texture(diffuse)?)),
            (1, BindGroupEntry::Texture(ctx.texture(position)?)),
        ];
        let bind_group = GpuBindGroup::new(&mut *ctx.backend, state.layout, &entries)?;

        let target = &ctx.targets.gradient;
        let mut pass = target.bind(&mut *ctx.backend, &TargetBinding::all("Gradient", target, Some([0.0; 4])))?;
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

pub const GRADIENT_SHADER: &str = r#"
@group(0) @binding(0) var gbuffer_diffuse: texture_2d<f32>;
@group(0) @binding(1) var gbuffer_position: texture_2d<f32>;

fn normal_at(texel: vec2<i32>) -> vec3<f32> {
    let x = textureLoad(gbuffer_diffuse, texel, 0).a;
    let y = textureLoad(gbuffer_position, texel, 0).a;
    return vec3<f32>(x, y, sqrt(max(1.0 - x * x - y * y, 0.0)));
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let size = vec2<i32>(textureDimensions(gbuffer_position));
    let center = vec2<i32>(input.position.xy);
    let depth = textureLoad(gbuffer_position, center, 0).z;
    if (depth == 0.0) {
        return vec4<f32>(0.0);
    }
    let normal = normal_at(center);

    var depth_gradient = 0.0;
    var normal_gradient = 0.0;
    for (var dy = -1; dy <= 1; dy += 1) {
        for (var dx = -1; dx <= 1; dx += 1) {
            let texel = clamp(center + vec2<i32>(dx, dy), vec2<i32>(0), size - vec2<i32>(1));
            let d = textureLoad(gbuffer_position, texel, 0).z;
            if (d == 0.0) {
                // Silhouette against the background
                depth_gradient = 1.0;
                continue;
            }
            depth_gradient = max(depth_gradient, abs(d - depth) / abs(depth));
            normal_gradient = max(normal_gradient, 1.0 - dot(normal, normal_at(texel)));
        }
    }
    return vec4<f32>(depth_gradient, normal_gradient, 0.0, 1.0);
}
"#;
