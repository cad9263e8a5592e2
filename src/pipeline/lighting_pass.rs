//! Deferred lighting pass
//!
//! Resolves the G-buffer with one fullscreen draw: Phong lighting from every
//! visible light, percentage-closer shadows from the shadow-casting light,
//! environment reflections, emission and toon outlines.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::backend::{GpuBindGroup, GpuBuffer, GpuTexture};
use crate::error::{RenderError, RenderResult};
use crate::pipeline::frame::FrameData;
use crate::pipeline::framebuffer::TargetBinding;
use crate::pipeline::shader_cache::{draw_fullscreen, fullscreen_pipeline};
use crate::pipeline::{targets, MAX_DYNAMIC_CUBE_MAPS, MAX_SHADER_LIGHTS};
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::scene::{CollectedLight, GpuLight};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use std::any::Any;

/// Lights packed into the shader's fixed-size array
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightArray {
    pub lights: [GpuLight; MAX_SHADER_LIGHTS as usize],
    pub count: u32,
}

impl LightArray {
    /// Pack `lights` in the eye space of `view`.
    ///
    /// Fails with `NoLights` for an empty list and with `TooManyLights` when
    /// more than `max` lights are visible.
    pub fn pack(lights: &[CollectedLight], view: Mat4, max: u32) -> RenderResult<Self> {
        if lights.is_empty() {
            return Err(RenderError::NoLights);
        }
        let max = max.min(MAX_SHADER_LIGHTS) as usize;
        if lights.len() > max {
            return Err(RenderError::TooManyLights {
                count: lights.len(),
                max,
            });
        }

        let mut packed = [GpuLight::default(); MAX_SHADER_LIGHTS as usize];
        for (slot, light) in packed.iter_mut().zip(lights) {
            *slot = light.to_gpu(view);
        }
        Ok(Self {
            lights: packed,
            count: lights.len() as u32,
        })
    }
}

/// Lighting uniform data
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LightingUniform {
    pub lights: [GpuLight; MAX_SHADER_LIGHTS as usize],
    /// Eye space to world space rotation, for environment lookups
    pub inv_view_rotation: Mat4,
    /// Eye space to shadow map clip space
    pub shadow_matrix: Mat4,
    pub ambient: Vec4,
    pub background: Vec4,
    /// x = light count, y = toon flag, z = outline threshold, w = shadow light index or -1
    pub params: Vec4,
    /// x = bias, y = samples per axis, z = spread, w = shadow map texel size
    pub shadow: Vec4,
}

impl LightingUniform {
    pub fn new(lights: &LightArray, frame: &FrameData) -> Self {
        let shading = frame.shading;
        let shadow_light = frame
            .shadow
            .and(frame.lights.iter().position(|l| l.light.casts_shadows))
            .map_or(-1.0, |index| index as f32);
        let shadow = match (shading.shadow, frame.shadow) {
            (Some(params), Some(binding)) => {
                Vec4::new(params.bias, params.samples as f32, params.spread, binding.texel)
            }
            _ => Vec4::ZERO,
        };

        Self {
            lights: lights.lights,
            inv_view_rotation: Mat4::from_mat3(frame.view.inv_view_rotation()),
            shadow_matrix: frame.shadow_matrix(),
            ambient: shading.ambient.extend(1.0),
            background: shading.background,
            params: Vec4::new(
                lights.count as f32,
                if shading.toon { 1.0 } else { 0.0 },
                shading.outline_threshold,
                shadow_light,
            ),
            shadow,
        }
    }
}

struct LightingState {
    layout: BindGroupLayoutHandle,
    pipeline: RenderPipelineHandle,
    uniform: GpuBuffer,
    env_sampler: SamplerHandle,
    shadow_sampler: SamplerHandle,
    black_cube: GpuTexture,
    empty_shadow: GpuTexture,
}

/// Deferred lighting pass
pub struct LightingPass {
    max_lights: u32,
    inputs: Vec<ResourceId>,
    lit: Option<ResourceId>,
    state: Option<LightingState>,
}

impl LightingPass {
    pub fn new(max_lights: u32) -> Self {
        Self {
            max_lights,
            inputs: Vec::new(),
            lit: None,
            state: None,
        }
    }

    pub fn max_lights(&self) -> u32 {
        self.max_lights
    }

    fn bind_group(&self, ctx: &mut PassExecuteContext, state: &LightingState) -> RenderResult<GpuBindGroup> {
        let frame = ctx.frame;
        let mut entries = vec![(0, BindGroupEntry::Buffer(state.uniform.handle()))];
        for (binding, &input) in (1u32..).zip(&self.inputs) {
            entries.push((binding, BindGroupEntry::Texture(ctx.texture(input)?)));
        }

        let black = state.black_cube.view();
        entries.push((6, BindGroupEntry::Sampler(state.env_sampler)));
        entries.push((7, BindGroupEntry::Texture(frame.environment.static_env.unwrap_or(black))));
        for (slot, view) in frame.environment.dynamic.iter().enumerate() {
            entries.push((8 + slot as u32, BindGroupEntry::Texture(view.unwrap_or(black))));
        }
        let shadow = frame.shadow.map_or(state.empty_shadow.view(), |s| s.view);
        entries.push((12, BindGroupEntry::Texture(shadow)));
        entries.push((13, BindGroupEntry::Sampler(state.shadow_sampler)));

        Ok(GpuBindGroup::new(&mut *ctx.backend, state.layout, &entries)?)
    }
}

impl RenderPass for LightingPass {
    fn name(&self) -> &str {
        "Lighting"
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        // Bindings 1..=5, in shader order
        self.inputs = [
            targets::GBUFFER_DIFFUSE,
            targets::GBUFFER_POSITION,
            targets::GBUFFER_MATERIAL0,
            targets::GBUFFER_MATERIAL1,
            targets::GRADIENT,
        ]
        .iter()
        .filter_map(|name| ctx.resource(name))
        .collect();
        for &input in &self.inputs {
            ctx.read(input);
        }

        self.lit = ctx.resource(targets::LIT);
        if let Some(lit) = self.lit {
            ctx.write(lit, ResourceUsage::RenderTarget);
        }
    }

    fn prepare(&mut self, backend: &mut dyn GraphicsBackend) -> RenderResult<()> {
        if self.state.is_some() {
            return Ok(());
        }

        let gbuffer = TextureSampleType::Float { filterable: false };
        let mut entries = vec![BindGroupLayoutEntry::uniform(0, ShaderStageFlags::FRAGMENT)];
        entries.extend((1..=5).map(|binding| BindGroupLayoutEntry::texture(binding, gbuffer)));
        entries.push(BindGroupLayoutEntry::sampler(6, false));
        entries.extend((7..8 + MAX_DYNAMIC_CUBE_MAPS as u32).map(BindGroupLayoutEntry::cube_texture));
        entries.push(BindGroupLayoutEntry::texture(12, TextureSampleType::Depth));
        entries.push(BindGroupLayoutEntry::sampler(13, true));
        let layout = backend.create_bind_group_layout(&entries)?;

        let pipeline = backend.create_render_pipeline(&fullscreen_pipeline(
            "Lighting".into(),
            LIGHTING_SHADER,
            "fs_main",
            vec![layout],
            vec![TextureFormat::Rgba16Float.into()],
        ))?;

        let uniform = GpuBuffer::new(
            backend,
            &BufferDescriptor {
                label: Some("lighting uniform".into()),
                size: std::mem::size_of::<LightingUniform>() as u64,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            },
        )?;
        let env_sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some("environment".into()),
            ..Default::default()
        })?;
        let shadow_sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some("shadow".into()),
            compare: Some(CompareFunction::LessEqual),
            ..Default::default()
        })?;

        let black_cube = GpuTexture::new(
            backend,
            TextureDescriptor {
                label: Some("black cube".into()),
                array_layers: 6,
                ..Default::default()
            },
            &TextureViewDescriptor::cube(),
        )?;
        for layer in 0..6 {
            backend.write_texture(black_cube.handle(), layer, &[0, 0, 0, 255]);
        }
        let empty_shadow = GpuTexture::new(
            backend,
            TextureDescriptor {
                label: Some("empty shadow".into()),
                format: TextureFormat::Depth32Float,
                usage: TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT,
                ..Default::default()
            },
            &TextureViewDescriptor::default(),
        )?;

        self.state = Some(LightingState {
            layout,
            pipeline,
            uniform,
            env_sampler,
            shadow_sampler,
            black_cube,
            empty_shadow,
        });
        Ok(())
    }

    fn checks_gpu_errors(&self) -> bool {
        true
    }

    fn execute(&mut self, ctx: &mut PassExecuteContext) -> RenderResult<()> {
        let frame = ctx.frame;
        let lights = LightArray::pack(frame.lights, frame.view.view, self.max_lights)?;

        if self.state.is_none() {
            self.prepare(&mut *ctx.backend)?;
        }
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| RenderError::Config("lighting pipeline missing after prepare".into()))?;

        let uniform = LightingUniform::new(&lights, frame);
        ctx.backend
            .write_buffer(state.uniform.handle(), 0, bytemuck::bytes_of(&uniform));
        let bind_group = self.bind_group(ctx, state)?;

        let clear = frame.shading.background.to_array();
        let target = &ctx.targets.lit;
        let mut pass = target.bind(&mut *ctx.backend, &TargetBinding::all("Lighting", target, Some(clear)))?;
        pass.set_render_pipeline(state.pipeline);
        pass.set_bind_group(0, bind_group.handle());
        draw_fullscreen(&mut *pass);

        log::trace!("Lighting pass resolved {} lights", lights.count);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Deferred lighting shader
pub const LIGHTING_SHADER: &str = r#"
struct Light {
    position: vec4<f32>,
    color: vec4<f32>,
    attenuation: vec4<f32>,
}

struct LightingUniforms {
    lights: array<Light, 16>,
    inv_view_rotation: mat4x4<f32>,
    shadow_matrix: mat4x4<f32>,
    ambient: vec4<f32>,
    background: vec4<f32>,
    params: vec4<f32>,
    shadow: vec4<f32>,
}

@group(0) @binding(0) var<uniform> lighting: LightingUniforms;
@group(0) @binding(1) var gbuffer_diffuse: texture_2d<f32>;
@group(0) @binding(2) var gbuffer_position: texture_2d<f32>;
@group(0) @binding(3) var gbuffer_material0: texture_2d<f32>;
@group(0) @binding(4) var gbuffer_material1: texture_2d<f32>;
@group(0) @binding(5) var gradient_texture: texture_2d<f32>;
@group(0) @binding(6) var env_sampler: sampler;
@group(0) @binding(7) var static_env: texture_cube<f32>;
@group(0) @binding(8) var dynamic_env0: texture_cube<f32>;
@group(0) @binding(9) var dynamic_env1: texture_cube<f32>;
@group(0) @binding(10) var dynamic_env2: texture_cube<f32>;
@group(0) @binding(11) var dynamic_env3: texture_cube<f32>;
@group(0) @binding(12) var shadow_map: texture_depth_2d;
@group(0) @binding(13) var shadow_sampler: sampler_comparison;

fn sample_environment(slot: i32, direction: vec3<f32>) -> vec3<f32> {
    switch slot {
        case 1: { return textureSampleLevel(static_env, env_sampler, direction, 0.0).rgb; }
        case 2: { return textureSampleLevel(dynamic_env0, env_sampler, direction, 0.0).rgb; }
        case 3: { return textureSampleLevel(dynamic_env1, env_sampler, direction, 0.0).rgb; }
        case 4: { return textureSampleLevel(dynamic_env2, env_sampler, direction, 0.0).rgb; }
        case 5: { return textureSampleLevel(dynamic_env3, env_sampler, direction, 0.0).rgb; }
        default: { return vec3<f32>(0.0); }
    }
}

// Fraction of PCF taps that see the light
fn shadow_visibility(position: vec3<f32>) -> f32 {
    let clip = lighting.shadow_matrix * vec4<f32>(position, 1.0);
    if (clip.w <= 0.0) {
        return 1.0;
    }
    let ndc = clip.xyz / clip.w;
    if (abs(ndc.x) > 1.0 || abs(ndc.y) > 1.0 || ndc.z > 1.0) {
        return 1.0;
    }
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    let compare_depth = ndc.z - lighting.shadow.x;
    let samples = max(i32(lighting.shadow.y), 1);
    let spacing = lighting.shadow.z * lighting.shadow.w;
    let center = f32(samples - 1) * 0.5;

    var lit = 0.0;
    for (var y = 0; y < samples; y += 1) {
        for (var x = 0; x < samples; x += 1) {
            let offset = (vec2<f32>(f32(x), f32(y)) - vec2<f32>(center)) * spacing;
            lit += textureSampleCompareLevel(shadow_map, shadow_sampler, uv + offset, compare_depth);
        }
    }
    return lit / f32(samples * samples);
}

fn toon_band(value: f32) -> f32 {
    return ceil(value * 3.0) / 3.0;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let texel = vec2<i32>(input.position.xy);
    let g0 = textureLoad(gbuffer_diffuse, texel, 0);
    let g1 = textureLoad(gbuffer_position, texel, 0);
    let position = g1.xyz;
    if (position.z == 0.0) {
        return lighting.background;
    }
    let m0 = textureLoad(gbuffer_material0, texel, 0);
    let m1 = textureLoad(gbuffer_material1, texel, 0);

    let normal = vec3<f32>(g0.a, g1.a, sqrt(max(1.0 - g0.a * g0.a - g1.a * g1.a, 0.0)));
    let diffuse = g0.rgb;
    let specular = m0.rgb;
    let shininess = max(m0.a * 256.0, 1.0);
    let view_dir = normalize(-position);
    let toon = lighting.params.y > 0.5;
    let shadow_light = i32(lighting.params.w);

    var color = lighting.ambient.rgb * diffuse;
    let count = u32(lighting.params.x);
    for (var i = 0u; i < count; i += 1u) {
        let light = lighting.lights[i];
        var to_light = normalize(light.position.xyz);
        var attenuation = 1.0;
        if (light.position.w > 0.5) {
            let offset = light.position.xyz - position;
            let dist = length(offset);
            to_light = offset / max(dist, 0.0001);
            let falloff = light.attenuation.x
                + light.attenuation.y * dist
                + light.attenuation.z * dist * dist;
            attenuation = 1.0 / max(falloff, 0.0001);
        }

        var lambert = max(dot(normal, to_light), 0.0);
        var phong = 0.0;
        if (lambert > 0.0) {
            phong = pow(max(dot(reflect(-to_light, normal), view_dir), 0.0), shininess);
        }
        if (toon) {
            lambert = toon_band(lambert);
            phong = step(0.5, phong);
        }

        var visibility = 1.0;
        if (i32(i) == shadow_light) {
            visibility = shadow_visibility(position);
        }
        color += visibility * attenuation * light.color.rgb * (diffuse * lambert + specular * phong);
    }

    let reflectivity = m1.x;
    let slot = i32(round(m1.y * 255.0));
    if (reflectivity > 0.0 && slot > 0) {
        let reflected = reflect(-view_dir, normal);
        let world_dir = (lighting.inv_view_rotation * vec4<f32>(reflected, 0.0)).xyz;
        color = mix(color, sample_environment(slot, world_dir), reflectivity);
    }

    color += diffuse * m1.z;

    if (toon) {
        let gradient = textureLoad(gradient_texture, texel, 0);
        if ((gradient.r + gradient.g) * m1.w > lighting.params.z) {
            color = vec3<f32>(0.0);
        }
    }

    return vec4<f32>(color, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Light, NodeId};
    use glam::Vec3;

    fn lights(count: usize) -> Vec<CollectedLight> {
        (0..count)
            .map(|i| CollectedLight {
                node: NodeId(i + 1),
                light: Light::point(Vec3::ONE),
                position: Vec3::new(i as f32, 0.0, 0.0),
                direction: Vec3::NEG_Z,
            })
            .collect()
    }

    #[test]
    fn test_no_lights_is_an_error() {
        assert_eq!(
            LightArray::pack(&[], Mat4::IDENTITY, 8),
            Err(RenderError::NoLights)
        );
    }

    #[test]
    fn test_overflow_names_both_counts() {
        assert_eq!(
            LightArray::pack(&lights(9), Mat4::IDENTITY, 8),
            Err(RenderError::TooManyLights { count: 9, max: 8 })
        );
    }

    #[test]
    fn test_limit_is_capped_by_shader_array() {
        assert_eq!(
            LightArray::pack(&lights(17), Mat4::IDENTITY, 64),
            Err(RenderError::TooManyLights { count: 17, max: 16 })
        );
    }

    #[test]
    fn test_lights_are_packed_in_eye_space() {
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        let packed = LightArray::pack(&lights(3), view, 8).unwrap();
        assert_eq!(packed.count, 3);
        assert_eq!(packed.lights[2].position, Vec4::new(2.0, 0.0, -5.0, 1.0));
        assert_eq!(packed.lights[3], GpuLight::default());
    }

    #[test]
    fn test_uniform_matches_shader_layout() {
        // 16 lights of three vec4s, two mat4s, four vec4s
        assert_eq!(std::mem::size_of::<LightingUniform>(), 16 * 48 + 2 * 64 + 4 * 16);
        assert!(LIGHTING_SHADER.contains("array<Light, 16>"));
    }
}
