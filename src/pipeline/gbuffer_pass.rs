//! Geometry fill pass for deferred rendering
//!
//! Renders every draw item into the G-buffer (MRT):
//! - Diffuse color, with the eye-space normal x in alpha
//! - Eye-space position, with the normal y in alpha
//! - Specular color and shininess
//! - Reflectivity, environment slot, emission and outline weight
//! - Depth buffer

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::backend::{GpuBindGroup, GpuTexture};
use crate::error::{RenderError, RenderResult};
use crate::pipeline::frame::FrameData;
use crate::pipeline::framebuffer::TargetBinding;
use crate::pipeline::gpu_cache::GpuMesh;
use crate::pipeline::shader_cache::PipelineCache;
use crate::pipeline::targets;
use crate::pipeline::uniforms::UniformPool;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::resources::{Material, Mesh, ShaderKind};
use crate::scene::DrawItem;
use glam::Mat4;
use std::any::Any;

#[derive(Debug, Clone, Copy)]
struct GeometryLayouts {
    camera: BindGroupLayoutHandle,
    object: BindGroupLayoutHandle,
    texture: BindGroupLayoutHandle,
}

struct PreparedDraw<'f> {
    pipeline: RenderPipelineHandle,
    object: BindGroupHandle,
    texture: Option<BindGroupHandle>,
    mesh: &'f GpuMesh,
}

/// Fail if `material` needs a vertex attribute `mesh` does not carry
pub fn check_attributes(material: &Material, mesh: &Mesh) -> RenderResult<()> {
    match material
        .required_attributes()
        .iter()
        .find(|attribute| !mesh.has_attribute(attribute))
    {
        Some(attribute) => Err(RenderError::MissingVertexAttribute {
            material: material.name.clone(),
            mesh: mesh.name().to_string(),
            attribute: attribute.to_string(),
        }),
        None => Ok(()),
    }
}

/// Per-draw transforms and material parameters
pub fn object_uniform(item: &DrawItem, view: Mat4, material: &Material, frame: &FrameData) -> ObjectUniform {
    let model_view = view * item.world;
    let bound = material.bind(frame.shading, frame.env_slot(item.node));
    ObjectUniform {
        model_view,
        normal_matrix: model_view.inverse().transpose(),
        model: item.world,
        diffuse: bound.diffuse,
        specular: bound.specular,
        params: bound.params,
    }
}

/// Geometry fill pass
pub struct GeometryPass {
    diffuse: Option<ResourceId>,
    position: Option<ResourceId>,
    material0: Option<ResourceId>,
    material1: Option<ResourceId>,
    depth: Option<ResourceId>,
    layouts: Option<GeometryLayouts>,
    sampler: Option<SamplerHandle>,
    /// Bound when a textured material has no texture
    white: Option<GpuTexture>,
    pipelines: PipelineCache<(ShaderKind, FrontFace)>,
    camera: UniformPool,
    objects: UniformPool,
}

impl GeometryPass {
    pub fn new() -> Self {
        Self {
            diffuse: None,
            position: None,
            material0: None,
            material1: None,
            depth: None,
            layouts: None,
            sampler: None,
            white: None,
            pipelines: PipelineCache::new("geometry"),
            camera: UniformPool::new("geometry camera", std::mem::size_of::<CameraUniform>() as u64),
            objects: UniformPool::new("geometry object", std::mem::size_of::<ObjectUniform>() as u64),
        }
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    fn layouts(&mut self, backend: &mut dyn GraphicsBackend) -> RenderResult<GeometryLayouts> {
        if self.layouts.is_none() {
            self.prepare(backend)?;
        }
        self.layouts
            .ok_or_else(|| RenderError::Config("geometry layouts missing after prepare".into()))
    }

    fn pipeline(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        layouts: GeometryLayouts,
        shader: ShaderKind,
        front_face: FrontFace,
    ) -> RenderResult<RenderPipelineHandle> {
        self.pipelines
            .get_or_create(backend, (shader, front_face), |(shader, front_face)| {
                let (entry, bind_group_layouts) = match shader {
                    ShaderKind::Flat => ("fs_flat", vec![layouts.camera, layouts.object]),
                    ShaderKind::Smooth => ("fs_smooth", vec![layouts.camera, layouts.object]),
                    ShaderKind::Textured => (
                        "fs_textured",
                        vec![layouts.camera, layouts.object, layouts.texture],
                    ),
                };
                RenderPipelineDescriptor {
                    label: Some(format!("Geometry {:?} {:?}", shader, front_face)),
                    shader_source: GEOMETRY_SHADER.to_string(),
                    vertex_entry: "vs_main",
                    fragment_entry: Some(entry),
                    vertex_layouts: vec![Vertex::layout()],
                    bind_group_layouts,
                    primitive_topology: PrimitiveTopology::TriangleList,
                    front_face,
                    cull_mode: CullMode::Back,
                    depth_stencil: Some(DepthStencilState {
                        format: TextureFormat::Depth32Float,
                        depth_write_enabled: true,
                        depth_compare: CompareFunction::Less,
                    }),
                    color_targets: vec![
                        TextureFormat::Rgba16Float.into(),
                        TextureFormat::Rgba32Float.into(),
                        TextureFormat::Rgba8Unorm.into(),
                        TextureFormat::Rgba8Unorm.into(),
                    ],
                }
            })
    }

    /// Resolve pipelines, uniforms and textures for every draw before the
    /// render pass opens
    fn prepare_draws<'f>(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        frame: &'f FrameData<'f>,
        textures: &mut Vec<GpuBindGroup>,
    ) -> RenderResult<Vec<PreparedDraw<'f>>> {
        let layouts = self.layouts(backend)?;
        let front_face = frame.view.front_face();
        let mut prepared = Vec::with_capacity(frame.draws.len());

        for (index, item) in frame.draws.iter().enumerate() {
            let material = frame.assets.material(item.material)?;
            let mesh = frame.assets.mesh(item.mesh)?;
            check_attributes(material, mesh)?;
            let gpu_mesh = frame.meshes.get(item.mesh)?;

            let shader = material.shader();
            let pipeline = self.pipeline(backend, layouts, shader, front_face)?;
            let uniform = object_uniform(item, frame.view.view, material, frame);
            let object = self
                .objects
                .write(backend, layouts.object, index, bytemuck::bytes_of(&uniform))?;

            let texture = if shader == ShaderKind::Textured {
                let view = match material.diffuse_texture {
                    Some(id) => frame.textures.view(id)?,
                    None => self
                        .white
                        .as_ref()
                        .map(GpuTexture::view)
                        .ok_or_else(|| RenderError::Config("placeholder texture missing".into()))?,
                };
                let sampler = self
                    .sampler
                    .ok_or_else(|| RenderError::Config("geometry sampler missing".into()))?;
                let group = GpuBindGroup::new(
                    backend,
                    layouts.texture,
                    &[
                        (0, BindGroupEntry::Texture(view)),
                        (1, BindGroupEntry::Sampler(sampler)),
                    ],
                )?;
                let handle = group.handle();
                textures.push(group);
                Some(handle)
            } else {
                None
            };

            prepared.push(PreparedDraw {
                pipeline,
                object,
                texture,
                mesh: gpu_mesh,
            });
        }
        Ok(prepared)
    }
}

impl Default for GeometryPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for GeometryPass {
    fn name(&self) -> &str {
        "Geometry"
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        self.diffuse = ctx.resource(targets::GBUFFER_DIFFUSE);
        self.position = ctx.resource(targets::GBUFFER_POSITION);
        self.material0 = ctx.resource(targets::GBUFFER_MATERIAL0);
        self.material1 = ctx.resource(targets::GBUFFER_MATERIAL1);
        self.depth = ctx.resource(targets::GBUFFER_DEPTH);

        for color in [self.diffuse, self.position, self.material0, self.material1]
            .into_iter()
            .flatten()
        {
            ctx.write(color, ResourceUsage::RenderTarget);
        }
        if let Some(depth) = self.depth {
            ctx.write(depth, ResourceUsage::DepthWrite);
        }
    }

    fn prepare(&mut self, backend: &mut dyn GraphicsBackend) -> RenderResult<()> {
        if self.layouts.is_some() {
            return Ok(());
        }
        let camera = backend.create_bind_group_layout(&[BindGroupLayoutEntry::uniform(
            0,
            ShaderStageFlags::VERTEX_FRAGMENT,
        )])?;
        let object = backend.create_bind_group_layout(&[BindGroupLayoutEntry::uniform(
            0,
            ShaderStageFlags::VERTEX_FRAGMENT,
        )])?;
        let texture = backend.create_bind_group_layout(&[
            BindGroupLayoutEntry::texture(0, TextureSampleType::Float { filterable: true }),
            BindGroupLayoutEntry::sampler(1, false),
        ])?;
        self.sampler = Some(backend.create_sampler(&SamplerDescriptor {
            label: Some("geometry diffuse".into()),
            address_mode: AddressMode::Repeat,
            ..Default::default()
        })?);

        let white = GpuTexture::new(
            backend,
            TextureDescriptor {
                label: Some("white".into()),
                format: TextureFormat::Rgba8UnormSrgb,
                ..Default::default()
            },
            &TextureViewDescriptor::default(),
        )?;
        backend.write_texture(white.handle(), 0, &[255; 4]);
        self.white = Some(white);

        self.layouts = Some(GeometryLayouts {
            camera,
            object,
            texture,
        });
        Ok(())
    }

    fn checks_gpu_errors(&self) -> bool {
        true
    }

    fn execute(&mut self, ctx: &mut PassExecuteContext) -> RenderResult<()> {
        let frame = ctx.frame;
        let layouts = self.layouts(&mut *ctx.backend)?;

        let camera = self.camera.write(
            &mut *ctx.backend,
            layouts.camera,
            0,
            bytemuck::bytes_of(&frame.view.camera_uniform()),
        )?;
        let mut textures = Vec::new();
        let draws = self.prepare_draws(&mut *ctx.backend, frame, &mut textures)?;

        let mut pass = ctx.targets.gbuffer.bind(
            &mut *ctx.backend,
            &TargetBinding::all("Geometry", &ctx.targets.gbuffer, Some([0.0; 4])),
        )?;
        pass.set_bind_group(0, camera);
        for draw in &draws {
            pass.set_render_pipeline(draw.pipeline);
            pass.set_bind_group(1, draw.object);
            if let Some(texture) = draw.texture {
                pass.set_bind_group(2, texture);
            }
            draw.mesh.draw(&mut *pass);
        }

        log::trace!("Geometry pass recorded {} draws", draws.len());
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// G-buffer generation shader
pub const GEOMETRY_SHADER: &str = r#"
struct CameraUniforms {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    view_proj: mat4x4<f32>,
    inv_proj: mat4x4<f32>,
    position: vec4<f32>,
    near_far: vec4<f32>,
}

struct ObjectUniforms {
    model_view: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    model: mat4x4<f32>,
    diffuse: vec4<f32>,
    specular: vec4<f32>,
    params: vec4<f32>,
}

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) tangent: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) eye_position: vec3<f32>,
    @location(1) eye_normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct GBufferOutput {
    @location(0) diffuse: vec4<f32>,
    @location(1) position: vec4<f32>,
    @location(2) material0: vec4<f32>,
    @location(3) material1: vec4<f32>,
}

@group(0) @binding(0) var<uniform> camera: CameraUniforms;
@group(1) @binding(0) var<uniform> object: ObjectUniforms;
@group(2) @binding(0) var diffuse_texture: texture_2d<f32>;
@group(2) @binding(1) var diffuse_sampler: sampler;

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    let eye = object.model_view * vec4<f32>(input.position, 1.0);
    output.eye_position = eye.xyz;
    output.clip_position = camera.proj * eye;
    output.eye_normal = (object.normal_matrix * vec4<f32>(input.normal, 0.0)).xyz;
    output.uv = input.uv;
    return output;
}

// Normal z is rebuilt from x and y; it always faces the eye
fn pack(diffuse: vec3<f32>, position: vec3<f32>, normal: vec3<f32>) -> GBufferOutput {
    var n = normalize(normal);
    if (dot(n, position) > 0.0) {
        n = -n;
    }
    var output: GBufferOutput;
    output.diffuse = vec4<f32>(diffuse, n.x);
    output.position = vec4<f32>(position, n.y);
    output.material0 = object.specular;
    output.material1 = object.params;
    return output;
}

@fragment
fn fs_flat(input: VertexOutput) -> GBufferOutput {
    let p = input.eye_position;
    let normal = camera.near_far.z * cross(dpdy(p), dpdx(p));
    return pack(object.diffuse.rgb, p, normal);
}

@fragment
fn fs_smooth(input: VertexOutput) -> GBufferOutput {
    return pack(object.diffuse.rgb, input.eye_position, input.eye_normal);
}

@fragment
fn fs_textured(input: VertexOutput) -> GBufferOutput {
    let texel = textureSample(diffuse_texture, diffuse_sampler, input.uv);
    return pack(object.diffuse.rgb * texel.rgb, input.eye_position, input.eye_normal);
}
"#;
