//! Shadow map sub-pass
//!
//! Renders the depth of every draw item from the shadow-casting light. Runs
//! before the graph, once per frame, and hands the lighting pass a
//! `ShadowBinding`.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{RenderError, RenderResult};
use crate::pipeline::frame::ShadowBinding;
use crate::pipeline::framebuffer::{FramebufferTarget, TargetBinding};
use crate::pipeline::gbuffer_pass::GEOMETRY_SHADER;
use crate::pipeline::gpu_cache::GpuMeshCache;
use crate::pipeline::uniforms::UniformPool;
use crate::scene::{DrawItem, ViewParams};

#[derive(Debug, Clone, Copy)]
struct ShadowState {
    camera_layout: BindGroupLayoutHandle,
    object_layout: BindGroupLayoutHandle,
    pipeline: RenderPipelineHandle,
}

/// Depth-only rendering from a light
pub struct ShadowPass {
    target: Option<FramebufferTarget>,
    state: Option<ShadowState>,
    camera: UniformPool,
    objects: UniformPool,
}

impl ShadowPass {
    pub fn new() -> Self {
        Self {
            target: None,
            state: None,
            camera: UniformPool::new("shadow camera", std::mem::size_of::<CameraUniform>() as u64),
            objects: UniformPool::new("shadow object", std::mem::size_of::<ObjectUniform>() as u64),
        }
    }

    pub fn prepare(&mut self, backend: &mut dyn GraphicsBackend) -> RenderResult<()> {
        if self.state.is_some() {
            return Ok(());
        }
        let camera_layout = backend.create_bind_group_layout(&[BindGroupLayoutEntry::uniform(
            0,
            ShaderStageFlags::VERTEX_FRAGMENT,
        )])?;
        let object_layout = backend.create_bind_group_layout(&[BindGroupLayoutEntry::uniform(
            0,
            ShaderStageFlags::VERTEX_FRAGMENT,
        )])?;
        let pipeline = backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Shadow".into()),
            shader_source: GEOMETRY_SHADER.to_string(),
            vertex_entry: "vs_main",
            fragment_entry: None,
            vertex_layouts: vec![Vertex::layout()],
            bind_group_layouts: vec![camera_layout, object_layout],
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            depth_stencil: Some(DepthStencilState {
                format: TextureFormat::Depth32Float,
                depth_write_enabled: true,
                depth_compare: CompareFunction::Less,
            }),
            color_targets: Vec::new(),
        })?;
        self.state = Some(ShadowState {
            camera_layout,
            object_layout,
            pipeline,
        });
        Ok(())
    }

    /// Current map size, if one has been rendered
    pub fn resolution(&self) -> Option<u32> {
        self.target.as_ref().map(FramebufferTarget::width)
    }

    fn ensure_target(&mut self, backend: &mut dyn GraphicsBackend, resolution: u32) -> RenderResult<&FramebufferTarget> {
        if self.resolution() != Some(resolution) {
            self.target = None;
            self.target = Some(FramebufferTarget::new(
                backend,
                "shadow",
                resolution,
                resolution,
                &[],
                true,
            )?);
        }
        self.target
            .as_ref()
            .ok_or_else(|| RenderError::InvalidAttachment("shadow map missing".into()))
    }

    /// Render `draws` into a square map of `resolution` texels seen from `view`
    pub fn render(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        view: &ViewParams,
        draws: &[DrawItem],
        meshes: &GpuMeshCache,
        resolution: u32,
    ) -> RenderResult<ShadowBinding> {
        self.prepare(backend)?;
        let state = self
            .state
            .ok_or_else(|| RenderError::Config("shadow pipeline missing after prepare".into()))?;

        let camera = self.camera.write(
            backend,
            state.camera_layout,
            0,
            bytemuck::bytes_of(&view.camera_uniform()),
        )?;
        let mut objects = Vec::with_capacity(draws.len());
        for (index, item) in draws.iter().enumerate() {
            let model_view = view.view * item.world;
            let uniform = ObjectUniform {
                model_view,
                normal_matrix: model_view.inverse().transpose(),
                model: item.world,
                ..bytemuck::Zeroable::zeroed()
            };
            let group = self
                .objects
                .write(backend, state.object_layout, index, bytemuck::bytes_of(&uniform))?;
            objects.push((group, meshes.get(item.mesh)?));
        }

        let target = self.ensure_target(backend, resolution)?;
        let depth = target.depth_view()?;
        {
            let mut pass = target.bind(
                backend,
                &TargetBinding {
                    label: "Shadow".into(),
                    colors: Vec::new(),
                    depth: true,
                    clear: Some([0.0; 4]),
                },
            )?;
            pass.set_render_pipeline(state.pipeline);
            pass.set_bind_group(0, camera);
            for (group, mesh) in &objects {
                pass.set_bind_group(1, *group);
                mesh.draw(&mut *pass);
            }
        }

        backend.check_errors().map_err(|source| RenderError::Gpu {
            pass: "Shadow".into(),
            source,
        })?;
        log::trace!("Shadow map {}x{} with {} draws", resolution, resolution, draws.len());

        Ok(ShadowBinding {
            view: depth,
            light_view_proj: view.view_proj(),
            texel: 1.0 / resolution as f32,
        })
    }
}

impl Default for ShadowPass {
    fn default() -> Self {
        Self::new()
    }
}
