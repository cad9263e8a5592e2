//! Frame orchestration
//!
//! Owns the render graph, the frame targets and the GPU caches, and runs the
//! graph once per sub-pass: cube faces of every active reflection probe
//! first, then the main view into the swapchain image.

use std::collections::HashMap;

use crate::backend::traits::*;
use crate::error::{RenderError, RenderResult};
use crate::render_graph::{CompiledGraph, RenderGraph, RenderGraphExecutor, ResourceId};
use crate::resources::{Assets, CubeFace, ShaderKind, ShadingContext, ShadowParams};
use crate::scene::{CollectedLight, DrawItem, NodeId, ProbeItem, Scene, SceneWalker, ViewParams};

use super::cube_map::DynamicCubeMap;
use super::frame::{EnvironmentBindings, FrameData, FrameKind, ShadowBinding};
use super::gpu_cache::{GpuMeshCache, GpuTextureCache};
use super::lighting_pass::LightArray;
use super::postprocess::{BloomPass, PresentPass};
use super::shadow_pass::ShadowPass;
use super::targets::{self, FrameTargets};
use super::{
    DeferredConfig, GBufferChannel, GeometryPass, GradientPass, LightingPass, MAX_DYNAMIC_CUBE_MAPS,
};

/// Build the deferred render graph
///
/// Registers every texture slot, then adds the passes in their natural
/// order; `compile` derives the same order from their reads and writes.
pub fn build_deferred_graph(config: &DeferredConfig) -> (RenderGraph, ResourceId) {
    let mut graph = RenderGraph::new();
    for name in [
        targets::GBUFFER_DIFFUSE,
        targets::GBUFFER_POSITION,
        targets::GBUFFER_MATERIAL0,
        targets::GBUFFER_MATERIAL1,
        targets::GBUFFER_DEPTH,
        targets::GRADIENT,
        targets::LIT,
        targets::BLOOM,
    ] {
        graph.register_resource(name);
    }
    let output = graph.register_resource(targets::OUTPUT);

    graph.add_pass(GeometryPass::new());
    graph.add_pass(GradientPass::new());
    graph.add_pass(LightingPass::new(config.max_lights));
    graph.add_pass(BloomPass::new(config.bloom.clone()));
    graph.add_pass(PresentPass::new(config.bloom.clone()));

    (graph, output)
}

/// The compiled graph plus the executor that binds its resources
struct GraphRunner {
    graph: RenderGraph,
    compiled: CompiledGraph,
    executor: RenderGraphExecutor,
    output: ResourceId,
}

impl GraphRunner {
    fn bind(&mut self, targets: &FrameTargets, output: TextureViewHandle) -> RenderResult<()> {
        self.executor.clear_bindings();
        for (name, view) in targets.views()? {
            let resource = self
                .graph
                .resource(name)
                .ok_or_else(|| RenderError::InvalidAttachment(format!("resource '{}' not registered", name)))?;
            self.executor.bind_view(resource, view);
        }
        self.executor.bind_view(self.output, output);
        Ok(())
    }

    fn run(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        targets: &FrameTargets,
        output: TextureViewHandle,
        data: &FrameData,
    ) -> RenderResult<()> {
        self.bind(targets, output)?;
        self.executor
            .execute(&mut self.graph, &self.compiled, backend, data, targets)
    }
}

/// Deferred renderer
pub struct DeferredRenderer {
    config: DeferredConfig,
    runner: GraphRunner,
    size: (u32, u32),
    targets: Option<FrameTargets>,
    /// Cube-face targets, one set per probe resolution
    probe_targets: HashMap<u32, FrameTargets>,
    cube_maps: HashMap<NodeId, DynamicCubeMap>,
    shadow: ShadowPass,
    meshes: GpuMeshCache,
    textures: GpuTextureCache,
    preview: Option<GBufferChannel>,
}

impl DeferredRenderer {
    pub fn new(config: DeferredConfig, width: u32, height: u32) -> RenderResult<Self> {
        config.validate()?;
        let (graph, output) = build_deferred_graph(&config);
        let compiled = graph.compile()?;
        log::debug!("Deferred graph order: {:?}", compiled.pass_names(&graph));

        Ok(Self {
            config,
            runner: GraphRunner {
                graph,
                compiled,
                executor: RenderGraphExecutor::new(),
                output,
            },
            size: (width.max(1), height.max(1)),
            targets: None,
            probe_targets: HashMap::new(),
            cube_maps: HashMap::new(),
            shadow: ShadowPass::new(),
            meshes: GpuMeshCache::new(),
            textures: GpuTextureCache::new(),
            preview: None,
        })
    }

    pub fn config(&self) -> &DeferredConfig {
        &self.config
    }

    /// Compile pipelines and create the viewport targets ahead of the first frame
    pub fn prepare(&mut self, backend: &mut dyn GraphicsBackend) -> RenderResult<()> {
        self.runner.executor.prepare(&mut self.runner.graph, backend)?;
        self.shadow.prepare(backend)?;
        self.ensure_targets(backend)?;
        Ok(())
    }

    /// Recreate the viewport-sized targets
    pub fn resize(&mut self, backend: &mut dyn GraphicsBackend, width: u32, height: u32) -> RenderResult<()> {
        self.size = (width.max(1), height.max(1));
        self.targets = None;
        self.ensure_targets(backend)
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn targets(&self) -> Option<&FrameTargets> {
        self.targets.as_ref()
    }

    pub fn set_preview(&mut self, channel: Option<GBufferChannel>) {
        self.preview = channel;
    }

    pub fn preview(&self) -> Option<GBufferChannel> {
        self.preview
    }

    pub fn graph(&self) -> &RenderGraph {
        &self.runner.graph
    }

    pub fn graph_mut(&mut self) -> &mut RenderGraph {
        &mut self.runner.graph
    }

    pub fn pass_order(&self) -> Vec<&str> {
        self.runner.compiled.pass_names(&self.runner.graph)
    }

    pub fn cube_map(&self, node: NodeId) -> Option<&DynamicCubeMap> {
        self.cube_maps.get(&node)
    }

    pub fn shadow_resolution(&self) -> Option<u32> {
        self.shadow.resolution()
    }

    pub fn meshes(&self) -> &GpuMeshCache {
        &self.meshes
    }

    fn ensure_targets(&mut self, backend: &mut dyn GraphicsBackend) -> RenderResult<()> {
        if self.targets.as_ref().map(FrameTargets::size) != Some(self.size) {
            self.targets = None;
            self.targets = Some(FrameTargets::new(backend, "viewport", self.size.0, self.size.1)?);
        }
        Ok(())
    }

    fn ensure_probe_targets(&mut self, backend: &mut dyn GraphicsBackend, resolution: u32) -> RenderResult<()> {
        if !self.probe_targets.contains_key(&resolution) {
            let targets = FrameTargets::new(backend, "probe", resolution, resolution)?;
            self.probe_targets.insert(resolution, targets);
        }
        Ok(())
    }

    /// Upload everything the draws reference
    fn upload(&mut self, backend: &mut dyn GraphicsBackend, assets: &Assets, draws: &[DrawItem]) -> RenderResult<()> {
        for item in draws {
            self.meshes.ensure(backend, assets, item.mesh)?;
            let material = assets.material(item.material)?;
            if material.shader() == ShaderKind::Textured {
                if let Some(texture) = material.diffuse_texture {
                    self.textures.ensure(backend, assets, texture)?;
                }
            }
        }
        self.textures.ensure_environment(backend, assets)
    }

    fn shading_context(&self, shadowed: bool) -> ShadingContext {
        ShadingContext {
            toon: self.config.toon_shading,
            outline_threshold: self.config.outline_threshold,
            ambient: self.config.ambient,
            background: self.config.clear_color,
            shadow: shadowed.then(|| ShadowParams {
                bias: self.config.shadow.bias,
                samples: self.config.shadow.samples,
                spread: self.config.shadow.spread,
            }),
            has_static_environment: self.textures.environment().is_some(),
        }
    }

    /// Render the shadow map from the first shadow-casting light
    fn render_shadow(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        lights: &[CollectedLight],
        draws: &[DrawItem],
    ) -> RenderResult<Option<ShadowBinding>> {
        let Some(caster) = lights.iter().find(|l| l.light.casts_shadows) else {
            return Ok(None);
        };
        let settings = &self.config.shadow;
        let resolution = settings.resolution.unwrap_or(self.size.0.max(self.size.1));
        let view = ViewParams::shadow(
            caster.position,
            caster.direction,
            settings.fov.to_radians(),
            settings.near,
            settings.far,
        );
        log::debug!("Scheduling shadow sub-pass ({}x{})", resolution, resolution);
        let binding = self.shadow.render(backend, &view, draws, &self.meshes, resolution)?;
        backend.submit();
        Ok(Some(binding))
    }

    /// Keep one cube map per active probe, at its requested resolution
    fn ensure_cube_maps(&mut self, backend: &mut dyn GraphicsBackend, probes: &[ProbeItem]) -> RenderResult<()> {
        self.cube_maps
            .retain(|node, _| probes.iter().any(|p| p.node == *node));
        for probe in probes {
            let resolution = probe.probe.resolution.max(1);
            let current = self.cube_maps.get(&probe.node).map(DynamicCubeMap::resolution);
            if current != Some(resolution) {
                let label = format!("probe {}", probe.node.0);
                let cube = DynamicCubeMap::new(backend, &label, resolution)?;
                self.cube_maps.insert(probe.node, cube);
            }
        }
        Ok(())
    }

    /// Record one frame: shadow map, probe cube faces, then the main view
    /// into `frame.swapchain_view`.
    ///
    /// Light-count errors are raised before any render pass begins.
    pub fn render_frame(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        frame: &FrameContext,
        scene: &Scene,
        assets: &Assets,
    ) -> RenderResult<()> {
        if (frame.width, frame.height) != self.size {
            self.size = (frame.width.max(1), frame.height.max(1));
        }
        let aspect = self.size.0 as f32 / self.size.1 as f32;
        let main_view = scene.camera.view_params(aspect);

        let walk = SceneWalker::new(scene).walk();
        LightArray::pack(&walk.lights, main_view.view, self.config.max_lights)?;

        self.ensure_targets(backend)?;
        self.upload(backend, assets, &walk.draws)?;

        let shadow = self.render_shadow(backend, &walk.lights, &walk.draws)?;
        let shading = self.shading_context(shadow.is_some());

        if walk.probes.len() > MAX_DYNAMIC_CUBE_MAPS {
            log::warn!(
                "{} reflection probes in the scene, only the first {} are rendered",
                walk.probes.len(),
                MAX_DYNAMIC_CUBE_MAPS
            );
        }
        let probes = &walk.probes[..walk.probes.len().min(MAX_DYNAMIC_CUBE_MAPS)];
        self.ensure_cube_maps(backend, probes)?;
        let probe_slots: HashMap<NodeId, usize> =
            probes.iter().enumerate().map(|(slot, p)| (p.node, slot)).collect();

        let mut environment = EnvironmentBindings {
            static_env: self.textures.environment(),
            ..Default::default()
        };
        for probe in probes {
            if let (Some(&slot), Some(cube)) = (probe_slots.get(&probe.node), self.cube_maps.get(&probe.node)) {
                environment.dynamic[slot] = Some(cube.cube_view());
            }
        }

        for (slot, probe) in probes.iter().enumerate() {
            let hidden = SceneWalker::new(scene).exclude(probe.node).walk();
            let resolution = probe.probe.resolution.max(1);
            self.ensure_probe_targets(backend, resolution)?;

            let mut probe_env = environment;
            probe_env.dynamic[slot] = None;

            for face in CubeFace::ALL {
                let output = self
                    .cube_maps
                    .get(&probe.node)
                    .map(|cube| cube.face_view(face))
                    .ok_or_else(|| RenderError::InvalidAttachment(format!("cube map for probe {} missing", slot)))?;
                let view = ViewParams::cube_face(
                    probe.center,
                    face,
                    self.config.cube_map_near,
                    self.config.cube_map_far,
                );
                log::debug!("Scheduling cube face {:?} of probe {}", face, slot);

                let targets = self
                    .probe_targets
                    .get(&resolution)
                    .ok_or_else(|| RenderError::InvalidAttachment("probe targets missing".into()))?;
                let data = FrameData {
                    view,
                    draws: &hidden.draws,
                    lights: &hidden.lights,
                    probe_slots: &probe_slots,
                    shading: &shading,
                    assets,
                    meshes: &self.meshes,
                    textures: &self.textures,
                    environment: probe_env,
                    shadow,
                    preview: self.preview,
                    bloom: self.config.enable_bloom,
                    output_format: DynamicCubeMap::FORMAT,
                    kind: FrameKind::CubeFace { probe: slot, face },
                };
                self.runner.run(backend, targets, output, &data)?;
                backend.submit();
            }
        }

        log::debug!("Scheduling main view ({} draws)", walk.draws.len());
        let targets = self
            .targets
            .as_ref()
            .ok_or_else(|| RenderError::InvalidAttachment("viewport targets missing".into()))?;
        let data = FrameData {
            view: main_view,
            draws: &walk.draws,
            lights: &walk.lights,
            probe_slots: &probe_slots,
            shading: &shading,
            assets,
            meshes: &self.meshes,
            textures: &self.textures,
            environment,
            shadow,
            preview: self.preview,
            bloom: self.config.enable_bloom,
            output_format: backend.swapchain_format(),
            kind: FrameKind::Main,
        };
        self.runner.run(backend, targets, frame.swapchain_view, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::resources::{Material, Mesh};
    use crate::scene::{GeometryNode, Light, Transform};
    use glam::Vec3;

    fn lit_quad() -> (Scene, Assets) {
        let mut assets = Assets::new();
        let mesh = assets.add_mesh(Mesh::unit_quad());
        let material = assets.add_material(Material::plastic(Vec3::ONE));
        let mut scene = Scene::new();
        let root = scene.root();
        scene
            .add_geometry(root, "quad", GeometryNode::new(mesh, material), Transform::default())
            .unwrap();
        scene
            .add_light(root, "light", Light::point(Vec3::ONE), Transform::from_position(Vec3::Z * 2.0))
            .unwrap();
        scene.camera = crate::scene::Camera::new(Vec3::Z * 3.0);
        (scene, assets)
    }

    #[test]
    fn test_graph_order_follows_states() {
        let renderer = DeferredRenderer::new(DeferredConfig::default(), 64, 64).unwrap();
        assert_eq!(
            renderer.pass_order(),
            vec!["Geometry", "Gradient", "Lighting", "Bloom", "Present"]
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = DeferredConfig {
            max_lights: 0,
            ..Default::default()
        };
        assert!(matches!(
            DeferredRenderer::new(config, 64, 64),
            Err(RenderError::Config(_))
        ));
    }

    #[test]
    fn test_frame_reaches_swapchain() {
        let (scene, assets) = lit_quad();
        let mut backend = RecordingBackend::new(32, 32);
        let mut renderer = DeferredRenderer::new(DeferredConfig::default(), 32, 32).unwrap();
        let frame = backend.begin_frame().unwrap();
        renderer.render_frame(&mut backend, &frame, &scene, &assets).unwrap();

        assert!(backend.was_written(frame.swapchain_view));
        assert_eq!(
            backend.render_pass_labels(),
            vec!["Geometry", "Gradient", "Lighting", "Present"]
        );
        assert!(backend.aliasing_violations().is_empty());
    }

    #[test]
    fn test_probe_faces_are_rendered_before_main_view() {
        let (mut scene, mut assets) = lit_quad();
        let mesh = assets.add_mesh(Mesh::cube());
        let material = assets.add_material(Material::mirror());
        let root = scene.root();
        let probe = scene
            .add_geometry(
                root,
                "mirror",
                GeometryNode::new(mesh, material).with_probe(16),
                Transform::from_position(Vec3::X * 2.0),
            )
            .unwrap();

        let mut backend = RecordingBackend::new(32, 32);
        let mut renderer = DeferredRenderer::new(DeferredConfig::default(), 32, 32).unwrap();
        let frame = backend.begin_frame().unwrap();
        renderer.render_frame(&mut backend, &frame, &scene, &assets).unwrap();

        assert_eq!(backend.draw_count("Present"), 7);
        let cube = renderer.cube_map(probe).unwrap();
        for face in CubeFace::ALL {
            assert!(backend.was_written(cube.face_view(face)));
        }
        assert!(backend.aliasing_violations().is_empty());
    }
}
