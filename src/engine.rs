//! Main engine orchestrator
//!
//! Owns the backend, the scene, the asset store and the deferred renderer,
//! and turns render errors into skipped frames when the next frame can
//! succeed.

use crate::backend::traits::*;
use crate::error::{FrameStatus, RenderError, RenderResult};
use crate::pipeline::{DeferredConfig, DeferredRenderer, GBufferChannel};
use crate::resources::{Assets, CubeMapData, Material, MaterialId, Mesh, MeshId, TextureData, TextureId};
use crate::scene::Scene;
use crate::subdivision::{subdivide, Scheme};

/// The main graphics engine
pub struct Engine<B: GraphicsBackend> {
    backend: B,
    renderer: DeferredRenderer,
    scene: Scene,
    assets: Assets,
    frame_index: u64,
}

impl<B: GraphicsBackend> Engine<B> {
    /// Create an engine around an initialized backend
    pub fn new(mut backend: B, config: DeferredConfig) -> RenderResult<Self> {
        let (width, height) = backend.surface_size();
        let mut renderer = DeferredRenderer::new(config, width, height)?;
        renderer.prepare(&mut backend)?;
        log::info!(
            "Engine ready on {} backend ({}x{})",
            backend.name(),
            width,
            height
        );

        Ok(Self {
            backend,
            renderer,
            scene: Scene::new(),
            assets: Assets::new(),
            frame_index: 0,
        })
    }

    /// Render and present one frame.
    ///
    /// Recoverable errors abort the backend frame and yield
    /// `FrameStatus::Skipped`; a lost or outdated surface is reconfigured
    /// before returning. Fatal errors are returned.
    pub fn render(&mut self) -> RenderResult<FrameStatus> {
        let frame = match self.backend.begin_frame() {
            Ok(frame) => frame,
            Err(err) => return self.fail_frame(err.into(), false),
        };

        if let Err(err) = self
            .renderer
            .render_frame(&mut self.backend, &frame, &self.scene, &self.assets)
        {
            return self.fail_frame(err, true);
        }
        if let Err(err) = self.backend.end_frame() {
            return self.fail_frame(err.into(), false);
        }

        self.frame_index += 1;
        Ok(FrameStatus::Presented)
    }

    fn fail_frame(&mut self, err: RenderError, frame_open: bool) -> RenderResult<FrameStatus> {
        if frame_open {
            self.backend.abort_frame();
        }
        if !err.is_recoverable() {
            log::error!("Frame {} failed: {}", self.frame_index, err);
            return Err(err);
        }

        log::warn!("Skipping frame {}: {}", self.frame_index, err);
        if matches!(
            err,
            RenderError::Backend(BackendError::SurfaceLost | BackendError::SurfaceOutdated)
        ) {
            let (width, height) = self.backend.surface_size();
            self.resize(width, height)?;
        }
        Ok(FrameStatus::Skipped(err))
    }

    /// Resize the surface and every viewport-sized target
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.backend.resize(width, height);

        // The surface may be clamped by device limits
        let (width, height) = self.backend.surface_size();
        self.renderer.resize(&mut self.backend, width, height)
    }

    /// Show a raw G-buffer channel instead of the lit image
    pub fn preview_gbuffer(&mut self, index: usize) -> RenderResult<()> {
        let channel = GBufferChannel::from_index(index)?;
        log::info!("Previewing G-buffer channel {:?}", channel);
        self.renderer.set_preview(Some(channel));
        Ok(())
    }

    pub fn unpreview_gbuffer(&mut self) {
        self.renderer.set_preview(None);
    }

    /// Replace a mesh with its subdivision. The stored mesh is unchanged on
    /// failure.
    pub fn subdivide_mesh(&mut self, id: MeshId, scheme: Scheme, levels: u32) -> RenderResult<()> {
        let mesh = self.assets.mesh(id)?;
        let mut refined = subdivide(mesh, scheme, levels)?;
        if mesh.normals().is_some() {
            refined.compute_normals();
        }
        log::debug!(
            "Subdivided '{}' {} times with {:?}: {} -> {} polygons",
            mesh.name(),
            levels,
            scheme,
            mesh.polygon_count(),
            refined.polygon_count()
        );
        self.assets.replace_mesh(id, refined)
    }

    pub fn set_environment(&mut self, environment: Option<CubeMapData>) {
        self.assets.set_environment(environment);
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        self.assets.add_mesh(mesh)
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.assets.add_material(material)
    }

    pub fn add_texture(&mut self, texture: TextureData) -> TextureId {
        self.assets.add_texture(texture)
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn assets(&self) -> &Assets {
        &self.assets
    }

    pub fn assets_mut(&mut self) -> &mut Assets {
        &mut self.assets
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn renderer(&self) -> &DeferredRenderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut DeferredRenderer {
        &mut self.renderer
    }

    /// Frames presented so far
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::scene::{GeometryNode, Light, Transform};
    use glam::Vec3;

    fn engine() -> Engine<RecordingBackend> {
        Engine::new(RecordingBackend::new(32, 24), DeferredConfig::default()).unwrap()
    }

    fn populate(engine: &mut Engine<RecordingBackend>, lights: usize) {
        let mesh = engine.add_mesh(Mesh::unit_quad());
        let material = engine.add_material(Material::plastic(Vec3::ONE));
        let root = engine.scene().root();
        engine
            .scene_mut()
            .add_geometry(root, "quad", GeometryNode::new(mesh, material), Transform::default())
            .unwrap();
        for i in 0..lights {
            engine
                .scene_mut()
                .add_light(
                    root,
                    &format!("light {}", i),
                    Light::point(Vec3::ONE),
                    Transform::from_position(Vec3::new(i as f32, 0.0, 2.0)),
                )
                .unwrap();
        }
        engine.scene_mut().camera = crate::scene::Camera::new(Vec3::Z * 3.0);
    }

    #[test]
    fn test_render_presents_frame() {
        let mut engine = engine();
        populate(&mut engine, 1);
        assert_eq!(engine.render().unwrap(), FrameStatus::Presented);
        assert_eq!(engine.backend().frames_presented(), 1);
        assert_eq!(engine.frame_index(), 1);
    }

    #[test]
    fn test_missing_lights_skip_frame() {
        let mut engine = engine();
        populate(&mut engine, 0);
        let status = engine.render().unwrap();
        assert_eq!(status, FrameStatus::Skipped(RenderError::NoLights));
        assert_eq!(engine.backend().frames_aborted(), 1);
        assert_eq!(engine.backend().frames_presented(), 0);
    }

    #[test]
    fn test_surface_loss_is_recovered() {
        let mut engine = engine();
        populate(&mut engine, 1);
        engine.backend_mut().inject_frame_error(BackendError::SurfaceLost);
        let status = engine.render().unwrap();
        assert!(!status.is_presented());
        assert!(engine.render().unwrap().is_presented());
    }

    #[test]
    fn test_gpu_error_is_fatal() {
        let mut engine = engine();
        populate(&mut engine, 1);
        engine
            .backend_mut()
            .inject_error(BackendError::Validation("bad state".into()));
        let err = engine.render().unwrap_err();
        assert!(matches!(err, RenderError::Gpu { .. }));
    }

    #[test]
    fn test_preview_index_is_checked() {
        let mut engine = engine();
        assert!(engine.preview_gbuffer(2).is_ok());
        assert_eq!(engine.renderer().preview(), Some(GBufferChannel::Position));
        assert!(matches!(
            engine.preview_gbuffer(GBufferChannel::COUNT),
            Err(RenderError::InvalidPreviewIndex { .. })
        ));
        engine.unpreview_gbuffer();
        assert_eq!(engine.renderer().preview(), None);
    }

    #[test]
    fn test_failed_subdivision_keeps_mesh() {
        let mut engine = engine();
        let pentagon = Mesh::new(
            "pentagon",
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.5, 1.0, 0.0),
                Vec3::new(0.5, 1.5, 0.0),
                Vec3::new(-0.5, 1.0, 0.0),
            ],
            vec![0, 1, 2, 3, 4],
            5,
        )
        .unwrap();
        let id = engine.add_mesh(pentagon);
        assert!(engine.subdivide_mesh(id, Scheme::CatmullClark, 1).is_err());
        assert_eq!(engine.assets().mesh(id).unwrap().vertex_count(), 5);
    }

    #[test]
    fn test_subdivision_replaces_mesh() {
        let mut engine = engine();
        let id = engine.add_mesh(Mesh::cube());
        let before = engine.assets().mesh_generation(id);
        engine.subdivide_mesh(id, Scheme::CatmullClark, 1).unwrap();
        let mesh = engine.assets().mesh(id).unwrap();
        assert_eq!(mesh.polygon_count(), 24);
        assert!(mesh.normals().is_some());
        assert_ne!(engine.assets().mesh_generation(id), before);
    }
}
