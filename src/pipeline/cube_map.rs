//! Cube maps rendered each frame around reflection probes

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::backend::{GpuTexture, GpuTextureView};
use crate::error::RenderResult;
use crate::resources::CubeFace;

/// Six-layer HDR texture with a cube view for sampling and one 2D view per
/// face for rendering
#[derive(Debug)]
pub struct DynamicCubeMap {
    resolution: u32,
    texture: GpuTexture,
    faces: Vec<GpuTextureView>,
}

impl DynamicCubeMap {
    pub fn new(backend: &mut dyn GraphicsBackend, label: &str, resolution: u32) -> RenderResult<Self> {
        let resolution = resolution.max(1);
        let texture = GpuTexture::new(
            backend,
            TextureDescriptor {
                label: Some(label.to_string()),
                width: resolution,
                height: resolution,
                array_layers: 6,
                format: Self::FORMAT,
                usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            },
            &TextureViewDescriptor::cube(),
        )?;
        let faces = CubeFace::ALL
            .iter()
            .map(|face| texture.create_view(backend, &TextureViewDescriptor::layer(face.layer())))
            .collect::<Result<Vec<_>, _>>()?;

        log::info!("Created dynamic cube map '{}' ({}x{})", label, resolution, resolution);
        Ok(Self {
            resolution,
            texture,
            faces,
        })
    }

    pub const FORMAT: TextureFormat = TextureFormat::Rgba16Float;

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Cube view bound for reflections
    pub fn cube_view(&self) -> TextureViewHandle {
        self.texture.view()
    }

    /// Render target view of one face
    pub fn face_view(&self, face: CubeFace) -> TextureViewHandle {
        self.faces[face.layer() as usize].handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn test_faces_are_distinct_from_cube_view() {
        let mut backend = RecordingBackend::new(8, 8);
        let cube = DynamicCubeMap::new(&mut backend, "probe", 32).unwrap();
        let mut views: Vec<_> = CubeFace::ALL.iter().map(|&f| cube.face_view(f)).collect();
        views.push(cube.cube_view());
        let unique: std::collections::HashSet<_> = views.iter().collect();
        assert_eq!(unique.len(), 7);
        assert_eq!(cube.resolution(), 32);

        let desc = backend.texture_desc(cube.texture.handle()).unwrap();
        assert_eq!(desc.array_layers, 6);
    }
}
