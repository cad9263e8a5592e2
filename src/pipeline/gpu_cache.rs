//! GPU copies of CPU assets
//!
//! Meshes and textures are uploaded the first time a frame draws them and
//! re-uploaded whenever the asset's generation changes.

use std::collections::HashMap;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::backend::{GpuBuffer, GpuTexture};
use crate::error::{RenderError, RenderResult};
use crate::resources::{Assets, CubeFace, CubeMapData, MeshId, TextureId};

/// Uploaded vertex and index buffers of one mesh
#[derive(Debug)]
pub struct GpuMesh {
    pub vertex: GpuBuffer,
    pub index: GpuBuffer,
    pub index_count: u32,
    generation: u64,
}

impl GpuMesh {
    /// Bind both buffers and record the indexed draw
    pub fn draw(&self, backend: &mut dyn GraphicsBackend) {
        backend.set_vertex_buffer(0, self.vertex.handle(), 0);
        backend.set_index_buffer(self.index.handle(), 0, IndexFormat::Uint32);
        backend.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

/// Buffers must not be empty; pad to one 4-byte element
fn non_empty(bytes: &[u8]) -> Vec<u8> {
    if bytes.is_empty() {
        vec![0; 4]
    } else {
        bytes.to_vec()
    }
}

#[derive(Debug, Default)]
pub struct GpuMeshCache {
    meshes: HashMap<MeshId, GpuMesh>,
}

impl GpuMeshCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload `id` unless the cached copy is current
    pub fn ensure(&mut self, backend: &mut dyn GraphicsBackend, assets: &Assets, id: MeshId) -> RenderResult<()> {
        let mesh = assets.mesh(id)?;
        let generation = assets.mesh_generation(id).unwrap_or_default();
        if self.meshes.get(&id).is_some_and(|m| m.generation == generation) {
            return Ok(());
        }

        let vertices = mesh.vertices();
        let indices = mesh.triangle_indices();
        let vertex = GpuBuffer::with_data(
            backend,
            &BufferDescriptor {
                label: Some(format!("{} vertices", mesh.name())),
                size: (vertices.len() * std::mem::size_of::<Vertex>()).max(4) as u64,
                usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
            },
            &non_empty(bytemuck::cast_slice(&vertices)),
        )?;
        let index = GpuBuffer::with_data(
            backend,
            &BufferDescriptor {
                label: Some(format!("{} indices", mesh.name())),
                size: (indices.len() * 4).max(4) as u64,
                usage: BufferUsage::INDEX | BufferUsage::COPY_DST,
            },
            &non_empty(bytemuck::cast_slice(&indices)),
        )?;

        log::debug!(
            "Uploaded mesh '{}' ({} vertices, {} triangles)",
            mesh.name(),
            vertices.len(),
            indices.len() / 3
        );
        self.meshes.insert(
            id,
            GpuMesh {
                vertex,
                index,
                index_count: indices.len() as u32,
                generation,
            },
        );
        Ok(())
    }

    pub fn get(&self, id: MeshId) -> RenderResult<&GpuMesh> {
        self.meshes.get(&id).ok_or(RenderError::UnknownAsset {
            kind: "uploaded mesh",
            id: id.0,
        })
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

#[derive(Debug)]
struct CachedTexture {
    texture: GpuTexture,
    generation: u64,
}

/// Uploaded 2D textures plus the static environment cube map
#[derive(Debug, Default)]
pub struct GpuTextureCache {
    textures: HashMap<TextureId, CachedTexture>,
    environment: Option<CachedTexture>,
}

impl GpuTextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure(&mut self, backend: &mut dyn GraphicsBackend, assets: &Assets, id: TextureId) -> RenderResult<()> {
        let data = assets.texture(id)?;
        let generation = assets.texture_generation(id).unwrap_or_default();
        if self.textures.get(&id).is_some_and(|t| t.generation == generation) {
            return Ok(());
        }

        let texture = GpuTexture::new(
            backend,
            TextureDescriptor {
                label: Some(data.name.clone()),
                width: data.width,
                height: data.height,
                array_layers: 1,
                format: data.format,
                usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
            },
            &TextureViewDescriptor::default(),
        )?;
        backend.write_texture(texture.handle(), 0, &data.data);
        log::debug!("Uploaded texture '{}' ({}x{})", data.name, data.width, data.height);

        self.textures.insert(id, CachedTexture { texture, generation });
        Ok(())
    }

    pub fn view(&self, id: TextureId) -> RenderResult<TextureViewHandle> {
        self.textures
            .get(&id)
            .map(|t| t.texture.view())
            .ok_or(RenderError::UnknownAsset {
                kind: "uploaded texture",
                id: id.0,
            })
    }

    /// Upload or drop the static environment to match `assets`
    pub fn ensure_environment(&mut self, backend: &mut dyn GraphicsBackend, assets: &Assets) -> RenderResult<()> {
        let Some((cube, generation)) = assets.environment() else {
            self.environment = None;
            return Ok(());
        };
        if self.environment.as_ref().is_some_and(|e| e.generation == generation) {
            return Ok(());
        }
        let texture = upload_cube(backend, cube)?;
        self.environment = Some(CachedTexture { texture, generation });
        Ok(())
    }

    /// Cube view of the static environment
    pub fn environment(&self) -> Option<TextureViewHandle> {
        self.environment.as_ref().map(|e| e.texture.view())
    }
}

fn upload_cube(backend: &mut dyn GraphicsBackend, cube: &CubeMapData) -> RenderResult<GpuTexture> {
    let size = cube.size();
    let texture = GpuTexture::new(
        backend,
        TextureDescriptor {
            label: Some("static environment".into()),
            width: size,
            height: size,
            array_layers: 6,
            format: cube.face(CubeFace::PositiveX).format,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        },
        &TextureViewDescriptor::cube(),
    )?;
    for face in CubeFace::ALL {
        backend.write_texture(texture.handle(), face.layer(), &cube.face(face).data);
    }
    log::debug!("Uploaded static environment ({}x{} per face)", size, size);
    Ok(texture)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::resources::{Mesh, TextureData};

    #[test]
    fn test_mesh_uploads_once_per_generation() {
        let mut backend = RecordingBackend::new(8, 8);
        let mut assets = Assets::new();
        let id = assets.add_mesh(Mesh::unit_quad());
        let mut cache = GpuMeshCache::new();

        cache.ensure(&mut backend, &assets, id).unwrap();
        let first = cache.get(id).unwrap().vertex.handle();
        assert_eq!(cache.get(id).unwrap().index_count, 6);
        cache.ensure(&mut backend, &assets, id).unwrap();
        assert_eq!(cache.get(id).unwrap().vertex.handle(), first);

        assets.replace_mesh(id, Mesh::cube()).unwrap();
        cache.ensure(&mut backend, &assets, id).unwrap();
        assert_ne!(cache.get(id).unwrap().vertex.handle(), first);
        assert_eq!(cache.get(id).unwrap().index_count, 36);
    }

    #[test]
    fn test_unknown_mesh_is_an_asset_error() {
        let mut backend = RecordingBackend::new(8, 8);
        let assets = Assets::new();
        let mut cache = GpuMeshCache::new();
        assert!(matches!(
            cache.ensure(&mut backend, &assets, MeshId(3)),
            Err(RenderError::UnknownAsset { kind: "mesh", id: 3 })
        ));
        assert!(cache.get(MeshId(3)).is_err());
    }

    #[test]
    fn test_environment_follows_assets() {
        let mut backend = RecordingBackend::new(8, 8);
        let mut assets = Assets::new();
        let mut cache = GpuTextureCache::new();

        cache.ensure_environment(&mut backend, &assets).unwrap();
        assert!(cache.environment().is_none());

        assets.set_environment(Some(CubeMapData::solid(4, [10, 20, 30, 255])));
        cache.ensure_environment(&mut backend, &assets).unwrap();
        assert!(cache.environment().is_some());

        assets.set_environment(None);
        cache.ensure_environment(&mut backend, &assets).unwrap();
        assert!(cache.environment().is_none());
    }

    #[test]
    fn test_texture_view_available_after_upload() {
        let mut backend = RecordingBackend::new(8, 8);
        let mut assets = Assets::new();
        let id = assets.add_texture(TextureData::white());
        let mut cache = GpuTextureCache::new();
        assert!(cache.view(id).is_err());
        cache.ensure(&mut backend, &assets, id).unwrap();
        assert!(cache.view(id).is_ok());
    }
}
