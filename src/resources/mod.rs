//! Resource management
//!
//! CPU-side meshes, materials, textures and the static environment. Every
//! mutable entry carries a generation number that GPU caches compare against
//! to decide when to re-upload.

pub mod material;
pub mod mesh;
pub mod texture;

pub use material::*;
pub use mesh::*;
pub use texture::*;

use crate::error::{RenderError, RenderResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) usize);

#[derive(Debug, Clone)]
struct Versioned<T> {
    value: T,
    generation: u64,
}

/// Owner of every CPU-side asset referenced by the scene
#[derive(Debug, Default)]
pub struct Assets {
    meshes: Vec<Versioned<Mesh>>,
    materials: Vec<Material>,
    textures: Vec<Versioned<TextureData>>,
    environment: Option<Versioned<CubeMapData>>,
    next_generation: u64,
}

impl Assets {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        let generation = self.bump();
        self.meshes.push(Versioned {
            value: mesh,
            generation,
        });
        MeshId(self.meshes.len() - 1)
    }

    pub fn mesh(&self, id: MeshId) -> RenderResult<&Mesh> {
        self.meshes
            .get(id.0)
            .map(|m| &m.value)
            .ok_or(RenderError::UnknownAsset {
                kind: "mesh",
                id: id.0,
            })
    }

    pub fn mesh_generation(&self, id: MeshId) -> Option<u64> {
        self.meshes.get(id.0).map(|m| m.generation)
    }

    /// Swap in new geometry for an existing id
    pub fn replace_mesh(&mut self, id: MeshId, mesh: Mesh) -> RenderResult<()> {
        let generation = self.bump();
        let entry = self.meshes.get_mut(id.0).ok_or(RenderError::UnknownAsset {
            kind: "mesh",
            id: id.0,
        })?;
        *entry = Versioned {
            value: mesh,
            generation,
        };
        Ok(())
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.push(material);
        MaterialId(self.materials.len() - 1)
    }

    pub fn material(&self, id: MaterialId) -> RenderResult<&Material> {
        self.materials.get(id.0).ok_or(RenderError::UnknownAsset {
            kind: "material",
            id: id.0,
        })
    }

    pub fn material_mut(&mut self, id: MaterialId) -> RenderResult<&mut Material> {
        self.materials.get_mut(id.0).ok_or(RenderError::UnknownAsset {
            kind: "material",
            id: id.0,
        })
    }

    pub fn add_texture(&mut self, texture: TextureData) -> TextureId {
        let generation = self.bump();
        self.textures.push(Versioned {
            value: texture,
            generation,
        });
        TextureId(self.textures.len() - 1)
    }

    pub fn texture(&self, id: TextureId) -> RenderResult<&TextureData> {
        self.textures
            .get(id.0)
            .map(|t| &t.value)
            .ok_or(RenderError::UnknownAsset {
                kind: "texture",
                id: id.0,
            })
    }

    pub fn texture_generation(&self, id: TextureId) -> Option<u64> {
        self.textures.get(id.0).map(|t| t.generation)
    }

    pub fn set_environment(&mut self, environment: Option<CubeMapData>) {
        let generation = self.bump();
        self.environment = environment.map(|value| Versioned { value, generation });
    }

    pub fn environment(&self) -> Option<(&CubeMapData, u64)> {
        self.environment.as_ref().map(|e| (&e.value, e.generation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replacing_a_mesh_bumps_its_generation() {
        let mut assets = Assets::new();
        let id = assets.add_mesh(Mesh::unit_quad());
        let before = assets.mesh_generation(id).unwrap();

        assets.replace_mesh(id, Mesh::grid(2, 2)).unwrap();

        assert!(assets.mesh_generation(id).unwrap() > before);
        assert_eq!(assets.mesh(id).unwrap().polygon_count(), 4);
    }

    #[test]
    fn test_unknown_ids_are_reported() {
        let assets = Assets::new();
        assert_eq!(
            assets.material(MaterialId(3)).unwrap_err(),
            RenderError::UnknownAsset {
                kind: "material",
                id: 3
            }
        );
    }
}
