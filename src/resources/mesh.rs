//! Polygon meshes and primitive generation

use crate::backend::types::Vertex;
use glam::{Vec2, Vec3, Vec4};
use std::collections::BTreeMap;
use thiserror::Error;

/// Mesh validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeshError {
    #[error("Polygons need at least 3 vertices, got {0}")]
    PolygonTooSmall(u32),
    #[error("Index count {count} is not a multiple of {per_polygon}")]
    RaggedIndices { count: usize, per_polygon: u32 },
    #[error("Index {index} at position {position} is out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        position: usize,
        index: u32,
        vertex_count: usize,
    },
    #[error("Buffer '{buffer}' has {len} entries for {vertex_count} vertices")]
    AttributeLength {
        buffer: String,
        len: usize,
        vertex_count: usize,
    },
    #[error("Attribute '{0}' must have between 1 and 4 components")]
    AttributeComponents(String),
    #[error("Crease index {index} is out of range for {vertex_count} vertices")]
    CreaseOutOfRange { index: u32, vertex_count: usize },
}

/// Named per-vertex attribute with `components` floats per vertex
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeBuffer {
    pub components: u32,
    pub data: Vec<f32>,
}

/// An indexed polygon mesh
///
/// Every polygon has the same vertex count. Crease pairs mark edges that
/// subdivision keeps sharp.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    name: String,
    positions: Vec<Vec3>,
    normals: Option<Vec<Vec3>>,
    texcoords: Option<Vec<Vec2>>,
    indices: Vec<u32>,
    vertices_per_polygon: u32,
    creases: Vec<[u32; 2]>,
    attributes: BTreeMap<String, AttributeBuffer>,
}

impl Mesh {
    pub fn new(
        name: &str,
        positions: Vec<Vec3>,
        indices: Vec<u32>,
        vertices_per_polygon: u32,
    ) -> Result<Self, MeshError> {
        if vertices_per_polygon < 3 {
            return Err(MeshError::PolygonTooSmall(vertices_per_polygon));
        }
        if indices.len() % vertices_per_polygon as usize != 0 {
            return Err(MeshError::RaggedIndices {
                count: indices.len(),
                per_polygon: vertices_per_polygon,
            });
        }
        if let Some((position, &index)) = indices
            .iter()
            .enumerate()
            .find(|(_, &i)| i as usize >= positions.len())
        {
            return Err(MeshError::IndexOutOfRange {
                position,
                index,
                vertex_count: positions.len(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            positions,
            normals: None,
            texcoords: None,
            indices,
            vertices_per_polygon,
            creases: Vec::new(),
            attributes: BTreeMap::new(),
        })
    }

    /// Assemble a mesh whose indices and creases are valid by construction
    pub(crate) fn from_refined(
        name: &str,
        positions: Vec<Vec3>,
        indices: Vec<u32>,
        vertices_per_polygon: u32,
        creases: Vec<[u32; 2]>,
    ) -> Self {
        debug_assert!(indices.iter().all(|&i| (i as usize) < positions.len()));
        Self {
            name: name.to_string(),
            positions,
            normals: None,
            texcoords: None,
            indices,
            vertices_per_polygon,
            creases,
            attributes: BTreeMap::new(),
        }
    }

    fn check_length(&self, buffer: &str, len: usize) -> Result<(), MeshError> {
        if len != self.positions.len() {
            return Err(MeshError::AttributeLength {
                buffer: buffer.to_string(),
                len,
                vertex_count: self.positions.len(),
            });
        }
        Ok(())
    }

    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Result<Self, MeshError> {
        self.check_length("normal", normals.len())?;
        self.normals = Some(normals);
        Ok(self)
    }

    pub fn with_texcoords(mut self, texcoords: Vec<Vec2>) -> Result<Self, MeshError> {
        self.check_length("texcoord", texcoords.len())?;
        self.texcoords = Some(texcoords);
        Ok(self)
    }

    pub fn with_creases(mut self, creases: Vec<[u32; 2]>) -> Result<Self, MeshError> {
        if let Some(&index) = creases
            .iter()
            .flatten()
            .find(|&&i| i as usize >= self.positions.len())
        {
            return Err(MeshError::CreaseOutOfRange {
                index,
                vertex_count: self.positions.len(),
            });
        }
        self.creases = creases;
        Ok(self)
    }

    pub fn with_attribute(
        mut self,
        name: &str,
        components: u32,
        data: Vec<f32>,
    ) -> Result<Self, MeshError> {
        if !(1..=4).contains(&components) {
            return Err(MeshError::AttributeComponents(name.to_string()));
        }
        self.check_length(name, data.len() / components as usize)?;
        if data.len() % components as usize != 0 {
            return Err(MeshError::AttributeLength {
                buffer: name.to_string(),
                len: data.len(),
                vertex_count: self.positions.len(),
            });
        }
        self.attributes
            .insert(name.to_string(), AttributeBuffer { components, data });
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn normals(&self) -> Option<&[Vec3]> {
        self.normals.as_deref()
    }

    pub fn texcoords(&self) -> Option<&[Vec2]> {
        self.texcoords.as_deref()
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertices_per_polygon(&self) -> u32 {
        self.vertices_per_polygon
    }

    pub fn creases(&self) -> &[[u32; 2]] {
        &self.creases
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeBuffer> {
        self.attributes.get(name)
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn polygon_count(&self) -> usize {
        self.indices.len() / self.vertices_per_polygon as usize
    }

    pub fn polygons(&self) -> impl Iterator<Item = &[u32]> {
        self.indices.chunks_exact(self.vertices_per_polygon as usize)
    }

    /// Whether the mesh carries a vertex attribute a material asks for.
    /// `position`, `normal` and `texcoord` name the built-in buffers.
    pub fn has_attribute(&self, name: &str) -> bool {
        match name {
            "position" => true,
            "normal" => self.normals.is_some(),
            "texcoord" => self.texcoords.is_some(),
            other => self.attributes.contains_key(other),
        }
    }

    /// Recompute smooth vertex normals, weighting each polygon by its area
    pub fn compute_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.positions.len()];
        for polygon in self.indices.chunks_exact(self.vertices_per_polygon as usize) {
            // Newell's method: length is twice the polygon area
            let mut face_normal = Vec3::ZERO;
            for (i, &a) in polygon.iter().enumerate() {
                let b = polygon[(i + 1) % polygon.len()];
                let (p, q) = (self.positions[a as usize], self.positions[b as usize]);
                face_normal += Vec3::new(
                    (p.y - q.y) * (p.z + q.z),
                    (p.z - q.z) * (p.x + q.x),
                    (p.x - q.x) * (p.y + q.y),
                );
            }
            for &index in polygon {
                normals[index as usize] += face_normal;
            }
        }
        for normal in &mut normals {
            *normal = normal.normalize_or_zero();
        }
        self.normals = Some(normals);
    }

    /// Fan-triangulated index list for GPU upload
    pub fn triangle_indices(&self) -> Vec<u32> {
        let per_polygon = self.vertices_per_polygon as usize;
        let mut triangles = Vec::with_capacity(self.polygon_count() * (per_polygon - 2) * 3);
        for polygon in self.polygons() {
            for k in 1..per_polygon - 1 {
                triangles.extend_from_slice(&[polygon[0], polygon[k], polygon[k + 1]]);
            }
        }
        triangles
    }

    /// Interleaved vertices for GPU upload; missing attributes are zero
    pub fn vertices(&self) -> Vec<Vertex> {
        let tangents = self
            .attributes
            .get("tangent")
            .filter(|buffer| buffer.components == 4);

        (0..self.positions.len())
            .map(|i| Vertex {
                position: self.positions[i],
                normal: self.normals.as_ref().map_or(Vec3::ZERO, |n| n[i]),
                uv: self.texcoords.as_ref().map_or(Vec2::ZERO, |t| t[i]),
                tangent: tangents.map_or(Vec4::ZERO, |t| {
                    Vec4::from_slice(&t.data[i * 4..i * 4 + 4])
                }),
            })
            .collect()
    }

    /// The unit square in the XY plane, facing +Z
    pub fn unit_quad() -> Self {
        Self {
            name: "unit_quad".into(),
            positions: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            normals: Some(vec![Vec3::Z; 4]),
            texcoords: Some(vec![
                Vec2::new(0.0, 1.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(0.0, 0.0),
            ]),
            indices: vec![0, 1, 2, 3],
            vertices_per_polygon: 4,
            creases: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// A `columns` x `rows` quad grid spanning the unit square, facing +Z
    pub fn grid(columns: u32, rows: u32) -> Self {
        let columns = columns.max(1);
        let rows = rows.max(1);
        let stride = columns + 1;

        let mut positions = Vec::with_capacity(((columns + 1) * (rows + 1)) as usize);
        let mut texcoords = Vec::with_capacity(positions.capacity());
        for j in 0..=rows {
            for i in 0..=columns {
                let u = i as f32 / columns as f32;
                let v = j as f32 / rows as f32;
                positions.push(Vec3::new(u, v, 0.0));
                texcoords.push(Vec2::new(u, 1.0 - v));
            }
        }

        let mut indices = Vec::with_capacity((columns * rows * 4) as usize);
        for j in 0..rows {
            for i in 0..columns {
                let base = j * stride + i;
                indices.extend_from_slice(&[base, base + 1, base + stride + 1, base + stride]);
            }
        }

        Self {
            name: format!("grid_{}x{}", columns, rows),
            normals: Some(vec![Vec3::Z; positions.len()]),
            positions,
            texcoords: Some(texcoords),
            indices,
            vertices_per_polygon: 4,
            creases: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// A closed unit cube of 8 shared corners and 6 outward-facing quads
    pub fn cube() -> Self {
        let positions = vec![
            Vec3::new(-0.5, -0.5, -0.5),
            Vec3::new(0.5, -0.5, -0.5),
            Vec3::new(0.5, 0.5, -0.5),
            Vec3::new(-0.5, 0.5, -0.5),
            Vec3::new(-0.5, -0.5, 0.5),
            Vec3::new(0.5, -0.5, 0.5),
            Vec3::new(0.5, 0.5, 0.5),
            Vec3::new(-0.5, 0.5, 0.5),
        ];
        #[rustfmt::skip]
        let indices = vec![
            0, 3, 2, 1, // -Z
            4, 5, 6, 7, // +Z
            0, 4, 7, 3, // -X
            1, 2, 6, 5, // +X
            0, 1, 5, 4, // -Y
            3, 7, 6, 2, // +Y
        ];
        Self::closed("cube", positions, indices, 4)
    }

    pub fn tetrahedron() -> Self {
        let s = 1.0 / 3.0f32.sqrt();
        let positions = vec![
            Vec3::new(1.0, 1.0, 1.0) * s,
            Vec3::new(1.0, -1.0, -1.0) * s,
            Vec3::new(-1.0, 1.0, -1.0) * s,
            Vec3::new(-1.0, -1.0, 1.0) * s,
        ];
        let indices = vec![0, 1, 2, 0, 3, 1, 0, 2, 3, 1, 3, 2];
        Self::closed("tetrahedron", positions, indices, 3)
    }

    pub fn octahedron() -> Self {
        let positions = vec![Vec3::X, -Vec3::X, Vec3::Y, -Vec3::Y, Vec3::Z, -Vec3::Z];
        #[rustfmt::skip]
        let indices = vec![
            0, 2, 4, 2, 1, 4, 1, 3, 4, 3, 0, 4,
            2, 0, 5, 1, 2, 5, 3, 1, 5, 0, 3, 5,
        ];
        Self::closed("octahedron", positions, indices, 3)
    }

    fn closed(name: &str, positions: Vec<Vec3>, indices: Vec<u32>, per_polygon: u32) -> Self {
        let mut mesh = Self {
            name: name.into(),
            positions,
            normals: None,
            texcoords: None,
            indices,
            vertices_per_polygon: per_polygon,
            creases: Vec::new(),
            attributes: BTreeMap::new(),
        };
        mesh.compute_normals();
        mesh
    }
}
