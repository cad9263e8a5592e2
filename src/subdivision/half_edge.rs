//! Edge-centric adjacency built from an indexed polygon mesh.
//!
//! Edges are undirected and deduplicated by their `(min, max)` vertex key, so
//! every edge knows the one or two faces that share it. Index-based storage
//! keeps traversal cheap and lets the refinement passes address new vertices
//! by the id of the element they were derived from.

use std::collections::HashMap;

use glam::Vec3;

use super::TopologyError;
use crate::resources::Mesh;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceId(pub u32);

/// Which of an edge's two faces a query refers to.
///
/// `First` is the face that discovered the edge during construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    First,
    Second,
}

#[derive(Debug, Clone)]
struct HeVertex {
    position: Vec3,
    edges: Vec<EdgeId>,
}

#[derive(Debug, Clone)]
struct HeEdge {
    vertices: [VertexId; 2],
    faces: (FaceId, Option<FaceId>),
    marked: bool,
}

#[derive(Debug, Clone)]
struct HeFace {
    vertices: Vec<VertexId>,
    edges: Vec<EdgeId>,
}

#[derive(Debug, Clone)]
pub struct HalfEdgeMesh {
    name: String,
    vertices: Vec<HeVertex>,
    edges: Vec<HeEdge>,
    faces: Vec<HeFace>,
    vertices_per_polygon: u32,
}

fn edge_key(a: u32, b: u32) -> (u32, u32) {
    (a.min(b), a.max(b))
}

impl HalfEdgeMesh {
    /// Build adjacency for a triangle or quad mesh.
    ///
    /// Every topological problem is reported here so refinement itself
    /// cannot fail on a mesh that built successfully.
    pub fn build(mesh: &Mesh) -> Result<Self, TopologyError> {
        let vpp = mesh.vertices_per_polygon();
        if vpp != 3 && vpp != 4 {
            return Err(TopologyError::UnsupportedPolygon(vpp));
        }

        let mut vertices: Vec<HeVertex> = mesh
            .positions()
            .iter()
            .map(|&position| HeVertex {
                position,
                edges: Vec::new(),
            })
            .collect();
        let mut edges: Vec<HeEdge> = Vec::new();
        let mut faces: Vec<HeFace> = Vec::with_capacity(mesh.polygon_count());
        let mut edge_map: HashMap<(u32, u32), EdgeId> = HashMap::new();

        for (fi, polygon) in mesh.polygons().enumerate() {
            let face_id = FaceId(fi as u32);

            for (i, &v) in polygon.iter().enumerate() {
                if polygon[..i].contains(&v) {
                    return Err(TopologyError::DegenerateEdge {
                        face: face_id.0,
                        vertex: v,
                    });
                }
            }

            let mut face_edges = Vec::with_capacity(polygon.len());
            for i in 0..polygon.len() {
                let a = polygon[i];
                let b = polygon[(i + 1) % polygon.len()];
                let key = edge_key(a, b);

                let edge_id = match edge_map.get(&key) {
                    Some(&id) => {
                        let edge = &mut edges[id.0 as usize];
                        if edge.faces.1.is_some() {
                            return Err(TopologyError::NonManifoldEdge(key.0, key.1));
                        }
                        edge.faces.1 = Some(face_id);
                        id
                    }
                    None => {
                        let id = EdgeId(edges.len() as u32);
                        edges.push(HeEdge {
                            vertices: [VertexId(key.0), VertexId(key.1)],
                            faces: (face_id, None),
                            marked: false,
                        });
                        edge_map.insert(key, id);
                        vertices[key.0 as usize].edges.push(id);
                        vertices[key.1 as usize].edges.push(id);
                        id
                    }
                };
                face_edges.push(edge_id);
            }

            faces.push(HeFace {
                vertices: polygon.iter().map(|&v| VertexId(v)).collect(),
                edges: face_edges,
            });
        }

        for &[a, b] in mesh.creases() {
            let id = edge_map
                .get(&edge_key(a, b))
                .ok_or(TopologyError::UnknownCreaseEdge(a, b))?;
            edges[id.0 as usize].marked = true;
        }

        Ok(Self {
            name: mesh.name().to_string(),
            vertices,
            edges,
            faces,
            vertices_per_polygon: vpp,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertices_per_polygon(&self) -> u32 {
        self.vertices_per_polygon
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> {
        (0..self.vertices.len() as u32).map(VertexId)
    }

    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> {
        (0..self.edges.len() as u32).map(EdgeId)
    }

    pub fn face_ids(&self) -> impl Iterator<Item = FaceId> {
        (0..self.faces.len() as u32).map(FaceId)
    }

    pub fn position(&self, vertex: VertexId) -> Vec3 {
        self.vertices[vertex.0 as usize].position
    }

    pub fn connected_edges(&self, vertex: VertexId) -> &[EdgeId] {
        &self.vertices[vertex.0 as usize].edges
    }

    pub fn valence(&self, vertex: VertexId) -> usize {
        self.connected_edges(vertex).len()
    }

    /// Endpoints as `(min, max)` of the original indices
    pub fn edge_vertices(&self, edge: EdgeId) -> [VertexId; 2] {
        self.edges[edge.0 as usize].vertices
    }

    /// The one or two faces sharing an edge
    pub fn faces_of_edge(&self, edge: EdgeId) -> impl Iterator<Item = FaceId> {
        let (first, second) = self.edges[edge.0 as usize].faces;
        std::iter::once(first).chain(second)
    }

    pub fn face_on(&self, edge: EdgeId, side: Side) -> Option<FaceId> {
        let (first, second) = self.edges[edge.0 as usize].faces;
        match side {
            Side::First => Some(first),
            Side::Second => second,
        }
    }

    pub fn edges_of_face(&self, face: FaceId) -> &[EdgeId] {
        &self.faces[face.0 as usize].edges
    }

    pub fn vertices_of_face(&self, face: FaceId) -> &[VertexId] {
        &self.faces[face.0 as usize].vertices
    }

    pub fn is_boundary_edge(&self, edge: EdgeId) -> bool {
        self.edges[edge.0 as usize].faces.1.is_none()
    }

    /// Explicitly marked in the mesh's crease list
    pub fn is_marked_crease(&self, edge: EdgeId) -> bool {
        self.edges[edge.0 as usize].marked
    }

    /// Marked as a crease or bordered by a single face
    pub fn is_crease_edge(&self, edge: EdgeId) -> bool {
        self.is_marked_crease(edge) || self.is_boundary_edge(edge)
    }

    pub fn crease_count(&self, vertex: VertexId) -> usize {
        self.connected_edges(vertex)
            .iter()
            .filter(|&&e| self.is_crease_edge(e))
            .count()
    }

    /// Edges of the face on `side`, excluding `edge` itself. Empty for the
    /// open side of a boundary edge.
    pub fn other_edges_of_adjacent_face(&self, edge: EdgeId, side: Side) -> Vec<EdgeId> {
        match self.face_on(edge, side) {
            Some(face) => self
                .edges_of_face(face)
                .iter()
                .copied()
                .filter(|&e| e != edge)
                .collect(),
            None => Vec::new(),
        }
    }

    /// The vertex of the adjacent triangle that is not on `edge`
    pub fn opposite_vertex(&self, edge: EdgeId, side: Side) -> Option<VertexId> {
        let [a, b] = self.edge_vertices(edge);
        self.other_edges_of_adjacent_face(edge, side)
            .into_iter()
            .flat_map(|e| self.edge_vertices(e))
            .find(|&v| v != a && v != b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_triangles() -> Mesh {
        // 0--1
        // | /|
        // |/ |
        // 2--3
        let positions = vec![
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
        ];
        Mesh::new("pair", positions, vec![0, 2, 1, 1, 2, 3], 3).unwrap()
    }

    #[test]
    fn test_cube_is_closed() {
        let he = HalfEdgeMesh::build(&Mesh::cube()).unwrap();
        assert_eq!(he.vertex_count(), 8);
        assert_eq!(he.edge_count(), 12);
        assert_eq!(he.face_count(), 6);
        for edge in he.edge_ids() {
            assert_eq!(he.faces_of_edge(edge).count(), 2);
            assert!(!he.is_crease_edge(edge));
        }
        for vertex in he.vertex_ids() {
            assert_eq!(he.valence(vertex), 3);
        }
    }

    #[test]
    fn test_shared_edge_and_boundary() {
        let he = HalfEdgeMesh::build(&two_triangles()).unwrap();
        assert_eq!(he.edge_count(), 5);

        let shared = he
            .edge_ids()
            .find(|&e| he.edge_vertices(e) == [VertexId(1), VertexId(2)])
            .unwrap();
        assert!(!he.is_crease_edge(shared));
        assert_eq!(he.opposite_vertex(shared, Side::First), Some(VertexId(0)));
        assert_eq!(he.opposite_vertex(shared, Side::Second), Some(VertexId(3)));

        let boundary = he.edge_ids().find(|&e| he.is_boundary_edge(e)).unwrap();
        assert!(he.is_crease_edge(boundary));
        assert!(he
            .other_edges_of_adjacent_face(boundary, Side::Second)
            .is_empty());
        assert_eq!(he.opposite_vertex(boundary, Side::Second), None);
    }

    #[test]
    fn test_face_edges_follow_winding() {
        let he = HalfEdgeMesh::build(&two_triangles()).unwrap();
        let face = FaceId(1);
        let verts = he.vertices_of_face(face);
        assert_eq!(verts, &[VertexId(1), VertexId(2), VertexId(3)]);
        for (i, &edge) in he.edges_of_face(face).iter().enumerate() {
            let [a, b] = he.edge_vertices(edge);
            let (p, q) = (verts[i], verts[(i + 1) % 3]);
            assert!((a, b) == (p.min(q), p.max(q)));
        }
    }

    #[test]
    fn test_marked_creases_are_found() {
        let mesh = Mesh::cube().with_creases(vec![[0, 3]]).unwrap();
        let he = HalfEdgeMesh::build(&mesh).unwrap();
        let marked: Vec<_> = he.edge_ids().filter(|&e| he.is_crease_edge(e)).collect();
        assert_eq!(marked.len(), 1);
        assert_eq!(he.edge_vertices(marked[0]), [VertexId(0), VertexId(3)]);
        assert_eq!(he.crease_count(VertexId(0)), 1);
        assert_eq!(he.crease_count(VertexId(1)), 0);
    }

    #[test]
    fn test_unknown_crease_is_rejected() {
        let mesh = Mesh::cube().with_creases(vec![[0, 6]]).unwrap();
        assert_eq!(
            HalfEdgeMesh::build(&mesh).unwrap_err(),
            TopologyError::UnknownCreaseEdge(0, 6)
        );
    }

    #[test]
    fn test_third_face_on_an_edge_is_rejected() {
        let positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z, Vec3::NEG_Y];
        let mesh = Mesh::new("fan", positions, vec![0, 1, 2, 1, 0, 3, 0, 1, 4], 3).unwrap();
        assert_eq!(
            HalfEdgeMesh::build(&mesh).unwrap_err(),
            TopologyError::NonManifoldEdge(0, 1)
        );
    }

    #[test]
    fn test_repeated_vertex_is_rejected() {
        let positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        let mesh = Mesh::new("sliver", positions, vec![0, 1, 1], 3).unwrap();
        assert_eq!(
            HalfEdgeMesh::build(&mesh).unwrap_err(),
            TopologyError::DegenerateEdge { face: 0, vertex: 1 }
        );
    }

    #[test]
    fn test_pentagons_are_rejected() {
        let positions = vec![Vec3::ZERO; 5];
        let mesh = Mesh::new("penta", positions, vec![0, 1, 2, 3, 4], 5).unwrap();
        assert_eq!(
            HalfEdgeMesh::build(&mesh).unwrap_err(),
            TopologyError::UnsupportedPolygon(5)
        );
    }
}
