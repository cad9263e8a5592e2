//! One level of Loop refinement for triangle meshes.

use std::f32::consts::PI;

use glam::Vec3;

use super::catmull_clark::refined_creases;
use super::half_edge::{EdgeId, HalfEdgeMesh, Side, VertexId};
use super::TopologyError;
use crate::resources::Mesh;

/// Split every triangle into four. Output vertices are the edge points
/// followed by the repositioned original vertices.
pub fn loop_subdivide(mesh: &HalfEdgeMesh) -> Result<Mesh, TopologyError> {
    if mesh.vertices_per_polygon() != 3 {
        return Err(TopologyError::UnsupportedPolygon(
            mesh.vertices_per_polygon(),
        ));
    }

    let edge_count = mesh.edge_count() as u32;
    let edge_points: Vec<Vec3> = mesh.edge_ids().map(|e| edge_point(mesh, e)).collect();
    let vertex_points: Vec<Vec3> = mesh
        .vertex_ids()
        .map(|v| vertex_point(mesh, v, &edge_points))
        .collect();

    let ep = |e: EdgeId| e.0;
    let vp = |v: VertexId| edge_count + v.0;

    let mut indices = Vec::with_capacity(mesh.face_count() * 12);
    for face in mesh.face_ids() {
        let [v0, v1, v2] = [0, 1, 2].map(|i| vp(mesh.vertices_of_face(face)[i]));
        let [e0, e1, e2] = [0, 1, 2].map(|i| ep(mesh.edges_of_face(face)[i]));
        #[rustfmt::skip]
        let split = [
            v0, e0, e2,
            v1, e1, e0,
            v2, e2, e1,
            e0, e1, e2,
        ];
        indices.extend_from_slice(&split);
    }

    let creases = refined_creases(mesh, ep, vp);

    let mut positions = edge_points;
    positions.extend(vertex_points);

    Ok(Mesh::from_refined(mesh.name(), positions, indices, 3, creases))
}

fn edge_point(mesh: &HalfEdgeMesh, edge: EdgeId) -> Vec3 {
    let [a, b] = mesh.edge_vertices(edge);
    let (pa, pb) = (mesh.position(a), mesh.position(b));
    if mesh.is_crease_edge(edge) {
        return (pa + pb) * 0.5;
    }
    let wings: Vec3 = [Side::First, Side::Second]
        .into_iter()
        .filter_map(|side| mesh.opposite_vertex(edge, side))
        .map(|v| mesh.position(v))
        .sum();
    (pa + pb) * (3.0 / 8.0) + wings * (1.0 / 8.0)
}

/// Loop's smoothing weight for a vertex of valence `n`
pub fn beta(n: usize) -> f32 {
    let n = n as f32;
    let c = 3.0 / 8.0 + 0.25 * (2.0 * PI / n).cos();
    (5.0 / 8.0 - c * c) / n
}

fn vertex_point(mesh: &HalfEdgeMesh, vertex: VertexId, edge_points: &[Vec3]) -> Vec3 {
    let original = mesh.position(vertex);
    let edges = mesh.connected_edges(vertex);
    if edges.is_empty() {
        return original;
    }

    match mesh.crease_count(vertex) {
        2 => {
            let crease_sum: Vec3 = edges
                .iter()
                .filter(|&&e| mesh.is_crease_edge(e))
                .map(|e| edge_points[e.0 as usize])
                .sum();
            original * (6.0 / 8.0) + crease_sum * (1.0 / 8.0)
        }
        c if c > 2 => original,
        _ => {
            let n = edges.len();
            let b = beta(n);
            let sum: Vec3 = edges.iter().map(|e| edge_points[e.0 as usize]).sum();
            original * (1.0 - n as f32 * b) + sum * b
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beta_for_regular_valence() {
        // valence 6: c = 3/8 + 1/8 = 1/2, beta = (5/8 - 1/4) / 6
        assert!((beta(6) - 0.0625).abs() < 1e-6);
    }

    #[test]
    fn test_tetrahedron_counts() {
        let he = HalfEdgeMesh::build(&Mesh::tetrahedron()).unwrap();
        let refined = loop_subdivide(&he).unwrap();
        assert_eq!(refined.vertex_count(), 6 + 4);
        assert_eq!(refined.polygon_count(), 16);
        assert_eq!(refined.vertices_per_polygon(), 3);
    }

    #[test]
    fn test_quads_are_rejected() {
        let he = HalfEdgeMesh::build(&Mesh::cube()).unwrap();
        assert_eq!(
            loop_subdivide(&he).unwrap_err(),
            TopologyError::UnsupportedPolygon(4)
        );
    }

    #[test]
    fn test_octahedron_stays_symmetric() {
        let he = HalfEdgeMesh::build(&Mesh::octahedron()).unwrap();
        let refined = loop_subdivide(&he).unwrap();
        let tips: Vec<f32> = refined.positions()[12..]
            .iter()
            .map(|p| p.length())
            .collect();
        for radius in &tips {
            assert!((radius - tips[0]).abs() < 1e-5);
            assert!(*radius < 1.0);
        }
    }

    #[test]
    fn test_single_triangle_keeps_its_shape() {
        let positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        let mesh = Mesh::new("tri", positions, vec![0, 1, 2], 3).unwrap();
        let refined = loop_subdivide(&HalfEdgeMesh::build(&mesh).unwrap()).unwrap();

        // every edge is a boundary, so edge points are midpoints
        assert!((refined.positions()[0] - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-6);
        for polygon in refined.polygons() {
            let p: Vec<Vec3> = polygon.iter().map(|&i| refined.positions()[i as usize]).collect();
            assert!((p[1] - p[0]).cross(p[2] - p[0]).z > 0.0);
        }
    }
}
