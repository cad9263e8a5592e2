//! One level of Catmull-Clark refinement.
//!
//! New vertices are laid out as face points, then edge points, then vertex
//! points, so each can be addressed by the id of the element it came from.

use glam::Vec3;

use super::half_edge::{EdgeId, FaceId, HalfEdgeMesh, VertexId};
use crate::resources::Mesh;

pub fn catmull_clark(mesh: &HalfEdgeMesh) -> Mesh {
    let face_count = mesh.face_count() as u32;
    let edge_count = mesh.edge_count() as u32;

    let face_points: Vec<Vec3> = mesh.face_ids().map(|f| face_point(mesh, f)).collect();
    let edge_points: Vec<Vec3> = mesh
        .edge_ids()
        .map(|e| edge_point(mesh, e, &face_points))
        .collect();
    let vertex_points: Vec<Vec3> = mesh
        .vertex_ids()
        .map(|v| vertex_point(mesh, v, &face_points, &edge_points))
        .collect();

    let fp_index = |f: FaceId| f.0;
    let ep_index = |e: EdgeId| face_count + e.0;
    let vp_index = |v: VertexId| face_count + edge_count + v.0;

    let mut indices = Vec::with_capacity(mesh.face_count() * 4 * 4);
    for face in mesh.face_ids() {
        let verts = mesh.vertices_of_face(face);
        let edges = mesh.edges_of_face(face);
        let n = verts.len();
        for i in 0..n {
            let previous = edges[(i + n - 1) % n];
            indices.extend_from_slice(&[
                fp_index(face),
                ep_index(previous),
                vp_index(verts[i]),
                ep_index(edges[i]),
            ]);
        }
    }

    let creases = refined_creases(mesh, ep_index, vp_index);

    let mut positions = face_points;
    positions.extend(edge_points);
    positions.extend(vertex_points);

    Mesh::from_refined(mesh.name(), positions, indices, 4, creases)
}

/// Split every marked crease into two halves through its edge point
pub(super) fn refined_creases(
    mesh: &HalfEdgeMesh,
    ep_index: impl Fn(EdgeId) -> u32,
    vp_index: impl Fn(VertexId) -> u32,
) -> Vec<[u32; 2]> {
    mesh.edge_ids()
        .filter(|&e| mesh.is_marked_crease(e))
        .flat_map(|e| {
            let [a, b] = mesh.edge_vertices(e);
            [[vp_index(a), ep_index(e)], [ep_index(e), vp_index(b)]]
        })
        .collect()
}

fn face_point(mesh: &HalfEdgeMesh, face: FaceId) -> Vec3 {
    let verts = mesh.vertices_of_face(face);
    let sum: Vec3 = verts.iter().map(|&v| mesh.position(v)).sum();
    sum / verts.len() as f32
}

fn edge_point(mesh: &HalfEdgeMesh, edge: EdgeId, face_points: &[Vec3]) -> Vec3 {
    let [a, b] = mesh.edge_vertices(edge);
    let (pa, pb) = (mesh.position(a), mesh.position(b));
    if mesh.is_crease_edge(edge) {
        return (pa + pb) * 0.5;
    }
    let faces: Vec3 = mesh
        .faces_of_edge(edge)
        .map(|f| face_points[f.0 as usize])
        .sum();
    (pa + pb + faces) * 0.25
}

fn vertex_point(
    mesh: &HalfEdgeMesh,
    vertex: VertexId,
    face_points: &[Vec3],
    edge_points: &[Vec3],
) -> Vec3 {
    let original = mesh.position(vertex);
    let edges = mesh.connected_edges(vertex);
    if edges.is_empty() {
        return original;
    }

    match mesh.crease_count(vertex) {
        0 | 1 => {
            let faces = incident_faces(mesh, vertex);
            // faces + edges + 1, not the valence alone
            let n = (faces.len() + edges.len() + 1) as f32;
            let edge_sum: Vec3 = edges.iter().map(|e| edge_points[e.0 as usize]).sum();
            let face_sum: Vec3 = faces.into_iter().map(|f| face_points[f.0 as usize]).sum();
            original * (n - 2.0) / n + edge_sum / (n * n) + face_sum / (n * n)
        }
        2 => {
            let crease_sum: Vec3 = edges
                .iter()
                .filter(|&&e| mesh.is_crease_edge(e))
                .map(|e| edge_points[e.0 as usize])
                .sum();
            (original * 6.0 + crease_sum) / 8.0
        }
        _ => original,
    }
}

fn incident_faces(mesh: &HalfEdgeMesh, vertex: VertexId) -> Vec<FaceId> {
    let mut faces: Vec<FaceId> = mesh
        .connected_edges(vertex)
        .iter()
        .flat_map(|&e| mesh.faces_of_edge(e))
        .collect();
    faces.sort_unstable();
    faces.dedup();
    faces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_counts_after_one_level() {
        let he = HalfEdgeMesh::build(&Mesh::cube()).unwrap();
        let refined = catmull_clark(&he);
        assert_eq!(refined.vertex_count(), 6 + 12 + 8);
        assert_eq!(refined.polygon_count(), 24);
        assert_eq!(refined.vertices_per_polygon(), 4);
        assert!(refined.normals().is_none());
    }

    #[test]
    fn test_cube_corners_move_inward() {
        let he = HalfEdgeMesh::build(&Mesh::cube()).unwrap();
        let refined = catmull_clark(&he);
        let corner = refined.positions()[6 + 12];
        assert!(corner.length() < Vec3::splat(0.5).length());
        // symmetric cube keeps the corner on the diagonal
        assert!((corner.x - corner.y).abs() < 1e-5);
        assert!((corner.y - corner.z).abs() < 1e-5);
    }

    #[test]
    fn test_cube_corner_smooth_stencil() {
        let he = HalfEdgeMesh::build(&Mesh::cube()).unwrap();
        let refined = catmull_clark(&he);
        // n = 3 faces + 3 edges + 1; edge points sum to -0.75, face points to -0.5
        // -0.5 * 5/7 - 0.75/49 - 0.5/49
        let corner = refined.positions()[6 + 12];
        assert!((corner - Vec3::splat(-0.382653)).length() < 1e-5, "{:?}", corner);
    }

    #[test]
    fn test_face_points_are_centroids() {
        let he = HalfEdgeMesh::build(&Mesh::cube()).unwrap();
        let refined = catmull_clark(&he);
        // face 0 is the -Z quad
        assert!((refined.positions()[0] - Vec3::new(0.0, 0.0, -0.5)).length() < 1e-6);
    }

    #[test]
    fn test_fully_creased_cube_keeps_its_corners() {
        #[rustfmt::skip]
        let creases = vec![
            [0, 1], [1, 2], [2, 3], [3, 0],
            [4, 5], [5, 6], [6, 7], [7, 4],
            [0, 4], [1, 5], [2, 6], [3, 7],
        ];
        let cube = Mesh::cube().with_creases(creases).unwrap();
        let refined = catmull_clark(&HalfEdgeMesh::build(&cube).unwrap());

        for (i, original) in cube.positions().iter().enumerate() {
            let moved = refined.positions()[6 + 12 + i];
            assert!((moved - *original).length() < 1e-6);
        }
        assert_eq!(refined.creases().len(), 24);
    }

    #[test]
    fn test_quad_winding_is_preserved() {
        let quad = Mesh::unit_quad();
        let refined = catmull_clark(&HalfEdgeMesh::build(&quad).unwrap());
        for polygon in refined.polygons() {
            let p: Vec<Vec3> = polygon.iter().map(|&i| refined.positions()[i as usize]).collect();
            let normal = (p[1] - p[0]).cross(p[2] - p[0]);
            assert!(normal.z > 0.0);
        }
    }
}
