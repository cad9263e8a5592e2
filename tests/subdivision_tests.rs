//! Half-edge construction and subdivision properties.

mod common;

use rstest::rstest;

use common::{approx_eq, fully_creased_cube};
use deferred_engine::resources::Mesh;
use deferred_engine::subdivision::{catmull_clark, loop_subdivide, HalfEdgeMesh, TopologyError};
use deferred_engine::{subdivide, Scheme};
use glam::Vec3;

// ============================================================================
// Half-edge construction
// ============================================================================

#[rstest]
#[case::cube(Mesh::cube())]
#[case::tetrahedron(Mesh::tetrahedron())]
#[case::octahedron(Mesh::octahedron())]
fn test_closed_mesh_edges_have_two_faces(#[case] mesh: Mesh) {
    let he = HalfEdgeMesh::build(&mesh).unwrap();
    for edge in he.edge_ids() {
        assert_eq!(he.faces_of_edge(edge).count(), 2);
        assert!(!he.is_boundary_edge(edge));
        assert!(!he.is_crease_edge(edge));
    }
    // Euler characteristic of a sphere
    let euler = he.vertex_count() as i64 - he.edge_count() as i64 + he.face_count() as i64;
    assert_eq!(euler, 2);
}

#[rstest]
#[case::quad(Mesh::unit_quad(), 4)]
#[case::grid(Mesh::grid(3, 2), 10)]
fn test_open_mesh_boundary_is_crease(#[case] mesh: Mesh, #[case] boundary: usize) {
    let he = HalfEdgeMesh::build(&mesh).unwrap();
    let boundary_edges: Vec<_> = he.edge_ids().filter(|&e| he.is_boundary_edge(e)).collect();
    assert_eq!(boundary_edges.len(), boundary);
    for edge in he.edge_ids() {
        let faces = he.faces_of_edge(edge).count();
        assert_eq!(he.is_boundary_edge(edge), faces == 1);
        assert_eq!(he.is_crease_edge(edge), faces == 1);
    }
}

#[test]
fn test_non_manifold_edge_is_rejected() {
    let positions = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(0.0, -1.0, 0.0),
        Vec3::new(0.0, 0.0, 1.0),
    ];
    let mesh = Mesh::new("fan", positions, vec![0, 1, 2, 1, 0, 3, 0, 1, 4], 3).unwrap();
    assert!(matches!(
        HalfEdgeMesh::build(&mesh),
        Err(TopologyError::NonManifoldEdge(0, 1))
    ));
}

// ============================================================================
// Catmull-Clark
// ============================================================================

#[rstest]
#[case::cube(Mesh::cube())]
#[case::quad(Mesh::unit_quad())]
#[case::grid(Mesh::grid(2, 3))]
#[case::tetrahedron(Mesh::tetrahedron())]
fn test_catmull_clark_counts(#[case] mesh: Mesh) {
    let he = HalfEdgeMesh::build(&mesh).unwrap();
    let refined = catmull_clark(&he);

    assert_eq!(
        refined.vertex_count(),
        he.face_count() + he.edge_count() + he.vertex_count()
    );
    // One quad per corner of every input polygon
    let corners = he.face_count() * mesh.vertices_per_polygon() as usize;
    assert_eq!(refined.polygon_count(), corners);
    assert_eq!(refined.vertices_per_polygon(), 4);
    if mesh.vertices_per_polygon() == 4 {
        assert_eq!(refined.polygon_count(), 4 * he.face_count());
    }
}

#[rstest]
#[case::one_level(1)]
#[case::three_levels(3)]
fn test_catmull_clark_output_resubdivides(#[case] levels: u32) {
    let refined = subdivide(&Mesh::cube(), Scheme::CatmullClark, levels).unwrap();
    let he = HalfEdgeMesh::build(&refined).unwrap();
    assert_eq!(refined.polygon_count(), 6 * 4usize.pow(levels));
    for edge in he.edge_ids() {
        assert_eq!(he.faces_of_edge(edge).count(), 2);
    }
}

fn has_point(points: &[Vec3], expected: Vec3) -> bool {
    points.iter().any(|p| (*p - expected).length() < 1e-5)
}

#[test]
fn test_unit_square_face_point_and_planarity() {
    let refined = subdivide(&Mesh::unit_quad(), Scheme::CatmullClark, 1).unwrap();
    let face_point = refined.positions()[0];
    assert!((face_point - Vec3::new(0.5, 0.5, 0.0)).length() < 1e-6);
    assert!(refined.positions().iter().all(|p| approx_eq(p.z, 0.0)));
}

#[rstest]
#[case::bottom(Vec3::new(0.5, 0.0, 0.0))]
#[case::right(Vec3::new(1.0, 0.5, 0.0))]
#[case::top(Vec3::new(0.5, 1.0, 0.0))]
#[case::left(Vec3::new(0.0, 0.5, 0.0))]
fn test_unit_square_edge_points(#[case] expected: Vec3) {
    let refined = subdivide(&Mesh::unit_quad(), Scheme::CatmullClark, 1).unwrap();
    // one face point, then the four edge points
    let edge_points = &refined.positions()[1..5];
    assert!(has_point(edge_points, expected), "{:?} not in {:?}", expected, edge_points);
}

// Every corner of the square sits between two boundary edges
#[rstest]
#[case::origin(0, Vec3::new(0.0625, 0.0625, 0.0))]
#[case::x_corner(1, Vec3::new(0.9375, 0.0625, 0.0))]
#[case::far_corner(2, Vec3::new(0.9375, 0.9375, 0.0))]
#[case::y_corner(3, Vec3::new(0.0625, 0.9375, 0.0))]
fn test_unit_square_two_crease_corner(#[case] vertex: usize, #[case] expected: Vec3) {
    let refined = subdivide(&Mesh::unit_quad(), Scheme::CatmullClark, 1).unwrap();
    let moved = refined.positions()[1 + 4 + vertex];
    assert!((moved - expected).length() < 1e-6, "{:?}", moved);
}

#[test]
fn test_cube_corner_uses_faces_and_edges_in_weight() {
    let refined = subdivide(&Mesh::cube(), Scheme::CatmullClark, 1).unwrap();
    // n = 3 faces + 3 edges + 1 = 7 at every cube corner
    let expected = Vec3::splat(-0.5 * 5.0 / 7.0 - 0.75 / 49.0 - 0.5 / 49.0);
    let corner = refined.positions()[6 + 12];
    assert!((corner - expected).length() < 1e-5, "{:?}", corner);
}

// ============================================================================
// Loop
// ============================================================================

#[rstest]
#[case::tetrahedron(Mesh::tetrahedron())]
#[case::octahedron(Mesh::octahedron())]
fn test_loop_counts(#[case] mesh: Mesh) {
    let he = HalfEdgeMesh::build(&mesh).unwrap();
    let refined = loop_subdivide(&he).unwrap();

    assert_eq!(refined.vertex_count(), he.edge_count() + he.vertex_count());
    assert_eq!(refined.polygon_count(), 4 * he.face_count());
    assert_eq!(refined.vertices_per_polygon(), 3);

    let again = subdivide(&refined, Scheme::Loop, 1).unwrap();
    assert_eq!(again.polygon_count(), 16 * he.face_count());
}

#[test]
fn test_loop_rejects_quads() {
    assert_eq!(
        subdivide(&Mesh::cube(), Scheme::Loop, 1).unwrap_err(),
        TopologyError::UnsupportedPolygon(4)
    );
}

#[rstest]
#[case::x_to_y(Vec3::new(0.375, 0.375, 0.0))]
#[case::x_to_z(Vec3::new(0.375, 0.0, 0.375))]
#[case::y_to_minus_z(Vec3::new(0.0, 0.375, -0.375))]
fn test_loop_interior_edge_point(#[case] expected: Vec3) {
    // 3/8 of the endpoints plus 1/8 of two opposite tips, which cancel
    let he = HalfEdgeMesh::build(&Mesh::octahedron()).unwrap();
    let refined = loop_subdivide(&he).unwrap();
    let edge_points = &refined.positions()[..he.edge_count()];
    assert!(has_point(edge_points, expected), "{:?} not in {:?}", expected, edge_points);
}

#[rstest]
#[case::plus_x(0, Vec3::new(0.697_265_6, 0.0, 0.0))]
#[case::plus_z(4, Vec3::new(0.0, 0.0, 0.697_265_6))]
fn test_loop_valence_four_vertex(#[case] vertex: usize, #[case] expected: Vec3) {
    // beta(4) = (5/8 - (3/8)^2) / 4; edge points sum to 1.5 along the axis
    let he = HalfEdgeMesh::build(&Mesh::octahedron()).unwrap();
    let refined = loop_subdivide(&he).unwrap();
    let moved = refined.positions()[he.edge_count() + vertex];
    assert!((moved - expected).length() < 1e-5, "{:?}", moved);
}

#[rstest]
#[case::right_angle(0, Vec3::new(0.0625, 0.0625, 0.0))]
#[case::on_x(1, Vec3::new(0.875, 0.0625, 0.0))]
#[case::on_y(2, Vec3::new(0.0625, 0.875, 0.0))]
fn test_loop_two_crease_corner(#[case] vertex: usize, #[case] expected: Vec3) {
    let positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
    let mesh = Mesh::new("tri", positions, vec![0, 1, 2], 3).unwrap();
    let refined = subdivide(&mesh, Scheme::Loop, 1).unwrap();
    let moved = refined.positions()[3 + vertex];
    assert!((moved - expected).length() < 1e-6, "{:?}", moved);
}

// ============================================================================
// Creases
// ============================================================================

#[test]
fn test_crease_splits_through_edge_point() {
    let cube = fully_creased_cube();
    let he = HalfEdgeMesh::build(&cube).unwrap();
    let refined = catmull_clark(&he);
    let creases = refined.creases();
    assert_eq!(creases.len(), 2 * cube.creases().len());

    // Vertex points follow the face and edge points
    let first_vertex_point = (he.face_count() + he.edge_count()) as u32;
    let length = |a: Vec3, b: Vec3| (a - b).length();
    let refined_positions = refined.positions();

    for halves in creases.chunks(2) {
        let (first, second) = (halves[0], halves[1]);
        assert_eq!(first[1], second[0], "halves must meet at the edge point");

        let a = cube.positions()[(first[0] - first_vertex_point) as usize];
        let b = cube.positions()[(second[1] - first_vertex_point) as usize];
        let split = length(refined_positions[first[0] as usize], refined_positions[first[1] as usize])
            + length(refined_positions[second[0] as usize], refined_positions[second[1] as usize]);
        assert!(approx_eq(length(a, b), split), "{} != {}", length(a, b), split);
    }
}

#[test]
fn test_creased_tetrahedron_keeps_creases_under_loop() {
    let tetra = Mesh::tetrahedron().with_creases(vec![[0, 1]]).unwrap();
    let refined = subdivide(&tetra, Scheme::Loop, 2).unwrap();
    assert_eq!(refined.creases().len(), 4);
}
