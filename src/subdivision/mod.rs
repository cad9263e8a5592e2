//! Mesh refinement
//!
//! Meshes are converted into an edge-adjacency structure and refined one
//! level at a time with Catmull-Clark (triangles and quads, output quads) or
//! Loop (triangles only). Marked creases and open boundaries keep sharp
//! features sharp.

pub mod catmull_clark;
pub mod half_edge;
pub mod loop_scheme;

pub use catmull_clark::catmull_clark;
pub use half_edge::{EdgeId, FaceId, HalfEdgeMesh, Side, VertexId};
pub use loop_scheme::loop_subdivide;

use crate::resources::Mesh;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("Edge ({0}, {1}) is shared by more than two faces")]
    NonManifoldEdge(u32, u32),
    #[error("Face {face} repeats vertex {vertex}")]
    DegenerateEdge { face: u32, vertex: u32 },
    #[error("Crease ({0}, {1}) is not an edge of the mesh")]
    UnknownCreaseEdge(u32, u32),
    #[error("Cannot subdivide polygons with {0} vertices")]
    UnsupportedPolygon(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    CatmullClark,
    Loop,
}

/// Refine `mesh` `levels` times, rebuilding adjacency at every level.
///
/// The result carries positions, indices and creases only; callers that want
/// smooth shading recompute normals afterwards.
pub fn subdivide(mesh: &Mesh, scheme: Scheme, levels: u32) -> Result<Mesh, TopologyError> {
    let mut current = mesh.clone();
    for level in 0..levels {
        let adjacency = HalfEdgeMesh::build(&current)?;
        current = match scheme {
            Scheme::CatmullClark => catmull_clark(&adjacency),
            Scheme::Loop => loop_subdivide(&adjacency)?,
        };
        log::debug!(
            "{} level {}: {} vertices, {} polygons",
            mesh.name(),
            level + 1,
            current.vertex_count(),
            current.polygon_count()
        );
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_levels_is_identity() {
        let cube = Mesh::cube();
        assert_eq!(subdivide(&cube, Scheme::CatmullClark, 0).unwrap(), cube);
    }

    #[test]
    fn test_two_levels_of_catmull_clark() {
        let refined = subdivide(&Mesh::cube(), Scheme::CatmullClark, 2).unwrap();
        assert_eq!(refined.polygon_count(), 6 * 4 * 4);
        // V - E + F = 2 on a closed genus-0 surface
        assert_eq!(refined.vertex_count(), 98);
    }

    #[test]
    fn test_catmull_clark_on_triangles_yields_quads() {
        let refined = subdivide(&Mesh::tetrahedron(), Scheme::CatmullClark, 1).unwrap();
        assert_eq!(refined.vertices_per_polygon(), 4);
        assert_eq!(refined.polygon_count(), 12);
        assert_eq!(refined.vertex_count(), 4 + 6 + 4);
    }

    #[test]
    fn test_loop_rejects_quads_on_the_first_level() {
        assert_eq!(
            subdivide(&Mesh::cube(), Scheme::Loop, 1).unwrap_err(),
            TopologyError::UnsupportedPolygon(4)
        );
    }

    #[test]
    fn test_name_is_kept() {
        let refined = subdivide(&Mesh::octahedron(), Scheme::Loop, 1).unwrap();
        assert_eq!(refined.name(), "octahedron");
    }
}
