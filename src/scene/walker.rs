//! Per-frame scene traversal
//!
//! Flattens the node tree into the lists the renderer consumes: draw items
//! with world matrices, lights resolved to world space, and reflection
//! probes. Nothing is cached between frames.

use glam::{Mat4, Vec3};

use super::{CollectedLight, NodeId, NodeKind, ReflectionProbe, Scene};
use crate::resources::{MaterialId, MeshId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawItem {
    pub node: NodeId,
    pub mesh: MeshId,
    pub material: MaterialId,
    pub world: Mat4,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeItem {
    pub node: NodeId,
    pub probe: ReflectionProbe,
    /// World-space center the cube faces are rendered from
    pub center: Vec3,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalkResult {
    pub draws: Vec<DrawItem>,
    pub lights: Vec<CollectedLight>,
    pub probes: Vec<ProbeItem>,
}

pub struct SceneWalker<'a> {
    scene: &'a Scene,
    exclude: Option<NodeId>,
}

impl<'a> SceneWalker<'a> {
    pub fn new(scene: &'a Scene) -> Self {
        Self {
            scene,
            exclude: None,
        }
    }

    /// Skip the draws of `node` and everything below it. Lights in the
    /// subtree still contribute.
    pub fn exclude(mut self, node: NodeId) -> Self {
        self.exclude = Some(node);
        self
    }

    /// Depth-first walk in child order
    pub fn walk(&self) -> WalkResult {
        let mut result = WalkResult::default();
        let mut stack: Vec<(NodeId, Mat4, bool)> = vec![(self.scene.root(), Mat4::IDENTITY, false)];

        while let Some((id, parent_world, parent_excluded)) = stack.pop() {
            let Ok(node) = self.scene.node(id) else {
                continue;
            };
            if !node.visible {
                continue;
            }

            let world = parent_world * node.transform.matrix();
            let excluded = parent_excluded || self.exclude == Some(id);

            match &node.kind {
                NodeKind::Group => {}
                NodeKind::Geometry(geometry) => {
                    if !excluded {
                        result.draws.extend(geometry.parts.iter().map(|&(mesh, material)| DrawItem {
                            node: id,
                            mesh,
                            material,
                            world,
                        }));
                    }
                    if let Some(probe) = geometry.probe {
                        result.probes.push(ProbeItem {
                            node: id,
                            probe,
                            center: world.transform_point3(Vec3::ZERO),
                        });
                    }
                }
                NodeKind::Light(light) => {
                    result.lights.push(CollectedLight {
                        node: id,
                        light: *light,
                        position: world.transform_point3(Vec3::ZERO),
                        direction: world.transform_vector3(Vec3::NEG_Z).normalize_or_zero(),
                    });
                }
            }

            for &child in node.children().iter().rev() {
                stack.push((child, world, excluded));
            }
        }

        log::trace!(
            "Scene walk: {} draws, {} lights, {} probes",
            result.draws.len(),
            result.lights.len(),
            result.probes.len()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{MaterialId, MeshId};
    use crate::scene::{GeometryNode, Light, Transform};
    use glam::Quat;

    fn geometry() -> GeometryNode {
        GeometryNode::new(MeshId(0), MaterialId(0))
    }

    #[test]
    fn test_world_transforms_compose() {
        let mut scene = Scene::new();
        let parent = scene
            .add_group(
                scene.root(),
                "parent",
                Transform::from_position(Vec3::new(1.0, 0.0, 0.0)).with_scale(2.0),
            )
            .unwrap();
        let child = scene
            .add_geometry(parent, "child", geometry(), Transform::from_position(Vec3::Y))
            .unwrap();

        let result = SceneWalker::new(&scene).walk();
        assert_eq!(result.draws.len(), 1);
        assert_eq!(result.draws[0].node, child);
        let origin = result.draws[0].world.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_hidden_subtree_is_skipped() {
        let mut scene = Scene::new();
        let group = scene
            .add_group(scene.root(), "group", Transform::default())
            .unwrap();
        scene
            .add_geometry(group, "mesh", geometry(), Transform::default())
            .unwrap();
        scene
            .add_light(group, "lamp", Light::point(Vec3::ONE), Transform::default())
            .unwrap();
        scene.set_visible(group, false).unwrap();

        let result = SceneWalker::new(&scene).walk();
        assert!(result.draws.is_empty());
        assert!(result.lights.is_empty());
    }

    #[test]
    fn test_excluded_subtree_keeps_lights_and_probes() {
        let mut scene = Scene::new();
        let probe = scene
            .add_geometry(
                scene.root(),
                "sphere",
                geometry().with_probe(64),
                Transform::from_position(Vec3::new(0.0, 3.0, 0.0)),
            )
            .unwrap();
        scene
            .add_geometry(probe, "satellite", geometry(), Transform::default())
            .unwrap();
        scene
            .add_light(probe, "glow", Light::point(Vec3::ONE), Transform::default())
            .unwrap();
        scene
            .add_geometry(scene.root(), "floor", geometry(), Transform::default())
            .unwrap();

        let full = SceneWalker::new(&scene).walk();
        assert_eq!(full.draws.len(), 3);
        assert_eq!(full.probes[0].center, Vec3::new(0.0, 3.0, 0.0));

        let around = SceneWalker::new(&scene).exclude(probe).walk();
        assert_eq!(around.draws.len(), 1);
        assert_eq!(around.lights.len(), 1);
        assert_eq!(around.probes.len(), 1);
    }

    #[test]
    fn test_light_direction_follows_rotation() {
        let mut scene = Scene::new();
        scene
            .add_light(
                scene.root(),
                "sun",
                Light::directional(Vec3::ONE),
                Transform::default().with_rotation(Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2)),
            )
            .unwrap();
        let result = SceneWalker::new(&scene).walk();
        assert!((result.lights[0].direction - Vec3::NEG_Y).length() < 1e-5);
    }

    #[test]
    fn test_walk_order_follows_children() {
        let mut scene = Scene::new();
        let a = scene
            .add_geometry(scene.root(), "a", geometry(), Transform::default())
            .unwrap();
        let b = scene
            .add_geometry(scene.root(), "b", geometry(), Transform::default())
            .unwrap();
        let nodes: Vec<_> = SceneWalker::new(&scene).walk().draws.iter().map(|d| d.node).collect();
        assert_eq!(nodes, vec![a, b]);
    }
}
