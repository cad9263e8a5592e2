//! Scene management
//!
//! The scene is an arena of nodes forming a single tree under a root group.
//! Nodes carry a local transform and one `NodeKind`; world transforms,
//! light lists and draw lists are produced each frame by the `walker`.

mod camera;
mod light;
mod transform;
pub mod walker;

pub use camera::*;
pub use light::*;
pub use transform::*;
pub use walker::{DrawItem, ProbeItem, SceneWalker, WalkResult};

use crate::error::{RenderError, RenderResult};
use crate::resources::{MaterialId, MeshId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// Renders the scene around a node into a cube map that the node's own
/// materials can reflect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReflectionProbe {
    pub resolution: u32,
}

/// Drawable content of a node: one draw per `(mesh, material)` part
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryNode {
    pub parts: Vec<(MeshId, MaterialId)>,
    pub probe: Option<ReflectionProbe>,
}

impl GeometryNode {
    pub fn new(mesh: MeshId, material: MaterialId) -> Self {
        Self {
            parts: vec![(mesh, material)],
            probe: None,
        }
    }

    pub fn with_part(mut self, mesh: MeshId, material: MaterialId) -> Self {
        self.parts.push((mesh, material));
        self
    }

    pub fn with_probe(mut self, resolution: u32) -> Self {
        self.probe = Some(ReflectionProbe { resolution });
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Group,
    Geometry(GeometryNode),
    Light(Light),
}

impl NodeKind {
    pub fn as_drawable(&self) -> Option<&GeometryNode> {
        match self {
            NodeKind::Geometry(geometry) => Some(geometry),
            _ => None,
        }
    }

    pub fn as_light(&self) -> Option<&Light> {
        match self {
            NodeKind::Light(light) => Some(light),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: String,
    /// Hidden nodes hide their whole subtree
    pub visible: bool,
    pub transform: Transform,
    pub kind: NodeKind,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl SceneNode {
    pub fn new(name: &str, kind: NodeKind) -> Self {
        Self {
            name: name.to_string(),
            visible: true,
            transform: Transform::default(),
            kind,
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

/// The scene containing all renderable content
#[derive(Debug, Clone)]
pub struct Scene {
    pub camera: Camera,
    nodes: Vec<SceneNode>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            camera: Camera::default(),
            nodes: vec![SceneNode::new("root", NodeKind::Group)],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    fn unknown(id: NodeId) -> RenderError {
        RenderError::UnknownAsset {
            kind: "node",
            id: id.0,
        }
    }

    /// Attach `node` as the last child of `parent`
    pub fn add_node(&mut self, parent: NodeId, mut node: SceneNode) -> RenderResult<NodeId> {
        if parent.0 >= self.nodes.len() {
            return Err(Self::unknown(parent));
        }
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        node.children.clear();
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    pub fn add_group(&mut self, parent: NodeId, name: &str, transform: Transform) -> RenderResult<NodeId> {
        self.add_node(
            parent,
            SceneNode::new(name, NodeKind::Group).with_transform(transform),
        )
    }

    pub fn add_geometry(
        &mut self,
        parent: NodeId,
        name: &str,
        geometry: GeometryNode,
        transform: Transform,
    ) -> RenderResult<NodeId> {
        self.add_node(
            parent,
            SceneNode::new(name, NodeKind::Geometry(geometry)).with_transform(transform),
        )
    }

    pub fn add_light(
        &mut self,
        parent: NodeId,
        name: &str,
        light: Light,
        transform: Transform,
    ) -> RenderResult<NodeId> {
        self.add_node(
            parent,
            SceneNode::new(name, NodeKind::Light(light)).with_transform(transform),
        )
    }

    pub fn node(&self, id: NodeId) -> RenderResult<&SceneNode> {
        self.nodes.get(id.0).ok_or(Self::unknown(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> RenderResult<&mut SceneNode> {
        self.nodes.get_mut(id.0).ok_or(Self::unknown(id))
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) -> RenderResult<()> {
        self.node_mut(id)?.visible = visible;
        Ok(())
    }

    pub fn set_transform(&mut self, id: NodeId, transform: Transform) -> RenderResult<()> {
        self.node_mut(id)?.transform = transform;
        Ok(())
    }

    /// First node with the given name, in insertion order
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nodes_link_to_their_parent() {
        let mut scene = Scene::new();
        let group = scene
            .add_group(scene.root(), "group", Transform::default())
            .unwrap();
        let light = scene
            .add_light(group, "lamp", Light::point(glam::Vec3::ONE), Transform::default())
            .unwrap();

        assert_eq!(scene.node(group).unwrap().children(), &[light]);
        assert_eq!(scene.node(light).unwrap().parent(), Some(group));
        assert!(scene.node(light).unwrap().kind.as_light().is_some());
        assert!(scene.node(light).unwrap().kind.as_drawable().is_none());
        assert_eq!(scene.find("lamp"), Some(light));
    }

    #[test]
    fn test_unknown_parent_is_rejected() {
        let mut scene = Scene::new();
        let err = scene
            .add_group(NodeId(7), "orphan", Transform::default())
            .unwrap_err();
        assert_eq!(err, RenderError::UnknownAsset { kind: "node", id: 7 });
    }
}
