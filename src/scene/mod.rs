//! In-memory snapshot of a host scene.
//!
//! The exporter never looks at a live host; whoever calls it builds a `Scene`
//! (objects, meshes, materials, armatures, actions...) and hands it over
//! together with a `SceneHost` for the few things that need the host to
//! temporarily change state.
//!
//! Everything is stored in flat arrays and referenced by index. Nodes form a
//! forest; each node knows its parent and its children.

mod anim;
mod armature;
mod material;
mod mesh;
mod objects;

pub use self::anim::{Action, AnimationData, Axis, FCurve, CurveTarget, TransformProp};
pub use self::armature::{Armature, Bone, BoneId};
pub use self::material::{Image, Material, Texture, TextureKind, TextureSlot};
pub use self::mesh::{ColorLayer, Loop, Mesh, MeshVertex, Polygon, ShapeKey, Tangent, UvLayer, VertexGroupWeight};
pub use self::objects::{BezierPoint, Camera, CameraKind, Curve, CurvePoint, Lamp, LampKind, NavLight, Spline};

use cgmath::{Matrix4, Vector3, vec3};
use std::collections::BTreeMap;
use crate::util::math::euler_to_matrix;

pub type NodeId = usize;
pub type MeshId = usize;
pub type MaterialId = usize;
pub type TextureId = usize;
pub type ImageId = usize;
pub type ArmatureId = usize;
pub type CameraId = usize;
pub type LampId = usize;
pub type CurveId = usize;
pub type ActionId = usize;

/// Location, XYZ Euler rotation (radians) and scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub location: Vector3<f64>,
    pub rotation: Vector3<f64>,
    pub scale: Vector3<f64>,
}

impl Default for Transform {
    fn default() -> Transform {
        Transform {
            location: vec3(0.0, 0.0, 0.0),
            rotation: vec3(0.0, 0.0, 0.0),
            scale: vec3(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    pub fn from_location(location: Vector3<f64>) -> Transform {
        Transform { location, ..Default::default() }
    }

    pub fn to_matrix(&self) -> Matrix4<f64> {
        Matrix4::from_translation(self.location) *
            euler_to_matrix(self.rotation) *
            Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }
}

/// What kind of object a node is, and the data it instances.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    Mesh {
        mesh: MeshId,
        /// Mesh with the object's modifier stack applied, if it has one.
        evaluated: Option<MeshId>,
    },
    Camera(CameraId),
    Lamp(LampId),
    Armature(ArmatureId),
    Curve(CurveId),
}

/// Object type filter for exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Empty,
    Camera,
    Lamp,
    Armature,
    Mesh,
    Curve,
}

impl ObjectType {
    pub const ALL: [ObjectType; 6] = [
        ObjectType::Empty,
        ObjectType::Camera,
        ObjectType::Lamp,
        ObjectType::Armature,
        ObjectType::Mesh,
        ObjectType::Curve,
    ];
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub transform: Transform,
    pub payload: Payload,
    /// Bitmask of the (20) layers the object is on.
    pub layers: u32,
    pub selected: bool,
    /// Names of the object's vertex groups, indexed by group index.
    pub vertex_groups: Vec<String>,
    /// String custom properties (eg. `Fam`, `Link`, `Speed`, `Flags`).
    pub props: BTreeMap<String, String>,
    pub empty_display_size: f64,
    pub animation: Option<AnimationData>,
}

impl Node {
    pub fn new(name: &str) -> Node {
        Node {
            name: name.to_string(),
            parent: None,
            children: vec![],
            transform: Transform::default(),
            payload: Payload::Empty,
            layers: 1,
            selected: false,
            vertex_groups: vec![],
            props: BTreeMap::new(),
            empty_display_size: 1.0,
            animation: None,
        }
    }

    pub fn object_type(&self) -> ObjectType {
        match self.payload {
            Payload::Empty => ObjectType::Empty,
            Payload::Mesh { .. } => ObjectType::Mesh,
            Payload::Camera(_) => ObjectType::Camera,
            Payload::Lamp(_) => ObjectType::Lamp,
            Payload::Armature(_) => ObjectType::Armature,
            Payload::Curve(_) => ObjectType::Curve,
        }
    }

    pub fn prop(&self, key: &str) -> Option<&str> {
        self.props.get(key).map(|s| s.as_str())
    }
}

pub struct Scene {
    pub name: String,
    pub nodes: Vec<Node>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub textures: Vec<Texture>,
    pub images: Vec<Image>,
    pub armatures: Vec<Armature>,
    pub cameras: Vec<Camera>,
    pub lamps: Vec<Lamp>,
    pub curves: Vec<Curve>,
    pub actions: Vec<Action>,

    /// World ambient color.
    pub ambient_color: [f64; 3],
    pub fps: f64,
    pub frame_current: i32,
    /// Render resolution, used for camera aspect ratios.
    pub resolution: (u32, u32),
    /// Bitmask of the active layers.
    pub layers: u32,
}

impl Scene {
    pub fn new(name: &str) -> Scene {
        Scene {
            name: name.to_string(),
            nodes: vec![],
            meshes: vec![],
            materials: vec![],
            textures: vec![],
            images: vec![],
            armatures: vec![],
            cameras: vec![],
            lamps: vec![],
            curves: vec![],
            actions: vec![],
            ambient_color: [0.0, 0.0, 0.0],
            fps: 30.0,
            frame_current: 1,
            resolution: (1920, 1080),
            layers: 1,
        }
    }

    /// Adds a node, linking it under `parent`.
    pub fn add_node(&mut self, node: Node, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        let mut node = node;
        node.parent = parent;
        node.children.clear();
        self.nodes.push(node);
        if let Some(p) = parent {
            self.nodes[p].children.push(id);
        }
        id
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.push(material);
        self.materials.len() - 1
    }

    pub fn add_armature(&mut self, armature: Armature) -> ArmatureId {
        self.armatures.push(armature);
        self.armatures.len() - 1
    }

    pub fn add_action(&mut self, action: Action) -> ActionId {
        self.actions.push(action);
        self.actions.len() - 1
    }

    /// Parentless nodes, in scene order.
    pub fn roots<'a>(&'a self) -> impl Iterator<Item = NodeId> + 'a {
        self.nodes.iter()
            .enumerate()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(id, _)| id)
    }

    /// Local-to-world matrix of a node at rest.
    pub fn world_matrix(&self, node: NodeId) -> Matrix4<f64> {
        let mut m = self.nodes[node].transform.to_matrix();
        let mut cur = self.nodes[node].parent;
        while let Some(p) = cur {
            m = self.nodes[p].transform.to_matrix() * m;
            cur = self.nodes[p].parent;
        }
        m
    }

    /// The armature object a mesh object is parented to, if any.
    pub fn parent_armature(&self, node: NodeId) -> Option<(NodeId, ArmatureId)> {
        let parent = self.nodes[node].parent?;
        match self.nodes[parent].payload {
            Payload::Armature(armature) => Some((parent, armature)),
            _ => None,
        }
    }
}

#[test]
fn test_add_node_links_both_ways() {
    let mut scene = Scene::new("Scene");
    let a = scene.add_node(Node::new("A"), None);
    let b = scene.add_node(Node::new("B"), Some(a));
    let c = scene.add_node(Node::new("C"), None);
    assert_eq!(scene.nodes[b].parent, Some(a));
    assert_eq!(scene.nodes[a].children, vec![b]);
    assert_eq!(scene.roots().collect::<Vec<_>>(), vec![a, c]);
}

#[test]
fn test_world_matrix_composes_parents() {
    use cgmath::{SquareMatrix, Vector4};

    let mut scene = Scene::new("Scene");
    let mut a = Node::new("A");
    a.transform = Transform::from_location(vec3(1.0, 0.0, 0.0));
    let a = scene.add_node(a, None);
    let mut b = Node::new("B");
    b.transform = Transform::from_location(vec3(0.0, 2.0, 0.0));
    let b = scene.add_node(b, Some(a));

    let w = scene.world_matrix(b);
    assert_eq!(w.w, Vector4::new(1.0, 2.0, 0.0, 1.0));
    assert!(w.is_invertible());
}
