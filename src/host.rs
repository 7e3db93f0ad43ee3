//! Access to the mutable state of the host application.
//!
//! The exporter reads a `Scene` snapshot, but a few things (shape-key blends,
//! the current frame, the active action and bone pose of armatures) have to
//! be changed on the host, sampled, and put back. All of that goes through
//! `SceneHost`, and every change is made through one of the guards below,
//! which put the old state back when they are dropped, whichever way the
//! scope is left.

use cgmath::{Matrix4, One};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use crate::scene::{ActionId, CurveTarget, Mesh, MeshId, NodeId, Payload, Scene, TransformProp};

pub trait SceneHost {
    fn shape_key_values(&self, mesh: MeshId) -> Vec<f32>;
    fn set_shape_key_values(&mut self, mesh: MeshId, values: &[f32]);

    /// The node's mesh as it currently looks, ie. with the current shape-key
    /// blend and, if asked, the modifier stack applied.
    fn evaluate_mesh(&self, node: NodeId, apply_modifiers: bool) -> Option<Mesh>;

    fn frame(&self) -> i32;
    fn set_frame(&mut self, frame: i32);

    /// Local-to-parent matrix of a node at the current frame.
    fn local_matrix(&self, node: NodeId) -> Matrix4<f64>;

    fn active_action(&self, node: NodeId) -> Option<ActionId>;
    fn set_active_action(&mut self, node: NodeId, action: Option<ActionId>);

    /// Pose-space transforms of an armature's bones, one per bone.
    fn bone_pose(&self, node: NodeId) -> Vec<Matrix4<f64>>;
    fn set_bone_pose(&mut self, node: NodeId, pose: &[Matrix4<f64>]);
}


/// Saves a mesh's shape-key values and restores them on drop.
pub struct ShapeKeyGuard<'h, H: SceneHost + ?Sized + 'h> {
    host: &'h mut H,
    mesh: MeshId,
    saved: Vec<f32>,
}

impl<'h, H: SceneHost + ?Sized> ShapeKeyGuard<'h, H> {
    pub fn new(host: &'h mut H, mesh: MeshId) -> ShapeKeyGuard<'h, H> {
        let saved = host.shape_key_values(mesh);
        ShapeKeyGuard { host, mesh, saved }
    }

    pub fn num_keys(&self) -> usize {
        self.saved.len()
    }

    /// Every key at 0.
    pub fn rest(&mut self) {
        let values = vec![0.0; self.saved.len()];
        self.host.set_shape_key_values(self.mesh, &values);
    }

    /// Key `k` at 1, every other key at 0.
    pub fn activate(&mut self, k: usize) {
        let mut values = vec![0.0; self.saved.len()];
        if k < values.len() {
            values[k] = 1.0;
        }
        self.host.set_shape_key_values(self.mesh, &values);
    }
}

impl<'h, H: SceneHost + ?Sized> Deref for ShapeKeyGuard<'h, H> {
    type Target = H;
    fn deref(&self) -> &H { self.host }
}

impl<'h, H: SceneHost + ?Sized> DerefMut for ShapeKeyGuard<'h, H> {
    fn deref_mut(&mut self) -> &mut H { self.host }
}

impl<'h, H: SceneHost + ?Sized> Drop for ShapeKeyGuard<'h, H> {
    fn drop(&mut self) {
        self.host.set_shape_key_values(self.mesh, &self.saved);
    }
}


/// Saves the current frame and restores it on drop.
pub struct FrameGuard<'h, H: SceneHost + ?Sized + 'h> {
    host: &'h mut H,
    saved: i32,
}

impl<'h, H: SceneHost + ?Sized> FrameGuard<'h, H> {
    pub fn new(host: &'h mut H) -> FrameGuard<'h, H> {
        let saved = host.frame();
        FrameGuard { host, saved }
    }
}

impl<'h, H: SceneHost + ?Sized> Deref for FrameGuard<'h, H> {
    type Target = H;
    fn deref(&self) -> &H { self.host }
}

impl<'h, H: SceneHost + ?Sized> DerefMut for FrameGuard<'h, H> {
    fn deref_mut(&mut self) -> &mut H { self.host }
}

impl<'h, H: SceneHost + ?Sized> Drop for FrameGuard<'h, H> {
    fn drop(&mut self) {
        self.host.set_frame(self.saved);
    }
}


/// Saves the active action and bone pose of some armature nodes and
/// restores both on drop.
pub struct ActionGuard<'h, H: SceneHost + ?Sized + 'h> {
    host: &'h mut H,
    saved: Vec<(NodeId, Option<ActionId>, Vec<Matrix4<f64>>)>,
}

impl<'h, H: SceneHost + ?Sized> ActionGuard<'h, H> {
    pub fn new(host: &'h mut H, nodes: &[NodeId]) -> ActionGuard<'h, H> {
        let saved = nodes.iter()
            .map(|&node| (node, host.active_action(node), host.bone_pose(node)))
            .collect();
        ActionGuard { host, saved }
    }

    /// Binds `action` to `node` and puts every bone back at rest.
    pub fn bind(&mut self, node: NodeId, action: ActionId) {
        self.host.set_active_action(node, Some(action));
        let rest = vec![Matrix4::one(); self.host.bone_pose(node).len()];
        self.host.set_bone_pose(node, &rest);
    }
}

impl<'h, H: SceneHost + ?Sized> Deref for ActionGuard<'h, H> {
    type Target = H;
    fn deref(&self) -> &H { self.host }
}

impl<'h, H: SceneHost + ?Sized> DerefMut for ActionGuard<'h, H> {
    fn deref_mut(&mut self) -> &mut H { self.host }
}

impl<'h, H: SceneHost + ?Sized> Drop for ActionGuard<'h, H> {
    fn drop(&mut self) {
        for (node, action, pose) in self.saved.drain(..) {
            self.host.set_active_action(node, action);
            self.host.set_bone_pose(node, &pose);
        }
    }
}


/// A `SceneHost` over a plain `Scene`.
///
/// Shape keys are blended relative to the basis, object transforms are
/// driven by the linear evaluation of their action's f-curves, and any state
/// the exporter sets is kept in override tables.
pub struct SnapshotHost<'a> {
    scene: &'a Scene,
    frame: i32,
    shape_keys: HashMap<MeshId, Vec<f32>>,
    actions: HashMap<NodeId, Option<ActionId>>,
    poses: HashMap<NodeId, Vec<Matrix4<f64>>>,
}

impl<'a> SnapshotHost<'a> {
    pub fn new(scene: &'a Scene) -> SnapshotHost<'a> {
        SnapshotHost {
            scene,
            frame: scene.frame_current,
            shape_keys: HashMap::new(),
            actions: HashMap::new(),
            poses: HashMap::new(),
        }
    }
}

impl<'a> SceneHost for SnapshotHost<'a> {
    fn shape_key_values(&self, mesh: MeshId) -> Vec<f32> {
        match self.shape_keys.get(&mesh) {
            Some(values) => values.clone(),
            None => self.scene.meshes[mesh].shape_keys.iter().map(|k| k.value).collect(),
        }
    }

    fn set_shape_key_values(&mut self, mesh: MeshId, values: &[f32]) {
        self.shape_keys.insert(mesh, values.to_vec());
    }

    fn evaluate_mesh(&self, node: NodeId, apply_modifiers: bool) -> Option<Mesh> {
        let (base, evaluated) = match self.scene.nodes[node].payload {
            Payload::Mesh { mesh, evaluated } => (mesh, evaluated),
            _ => return None,
        };
        let id = match evaluated {
            Some(ev) if apply_modifiers => ev,
            _ => base,
        };
        let mut mesh = self.scene.meshes[id].clone();

        let keys = &self.scene.meshes[base].shape_keys;
        if keys.len() > 1 && keys.iter().all(|k| k.positions.len() == mesh.vertices.len()) {
            let values = self.shape_key_values(base);
            let basis = &keys[0].positions;
            for (i, v) in mesh.vertices.iter_mut().enumerate() {
                let mut co = basis[i];
                for (k, key) in keys.iter().enumerate().skip(1) {
                    let value = values.get(k).cloned().unwrap_or(0.0) as f64;
                    if value != 0.0 {
                        co += (key.positions[i] - basis[i]) * value;
                    }
                }
                v.co = co;
            }
        }

        Some(mesh)
    }

    fn frame(&self) -> i32 {
        self.frame
    }

    fn set_frame(&mut self, frame: i32) {
        self.frame = frame;
    }

    fn local_matrix(&self, node: NodeId) -> Matrix4<f64> {
        let mut xform = self.scene.nodes[node].transform;
        if let Some(action) = self.active_action(node) {
            let frame = self.frame as f64;
            for fc in &self.scene.actions[action].fcurves {
                let (prop, axis) = match fc.target {
                    CurveTarget::Object(prop, axis) => (prop, axis),
                    CurveTarget::Bone(..) => continue,
                };
                let value = match fc.evaluate(frame) {
                    Some(v) => v,
                    None => continue,
                };
                let i = axis.index();
                match prop {
                    TransformProp::Location => xform.location[i] = value,
                    TransformProp::Rotation => xform.rotation[i] = value,
                    TransformProp::Scale => xform.scale[i] = value,
                }
            }
        }
        xform.to_matrix()
    }

    fn active_action(&self, node: NodeId) -> Option<ActionId> {
        match self.actions.get(&node) {
            Some(&action) => action,
            None => self.scene.nodes[node].animation.as_ref().and_then(|a| a.action),
        }
    }

    fn set_active_action(&mut self, node: NodeId, action: Option<ActionId>) {
        self.actions.insert(node, action);
    }

    fn bone_pose(&self, node: NodeId) -> Vec<Matrix4<f64>> {
        if let Some(pose) = self.poses.get(&node) {
            return pose.clone();
        }
        match self.scene.nodes[node].payload {
            Payload::Armature(arm) => vec![Matrix4::one(); self.scene.armatures[arm].bones.len()],
            _ => vec![],
        }
    }

    fn set_bone_pose(&mut self, node: NodeId, pose: &[Matrix4<f64>]) {
        self.poses.insert(node, pose.to_vec());
    }
}


#[cfg(test)]
fn keyed_scene() -> Scene {
    use cgmath::{Point3, vec3};
    use crate::scene::{MeshVertex, Node, ShapeKey};

    let mut scene = Scene::new("Scene");
    let mut mesh = Mesh::new("Blob");
    mesh.vertices.push(MeshVertex { co: Point3::new(0.0, 0.0, 0.0), groups: vec![] });
    mesh.add_polygon(&[0, 0, 0], vec3(0.0, 0.0, 1.0), 0);
    mesh.shape_keys.push(ShapeKey {
        name: "Basis".to_string(),
        positions: vec![Point3::new(0.0, 0.0, 0.0)],
        value: 0.0,
    });
    mesh.shape_keys.push(ShapeKey {
        name: "Up".to_string(),
        positions: vec![Point3::new(0.0, 0.0, 2.0)],
        value: 0.25,
    });
    let mesh = scene.add_mesh(mesh);
    let mut node = Node::new("Blob");
    node.payload = Payload::Mesh { mesh, evaluated: None };
    scene.add_node(node, None);
    scene
}

#[test]
fn test_shape_key_blend() {
    let scene = keyed_scene();
    let mut host = SnapshotHost::new(&scene);
    assert_eq!(host.evaluate_mesh(0, true).unwrap().vertices[0].co.z, 0.5);
    host.set_shape_key_values(0, &[0.0, 1.0]);
    assert_eq!(host.evaluate_mesh(0, true).unwrap().vertices[0].co.z, 2.0);
}

#[test]
fn test_shape_key_guard_restores() {
    let scene = keyed_scene();
    let mut host = SnapshotHost::new(&scene);
    {
        let mut guard = ShapeKeyGuard::new(&mut host, 0);
        guard.activate(1);
        assert_eq!(guard.shape_key_values(0), vec![0.0, 1.0]);
        guard.rest();
        assert_eq!(guard.evaluate_mesh(0, true).unwrap().vertices[0].co.z, 0.0);
    }
    assert_eq!(host.shape_key_values(0), vec![0.0, 0.25]);
}

#[test]
fn test_shape_key_guard_restores_on_error() {
    use crate::errors::Result;

    fn fails_midway(host: &mut dyn SceneHost) -> Result<()> {
        let mut guard = ShapeKeyGuard::new(host, 0);
        guard.activate(1);
        check!(guard.num_keys() == 0)?;
        Ok(())
    }

    let scene = keyed_scene();
    let mut host = SnapshotHost::new(&scene);
    assert!(fails_midway(&mut host).is_err());
    assert_eq!(host.shape_key_values(0), vec![0.0, 0.25]);
}

#[test]
fn test_local_matrix_follows_action() {
    use cgmath::Vector4;
    use crate::scene::{Action, AnimationData, Axis, FCurve, Node};

    let mut scene = Scene::new("Scene");
    let mut action = Action::new("Slide", (0.0, 10.0));
    action.fcurves.push(FCurve {
        target: CurveTarget::Object(TransformProp::Location, Axis::X),
        keyframes: vec![(0.0, 0.0), (10.0, 5.0)],
    });
    let action = scene.add_action(action);
    let mut node = Node::new("Mover");
    node.animation = Some(AnimationData { action: Some(action) });
    let node = scene.add_node(node, None);

    let mut host = SnapshotHost::new(&scene);
    {
        let mut guard = FrameGuard::new(&mut host);
        guard.set_frame(4);
        assert_eq!(guard.local_matrix(node).w, Vector4::new(2.0, 0.0, 0.0, 1.0));
    }
    assert_eq!(host.frame(), scene.frame_current);

    {
        let mut guard = ActionGuard::new(&mut host, &[node]);
        guard.set_active_action(node, None);
        assert_eq!(guard.active_action(node), None);
    }
    assert_eq!(host.active_action(node), Some(action));
}
