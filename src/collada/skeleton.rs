//! Armature -> joint <node>s.
//!
//! Joint matrices are parent-relative rest transforms; the inverse bind
//! matrices are taken in world space (through the armature object's
//! transform) so a skin can use them with its bind shape matrix directly.

use std::collections::HashMap;
use crate::scene::{Armature, ArmatureId, BoneId, NodeId};
use crate::util::math::invert;
use super::{Ctx, SkinInfo};
use super::xml::Xml;

/// Writes the joint hierarchy of the armature object `node` into `xml` and
/// records its `SkinInfo` for skins bound to it.
pub(super) fn export_skeleton(ctx: &mut Ctx, xml: &mut Xml, node: NodeId, armature: ArmatureId) {
    let scene = ctx.scene;
    let arm = &scene.armatures[armature];

    let mut info = SkinInfo {
        id: ctx.namer.new_id("skelbones"),
        bone_index: HashMap::new(),
        bone_names: vec![],
        bind_poses: vec![],
        skeleton_nodes: vec![],
        armature_xform: scene.world_matrix(node),
    };

    for root in arm.roots() {
        export_bone(ctx, xml, arm, root, &mut info);
    }

    for &action in &arm.constraint_actions {
        if !ctx.constraint_actions.contains(&action) {
            ctx.constraint_actions.push(action);
        }
    }

    debug!("armature {}: {} joints", arm.name, info.bone_names.len());
    ctx.skeleton_info.insert(node, info);
    ctx.skeletons.push(node);
}

fn export_bone(ctx: &mut Ctx, xml: &mut Xml, arm: &Armature, bone_id: BoneId, info: &mut SkinInfo) {
    let bone = &arm.bones[bone_id];
    // Control rig, not deforming
    if ctx.config.is_control_bone(&bone.name) {
        return;
    }

    let idx = info.bone_names.len();
    let boneid = ctx.namer.new_id("bone");
    let sid = format!("{}-{}", info.id, idx);
    info.bone_index.insert(bone.name.clone(), idx);
    info.bone_names.push(sid.clone());
    info.bind_poses.push(invert(&(info.armature_xform * bone.matrix_local)));

    let matrix = match bone.parent {
        Some(parent) => invert(&arm.bones[parent].matrix_local) * bone.matrix_local,
        None => {
            info.skeleton_nodes.push(boneid.clone());
            bone.matrix_local
        }
    };

    xml!(xml;
        <node id=[(boneid)] sid=[(sid)] name=[ESC(&bone.name)] type=["JOINT"]>;
            <matrix sid=["transform"]>MATRIX(&matrix)</matrix>;
    );
    for &child in &bone.children {
        export_bone(ctx, xml, arm, child, info);
    }
    xml!(xml;
        /node>;
    );
}


#[cfg(test)]
pub(super) fn rigged_scene() -> crate::scene::Scene {
    use cgmath::{Matrix4, vec3};
    use crate::scene::{Node, Payload, Scene, Transform};

    let mut scene = Scene::new("Scene");
    let mut arm = Armature::new("Rig");
    let root = arm.add_bone("Root", None, Matrix4::from_translation(vec3(0.0, 0.0, 1.0)));
    arm.add_bone("Tip", Some(root), Matrix4::from_translation(vec3(0.0, 0.0, 3.0)));
    let ik = arm.add_bone("ctrl_IK", Some(root), Matrix4::from_translation(vec3(1.0, 0.0, 0.0)));
    arm.add_bone("ctrl_Pole", Some(ik), Matrix4::from_translation(vec3(2.0, 0.0, 0.0)));
    let arm = scene.add_armature(arm);

    let mut rig = Node::new("Rig");
    rig.payload = Payload::Armature(arm);
    rig.transform = Transform::from_location(vec3(5.0, 0.0, 0.0));
    scene.add_node(rig, None);
    scene
}

#[test]
fn test_skeleton_joints() {
    use cgmath::{Matrix4, SquareMatrix, vec3};
    use std::path::Path;

    let scene = rigged_scene();
    let config = Default::default();
    let mut ctx = Ctx::new(&scene, &config, Path::new("out.dae"));
    let mut xml = Xml::with_indent(3);
    export_skeleton(&mut ctx, &mut xml, 0, 0);
    let xml = xml.string();

    let info = &ctx.skeleton_info[&0];
    assert_eq!(info.id, "id-skelbones-2");
    assert_eq!(info.bone_names, vec!["id-skelbones-2-0", "id-skelbones-2-1"]);
    assert_eq!(info.bone_index["Tip"], 1);
    assert_eq!(info.skeleton_nodes, vec!["id-bone-3"]);
    assert_eq!(ctx.skeletons, vec![0]);

    // Control bones and their children are left out
    assert!(!xml.contains("ctrl_"));
    assert_eq!(xml.matches("type=\"JOINT\"").count(), 2);

    assert!(xml.contains("<matrix sid=\"transform\">"));

    // Bind poses undo the armature's world offset too
    let tip_world = Matrix4::from_translation(vec3(5.0, 0.0, 3.0));
    let root_world = Matrix4::from_translation(vec3(5.0, 0.0, 1.0));
    assert!((info.bind_poses[0] * root_world).is_identity());
    assert!((info.bind_poses[1] * tip_world).is_identity());
}
