//! Baked transform animations and animation clips.
//!
//! Every animated node gets an `<animation id="<node>-anim">` with six
//! single-component child animations, one per `translate.X/Y/Z` and
//! `rotateX/Y/Z.ANGLE` channel of the node's transform elements.

use cgmath::Matrix4;
use crate::host::{ActionGuard, FrameGuard, SceneHost};
use crate::scene::{ActionId, NodeId, Payload};
use crate::util::math::{to_euler_degrees, to_translation};
use super::Ctx;
use super::sections::Section;
use super::xml::Xml;

/// (time in seconds, local matrix)
pub type Sample = (f64, Matrix4<f64>);

/// Samples the local matrix of `node` at every frame in `frames`, both ends
/// included. The host's current frame is restored afterwards.
pub fn bake(host: &mut dyn SceneHost, node: NodeId, frames: (f64, f64), fps: f64) -> Vec<Sample> {
    let start = frames.0.round() as i32;
    let end = frames.1.round() as i32;

    let mut guard = FrameGuard::new(host);
    let mut samples = Vec::with_capacity((end - start + 1).max(0) as usize);
    for frame in start..=end {
        guard.set_frame(frame);
        samples.push((frame as f64 / fps, guard.local_matrix(node)));
    }
    samples
}

pub(super) fn export_animations(ctx: &mut Ctx, host: &mut dyn SceneHost) {
    if ctx.config.all_actions && !ctx.skeletons.is_empty() {
        export_all_actions(ctx, host);
    } else {
        let n = export_active(ctx, host, None).len();
        debug!("exported {} animated nodes", n);
    }
}

/// Bakes every exported node (or just `only`) with an active action.
/// Returns the IDs of the written animations.
fn export_active(ctx: &mut Ctx, host: &mut dyn SceneHost, only: Option<&[NodeId]>) -> Vec<String> {
    let scene = ctx.scene;

    let mut nodes: Vec<(NodeId, String)> = ctx.node_ids.iter()
        .filter(|&(node, _)| only.map(|o| o.contains(node)).unwrap_or(true))
        .map(|(&node, id)| (node, id.clone()))
        .collect();
    nodes.sort();

    let mut ids = vec![];
    for (node, target) in nodes {
        let action = match host.active_action(node) {
            Some(action) => action,
            None => continue,
        };
        let samples = bake(host, node, scene.actions[action].frame_range, scene.fps);
        if samples.is_empty() {
            continue;
        }
        ids.push(write_animation(ctx, &target, &samples));
    }
    ids
}

/// Exports each eligible action in turn as an <animation_clip>. The action is
/// bound to every armature with animation data, but only the armatures with
/// a bone it keys are baked into the clip.
fn export_all_actions(ctx: &mut Ctx, host: &mut dyn SceneHost) {
    let scene = ctx.scene;
    let armatures: Vec<NodeId> = ctx.skeletons.iter()
        .cloned()
        .filter(|&node| scene.nodes[node].animation.is_some())
        .collect();

    let mut guard = ActionGuard::new(host, &armatures);
    for (action_id, action) in scene.actions.iter().enumerate() {
        if !wants_action(ctx, action_id) {
            debug!("skipping action {}", action.name);
            continue;
        }

        for &arm in &armatures {
            guard.bind(arm, action_id);
        }
        let bones = action.bone_names();
        let keyed: Vec<NodeId> = armatures.iter()
            .cloned()
            .filter(|&node| match scene.nodes[node].payload {
                Payload::Armature(arm) => {
                    bones.iter().any(|name| scene.armatures[arm].find_bone(name).is_some())
                }
                _ => false,
            })
            .collect();
        trace!("action {}: keys {} of {} armatures", action.name, keyed.len(), armatures.len());
        let ids = export_active(ctx, &mut *guard, Some(&keyed[..]));

        let (start, end) = action.frame_range;
        let mut xml = Section::AnimationClips.buffer();
        xml!(xml;
            <animation_clip name=[ESC(&action.name)] start=[(start / scene.fps)] end=[(end / scene.fps)]>;
                for id in (&ids) {
                    <instance_animation url=["#"(id)]/>;
                }
            /animation_clip>;
        );
        ctx.sections.push(Section::AnimationClips, &xml);
    }
}

fn wants_action(ctx: &Ctx, action_id: ActionId) -> bool {
    let action = &ctx.scene.actions[action_id];
    action.users != 0 &&
        !ctx.constraint_actions.contains(&action_id) &&
        !ctx.config.skips_action(&action.name)
}

/// The six channels a node transform is animated through, with the name of
/// their output param.
const CHANNELS: [(&str, &str); 6] = [
    ("translate.X", "X"),
    ("translate.Y", "Y"),
    ("translate.Z", "Z"),
    ("rotateX.ANGLE", "ANGLE"),
    ("rotateY.ANGLE", "ANGLE"),
    ("rotateZ.ANGLE", "ANGLE"),
];

/// IDs written under each channel's sampler ID.
static CHANNEL_PARTS: [&str; 7] = [
    "", "-input", "-input-array", "-output", "-output-array",
    "-interpolation", "-interpolation-array",
];

/// Value of channel `i` of `CHANNELS` for a local matrix.
fn component(m: &Matrix4<f64>, i: usize) -> f64 {
    if i < 3 {
        to_translation(m)[i]
    } else {
        to_euler_degrees(m)[i - 3]
    }
}

fn write_animation(ctx: &mut Ctx, target: &str, samples: &[Sample]) -> String {
    let mut suffixes: Vec<String> = vec![];
    for &(channel, _) in CHANNELS.iter() {
        for part in &CHANNEL_PARTS {
            suffixes.push(format!("-{}{}", channel, part));
        }
    }
    let suffixes: Vec<&str> = suffixes.iter().map(|s| s.as_str()).collect();
    let animid = ctx.namer.get_fresh_name_with(format!("{}-anim", target), &suffixes);

    let mut xml = Section::Animations.buffer();
    xml!(xml;
        <animation id=[(animid)] name=[ESC(target)]>;
    );
    for (i, &(channel, param)) in CHANNELS.iter().enumerate() {
        let keys: Vec<(f64, f64)> = samples.iter()
            .map(|&(time, ref m)| (time, component(m, i)))
            .collect();
        let keys = if ctx.config.optimize_keyframes {
            optimize(&keys, ctx.config.keyframe_epsilon())
        } else {
            keys
        };
        let pre = format!("{}-{}", animid, channel);
        write_channel(&mut xml, &pre, target, channel, param, &keys);
    }
    xml!(xml;
        /animation>;
    );
    ctx.sections.push(Section::Animations, &xml);

    animid
}

fn write_channel(xml: &mut Xml, pre: &str, target: &str, channel: &str, param: &str, keys: &[(f64, f64)]) {
    let n = keys.len();
    xml!(xml;
        <animation>;
            <source id=[(pre)"-input"]>;
                <float_array id=[(pre)"-input-array"] count=[(n)]>
                for &(time, _) in (keys) {
                    (time)" "
                }
                </float_array>;
                <technique_common>;
                    <accessor source=["#"(pre)"-input-array"] count=[(n)] stride=["1"]>;
                        <param name=["TIME"] type=["float"]/>;
                    /accessor>;
                /technique_common>;
            /source>;
            <source id=[(pre)"-output"]>;
                <float_array id=[(pre)"-output-array"] count=[(n)]>
                for &(_, value) in (keys) {
                    (value)" "
                }
                </float_array>;
                <technique_common>;
                    <accessor source=["#"(pre)"-output-array"] count=[(n)] stride=["1"]>;
                        <param name=[(param)] type=["float"]/>;
                    /accessor>;
                /technique_common>;
            /source>;
            <source id=[(pre)"-interpolation"]>;
                <Name_array id=[(pre)"-interpolation-array"] count=[(n)]>
                for _ in (0..n) {
                    "LINEAR "
                }
                </Name_array>;
                <technique_common>;
                    <accessor source=["#"(pre)"-interpolation-array"] count=[(n)] stride=["1"]>;
                        <param name=["INTERPOLATION"] type=["name"]/>;
                    /accessor>;
                /technique_common>;
            /source>;
            <sampler id=[(pre)]>;
                <input semantic=["INPUT"] source=["#"(pre)"-input"]/>;
                <input semantic=["OUTPUT"] source=["#"(pre)"-output"]/>;
                <input semantic=["INTERPOLATION"] source=["#"(pre)"-interpolation"]/>;
            /sampler>;
            <channel source=["#"(pre)] target=[(target)"/"(channel)]/>;
        /animation>;
    );
}

/// Drops interior keys whose value equals both neighbours' (within
/// `epsilon`). The first and last keys are always kept.
fn optimize(keys: &[(f64, f64)], epsilon: f64) -> Vec<(f64, f64)> {
    if keys.len() <= 2 {
        return keys.to_vec();
    }
    let mut out = Vec::with_capacity(keys.len());
    out.push(keys[0]);
    for w in keys.windows(3) {
        let (prev, cur, next) = (w[0].1, w[1].1, w[2].1);
        if (cur - prev).abs() <= epsilon && (cur - next).abs() <= epsilon {
            continue;
        }
        out.push(w[1]);
    }
    out.push(keys[keys.len() - 1]);
    out
}


#[cfg(test)]
fn animated_scene() -> crate::scene::Scene {
    use crate::scene::{Action, AnimationData, Axis, CurveTarget, FCurve, Node, Scene, TransformProp};

    let mut scene = Scene::new("Scene");
    let mut action = Action::new("Slide", (10.0, 13.0));
    action.fcurves.push(FCurve {
        target: CurveTarget::Object(TransformProp::Location, Axis::X),
        keyframes: vec![(10.0, 0.0), (13.0, 3.0)],
    });
    let action = scene.add_action(action);
    let mut node = Node::new("Mover");
    node.animation = Some(AnimationData { action: Some(action) });
    scene.add_node(node, None);
    scene
}

#[test]
fn test_bake_includes_end_frame() {
    use crate::host::SnapshotHost;

    let scene = animated_scene();
    let mut host = SnapshotHost::new(&scene);
    let samples = bake(&mut host, 0, (10.0, 13.0), 30.0);

    let times: Vec<f64> = samples.iter().map(|s| s.0).collect();
    assert_eq!(times, vec![10.0 / 30.0, 11.0 / 30.0, 12.0 / 30.0, 13.0 / 30.0]);
    assert_eq!(to_translation(&samples[2].1).x, 2.0);
    // Frame put back
    assert_eq!(host.frame(), scene.frame_current);
}

#[test]
fn test_optimize_keeps_changes() {
    let keys = vec![(0.0, 1.0), (1.0, 1.0), (2.0, 1.0), (3.0, 2.0), (4.0, 2.0)];
    assert_eq!(optimize(&keys, 1e-6), vec![(0.0, 1.0), (2.0, 1.0), (3.0, 2.0), (4.0, 2.0)]);
    assert_eq!(optimize(&keys[..2], 1e-6), keys[..2].to_vec());
}

#[test]
fn test_animation_channels() {
    use std::path::Path;
    use crate::host::SnapshotHost;

    let scene = animated_scene();
    let config = crate::config::ExportConfig {
        animate: true,
        optimize_keyframes: false,
        ..Default::default()
    };
    let mut ctx = Ctx::new(&scene, &config, Path::new("out.dae"));
    let mut host = SnapshotHost::new(&scene);
    ctx.node_ids.insert(0, "Mover".to_string());
    export_animations(&mut ctx, &mut host);

    let xml = ctx.sections.get(Section::Animations);
    assert!(xml.contains(r#"<animation id="Mover-anim" name="Mover">"#));
    assert_eq!(xml.matches("<channel ").count(), 6);
    assert!(xml.contains(r##"<channel source="#Mover-anim-translate.X" target="Mover/translate.X"/>"##));
    assert!(xml.contains(r##"<channel source="#Mover-anim-rotateZ.ANGLE" target="Mover/rotateZ.ANGLE"/>"##));
    assert!(xml.contains(r#"<float_array id="Mover-anim-translate.X-output-array" count="4">0 1 2 3 </float_array>"#));
    assert!(xml.contains(r#"<Name_array id="Mover-anim-translate.X-interpolation-array" count="4">LINEAR LINEAR LINEAR LINEAR </Name_array>"#));
    assert!(ctx.sections.is_empty(Section::AnimationClips));
}

#[test]
fn test_all_actions_clips() {
    use cgmath::{Matrix4, One};
    use std::path::Path;
    use crate::host::SnapshotHost;
    use crate::scene::{Action, AnimationData, Armature, Axis, CurveTarget, FCurve, Node, Scene, TransformProp};

    let bone_curve = |bone: &str| FCurve {
        target: CurveTarget::Bone(bone.to_string(), TransformProp::Rotation, Axis::Z),
        keyframes: vec![(0.0, 0.0), (30.0, 1.0)],
    };

    let mut scene = Scene::new("Scene");
    let mut walk = Action::new("Walk", (0.0, 30.0));
    walk.fcurves.push(bone_curve("ArmA"));
    scene.add_action(walk);
    let mut pose = Action::new("Pose-noexp", (0.0, 1.0));
    pose.fcurves.push(bone_curve("ArmA"));
    scene.add_action(pose);
    let mut unused = Action::new("Unused", (0.0, 1.0));
    unused.users = 0;
    scene.add_action(unused);
    let rig_action = scene.add_action(Action::new("Rig", (0.0, 1.0)));
    let mut wave = Action::new("Wave", (0.0, 15.0));
    wave.fcurves.push(bone_curve("ArmB"));
    wave.fcurves.push(bone_curve("ArmA"));
    scene.add_action(wave);

    for &(name, bone) in &[("RigA", "ArmA"), ("RigB", "ArmB")] {
        let mut arm = Armature::new(name);
        arm.add_bone(bone, None, Matrix4::one());
        arm.constraint_actions.push(rig_action);
        let arm = scene.add_armature(arm);
        let mut rig = Node::new(name);
        rig.payload = Payload::Armature(arm);
        rig.animation = Some(AnimationData { action: None });
        scene.add_node(rig, None);
    }

    let config = crate::config::ExportConfig {
        animate: true,
        all_actions: true,
        ..Default::default()
    };
    let mut ctx = Ctx::new(&scene, &config, Path::new("out.dae"));
    let mut host = SnapshotHost::new(&scene);
    super::nodes::export_scene(&mut ctx, &mut host);
    export_animations(&mut ctx, &mut host);

    let clips = ctx.sections.get(Section::AnimationClips);
    assert_eq!(clips.matches("<animation_clip ").count(), 2);

    // Walk only keys RigA's bone
    let walk = &clips[clips.find(r#"name="Walk""#).unwrap()..clips.find(r#"name="Wave""#).unwrap()];
    assert!(walk.contains(r#"start="0" end="1">"#));
    assert!(walk.contains(r##"<instance_animation url="#RigA-anim"/>"##));
    assert!(!walk.contains("RigB"));

    let wave = &clips[clips.find(r#"name="Wave""#).unwrap()..];
    assert!(wave.contains(r##"<instance_animation url="#RigA-anim1"/>"##));
    assert!(wave.contains(r##"<instance_animation url="#RigB-anim"/>"##));

    // The armatures are unbound again
    assert_eq!(host.active_action(0), None);
    assert_eq!(host.active_action(1), None);
}
