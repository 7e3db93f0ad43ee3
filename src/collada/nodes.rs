//! The <visual_scene>: node tree, HODOR node names, and the cameras, lights,
//! and splines nodes instance.

use std::fmt::Write;
use crate::host::SceneHost;
use crate::scene::{CameraId, CameraKind, CurveId, LampId, LampKind, Node, NodeId, Payload, Scene, Spline};
use crate::util::math::{to_euler_degrees, to_translation};
use super::Ctx;
use super::controller::export_mesh;
use super::sections::Section;
use super::skeleton::export_skeleton;
use super::xml::Xml;

/// Writes the visual scene for every exported node.
pub(super) fn export_scene(ctx: &mut Ctx, host: &mut dyn SceneHost) {
    mark_valid_nodes(ctx);

    let scene = ctx.scene;
    let mut body = Xml::with_indent(3);
    for root in scene.roots() {
        if ctx.valid_nodes[root] {
            export_node(ctx, host, &mut body, root);
        }
    }

    let mut xml = Section::Nodes.buffer();
    xml!(xml;
        <visual_scene id=[(ctx.scene_id)] name=["scene"]>;
    );
    xml.push_fragment(&body);
    xml!(xml;
        /visual_scene>;
    );
    ctx.sections.push(Section::Nodes, &xml);
}

/// Does the node pass the export filters on its own?
fn passes_filters(ctx: &Ctx, node: &Node) -> bool {
    let config = ctx.config;
    if !config.exports_type(node.object_type()) {
        return false;
    }
    if config.active_layers_only && node.layers & ctx.scene.layers == 0 {
        return false;
    }
    if config.selected_only && !node.selected {
        return false;
    }
    true
}

/// A node is exported, payload and all, if it passes the filters or one of
/// its descendants does.
fn mark_valid_nodes(ctx: &mut Ctx) {
    let scene = ctx.scene;
    for (id, node) in scene.nodes.iter().enumerate() {
        if !passes_filters(ctx, node) {
            continue;
        }
        let mut cur = Some(id);
        while let Some(n) = cur {
            if ctx.valid_nodes[n] {
                break;
            }
            ctx.valid_nodes[n] = true;
            cur = scene.nodes[n].parent;
        }
    }
}

fn export_node(ctx: &mut Ctx, host: &mut dyn SceneHost, xml: &mut Xml, id: NodeId) {
    let scene = ctx.scene;
    let node = &scene.nodes[id];

    let name = hodor_name(scene, node);
    let nodeid = ctx.namer.get_fresh_name(&name);
    ctx.node_ids.insert(id, nodeid.clone());

    let m = host.local_matrix(id);
    let loc = to_translation(&m);
    let rot = to_euler_degrees(&m);
    xml!(xml;
        <node id=[(nodeid)] name=[ESC(&name)] sid=[(nodeid)]>;
            <translate sid=["translate"]>(loc.x)" "(loc.y)" "(loc.z)</translate>;
            <rotate sid=["rotateZ"]>"0 0 1 "(rot.z)</rotate>;
            <rotate sid=["rotateY"]>"0 1 0 "(rot.y)</rotate>;
            <rotate sid=["rotateX"]>"1 0 0 "(rot.x)</rotate>;
    );

    match node.payload {
        Payload::Empty => (),
        Payload::Mesh { .. } => export_mesh_instance(ctx, host, xml, id),
        Payload::Camera(camera) => export_camera(ctx, xml, camera),
        Payload::Lamp(lamp) => export_lamp(ctx, xml, lamp),
        Payload::Armature(armature) => export_skeleton(ctx, xml, id, armature),
        Payload::Curve(curve) => {
            let splineid = export_curve(ctx, curve);
            xml!(xml; <instance_geometry url=["#"(splineid)]/>;);
        }
    }

    for &child in &node.children {
        if ctx.valid_nodes[child] {
            export_node(ctx, host, xml, child);
        }
    }

    xml!(xml;
        /node>;
    );
}

/// The node name with the HODOR metadata suffixes for navlights, dock paths,
/// and dock path segments.
fn hodor_name(scene: &Scene, node: &Node) -> String {
    if let Payload::Lamp(lamp) = node.payload {
        let lamp = &scene.lamps[lamp];
        if let Some(ref nav) = lamp.navlight {
            let c = lamp.color;
            let mut name = format!(
                "{}_Type[{}]_Sz[{}]_Ph[{}]_Fr[{}]_Col[{},{},{}]_Dist[{}]",
                node.name, nav.kind, lamp.energy, nav.phase, nav.freq,
                c[0], c[1], c[2], lamp.distance,
            );
            if let Some(ref flags) = nav.flags {
                let _ = write!(name, "_Flags[{}]", flags);
            }
            return name;
        }
    }

    if node.name.contains("DOCK[") {
        let mut name = node.name.clone();
        match node.prop("Fam") {
            Some(fam) => { let _ = write!(name, "_Fam[{}]", fam); }
            None => warn!("dock path {} has no Fam property", node.name),
        }
        for &key in &["Link", "Flags", "MAD"] {
            if let Some(value) = node.prop(key) {
                let _ = write!(name, "_{}[{}]", key, value);
            }
        }
        name
    } else if node.name.contains("SEG[") {
        // Drops the duplicate-name suffix, eg. SEG[3].001
        let mut name: String = node.name.chars().take(6).collect();
        let _ = write!(name, "_Tol[{}]", node.empty_display_size.trunc() as i64);
        match node.prop("Speed") {
            Some(speed) => { let _ = write!(name, "_Spd[{}]", speed); }
            None => warn!("dock segment {} has no Speed property", node.name),
        }
        if let Some(flags) = node.prop("Flags") {
            let _ = write!(name, "_Flags[{}]", flags);
        }
        name
    } else {
        node.name.clone()
    }
}

fn export_mesh_instance(ctx: &mut Ctx, host: &mut dyn SceneHost, xml: &mut Xml, id: NodeId) {
    let armature = ctx.scene.parent_armature(id).map(|(node, _)| node);
    let data = match export_mesh(ctx, host, id, armature) {
        Some(data) => data,
        None => {
            warn!("couldn't get mesh data for {}", ctx.scene.nodes[id].name);
            return;
        }
    };

    let (tag, url) = match (&data.skin_id, &data.morph_id) {
        (Some(skin), _) => ("instance_controller", skin),
        (None, Some(morph)) => ("instance_controller", morph),
        (None, None) => ("instance_geometry", &data.id),
    };
    xml!(xml; <(tag) url=["#"(url)]>;);

    if data.skin_id.is_some() {
        if let Some(info) = armature.and_then(|arm| ctx.skeleton_info.get(&arm)) {
            xml!(xml;
                for root in (&info.skeleton_nodes) {
                    <skeleton>"#"(root)</skeleton>;
                }
            );
        }
    }

    if !data.material_assign.is_empty() {
        xml!(xml;
            <bind_material>;
                <technique_common>;
                    for (target, symbol) in (&data.material_assign) {
                        <instance_material symbol=[(symbol)] target=["#"(target)]/>;
                    }
                /technique_common>;
            /bind_material>;
        );
    }

    xml!(xml; /(tag)>;);
}

fn export_camera(ctx: &mut Ctx, xml: &mut Xml, camera: CameraId) {
    let scene = ctx.scene;
    let cam = &scene.cameras[camera];
    let camid = ctx.namer.new_id("camera");
    let (rx, ry) = scene.resolution;
    let aspect = if ry == 0 { 1.0 } else { rx as f64 / ry as f64 };

    let mut lib = Section::Cameras.buffer();
    xml!(lib;
        <camera id=[(camid)] name=[ESC(&cam.name)]>;
            <optics>;
                <technique_common>;
    );
    match cam.kind {
        CameraKind::Perspective { fov } => {
            xml!(lib;
                    <perspective>;
                        <yfov>(fov.to_degrees())</yfov>;
                        <aspect_ratio>(aspect)</aspect_ratio>;
                        <znear>(cam.clip_start)</znear>;
                        <zfar>(cam.clip_end)</zfar>;
                    /perspective>;
            );
        }
        CameraKind::Orthographic { scale } => {
            xml!(lib;
                    <orthographic>;
                        <xmag>(scale)</xmag>;
                        <aspect_ratio>(aspect)</aspect_ratio>;
                        <znear>(cam.clip_start)</znear>;
                        <zfar>(cam.clip_end)</zfar>;
                    /orthographic>;
            );
        }
    }
    xml!(lib;
                /technique_common>;
            /optics>;
        /camera>;
    );
    ctx.sections.push(Section::Cameras, &lib);

    xml!(xml; <instance_camera url=["#"(camid)]/>;);
}

fn export_lamp(ctx: &mut Ctx, xml: &mut Xml, lamp: LampId) {
    let scene = ctx.scene;
    let light = &scene.lamps[lamp];
    let lightid = ctx.namer.new_id("light");
    let c = light.color;
    // Linear attenuation that falls to half at `distance`
    let attenuation = if light.distance > 0.0 { Some(2.0 / light.distance) } else { None };

    let mut lib = Section::Lamps.buffer();
    xml!(lib;
        <light id=[(lightid)] name=[ESC(&light.name)]>;
            <technique_common>;
    );
    match light.kind {
        LampKind::Point => {
            xml!(lib;
                <point>;
                    <color>(c[0])" "(c[1])" "(c[2])</color>;
                    for a in (attenuation) {
                        <linear_attenuation>(a)</linear_attenuation>;
                    }
                    if (light.use_sphere) {
                        <zfar>(light.distance)</zfar>;
                    }
                /point>;
            );
        }
        LampKind::Spot { size } => {
            xml!(lib;
                <spot>;
                    <color>(c[0])" "(c[1])" "(c[2])</color>;
                    for a in (attenuation) {
                        <linear_attenuation>(a)</linear_attenuation>;
                    }
                    <falloff_angle>(size.to_degrees())</falloff_angle>;
                /spot>;
            );
        }
        LampKind::Sun | LampKind::Hemi | LampKind::Area => {
            xml!(lib;
                <directional>;
                    <color>(c[0])" "(c[1])" "(c[2])</color>;
                /directional>;
            );
        }
    }
    xml!(lib;
            /technique_common>;
        /light>;
    );
    ctx.sections.push(Section::Lamps, &lib);

    xml!(xml; <instance_light url=["#"(lightid)]/>;);
}

/// Writes a curve as a <spline> geometry (once) and returns its ID.
///
/// All the curve's splines go into one control vertex list. Poly points use
/// their own position for both tangents.
fn export_curve(ctx: &mut Ctx, curve: CurveId) -> String {
    if let Some(id) = ctx.curve_cache.get(&curve) {
        return id.clone();
    }

    let scene = ctx.scene;
    let curve_data = &scene.curves[curve];
    let splineid = ctx.namer.new_id("spline");

    let mut points = vec![];
    let mut handles_in = vec![];
    let mut handles_out = vec![];
    let mut tilts = vec![];
    let mut interps = vec![];
    for spline in &curve_data.splines {
        match *spline {
            Spline::Bezier(ref bps) => {
                for p in bps {
                    points.push(p.co);
                    handles_in.push(p.handle_left);
                    handles_out.push(p.handle_right);
                    tilts.push(p.tilt);
                    interps.push("BEZIER");
                }
            }
            Spline::Poly(ref ps) => {
                for p in ps {
                    points.push(p.co);
                    handles_in.push(p.co);
                    handles_out.push(p.co);
                    tilts.push(p.tilt);
                    interps.push("LINEAR");
                }
            }
        }
    }

    let n = points.len();
    let mut lib = Section::Geometries.buffer();
    xml!(lib;
        <geometry id=[(splineid)] name=[ESC(&curve_data.name)]>;
            <spline closed=["0"]>;
    );
    for &(what, ps) in &[("positions", &points), ("intangents", &handles_in), ("outtangents", &handles_out)] {
        xml!(lib;
                <source id=[(splineid)"-"(what)]>;
                    <float_array id=[(splineid)"-"(what)"-array"] count=[(3 * n)]>
                    for p in (ps.iter()) {
                        (p.x)" "(p.y)" "(p.z)" "
                    }
                    </float_array>;
                    <technique_common>;
                        <accessor source=["#"(splineid)"-"(what)"-array"] count=[(n)] stride=["3"]>;
                            <param name=["X"] type=["float"]/>;
                            <param name=["Y"] type=["float"]/>;
                            <param name=["Z"] type=["float"]/>;
                        /accessor>;
                    /technique_common>;
                /source>;
        );
    }
    xml!(lib;
                <source id=[(splineid)"-interpolations"]>;
                    <Name_array id=[(splineid)"-interpolations-array"] count=[(n)]>
                    for interp in (&interps) {
                        (interp)" "
                    }
                    </Name_array>;
                    <technique_common>;
                        <accessor source=["#"(splineid)"-interpolations-array"] count=[(n)] stride=["1"]>;
                            <param name=["INTERPOLATION"] type=["name"]/>;
                        /accessor>;
                    /technique_common>;
                /source>;
                <source id=[(splineid)"-tilts"]>;
                    <float_array id=[(splineid)"-tilts-array"] count=[(n)]>
                    for tilt in (&tilts) {
                        (tilt)" "
                    }
                    </float_array>;
                    <technique_common>;
                        <accessor source=["#"(splineid)"-tilts-array"] count=[(n)] stride=["1"]>;
                            <param name=["TILT"] type=["float"]/>;
                        /accessor>;
                    /technique_common>;
                /source>;
                <control_vertices>;
                    <input semantic=["POSITION"] source=["#"(splineid)"-positions"]/>;
                    <input semantic=["IN_TANGENT"] source=["#"(splineid)"-intangents"]/>;
                    <input semantic=["OUT_TANGENT"] source=["#"(splineid)"-outtangents"]/>;
                    <input semantic=["INTERPOLATION"] source=["#"(splineid)"-interpolations"]/>;
                    <input semantic=["TILT"] source=["#"(splineid)"-tilts"]/>;
                /control_vertices>;
            /spline>;
        /geometry>;
    );
    ctx.sections.push(Section::Geometries, &lib);

    ctx.curve_cache.insert(curve, splineid.clone());
    splineid
}


#[cfg(test)]
fn with_exported<F: FnOnce(&Ctx)>(scene: &Scene, config: &crate::config::ExportConfig, f: F) {
    use std::path::Path;
    use crate::host::SnapshotHost;

    let mut ctx = Ctx::new(scene, config, Path::new("out.dae"));
    let mut host = SnapshotHost::new(scene);
    export_scene(&mut ctx, &mut host);
    f(&ctx)
}

#[test]
fn test_unique_node_ids() {
    let mut scene = Scene::new("Scene");
    scene.add_node(Node::new("A"), None);
    scene.add_node(Node::new("A"), None);
    scene.add_node(Node::new("id-foo"), None);

    with_exported(&scene, &Default::default(), |ctx| {
        let xml = ctx.sections.get(Section::Nodes);
        assert!(xml.contains(r#"<visual_scene id="id-scene-1" name="scene">"#));
        assert!(xml.contains(r#"<node id="A" name="A" sid="A">"#));
        assert!(xml.contains(r#"<node id="A1" name="A" sid="A1">"#));
        assert!(xml.contains(r#"<node id="zid-foo" name="id-foo" sid="zid-foo">"#));
        assert!(xml.contains(r#"<translate sid="translate">0 0 0</translate>"#));
        assert!(xml.contains(r#"<rotate sid="rotateZ">0 0 1 "#));
    });
}

#[test]
fn test_filters_keep_ancestors() {
    use crate::scene::{Camera, ObjectType};

    let mut scene = Scene::new("Scene");
    let root = scene.add_node(Node::new("Root"), None);
    scene.cameras.push(Camera {
        name: "Cam".to_string(),
        kind: CameraKind::Perspective { fov: std::f64::consts::FRAC_PI_2 },
        clip_start: 0.1,
        clip_end: 100.0,
    });
    let mut cam = Node::new("CamNode");
    cam.payload = Payload::Camera(0);
    scene.add_node(cam, Some(root));
    let mut hidden = Node::new("Hidden");
    hidden.payload = Payload::Camera(0);
    hidden.layers = 2;
    scene.add_node(hidden, None);
    scene.add_node(Node::new("Lonely"), None);

    let config = crate::config::ExportConfig {
        object_types: vec![ObjectType::Camera],
        ..Default::default()
    };
    with_exported(&scene, &config, |ctx| {
        let xml = ctx.sections.get(Section::Nodes);
        assert!(xml.contains(r#"name="Root""#));
        assert!(xml.contains(r#"name="CamNode""#));
        assert!(!xml.contains("Hidden"));
        assert!(!xml.contains("Lonely"));
        assert_eq!(xml.matches("<instance_camera ").count(), 1);

        let cams = ctx.sections.get(Section::Cameras);
        assert!(cams.contains("<yfov>90</yfov>"));
        assert!(cams.contains("<aspect_ratio>1.7777777777777777</aspect_ratio>"));
        assert!(cams.contains("<zfar>100</zfar>"));
    });
}

#[test]
fn test_kept_ancestors_keep_payload() {
    use crate::scene::Camera;

    let mut scene = Scene::new("Scene");
    scene.cameras.push(Camera {
        name: "Cam".to_string(),
        kind: CameraKind::Orthographic { scale: 2.0 },
        clip_start: 0.1,
        clip_end: 100.0,
    });
    let mut parent = Node::new("Boom");
    parent.payload = Payload::Camera(0);
    let parent = scene.add_node(parent, None);
    let mut child = Node::new("Lens");
    child.payload = Payload::Camera(0);
    child.selected = true;
    scene.add_node(child, Some(parent));
    let mut other = Node::new("Other");
    other.payload = Payload::Camera(0);
    scene.add_node(other, None);

    let config = crate::config::ExportConfig { selected_only: true, ..Default::default() };
    with_exported(&scene, &config, |ctx| {
        let xml = ctx.sections.get(Section::Nodes);
        assert!(xml.contains(r#"name="Boom""#));
        assert!(!xml.contains("Other"));
        assert_eq!(xml.matches("<instance_camera ").count(), 2);
        assert!(ctx.sections.get(Section::Cameras).contains("<xmag>2</xmag>"));
    });
}

#[test]
fn test_hodor_names() {
    use crate::scene::{Lamp, NavLight};

    let mut scene = Scene::new("Scene");
    scene.lamps.push(Lamp {
        name: "Light".to_string(),
        kind: LampKind::Point,
        color: [1.0, 0.5, 0.0],
        energy: 2.0,
        distance: 4.0,
        use_sphere: true,
        navlight: Some(NavLight {
            kind: "default".to_string(),
            phase: "0".to_string(),
            freq: "1".to_string(),
            flags: Some("sprite".to_string()),
        }),
    });
    let mut nav = Node::new("NAVL[Tip]");
    nav.payload = Payload::Lamp(0);
    scene.add_node(nav, None);

    let mut dock = Node::new("DOCK[Path1]");
    dock.props.insert("Fam".to_string(), "Fighter".to_string());
    dock.props.insert("Link".to_string(), "Path2".to_string());
    scene.add_node(dock, None);

    let mut seg = Node::new("SEG[3].001");
    seg.empty_display_size = 20.7;
    seg.props.insert("Speed".to_string(), "50".to_string());
    scene.add_node(seg, None);

    let mut lost = Node::new("DOCK[Lost]");
    lost.props.insert("MAD".to_string(), "1".to_string());
    scene.add_node(lost, None);

    assert_eq!(
        hodor_name(&scene, &scene.nodes[0]),
        "NAVL[Tip]_Type[default]_Sz[2]_Ph[0]_Fr[1]_Col[1,0.5,0]_Dist[4]_Flags[sprite]",
    );
    assert_eq!(hodor_name(&scene, &scene.nodes[1]), "DOCK[Path1]_Fam[Fighter]_Link[Path2]");
    assert_eq!(hodor_name(&scene, &scene.nodes[2]), "SEG[3]_Tol[20]_Spd[50]");
    assert_eq!(hodor_name(&scene, &scene.nodes[3]), "DOCK[Lost]_MAD[1]");

    with_exported(&scene, &Default::default(), |ctx| {
        let lights = ctx.sections.get(Section::Lamps);
        assert!(lights.contains("<color>1 0.5 0</color>"));
        assert!(lights.contains("<linear_attenuation>0.5</linear_attenuation>"));
        assert!(lights.contains("<zfar>4</zfar>"));
        let xml = ctx.sections.get(Section::Nodes);
        assert!(xml.contains(r##"<instance_light url="#id-light-2"/>"##));
    });
}

#[test]
fn test_curve_spline() {
    use cgmath::Point3;
    use crate::scene::{BezierPoint, Curve, CurvePoint};

    let mut scene = Scene::new("Scene");
    let p = |x: f64| Point3::new(x, 0.0, 0.0);
    scene.curves.push(Curve {
        name: "Path".to_string(),
        splines: vec![
            Spline::Bezier(vec![BezierPoint {
                co: p(0.0),
                handle_left: p(-1.0),
                handle_right: p(1.0),
                tilt: 0.0,
            }]),
            Spline::Poly(vec![CurvePoint { co: p(5.0), tilt: 0.5 }]),
        ],
    });
    for name in &["A", "B"] {
        let mut node = Node::new(name);
        node.payload = Payload::Curve(0);
        scene.add_node(node, None);
    }

    with_exported(&scene, &Default::default(), |ctx| {
        let geoms = ctx.sections.get(Section::Geometries);
        assert_eq!(geoms.matches("<spline ").count(), 1);
        assert!(geoms.contains(r#"<float_array id="id-spline-2-intangents-array" count="6">-1 0 0 5 0 0 </float_array>"#));
        assert!(geoms.contains(r#"<Name_array id="id-spline-2-interpolations-array" count="2">BEZIER LINEAR </Name_array>"#));
        assert!(geoms.contains(r#"<float_array id="id-spline-2-tilts-array" count="2">0 0.5 </float_array>"#));
        let xml = ctx.sections.get(Section::Nodes);
        assert_eq!(xml.matches(r##"<instance_geometry url="#id-spline-2"/>"##).count(), 2);
    });
}

#[test]
fn test_mesh_instance_binds_materials() {
    use crate::scene::Material;
    use super::geometry::quad_mesh;

    let mut scene = Scene::new("Scene");
    let hull = scene.add_material(Material::new("Hull"));
    let mut mesh = quad_mesh();
    mesh.materials = vec![Some(hull)];
    let mesh = scene.add_mesh(mesh);
    let mut node = Node::new("Ship");
    node.payload = Payload::Mesh { mesh, evaluated: None };
    scene.add_node(node, None);

    with_exported(&scene, &Default::default(), |ctx| {
        let xml = ctx.sections.get(Section::Nodes);
        assert!(xml.contains(r##"<instance_geometry url="#Quad">"##));
        assert!(xml.contains(r##"<instance_material symbol="Hull" target="#Hull"/>"##));
        assert!(xml.contains("</instance_geometry>"));
    });
}
