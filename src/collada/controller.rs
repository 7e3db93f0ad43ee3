//! Skin and morph <controller>s, and the per-mesh export that ties them to
//! their geometries.

use crate::host::{SceneHost, ShapeKeyGuard};
use crate::scene::{Mesh, NodeId, Payload};
use super::{Ctx, MeshData, SkinInfo};
use super::geometry::{export_geometry, Prims};
use super::sections::Section;

/// Exports the mesh of a mesh object (once per mesh) with its morph and
/// skin controllers. `armature` is the armature object it's parented to, if
/// that armature was exported.
///
/// Returns `None` if the host couldn't produce the mesh.
pub(super) fn export_mesh(
    ctx: &mut Ctx,
    host: &mut dyn SceneHost,
    node: NodeId,
    armature: Option<NodeId>,
) -> Option<MeshData> {
    let scene = ctx.scene;
    let base = match scene.nodes[node].payload {
        Payload::Mesh { mesh, .. } => mesh,
        _ => return None,
    };
    if let Some(data) = ctx.mesh_cache.get(&base) {
        return Some(data.clone());
    }

    let skin = armature.and_then(|arm| ctx.skeleton_info.get(&arm).cloned());
    let apply_modifiers = ctx.config.apply_modifiers;
    let base_mesh = &scene.meshes[base];

    let data = if base_mesh.has_shape_keys() {
        let mut guard = ShapeKeyGuard::new(host, base);
        if guard.num_keys() != base_mesh.shape_keys.len() {
            warn!("mesh {}: host has {} shape keys, expected {}",
                base_mesh.name, guard.num_keys(), base_mesh.shape_keys.len());
        }

        // Nothing is written unless the basis evaluates
        guard.rest();
        let basis_key = &base_mesh.shape_keys[0];
        let basis_mesh = match guard.evaluate_mesh(node, apply_modifiers) {
            Some(mesh) => mesh,
            None => {
                warn!("mesh {}: couldn't evaluate basis {}", base_mesh.name, basis_key.name);
                return None;
            }
        };

        let morph_id = ctx.namer.new_id("morph");
        let mut data = export_skinned(
            ctx, node, &basis_mesh, skin.as_ref(), Some(&morph_id), &base_mesh.name, &basis_key.name,
        );

        let mut targets: Vec<String> = vec![];
        for (k, key) in base_mesh.shape_keys.iter().enumerate().skip(1) {
            guard.activate(k);
            let mesh = match guard.evaluate_mesh(node, apply_modifiers) {
                Some(mesh) => mesh,
                None => {
                    warn!("mesh {}: couldn't evaluate shape key {}", base_mesh.name, key.name);
                    continue;
                }
            };
            let id_hint = format!("{}-morph-{}", base_mesh.name, key.name);
            let (target, _) = export_geometry(ctx, node, &mesh, None, true, &id_hint, &key.name);
            targets.push(target.id);
        }
        guard.rest();
        drop(guard);

        write_morph(ctx, &morph_id, &data.id, &targets);
        data.morph_id = Some(morph_id);
        data
    } else {
        let mesh = host.evaluate_mesh(node, apply_modifiers)?;
        export_skinned(ctx, node, &mesh, skin.as_ref(), None, &base_mesh.name, &base_mesh.name)
    };

    ctx.mesh_cache.insert(base, data.clone());
    Some(data)
}

/// Writes the geometry and, with a skeleton, the skin controller over it.
///
/// `morph_source` is the morph controller the geometry is the basis of; the
/// skin then deforms the morph instead of the bare geometry.
fn export_skinned(
    ctx: &mut Ctx,
    node: NodeId,
    mesh: &Mesh,
    skin: Option<&SkinInfo>,
    morph_source: Option<&String>,
    id_hint: &str,
    name: &str,
) -> MeshData {
    let bone_index = skin.map(|s| &s.bone_index);
    let morph_target = morph_source.is_some();
    let (mut data, prims) = export_geometry(ctx, node, mesh, bone_index, morph_target, id_hint, name);

    if let Some(skin) = skin {
        let source = morph_source.unwrap_or(&data.id).clone();
        data.skin_id = Some(write_skin(ctx, node, &source, skin, &prims));
    }
    data
}

fn write_skin(ctx: &mut Ctx, node: NodeId, source: &str, skin: &SkinInfo, prims: &Prims) -> String {
    let contid = ctx.namer.new_id("controller");
    let bind_shape = ctx.scene.world_matrix(node);
    let verts = &prims.vertices;
    let num_joints = skin.bone_names.len();

    // (joint, weight) index pairs, the weights numbered in vertex order
    let mut pairs: Vec<(usize, usize)> = vec![];
    let mut weights: Vec<f64> = vec![];
    for v in verts {
        for (&bone, &weight) in v.bones.iter().zip(v.weights.iter()) {
            pairs.push((bone, weights.len()));
            weights.push(weight);
        }
    }

    let mut xml = Section::Skin.buffer();
    xml!(xml;
        <controller id=[(contid)]>;
            <skin source=["#"(source)]>;
                <bind_shape_matrix>MATRIX(&bind_shape)</bind_shape_matrix>;
                <source id=[(contid)"-joints"]>;
                    <Name_array id=[(contid)"-joints-array"] count=[(num_joints)]>
                    for name in (&skin.bone_names) {
                        (name)" "
                    }
                    </Name_array>;
                    <technique_common>;
                        <accessor source=["#"(contid)"-joints-array"] count=[(num_joints)] stride=["1"]>;
                            <param name=["JOINT"] type=["Name"]/>;
                        /accessor>;
                    /technique_common>;
                /source>;
                <source id=[(contid)"-bind_poses"]>;
                    <float_array id=[(contid)"-bind_poses-array"] count=[(16 * num_joints)]>
                    for m in (&skin.bind_poses) {
                        MATRIX(m)" "
                    }
                    </float_array>;
                    <technique_common>;
                        <accessor source=["#"(contid)"-bind_poses-array"] count=[(num_joints)] stride=["16"]>;
                            <param name=["TRANSFORM"] type=["float4x4"]/>;
                        /accessor>;
                    /technique_common>;
                /source>;
                <source id=[(contid)"-skin_weights"]>;
                    <float_array id=[(contid)"-skin_weights-array"] count=[(weights.len())]>
                    for w in (&weights) {
                        (w)" "
                    }
                    </float_array>;
                    <technique_common>;
                        <accessor source=["#"(contid)"-skin_weights-array"] count=[(weights.len())] stride=["1"]>;
                            <param name=["WEIGHT"] type=["float"]/>;
                        /accessor>;
                    /technique_common>;
                /source>;
                <joints>;
                    <input semantic=["JOINT"] source=["#"(contid)"-joints"]/>;
                    <input semantic=["INV_BIND_MATRIX"] source=["#"(contid)"-bind_poses"]/>;
                /joints>;
                <vertex_weights count=[(verts.len())]>;
                    <input semantic=["JOINT"] source=["#"(contid)"-joints"] offset=["0"]/>;
                    <input semantic=["WEIGHT"] source=["#"(contid)"-skin_weights"] offset=["1"]/>;
                    <vcount>
                    for v in (verts) {
                        (v.weights.len())" "
                    }
                    </vcount>;
                    <v>
                    for &(joint, weight) in (&pairs) {
                        (joint)" "(weight)" "
                    }
                    </v>;
                /vertex_weights>;
            /skin>;
        /controller>;
    );
    ctx.sections.push(Section::Skin, &xml);

    contid
}

/// Morph controller with `basis` as the source and all `targets` at weight
/// zero.
fn write_morph(ctx: &mut Ctx, morph_id: &str, basis: &str, targets: &[String]) {
    let n = targets.len();
    let mut xml = Section::Morph.buffer();
    xml!(xml;
        <controller id=[(morph_id)] name=[""]>;
            <morph source=["#"(basis)] method=["NORMALIZED"]>;
                <source id=[(morph_id)"-morph-targets"]>;
                    <IDREF_array id=[(morph_id)"-morph-targets-array"] count=[(n)]>
                    for target in (targets) {
                        (target)" "
                    }
                    </IDREF_array>;
                    <technique_common>;
                        <accessor source=["#"(morph_id)"-morph-targets-array"] count=[(n)] stride=["1"]>;
                            <param name=["MORPH_TARGET"] type=["IDREF"]/>;
                        /accessor>;
                    /technique_common>;
                /source>;
                <source id=[(morph_id)"-morph-weights"]>;
                    <float_array id=[(morph_id)"-morph-weights-array"] count=[(n)]>
                    for _ in (0..n) {
                        "0 "
                    }
                    </float_array>;
                    <technique_common>;
                        <accessor source=["#"(morph_id)"-morph-weights-array"] count=[(n)] stride=["1"]>;
                            <param name=["MORPH_WEIGHT"] type=["float"]/>;
                        /accessor>;
                    /technique_common>;
                /source>;
                <targets>;
                    <input semantic=["MORPH_TARGET"] source=["#"(morph_id)"-morph-targets"]/>;
                    <input semantic=["MORPH_WEIGHT"] source=["#"(morph_id)"-morph-weights"]/>;
                /targets>;
            /morph>;
        /controller>;
    );
    ctx.sections.push(Section::Morph, &xml);
}


#[test]
fn test_skin_weights() {
    use std::path::Path;
    use crate::host::SnapshotHost;
    use crate::scene::{Node, VertexGroupWeight};
    use super::geometry::quad_mesh;
    use super::skeleton::{export_skeleton, rigged_scene};
    use super::xml::Xml;

    let mut scene = rigged_scene();
    let mut mesh = quad_mesh();
    mesh.vertices[0].groups = vec![VertexGroupWeight { group: 0, weight: 1.0 }];
    mesh.vertices[1].groups = vec![
        VertexGroupWeight { group: 0, weight: 0.25 },
        VertexGroupWeight { group: 1, weight: 0.75 },
        VertexGroupWeight { group: 2, weight: 0.0005 },
    ];
    let mesh = scene.add_mesh(mesh);
    let mut body = Node::new("Body");
    body.payload = Payload::Mesh { mesh, evaluated: None };
    body.vertex_groups = vec!["Root".to_string(), "Tip".to_string(), "ctrl_IK".to_string()];
    let body = scene.add_node(body, Some(0));

    let config = Default::default();
    let mut ctx = Ctx::new(&scene, &config, Path::new("out.dae"));
    let mut host = SnapshotHost::new(&scene);
    export_skeleton(&mut ctx, &mut Xml::with_indent(3), 0, 0);
    let data = export_mesh(&mut ctx, &mut host, body, Some(0)).unwrap();

    let contid = data.skin_id.clone().unwrap();
    let skin = ctx.sections.get(Section::Skin);
    assert!(skin.contains(&format!(r##"<skin source="#{}">"##, data.id)));
    assert!(skin.contains(r#"<vertex_weights count="4">"#));
    assert!(skin.contains("<vcount>1 2 0 0 </vcount>"));
    assert!(skin.contains("<v>0 0 0 1 1 2 </v>"));
    assert!(skin.contains(&format!(r#"<float_array id="{}-skin_weights-array" count="3">1 0.25 0.75 </float_array>"#, contid)));
    assert!(skin.contains(r#"<param name="TRANSFORM" type="float4x4"/>"#));
    assert!(ctx.sections.is_empty(Section::Morph));

    // Cached by mesh
    let again = export_mesh(&mut ctx, &mut host, body, Some(0)).unwrap();
    assert_eq!(again.skin_id, data.skin_id);
    assert_eq!(ctx.sections.get(Section::Skin).matches("<controller ").count(), 1);
}

#[test]
fn test_morph_targets() {
    use cgmath::Point3;
    use std::path::Path;
    use crate::host::SnapshotHost;
    use crate::scene::{Node, Scene, ShapeKey};
    use super::geometry::quad_mesh;

    let mut scene = Scene::new("Scene");
    let mut mesh = quad_mesh();
    let basis: Vec<Point3<f64>> = mesh.vertices.iter().map(|v| v.co).collect();
    let raised = basis.iter().map(|p| Point3::new(p.x, p.y, 1.0)).collect();
    mesh.shape_keys.push(ShapeKey { name: "Basis".to_string(), positions: basis, value: 0.0 });
    mesh.shape_keys.push(ShapeKey { name: "Up".to_string(), positions: raised, value: 0.3 });
    let mesh = scene.add_mesh(mesh);
    let mut node = Node::new("Quad");
    node.payload = Payload::Mesh { mesh, evaluated: None };
    let node = scene.add_node(node, None);

    let config = Default::default();
    let mut ctx = Ctx::new(&scene, &config, Path::new("out.dae"));
    let mut host = SnapshotHost::new(&scene);
    let data = export_mesh(&mut ctx, &mut host, node, None).unwrap();

    assert_eq!(data.id, "Quad");
    assert_eq!(data.morph_id.as_ref().map(|s| s.as_str()), Some("id-morph-2"));
    assert!(data.skin_id.is_none());

    let geoms = ctx.sections.get(Section::Geometries);
    assert!(geoms.contains(r#"<geometry id="Quad" name="Basis">"#));
    assert!(geoms.contains(r#"<geometry id="Quad-morph-Up" name="Up">"#));
    assert!(geoms.contains("0 0 1 1 0 1 1 1 1 0 1 1 </float_array>"));

    let morph = ctx.sections.get(Section::Morph);
    assert!(morph.contains(r##"<morph source="#Quad" method="NORMALIZED">"##));
    assert!(morph.contains(r#"<IDREF_array id="id-morph-2-morph-targets-array" count="1">Quad-morph-Up </IDREF_array>"#));
    assert!(morph.contains(r#"<float_array id="id-morph-2-morph-weights-array" count="1">0 </float_array>"#));

    // The host's blend is back where it was
    assert_eq!(host.shape_key_values(mesh), vec![0.0, 0.3]);
}

#[test]
fn test_unevaluated_basis_writes_nothing() {
    use cgmath::{Matrix4, Point3};
    use std::path::Path;
    use crate::host::SnapshotHost;
    use crate::scene::{ActionId, MeshId, Node, Scene, ShapeKey};
    use super::geometry::quad_mesh;

    /// A host that has lost the mesh's evaluated data.
    struct NoMeshHost<'a>(SnapshotHost<'a>);

    impl<'a> SceneHost for NoMeshHost<'a> {
        fn shape_key_values(&self, mesh: MeshId) -> Vec<f32> { self.0.shape_key_values(mesh) }
        fn set_shape_key_values(&mut self, mesh: MeshId, values: &[f32]) {
            self.0.set_shape_key_values(mesh, values)
        }
        fn evaluate_mesh(&self, _: NodeId, _: bool) -> Option<Mesh> { None }
        fn frame(&self) -> i32 { self.0.frame() }
        fn set_frame(&mut self, frame: i32) { self.0.set_frame(frame) }
        fn local_matrix(&self, node: NodeId) -> Matrix4<f64> { self.0.local_matrix(node) }
        fn active_action(&self, node: NodeId) -> Option<ActionId> { self.0.active_action(node) }
        fn set_active_action(&mut self, node: NodeId, action: Option<ActionId>) {
            self.0.set_active_action(node, action)
        }
        fn bone_pose(&self, node: NodeId) -> Vec<Matrix4<f64>> { self.0.bone_pose(node) }
        fn set_bone_pose(&mut self, node: NodeId, pose: &[Matrix4<f64>]) {
            self.0.set_bone_pose(node, pose)
        }
    }

    let mut scene = Scene::new("Scene");
    let mut mesh = quad_mesh();
    let basis: Vec<Point3<f64>> = mesh.vertices.iter().map(|v| v.co).collect();
    mesh.shape_keys.push(ShapeKey { name: "Basis".to_string(), positions: basis.clone(), value: 0.0 });
    mesh.shape_keys.push(ShapeKey { name: "Key 1".to_string(), positions: basis, value: 0.5 });
    let mesh = scene.add_mesh(mesh);
    let mut node = Node::new("Quad");
    node.payload = Payload::Mesh { mesh, evaluated: None };
    let node = scene.add_node(node, None);

    let config = Default::default();
    let mut ctx = Ctx::new(&scene, &config, Path::new("out.dae"));
    let mut host = NoMeshHost(SnapshotHost::new(&scene));
    assert!(export_mesh(&mut ctx, &mut host, node, None).is_none());
    assert!(ctx.sections.is_empty(Section::Geometries));
    assert!(ctx.sections.is_empty(Section::Morph));
    assert_eq!(host.shape_key_values(mesh), vec![0.0, 0.5]);
}
