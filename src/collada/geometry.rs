//! Mesh -> <geometry>.
//!
//! Faces are walked in order and each corner (loop) becomes a `Vertex` with
//! its position, split normal, UVs, color, tangents, and bone weights.
//! Corners with the same attributes (to within 1e-4) share one vertex index,
//! except in morph targets, whose vertex count must match across targets.
//!
//! Indices in the <p>s are, per corner: the vertex (`VERTEX`, offset 0), the
//! loop (`NORMAL`, offset 1), and the loop again for every UV layer
//! (`TEXCOORD`, offset 2+i). Normals and UVs are written per loop; colors and
//! tangents per vertex, so they share the vertex offset.

use cgmath::{Point3, Vector3};
use smallvec::SmallVec;
use std::collections::HashMap;
use crate::scene::{ColorLayer, Mesh, NodeId, Tangent, UvLayer};
use super::{Ctx, MeshData};
use super::material::export_material;
use super::sections::Section;
use super::xml::Xml;

const WEIGHT_THRESHOLD: f64 = 0.001;
const CMP_EPSILON: f64 = 0.0001;

/// IDs written under a geometry's own.
const SOURCE_SUFFIXES: [&str; 11] = [
    "-positions", "-positions-array",
    "-normals", "-normals-array",
    "-tangents", "-tangents-array",
    "-bitangents", "-bitangents-array",
    "-colors", "-colors-array",
    "-vertices",
];

pub(super) struct Vertex {
    pub co: Point3<f64>,
    pub normal: Vector3<f64>,
    pub uvs: SmallVec<[[f64; 2]; 2]>,
    pub color: Option<[f64; 3]>,
    pub tangent: Option<Tangent>,
    pub bones: SmallVec<[usize; 4]>,
    pub weights: SmallVec<[f64; 4]>,
}

impl Vertex {
    /// Hashable identity: every float snapped to a 1e-4 grid, plus the
    /// bone influences.
    fn key(&self) -> Vec<i64> {
        let snap = |x: f64| (x / CMP_EPSILON).round() as i64;
        let mut key = Vec::with_capacity(16);
        key.extend(&[snap(self.co.x), snap(self.co.y), snap(self.co.z)]);
        key.extend(&[snap(self.normal.x), snap(self.normal.y), snap(self.normal.z)]);
        for uv in &self.uvs {
            key.extend(&[snap(uv[0]), snap(uv[1])]);
        }
        if let Some(c) = self.color {
            key.extend(&[snap(c[0]), snap(c[1]), snap(c[2])]);
        }
        if let Some(t) = self.tangent {
            key.extend(&[snap(t.tangent.x), snap(t.tangent.y), snap(t.tangent.z)]);
            key.extend(&[snap(t.bitangent.x), snap(t.bitangent.y), snap(t.bitangent.z)]);
        }
        for (&b, &w) in self.bones.iter().zip(self.weights.iter()) {
            key.extend(&[b as i64, snap(w)]);
        }
        key
    }
}

/// (vertex index, loop index)
type Corner = (usize, usize);

struct Bucket {
    material_slot: usize,
    faces: Vec<SmallVec<[Corner; 4]>>,
}

/// Deduplicated vertices and faces grouped by material slot, in order of
/// first appearance.
pub(super) struct Prims {
    pub vertices: Vec<Vertex>,
    buckets: Vec<Bucket>,
    uv_names: Vec<String>,
    has_colors: bool,
    has_tangents: bool,
}

impl Prims {
    pub(super) fn build(
        mesh: &Mesh,
        vertex_groups: &[String],
        bone_index: Option<&HashMap<String, usize>>,
        with_tangents: bool,
        dedup: bool,
    ) -> Prims {
        let num_loops = mesh.loops.len();
        let uv_layers: Vec<&UvLayer> = mesh.uv_layers.iter()
            .filter(|layer| {
                let ok = layer.data.len() == num_loops;
                if !ok {
                    warn!("mesh {}: UV layer {} has the wrong length; skipping it",
                        mesh.name, layer.name);
                }
                ok
            })
            .collect();
        let colors: Option<&ColorLayer> = mesh.color_layers.first()
            .filter(|layer| layer.data.len() == num_loops);
        let has_tangents = with_tangents && !uv_layers.is_empty() && mesh.has_tangents();
        if with_tangents && !has_tangents {
            debug!("mesh {}: no tangents to export", mesh.name);
        }

        let mut vertices: Vec<Vertex> = vec![];
        let mut vertex_map: HashMap<Vec<i64>, usize> = HashMap::new();
        let mut buckets: Vec<Bucket> = vec![];

        for poly in &mesh.polygons {
            let mut corners: SmallVec<[Corner; 4]> = SmallVec::new();

            for loop_index in poly.loops() {
                let ml = match mesh.loops.get(loop_index) {
                    Some(ml) => ml,
                    None => break,
                };
                let mv = match mesh.vertices.get(ml.vertex) {
                    Some(mv) => mv,
                    None => continue,
                };

                let mut v = Vertex {
                    co: mv.co,
                    normal: ml.normal,
                    uvs: uv_layers.iter().map(|layer| layer.data[loop_index]).collect(),
                    color: colors.map(|layer| layer.data[loop_index]),
                    tangent: if has_tangents { ml.tangent } else { None },
                    bones: SmallVec::new(),
                    weights: SmallVec::new(),
                };

                if let Some(bone_index) = bone_index {
                    for vg in &mv.groups {
                        let name = match vertex_groups.get(vg.group) {
                            Some(name) => name,
                            None => {
                                trace!("mesh {}: stale vertex group {}", mesh.name, vg.group);
                                continue;
                            }
                        };
                        if let Some(&bone) = bone_index.get(name) {
                            if vg.weight > WEIGHT_THRESHOLD {
                                v.bones.push(bone);
                                v.weights.push(vg.weight);
                            }
                        }
                    }
                }

                let idx = if dedup {
                    let key = v.key();
                    match vertex_map.get(&key) {
                        Some(&idx) => idx,
                        None => {
                            vertices.push(v);
                            vertex_map.insert(key, vertices.len() - 1);
                            vertices.len() - 1
                        }
                    }
                } else {
                    vertices.push(v);
                    vertices.len() - 1
                };

                corners.push((idx, loop_index));
            }

            // Only triangles and above
            if corners.len() < 3 {
                continue;
            }

            let pos = buckets.iter().position(|b| b.material_slot == poly.material_index);
            let bucket = match pos {
                Some(i) => &mut buckets[i],
                None => {
                    buckets.push(Bucket {
                        material_slot: poly.material_index,
                        faces: vec![],
                    });
                    let last = buckets.len() - 1;
                    &mut buckets[last]
                }
            };
            bucket.faces.push(corners);
        }

        Prims {
            vertices,
            buckets,
            uv_names: uv_layers.iter().map(|layer| layer.name.clone()).collect(),
            has_colors: colors.is_some(),
            has_tangents,
        }
    }
}

/// Writes a <geometry> for `mesh` and returns its ID and material bindings
/// along with the vertex data (which the skin controller needs).
///
/// `morph_target` turns off vertex deduplication.
pub(super) fn export_geometry(
    ctx: &mut Ctx,
    node: NodeId,
    mesh: &Mesh,
    bone_index: Option<&HashMap<String, usize>>,
    morph_target: bool,
    id_hint: &str,
    name: &str,
) -> (MeshData, Prims) {
    let vertex_groups = &ctx.scene.nodes[node].vertex_groups;
    let prims = Prims::build(
        mesh,
        vertex_groups,
        bone_index,
        ctx.config.tangent_arrays,
        !morph_target,
    );

    // Resolve materials first; this writes their effects too.
    let mut materials: Vec<Option<String>> = Vec::with_capacity(prims.buckets.len());
    for bucket in &prims.buckets {
        let material = mesh.materials.get(bucket.material_slot).and_then(|&m| m);
        match material {
            Some(material_id) if material_id < ctx.scene.materials.len() => {
                materials.push(Some(export_material(ctx, material_id)));
            }
            _ => {
                debug!("mesh {}: no material in slot {}", mesh.name, bucket.material_slot);
                materials.push(None);
            }
        }
    }

    let meshid = ctx.namer.get_fresh_name_with(id_hint, &SOURCE_SUFFIXES);
    let uv_ids: Vec<String> = prims.uv_names.iter()
        .map(|uv_name| {
            let hint = format!("{}-texcoord-{}", meshid, uv_name);
            ctx.namer.get_fresh_name_with(hint, &["-array"])
        })
        .collect();

    let mut xml = Section::Geometries.buffer();
    xml!(xml;
        <geometry id=[(meshid)] name=[ESC(name)]>;
            <mesh>;
    );
    write_sources(&mut xml, &meshid, mesh, &prims, &uv_ids);
    for (bucket, material) in prims.buckets.iter().zip(materials.iter()) {
        write_bucket(&mut xml, &meshid, bucket, material.as_ref(), &prims, &uv_ids, ctx.config.triangulate);
    }
    xml!(xml;
            /mesh>;
        /geometry>;
    );
    ctx.sections.push(Section::Geometries, &xml);

    let mut material_assign: Vec<(String, String)> = vec![];
    for material in materials.into_iter().flatten() {
        if !material_assign.iter().any(|(id, _)| *id == material) {
            material_assign.push((material.clone(), material));
        }
    }

    let data = MeshData {
        id: meshid,
        material_assign,
        skin_id: None,
        morph_id: None,
    };
    (data, prims)
}

fn write_sources(xml: &mut Xml, meshid: &str, mesh: &Mesh, prims: &Prims, uv_ids: &[String]) {
    let verts = &prims.vertices;

    // Positions
    xml!(xml;
        <source id=[(meshid)"-positions"]>;
            <float_array id=[(meshid)"-positions-array"] count=[(3 * verts.len())]>
            for v in (verts) {
                (v.co.x)" "(v.co.y)" "(v.co.z)" "
            }
            </float_array>;
            <technique_common>;
                <accessor source=["#"(meshid)"-positions-array"] count=[(verts.len())] stride=["3"]>;
                    <param name=["X"] type=["float"]/>;
                    <param name=["Y"] type=["float"]/>;
                    <param name=["Z"] type=["float"]/>;
                /accessor>;
            /technique_common>;
        /source>;
    );

    // Normals, one per loop
    let loops = &mesh.loops;
    xml!(xml;
        <source id=[(meshid)"-normals"]>;
            <float_array id=[(meshid)"-normals-array"] count=[(3 * loops.len())]>
            for l in (loops) {
                (l.normal.x)" "(l.normal.y)" "(l.normal.z)" "
            }
            </float_array>;
            <technique_common>;
                <accessor source=["#"(meshid)"-normals-array"] count=[(loops.len())] stride=["3"]>;
                    <param name=["X"] type=["float"]/>;
                    <param name=["Y"] type=["float"]/>;
                    <param name=["Z"] type=["float"]/>;
                /accessor>;
            /technique_common>;
        /source>;
    );

    if prims.has_tangents {
        for &(what, bitangent) in &[("tangents", false), ("bitangents", true)] {
            let vecs = verts.iter().map(|v| match v.tangent {
                Some(t) if bitangent => t.bitangent,
                Some(t) => t.tangent,
                None => Vector3::new(0.0, 0.0, 0.0),
            });
            xml!(xml;
                <source id=[(meshid)"-"(what)]>;
                    <float_array id=[(meshid)"-"(what)"-array"] count=[(3 * verts.len())]>
                    for t in (vecs) {
                        (t.x)" "(t.y)" "(t.z)" "
                    }
                    </float_array>;
                    <technique_common>;
                        <accessor source=["#"(meshid)"-"(what)"-array"] count=[(verts.len())] stride=["3"]>;
                            <param name=["X"] type=["float"]/>;
                            <param name=["Y"] type=["float"]/>;
                            <param name=["Z"] type=["float"]/>;
                        /accessor>;
                    /technique_common>;
                /source>;
            );
        }
    }

    // UVs, one per loop
    let uv_layers = mesh.uv_layers.iter().filter(|layer| layer.data.len() == loops.len());
    for (layer, uvid) in uv_layers.zip(uv_ids) {
        xml!(xml;
            <source id=[(uvid)] name=[ESC(&layer.name)]>;
                <float_array id=[(uvid)"-array"] count=[(2 * layer.data.len())]>
                for uv in (&layer.data) {
                    (uv[0])" "(uv[1])" "
                }
                </float_array>;
                <technique_common>;
                    <accessor source=["#"(uvid)"-array"] count=[(layer.data.len())] stride=["2"]>;
                        <param name=["S"] type=["float"]/>;
                        <param name=["T"] type=["float"]/>;
                    /accessor>;
                /technique_common>;
            /source>;
        );
    }

    // Colors, one per vertex
    if prims.has_colors {
        xml!(xml;
            <source id=[(meshid)"-colors"]>;
                <float_array id=[(meshid)"-colors-array"] count=[(3 * verts.len())]>
                for v in (verts) {
                    for c in (v.color.iter()) {
                        (c[0])" "(c[1])" "(c[2])" "
                    }
                }
                </float_array>;
                <technique_common>;
                    <accessor source=["#"(meshid)"-colors-array"] count=[(verts.len())] stride=["3"]>;
                        <param name=["R"] type=["float"]/>;
                        <param name=["G"] type=["float"]/>;
                        <param name=["B"] type=["float"]/>;
                    /accessor>;
                /technique_common>;
            /source>;
        );
    }

    xml!(xml;
        <vertices id=[(meshid)"-vertices"]>;
            <input semantic=["POSITION"] source=["#"(meshid)"-positions"]/>;
        /vertices>;
    );
}

fn write_bucket(
    xml: &mut Xml,
    meshid: &str,
    bucket: &Bucket,
    material: Option<&String>,
    prims: &Prims,
    uv_ids: &[String],
    triangulate: bool,
) {
    let num_uvs = prims.uv_names.len();

    if triangulate {
        let num_tris: usize = bucket.faces.iter().map(|f| f.len() - 2).sum();
        match material {
            Some(m) => { xml!(xml; <triangles count=[(num_tris)] material=[(m)]>;); }
            None => { xml!(xml; <triangles count=[(num_tris)]>;); }
        }
        inputs(xml, meshid, prims, uv_ids);
        xml!(xml; <p>);
        for face in &bucket.faces {
            // Fan around the first corner
            for i in 1..face.len() - 1 {
                corner(xml, face[0], num_uvs);
                corner(xml, face[i], num_uvs);
                corner(xml, face[i + 1], num_uvs);
            }
        }
        xml!(xml;
            </p>;
        /triangles>;
        );
    } else {
        match material {
            Some(m) => { xml!(xml; <polygons count=[(bucket.faces.len())] material=[(m)]>;); }
            None => { xml!(xml; <polygons count=[(bucket.faces.len())]>;); }
        }
        inputs(xml, meshid, prims, uv_ids);
        for face in &bucket.faces {
            xml!(xml; <p>);
            for &c in face {
                corner(xml, c, num_uvs);
            }
            xml!(xml; </p>;);
        }
        xml!(xml; /polygons>;);
    }
}

fn inputs(xml: &mut Xml, meshid: &str, prims: &Prims, uv_ids: &[String]) {
    xml!(xml;
        <input semantic=["VERTEX"] source=["#"(meshid)"-vertices"] offset=["0"]/>;
        <input semantic=["NORMAL"] source=["#"(meshid)"-normals"] offset=["1"]/>;
        for (i, uvid) in (uv_ids.iter().enumerate()) {
            <input semantic=["TEXCOORD"] source=["#"(uvid)] offset=[(2 + i)] set=[(i)]/>;
        }
        if (prims.has_colors) {
            <input semantic=["COLOR"] source=["#"(meshid)"-colors"] offset=["0"]/>;
        }
        if (prims.has_tangents) {
            <input semantic=["TEXTANGENT"] source=["#"(meshid)"-tangents"] offset=["0"] set=["0"]/>;
            <input semantic=["TEXBINORMAL"] source=["#"(meshid)"-bitangents"] offset=["0"] set=["0"]/>;
        }
    );
}

fn corner(xml: &mut Xml, (v, l): Corner, num_uvs: usize) {
    xml!(xml;
        (v)" "(l)" "
        for _ in (0..num_uvs) {
            (l)" "
        }
    );
}


#[cfg(test)]
pub(super) fn quad_mesh() -> Mesh {
    use cgmath::vec3;
    use crate::scene::MeshVertex;

    let mut mesh = Mesh::new("Quad");
    for &(x, y) in &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
        mesh.vertices.push(MeshVertex { co: Point3::new(x, y, 0.0), groups: vec![] });
    }
    mesh.add_polygon(&[0, 1, 2, 3], vec3(0.0, 0.0, 1.0), 0);
    mesh
}

#[cfg(test)]
fn export_quad(config: &crate::config::ExportConfig, mesh: &Mesh) -> (MeshData, String) {
    use crate::scene::{Node, Scene};
    use std::path::Path;

    let mut scene = Scene::new("Scene");
    scene.add_node(Node::new("Quad"), None);
    let mut ctx = Ctx::new(&scene, config, Path::new("out.dae"));
    let (data, _) = export_geometry(&mut ctx, 0, mesh, None, false, "Quad", "Quad");
    (data, ctx.sections.get(Section::Geometries).to_string())
}

#[test]
fn test_quad_as_polygon() {
    let config = Default::default();
    let (data, xml) = export_quad(&config, &quad_mesh());

    assert_eq!(data.id, "Quad");
    assert!(data.material_assign.is_empty());
    assert!(xml.contains(r#"<float_array id="Quad-positions-array" count="12">"#));
    assert!(xml.contains(r##"<accessor source="#Quad-positions-array" count="4" stride="3">"##));
    assert!(xml.contains(r##"<accessor source="#Quad-normals-array" count="4" stride="3">"##));
    assert!(xml.contains(r#"<polygons count="1">"#));
    assert!(xml.contains("<p>0 0 1 1 2 2 3 3 </p>"));
    assert!(!xml.contains("material="));
}

#[test]
fn test_quad_triangulated() {
    let config = crate::config::ExportConfig { triangulate: true, ..Default::default() };
    let (_, xml) = export_quad(&config, &quad_mesh());

    assert!(xml.contains(r#"<triangles count="2">"#));
    assert!(xml.contains("<p>0 0 1 1 2 2 0 0 2 2 3 3 </p>"));
    assert!(!xml.contains("<polygons"));
}

#[test]
fn test_shared_corners_are_merged() {
    use cgmath::vec3;

    // Two triangles making up the quad: 6 loops, 4 distinct corners
    let mut mesh = quad_mesh();
    mesh.loops.clear();
    mesh.polygons.clear();
    mesh.add_polygon(&[0, 1, 2], vec3(0.0, 0.0, 1.0), 0);
    mesh.add_polygon(&[0, 2, 3], vec3(0.0, 0.0, 1.0), 0);

    let prims = Prims::build(&mesh, &[], None, false, true);
    assert_eq!(prims.vertices.len(), 4);
    let prims = Prims::build(&mesh, &[], None, false, false);
    assert_eq!(prims.vertices.len(), 6);
}

#[test]
fn test_degenerate_faces_dropped() {
    use cgmath::vec3;

    let mut mesh = quad_mesh();
    mesh.add_polygon(&[0, 1], vec3(0.0, 0.0, 1.0), 1);
    let prims = Prims::build(&mesh, &[], None, false, true);
    assert_eq!(prims.buckets.len(), 1);
    assert_eq!(prims.buckets[0].faces.len(), 1);
}

#[test]
fn test_weights_below_threshold_skipped() {
    use crate::scene::VertexGroupWeight;

    let mut mesh = quad_mesh();
    mesh.vertices[0].groups = vec![
        VertexGroupWeight { group: 0, weight: 0.5 },
        VertexGroupWeight { group: 1, weight: 0.0005 },
        VertexGroupWeight { group: 7, weight: 0.5 }, // stale
    ];
    let groups = vec!["Root".to_string(), "Tip".to_string()];
    let mut bone_index = HashMap::new();
    bone_index.insert("Root".to_string(), 0);
    bone_index.insert("Tip".to_string(), 1);

    let prims = Prims::build(&mesh, &groups, Some(&bone_index), false, true);
    assert_eq!(&prims.vertices[0].bones[..], &[0]);
    assert_eq!(&prims.vertices[0].weights[..], &[0.5]);
    assert!(prims.vertices[1].bones.is_empty());
}

#[test]
fn test_material_buckets() {
    use cgmath::vec3;
    use crate::scene::{Material, Node, Scene};
    use std::path::Path;

    let mut scene = Scene::new("Scene");
    scene.add_node(Node::new("Quad"), None);
    let hull = scene.add_material(Material::new("Hull"));

    let mut mesh = quad_mesh();
    mesh.materials = vec![Some(hull), None];
    mesh.add_polygon(&[0, 2, 3], vec3(0.0, 0.0, 1.0), 1);
    mesh.add_polygon(&[0, 1, 3], vec3(0.0, 0.0, 1.0), 0);

    let config = Default::default();
    let mut ctx = Ctx::new(&scene, &config, Path::new("out.dae"));
    let (data, _) = export_geometry(&mut ctx, 0, &mesh, None, false, "Quad", "Quad");
    let xml = ctx.sections.get(Section::Geometries);

    assert_eq!(data.material_assign, vec![("Hull".to_string(), "Hull".to_string())]);
    assert!(xml.contains(r#"<polygons count="2" material="Hull">"#));
    assert!(xml.contains(r#"<polygons count="1">"#));
}
