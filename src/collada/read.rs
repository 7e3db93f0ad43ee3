//! Reading back the COLLADA dialect `write` produces.
//!
//! `read_str` pulls the parts of a document we care about into plain
//! structs, checking accessor counts against the data they cover as it
//! goes. `Document::to_scene` then rebuilds a `Scene` from them: the node
//! tree, mesh geometry, material slots, armatures and skin weights, and
//! spline curves.
//!
//! Anything the exporter never writes (lines, instance_node, sampler
//! newparams...) is ignored.

use cgmath::{Deg, InnerSpace, Matrix, Matrix4, Point3, SquareMatrix, Vector3, vec3};
use roxmltree::Node as XmlNode;
use std::collections::HashMap;
use std::path::PathBuf;
use crate::errors::{Error, Result};
use crate::scene::{Armature, BezierPoint, BoneId, Curve, CurveId, CurvePoint, Image, ImageId};
use crate::scene::{Loop, Material, MaterialId, Mesh, MeshId, MeshVertex, Node, NodeId, Payload};
use crate::scene::{Polygon, Scene, Spline, Texture, TextureKind, TextureSlot, Transform};
use crate::scene::{UvLayer, VertexGroupWeight};
use crate::util::math::{to_euler, to_translation};

#[derive(Debug, Clone, Default)]
pub struct Document {
    pub up_axis: String,
    /// Meters per unit.
    pub unit: f64,
    pub images: Vec<ImageDef>,
    pub materials: Vec<MaterialDef>,
    pub effects: Vec<EffectDef>,
    pub geometries: Vec<GeometryDef>,
    pub controllers: Vec<ControllerDef>,
    pub visual_scene: Option<VisualSceneDef>,
    pub channels: Vec<ChannelDef>,
    pub clips: Vec<ClipDef>,
    /// ID of the <visual_scene> the <scene> instances.
    pub scene_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ImageDef {
    pub id: String,
    pub name: String,
    pub init_from: String,
}

#[derive(Debug, Clone)]
pub struct MaterialDef {
    pub id: String,
    pub name: String,
    /// ID of the instanced <effect>.
    pub effect: String,
}

#[derive(Debug, Clone)]
pub struct EffectDef {
    pub id: String,
    pub diffuse: Option<Diffuse>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Diffuse {
    Color([f64; 4]),
    /// ID of the sampled image.
    Texture(String),
}

/// A <source>, with the array its accessor reads.
#[derive(Debug, Clone, Default)]
pub struct SourceDef {
    pub id: String,
    pub name: Option<String>,
    pub count: usize,
    pub stride: usize,
    pub params: Vec<String>,
    pub floats: Vec<f64>,
    /// Contents of a Name_array or IDREF_array.
    pub names: Vec<String>,
}

impl SourceDef {
    /// The `i`th element of a float source.
    pub fn item(&self, i: usize) -> Result<&[f64]> {
        let range = i * self.stride..(i + 1) * self.stride;
        match self.floats.get(range) {
            Some(item) if i < self.count => Ok(item),
            _ => bad_dae!("index {} out of range for <source id=\"{}\">", i, self.id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InputDef {
    pub semantic: String,
    /// ID of the referenced source (or <vertices>).
    pub source: String,
    pub offset: usize,
    pub set: Option<usize>,
}

/// A <triangles>, <polygons>, or <polylist> block.
#[derive(Debug, Clone)]
pub struct PrimitiveDef {
    pub kind: String,
    pub count: usize,
    pub material: Option<String>,
    pub inputs: Vec<InputDef>,
    pub vcount: Vec<usize>,
    /// One entry per <p>.
    pub p: Vec<Vec<usize>>,
}

impl PrimitiveDef {
    /// Number of indices per corner.
    pub fn stride(&self) -> usize {
        self.inputs.iter().map(|i| i.offset).max().map_or(1, |m| m + 1)
    }

    pub fn input(&self, semantic: &str) -> Option<&InputDef> {
        self.inputs.iter().find(|i| i.semantic == semantic)
    }

    /// Splits the index lists into faces. Each face holds `stride()` indices
    /// per corner.
    pub fn faces(&self) -> Result<Vec<&[usize]>> {
        let stride = self.stride();
        let first: &[usize] = self.p.first().map(|p| &p[..]).unwrap_or(&[]);
        let faces: Vec<&[usize]> = match self.kind.as_str() {
            "triangles" => {
                check!(first.len() == self.count * 3 * stride)?;
                first.chunks(3 * stride).collect()
            }
            "polygons" => self.p.iter().map(|p| &p[..]).collect(),
            "polylist" => {
                let mut faces = Vec::with_capacity(self.vcount.len());
                let mut start = 0;
                for &n in &self.vcount {
                    let end = start + n * stride;
                    check!(end <= first.len())?;
                    faces.push(&first[start..end]);
                    start = end;
                }
                faces
            }
            _ => bad_dae!("unsupported primitive <{}>", self.kind),
        };
        check!(faces.len() == self.count)?;
        for face in &faces {
            check!(face.len() % stride == 0)?;
        }
        Ok(faces)
    }
}

#[derive(Debug, Clone)]
pub struct GeometryDef {
    pub id: String,
    pub name: String,
    pub sources: Vec<SourceDef>,
    /// ID of the <vertices> element.
    pub vertices_id: Option<String>,
    /// Inputs of <vertices>, or of <control_vertices> for a spline.
    pub vertices: Vec<InputDef>,
    pub primitives: Vec<PrimitiveDef>,
    pub spline: bool,
}

impl GeometryDef {
    pub fn source(&self, id: &str) -> Result<&SourceDef> {
        match self.sources.iter().find(|s| s.id == id) {
            Some(s) => Ok(s),
            None => bad_dae!("geometry {} has no source {}", self.id, id),
        }
    }

    /// The source a <vertices>-level input with the given semantic reads.
    fn vertex_source(&self, semantic: &str) -> Result<Option<&SourceDef>> {
        self.vertices.iter()
            .find(|i| i.semantic == semantic)
            .map(|i| self.source(&i.source))
            .transpose()
    }
}

#[derive(Debug, Clone)]
pub struct ControllerDef {
    pub id: String,
    pub kind: ControllerKind,
}

#[derive(Debug, Clone)]
pub enum ControllerKind {
    Skin(SkinDef),
    Morph(MorphDef),
}

#[derive(Debug, Clone)]
pub struct SkinDef {
    /// ID of the skinned geometry or morph.
    pub source: String,
    pub bind_shape_matrix: Matrix4<f64>,
    /// Joint SIDs.
    pub joints: Vec<String>,
    pub inv_bind_count: usize,
    pub weights: Vec<f64>,
    pub vcount: Vec<usize>,
    pub v: Vec<usize>,
    pub joint_offset: usize,
    pub weight_offset: usize,
    /// Number of indices per influence in `v`.
    pub stride: usize,
}

impl SkinDef {
    /// (joint index, weight) pairs for each vertex.
    pub fn influences(&self) -> Result<Vec<Vec<(usize, f64)>>> {
        let total: usize = self.vcount.iter().sum();
        check!(total * self.stride == self.v.len())?;

        let mut pairs = self.v.chunks(self.stride);
        let mut influences = Vec::with_capacity(self.vcount.len());
        for &n in &self.vcount {
            let mut infl = Vec::with_capacity(n);
            for pair in pairs.by_ref().take(n) {
                let joint = pair[self.joint_offset];
                check!(joint < self.joints.len())?;
                let weight = match self.weights.get(pair[self.weight_offset]) {
                    Some(&w) => w,
                    None => bad_dae!("weight index {} out of range", pair[self.weight_offset]),
                };
                infl.push((joint, weight));
            }
            influences.push(infl);
        }
        Ok(influences)
    }
}

#[derive(Debug, Clone)]
pub struct MorphDef {
    pub source: String,
    pub method: String,
    /// IDs of the target geometries.
    pub targets: Vec<String>,
    pub weights: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct VisualSceneDef {
    pub id: String,
    pub name: String,
    pub nodes: Vec<NodeDef>,
}

#[derive(Debug, Clone, Default)]
pub struct NodeDef {
    pub id: Option<String>,
    pub name: Option<String>,
    pub sid: Option<String>,
    pub joint: bool,
    pub translate: Option<Vector3<f64>>,
    /// (axis, angle in degrees), in document order.
    pub rotations: Vec<(Vector3<f64>, f64)>,
    pub scale: Option<Vector3<f64>>,
    pub matrix: Option<Matrix4<f64>>,
    pub instance: Option<InstanceDef>,
    pub children: Vec<NodeDef>,
}

impl NodeDef {
    pub fn name(&self) -> &str {
        self.name.as_ref()
            .or(self.id.as_ref())
            .map_or("Node", |s| s.as_str())
    }

    pub fn local_matrix(&self) -> Matrix4<f64> {
        if let Some(m) = self.matrix {
            return m;
        }
        let mut m = Matrix4::identity();
        if let Some(t) = self.translate {
            m = m * Matrix4::from_translation(t);
        }
        for &(axis, angle) in &self.rotations {
            if axis.magnitude2() > 0.0 {
                m = m * Matrix4::from_axis_angle(axis.normalize(), Deg(angle));
            }
        }
        if let Some(s) = self.scale {
            m = m * Matrix4::from_nonuniform_scale(s.x, s.y, s.z);
        }
        m
    }

    pub fn transform(&self) -> Transform {
        let m = self.local_matrix();
        Transform {
            location: to_translation(&m),
            rotation: to_euler(&m),
            scale: vec3(
                m.x.truncate().magnitude(),
                m.y.truncate().magnitude(),
                m.z.truncate().magnitude(),
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstanceDef {
    /// Tag name, eg. `instance_controller`.
    pub kind: String,
    pub url: String,
    pub skeletons: Vec<String>,
    /// (symbol, material ID) bindings.
    pub materials: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct ChannelDef {
    pub target: String,
    pub times: Vec<f64>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct ClipDef {
    pub name: String,
    pub start: f64,
    pub end: f64,
    /// IDs of the instanced <animation>s.
    pub animations: Vec<String>,
}

/// Parses a COLLADA document.
pub fn read_str(s: &str) -> Result<Document> {
    let xml = roxmltree::Document::parse(s)?;
    let root = xml.root_element();
    if !root.has_tag_name("COLLADA") {
        bad_dae!("root element is <{}>, not <COLLADA>", root.tag_name().name());
    }

    let mut doc = Document {
        up_axis: "Y_UP".to_string(),
        unit: 1.0,
        ..Default::default()
    };

    for el in root.children().filter(|n| n.is_element()) {
        match el.tag_name().name() {
            "asset" => read_asset(&mut doc, el)?,
            "library_images" => {
                for n in elements(el, "image") {
                    doc.images.push(read_image(n)?);
                }
            }
            "library_materials" => {
                for n in elements(el, "material") {
                    doc.materials.push(read_material(n)?);
                }
            }
            "library_effects" => {
                for n in elements(el, "effect") {
                    doc.effects.push(read_effect(n)?);
                }
            }
            "library_geometries" => {
                for n in elements(el, "geometry") {
                    doc.geometries.push(read_geometry(n)?);
                }
            }
            "library_controllers" => {
                for n in elements(el, "controller") {
                    doc.controllers.push(read_controller(n)?);
                }
            }
            "library_visual_scenes" => {
                for n in elements(el, "visual_scene") {
                    if doc.visual_scene.is_some() {
                        debug!("ignoring extra visual scene {:?}", n.attribute("id"));
                        continue;
                    }
                    doc.visual_scene = Some(read_visual_scene(n)?);
                }
            }
            "library_animations" => {
                for n in elements(el, "animation") {
                    read_animation(&mut doc.channels, n)?;
                }
            }
            "library_animation_clips" => {
                for n in elements(el, "animation_clip") {
                    doc.clips.push(read_clip(n)?);
                }
            }
            "scene" => {
                doc.scene_url = child(el, "instance_visual_scene")
                    .and_then(|n| n.attribute("url"))
                    .map(url_id);
            }
            tag => trace!("skipping <{}>", tag),
        }
    }

    Ok(doc)
}

fn elements<'a, 'i: 'a>(node: XmlNode<'a, 'i>, tag: &'static str) -> impl Iterator<Item = XmlNode<'a, 'i>> {
    node.children().filter(move |n| n.has_tag_name(tag))
}

fn child<'a, 'i: 'a>(node: XmlNode<'a, 'i>, tag: &str) -> Option<XmlNode<'a, 'i>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn attr(node: XmlNode, name: &str) -> Result<String> {
    match node.attribute(name) {
        Some(v) => Ok(v.to_string()),
        None => bad_dae!("<{}> is missing its {} attribute", node.tag_name().name(), name),
    }
}

fn text<'a>(node: XmlNode<'a, '_>) -> &'a str {
    node.text().unwrap_or("")
}

fn url_id(url: &str) -> String {
    url.trim_start_matches('#').to_string()
}

fn parse_floats(s: &str) -> Result<Vec<f64>> {
    s.split_whitespace()
        .map(|x| x.parse::<f64>().map_err(Error::from))
        .collect()
}

fn parse_uints(s: &str) -> Result<Vec<usize>> {
    s.split_whitespace()
        .map(|x| x.parse::<usize>().map_err(Error::from))
        .collect()
}

fn parse_vec3(s: &str) -> Result<Vector3<f64>> {
    let v = parse_floats(s)?;
    check!(v.len() == 3)?;
    Ok(vec3(v[0], v[1], v[2]))
}

/// Matrices are stored row-major.
fn parse_matrix(s: &str) -> Result<Matrix4<f64>> {
    let f = parse_floats(s)?;
    check!(f.len() == 16)?;
    let m = Matrix4::new(
        f[0], f[1], f[2], f[3],
        f[4], f[5], f[6], f[7],
        f[8], f[9], f[10], f[11],
        f[12], f[13], f[14], f[15],
    );
    Ok(m.transpose())
}

fn read_asset(doc: &mut Document, el: XmlNode) -> Result<()> {
    if let Some(n) = child(el, "up_axis") {
        doc.up_axis = text(n).trim().to_string();
    }
    if let Some(meter) = child(el, "unit").and_then(|n| n.attribute("meter")) {
        doc.unit = meter.trim().parse()?;
    }
    Ok(())
}

fn read_image(n: XmlNode) -> Result<ImageDef> {
    let id = attr(n, "id")?;
    let name = n.attribute("name").map_or_else(|| id.clone(), String::from);
    let init_from = match child(n, "init_from") {
        Some(init) => text(init).trim().to_string(),
        None => bad_dae!("image {} has no <init_from>", id),
    };
    Ok(ImageDef { id, name, init_from })
}

fn read_material(n: XmlNode) -> Result<MaterialDef> {
    let id = attr(n, "id")?;
    let name = n.attribute("name").map_or_else(|| id.clone(), String::from);
    let effect = match child(n, "instance_effect") {
        Some(inst) => url_id(&attr(inst, "url")?),
        None => bad_dae!("material {} has no <instance_effect>", id),
    };
    Ok(MaterialDef { id, name, effect })
}

fn read_effect(n: XmlNode) -> Result<EffectDef> {
    let id = attr(n, "id")?;
    let value = n.descendants()
        .find(|d| d.has_tag_name("diffuse"))
        .and_then(|d| d.children().find(|c| c.is_element()));
    let diffuse = match value {
        Some(c) if c.has_tag_name("color") => {
            let f = parse_floats(text(c))?;
            check!(f.len() == 3 || f.len() == 4)?;
            let alpha = f.get(3).cloned().unwrap_or(1.0);
            Some(Diffuse::Color([f[0], f[1], f[2], alpha]))
        }
        Some(c) if c.has_tag_name("texture") => Some(Diffuse::Texture(attr(c, "texture")?)),
        _ => None,
    };
    Ok(EffectDef { id, diffuse })
}

fn read_source(n: XmlNode) -> Result<SourceDef> {
    let id = attr(n, "id")?;
    let accessor = match n.descendants().find(|d| d.has_tag_name("accessor")) {
        Some(a) => a,
        None => bad_dae!("source {} has no <accessor>", id),
    };
    let count: usize = attr(accessor, "count")?.parse()?;
    let stride: usize = match accessor.attribute("stride") {
        Some(s) => s.parse()?,
        None => 1,
    };
    check!(stride > 0)?;
    let params = elements(accessor, "param")
        .filter_map(|p| p.attribute("name"))
        .map(String::from)
        .collect();

    let name = n.attribute("name").map(String::from);
    let mut source = SourceDef { id, name, count, stride, params, ..Default::default() };
    if let Some(array) = child(n, "float_array") {
        source.floats = parse_floats(text(array))?;
        if let Some(c) = declared_count(array)? {
            check!(c == source.floats.len())?;
        }
        check!(source.floats.len() >= count * stride)?;
    } else if let Some(array) = child(n, "Name_array").or_else(|| child(n, "IDREF_array")) {
        source.names = text(array).split_whitespace().map(String::from).collect();
        if let Some(c) = declared_count(array)? {
            check!(c == source.names.len())?;
        }
        check!(source.names.len() >= count * stride)?;
    } else {
        bad_dae!("source {} has no supported array", source.id);
    }
    Ok(source)
}

/// The count an array declares for itself, if any.
fn declared_count(array: XmlNode) -> Result<Option<usize>> {
    Ok(array.attribute("count").map(|c| c.parse::<usize>()).transpose()?)
}

fn read_inputs(n: XmlNode) -> Result<Vec<InputDef>> {
    elements(n, "input")
        .map(|input| -> Result<InputDef> {
            Ok(InputDef {
                semantic: attr(input, "semantic")?,
                source: url_id(&attr(input, "source")?),
                offset: input.attribute("offset").map(|o| o.parse::<usize>()).transpose()?.unwrap_or(0),
                set: input.attribute("set").map(|s| s.parse::<usize>()).transpose()?,
            })
        })
        .collect()
}

fn read_geometry(n: XmlNode) -> Result<GeometryDef> {
    let id = attr(n, "id")?;
    let name = n.attribute("name").map_or_else(|| id.clone(), String::from);
    let mut geom = GeometryDef {
        id,
        name,
        sources: vec![],
        vertices_id: None,
        vertices: vec![],
        primitives: vec![],
        spline: false,
    };

    let body = match child(n, "mesh").or_else(|| child(n, "spline")) {
        Some(body) => body,
        None => bad_dae!("geometry {} has neither <mesh> nor <spline>", geom.id),
    };
    geom.spline = body.has_tag_name("spline");

    for el in body.children().filter(|c| c.is_element()) {
        match el.tag_name().name() {
            "source" => geom.sources.push(read_source(el)?),
            "vertices" | "control_vertices" => {
                geom.vertices_id = el.attribute("id").map(String::from);
                geom.vertices = read_inputs(el)?;
            }
            "triangles" | "polygons" | "polylist" => geom.primitives.push(read_primitive(el)?),
            tag => debug!("geometry {}: skipping <{}>", geom.id, tag),
        }
    }

    for input in &geom.vertices {
        geom.source(&input.source)?;
    }
    Ok(geom)
}

fn read_primitive(el: XmlNode) -> Result<PrimitiveDef> {
    let prim = PrimitiveDef {
        kind: el.tag_name().name().to_string(),
        count: attr(el, "count")?.parse()?,
        material: el.attribute("material").map(String::from),
        inputs: read_inputs(el)?,
        vcount: match child(el, "vcount") {
            Some(v) => parse_uints(text(v))?,
            None => vec![],
        },
        p: elements(el, "p")
            .map(|p| parse_uints(text(p)))
            .collect::<Result<Vec<_>>>()?,
    };
    prim.faces()?;
    Ok(prim)
}

fn read_controller(n: XmlNode) -> Result<ControllerDef> {
    let id = attr(n, "id")?;
    let kind = if let Some(skin) = child(n, "skin") {
        ControllerKind::Skin(read_skin(skin)?)
    } else if let Some(morph) = child(n, "morph") {
        ControllerKind::Morph(read_morph(morph)?)
    } else {
        bad_dae!("controller {} has neither <skin> nor <morph>", id)
    };
    Ok(ControllerDef { id, kind })
}

fn find_source<'s>(sources: &'s [SourceDef], inputs: &[InputDef], semantic: &str) -> Result<&'s SourceDef> {
    let input = match inputs.iter().find(|i| i.semantic == semantic) {
        Some(input) => input,
        None => bad_dae!("no {} input", semantic),
    };
    match sources.iter().find(|s| s.id == input.source) {
        Some(s) => Ok(s),
        None => bad_dae!("no source {} for {} input", input.source, semantic),
    }
}

fn read_skin(skin: XmlNode) -> Result<SkinDef> {
    let source = url_id(&attr(skin, "source")?);
    let bind_shape_matrix = match child(skin, "bind_shape_matrix") {
        Some(m) => parse_matrix(text(m))?,
        None => Matrix4::identity(),
    };
    let sources = elements(skin, "source")
        .map(read_source)
        .collect::<Result<Vec<_>>>()?;

    let joints_el = match child(skin, "joints") {
        Some(j) => j,
        None => bad_dae!("skin of {} has no <joints>", source),
    };
    let joint_inputs = read_inputs(joints_el)?;
    let joints = find_source(&sources, &joint_inputs, "JOINT")?.names.clone();
    let inv_bind = find_source(&sources, &joint_inputs, "INV_BIND_MATRIX")?;
    check!(inv_bind.stride == 16)?;
    let inv_bind_count = inv_bind.count;

    let vw = match child(skin, "vertex_weights") {
        Some(vw) => vw,
        None => bad_dae!("skin of {} has no <vertex_weights>", source),
    };
    let count: usize = attr(vw, "count")?.parse()?;
    let inputs = read_inputs(vw)?;
    let weights = find_source(&sources, &inputs, "WEIGHT")?.floats.clone();
    let offset = |semantic: &str| inputs.iter().find(|i| i.semantic == semantic).map(|i| i.offset);
    let (joint_offset, weight_offset) = match (offset("JOINT"), offset("WEIGHT")) {
        (Some(j), Some(w)) => (j, w),
        _ => bad_dae!("vertex weights of {} need JOINT and WEIGHT inputs", source),
    };
    let stride = inputs.iter().map(|i| i.offset).max().map_or(1, |m| m + 1);

    let vcount = child(vw, "vcount").map_or(Ok(vec![]), |v| parse_uints(text(v)))?;
    let v = child(vw, "v").map_or(Ok(vec![]), |v| parse_uints(text(v)))?;
    check!(vcount.len() == count)?;

    let skin = SkinDef {
        source,
        bind_shape_matrix,
        joints,
        inv_bind_count,
        weights,
        vcount,
        v,
        joint_offset,
        weight_offset,
        stride,
    };
    skin.influences()?;
    Ok(skin)
}

fn read_morph(morph: XmlNode) -> Result<MorphDef> {
    let source = url_id(&attr(morph, "source")?);
    let method = morph.attribute("method").unwrap_or("NORMALIZED").to_string();
    let sources = elements(morph, "source")
        .map(read_source)
        .collect::<Result<Vec<_>>>()?;
    let inputs = match child(morph, "targets") {
        Some(t) => read_inputs(t)?,
        None => bad_dae!("morph of {} has no <targets>", source),
    };
    let targets = find_source(&sources, &inputs, "MORPH_TARGET")?.names.clone();
    let weights = find_source(&sources, &inputs, "MORPH_WEIGHT")?.floats.clone();
    check!(targets.len() == weights.len())?;
    Ok(MorphDef { source, method, targets, weights })
}

fn read_visual_scene(n: XmlNode) -> Result<VisualSceneDef> {
    let id = attr(n, "id")?;
    let name = n.attribute("name").map_or_else(|| id.clone(), String::from);
    let nodes = elements(n, "node")
        .map(read_node)
        .collect::<Result<Vec<_>>>()?;
    Ok(VisualSceneDef { id, name, nodes })
}

fn read_node(n: XmlNode) -> Result<NodeDef> {
    let mut def = NodeDef {
        id: n.attribute("id").map(String::from),
        name: n.attribute("name").map(String::from),
        sid: n.attribute("sid").map(String::from),
        joint: n.attribute("type") == Some("JOINT"),
        ..Default::default()
    };

    for el in n.children().filter(|c| c.is_element()) {
        match el.tag_name().name() {
            "translate" => def.translate = Some(parse_vec3(text(el))?),
            "rotate" => {
                let r = parse_floats(text(el))?;
                check!(r.len() == 4)?;
                def.rotations.push((vec3(r[0], r[1], r[2]), r[3]));
            }
            "scale" => def.scale = Some(parse_vec3(text(el))?),
            "matrix" => def.matrix = Some(parse_matrix(text(el))?),
            "instance_geometry" | "instance_controller" | "instance_camera" | "instance_light" => {
                def.instance = Some(InstanceDef {
                    kind: el.tag_name().name().to_string(),
                    url: url_id(&attr(el, "url")?),
                    skeletons: elements(el, "skeleton")
                        .map(|s| url_id(text(s).trim()))
                        .collect(),
                    materials: el.descendants()
                        .filter(|d| d.has_tag_name("instance_material"))
                        .map(|m| -> Result<(String, String)> {
                            Ok((attr(m, "symbol")?, url_id(&attr(m, "target")?)))
                        })
                        .collect::<Result<Vec<_>>>()?,
                });
            }
            "node" => def.children.push(read_node(el)?),
            _ => {}
        }
    }
    Ok(def)
}

/// Reads the channels of an <animation>, and of any nested ones.
fn read_animation(channels: &mut Vec<ChannelDef>, n: XmlNode) -> Result<()> {
    let sources = elements(n, "source")
        .map(read_source)
        .collect::<Result<Vec<_>>>()?;

    for channel in elements(n, "channel") {
        let sampler_id = url_id(&attr(channel, "source")?);
        let sampler = match elements(n, "sampler").find(|s| s.attribute("id") == Some(&sampler_id[..])) {
            Some(s) => s,
            None => bad_dae!("channel references missing sampler {}", sampler_id),
        };
        let inputs = read_inputs(sampler)?;
        let times = find_source(&sources, &inputs, "INPUT")?.floats.clone();
        let values = find_source(&sources, &inputs, "OUTPUT")?.floats.clone();
        check!(times.len() == values.len())?;
        channels.push(ChannelDef {
            target: attr(channel, "target")?,
            times,
            values,
        });
    }

    for nested in elements(n, "animation") {
        read_animation(channels, nested)?;
    }
    Ok(())
}

fn read_clip(n: XmlNode) -> Result<ClipDef> {
    let float_attr = |name: &str| -> Result<f64> {
        Ok(n.attribute(name).map(|s| s.parse::<f64>()).transpose()?.unwrap_or(0.0))
    };
    Ok(ClipDef {
        name: n.attribute("name").or_else(|| n.attribute("id")).unwrap_or("").to_string(),
        start: float_attr("start")?,
        end: float_attr("end")?,
        animations: elements(n, "instance_animation")
            .map(|i| attr(i, "url").map(|url| url_id(&url)))
            .collect::<Result<Vec<_>>>()?,
    })
}

impl Document {
    pub fn geometry(&self, id: &str) -> Result<&GeometryDef> {
        match self.geometries.iter().find(|g| g.id == id) {
            Some(g) => Ok(g),
            None => bad_dae!("no geometry {}", id),
        }
    }

    /// Follows a chain of controllers down to the geometry at the bottom,
    /// returning it with the outermost skin on the way.
    pub fn resolve_controller(&self, id: &str) -> Result<(&GeometryDef, Option<&SkinDef>)> {
        let mut skin = None;
        let mut url = id;
        for _ in 0..=self.controllers.len() {
            let controller = match self.controllers.iter().find(|c| c.id == url) {
                Some(c) => c,
                None => return Ok((self.geometry(url)?, skin)),
            };
            url = match controller.kind {
                ControllerKind::Skin(ref s) => {
                    skin = skin.or(Some(s));
                    &s.source[..]
                }
                ControllerKind::Morph(ref m) => &m.source[..],
            };
        }
        bad_dae!("controller {} is part of a cycle", id)
    }

    /// Rebuilds a scene from the document's visual scene.
    pub fn to_scene(&self) -> Result<Scene> {
        let name = self.visual_scene.as_ref().map_or("Scene", |vs| &vs.name[..]);
        let mut imp = Importer {
            doc: self,
            scene: Scene::new(name),
            materials: HashMap::new(),
            images: HashMap::new(),
            meshes: HashMap::new(),
            curves: HashMap::new(),
            joint_names: HashMap::new(),
        };
        if let Some(ref vs) = self.visual_scene {
            for def in &vs.nodes {
                imp.add_node(def, None)?;
            }
        }
        Ok(imp.scene)
    }
}

struct Importer<'d> {
    doc: &'d Document,
    scene: Scene,
    materials: HashMap<&'d str, MaterialId>,
    images: HashMap<&'d str, ImageId>,
    meshes: HashMap<&'d str, MeshId>,
    curves: HashMap<&'d str, CurveId>,
    /// Joint SID -> bone name.
    joint_names: HashMap<&'d str, &'d str>,
}

impl<'d> Importer<'d> {
    fn add_node(&mut self, def: &'d NodeDef, parent: Option<NodeId>) -> Result<()> {
        let mut node = Node::new(def.name());
        node.transform = def.transform();

        // A node with joint children is an armature object
        let mut joints = def.children.iter().filter(|c| c.joint).peekable();
        if joints.peek().is_some() {
            let mut arm = Armature::new(def.name());
            for joint in joints {
                self.add_bone(&mut arm, joint, None, Matrix4::identity());
            }
            node.payload = Payload::Armature(self.scene.add_armature(arm));
        } else if let Some(ref inst) = def.instance {
            node.payload = self.instance_payload(inst, &mut node)?;
        }

        let id = self.scene.add_node(node, parent);
        for child in def.children.iter().filter(|c| !c.joint) {
            self.add_node(child, Some(id))?;
        }
        Ok(())
    }

    fn add_bone(&mut self, arm: &mut Armature, def: &'d NodeDef, parent: Option<BoneId>, parent_matrix: Matrix4<f64>) {
        let matrix_local = parent_matrix * def.local_matrix();
        let bone = arm.add_bone(def.name(), parent, matrix_local);
        if let Some(ref sid) = def.sid {
            self.joint_names.insert(sid, def.name());
        }
        for child in &def.children {
            if child.joint {
                self.add_bone(arm, child, Some(bone), matrix_local);
            } else {
                debug!("ignoring node {} parented to joint {}", child.name(), def.name());
            }
        }
    }

    fn instance_payload(&mut self, inst: &'d InstanceDef, node: &mut Node) -> Result<Payload> {
        match inst.kind.as_str() {
            "instance_geometry" => {
                let geom = self.doc.geometry(&inst.url)?;
                if geom.spline {
                    return Ok(Payload::Curve(self.curve(geom)?));
                }
                let mesh = self.mesh(geom, &inst.materials)?;
                Ok(Payload::Mesh { mesh, evaluated: None })
            }
            "instance_controller" => {
                let (geom, skin) = self.doc.resolve_controller(&inst.url)?;
                let mesh = self.mesh(geom, &inst.materials)?;
                if let Some(skin) = skin {
                    self.apply_skin(skin, mesh, node)?;
                }
                Ok(Payload::Mesh { mesh, evaluated: None })
            }
            kind => {
                debug!("{}: not importing <{}>", node.name, kind);
                Ok(Payload::Empty)
            }
        }
    }

    fn mesh(&mut self, geom: &'d GeometryDef, bindings: &'d [(String, String)]) -> Result<MeshId> {
        if let Some(&id) = self.meshes.get(&geom.id[..]) {
            return Ok(id);
        }

        let mut mesh = Mesh::new(&geom.name);
        let positions = match geom.vertex_source("POSITION")? {
            Some(s) => s,
            None => bad_dae!("geometry {} has no POSITION input", geom.id),
        };
        for i in 0..positions.count {
            mesh.vertices.push(MeshVertex { co: point(positions.item(i)?)?, groups: vec![] });
        }

        // One UV layer per TEXCOORD set used anywhere in the geometry
        let mut uv_sets: Vec<usize> = geom.primitives.iter()
            .flat_map(|p| p.inputs.iter())
            .filter(|i| i.semantic == "TEXCOORD")
            .map(|i| i.set.unwrap_or(0))
            .collect();
        uv_sets.sort();
        uv_sets.dedup();
        for (n, &set) in uv_sets.iter().enumerate() {
            let name = geom.primitives.iter()
                .flat_map(|p| p.inputs.iter())
                .find(|i| i.semantic == "TEXCOORD" && i.set.unwrap_or(0) == set)
                .and_then(|i| {
                    let named = geom.sources.iter()
                        .find(|src| src.id == i.source)
                        .and_then(|src| src.name.clone());
                    named.or_else(|| i.source.splitn(2, "-texcoord-").nth(1).map(String::from))
                })
                .unwrap_or_else(|| format!("UVMap{}", n));
            mesh.uv_layers.push(UvLayer { name, data: vec![] });
        }

        for prim in &geom.primitives {
            let material = match prim.material {
                Some(ref symbol) => {
                    let target = bindings.iter()
                        .find(|(sym, _)| sym == symbol)
                        .map_or(&symbol[..], |(_, target)| &target[..]);
                    Some(self.material(target)?)
                }
                None => None,
            };
            let slot = match mesh.materials.iter().position(|&m| m == material) {
                Some(slot) => slot,
                None => {
                    mesh.materials.push(material);
                    mesh.materials.len() - 1
                }
            };

            let vertex_offset = match prim.input("VERTEX") {
                Some(input) => input.offset,
                None => bad_dae!("primitive in geometry {} has no VERTEX input", geom.id),
            };
            let normals = match prim.input("NORMAL") {
                Some(input) => Some((input.offset, geom.source(&input.source)?)),
                None => None,
            };
            let mut uvs = vec![];
            for &set in &uv_sets {
                let input = prim.inputs.iter()
                    .find(|i| i.semantic == "TEXCOORD" && i.set.unwrap_or(0) == set);
                uvs.push(match input {
                    Some(input) => Some((input.offset, geom.source(&input.source)?)),
                    None => None,
                });
            }

            let stride = prim.stride();
            for face in prim.faces()? {
                let loop_start = mesh.loops.len();
                for corner in face.chunks(stride) {
                    let vertex = corner[vertex_offset];
                    check!(vertex < mesh.vertices.len())?;
                    let normal = match normals {
                        Some((off, src)) => {
                            let n = src.item(corner[off])?;
                            check!(n.len() >= 3)?;
                            vec3(n[0], n[1], n[2])
                        }
                        None => vec3(0.0, 0.0, 0.0),
                    };
                    mesh.loops.push(Loop { vertex, normal, tangent: None });
                    for (layer, uv) in mesh.uv_layers.iter_mut().zip(&uvs) {
                        let st = match *uv {
                            Some((off, src)) => {
                                let st = src.item(corner[off])?;
                                check!(st.len() >= 2)?;
                                [st[0], st[1]]
                            }
                            None => [0.0, 0.0],
                        };
                        layer.data.push(st);
                    }
                }
                mesh.polygons.push(Polygon {
                    loop_start,
                    loop_total: mesh.loops.len() - loop_start,
                    material_index: slot,
                });
            }
        }

        let id = self.scene.add_mesh(mesh);
        self.meshes.insert(&geom.id, id);
        Ok(id)
    }

    fn material(&mut self, id: &'d str) -> Result<MaterialId> {
        if let Some(&m) = self.materials.get(id) {
            return Ok(m);
        }
        let def = match self.doc.materials.iter().find(|m| m.id == id) {
            Some(def) => def,
            None => bad_dae!("no material {}", id),
        };

        let mut mat = Material::new(&def.name);
        let diffuse = self.doc.effects.iter()
            .find(|e| e.id == def.effect)
            .and_then(|e| e.diffuse.as_ref());
        match diffuse {
            Some(Diffuse::Color(c)) => {
                mat.diffuse_color = [c[0], c[1], c[2]];
                mat.diffuse_intensity = 1.0;
            }
            Some(Diffuse::Texture(image)) => match self.image(image) {
                Some(image) => {
                    self.scene.textures.push(Texture {
                        name: self.scene.images[image].name.clone(),
                        kind: TextureKind::Image,
                        image: Some(image),
                    });
                    mat.texture_slots.push(TextureSlot {
                        texture: self.scene.textures.len() - 1,
                        enabled: true,
                        use_diffuse: true,
                        ..Default::default()
                    });
                }
                None => warn!("material {}: missing image {}", def.name, image),
            },
            None => {}
        }

        let m = self.scene.add_material(mat);
        self.materials.insert(id, m);
        Ok(m)
    }

    fn image(&mut self, id: &'d str) -> Option<ImageId> {
        if let Some(&i) = self.images.get(id) {
            return Some(i);
        }
        let def = self.doc.images.iter().find(|i| i.id == id)?;
        self.scene.images.push(Image {
            name: def.name.clone(),
            filepath: PathBuf::from(&def.init_from),
        });
        let i = self.scene.images.len() - 1;
        self.images.insert(id, i);
        Some(i)
    }

    fn apply_skin(&mut self, skin: &'d SkinDef, mesh: MeshId, node: &mut Node) -> Result<()> {
        node.vertex_groups = skin.joints.iter()
            .map(|sid| self.joint_names.get(&sid[..]).map_or(&sid[..], |name| *name).to_string())
            .collect();

        let influences = skin.influences()?;
        let mesh = &mut self.scene.meshes[mesh];
        check!(influences.len() <= mesh.vertices.len())?;
        for (vert, infl) in mesh.vertices.iter_mut().zip(influences) {
            vert.groups = infl.into_iter()
                .map(|(group, weight)| VertexGroupWeight { group, weight })
                .collect();
        }
        Ok(())
    }

    /// Consecutive control vertices with the same interpolation become one
    /// spline.
    fn curve(&mut self, geom: &'d GeometryDef) -> Result<CurveId> {
        if let Some(&id) = self.curves.get(&geom.id[..]) {
            return Ok(id);
        }

        let positions = match geom.vertex_source("POSITION")? {
            Some(s) => s,
            None => bad_dae!("spline {} has no POSITION input", geom.id),
        };
        let in_tangents = geom.vertex_source("IN_TANGENT")?;
        let out_tangents = geom.vertex_source("OUT_TANGENT")?;
        let interps = geom.vertex_source("INTERPOLATION")?;
        let tilts = geom.vertex_source("TILT")?;

        let mut splines: Vec<Spline> = vec![];
        for i in 0..positions.count {
            let co = point(positions.item(i)?)?;
            let tilt = match tilts {
                Some(t) => t.item(i)?[0],
                None => 0.0,
            };
            let bezier = interps
                .and_then(|s| s.names.get(i))
                .map_or(false, |interp| interp == "BEZIER");

            if bezier {
                let handle = |src: Option<&SourceDef>| -> Result<Point3<f64>> {
                    match src {
                        Some(src) => point(src.item(i)?),
                        None => Ok(co),
                    }
                };
                let bp = BezierPoint {
                    co,
                    handle_left: handle(in_tangents)?,
                    handle_right: handle(out_tangents)?,
                    tilt,
                };
                match splines.last_mut() {
                    Some(Spline::Bezier(points)) => points.push(bp),
                    _ => splines.push(Spline::Bezier(vec![bp])),
                }
            } else {
                let cp = CurvePoint { co, tilt };
                match splines.last_mut() {
                    Some(Spline::Poly(points)) => points.push(cp),
                    _ => splines.push(Spline::Poly(vec![cp])),
                }
            }
        }

        self.scene.curves.push(Curve { name: geom.name.clone(), splines });
        let id = self.scene.curves.len() - 1;
        self.curves.insert(&geom.id, id);
        Ok(id)
    }
}

fn point(v: &[f64]) -> Result<Point3<f64>> {
    check!(v.len() >= 3)?;
    Ok(Point3::new(v[0], v[1], v[2]))
}


#[cfg(test)]
fn export_and_read(scene: &Scene, config: &crate::config::ExportConfig) -> Document {
    use std::path::Path;
    use crate::host::SnapshotHost;

    let mut host = SnapshotHost::new(scene);
    let s = super::write(scene, &mut host, config, Path::new("out.dae")).unwrap();
    read_str(&s).unwrap()
}

#[test]
fn test_mesh_round_trip() {
    use super::geometry::quad_mesh;

    let mut scene = Scene::new("Scene");
    let mesh = scene.add_mesh(quad_mesh());
    let mut node = Node::new("Plane");
    node.payload = Payload::Mesh { mesh, evaluated: None };
    node.transform = Transform::from_location(vec3(1.0, 2.0, 3.0));
    scene.add_node(node, None);

    let doc = export_and_read(&scene, &Default::default());
    assert_eq!(doc.up_axis, "Z_UP");
    assert_eq!(doc.unit, 1.0);
    assert_eq!(doc.scene_url.as_ref().map(|s| &s[..]), Some("id-scene-1"));

    assert_eq!(doc.geometries.len(), 1);
    let geom = &doc.geometries[0];
    let positions = geom.source(&format!("{}-positions", geom.id)).unwrap();
    assert_eq!((positions.count, positions.stride), (4, 3));
    let normals = geom.source(&format!("{}-normals", geom.id)).unwrap();
    assert_eq!(normals.count, 4);
    assert_eq!(geom.primitives.len(), 1);
    assert_eq!(geom.primitives[0].kind, "polygons");
    assert_eq!(geom.primitives[0].faces().unwrap().len(), 1);

    let back = doc.to_scene().unwrap();
    assert_eq!(back.nodes.len(), 1);
    assert_eq!(back.nodes[0].name, "Plane");
    let loc = back.nodes[0].transform.location;
    assert!((loc - vec3(1.0, 2.0, 3.0)).magnitude() < 1e-9);
    let mesh = match back.nodes[0].payload {
        Payload::Mesh { mesh, .. } => &back.meshes[mesh],
        ref p => panic!("expected a mesh, got {:?}", p),
    };
    assert_eq!(mesh.vertices.len(), 4);
    assert_eq!(mesh.polygons.len(), 1);
    assert_eq!(mesh.polygons[0].loop_total, 4);
    assert_eq!(mesh.loops[2].normal, vec3(0.0, 0.0, 1.0));
    assert_eq!(mesh.vertices[2].co, Point3::new(1.0, 1.0, 0.0));
}

#[test]
fn test_skin_round_trip() {
    use super::geometry::quad_mesh;
    use super::skeleton::rigged_scene;

    let mut scene = rigged_scene();
    let mut quad = quad_mesh();
    quad.vertices[0].groups = vec![VertexGroupWeight { group: 0, weight: 1.0 }];
    quad.vertices[1].groups = vec![
        VertexGroupWeight { group: 0, weight: 0.25 },
        VertexGroupWeight { group: 1, weight: 0.75 },
    ];
    let mesh = scene.add_mesh(quad);
    let mut body = Node::new("Body");
    body.payload = Payload::Mesh { mesh, evaluated: None };
    body.vertex_groups = vec!["Root".to_string(), "Tip".to_string()];
    scene.add_node(body, Some(0));

    let doc = export_and_read(&scene, &Default::default());
    let skin = doc.controllers.iter()
        .filter_map(|c| match c.kind {
            ControllerKind::Skin(ref s) => Some(s),
            _ => None,
        })
        .next()
        .unwrap();
    let total: usize = skin.vcount.iter().sum();
    assert_eq!(total, skin.weights.len());
    assert_eq!(total, skin.v.len() / 2);
    assert_eq!(skin.joints.len(), skin.inv_bind_count);
    assert_eq!(skin.vcount.len(), 4);

    let back = doc.to_scene().unwrap();
    let arm = back.nodes.iter()
        .find_map(|n| match n.payload {
            Payload::Armature(a) => Some(&back.armatures[a]),
            _ => None,
        })
        .unwrap();
    let bones: Vec<&str> = arm.bones.iter().map(|b| &b.name[..]).collect();
    assert_eq!(bones, vec!["Root", "Tip"]);

    let body = back.nodes.iter().find(|n| n.name == "Body").unwrap();
    assert_eq!(body.vertex_groups, vec!["Root", "Tip"]);
    let mesh = match body.payload {
        Payload::Mesh { mesh, .. } => &back.meshes[mesh],
        ref p => panic!("expected a mesh, got {:?}", p),
    };
    assert_eq!(mesh.vertices[1].groups.len(), 2);
    assert_eq!(mesh.vertices[1].groups[1].weight, 0.75);
    assert!(mesh.vertices[3].groups.is_empty());
}

#[test]
fn test_animation_channels_and_clips() {
    let doc = read_str(r##"<?xml version="1.0" encoding="utf-8"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <library_animations>
    <animation id="Mover-anim">
      <animation>
        <source id="t"><float_array id="t-array" count="2">0 1</float_array>
          <technique_common><accessor source="#t-array" count="2" stride="1"><param name="TIME" type="float"/></accessor></technique_common>
        </source>
        <source id="x"><float_array id="x-array" count="2">3 4</float_array>
          <technique_common><accessor source="#x-array" count="2" stride="1"><param name="X" type="float"/></accessor></technique_common>
        </source>
        <sampler id="s"><input semantic="INPUT" source="#t"/><input semantic="OUTPUT" source="#x"/></sampler>
        <channel source="#s" target="Mover/translate.X"/>
      </animation>
    </animation>
  </library_animations>
  <library_animation_clips>
    <animation_clip name="Walk" start="0" end="1.5"><instance_animation url="#Mover-anim"/></animation_clip>
  </library_animation_clips>
</COLLADA>"##).unwrap();

    assert_eq!(doc.channels.len(), 1);
    assert_eq!(doc.channels[0].target, "Mover/translate.X");
    assert_eq!(doc.channels[0].times, vec![0.0, 1.0]);
    assert_eq!(doc.channels[0].values, vec![3.0, 4.0]);
    assert_eq!(doc.clips.len(), 1);
    assert_eq!(doc.clips[0].name, "Walk");
    assert_eq!(doc.clips[0].end, 1.5);
    assert_eq!(doc.clips[0].animations, vec!["Mover-anim"]);
}

#[test]
fn test_malformed_documents() {
    use crate::errors::ErrorKind;

    match read_str("<foo/>") {
        Err(e) => match *e.kind() {
            ErrorKind::BadDae(_) => {}
            ref k => panic!("unexpected error {:?}", k),
        },
        Ok(_) => panic!("expected an error"),
    }

    // Accessor claims more data than the array holds
    let short = r##"<COLLADA><library_geometries><geometry id="g"><mesh>
        <source id="g-positions"><float_array id="a" count="3">0 0 0</float_array>
          <technique_common><accessor source="#a" count="2" stride="3"/></technique_common>
        </source>
    </mesh></geometry></library_geometries></COLLADA>"##;
    assert!(read_str(short).is_err());

    assert!(read_str("<COLLADA><unclosed></COLLADA>").is_err());
}

#[test]
fn test_user_names_round_trip() {
    use std::collections::HashSet;
    use std::path::Path;
    use crate::host::SnapshotHost;
    use crate::scene::ShapeKey;
    use super::geometry::quad_mesh;

    let mut scene = Scene::new("Scene");
    let paint = scene.add_material(Material::new("Hull & Paint"));
    // Same ID as the first material's effect once sanitized
    let trim = scene.add_material(Material::new("Hull___Paint-fx"));

    let mut quad = quad_mesh();
    quad.name = "Hull Mesh".to_string();
    quad.materials = vec![Some(paint), Some(trim)];
    quad.add_polygon(&[0, 2, 3], vec3(0.0, 0.0, 1.0), 1);
    let num_loops = quad.loops.len();
    quad.uv_layers.push(UvLayer { name: "UV Map".to_string(), data: vec![[0.5, 0.5]; num_loops] });
    let basis: Vec<Point3<f64>> = quad.vertices.iter().map(|v| v.co).collect();
    let raised = basis.iter().map(|p| Point3::new(p.x, p.y, 1.0)).collect();
    quad.shape_keys.push(ShapeKey { name: "Basis".to_string(), positions: basis, value: 0.0 });
    quad.shape_keys.push(ShapeKey { name: "Key 1".to_string(), positions: raised, value: 0.0 });
    let mesh = scene.add_mesh(quad);

    let mut node = Node::new("Nav & Light");
    node.payload = Payload::Mesh { mesh, evaluated: None };
    let node = scene.add_node(node, None);
    scene.add_node(Node::new("Dock <1>"), Some(node));

    let config = Default::default();
    let mut host = SnapshotHost::new(&scene);
    let s = super::write(&scene, &mut host, &config, Path::new("out.dae")).unwrap();

    // Well-formed, with every ID unique and free of whitespace
    let xml = roxmltree::Document::parse(&s).unwrap();
    let mut ids = HashSet::new();
    for n in xml.descendants() {
        if let Some(id) = n.attribute("id") {
            assert!(!id.contains(char::is_whitespace), "bad id {:?}", id);
            assert!(ids.insert(id), "duplicate id {:?}", id);
        }
    }
    assert!(ids.contains("Nav___Light"));
    assert!(ids.contains("Hull___Paint-fx"));
    assert!(ids.contains("Hull___Paint-fx1"));

    let doc = read_str(&s).unwrap();
    let morph = doc.controllers.iter()
        .filter_map(|c| match c.kind {
            ControllerKind::Morph(ref m) => Some(m),
            _ => None,
        })
        .next()
        .unwrap();
    assert_eq!(morph.targets, vec!["Hull_Mesh-morph-Key_1"]);
    assert_eq!(doc.geometry("Hull_Mesh-morph-Key_1").unwrap().name, "Key 1");

    let back = doc.to_scene().unwrap();
    let names: Vec<&str> = back.nodes.iter().map(|n| &n.name[..]).collect();
    assert_eq!(names, vec!["Nav & Light", "Dock <1>"]);
    let mats: Vec<&str> = back.materials.iter().map(|m| &m.name[..]).collect();
    assert_eq!(mats, vec!["Hull & Paint", "Hull___Paint-fx"]);
    let mesh = match back.nodes[0].payload {
        Payload::Mesh { mesh, .. } => &back.meshes[mesh],
        ref p => panic!("expected a mesh, got {:?}", p),
    };
    assert_eq!(mesh.uv_layers[0].name, "UV Map");
}
