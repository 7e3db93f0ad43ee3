//! COLLADA 1.4.1 writer (and reader) for the dialect HODOR consumes.
//!
//! Encoders walk the scene and append XML fragments to the `Sections` of a
//! `Ctx`; `write` then stitches the sections into one document in a fixed
//! order.

#[macro_use]
mod xml;
mod animation;
mod controller;
mod geometry;
mod material;
mod nodes;
pub mod read;
mod sections;
mod skeleton;

use cgmath::Matrix4;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use crate::config::ExportConfig;
use crate::errors::{ErrorKind, Result};
use crate::host::SceneHost;
use crate::scene::{ActionId, CurveId, ImageId, MaterialId, MeshId, NodeId, Scene};
use crate::util::namers::UniqueNamer;
use self::sections::{Section, Sections};
use self::xml::Xml;

pub use self::read::{read_str, Document};

/// What a node needs to instance an exported mesh.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    /// ID of the <geometry>.
    pub id: String,
    /// (material ID, symbol) for every material the geometry uses.
    pub material_assign: Vec<(String, String)>,
    /// ID of the skin <controller>, if skinned.
    pub skin_id: Option<String>,
    /// ID of the morph <controller>, if the mesh has shape keys.
    pub morph_id: Option<String>,
}

/// Bone bookkeeping for one exported armature.
#[derive(Debug, Clone)]
pub struct SkinInfo {
    /// Prefix for bone SIDs.
    pub id: String,
    /// Bone name -> joint index.
    pub bone_index: HashMap<String, usize>,
    /// Joint SIDs, in joint index order.
    pub bone_names: Vec<String>,
    /// Inverse bind matrices, in joint index order.
    pub bind_poses: Vec<Matrix4<f64>>,
    /// IDs of the joint <node>s of the root bones.
    pub skeleton_nodes: Vec<String>,
    pub armature_xform: Matrix4<f64>,
}

/// Export state shared by all the encoders.
struct Ctx<'a> {
    scene: &'a Scene,
    config: &'a ExportConfig,
    /// Directory the .dae is written to; images are made relative to it.
    dae_dir: PathBuf,
    namer: UniqueNamer,
    sections: Sections,
    scene_id: String,

    mesh_cache: HashMap<MeshId, MeshData>,
    curve_cache: HashMap<CurveId, String>,
    material_cache: HashMap<MaterialId, String>,
    image_cache: HashMap<ImageId, String>,
    skeleton_info: HashMap<NodeId, SkinInfo>,
    /// Armature nodes, in export order.
    skeletons: Vec<NodeId>,
    constraint_actions: Vec<ActionId>,
    /// Exported nodes, with their XML IDs.
    node_ids: HashMap<NodeId, String>,
    valid_nodes: Vec<bool>,
}

impl<'a> Ctx<'a> {
    fn new(scene: &'a Scene, config: &'a ExportConfig, dae_path: &Path) -> Ctx<'a> {
        let mut namer = UniqueNamer::new();
        let scene_id = namer.new_id("scene");
        let dae_dir = dae_path.parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(PathBuf::new);
        Ctx {
            scene,
            config,
            dae_dir,
            namer,
            sections: Sections::new(),
            scene_id,
            mesh_cache: HashMap::new(),
            curve_cache: HashMap::new(),
            material_cache: HashMap::new(),
            image_cache: HashMap::new(),
            skeleton_info: HashMap::new(),
            skeletons: vec![],
            constraint_actions: vec![],
            node_ids: HashMap::new(),
            valid_nodes: vec![false; scene.nodes.len()],
        }
    }
}

/// Encodes `scene` as a COLLADA document. `dae_path` is where the document
/// is going to be saved; image paths are written relative to it.
pub fn write(
    scene: &Scene,
    host: &mut dyn SceneHost,
    config: &ExportConfig,
    dae_path: &Path,
) -> Result<String> {
    let mut ctx = Ctx::new(scene, config, dae_path);

    asset(&mut ctx)?;
    nodes::export_scene(&mut ctx, host);
    if config.animate {
        animation::export_animations(&mut ctx, host);
    }

    let mut xml = Xml::with_capacity(1024 * 1024); // 1MiB
    xml!(xml;
        (r#"<?xml version="1.0" encoding="utf-8"?>"#);
        <COLLADA xmlns=["http://www.collada.org/2005/11/COLLADASchema"] version=["1.4.1"]>;
    );
    xml.push_str(ctx.sections.get(Section::Asset));

    library(&mut xml, "library_images", &ctx.sections, &[Section::Images]);
    library(&mut xml, "library_materials", &ctx.sections, &[Section::Materials]);
    library(&mut xml, "library_effects", &ctx.sections, &[Section::Effects]);
    library(&mut xml, "library_geometries", &ctx.sections, &[Section::Geometries]);
    library(&mut xml, "library_controllers", &ctx.sections,
        &[Section::Morph, Section::Skin, Section::Controllers]);
    library(&mut xml, "library_cameras", &ctx.sections, &[Section::Cameras]);
    library(&mut xml, "library_lights", &ctx.sections, &[Section::Lamps]);
    if !ctx.sections.is_empty(Section::AnimationClips) {
        library(&mut xml, "library_animation_clips", &ctx.sections, &[Section::AnimationClips]);
    }
    library(&mut xml, "library_visual_scenes", &ctx.sections, &[Section::Nodes]);
    if config.animate {
        library(&mut xml, "library_animations", &ctx.sections, &[Section::Animations]);
    }

    xml!(xml;
        <scene>;
            <instance_visual_scene url=["#"(ctx.scene_id)]/>;
        /scene>;
        /COLLADA>;
    );

    Ok(xml.string())
}

/// Encodes `scene` and saves it to `path`.
///
/// The whole document is built before the file is created, so a failed
/// export never leaves a partial file behind.
pub fn export(
    scene: &Scene,
    host: &mut dyn SceneHost,
    config: &ExportConfig,
    path: &Path,
) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!(ErrorKind::NoDestination);
    }
    let s = write(scene, host, config, path)?;
    let mut f = File::create(path)?;
    f.write_all(s.as_bytes())?;
    info!("wrote {}", path.display());
    Ok(())
}

fn library(xml: &mut Xml, tag: &str, sections: &Sections, parts: &[Section]) {
    xml!(xml; <(tag)>;);
    for &section in parts {
        xml.push_str(sections.get(section));
    }
    xml!(xml; /(tag)>;);
}

fn asset(ctx: &mut Ctx) -> Result<()> {
    let now = time::now_utc();
    let iso8601_datetime = time::strftime("%FT%TZ", &now)?;
    let mut xml = Section::Asset.buffer();
    xml!(xml;
        <asset>;
            <contributor>;
                <author>"Anonymous"</author>;
                <authoring_tool>"hwdae "(env!("CARGO_PKG_VERSION"))</authoring_tool>;
            /contributor>;
            <created>(iso8601_datetime)</created>;
            <modified>(iso8601_datetime)</modified>;
            <unit meter=["1.0"] name=["meter"]/>;
            <up_axis>"Z_UP"</up_axis>;
        /asset>;
    );
    ctx.sections.push(Section::Asset, &xml);
    Ok(())
}


#[test]
fn test_single_quad_document() {
    use crate::host::SnapshotHost;
    use crate::scene::{Node, Payload};

    let mut scene = Scene::new("Scene");
    let mut quad = geometry::quad_mesh();
    quad.materials.clear();
    let mesh = scene.add_mesh(quad);
    let mut node = Node::new("Plane");
    node.payload = Payload::Mesh { mesh, evaluated: None };
    scene.add_node(node, None);

    let config = ExportConfig::default();
    let mut host = SnapshotHost::new(&scene);
    let dae = write(&scene, &mut host, &config, Path::new("out.dae")).unwrap();

    assert!(dae.starts_with(r#"<?xml version="1.0" encoding="utf-8"?>"#));
    assert_eq!(dae.matches("<geometry ").count(), 1);
    assert!(dae.contains(r#"<polygons count="1">"#));
    assert!(!dae.contains("<material "));
    assert!(dae.contains(r##"<instance_visual_scene url="#id-scene-1"/>"##));
    assert!(!dae.contains("<library_animations>"));
    assert!(!dae.contains("<library_animation_clips>"));

    // Libraries come in a fixed order
    let order = ["<asset>", "<library_images>", "<library_materials>", "<library_effects>",
        "<library_geometries>", "<library_controllers>", "<library_cameras>",
        "<library_lights>", "<library_visual_scenes>", "<scene>"];
    let positions: Vec<usize> = order.iter().map(|tag| dae.find(tag).unwrap()).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_export_needs_destination() {
    use crate::host::SnapshotHost;

    let scene = Scene::new("Scene");
    let mut host = SnapshotHost::new(&scene);
    let res = export(&scene, &mut host, &ExportConfig::default(), Path::new(""));
    match res {
        Err(e) => match *e.kind() {
            ErrorKind::NoDestination => {}
            ref k => panic!("unexpected error {:?}", k),
        },
        Ok(()) => panic!("expected an error"),
    }
}
