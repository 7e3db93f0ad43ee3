use clap::ArgMatches;
use hwdae::collada::read::{ControllerKind, Document, NodeDef};
use hwdae::collada::read_str;
use hwdae::errors::Result;
use std::fs;
use std::path::Path;

pub fn main(matches: &ArgMatches) -> Result<()> {
    let path = matches.value_of_os("INPUT").map(Path::new).unwrap_or(Path::new(""));
    let s = fs::read_to_string(path)?;
    let doc = read_str(&s)?;

    println!("File: {}", path.display());
    println!("  Up Axis: {}", doc.up_axis);
    println!("  Unit: {} m", doc.unit);
    println!();

    scene_info(&doc);
    geometry_info(&doc);
    material_info(&doc);
    controller_info(&doc);
    animation_info(&doc);

    Ok(())
}

fn scene_info(doc: &Document) {
    match doc.visual_scene {
        Some(ref vs) => {
            println!("Visual Scene {:?}:", vs.id);
            for node in &vs.nodes {
                node_info(node, 1);
            }
        }
        None => println!("No visual scene"),
    }
    println!();
}

fn node_info(node: &NodeDef, depth: usize) {
    print!("{:indent$}{}", "", node.name(), indent = 2 * depth);
    if node.joint {
        print!(" (joint)");
    }
    if let Some(ref inst) = node.instance {
        print!(" -> {} #{}", inst.kind, inst.url);
    }
    println!();
    for child in &node.children {
        node_info(child, depth + 1);
    }
}

fn geometry_info(doc: &Document) {
    println!("Geometries ({} total):", doc.geometries.len());
    for geom in &doc.geometries {
        println!("  {:?} ({}){}", geom.name, geom.id,
            if geom.spline { " spline" } else { "" });
        for source in &geom.sources {
            println!("    Source {}: count={} stride={}", source.id, source.count, source.stride);
        }
        for prim in &geom.primitives {
            println!("    <{}> count={} material={}",
                prim.kind, prim.count, prim.material.as_ref().map_or("-", |m| &m[..]));
        }
    }
    println!();
}

fn material_info(doc: &Document) {
    println!("Materials ({} total):", doc.materials.len());
    for mat in &doc.materials {
        let diffuse = doc.effects.iter()
            .find(|fx| fx.id == mat.effect)
            .and_then(|fx| fx.diffuse.as_ref());
        println!("  {:?} ({}): diffuse {:?}", mat.name, mat.id, diffuse);
    }
    println!("Images ({} total):", doc.images.len());
    for image in &doc.images {
        println!("  {} -> {}", image.id, image.init_from);
    }
    println!();
}

fn controller_info(doc: &Document) {
    println!("Controllers ({} total):", doc.controllers.len());
    for controller in &doc.controllers {
        match controller.kind {
            ControllerKind::Skin(ref skin) => {
                println!("  Skin {} of {}: {} joints, {} vertices, {} weights",
                    controller.id, skin.source, skin.joints.len(), skin.vcount.len(), skin.weights.len());
            }
            ControllerKind::Morph(ref morph) => {
                println!("  Morph {} of {}: {} targets ({})",
                    controller.id, morph.source, morph.targets.len(), morph.method);
            }
        }
    }
    println!();
}

fn animation_info(doc: &Document) {
    println!("Animation Channels: {}", doc.channels.len());
    for clip in &doc.clips {
        println!("  Clip {:?}: {}s to {}s, {} animations",
            clip.name, clip.start, clip.end, clip.animations.len());
    }
}
