//! Effects, materials, and the images they sample.

use std::fs;
use std::path::Path;
use crate::scene::{ImageId, Material, MaterialId, TextureKind};
use crate::util::relpath::{relative_to, to_unix_string};
use super::Ctx;
use super::sections::Section;
use super::xml::Xml;

/// Image IDs for the four channels HODOR's material editor understands.
#[derive(Default)]
struct Channels {
    diffuse: Option<String>,
    specular: Option<String>,
    emission: Option<String>,
    normal: Option<String>,
}

/// Writes the <effect>/<material> pair for a material (once) and returns
/// the material's ID.
pub(super) fn export_material(ctx: &mut Ctx, material_id: MaterialId) -> String {
    if let Some(id) = ctx.material_cache.get(&material_id) {
        return id.clone();
    }

    let scene = ctx.scene;
    let mat = &scene.materials[material_id];
    let channels = find_channels(ctx, mat);

    let matid = ctx.namer.get_fresh_name_with(&mat.name, &["-fx"]);
    let fxid = format!("{}-fx", matid);
    let ambient = scene.ambient_color;

    let mut xml = Section::Effects.buffer();
    xml!(xml;
        <effect id=[(fxid)] name=[ESC(&mat.name)]>;
            <profile_COMMON>;
                <technique sid=["standard"]>;
                    <phong>;
                        <emission>;
    );
    match channels.emission {
        Some(ref image) => texture(&mut xml, image),
        None => {
            let c = scale(mat.diffuse_color, mat.emit);
            xml!(xml; <color sid=["emission"]>(c[0])" "(c[1])" "(c[2])" 1"</color>;);
        }
    }
    xml!(xml;
                        /emission>;
                        <ambient>;
                            <color sid=["ambient"]>(ambient[0])" "(ambient[1])" "(ambient[2])" "(mat.ambient)</color>;
                        /ambient>;
                        <diffuse>;
    );
    match channels.diffuse {
        Some(ref image) => texture(&mut xml, image),
        None => {
            let c = scale(mat.diffuse_color, mat.diffuse_intensity);
            xml!(xml; <color sid=["diffuse"]>(c[0])" "(c[1])" "(c[2])" 1"</color>;);
        }
    }
    xml!(xml;
                        /diffuse>;
                        <specular>;
    );
    match channels.specular {
        Some(ref image) => texture(&mut xml, image),
        None => {
            let c = scale(mat.specular_color, mat.specular_intensity);
            xml!(xml; <color sid=["specular"]>(c[0])" "(c[1])" "(c[2])" 1"</color>;);
        }
    }
    let m = mat.mirror_color;
    xml!(xml;
                        /specular>;
                        <shininess>;
                            <float sid=["shininess"]>(mat.hardness)</float>;
                        /shininess>;
                        <reflective>;
                            <color>(m[0])" "(m[1])" "(m[2])" 1"</color>;
                        /reflective>;
                        <transparency>;
                        if (mat.use_transparency) {
                            <float sid=["transparency"]>(mat.alpha)</float>;
                        } else {
                            <float sid=["transparency"]>"0.000000"</float>;
                        }
                        /transparency>;
                    /phong>;
    );
    if let Some(ref image) = channels.normal {
        xml!(xml;
            <extra>;
                <technique profile=["MAYA"]>;
                    <bump bumptype=["NORMALMAP"]>;
                        <texture texture=[(image)] texcoord=["CHANNEL0"]/>;
                    /bump>;
                /technique>;
            /extra>;
        );
    }
    xml!(xml;
                /technique>;
            /profile_COMMON>;
        /effect>;
    );
    ctx.sections.push(Section::Effects, &xml);

    let mut xml = Section::Materials.buffer();
    xml!(xml;
        <material id=[(matid)] name=[ESC(&mat.name)]>;
            <instance_effect url=["#"(fxid)]/>;
        /material>;
    );
    ctx.sections.push(Section::Materials, &xml);

    ctx.material_cache.insert(material_id, matid.clone());
    matid
}

/// For each channel, the image of the first enabled image-texture slot
/// that feeds it.
fn find_channels(ctx: &mut Ctx, mat: &Material) -> Channels {
    let scene = ctx.scene;
    let mut channels = Channels::default();
    for slot in &mat.texture_slots {
        if !slot.enabled {
            continue;
        }
        let texture = match scene.textures.get(slot.texture) {
            Some(t) => t,
            None => {
                debug!("material {}: texture slot points at missing texture {}",
                    mat.name, slot.texture);
                continue;
            }
        };
        if texture.kind != TextureKind::Image {
            continue;
        }
        let image_id = match texture.image {
            Some(image_id) => image_id,
            None => continue,
        };

        let id = export_image(ctx, image_id, &texture.name);

        let mut wanted = [
            (slot.use_diffuse, &mut channels.diffuse),
            (slot.use_specular, &mut channels.specular),
            (slot.use_emission, &mut channels.emission),
            (slot.use_normal, &mut channels.normal),
        ];
        for (used, channel) in wanted.iter_mut() {
            if *used && channel.is_none() {
                **channel = Some(id.clone());
            }
        }
    }
    channels
}

fn texture(xml: &mut Xml, image: &str) {
    xml!(xml;
        <texture texture=[(image)] texcoord=["CHANNEL0"]>;
            <extra>;
                <technique profile=["MAYA"]>;
                    <wrapU sid=["wrapU0"]>"TRUE"</wrapU>;
                    <wrapV sid=["wrapV0"]>"TRUE"</wrapV>;
                    <blend_mode>"ADD"</blend_mode>;
                /technique>;
            /extra>;
        /texture>;
    );
}

fn scale(c: [f64; 3], k: f64) -> [f64; 3] {
    [c[0] * k, c[1] * k, c[2] * k]
}

/// Writes the <image> for an image (once) and returns its ID.
///
/// With `copy_images` the file is copied to `images/` next to the .dae;
/// otherwise it is referenced relative to the .dae's directory.
fn export_image(ctx: &mut Ctx, image_id: ImageId, texture_name: &str) -> String {
    if let Some(id) = ctx.image_cache.get(&image_id) {
        return id.clone();
    }

    let scene = ctx.scene;
    let image = &scene.images[image_id];
    let src = image.filepath.as_path();

    let path = if ctx.config.copy_images {
        match src.file_name() {
            Some(basename) => {
                copy_image(src, &ctx.dae_dir.join("images"));
                format!("images/{}", basename.to_string_lossy())
            }
            None => to_unix_string(src),
        }
    } else {
        match relative_to(src, &ctx.dae_dir) {
            Some(rel) => to_unix_string(&rel),
            None => to_unix_string(src),
        }
    };

    let id = ctx.namer.get_fresh_name(format!("{}-image", texture_name));
    let mut xml = Section::Images.buffer();
    xml!(xml;
        <image id=[(id)] name=[ESC(&image.name)]>;
            <init_from>ESC(&path)</init_from>;
        /image>;
    );
    ctx.sections.push(Section::Images, &xml);

    ctx.image_cache.insert(image_id, id.clone());
    id
}

/// Failures are logged and otherwise ignored.
fn copy_image(src: &Path, dst_dir: &Path) {
    let dst = match src.file_name() {
        Some(name) => dst_dir.join(name),
        None => return,
    };
    if dst.is_file() {
        return;
    }
    let res = fs::create_dir_all(dst_dir).and_then(|_| fs::copy(src, &dst));
    if let Err(e) = res {
        warn!("couldn't copy image {}: {}", src.display(), e);
    }
}


#[cfg(test)]
fn textured_scene() -> crate::scene::Scene {
    use std::path::PathBuf;
    use crate::scene::{Image, Scene, Texture, TextureSlot};

    let mut scene = Scene::new("Scene");
    scene.images.push(Image {
        name: "hull.tga".to_string(),
        filepath: PathBuf::from("/ships/tex/hull.tga"),
    });
    scene.textures.push(Texture {
        name: "Hull".to_string(),
        kind: TextureKind::Image,
        image: Some(0),
    });
    let mut mat = Material::new("HullMat");
    mat.texture_slots.push(TextureSlot {
        texture: 0,
        enabled: true,
        use_diffuse: true,
        use_normal: true,
        ..Default::default()
    });
    scene.add_material(mat);
    scene.add_material(Material::new("Plain"));
    scene
}

#[cfg(test)]
fn test_ctx<'a>(scene: &'a crate::scene::Scene, config: &'a crate::config::ExportConfig) -> Ctx<'a> {
    Ctx::new(scene, config, Path::new("/ships/out/ship.dae"))
}

#[test]
fn test_material_is_memoized() {
    let scene = textured_scene();
    let config = Default::default();
    let mut ctx = test_ctx(&scene, &config);

    let a = export_material(&mut ctx, 1);
    let b = export_material(&mut ctx, 1);
    assert_eq!(a, "Plain");
    assert_eq!(a, b);
    assert_eq!(ctx.sections.get(Section::Effects).matches("<effect ").count(), 1);
    assert_eq!(ctx.sections.get(Section::Materials).matches("<material ").count(), 1);
}

#[test]
fn test_material_channels() {
    let scene = textured_scene();
    let config = Default::default();
    let mut ctx = test_ctx(&scene, &config);

    export_material(&mut ctx, 0);
    let fx = ctx.sections.get(Section::Effects);
    assert!(fx.contains(r#"<effect id="HullMat-fx" name="HullMat">"#));
    // Diffuse comes from the texture, specular from the flat color
    assert!(fx.contains(r#"<texture texture="Hull-image" texcoord="CHANNEL0">"#));
    assert!(fx.contains(r#"<color sid="specular">0.5 0.5 0.5 1</color>"#));
    assert!(fx.contains(r#"<bump bumptype="NORMALMAP">"#));
    assert!(fx.contains(r#"<float sid="transparency">0.000000</float>"#));
    assert!(fx.contains("<reflective>"));

    let images = ctx.sections.get(Section::Images);
    assert!(images.contains(r#"<image id="Hull-image" name="hull.tga">"#));
    assert!(images.contains("<init_from>../tex/hull.tga</init_from>"));
    assert_eq!(images.matches("<image ").count(), 1);
}
