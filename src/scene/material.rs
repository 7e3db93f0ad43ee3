use std::path::PathBuf;
use super::{ImageId, TextureId};

#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub diffuse_color: [f64; 3],
    pub diffuse_intensity: f64,
    pub specular_color: [f64; 3],
    pub specular_intensity: f64,
    /// Specular hardness, written as shininess.
    pub hardness: f64,
    pub emit: f64,
    /// Ambient factor. Added after the world ambient color.
    pub ambient: f64,
    pub mirror_color: [f64; 3],
    pub alpha: f64,
    pub use_transparency: bool,
    pub texture_slots: Vec<TextureSlot>,
}

impl Material {
    pub fn new(name: &str) -> Material {
        Material {
            name: name.to_string(),
            diffuse_color: [0.8, 0.8, 0.8],
            diffuse_intensity: 0.8,
            specular_color: [1.0, 1.0, 1.0],
            specular_intensity: 0.5,
            hardness: 50.0,
            emit: 0.0,
            ambient: 1.0,
            mirror_color: [1.0, 1.0, 1.0],
            alpha: 1.0,
            use_transparency: false,
            texture_slots: vec![],
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextureSlot {
    pub texture: TextureId,
    pub enabled: bool,
    pub use_diffuse: bool,
    pub use_specular: bool,
    pub use_emission: bool,
    pub use_normal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    Image,
    /// Procedural textures; never exported.
    Other,
}

#[derive(Debug, Clone)]
pub struct Texture {
    pub name: String,
    pub kind: TextureKind,
    pub image: Option<ImageId>,
}

#[derive(Debug, Clone)]
pub struct Image {
    pub name: String,
    pub filepath: PathBuf,
}
