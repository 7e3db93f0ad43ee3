use crate::scene::ObjectType;

/// Options controlling a COLLADA export.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Only objects of these types are exported (plus their ancestors).
    pub object_types: Vec<ObjectType>,
    pub selected_only: bool,
    /// Skip objects that share no layer with the scene's active layers.
    pub active_layers_only: bool,
    pub apply_modifiers: bool,
    pub triangulate: bool,
    pub tangent_arrays: bool,
    /// Copy textures next to the .dae instead of referencing them in place.
    pub copy_images: bool,
    /// Bones whose name starts with this (and their children) are not
    /// exported.
    pub exclude_bone_prefix: Option<String>,
    pub animate: bool,
    /// Export every action as an animation clip instead of just the active
    /// ones. Needs at least one armature.
    pub all_actions: bool,
    /// Actions whose name ends with this are skipped in all-actions mode.
    pub skip_suffix: Option<String>,
    pub optimize_keyframes: bool,
    /// Keyframes closer than 10^-precision are considered equal.
    pub optimize_precision: f64,
}

impl Default for ExportConfig {
    fn default() -> ExportConfig {
        ExportConfig {
            object_types: ObjectType::ALL.to_vec(),
            selected_only: false,
            active_layers_only: true,
            apply_modifiers: true,
            triangulate: false,
            tangent_arrays: false,
            copy_images: false,
            exclude_bone_prefix: Some("ctrl".to_string()),
            animate: false,
            all_actions: false,
            skip_suffix: Some("-noexp".to_string()),
            optimize_keyframes: true,
            optimize_precision: 6.0,
        }
    }
}

impl ExportConfig {
    pub fn exports_type(&self, ty: ObjectType) -> bool {
        self.object_types.contains(&ty)
    }

    pub fn is_control_bone(&self, name: &str) -> bool {
        match self.exclude_bone_prefix {
            Some(ref prefix) => name.starts_with(prefix.as_str()),
            None => false,
        }
    }

    pub fn skips_action(&self, name: &str) -> bool {
        match self.skip_suffix {
            Some(ref suffix) => name.ends_with(suffix.as_str()),
            None => false,
        }
    }

    pub fn keyframe_epsilon(&self) -> f64 {
        10f64.powf(-self.optimize_precision)
    }
}

#[test]
fn test_defaults() {
    let config = ExportConfig::default();
    assert_eq!(config.object_types.len(), 6);
    assert!(config.active_layers_only);
    assert!(config.is_control_bone("ctrl_hand"));
    assert!(!config.is_control_bone("hand"));
    assert!(config.skips_action("Idle-noexp"));
    assert!((config.keyframe_epsilon() - 1e-6).abs() < 1e-12);
}
