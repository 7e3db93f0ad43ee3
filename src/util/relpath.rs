use std::path::{Component, Path, PathBuf};

/// Expresses `path` relative to the directory `base`.
///
/// Returns None when one path is absolute and the other isn't, or they live
/// on different prefixes (drives).
pub fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    if path.is_absolute() != base.is_absolute() {
        return None;
    }

    let path_comps: Vec<Component> = path.components().collect();
    let base_comps: Vec<Component> = base.components()
        .filter(|c| *c != Component::CurDir)
        .collect();

    let common = path_comps.iter()
        .zip(base_comps.iter())
        .take_while(|(a, b)| a == b)
        .count();

    if let Some(Component::Prefix(_)) = base_comps.first() {
        if common == 0 {
            return None;
        }
    }

    let mut rel = PathBuf::new();
    for _ in common..base_comps.len() {
        rel.push("..");
    }
    for comp in &path_comps[common..] {
        rel.push(comp.as_os_str());
    }
    Some(rel)
}

/// Joins the components of a path with `/`, whatever the platform separator.
pub fn to_unix_string(path: &Path) -> String {
    let parts: Vec<String> = path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let joined = parts.join("/");
    if path.has_root() && joined.starts_with("//") {
        joined[1..].to_string()
    } else {
        joined
    }
}

#[test]
fn test_relative_to() {
    let rel = relative_to(Path::new("/a/b/tex/hull.tga"), Path::new("/a/b/out")).unwrap();
    assert_eq!(to_unix_string(&rel), "../tex/hull.tga");

    let rel = relative_to(Path::new("/a/b/hull.tga"), Path::new("/a/b")).unwrap();
    assert_eq!(to_unix_string(&rel), "hull.tga");

    assert!(relative_to(Path::new("hull.tga"), Path::new("/a")).is_none());
}
