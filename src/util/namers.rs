use std::collections::HashSet;

/// Hands out XML IDs that are unique within one document.
///
/// IDs derived from user data (object, mesh, material names) go through
/// `get_fresh_name`. Synthetic IDs come from `new_id` and always look like
/// `id-<kind>-<n>`; user-derived IDs are kept out of that namespace by
/// `validate_id`.
pub struct UniqueNamer {
    taken_names: HashSet<String>,
    last_id: u32,
}

impl UniqueNamer {
    pub fn new() -> UniqueNamer {
        UniqueNamer {
            taken_names: HashSet::new(),
            last_id: 0,
        }
    }

    /// Returns a name, either `desired_name` or something "close" to it, which
    /// has never been returned by a prior call to this function on the same
    /// `UniqueNamer` receiver.
    pub fn get_fresh_name<S: AsRef<str>>(&mut self, desired_name: S) -> String {
        self.get_fresh_name_with(desired_name, &[])
    }

    /// Like `get_fresh_name`, but the name is also chosen so that
    /// `name + suffix` is free for every suffix, and those are taken too.
    /// For elements whose children get IDs derived from the parent's.
    pub fn get_fresh_name_with<S: AsRef<str>>(&mut self, desired_name: S, suffixes: &[&str]) -> String {
        let desired_name = validate_id(desired_name.as_ref());
        let is_free = |taken: &HashSet<String>, name: &str| {
            !taken.contains(name) &&
                suffixes.iter().all(|suffix| !taken.contains(&format!("{}{}", name, suffix)))
        };
        let chosen_name =
            if is_free(&self.taken_names, &desired_name) {
                desired_name
            } else {
                let mut name = String::new();
                for i in 1.. {
                    name = format!("{}{}", desired_name, i);
                    if is_free(&self.taken_names, &name) {
                        break;
                    }
                }
                name
            };
        for suffix in suffixes {
            self.taken_names.insert(format!("{}{}", chosen_name, suffix));
        }
        self.taken_names.insert(chosen_name.clone());
        chosen_name
    }

    /// A synthetic ID, `id-<kind>-<n>`.
    pub fn new_id(&mut self, kind: &str) -> String {
        self.last_id += 1;
        format!("id-{}-{}", kind, self.last_id)
    }
}

/// Turns a user name into a valid XML ID (an NCName). Characters that
/// can't appear in one, whitespace included, become `_`, and a name that
/// doesn't start with a letter or `_` gets a `_` in front.
///
/// User names that would fall into the synthetic `id-` namespace get a `z`
/// in front.
pub fn validate_id(name: &str) -> String {
    let mut id: String = name.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' { c } else { '_' })
        .collect();
    match id.chars().next() {
        Some(c) if c.is_alphabetic() || c == '_' => (),
        _ => id.insert(0, '_'),
    }
    if id.starts_with("id-") {
        format!("z{}", id)
    } else {
        id
    }
}

#[test]
fn test_unique_namer() {
    let mut un = UniqueNamer::new();
    assert_eq!(un.get_fresh_name("A"), "A");
    assert_eq!(un.get_fresh_name("A"), "A1");
    assert_eq!(un.get_fresh_name("A"), "A2");
    assert_eq!(un.get_fresh_name("B"), "B");
    assert_eq!(un.get_fresh_name("A"), "A3");
}

#[test]
fn test_synthetic_ids() {
    let mut un = UniqueNamer::new();
    assert_eq!(un.new_id("scene"), "id-scene-1");
    assert_eq!(un.new_id("morph"), "id-morph-2");
    // Can't collide with a synthetic ID.
    assert_eq!(un.get_fresh_name("id-morph-2"), "zid-morph-2");
}

#[test]
fn test_ids_are_ncnames() {
    assert_eq!(validate_id("Key 1"), "Key_1");
    assert_eq!(validate_id("Nav & Light"), "Nav___Light");
    assert_eq!(validate_id("NAVL[Tip]_Sz[2]"), "NAVL_Tip__Sz_2_");
    assert_eq!(validate_id("a<b>\"c'd"), "a_b__c_d");
    assert_eq!(validate_id("Cube.001"), "Cube.001");
    assert_eq!(validate_id("3D"), "_3D");
    assert_eq!(validate_id("-x"), "_-x");
    assert_eq!(validate_id(""), "_");
    assert_eq!(validate_id("Éclair"), "Éclair");

    let mut un = UniqueNamer::new();
    assert_eq!(un.get_fresh_name("Key 1"), "Key_1");
    assert_eq!(un.get_fresh_name("Key_1"), "Key_11");
}

#[test]
fn test_suffixes_are_reserved() {
    let mut un = UniqueNamer::new();
    assert_eq!(un.get_fresh_name_with("Quad", &["-positions", "-normals"]), "Quad");
    // Derived IDs are taken, either way round
    assert_eq!(un.get_fresh_name("Quad-positions"), "Quad-positions1");
    assert_eq!(un.get_fresh_name("Hull-fx"), "Hull-fx");
    assert_eq!(un.get_fresh_name_with("Hull", &["-fx"]), "Hull1");
    assert_eq!(un.get_fresh_name("Hull1-fx"), "Hull1-fx1");
}
