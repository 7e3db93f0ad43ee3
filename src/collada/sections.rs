use super::xml::Xml;

/// Parts of the output document.
///
/// Encoders append to whichever section they produce content for, in any
/// order; the assembler emits the sections in declaration order. Morph and
/// skin controllers both end up inside `<library_controllers>`, morphs first,
/// because a skin may use a morph as its source.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    Asset,
    Images,
    Materials,
    Effects,
    Geometries,
    Morph,
    Skin,
    Controllers,
    Cameras,
    Lamps,
    AnimationClips,
    Nodes,
    Animations,
}

const NUM_SECTIONS: usize = 13;

impl Section {
    pub const ALL: [Section; NUM_SECTIONS] = [
        Section::Asset,
        Section::Images,
        Section::Materials,
        Section::Effects,
        Section::Geometries,
        Section::Morph,
        Section::Skin,
        Section::Controllers,
        Section::Cameras,
        Section::Lamps,
        Section::AnimationClips,
        Section::Nodes,
        Section::Animations,
    ];

    /// Nesting depth at which this section's content sits in the document.
    pub fn indent(self) -> u32 {
        match self {
            Section::Asset => 1,
            _ => 2,
        }
    }

    /// A fresh buffer for content going into this section.
    pub fn buffer(self) -> Xml {
        Xml::with_indent(self.indent())
    }
}

pub struct Sections {
    bufs: Vec<String>,
}

impl Sections {
    pub fn new() -> Sections {
        Sections {
            bufs: vec![String::new(); NUM_SECTIONS],
        }
    }

    pub fn push(&mut self, section: Section, frag: &Xml) {
        self.bufs[section as usize].push_str(frag.as_str());
    }

    pub fn get(&self, section: Section) -> &str {
        &self.bufs[section as usize]
    }

    pub fn is_empty(&self, section: Section) -> bool {
        self.bufs[section as usize].is_empty()
    }
}

#[test]
fn test_sections_keep_their_own_order() {
    let mut sections = Sections::new();

    let mut xml = Section::Skin.buffer();
    xml!(xml; <controller id=["skin"]/>;);
    sections.push(Section::Skin, &xml);

    let mut xml = Section::Morph.buffer();
    xml!(xml; <controller id=["morph"]/>;);
    sections.push(Section::Morph, &xml);

    let order: Vec<&str> = Section::ALL.iter()
        .filter(|&&s| !sections.is_empty(s))
        .map(|&s| sections.get(s))
        .collect();
    assert_eq!(order.len(), 2);
    assert!(order[0].contains("morph"));
    assert!(order[1].contains("skin"));
}
