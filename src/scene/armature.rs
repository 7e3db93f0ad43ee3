use cgmath::Matrix4;
use super::ActionId;

pub type BoneId = usize;

#[derive(Debug, Clone)]
pub struct Bone {
    pub name: String,
    pub parent: Option<BoneId>,
    pub children: Vec<BoneId>,
    /// Rest transform in armature space.
    pub matrix_local: Matrix4<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Armature {
    pub name: String,
    pub bones: Vec<Bone>,
    /// Actions driven by ACTION constraints on the pose bones.
    pub constraint_actions: Vec<ActionId>,
}

impl Armature {
    pub fn new(name: &str) -> Armature {
        Armature { name: name.to_string(), ..Default::default() }
    }

    pub fn add_bone(&mut self, name: &str, parent: Option<BoneId>, matrix_local: Matrix4<f64>) -> BoneId {
        let id = self.bones.len();
        self.bones.push(Bone {
            name: name.to_string(),
            parent,
            children: vec![],
            matrix_local,
        });
        if let Some(p) = parent {
            self.bones[p].children.push(id);
        }
        id
    }

    pub fn roots<'a>(&'a self) -> impl Iterator<Item = BoneId> + 'a {
        self.bones.iter()
            .enumerate()
            .filter(|(_, b)| b.parent.is_none())
            .map(|(id, _)| id)
    }

    pub fn find_bone(&self, name: &str) -> Option<BoneId> {
        self.bones.iter().position(|b| b.name == name)
    }
}
