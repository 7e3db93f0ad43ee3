use super::ActionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformProp {
    Location,
    Rotation,
    Scale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// What an f-curve animates.
#[derive(Debug, Clone, PartialEq)]
pub enum CurveTarget {
    Object(TransformProp, Axis),
    /// A pose bone channel, by bone name.
    Bone(String, TransformProp, Axis),
}

#[derive(Debug, Clone)]
pub struct FCurve {
    pub target: CurveTarget,
    /// (frame, value), sorted by frame.
    pub keyframes: Vec<(f64, f64)>,
}

impl FCurve {
    /// Linear interpolation between keyframes; constant outside them.
    pub fn evaluate(&self, frame: f64) -> Option<f64> {
        let keys = &self.keyframes;
        let first = keys.first()?;
        let last = keys[keys.len() - 1];
        if frame <= first.0 {
            return Some(first.1);
        }
        if frame >= last.0 {
            return Some(last.1);
        }
        for w in keys.windows(2) {
            let (f0, v0) = w[0];
            let (f1, v1) = w[1];
            if frame >= f0 && frame <= f1 {
                if f1 == f0 {
                    return Some(v1);
                }
                let t = (frame - f0) / (f1 - f0);
                return Some(v0 + (v1 - v0) * t);
            }
        }
        Some(last.1)
    }
}

#[derive(Debug, Clone)]
pub struct Action {
    pub name: String,
    pub users: u32,
    pub frame_range: (f64, f64),
    pub fcurves: Vec<FCurve>,
}

impl Action {
    pub fn new(name: &str, frame_range: (f64, f64)) -> Action {
        Action {
            name: name.to_string(),
            users: 1,
            frame_range,
            fcurves: vec![],
        }
    }

    /// Names of the pose bones this action keys.
    pub fn bone_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = vec![];
        for fc in &self.fcurves {
            if let CurveTarget::Bone(ref name, _, _) = fc.target {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }
}

/// Per-object animation binding.
#[derive(Debug, Clone, Default)]
pub struct AnimationData {
    pub action: Option<ActionId>,
}

#[test]
fn test_fcurve_evaluate() {
    let fc = FCurve {
        target: CurveTarget::Object(TransformProp::Location, Axis::X),
        keyframes: vec![(10.0, 0.0), (20.0, 10.0)],
    };
    assert_eq!(fc.evaluate(0.0), Some(0.0));
    assert_eq!(fc.evaluate(15.0), Some(5.0));
    assert_eq!(fc.evaluate(25.0), Some(10.0));

    let empty = FCurve { keyframes: vec![], ..fc };
    assert_eq!(empty.evaluate(1.0), None);
}

#[test]
fn test_action_bone_names() {
    let mut action = Action::new("Walk", (1.0, 10.0));
    for &bone in &["Hip", "Knee", "Hip"] {
        action.fcurves.push(FCurve {
            target: CurveTarget::Bone(bone.to_string(), TransformProp::Rotation, Axis::Z),
            keyframes: vec![(1.0, 0.0)],
        });
    }
    assert_eq!(action.bone_names(), vec!["Hip", "Knee"]);
}
