//! Camera, lamp, and curve data.

use cgmath::Point3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraKind {
    /// Vertical field of view, radians.
    Perspective { fov: f64 },
    Orthographic { scale: f64 },
}

#[derive(Debug, Clone)]
pub struct Camera {
    pub name: String,
    pub kind: CameraKind,
    pub clip_start: f64,
    pub clip_end: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LampKind {
    Point,
    /// Cone angle, radians.
    Spot { size: f64 },
    Sun,
    Hemi,
    Area,
}

#[derive(Debug, Clone)]
pub struct Lamp {
    pub name: String,
    pub kind: LampKind,
    pub color: [f64; 3],
    pub energy: f64,
    pub distance: f64,
    pub use_sphere: bool,
    pub navlight: Option<NavLight>,
}

/// The custom properties that turn a lamp into a HODOR navlight.
#[derive(Debug, Clone, PartialEq)]
pub struct NavLight {
    pub kind: String,
    pub phase: String,
    pub freq: String,
    pub flags: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BezierPoint {
    pub co: Point3<f64>,
    pub handle_left: Point3<f64>,
    pub handle_right: Point3<f64>,
    pub tilt: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    pub co: Point3<f64>,
    pub tilt: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Spline {
    Bezier(Vec<BezierPoint>),
    /// Poly and NURBS splines; points are joined linearly.
    Poly(Vec<CurvePoint>),
}

#[derive(Debug, Clone)]
pub struct Curve {
    pub name: String,
    pub splines: Vec<Spline>,
}
