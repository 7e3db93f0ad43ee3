//! Importer for HWRM `.level` files.
//!
//! Commands are found by substring, one per line, and become placeholder
//! nodes: `POINT_`, `SPHERE_`, `PEBBLE_` and `ASTEROID_` empties, and a
//! `WORLD_BOUNDS` circle. Level files are Y-up, so file (x, y, z) lands at
//! scene (x, z, y).

use cgmath::{Point3, Vector3, vec3};
use std::f64::consts::PI;
use std::fs;
use std::path::Path;
use crate::errors::{ErrorKind, Result};
use crate::scene::{Curve, CurvePoint, Node, Payload, Scene, Spline};

/// Number of points in the world bounds circle.
const BOUNDS_SEGMENTS: usize = 32;
const PEBBLE_SIZE: f64 = 50.0;
const ASTEROID_SIZE: f64 = 100.0;

pub fn import(path: &Path) -> Result<Scene> {
    info!("importing {}", path.display());
    let s = fs::read_to_string(path)?;
    import_str(&s)
}

pub fn import_str(s: &str) -> Result<Scene> {
    let mut scene = Scene::new("Scene");

    for (i, line) in s.lines().enumerate() {
        let bad_line = || ErrorKind::BadLevelLine(i + 1, line.trim().to_string());

        let node = if line.contains("addPoint") {
            let mut node = Node::new(&format!("POINT_{}", name_arg(line).ok_or_else(bad_line)?));
            node.transform.location = position_arg(line).ok_or_else(bad_line)?;
            node
        } else if line.contains("addSphere") {
            let mut node = Node::new(&format!("SPHERE_{}", name_arg(line).ok_or_else(bad_line)?));
            node.transform.location = position_arg(line).ok_or_else(bad_line)?;
            node.empty_display_size = sphere_radius(line).ok_or_else(bad_line)?;
            node
        } else if line.contains("addPebble") {
            let mut node = Node::new(&format!("PEBBLE_{}", name_arg(line).ok_or_else(bad_line)?));
            node.transform.location = position_arg(line).ok_or_else(bad_line)?;
            node.empty_display_size = PEBBLE_SIZE;
            node
        } else if line.contains("addAsteroid") {
            let mut node = Node::new(&format!("ASTEROID_{}", name_arg(line).ok_or_else(bad_line)?));
            node.transform.location = position_arg(line).ok_or_else(bad_line)?;
            node.transform.rotation = asteroid_rotation(line).ok_or_else(bad_line)?;
            node.empty_display_size = ASTEROID_SIZE;
            node
        } else if line.contains("setWorldBoundsInner") {
            let radius = field(line, 4).ok_or_else(bad_line)?;
            scene.curves.push(bounds_circle(radius));
            let mut node = Node::new("WORLD_BOUNDS");
            node.payload = Payload::Curve(scene.curves.len() - 1);
            node
        } else {
            continue;
        };

        debug!("level line {}: {}", i + 1, node.name);
        scene.add_node(node, None);
    }

    info!("imported {} objects", scene.nodes.len());
    Ok(scene)
}

/// First argument, with its quotes stripped.
fn name_arg(line: &str) -> Option<&str> {
    let args = line.splitn(2, '(').nth(1)?;
    let name = args.split(',').next()?.trim();
    Some(name.trim_matches(|c| c == '"' || c == '\''))
}

/// The `{x,y,z}` argument, in scene axes.
fn position_arg(line: &str) -> Option<Vector3<f64>> {
    let inner = line.splitn(2, '{').nth(1)?;
    let inner = inner.split('}').next()?;
    let mut xyz = inner.split(',').map(|f| f.trim().parse::<f64>());
    let x = xyz.next()?.ok()?;
    let y = xyz.next()?.ok()?;
    let z = xyz.next()?.ok()?;
    Some(vec3(x, z, y))
}

/// The `n`th comma-separated field of the whole line, as a float.
fn field(line: &str, n: usize) -> Option<f64> {
    line.split(',').nth(n)?.trim().parse().ok()
}

fn sphere_radius(line: &str) -> Option<f64> {
    let r = line.split(',').nth(4)?.split(')').next()?;
    r.trim().parse().ok()
}

/// Asteroid rotations are given in degrees, in file axes, after the
/// position.
fn asteroid_rotation(line: &str) -> Option<Vector3<f64>> {
    let rest = line.split('}').nth(1)?;
    let mut fields = rest.split(',').skip(2).map(|f| f.trim().parse::<f64>());
    let rx = fields.next()?.ok()?;
    let ry = fields.next()?.ok()?;
    let rz = fields.next()?.ok()?;
    Some(vec3(rx, rz, ry).map(f64::to_radians))
}

fn bounds_circle(radius: f64) -> Curve {
    let points = (0..BOUNDS_SEGMENTS)
        .map(|i| {
            let theta = 2.0 * PI * i as f64 / BOUNDS_SEGMENTS as f64;
            CurvePoint {
                co: Point3::new(radius * theta.cos(), radius * theta.sin(), 0.0),
                tilt: 0.0,
            }
        })
        .collect();
    Curve {
        name: "WORLD_BOUNDS".to_string(),
        splines: vec![Spline::Poly(points)],
    }
}


#[test]
fn test_point_swaps_y_and_z() {
    let scene = import_str(r#"addPoint("Beacon1", {10,20,30})"#).unwrap();
    assert_eq!(scene.nodes.len(), 1);
    assert_eq!(scene.nodes[0].name, "POINT_Beacon1");
    assert_eq!(scene.nodes[0].transform.location, vec3(10.0, 30.0, 20.0));
    assert_eq!(scene.nodes[0].payload, Payload::Empty);
}

#[test]
fn test_all_commands() {
    let level = "
        -- a comment, ignored
        addSphere('Ball', {0, 0, 0}, 40)
        addPebble(\"Pebble_0\", {1, 2, 3}, 0, 0, 0)
        addAsteroid(\"Asteroid_3\", {100, 200, 300}, 100, 90, 0, 45, 0, 0)
        setWorldBoundsInner({0, 0, 0}, {5000, 5000, 5000})
    ";
    let scene = import_str(level).unwrap();
    let names: Vec<&str> = scene.nodes.iter().map(|n| &n.name[..]).collect();
    assert_eq!(names, vec!["SPHERE_Ball", "PEBBLE_Pebble_0", "ASTEROID_Asteroid_3", "WORLD_BOUNDS"]);

    assert_eq!(scene.nodes[0].empty_display_size, 40.0);
    assert_eq!(scene.nodes[1].empty_display_size, PEBBLE_SIZE);
    assert_eq!(scene.nodes[1].transform.location, vec3(1.0, 3.0, 2.0));

    let asteroid = &scene.nodes[2];
    assert_eq!(asteroid.empty_display_size, ASTEROID_SIZE);
    assert_eq!(asteroid.transform.location, vec3(100.0, 300.0, 200.0));
    // (rx, ry, rz) = (90, 0, 45) in file axes
    let rot = asteroid.transform.rotation;
    assert!((rot.x - PI / 2.0).abs() < 1e-12);
    assert!((rot.y - PI / 4.0).abs() < 1e-12);
    assert_eq!(rot.z, 0.0);

    match scene.nodes[3].payload {
        Payload::Curve(c) => match scene.curves[c].splines[0] {
            Spline::Poly(ref ps) => {
                assert_eq!(ps.len(), BOUNDS_SEGMENTS);
                assert_eq!(ps[0].co, Point3::new(5000.0, 0.0, 0.0));
            }
            ref s => panic!("unexpected spline {:?}", s),
        },
        ref p => panic!("unexpected payload {:?}", p),
    }
}

#[test]
fn test_bad_line_reports_line_number() {
    let err = match import_str("\naddPoint(\"P\", {1, two, 3})") {
        Err(e) => e,
        Ok(_) => panic!("expected an error"),
    };
    match *err.kind() {
        ErrorKind::BadLevelLine(line_no, ref line) => {
            assert_eq!(line_no, 2);
            assert!(line.starts_with("addPoint"));
        }
        ref k => panic!("unexpected error {:?}", k),
    }
}
