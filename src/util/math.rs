//! Matrix helpers for the TRS/Euler convention the exporter uses.
//!
//! Rotations are XYZ Euler angles, ie. the rotation matrix is Rz·Ry·Rx. That
//! is why nodes are written with their `rotateZ` element first.

use cgmath::{InnerSpace, Matrix4, Rad, SquareMatrix, Vector3, One, vec3};

/// Builds Rz·Ry·Rx from XYZ Euler angles in radians.
pub fn euler_to_matrix(rot: Vector3<f64>) -> Matrix4<f64> {
    Matrix4::from_angle_z(Rad(rot.z)) *
        Matrix4::from_angle_y(Rad(rot.y)) *
        Matrix4::from_angle_x(Rad(rot.x))
}

pub fn to_translation(m: &Matrix4<f64>) -> Vector3<f64> {
    m.w.truncate()
}

/// Recovers XYZ Euler angles (radians) from the rotation part of `m`. Scale
/// is divided out of each basis column first.
pub fn to_euler(m: &Matrix4<f64>) -> Vector3<f64> {
    let unit = |v: Vector3<f64>| {
        let len = v.magnitude();
        if len > 1e-12 { v / len } else { v }
    };
    let c0 = unit(m.x.truncate());
    let c1 = unit(m.y.truncate());
    let c2 = unit(m.z.truncate());

    // r_ij is row i, column j.
    let (r00, r10, r20) = (c0.x, c0.y, c0.z);
    let (r11, r21) = (c1.y, c1.z);
    let (r12, r22) = (c2.y, c2.z);

    let cos_y = (r00 * r00 + r10 * r10).sqrt();
    if cos_y > 1e-6 {
        vec3(r21.atan2(r22), (-r20).atan2(cos_y), r10.atan2(r00))
    } else {
        // Gimbal lock; put all the remaining rotation on X.
        vec3((-r12).atan2(r11), (-r20).atan2(cos_y), 0.0)
    }
}

pub fn to_euler_degrees(m: &Matrix4<f64>) -> Vector3<f64> {
    to_euler(m).map(f64::to_degrees)
}

/// Slightly perturb a matrix's diagonal to create a non-singular matrix.
///
/// Bones scaled to zero would otherwise leave us with nothing to write for
/// their inverse bind matrix.
pub fn make_invertible(m: &Matrix4<f64>) -> Matrix4<f64> {
    if m.is_invertible() {
        return *m;
    }

    for &epsilon in &[0.000001, 0.00001, 0.0001, 0.001f64] {
        let m2 = m + Matrix4::from_scale(epsilon);
        if m2.is_invertible() {
            return m2;
        }
    }

    warn!("found singular matrix (COLLADA requires an invertible \
        matrix here); proceeding with the identity");
    debug!("namely, the matrix {:#?}", m);
    Matrix4::one()
}

/// Inverse of `m`, going through `make_invertible` for singular input.
pub fn invert(m: &Matrix4<f64>) -> Matrix4<f64> {
    make_invertible(m).invert().unwrap_or_else(Matrix4::one)
}

#[cfg(test)]
fn assert_close(a: Vector3<f64>, b: Vector3<f64>) {
    assert!((a - b).magnitude() < 1e-9, "{:?} != {:?}", a, b);
}

#[test]
fn test_euler_round_trip() {
    for &rot in &[
        vec3(0.0, 0.0, 0.0),
        vec3(0.3, -0.2, 1.1),
        vec3(-1.0, 0.5, 2.5),
        vec3(0.0, 0.0, std::f64::consts::FRAC_PI_2),
    ] {
        let m = Matrix4::from_translation(vec3(1.0, 2.0, 3.0)) * euler_to_matrix(rot);
        assert_close(to_euler(&m), rot);
        assert_close(to_translation(&m), vec3(1.0, 2.0, 3.0));
    }
}

#[test]
fn test_euler_ignores_scale() {
    let rot = vec3(0.4, 0.1, -0.7);
    let m = euler_to_matrix(rot) * Matrix4::from_nonuniform_scale(2.0, 0.5, 3.0);
    assert_close(to_euler(&m), rot);
}

#[test]
fn test_gimbal_lock() {
    let rot = vec3(0.25, std::f64::consts::FRAC_PI_2, 0.0);
    let m = euler_to_matrix(rot);
    let back = euler_to_matrix(to_euler(&m));
    for i in 0..4 {
        assert!((m[i] - back[i]).magnitude() < 1e-9);
    }
}

#[test]
fn test_invert_singular() {
    let m = Matrix4::from_scale(0.0);
    let inv = invert(&m);
    assert!(inv.is_invertible());
}
