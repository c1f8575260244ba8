//! Small fixed-size vector helpers and rotation conversions.
//!
//! Positions are `[x, y, z]` in metres with Y up. Rotations are Euler angles
//! `[yaw, pitch, roll]` in degrees, applied in YXZ order:
//! yaw turns left/right about Y, pitch looks up/down about X, roll tilts
//! about Z.

pub type Vec3 = [f64; 3];

pub const ZERO: Vec3 = [0.0; 3];

pub fn add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub fn scale(a: Vec3, k: f64) -> Vec3 {
    [a[0] * k, a[1] * k, a[2] * k]
}

pub fn norm(a: Vec3) -> f64 {
    (a[0] * a[0] + a[1] * a[1] + a[2] * a[2]).sqrt()
}

pub fn distance(a: Vec3, b: Vec3) -> f64 {
    norm(sub(a, b))
}

pub fn is_finite(a: &Vec3) -> bool {
    a.iter().all(|v| v.is_finite())
}

/// Component-wise mean. Returns `None` for an empty iterator.
pub fn mean<I>(values: I) -> Option<Vec3>
where
    I: IntoIterator<Item = Vec3>,
{
    let mut sum = ZERO;
    let mut count = 0usize;
    for v in values {
        sum = add(sum, v);
        count += 1;
    }
    if count == 0 {
        None
    } else {
        let n = count as f64;
        Some([sum[0] / n, sum[1] / n, sum[2] / n])
    }
}

/// Wrap an angle in degrees into `(-180, 180]`.
pub fn wrap_degrees(angle: f64) -> f64 {
    let wrapped = (angle + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 {
        180.0
    } else {
        wrapped
    }
}

/// Mean of a set of Euler angle triples, averaging each axis on the circle
/// so that 179° and -179° average to 180° rather than 0°.
pub fn mean_angles<I>(values: I) -> Option<Vec3>
where
    I: IntoIterator<Item = Vec3>,
{
    let mut sin_sum = ZERO;
    let mut cos_sum = ZERO;
    let mut count = 0usize;
    for v in values {
        for axis in 0..3 {
            let rad = v[axis].to_radians();
            sin_sum[axis] += rad.sin();
            cos_sum[axis] += rad.cos();
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    let mut out = ZERO;
    for axis in 0..3 {
        out[axis] = sin_sum[axis].atan2(cos_sum[axis]).to_degrees();
    }
    Some(out)
}

/// Convert a quaternion `[qx, qy, qz, qw]` to Euler angles `[yaw, pitch, roll]`
/// in degrees (YXZ order). The quaternion is normalised first; a zero
/// quaternion maps to zero angles.
///
/// From the rotation matrix R = Ry(yaw)·Rx(pitch)·Rz(roll):
///   yaw   = atan2(R[0][2], R[2][2]) = atan2(2(xz+wy), 1 - 2(x²+y²))
///   pitch = asin(-R[1][2])          = asin(2(wx-yz))
///   roll  = atan2(R[1][0], R[1][1]) = atan2(2(xy+wz), 1 - 2(x²+z²))
pub fn quaternion_to_euler(q: [f64; 4]) -> Vec3 {
    let len = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
    if len == 0.0 || !len.is_finite() {
        return ZERO;
    }
    let (x, y, z, w) = (q[0] / len, q[1] / len, q[2] / len, q[3] / len);

    let yaw = (2.0 * (x * z + w * y)).atan2(1.0 - 2.0 * (x * x + y * y));
    let pitch = (2.0 * (w * x - y * z)).clamp(-1.0, 1.0).asin();
    let roll = (2.0 * (x * y + w * z)).atan2(1.0 - 2.0 * (x * x + z * z));
    [yaw.to_degrees(), pitch.to_degrees(), roll.to_degrees()]
}

/// Row-major 3x3 matrix times vector.
pub fn mat_mul_vec(m: &[[f64; 3]; 3], v: Vec3) -> Vec3 {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}
