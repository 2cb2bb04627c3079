//! Rotation that aligns a measured gravity vector with the canonical down axis.
use constants::coordinate_system::{DOWN_AXIS, GRAVITY_AXIS_EPSILON};
use glam::{Mat3, Quat, Vec3};

/// Rotation mapping `gravity` onto `(0, -1, 0)`.
///
/// Zero-length gravity and gravity parallel or antiparallel to the down axis
/// (zero cross product) produce the identity.
pub fn alignment_rotation(gravity: Vec3) -> Mat3 {
    let down = Vec3::from_array(DOWN_AXIS);
    let Some(direction) = gravity.try_normalize() else {
        return Mat3::IDENTITY;
    };

    let axis = direction.cross(down);
    if axis.length() < GRAVITY_AXIS_EPSILON {
        return Mat3::IDENTITY;
    }

    let angle = direction.dot(down).clamp(-1.0, 1.0).acos();
    Mat3::from_quat(Quat::from_axis_angle(axis.normalize(), angle))
}

/// Optional rotation, skipping identity so callers can avoid the multiply.
pub fn optional_alignment(gravity: Option<Vec3>) -> Option<Mat3> {
    gravity
        .map(alignment_rotation)
        .filter(|rotation| *rotation != Mat3::IDENTITY)
}
