//! Node transforms

use glam::{Mat4, Quat, Vec3};

/// Local placement of a scene node relative to its parent.
///
/// Scale is uniform so normals only need the rotation part of the model
/// matrix after renormalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: 1.0,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Orient so local -Z points from `position` towards `target`
    pub fn looking_at(mut self, target: Vec3, up: Vec3) -> Self {
        let forward = (target - self.position).normalize_or_zero();
        if forward != Vec3::ZERO {
            self.rotation = look_rotation(forward, up);
        }
        self
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(Vec3::splat(self.scale), self.rotation, self.position)
    }

    /// Local -Z in parent space
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
    }

    /// Rotate by euler angles (radians), applied in parent space
    pub fn rotate_euler(&mut self, euler: Vec3) {
        let delta = Quat::from_euler(glam::EulerRot::XYZ, euler.x, euler.y, euler.z);
        self.rotation = (delta * self.rotation).normalize();
    }
}

/// Rotation taking local -Z to `forward`, keeping local +Y close to `up`.
/// Falls back to another up vector when `forward` is parallel to `up`.
pub fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
    let forward = forward.normalize();
    let up = if forward.cross(up).length_squared() < 1e-8 {
        if forward.y.abs() < 0.99 {
            Vec3::Y
        } else {
            Vec3::Z
        }
    } else {
        up
    };
    let right = forward.cross(up).normalize();
    let up = right.cross(forward);
    Quat::from_mat3(&glam::Mat3::from_cols(right, up, -forward))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looking_at_points_forward_at_target() {
        let t = Transform::from_position(Vec3::new(0.0, 0.0, 5.0)).looking_at(Vec3::ZERO, Vec3::Y);
        assert!((t.forward() - Vec3::NEG_Z).length() < 1e-5);

        let t = Transform::from_position(Vec3::ZERO).looking_at(Vec3::new(3.0, 0.0, 0.0), Vec3::Y);
        assert!((t.forward() - Vec3::X).length() < 1e-5);
        assert!((t.up() - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_straight_down_does_not_degenerate() {
        let t = Transform::from_position(Vec3::Y).looking_at(Vec3::ZERO, Vec3::Y);
        assert!((t.forward() - Vec3::NEG_Y).length() < 1e-5);
        assert!(t.rotation.is_normalized());
    }

    #[test]
    fn test_matrix_applies_uniform_scale() {
        let t = Transform::from_position(Vec3::X).with_scale(2.0);
        let p = t.matrix().transform_point3(Vec3::Y);
        assert!((p - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-6);
    }
}
