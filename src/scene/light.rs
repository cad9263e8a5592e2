//! Light types for the scene

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use super::NodeId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// Positioned light with `1 / (constant + linear d + quadratic d^2)` falloff
    Point {
        constant: f32,
        linear: f32,
        quadratic: f32,
    },
    /// Infinitely distant light shining along its node's -Z axis
    Directional,
}

/// A light attached to a scene node.
///
/// Position and direction come from the node's world transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub color: Vec3,
    pub kind: LightKind,
    pub casts_shadows: bool,
}

impl Light {
    pub fn point(color: Vec3) -> Self {
        Self {
            color,
            kind: LightKind::Point {
                constant: 1.0,
                linear: 0.0,
                quadratic: 0.0,
            },
            casts_shadows: false,
        }
    }

    pub fn directional(color: Vec3) -> Self {
        Self {
            color,
            kind: LightKind::Directional,
            casts_shadows: false,
        }
    }

    /// Only meaningful for point lights
    pub fn with_attenuation(mut self, constant: f32, linear: f32, quadratic: f32) -> Self {
        if let LightKind::Point { .. } = self.kind {
            self.kind = LightKind::Point {
                constant,
                linear,
                quadratic,
            };
        }
        self
    }

    pub fn with_shadows(mut self, casts_shadows: bool) -> Self {
        self.casts_shadows = casts_shadows;
        self
    }
}

/// A visible light resolved to world space for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectedLight {
    pub node: NodeId,
    pub light: Light,
    pub position: Vec3,
    /// Unit vector the light shines along
    pub direction: Vec3,
}

impl CollectedLight {
    /// Pack into the lighting shader layout, in the eye space of `view`
    pub fn to_gpu(&self, view: Mat4) -> GpuLight {
        let (position, attenuation) = match self.light.kind {
            LightKind::Point {
                constant,
                linear,
                quadratic,
            } => (
                view.transform_point3(self.position).extend(1.0),
                Vec4::new(constant, linear, quadratic, 0.0),
            ),
            LightKind::Directional => (
                view.transform_vector3(-self.direction)
                    .normalize_or_zero()
                    .extend(0.0),
                Vec4::new(1.0, 0.0, 0.0, 0.0),
            ),
        };
        GpuLight {
            position,
            color: self.light.color.extend(1.0),
            attenuation,
        }
    }
}

/// GPU-friendly light data structure
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GpuLight {
    /// xyz = eye-space position (w = 1) or direction towards the light (w = 0)
    pub position: Vec4,
    pub color: Vec4,
    /// x = constant, y = linear, z = quadratic
    pub attenuation: Vec4,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directional_points_towards_the_light() {
        let collected = CollectedLight {
            node: NodeId(0),
            light: Light::directional(Vec3::ONE),
            position: Vec3::ZERO,
            direction: Vec3::NEG_Y,
        };
        let gpu = collected.to_gpu(Mat4::IDENTITY);
        assert_eq!(gpu.position, Vec4::new(0.0, 1.0, 0.0, 0.0));
    }

    #[test]
    fn test_point_light_moves_into_eye_space() {
        let collected = CollectedLight {
            node: NodeId(0),
            light: Light::point(Vec3::ONE).with_attenuation(1.0, 0.1, 0.01),
            position: Vec3::new(0.0, 0.0, -2.0),
            direction: Vec3::NEG_Z,
        };
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -3.0));
        let gpu = collected.to_gpu(view);
        assert_eq!(gpu.position, Vec4::new(0.0, 0.0, -5.0, 1.0));
        assert_eq!(gpu.attenuation, Vec4::new(1.0, 0.1, 0.01, 0.0));
    }

    #[test]
    fn test_attenuation_ignored_for_directional() {
        let light = Light::directional(Vec3::ONE).with_attenuation(0.0, 1.0, 1.0);
        assert_eq!(light.kind, LightKind::Directional);
    }
}
