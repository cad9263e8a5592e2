//! Camera and per-pass view parameters

use glam::{Mat3, Mat4, Quat, Vec3, Vec4};

use super::transform::look_rotation;
use crate::backend::types::{CameraUniform, FrontFace};
use crate::resources::CubeFace;

/// Perspective camera placed by position and orientation
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    /// Unit quaternion; the camera looks along local -Z
    pub orientation: Quat,
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 3.0),
            orientation: Quat::IDENTITY,
            fov_y: 60f32.to_radians(),
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn with_fov_degrees(mut self, fov: f32) -> Self {
        self.fov_y = fov.to_radians();
        self
    }

    pub fn with_depth_range(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let forward = target - self.position;
        if forward.length_squared() > 0.0 {
            self.orientation = look_rotation(forward, up);
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.orientation * Vec3::NEG_Z
    }

    /// Inverse of the camera's world transform
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position).inverse()
    }

    pub fn view_params(&self, aspect: f32) -> ViewParams {
        ViewParams {
            view: self.view_matrix(),
            proj: Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far),
            eye: self.position,
            near: self.near,
            far: self.far,
            flip_y: false,
        }
    }
}

/// Immutable view and projection for one sub-pass.
///
/// The main camera, each cube-map face and the shadow map all render from a
/// `ViewParams`; overriding the view never touches the scene's camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewParams {
    pub view: Mat4,
    pub proj: Mat4,
    pub eye: Vec3,
    pub near: f32,
    pub far: f32,
    /// Projection is mirrored top to bottom
    pub flip_y: bool,
}

impl ViewParams {
    /// 90 degree square view from `center` through one face of a cube map.
    /// The image is flipped vertically to match cube map texel layout.
    pub fn cube_face(center: Vec3, face: CubeFace, near: f32, far: f32) -> Self {
        let view = Mat4::look_at_rh(center, center + face.direction(), face.up());
        let proj = Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
            * Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, near, far);
        Self {
            view,
            proj,
            eye: center,
            near,
            far,
            flip_y: true,
        }
    }

    /// Square perspective view from a light towards `direction`
    pub fn shadow(position: Vec3, direction: Vec3, fov_y: f32, near: f32, far: f32) -> Self {
        let rotation = look_rotation(direction, Vec3::Y);
        let view = Mat4::from_rotation_translation(rotation, position).inverse();
        Self {
            view,
            proj: Mat4::perspective_rh(fov_y, 1.0, near, far),
            eye: position,
            near,
            far,
            flip_y: false,
        }
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj * self.view
    }

    /// Mirroring the projection reverses screen-space winding
    pub fn front_face(&self) -> FrontFace {
        if self.flip_y {
            FrontFace::Cw
        } else {
            FrontFace::Ccw
        }
    }

    /// Rotation from eye space back to world space
    pub fn inv_view_rotation(&self) -> Mat3 {
        Mat3::from_mat4(self.view).transpose()
    }

    pub fn camera_uniform(&self) -> CameraUniform {
        let flip = if self.flip_y { -1.0 } else { 1.0 };
        CameraUniform {
            view: self.view,
            proj: self.proj,
            view_proj: self.view_proj(),
            inv_proj: self.proj.inverse(),
            position: self.eye.extend(1.0),
            near_far: Vec4::new(self.near, self.far, flip, 0.0),
        }
    }
}
