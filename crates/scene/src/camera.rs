use glam::{Mat4, Quat, Vec3};
use lumen_common::Transform;
use serde::{Deserialize, Serialize};

/// Projection model of a camera. The aspect ratio is supplied by the render
/// target at frame time, never stored here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    Perspective { fov_y: f32, near: f32, far: f32 },
    Orthographic { height: f32, near: f32, far: f32 },
}

impl Default for Projection {
    fn default() -> Self {
        Self::Perspective {
            fov_y: 60.0_f32.to_radians(),
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// Camera with a world transform and a projection.
///
/// The camera looks down its local -Z axis with +Y up.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Camera {
    pub transform: Transform,
    pub projection: Projection,
}

impl Camera {
    pub fn perspective(fov_y_degrees: f32, near: f32, far: f32) -> Self {
        Self {
            transform: Transform::default(),
            projection: Projection::Perspective {
                fov_y: fov_y_degrees.to_radians(),
                near,
                far,
            },
        }
    }

    pub fn orthographic(height: f32, near: f32, far: f32) -> Self {
        Self {
            transform: Transform::default(),
            projection: Projection::Orthographic { height, near, far },
        }
    }

    /// Place the camera at `eye` looking at `target`.
    pub fn looking_at(mut self, eye: Vec3, target: Vec3, up: Vec3) -> Self {
        let view = Mat4::look_at_rh(eye, target, up);
        let (_, rotation, _) = view.inverse().to_scale_rotation_translation();
        self.transform.position = eye;
        self.transform.rotation = rotation;
        self
    }

    pub fn position(&self) -> Vec3 {
        self.transform.position
    }

    pub fn forward(&self) -> Vec3 {
        self.transform.rotation * Vec3::NEG_Z
    }

    /// World matrix without scale; cameras never scale their view.
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.transform.rotation, self.transform.position)
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.world_matrix().inverse()
    }

    /// View matrix with the translation removed, used for background passes.
    pub fn rotation_view_matrix(&self) -> Mat4 {
        Mat4::from_quat(self.transform.rotation.inverse())
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        let aspect = if aspect.is_finite() && aspect > 0.0 {
            aspect
        } else {
            1.0
        };
        match self.projection {
            Projection::Perspective { fov_y, near, far } => {
                Mat4::perspective_rh(fov_y, aspect, near, far)
            }
            Projection::Orthographic { height, near, far } => {
                let half_h = height * 0.5;
                let half_w = half_h * aspect;
                Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, near, far)
            }
        }
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.transform.rotation = rotation;
    }
}
