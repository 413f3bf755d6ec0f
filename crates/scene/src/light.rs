use glam::{Mat4, Vec3};
use lumen_common::Color;
use serde::{Deserialize, Serialize};

/// Light attached to a scene node.
///
/// Position and direction come from the owning node's world transform:
/// point lights sit at the node origin, directional lights shine along the
/// node's local -Z axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Light {
    Ambient { color: Color, intensity: f32 },
    Directional { color: Color, intensity: f32 },
    Point { color: Color, intensity: f32, range: f32 },
}

impl Light {
    pub fn ambient(color: Color, intensity: f32) -> Self {
        Self::Ambient { color, intensity }
    }

    pub fn directional(color: Color, intensity: f32) -> Self {
        Self::Directional { color, intensity }
    }

    pub fn point(color: Color, intensity: f32, range: f32) -> Self {
        Self::Point {
            color,
            intensity,
            range,
        }
    }

    /// Resolve the light against its node's world matrix.
    pub fn to_world(&self, world: Mat4) -> WorldLight {
        match *self {
            Self::Ambient { color, intensity } => WorldLight::Ambient { color, intensity },
            Self::Directional { color, intensity } => WorldLight::Directional {
                color,
                intensity,
                direction: world.transform_vector3(Vec3::NEG_Z).normalize_or_zero(),
            },
            Self::Point {
                color,
                intensity,
                range,
            } => WorldLight::Point {
                color,
                intensity,
                position: world.transform_point3(Vec3::ZERO),
                range,
            },
        }
    }
}

/// A light resolved into world space for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorldLight {
    Ambient {
        color: Color,
        intensity: f32,
    },
    Directional {
        color: Color,
        intensity: f32,
        direction: Vec3,
    },
    Point {
        color: Color,
        intensity: f32,
        position: Vec3,
        range: f32,
    },
}

impl WorldLight {
    pub fn is_ambient(&self) -> bool {
        matches!(self, Self::Ambient { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn point_light_takes_node_position() {
        let world = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let light = Light::point(Color::WHITE, 2.0, 10.0).to_world(world);
        match light {
            WorldLight::Point { position, .. } => assert_eq!(position, Vec3::new(1.0, 2.0, 3.0)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn directional_light_follows_rotation() {
        let world = Mat4::from_quat(Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2));
        let light = Light::directional(Color::WHITE, 1.0).to_world(world);
        match light {
            WorldLight::Directional { direction, .. } => {
                assert!((direction - Vec3::NEG_Y).length() < 1e-5)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ambient_is_flagged() {
        assert!(Light::ambient(Color::WHITE, 0.2)
            .to_world(Mat4::IDENTITY)
            .is_ambient());
    }
}
