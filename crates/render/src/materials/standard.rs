use super::shaders::STANDARD_SHADER;
use crate::device::{TextureDimension, TextureId};
use crate::material::{Material, ShaderSource, TextureSlot, TransformLayout};
use crate::placeholder::Placeholder;
use crate::uniform::{LightSlots, UniformBlock, UniformContext, UniformError};
use crate::vertex::{AttributeSemantic, VertexFormat, VertexLayout};
use glam::Vec4;
use lumen_common::Color;

const LIGHT_SLOTS: usize = 4;

const PRIMARY_SLOTS: &[TextureSlot] = &[
    TextureSlot::optional("color_map", TextureDimension::D2, Placeholder::White),
    TextureSlot::optional("normal_map", TextureDimension::D2, Placeholder::FlatNormal),
];

const SECONDARY_SLOTS: &[TextureSlot] =
    &[TextureSlot::optional("env_map", TextureDimension::Cube, Placeholder::Black)];

/// Lit material with up to [`StandardMaterial::MAX_LIGHTS`] lights.
///
/// Block layout after the 192-byte world header:
///
/// ```text
/// +0   base_color       vec4
/// +16  emissive         vec4
/// +32  camera_position  vec4
/// +48  params           vec4  roughness, metallic, env intensity, has env map
/// +64  lights           LightSlots<4>
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StandardMaterial {
    pub base_color: Color,
    pub emissive: Color,
    pub roughness: f32,
    pub metallic: f32,
    pub env_intensity: f32,
    color_map: Option<TextureId>,
    normal_map: Option<TextureId>,
    env_map: Option<TextureId>,
    revision: u64,
}

impl Default for StandardMaterial {
    fn default() -> Self {
        Self {
            base_color: Color::WHITE,
            emissive: Color::BLACK,
            roughness: 0.5,
            metallic: 0.0,
            env_intensity: 1.0,
            color_map: None,
            normal_map: None,
            env_map: None,
            revision: 0,
        }
    }
}

impl StandardMaterial {
    pub const MAX_LIGHTS: usize = LIGHT_SLOTS;
    pub const BASE_COLOR_OFFSET: usize = 0;
    pub const EMISSIVE_OFFSET: usize = 16;
    pub const CAMERA_OFFSET: usize = 32;
    pub const PARAMS_OFFSET: usize = 48;
    pub const LIGHTS_OFFSET: usize = 64;
    pub const UNIFORM_SIZE: usize = 192 + Self::LIGHTS_OFFSET + LightSlots::<LIGHT_SLOTS>::BLOCK_SIZE;

    pub fn new(base_color: Color) -> Self {
        Self {
            base_color,
            ..Self::default()
        }
    }

    fn swap(slot: &mut Option<TextureId>, texture: Option<TextureId>, revision: &mut u64) {
        if *slot != texture {
            *slot = texture;
            *revision += 1;
        }
    }

    pub fn set_color_map(&mut self, texture: Option<TextureId>) {
        Self::swap(&mut self.color_map, texture, &mut self.revision);
    }

    pub fn set_normal_map(&mut self, texture: Option<TextureId>) {
        Self::swap(&mut self.normal_map, texture, &mut self.revision);
    }

    pub fn set_env_map(&mut self, texture: Option<TextureId>) {
        Self::swap(&mut self.env_map, texture, &mut self.revision);
    }

    /// Signal that a bound texture's contents were replaced in place.
    pub fn touch_textures(&mut self) {
        self.revision += 1;
    }
}

impl Material for StandardMaterial {
    fn material_type(&self) -> &str {
        "standard"
    }

    fn shader(&self) -> ShaderSource {
        ShaderSource::from_static(STANDARD_SHADER)
    }

    fn vertex_layout(&self) -> VertexLayout {
        VertexLayout::packed(&[
            (AttributeSemantic::Position, VertexFormat::Float32x3),
            (AttributeSemantic::Normal, VertexFormat::Float32x3),
            (AttributeSemantic::Uv, VertexFormat::Float32x2),
            (AttributeSemantic::Tangent, VertexFormat::Float32x4),
        ])
    }

    fn transform_layout(&self) -> TransformLayout {
        TransformLayout::World
    }

    fn uniform_size(&self) -> usize {
        Self::UNIFORM_SIZE
    }

    fn texture_slots(&self) -> &[TextureSlot] {
        PRIMARY_SLOTS
    }

    fn secondary_slots(&self) -> &[TextureSlot] {
        SECONDARY_SLOTS
    }

    fn texture(&self, slot: &str) -> Option<TextureId> {
        match slot {
            "color_map" => self.color_map,
            "normal_map" => self.normal_map,
            "env_map" => self.env_map,
            _ => None,
        }
    }

    fn binding_revision(&self) -> u64 {
        self.revision
    }

    fn write_uniforms(&self, block: &mut UniformBlock<'_>, ctx: &UniformContext<'_>) -> Result<(), UniformError> {
        block.write_color(Self::BASE_COLOR_OFFSET, self.base_color)?;
        block.write_color(Self::EMISSIVE_OFFSET, self.emissive)?;
        block.write_vec4(Self::CAMERA_OFFSET, ctx.camera_position.extend(1.0))?;
        let has_env = if self.env_map.is_some() { 1.0 } else { 0.0 };
        block.write_vec4(
            Self::PARAMS_OFFSET,
            Vec4::new(self.roughness, self.metallic, self.env_intensity, has_env),
        )?;
        let lights = LightSlots::<LIGHT_SLOTS>::pack(ctx.lights);
        if lights.dropped > 0 {
            tracing::trace!(dropped = lights.dropped, "light slots full");
        }
        lights.write(block, Self::LIGHTS_OFFSET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_size_matches_shader_struct() {
        // 3 matrices + 5 vec4 + count vec4 + 4 lights
        assert_eq!(StandardMaterial::UNIFORM_SIZE, 192 + 16 * 6 + 48 * 4);
        assert_eq!(StandardMaterial::UNIFORM_SIZE % 16, 0);
    }

    #[test]
    fn env_map_lives_in_the_secondary_group() {
        let mut m = StandardMaterial::default();
        m.set_env_map(Some(TextureId(3)));
        assert_eq!(m.secondary_slots()[0].name, "env_map");
        assert_eq!(m.texture("env_map"), Some(TextureId(3)));
        assert_eq!(m.binding_revision(), 1);
    }
}
