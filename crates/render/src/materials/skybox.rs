use super::shaders::SKYBOX_SHADER;
use crate::device::{CullMode, TextureDimension, TextureId};
use crate::material::{Material, ShaderSource, TextureSlot, TransformLayout};
use crate::uniform::{UniformBlock, UniformContext, UniformError};
use crate::vertex::VertexLayout;
use glam::Vec4;

const SLOTS: &[TextureSlot] = &[TextureSlot::required("env_map", TextureDimension::Cube)];

/// Environment background sampled from a cube map. Bind it through
/// `Scene::set_environment`; it is never attached to a mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyboxMaterial {
    env_map: Option<TextureId>,
    pub intensity: f32,
    revision: u64,
}

impl SkyboxMaterial {
    pub const PARAMS_OFFSET: usize = 0;
    pub const UNIFORM_SIZE: usize = 64 + 16;

    pub fn new(env_map: Option<TextureId>) -> Self {
        Self {
            env_map,
            intensity: 1.0,
            revision: 0,
        }
    }

    pub fn env_map(&self) -> Option<TextureId> {
        self.env_map
    }

    pub fn set_env_map(&mut self, env_map: Option<TextureId>) {
        if self.env_map != env_map {
            self.env_map = env_map;
            self.revision += 1;
        }
    }
}

impl Material for SkyboxMaterial {
    fn material_type(&self) -> &str {
        "skybox"
    }

    fn shader(&self) -> ShaderSource {
        ShaderSource::from_static(SKYBOX_SHADER)
    }

    fn vertex_layout(&self) -> VertexLayout {
        VertexLayout::empty()
    }

    fn transform_layout(&self) -> TransformLayout {
        TransformLayout::Environment
    }

    fn uniform_size(&self) -> usize {
        Self::UNIFORM_SIZE
    }

    fn texture_slots(&self) -> &[TextureSlot] {
        SLOTS
    }

    fn texture(&self, slot: &str) -> Option<TextureId> {
        match slot {
            "env_map" => self.env_map,
            _ => None,
        }
    }

    fn binding_revision(&self) -> u64 {
        self.revision
    }

    fn cull_mode(&self) -> CullMode {
        CullMode::None
    }

    fn write_uniforms(&self, block: &mut UniformBlock<'_>, _ctx: &UniformContext<'_>) -> Result<(), UniformError> {
        block.write_vec4(Self::PARAMS_OFFSET, Vec4::new(self.intensity, 0.0, 0.0, 0.0))
    }
}
