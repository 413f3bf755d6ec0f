use super::shaders::NORMAL_SHADER;
use crate::material::{Material, ShaderSource, TransformLayout};
use crate::uniform::{UniformBlock, UniformContext, UniformError};
use crate::vertex::{AttributeSemantic, VertexFormat, VertexLayout};
use glam::Vec4;

/// Debug material coloring surfaces by their world-space normal.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalMaterial {
    pub opacity: f32,
}

impl Default for NormalMaterial {
    fn default() -> Self {
        Self { opacity: 1.0 }
    }
}

impl NormalMaterial {
    pub const PARAMS_OFFSET: usize = 0;
    pub const UNIFORM_SIZE: usize = 192 + 16;
}

impl Material for NormalMaterial {
    fn material_type(&self) -> &str {
        "normal"
    }

    fn shader(&self) -> ShaderSource {
        ShaderSource::from_static(NORMAL_SHADER)
    }

    fn vertex_layout(&self) -> VertexLayout {
        VertexLayout::packed(&[
            (AttributeSemantic::Position, VertexFormat::Float32x3),
            (AttributeSemantic::Normal, VertexFormat::Float32x3),
        ])
    }

    fn transform_layout(&self) -> TransformLayout {
        TransformLayout::World
    }

    fn uniform_size(&self) -> usize {
        Self::UNIFORM_SIZE
    }

    fn write_uniforms(&self, block: &mut UniformBlock<'_>, _ctx: &UniformContext<'_>) -> Result<(), UniformError> {
        block.write_vec4(Self::PARAMS_OFFSET, Vec4::new(self.opacity, 0.0, 0.0, 0.0))
    }
}
