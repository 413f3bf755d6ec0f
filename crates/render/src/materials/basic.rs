use super::shaders::BASIC_SHADER;
use crate::device::{TextureDimension, TextureId};
use crate::material::{Material, ShaderSource, TextureSlot};
use crate::placeholder::Placeholder;
use crate::uniform::{UniformBlock, UniformContext, UniformError};
use crate::vertex::{AttributeSemantic, Topology, VertexFormat, VertexLayout};
use lumen_common::Color;

const SLOTS: &[TextureSlot] = &[TextureSlot::optional("map", TextureDimension::D2, Placeholder::White)];

/// Unlit color with an optional texture. Wireframe mode draws the unique
/// triangle edges as a line list.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicMaterial {
    color: Color,
    map: Option<TextureId>,
    wireframe: bool,
    revision: u64,
}

impl Default for BasicMaterial {
    fn default() -> Self {
        Self::new(Color::WHITE)
    }
}

impl BasicMaterial {
    pub const COLOR_OFFSET: usize = 0;
    pub const UNIFORM_SIZE: usize = 64 + 16;

    pub fn new(color: Color) -> Self {
        Self {
            color,
            map: None,
            wireframe: false,
            revision: 0,
        }
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    pub fn set_map(&mut self, map: Option<TextureId>) {
        if self.map != map {
            self.map = map;
            self.revision += 1;
        }
    }

    pub fn set_wireframe(&mut self, wireframe: bool) {
        self.wireframe = wireframe;
    }
}

impl Material for BasicMaterial {
    fn material_type(&self) -> &str {
        "basic"
    }

    fn topology(&self) -> Topology {
        if self.wireframe {
            Topology::LineList
        } else {
            Topology::TriangleList
        }
    }

    fn shader(&self) -> ShaderSource {
        ShaderSource::from_static(BASIC_SHADER)
    }

    fn vertex_layout(&self) -> VertexLayout {
        VertexLayout::packed(&[
            (AttributeSemantic::Position, VertexFormat::Float32x3),
            (AttributeSemantic::Uv, VertexFormat::Float32x2),
        ])
    }

    fn uniform_size(&self) -> usize {
        Self::UNIFORM_SIZE
    }

    fn texture_slots(&self) -> &[TextureSlot] {
        SLOTS
    }

    fn texture(&self, slot: &str) -> Option<TextureId> {
        match slot {
            "map" => self.map,
            _ => None,
        }
    }

    fn binding_revision(&self) -> u64 {
        self.revision
    }

    fn write_uniforms(&self, block: &mut UniformBlock<'_>, _ctx: &UniformContext<'_>) -> Result<(), UniformError> {
        block.write_color(Self::COLOR_OFFSET, self.color)
    }
}
