//! GPU device abstraction.
//!
//! The caches and the frame renderer talk to the GPU only through
//! [`RenderDevice`]. Resources are referred to by plain integer handles so
//! that ownership stays with the renderer's tables; a backend maps handles to
//! its native objects. Bind groups need no explicit destruction on most
//! backends, but [`RenderDevice::release_bind_group`] lets a backend drop its
//! table entry.

use crate::error::DeviceError;
use crate::material::ShaderSource;
use crate::vertex::{IndexFormat, Topology, VertexLayout};
use lumen_common::Color;
use serde::{Deserialize, Serialize};
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SamplerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindGroupId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: String,
    pub size: u64,
    pub usage: BufferUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Depth32Float,
    Depth24Plus,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth32Float | Self::Depth24Plus)
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Rgba16Float => 8,
            _ => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureDimension {
    D2,
    Cube,
}

impl TextureDimension {
    pub fn layers(self) -> u32 {
        match self {
            Self::D2 => 1,
            Self::Cube => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureUsage {
    /// Sampled from shaders, filled by upload.
    Sampled,
    /// Render attachment (color or depth target).
    Attachment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub dimension: TextureDimension,
    pub format: TextureFormat,
    pub sample_count: u32,
    pub usage: TextureUsage,
}

impl TextureDesc {
    /// Sampled texture description.
    pub fn sampled(
        label: impl Into<String>,
        width: u32,
        height: u32,
        dimension: TextureDimension,
        format: TextureFormat,
    ) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            dimension,
            format,
            sample_count: 1,
            usage: TextureUsage::Sampled,
        }
    }

    /// Bytes expected by an upload covering every layer.
    pub fn data_size(&self) -> usize {
        self.width as usize
            * self.height as usize
            * self.dimension.layers() as usize
            * self.format.bytes_per_pixel() as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Repeat,
    ClampToEdge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerDesc {
    pub label: String,
    pub filter: FilterMode,
    pub address: AddressMode,
}

/// Shape of one binding inside a bind group; the binding index is its
/// position in the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    UniformBuffer,
    Texture(TextureDimension),
    Sampler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Less,
    LessEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Back,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthState {
    pub format: TextureFormat,
    pub write_enabled: bool,
    pub compare: CompareFunction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDesc {
    pub label: String,
    pub shader: ShaderSource,
    /// `None` means the vertex stage takes no vertex buffer.
    pub vertex_layout: Option<VertexLayout>,
    pub topology: Topology,
    pub cull_mode: CullMode,
    pub bind_groups: Vec<Vec<BindingKind>>,
    pub color_format: TextureFormat,
    pub depth: DepthState,
    pub sample_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingResource {
    Buffer(BufferId),
    Texture(TextureId),
    Sampler(SamplerId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindGroupDesc {
    pub label: String,
    pub pipeline: PipelineId,
    pub group: u32,
    pub resources: Vec<BindingResource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawCommand {
    SetPipeline(PipelineId),
    SetBindGroup { index: u32, group: BindGroupId },
    SetVertexBuffer(BufferId),
    SetIndexBuffer { buffer: BufferId, format: IndexFormat },
    Draw { vertices: Range<u32> },
    DrawIndexed { indices: Range<u32> },
}

/// Where the pass renders color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorAttachment {
    /// Straight into the presentable surface.
    Surface,
    /// Into a multisampled texture resolved into the surface at pass end.
    MultisampledResolve(TextureId),
}

/// One fully recorded render pass, handed to the device for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPass {
    pub label: String,
    pub color: ColorAttachment,
    pub depth: TextureId,
    pub clear_color: Color,
    pub clear_depth: f32,
    pub commands: Vec<DrawCommand>,
}

impl RecordedPass {
    pub fn draw_calls(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Draw { .. } | DrawCommand::DrawIndexed { .. }))
            .count()
    }
}

/// Minimal explicit-API device used by the renderer.
pub trait RenderDevice {
    fn create_buffer(&mut self, desc: &BufferDesc, contents: Option<&[u8]>) -> Result<BufferId, DeviceError>;
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), DeviceError>;
    fn destroy_buffer(&mut self, buffer: BufferId);

    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> Result<TextureId, DeviceError>;
    fn destroy_texture(&mut self, texture: TextureId);

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerId, DeviceError>;
    fn destroy_sampler(&mut self, sampler: SamplerId);

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineId, DeviceError>;
    fn destroy_pipeline(&mut self, pipeline: PipelineId);

    fn create_bind_group(&mut self, desc: &BindGroupDesc) -> Result<BindGroupId, DeviceError>;
    fn release_bind_group(&mut self, group: BindGroupId);

    /// Current size of the presentable surface in pixels.
    fn surface_size(&self) -> (u32, u32);
    fn surface_format(&self) -> TextureFormat;
    fn resize_surface(&mut self, width: u32, height: u32) -> Result<(), DeviceError>;

    /// Encode `pass`, submit it to the queue and present the surface.
    fn submit(&mut self, pass: &RecordedPass) -> Result<(), DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_texture_data_size_covers_six_layers() {
        let desc = TextureDesc::sampled("cube", 2, 2, TextureDimension::Cube, TextureFormat::Rgba8Unorm);
        assert_eq!(desc.data_size(), 2 * 2 * 6 * 4);
    }

    #[test]
    fn draw_call_count_ignores_state_changes() {
        let pass = RecordedPass {
            label: "frame".into(),
            color: ColorAttachment::Surface,
            depth: TextureId(0),
            clear_color: Color::BLACK,
            clear_depth: 1.0,
            commands: vec![
                DrawCommand::SetPipeline(PipelineId(1)),
                DrawCommand::Draw { vertices: 0..3 },
                DrawCommand::DrawIndexed { indices: 0..6 },
            ],
        };
        assert_eq!(pass.draw_calls(), 2);
    }
}
