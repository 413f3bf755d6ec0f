//! The material contract.
//!
//! A material declares everything the renderer needs to build and feed a
//! pipeline: a stable type tag, topology, shader, vertex layout, uniform size,
//! texture slots and a binding revision. Two materials that report the same
//! `(material_type, topology)` must declare identical shaders and layouts,
//! since they share one compiled pipeline.

use crate::device::{CullMode, TextureDimension, TextureId};
use crate::placeholder::Placeholder;
use crate::uniform::{UniformBlock, UniformContext, UniformError};
use crate::vertex::{Topology, VertexLayout};
use std::any::Any;
use std::borrow::Cow;
use std::hash::{DefaultHasher, Hash, Hasher};

/// WGSL module plus its stage entry points.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderSource {
    pub wgsl: Cow<'static, str>,
    pub vertex_entry: &'static str,
    pub fragment_entry: &'static str,
}

impl ShaderSource {
    pub const fn from_static(wgsl: &'static str) -> Self {
        Self {
            wgsl: Cow::Borrowed(wgsl),
            vertex_entry: "vs_main",
            fragment_entry: "fs_main",
        }
    }

    /// Content hash used to decide whether a compiled pipeline can be kept
    /// when the material object behind it changes.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Which transform matrices the renderer writes at the start of the uniform
/// buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformLayout {
    /// `mvp` at 0.
    ModelViewProjection,
    /// `mvp` at 0, `model` at 64, inverse-transpose `normal` matrix at 128.
    World,
    /// Inverse of `projection * view_without_translation` at 0, for
    /// background passes that reconstruct view directions.
    Environment,
}

impl TransformLayout {
    pub const MVP_OFFSET: usize = 0;
    pub const MODEL_OFFSET: usize = 64;
    pub const NORMAL_MATRIX_OFFSET: usize = 128;

    /// Size of the renderer-owned header; the material block starts here.
    pub const fn header_size(self) -> usize {
        match self {
            Self::ModelViewProjection | Self::Environment => 64,
            Self::World => 192,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotRequirement {
    Required,
    Optional,
}

/// A texture binding declared by a material. Every slot binds a texture and
/// a sampler, in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSlot {
    pub name: &'static str,
    pub dimension: TextureDimension,
    pub requirement: SlotRequirement,
    /// Bound in place of the texture when an optional slot is empty.
    pub placeholder: Placeholder,
}

impl TextureSlot {
    pub const fn optional(name: &'static str, dimension: TextureDimension, placeholder: Placeholder) -> Self {
        Self {
            name,
            dimension,
            requirement: SlotRequirement::Optional,
            placeholder,
        }
    }

    pub const fn required(name: &'static str, dimension: TextureDimension) -> Self {
        Self {
            name,
            dimension,
            requirement: SlotRequirement::Required,
            placeholder: Placeholder::Black,
        }
    }
}

/// Pluggable material. Implementations are owned by the scene; the renderer
/// only reads them. Applications reach their concrete type again through
/// `<dyn Material>::downcast_mut` to edit fields.
pub trait Material: Any {
    /// Stable type tag. Part of the pipeline cache key.
    fn material_type(&self) -> &str;

    fn topology(&self) -> Topology {
        Topology::TriangleList
    }

    fn shader(&self) -> ShaderSource;

    fn vertex_layout(&self) -> VertexLayout;

    fn transform_layout(&self) -> TransformLayout {
        TransformLayout::ModelViewProjection
    }

    /// Total uniform buffer size in bytes, header included.
    fn uniform_size(&self) -> usize;

    /// Slots of bind group 0, bound after the uniform buffer.
    fn texture_slots(&self) -> &[TextureSlot] {
        &[]
    }

    /// Slots of bind group 1. No second group is created when empty.
    fn secondary_slots(&self) -> &[TextureSlot] {
        &[]
    }

    /// Texture currently bound to the named slot, from either group.
    fn texture(&self, _slot: &str) -> Option<TextureId> {
        None
    }

    /// Bumped whenever bound textures change identity or content.
    fn binding_revision(&self) -> u64 {
        0
    }

    fn cull_mode(&self) -> CullMode {
        CullMode::Back
    }

    /// Write material fields into the block that follows the transform
    /// header. Offsets are relative to the block start.
    fn write_uniforms(&self, block: &mut UniformBlock<'_>, ctx: &UniformContext<'_>) -> Result<(), UniformError>;
}

impl dyn Material {
    pub fn downcast_ref<T: Material>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref()
    }

    pub fn downcast_mut<T: Material>(&mut self) -> Option<&mut T> {
        (self as &mut dyn Any).downcast_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_sizes() {
        assert_eq!(TransformLayout::ModelViewProjection.header_size(), 64);
        assert_eq!(TransformLayout::World.header_size(), 192);
        assert_eq!(TransformLayout::Environment.header_size(), 64);
    }

    #[test]
    fn shader_hash_tracks_source() {
        let a = ShaderSource::from_static("fn vs_main() {}");
        let b = ShaderSource::from_static("fn vs_main() {}");
        let c = ShaderSource::from_static("fn vs_main() { }");
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn boxed_materials_downcast_to_their_type() {
        let mut boxed: Box<dyn Material> = Box::new(crate::BasicMaterial::default());
        assert!(boxed.downcast_ref::<crate::NormalMaterial>().is_none());
        boxed
            .downcast_mut::<crate::BasicMaterial>()
            .unwrap()
            .set_wireframe(true);
        assert_eq!(boxed.topology(), Topology::LineList);
    }
}
