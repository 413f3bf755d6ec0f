//! Lumen core renderer.
//!
//! Turns a [`lumen_scene::Scene`] of meshes, lights and an optional
//! environment into one recorded render pass per frame, reusing GPU resources
//! across frames through three caches:
//!
//! - [`PipelineCache`]: one pipeline per `(material type, topology)`, never invalidated.
//! - [`MeshResourceCache`]: per-mesh buffers and bind groups with tiered invalidation.
//! - [`SkyboxResourceCache`]: the single background pass bound to the environment.
//!
//! # Invariants
//! - Every uniform buffer starts with the transform header described in
//!   [`uniform`]; materials only ever see the bounded block after it.
//! - Any error while resolving a frame aborts it before submission.
//! - Optional textures that are not bound are replaced by placeholders, so a
//!   pipeline's bind group layout never changes shape.
//! - After [`FrameRenderer::dispose`], no GPU handle owned by the renderer is
//!   used again.

mod bindings;
pub mod config;
pub mod device;
pub mod error;
pub mod headless;
pub mod material;
pub mod materials;
mod mesh_cache;
mod pipeline_cache;
mod placeholder;
mod renderer;
mod skybox_cache;
mod targets;
pub mod uniform;
pub mod vertex;

pub use config::RendererConfig;
pub use device::{
    BindGroupId, BufferId, ColorAttachment, DrawCommand, PipelineId, RecordedPass, RenderDevice,
    SamplerId, TextureDesc, TextureDimension, TextureFormat, TextureId,
};
pub use error::{DeviceError, RenderError};
pub use headless::{HeadlessDevice, ResourceCounters};
pub use material::{Material, ShaderSource, SlotRequirement, TextureSlot, TransformLayout};
pub use materials::{BasicMaterial, NormalMaterial, SkyboxMaterial, StandardMaterial};
pub use mesh_cache::{CacheStats, CachedMeshResources, MeshResourceCache};
pub use pipeline_cache::{PipelineCache, PipelineEntry, PipelineKey};
pub use placeholder::{Placeholder, PlaceholderTextures};
pub use renderer::{FrameRenderer, FrameStats, RenderScene};
pub use skybox_cache::{SkyboxResourceCache, SkyboxResources};
pub use targets::{RenderTargets, TargetFormats};
pub use uniform::{GpuLight, LightSlots, UniformBlock, UniformContext, UniformError};
pub use vertex::{AttributeSemantic, IndexFormat, Topology, VertexAttribute, VertexFormat, VertexLayout};

pub fn crate_info() -> &'static str {
    "lumen-render v0.1.0"
}
