use crate::bindings::{BindingRequest, BoundGroups, build_bind_groups};
use crate::device::{BindGroupId, BufferDesc, BufferId, BufferUsage, RenderDevice};
use crate::error::RenderError;
use crate::material::Material;
use crate::mesh_cache::CacheStats;
use crate::pipeline_cache::{PassKind, PipelineEntry, compile_pipeline};
use crate::placeholder::PlaceholderTextures;
use crate::targets::TargetFormats;
use lumen_common::MaterialId;

/// Resources of the background pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyboxResources {
    pub pipeline: PipelineEntry,
    pub shader_hash: u64,
    pub uniform_buffer: BufferId,
    pub bind_group: BindGroupId,
    pub secondary_bind_group: Option<BindGroupId>,
    pub material: MaterialId,
    pub binding_revision: u64,
    pub staging: Vec<u8>,
}

impl SkyboxResources {
    /// Vertices of the procedural full-screen triangle.
    pub const VERTEX_COUNT: u32 = 3;

    fn groups(&self) -> BoundGroups {
        BoundGroups {
            primary: self.bind_group,
            secondary: self.secondary_bind_group,
        }
    }
}

/// Single-slot cache bound to the scene's environment material.
///
/// A different material object rebuilds the uniform buffer and bind groups;
/// the pipeline survives only when the new shader source is identical. A
/// binding revision change rebuilds the bind groups alone.
#[derive(Debug, Default)]
pub struct SkyboxResourceCache {
    slot: Option<SkyboxResources>,
    stats: CacheStats,
}

impl SkyboxResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        placeholders: &mut PlaceholderTextures,
        material_id: MaterialId,
        material: &dyn Material,
        targets: &TargetFormats,
    ) -> Result<&mut SkyboxResources, RenderError> {
        let hit = matches!(&self.slot, Some(res) if res.material == material_id);
        if hit {
            let Some(res) = self.slot.as_mut() else {
                return Err(RenderError::UnknownEnvironment(material_id));
            };
            if res.binding_revision != material.binding_revision() {
                let groups = build_bind_groups(
                    device,
                    placeholders,
                    material,
                    &binding_request(res.uniform_buffer, &res.pipeline),
                )?;
                res.groups().release(device);
                res.bind_group = groups.primary;
                res.secondary_bind_group = groups.secondary;
                res.binding_revision = material.binding_revision();
                self.stats.bind_group_rebuilds += 1;
                tracing::debug!(%material_id, revision = res.binding_revision, "rebuilt skybox bind groups");
            } else {
                self.stats.reuses += 1;
                tracing::trace!(%material_id, "reusing skybox resources");
            }
            return Ok(res);
        }

        let shader = material.shader();
        let shader_hash = shader.content_hash();
        let mut kept = None;
        if let Some(old) = self.slot.take() {
            old.groups().release(device);
            device.destroy_buffer(old.uniform_buffer);
            if old.shader_hash == shader_hash && old.pipeline.key.material_type == material.material_type() {
                kept = Some(old.pipeline);
            } else {
                device.destroy_pipeline(old.pipeline.pipeline);
            }
        }
        let reused_pipeline = kept.is_some();
        let pipeline = match kept {
            Some(pipeline) => pipeline,
            None => compile_pipeline(device, material, targets, PassKind::Background)?,
        };

        match build(device, placeholders, material_id, material, &pipeline) {
            Ok((uniform_buffer, groups)) => {
                self.stats.full_rebuilds += 1;
                tracing::debug!(
                    %material_id,
                    material = material.material_type(),
                    reused_pipeline,
                    "built skybox resources"
                );
                Ok(self.slot.insert(SkyboxResources {
                    staging: vec![0; pipeline.uniform_size],
                    pipeline,
                    shader_hash,
                    uniform_buffer,
                    bind_group: groups.primary,
                    secondary_bind_group: groups.secondary,
                    material: material_id,
                    binding_revision: material.binding_revision(),
                }))
            }
            Err(err) => {
                device.destroy_pipeline(pipeline.pipeline);
                Err(err)
            }
        }
    }

    pub fn resources(&self) -> Option<&SkyboxResources> {
        self.slot.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Destroy the pipeline, uniform buffer and bind groups.
    pub fn clear<D: RenderDevice + ?Sized>(&mut self, device: &mut D) {
        if let Some(old) = self.slot.take() {
            old.groups().release(device);
            device.destroy_buffer(old.uniform_buffer);
            device.destroy_pipeline(old.pipeline.pipeline);
            tracing::debug!(material = %old.material, "destroyed skybox resources");
        }
    }
}

fn binding_request(uniform_buffer: BufferId, pipeline: &PipelineEntry) -> BindingRequest<'_> {
    BindingRequest {
        label: "skybox",
        pipeline: pipeline.pipeline,
        uniform_buffer,
        primary_slots: &pipeline.primary_slots,
        secondary_slots: &pipeline.secondary_slots,
    }
}

fn build<D: RenderDevice + ?Sized>(
    device: &mut D,
    placeholders: &mut PlaceholderTextures,
    material_id: MaterialId,
    material: &dyn Material,
    pipeline: &PipelineEntry,
) -> Result<(BufferId, BoundGroups), RenderError> {
    let uniform_buffer = device.create_buffer(
        &BufferDesc {
            label: format!("skybox.{}.uniforms", material_id.0),
            size: pipeline.uniform_size as u64,
            usage: BufferUsage::Uniform,
        },
        None,
    )?;
    match build_bind_groups(device, placeholders, material, &binding_request(uniform_buffer, pipeline)) {
        Ok(groups) => Ok((uniform_buffer, groups)),
        Err(err) => {
            device.destroy_buffer(uniform_buffer);
            Err(err)
        }
    }
}
