//! Per-mesh GPU resources with tiered invalidation.
//!
//! Checked in order on every lookup:
//!
//! 1. **Full rebuild**: no entry yet, the material type or topology changed,
//!    or the mesh is content-dirty. All buffers are recreated.
//! 2. **Bind group rebuild**: the material's binding revision moved, or the
//!    mesh now points at another material object of the same type. Buffers
//!    are kept.
//! 3. **Reuse**.

use crate::bindings::{BindingRequest, BoundGroups, build_bind_groups};
use crate::device::{BindGroupId, BufferDesc, BufferId, BufferUsage, RenderDevice};
use crate::error::RenderError;
use crate::material::Material;
use crate::pipeline_cache::PipelineEntry;
use crate::placeholder::PlaceholderTextures;
use crate::vertex::{IndexFormat, Topology, derive_indices, encode_indices, interleave};
use lumen_common::{MaterialId, NodeId};
use lumen_scene::Mesh;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// GPU state needed to draw one mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedMeshResources {
    /// `None` for materials that generate vertices procedurally.
    pub vertex_buffer: Option<BufferId>,
    pub index_buffer: Option<BufferId>,
    pub uniform_buffer: BufferId,
    pub bind_group: BindGroupId,
    pub secondary_bind_group: Option<BindGroupId>,
    pub material_type: String,
    pub topology: Topology,
    pub binding_revision: u64,
    pub material: MaterialId,
    pub vertex_count: u32,
    pub index_count: u32,
    pub index_format: Option<IndexFormat>,
    /// CPU copy of the uniform buffer, rewritten every frame.
    pub staging: Vec<u8>,
}

impl CachedMeshResources {
    fn groups(&self) -> BoundGroups {
        BoundGroups {
            primary: self.bind_group,
            secondary: self.secondary_bind_group,
        }
    }

    fn destroy<D: RenderDevice + ?Sized>(&self, device: &mut D) {
        self.groups().release(device);
        if let Some(vertex) = self.vertex_buffer {
            device.destroy_buffer(vertex);
        }
        if let Some(index) = self.index_buffer {
            device.destroy_buffer(index);
        }
        device.destroy_buffer(self.uniform_buffer);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub full_rebuilds: u64,
    pub bind_group_rebuilds: u64,
    pub reuses: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Invalidation {
    Full(&'static str),
    BindGroups,
    Reuse,
}

fn invalidation(
    cached: &CachedMeshResources,
    mesh: &Mesh,
    material_id: MaterialId,
    material: &dyn Material,
    pipeline: &PipelineEntry,
) -> Invalidation {
    if cached.material_type != pipeline.key.material_type {
        Invalidation::Full("material type changed")
    } else if cached.topology != pipeline.key.topology {
        Invalidation::Full("topology changed")
    } else if mesh.is_content_dirty() {
        Invalidation::Full("content dirty")
    } else if cached.binding_revision != material.binding_revision() || cached.material != material_id {
        Invalidation::BindGroups
    } else {
        Invalidation::Reuse
    }
}

/// Owns the [`CachedMeshResources`] of every drawn mesh, keyed by node.
#[derive(Debug, Default)]
pub struct MeshResourceCache {
    entries: BTreeMap<NodeId, CachedMeshResources>,
    stats: CacheStats,
}

impl MeshResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the resources for `node`, rebuilding as much as its state
    /// requires. The caller clears the mesh's content-dirty flag afterwards.
    #[allow(clippy::too_many_arguments)]
    pub fn get<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        placeholders: &mut PlaceholderTextures,
        node: NodeId,
        mesh: &Mesh,
        material_id: MaterialId,
        material: &dyn Material,
        pipeline: &PipelineEntry,
    ) -> Result<&mut CachedMeshResources, RenderError> {
        let stats = &mut self.stats;
        match self.entries.entry(node) {
            Entry::Vacant(slot) => {
                let built = build(device, placeholders, node, mesh, material_id, material, pipeline)?;
                stats.full_rebuilds += 1;
                tracing::debug!(%node, material = %pipeline.key.material_type, reason = "first draw", "built mesh resources");
                Ok(slot.insert(built))
            }
            Entry::Occupied(mut slot) => match invalidation(slot.get(), mesh, material_id, material, pipeline) {
                Invalidation::Full(reason) => {
                    slot.get().destroy(device);
                    match build(device, placeholders, node, mesh, material_id, material, pipeline) {
                        Ok(built) => {
                            slot.insert(built);
                            stats.full_rebuilds += 1;
                            tracing::debug!(%node, material = %pipeline.key.material_type, reason, "rebuilt mesh resources");
                            Ok(slot.into_mut())
                        }
                        Err(err) => {
                            slot.remove();
                            Err(err)
                        }
                    }
                }
                Invalidation::BindGroups => {
                    let cached = slot.into_mut();
                    let groups = build_bind_groups(
                        device,
                        placeholders,
                        material,
                        &binding_request(cached.uniform_buffer, pipeline, &label(node)),
                    )?;
                    cached.groups().release(device);
                    cached.bind_group = groups.primary;
                    cached.secondary_bind_group = groups.secondary;
                    cached.binding_revision = material.binding_revision();
                    cached.material = material_id;
                    stats.bind_group_rebuilds += 1;
                    tracing::debug!(%node, revision = cached.binding_revision, "rebuilt mesh bind groups");
                    Ok(cached)
                }
                Invalidation::Reuse => {
                    stats.reuses += 1;
                    tracing::trace!(%node, "reusing mesh resources");
                    Ok(slot.into_mut())
                }
            },
        }
    }

    pub fn get_cached(&self, node: NodeId) -> Option<&CachedMeshResources> {
        self.entries.get(&node)
    }

    /// Release one mesh's buffers and bind groups. Returns whether anything
    /// was cached for it.
    pub fn release<D: RenderDevice + ?Sized>(&mut self, device: &mut D, node: NodeId) -> bool {
        match self.entries.remove(&node) {
            Some(cached) => {
                cached.destroy(device);
                tracing::debug!(%node, "released mesh resources");
                true
            }
            None => false,
        }
    }

    pub fn clear<D: RenderDevice + ?Sized>(&mut self, device: &mut D) {
        for (_, cached) in std::mem::take(&mut self.entries) {
            cached.destroy(device);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

fn label(node: NodeId) -> String {
    format!("mesh.{}", node.0)
}

fn binding_request<'a>(
    uniform_buffer: BufferId,
    pipeline: &'a PipelineEntry,
    label: &'a str,
) -> BindingRequest<'a> {
    BindingRequest {
        label,
        pipeline: pipeline.pipeline,
        uniform_buffer,
        primary_slots: &pipeline.primary_slots,
        secondary_slots: &pipeline.secondary_slots,
    }
}

/// Create every resource for one mesh, destroying whatever was already
/// created if a later step fails.
fn build<D: RenderDevice + ?Sized>(
    device: &mut D,
    placeholders: &mut PlaceholderTextures,
    node: NodeId,
    mesh: &Mesh,
    material_id: MaterialId,
    material: &dyn Material,
    pipeline: &PipelineEntry,
) -> Result<CachedMeshResources, RenderError> {
    let mut created = Vec::new();
    let result = try_build(device, placeholders, node, mesh, material_id, material, pipeline, &mut created);
    if result.is_err() {
        for buffer in created {
            device.destroy_buffer(buffer);
        }
    }
    result
}

#[allow(clippy::too_many_arguments)]
fn try_build<D: RenderDevice + ?Sized>(
    device: &mut D,
    placeholders: &mut PlaceholderTextures,
    node: NodeId,
    mesh: &Mesh,
    material_id: MaterialId,
    material: &dyn Material,
    pipeline: &PipelineEntry,
    created: &mut Vec<BufferId>,
) -> Result<CachedMeshResources, RenderError> {
    let label = label(node);
    let geometry = mesh.geometry();
    let layout = &pipeline.vertex_layout;

    let vertex_buffer = if layout.is_empty() {
        None
    } else {
        let data = interleave(geometry, layout);
        let id = device.create_buffer(
            &BufferDesc {
                label: format!("{label}.vertices"),
                size: data.len() as u64,
                usage: BufferUsage::Vertex,
            },
            Some(&data),
        )?;
        created.push(id);
        Some(id)
    };

    let (index_buffer, index_format, index_count) = match derive_indices(geometry, pipeline.key.topology) {
        Some(indices) if !indices.is_empty() => {
            let (format, data) = encode_indices(&indices);
            let id = device.create_buffer(
                &BufferDesc {
                    label: format!("{label}.indices"),
                    size: data.len() as u64,
                    usage: BufferUsage::Index,
                },
                Some(&data),
            )?;
            created.push(id);
            (Some(id), Some(format), indices.len() as u32)
        }
        _ => (None, None, 0),
    };

    let uniform_buffer = device.create_buffer(
        &BufferDesc {
            label: format!("{label}.uniforms"),
            size: pipeline.uniform_size as u64,
            usage: BufferUsage::Uniform,
        },
        None,
    )?;
    created.push(uniform_buffer);

    let groups = build_bind_groups(
        device,
        placeholders,
        material,
        &binding_request(uniform_buffer, pipeline, &label),
    )?;

    Ok(CachedMeshResources {
        vertex_buffer,
        index_buffer,
        uniform_buffer,
        bind_group: groups.primary,
        secondary_bind_group: groups.secondary,
        material_type: pipeline.key.material_type.clone(),
        topology: pipeline.key.topology,
        binding_revision: material.binding_revision(),
        material: material_id,
        vertex_count: geometry.vertex_count() as u32,
        index_count,
        index_format,
        staging: vec![0; pipeline.uniform_size],
    })
}
