use crate::bindings::group_layouts;
use crate::device::{CompareFunction, CullMode, DepthState, PipelineDesc, PipelineId, RenderDevice};
use crate::error::RenderError;
use crate::material::{Material, TextureSlot, TransformLayout};
use crate::targets::TargetFormats;
use crate::vertex::{Topology, VertexLayout};
use std::collections::{BTreeMap, HashSet};
use std::collections::btree_map::Entry;

/// Pipelines are shared by every material reporting the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineKey {
    pub material_type: String,
    pub topology: Topology,
}

impl PipelineKey {
    pub fn of(material: &dyn Material) -> Self {
        Self {
            material_type: material.material_type().to_string(),
            topology: material.topology(),
        }
    }
}

/// A compiled pipeline plus the material layout it was compiled against.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineEntry {
    pub pipeline: PipelineId,
    pub key: PipelineKey,
    pub transform_layout: TransformLayout,
    pub uniform_size: usize,
    pub vertex_layout: VertexLayout,
    pub primary_slots: Vec<TextureSlot>,
    pub secondary_slots: Vec<TextureSlot>,
}

/// Fixed-function differences between the mesh pass and the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PassKind {
    /// Depth tested with `Less` and written.
    Mesh,
    /// Full-screen triangle, no vertex buffer, `LessEqual` without writes.
    Background,
}

/// Check the parts of a material declaration the device cannot check for us.
pub(crate) fn validate_material(material: &dyn Material) -> Result<(), RenderError> {
    let name = material.material_type();
    material
        .vertex_layout()
        .validate()
        .map_err(|reason| RenderError::configuration(name, reason))?;

    let header = material.transform_layout().header_size();
    let size = material.uniform_size();
    if size < header {
        return Err(RenderError::configuration(
            name,
            format!("uniform size {size} is smaller than the {header}-byte transform header"),
        ));
    }
    if size % 16 != 0 {
        return Err(RenderError::configuration(
            name,
            format!("uniform size {size} is not a multiple of 16"),
        ));
    }

    let mut names = HashSet::new();
    for slot in material.texture_slots().iter().chain(material.secondary_slots()) {
        if !names.insert(slot.name) {
            return Err(RenderError::configuration(
                name,
                format!("texture slot `{}` declared twice", slot.name),
            ));
        }
    }
    Ok(())
}

/// Validate and compile a pipeline for `material`.
pub(crate) fn compile_pipeline<D: RenderDevice + ?Sized>(
    device: &mut D,
    material: &dyn Material,
    targets: &TargetFormats,
    pass: PassKind,
) -> Result<PipelineEntry, RenderError> {
    validate_material(material)?;
    let key = PipelineKey::of(material);
    let vertex_layout = material.vertex_layout();
    let primary_slots = material.texture_slots().to_vec();
    let secondary_slots = material.secondary_slots().to_vec();

    let (depth, layout, cull_mode) = match pass {
        PassKind::Mesh => (
            DepthState {
                format: targets.depth_format,
                write_enabled: true,
                compare: CompareFunction::Less,
            },
            (!vertex_layout.is_empty()).then(|| vertex_layout.clone()),
            material.cull_mode(),
        ),
        PassKind::Background => (
            DepthState {
                format: targets.depth_format,
                write_enabled: false,
                compare: CompareFunction::LessEqual,
            },
            None,
            CullMode::None,
        ),
    };

    let desc = PipelineDesc {
        label: format!("{}.{:?}", key.material_type, key.topology),
        shader: material.shader(),
        vertex_layout: layout,
        topology: key.topology,
        cull_mode,
        bind_groups: group_layouts(&primary_slots, &secondary_slots),
        color_format: targets.color_format,
        depth,
        sample_count: targets.sample_count,
    };
    let pipeline = device
        .create_pipeline(&desc)
        .map_err(|err| RenderError::configuration(&key.material_type, err.to_string()))?;
    tracing::debug!(
        material = %key.material_type,
        topology = ?key.topology,
        ?pass,
        "compiled pipeline"
    );

    Ok(PipelineEntry {
        pipeline,
        key,
        transform_layout: material.transform_layout(),
        uniform_size: material.uniform_size(),
        vertex_layout,
        primary_slots,
        secondary_slots,
    })
}

/// One compiled pipeline per `(material type, topology)`. Never evicts.
#[derive(Debug, Default)]
pub struct PipelineCache {
    entries: BTreeMap<PipelineKey, PipelineEntry>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the pipeline for `material`, compiling it on first use.
    pub fn get<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        material: &dyn Material,
        targets: &TargetFormats,
    ) -> Result<&PipelineEntry, RenderError> {
        let entry: &PipelineEntry = match self.entries.entry(PipelineKey::of(material)) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => {
                let compiled = compile_pipeline(device, material, targets, PassKind::Mesh)?;
                slot.insert(compiled)
            }
        };
        Ok(entry)
    }

    pub fn entry(&self, key: &PipelineKey) -> Option<&PipelineEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &PipelineKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Destroy every pipeline.
    pub fn clear<D: RenderDevice + ?Sized>(&mut self, device: &mut D) {
        for (_, entry) in std::mem::take(&mut self.entries) {
            device.destroy_pipeline(entry.pipeline);
        }
    }
}
