//! In-memory [`RenderDevice`] that validates handle use and records passes.
//!
//! Used by tests and by the CLI's dry-run mode. Buffers keep their contents
//! so uniform uploads can be inspected byte for byte; every create and destroy
//! is counted; submitting a pass that references a destroyed resource is an
//! error rather than undefined behavior.

use crate::device::{
    BindGroupDesc, BindGroupId, BindingKind, BindingResource, BufferDesc, BufferId, BufferUsage,
    ColorAttachment, DrawCommand, PipelineDesc, PipelineId, RecordedPass, RenderDevice, SamplerDesc,
    SamplerId, TextureDesc, TextureFormat, TextureId, TextureUsage,
};
use crate::error::DeviceError;
use std::collections::BTreeMap;

/// Create/destroy counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounters {
    pub buffers_created: u64,
    pub buffers_destroyed: u64,
    pub buffer_writes: u64,
    pub textures_created: u64,
    pub textures_destroyed: u64,
    pub pipelines_created: u64,
    pub pipelines_destroyed: u64,
    pub bind_groups_created: u64,
    pub bind_groups_released: u64,
    /// Destroy calls for handles that were not live.
    pub invalid_destroys: u64,
}

#[derive(Debug)]
struct Buffer {
    desc: BufferDesc,
    data: Vec<u8>,
}

#[derive(Debug)]
pub struct HeadlessDevice {
    next_id: u64,
    size: (u32, u32),
    format: TextureFormat,
    buffers: BTreeMap<BufferId, Buffer>,
    textures: BTreeMap<TextureId, TextureDesc>,
    samplers: BTreeMap<SamplerId, SamplerDesc>,
    pipelines: BTreeMap<PipelineId, PipelineDesc>,
    bind_groups: BTreeMap<BindGroupId, BindGroupDesc>,
    counters: ResourceCounters,
    passes: Vec<RecordedPass>,
    failing_markers: Vec<String>,
}

impl HeadlessDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            next_id: 1,
            size: (width, height),
            format: TextureFormat::Bgra8UnormSrgb,
            buffers: BTreeMap::new(),
            textures: BTreeMap::new(),
            samplers: BTreeMap::new(),
            pipelines: BTreeMap::new(),
            bind_groups: BTreeMap::new(),
            counters: ResourceCounters::default(),
            passes: Vec::new(),
            failing_markers: Vec::new(),
        }
    }

    /// Reject any pipeline whose WGSL contains `marker`, the way a real
    /// device rejects a shader that fails validation.
    pub fn fail_shaders_containing(&mut self, marker: impl Into<String>) {
        self.failing_markers.push(marker.into());
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn counters(&self) -> ResourceCounters {
        self.counters
    }

    pub fn pipelines_created(&self) -> u64 {
        self.counters.pipelines_created
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_samplers(&self) -> usize {
        self.samplers.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.pipelines.len()
    }

    pub fn live_bind_groups(&self) -> usize {
        self.bind_groups.len()
    }

    pub fn is_live_buffer(&self, id: BufferId) -> bool {
        self.buffers.contains_key(&id)
    }

    pub fn is_live_bind_group(&self, id: BindGroupId) -> bool {
        self.bind_groups.contains_key(&id)
    }

    pub fn buffer_data(&self, id: BufferId) -> Option<&[u8]> {
        self.buffers.get(&id).map(|b| b.data.as_slice())
    }

    pub fn buffer_desc(&self, id: BufferId) -> Option<&BufferDesc> {
        self.buffers.get(&id).map(|b| &b.desc)
    }

    pub fn pipeline_desc(&self, id: PipelineId) -> Option<&PipelineDesc> {
        self.pipelines.get(&id)
    }

    pub fn bind_group_desc(&self, id: BindGroupId) -> Option<&BindGroupDesc> {
        self.bind_groups.get(&id)
    }

    pub fn submitted_passes(&self) -> &[RecordedPass] {
        &self.passes
    }

    pub fn last_pass(&self) -> Option<&RecordedPass> {
        self.passes.last()
    }

    fn check_buffer(&self, id: BufferId) -> Result<&Buffer, DeviceError> {
        self.buffers.get(&id).ok_or(DeviceError::UnknownHandle {
            kind: "buffer",
            id: id.0,
        })
    }

    fn check_texture(&self, id: TextureId) -> Result<&TextureDesc, DeviceError> {
        self.textures.get(&id).ok_or(DeviceError::UnknownHandle {
            kind: "texture",
            id: id.0,
        })
    }

    fn check_bind_group(&self, id: BindGroupId) -> Result<&BindGroupDesc, DeviceError> {
        let group = self.bind_groups.get(&id).ok_or(DeviceError::UnknownHandle {
            kind: "bind group",
            id: id.0,
        })?;
        for resource in &group.resources {
            match *resource {
                BindingResource::Buffer(buffer) => {
                    self.check_buffer(buffer)?;
                }
                BindingResource::Texture(texture) => {
                    self.check_texture(texture)?;
                }
                BindingResource::Sampler(sampler) => {
                    if !self.samplers.contains_key(&sampler) {
                        return Err(DeviceError::UnknownHandle {
                            kind: "sampler",
                            id: sampler.0,
                        });
                    }
                }
            }
        }
        Ok(group)
    }

    fn check_command(&self, command: &DrawCommand) -> Result<(), DeviceError> {
        match command {
            DrawCommand::SetPipeline(pipeline) => {
                if !self.pipelines.contains_key(pipeline) {
                    return Err(DeviceError::UnknownHandle {
                        kind: "pipeline",
                        id: pipeline.0,
                    });
                }
            }
            DrawCommand::SetBindGroup { group, .. } => {
                self.check_bind_group(*group)?;
            }
            DrawCommand::SetVertexBuffer(buffer) | DrawCommand::SetIndexBuffer { buffer, .. } => {
                self.check_buffer(*buffer)?;
            }
            DrawCommand::Draw { .. } | DrawCommand::DrawIndexed { .. } => {}
        }
        Ok(())
    }
}

fn mismatch(desc: &BindGroupDesc, message: String) -> DeviceError {
    DeviceError::BindGroupMismatch {
        label: desc.label.clone(),
        message,
    }
}

impl RenderDevice for HeadlessDevice {
    fn create_buffer(&mut self, desc: &BufferDesc, contents: Option<&[u8]>) -> Result<BufferId, DeviceError> {
        let mut data = vec![0; desc.size as usize];
        if let Some(contents) = contents {
            if contents.len() as u64 > desc.size {
                return Err(DeviceError::WriteOutOfRange {
                    offset: 0,
                    len: contents.len(),
                    size: desc.size,
                });
            }
            data[..contents.len()].copy_from_slice(contents);
        }
        let id = BufferId(self.next());
        self.buffers.insert(
            id,
            Buffer {
                desc: desc.clone(),
                data,
            },
        );
        self.counters.buffers_created += 1;
        Ok(id)
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        let entry = self.buffers.get_mut(&buffer).ok_or(DeviceError::UnknownHandle {
            kind: "buffer",
            id: buffer.0,
        })?;
        let size = entry.desc.size;
        let out_of_range = DeviceError::WriteOutOfRange {
            offset,
            len: data.len(),
            size,
        };
        let start = usize::try_from(offset).map_err(|_| out_of_range.clone())?;
        let end = start.checked_add(data.len()).ok_or(out_of_range.clone())?;
        let dst = entry.data.get_mut(start..end).ok_or(out_of_range)?;
        dst.copy_from_slice(data);
        self.counters.buffer_writes += 1;
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if self.buffers.remove(&buffer).is_some() {
            self.counters.buffers_destroyed += 1;
        } else {
            self.counters.invalid_destroys += 1;
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> Result<TextureId, DeviceError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(DeviceError::Unsupported(format!(
                "texture `{}` has zero size",
                desc.label
            )));
        }
        if desc.sample_count > 1 && desc.usage != TextureUsage::Attachment {
            return Err(DeviceError::Unsupported(format!(
                "multisampled texture `{}` must be an attachment",
                desc.label
            )));
        }
        if let Some(data) = data {
            if data.len() != desc.data_size() {
                return Err(DeviceError::WriteOutOfRange {
                    offset: 0,
                    len: data.len(),
                    size: desc.data_size() as u64,
                });
            }
        }
        let id = TextureId(self.next());
        self.textures.insert(id, desc.clone());
        self.counters.textures_created += 1;
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_some() {
            self.counters.textures_destroyed += 1;
        } else {
            self.counters.invalid_destroys += 1;
        }
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerId, DeviceError> {
        let id = SamplerId(self.next());
        self.samplers.insert(id, desc.clone());
        Ok(id)
    }

    fn destroy_sampler(&mut self, sampler: SamplerId) {
        if self.samplers.remove(&sampler).is_none() {
            self.counters.invalid_destroys += 1;
        }
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineId, DeviceError> {
        let fail = |message: String| DeviceError::PipelineCreation {
            label: desc.label.clone(),
            message,
        };
        if let Some(marker) = self
            .failing_markers
            .iter()
            .find(|m| desc.shader.wgsl.contains(m.as_str()))
        {
            return Err(fail(format!("shader rejected (contains `{marker}`)")));
        }
        for entry in [desc.shader.vertex_entry, desc.shader.fragment_entry] {
            if !desc.shader.wgsl.contains(&format!("fn {entry}(")) {
                return Err(fail(format!("entry point `{entry}` not found")));
            }
        }
        if let Some(layout) = &desc.vertex_layout {
            layout.validate().map_err(fail)?;
        }
        if !desc.depth.format.is_depth() {
            return Err(fail(format!("{:?} is not a depth format", desc.depth.format)));
        }
        let id = PipelineId(self.next());
        self.pipelines.insert(id, desc.clone());
        self.counters.pipelines_created += 1;
        Ok(id)
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineId) {
        if self.pipelines.remove(&pipeline).is_some() {
            self.counters.pipelines_destroyed += 1;
        } else {
            self.counters.invalid_destroys += 1;
        }
    }

    fn create_bind_group(&mut self, desc: &BindGroupDesc) -> Result<BindGroupId, DeviceError> {
        let pipeline = self.pipelines.get(&desc.pipeline).ok_or(DeviceError::UnknownHandle {
            kind: "pipeline",
            id: desc.pipeline.0,
        })?;
        let layout = pipeline
            .bind_groups
            .get(desc.group as usize)
            .ok_or_else(|| mismatch(desc, format!("pipeline has no bind group {}", desc.group)))?;
        if layout.len() != desc.resources.len() {
            return Err(mismatch(
                desc,
                format!("expected {} bindings, got {}", layout.len(), desc.resources.len()),
            ));
        }
        for (binding, (kind, resource)) in layout.iter().zip(&desc.resources).enumerate() {
            match (*kind, *resource) {
                (BindingKind::UniformBuffer, BindingResource::Buffer(buffer)) => {
                    let buffer = self.check_buffer(buffer)?;
                    if buffer.desc.usage != BufferUsage::Uniform {
                        return Err(mismatch(desc, format!("binding {binding} is not a uniform buffer")));
                    }
                }
                (BindingKind::Texture(dimension), BindingResource::Texture(texture)) => {
                    let texture = self.check_texture(texture)?;
                    if texture.dimension != dimension {
                        return Err(mismatch(
                            desc,
                            format!("binding {binding} expects a {dimension:?} texture, got {:?}", texture.dimension),
                        ));
                    }
                }
                (BindingKind::Sampler, BindingResource::Sampler(sampler)) => {
                    if !self.samplers.contains_key(&sampler) {
                        return Err(DeviceError::UnknownHandle {
                            kind: "sampler",
                            id: sampler.0,
                        });
                    }
                }
                (kind, resource) => {
                    return Err(mismatch(
                        desc,
                        format!("binding {binding} expects {kind:?}, got {resource:?}"),
                    ));
                }
            }
        }
        let id = BindGroupId(self.next());
        self.bind_groups.insert(id, desc.clone());
        self.counters.bind_groups_created += 1;
        Ok(id)
    }

    fn release_bind_group(&mut self, group: BindGroupId) {
        if self.bind_groups.remove(&group).is_some() {
            self.counters.bind_groups_released += 1;
        } else {
            self.counters.invalid_destroys += 1;
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn surface_format(&self) -> TextureFormat {
        self.format
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<(), DeviceError> {
        self.size = (width, height);
        Ok(())
    }

    fn submit(&mut self, pass: &RecordedPass) -> Result<(), DeviceError> {
        self.check_texture(pass.depth)?;
        if let ColorAttachment::MultisampledResolve(color) = pass.color {
            self.check_texture(color)?;
        }
        for command in &pass.commands {
            self.check_command(command)?;
        }
        self.passes.push(pass.clone());
        Ok(())
    }
}
