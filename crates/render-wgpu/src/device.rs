//! [`RenderDevice`] over a real wgpu device.
//!
//! Handles are keys into per-kind tables. Pipeline and bind group creation
//! run inside a validation error scope so a rejected shader surfaces as a
//! [`DeviceError`] instead of wgpu's uncaptured-error panic.

use crate::convert;
use crate::target::ColorTarget;
use lumen_render::device::{
    BindGroupDesc, BindingResource, BufferDesc, PipelineDesc, SamplerDesc, TextureUsage,
};
use lumen_render::{
    BindGroupId, BufferId, ColorAttachment, DeviceError, DrawCommand, PipelineId, RecordedPass,
    RenderDevice, SamplerId, TextureDesc, TextureFormat, TextureId,
};
use std::collections::BTreeMap;
use wgpu::util::DeviceExt;

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct GpuPipeline {
    pipeline: wgpu::RenderPipeline,
    layouts: Vec<wgpu::BindGroupLayout>,
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target: ColorTarget,
    next_id: u64,
    buffers: BTreeMap<BufferId, wgpu::Buffer>,
    textures: BTreeMap<TextureId, GpuTexture>,
    samplers: BTreeMap<SamplerId, wgpu::Sampler>,
    pipelines: BTreeMap<PipelineId, GpuPipeline>,
    bind_groups: BTreeMap<BindGroupId, wgpu::BindGroup>,
}

fn unknown(kind: &'static str, id: u64) -> DeviceError {
    DeviceError::UnknownHandle { kind, id }
}

async fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue), DeviceError> {
    adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("lumen_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        )
        .await
        .map_err(|e| DeviceError::Unsupported(format!("device request failed: {e}")))
}

impl WgpuDevice {
    /// Device rendering into an offscreen texture that can be read back.
    pub async fn offscreen(width: u32, height: u32) -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| DeviceError::Unsupported("no GPU adapter available".into()))?;
        tracing::info!(adapter = ?adapter.get_info().name, "offscreen device");
        let (device, queue) = request_device(&adapter).await?;
        let target = ColorTarget::offscreen(&device, width, height);
        Ok(Self::from_parts(device, queue, target))
    }

    /// Device presenting to `surface`. Prefers an sRGB format the renderer
    /// understands.
    pub async fn with_surface(
        instance: &wgpu::Instance,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
    ) -> Result<Self, DeviceError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| DeviceError::Unsupported("no adapter compatible with the surface".into()))?;
        let (device, queue) = request_device(&adapter).await?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .filter(|f| convert::from_wgpu_format(*f).is_some())
            .max_by_key(|f| f.is_srgb())
            .ok_or_else(|| DeviceError::Unsupported("surface offers no supported color format".into()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        tracing::info!(?format, width, height, "surface configured");
        Ok(Self::from_parts(device, queue, ColorTarget::Surface { surface, config }))
    }

    fn from_parts(device: wgpu::Device, queue: wgpu::Queue, target: ColorTarget) -> Self {
        Self {
            device,
            queue,
            target,
            next_id: 1,
            buffers: BTreeMap::new(),
            textures: BTreeMap::new(),
            samplers: BTreeMap::new(),
            pipelines: BTreeMap::new(),
            bind_groups: BTreeMap::new(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Copy the offscreen color target back as tightly packed RGBA8 rows.
    pub fn read_back(&self) -> Result<Vec<u8>, DeviceError> {
        self.target.read_back(&self.device, &self.queue)
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn buffer(&self, id: BufferId) -> Result<&wgpu::Buffer, DeviceError> {
        self.buffers.get(&id).ok_or(unknown("buffer", id.0))
    }

    fn texture(&self, id: TextureId) -> Result<&GpuTexture, DeviceError> {
        self.textures.get(&id).ok_or(unknown("texture", id.0))
    }

    fn validated<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(err.to_string()),
            None => Ok(value),
        }
    }

    fn record(&self, pass: &RecordedPass, target_view: &wgpu::TextureView) -> Result<wgpu::CommandBuffer, DeviceError> {
        let depth = self.texture(pass.depth)?;
        let (color_view, resolve_target) = match pass.color {
            ColorAttachment::Surface => (target_view, None),
            ColorAttachment::MultisampledResolve(texture) => (&self.texture(texture)?.view, Some(target_view)),
        };

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(pass.label.as_str()),
        });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(pass.label.as_str()),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(convert::clear_color(pass.clear_color)),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(pass.clear_depth),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            for command in &pass.commands {
                match command {
                    DrawCommand::SetPipeline(id) => {
                        let pipeline = self.pipelines.get(id).ok_or(unknown("pipeline", id.0))?;
                        rpass.set_pipeline(&pipeline.pipeline);
                    }
                    DrawCommand::SetBindGroup { index, group } => {
                        let bind_group = self.bind_groups.get(group).ok_or(unknown("bind group", group.0))?;
                        rpass.set_bind_group(*index, bind_group, &[]);
                    }
                    DrawCommand::SetVertexBuffer(buffer) => {
                        rpass.set_vertex_buffer(0, self.buffer(*buffer)?.slice(..));
                    }
                    DrawCommand::SetIndexBuffer { buffer, format } => {
                        rpass.set_index_buffer(self.buffer(*buffer)?.slice(..), convert::index_format(*format));
                    }
                    DrawCommand::Draw { vertices } => rpass.draw(vertices.clone(), 0..1),
                    DrawCommand::DrawIndexed { indices } => rpass.draw_indexed(indices.clone(), 0, 0..1),
                }
            }
        }
        Ok(encoder.finish())
    }
}

impl RenderDevice for WgpuDevice {
    fn create_buffer(&mut self, desc: &BufferDesc, contents: Option<&[u8]>) -> Result<BufferId, DeviceError> {
        let usage = convert::buffer_usage(desc.usage);
        let buffer = match contents {
            Some(contents) if contents.len() as u64 == desc.size => {
                self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(desc.label.as_str()),
                    contents,
                    usage,
                })
            }
            Some(contents) if contents.len() as u64 > desc.size => {
                return Err(DeviceError::WriteOutOfRange {
                    offset: 0,
                    len: contents.len(),
                    size: desc.size,
                });
            }
            _ => {
                let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(desc.label.as_str()),
                    size: desc.size,
                    usage,
                    mapped_at_creation: false,
                });
                if let Some(contents) = contents.filter(|c| !c.is_empty()) {
                    self.queue.write_buffer(&buffer, 0, contents);
                }
                buffer
            }
        };
        let id = BufferId(self.next());
        self.buffers.insert(id, buffer);
        Ok(id)
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        let target = self.buffer(buffer)?;
        let size = target.size();
        if offset.saturating_add(data.len() as u64) > size {
            return Err(DeviceError::WriteOutOfRange {
                offset,
                len: data.len(),
                size,
            });
        }
        self.queue.write_buffer(target, offset, data);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        match self.buffers.remove(&buffer) {
            Some(buffer) => buffer.destroy(),
            None => tracing::warn!(id = buffer.0, "destroying unknown buffer"),
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> Result<TextureId, DeviceError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(DeviceError::Unsupported(format!("texture `{}` has zero size", desc.label)));
        }
        let wgpu_desc = wgpu::TextureDescriptor {
            label: Some(desc.label.as_str()),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.dimension.layers(),
            },
            mip_level_count: 1,
            sample_count: desc.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: convert::texture_format(desc.format),
            usage: convert::texture_usage(desc.usage),
            view_formats: &[],
        };
        let texture = match data {
            Some(data) if desc.usage == TextureUsage::Sampled => {
                if data.len() != desc.data_size() {
                    return Err(DeviceError::WriteOutOfRange {
                        offset: 0,
                        len: data.len(),
                        size: desc.data_size() as u64,
                    });
                }
                self.device.create_texture_with_data(
                    &self.queue,
                    &wgpu_desc,
                    wgpu::util::TextureDataOrder::LayerMajor,
                    data,
                )
            }
            Some(_) => {
                return Err(DeviceError::Unsupported(format!(
                    "attachment `{}` cannot be created with data",
                    desc.label
                )));
            }
            None => self.device.create_texture(&wgpu_desc),
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(convert::view_dimension(desc.dimension)),
            ..Default::default()
        });
        let id = TextureId(self.next());
        self.textures.insert(id, GpuTexture { texture, view });
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        match self.textures.remove(&texture) {
            Some(gpu) => gpu.texture.destroy(),
            None => tracing::warn!(id = texture.0, "destroying unknown texture"),
        }
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerId, DeviceError> {
        let filter = convert::filter(desc.filter);
        let address = convert::address(desc.address);
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(desc.label.as_str()),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: filter,
            ..Default::default()
        });
        let id = SamplerId(self.next());
        self.samplers.insert(id, sampler);
        Ok(id)
    }

    fn destroy_sampler(&mut self, sampler: SamplerId) {
        if self.samplers.remove(&sampler).is_none() {
            tracing::warn!(id = sampler.0, "destroying unknown sampler");
        }
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineId, DeviceError> {
        let attributes = desc
            .vertex_layout
            .as_ref()
            .map(convert::vertex_attributes)
            .unwrap_or_default();
        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = desc
            .vertex_layout
            .as_ref()
            .map(|layout| wgpu::VertexBufferLayout {
                array_stride: layout.stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &attributes,
            })
            .into_iter()
            .collect();

        let created = self.validated(|device| {
            let layouts: Vec<wgpu::BindGroupLayout> = desc
                .bind_groups
                .iter()
                .enumerate()
                .map(|(group, kinds)| {
                    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some(&format!("{}.group{group}", desc.label)),
                        entries: &convert::layout_entries(kinds),
                    })
                })
                .collect();
            let layout_refs: Vec<&wgpu::BindGroupLayout> = layouts.iter().collect();
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label.as_str()),
                bind_group_layouts: &layout_refs,
                push_constant_ranges: &[],
            });
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.label.as_str()),
                source: wgpu::ShaderSource::Wgsl(desc.shader.wgsl.clone()),
            });
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(desc.label.as_str()),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some(desc.shader.vertex_entry),
                    compilation_options: Default::default(),
                    buffers: &buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some(desc.shader.fragment_entry),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: convert::texture_format(desc.color_format),
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: convert::topology(desc.topology),
                    cull_mode: convert::cull_mode(desc.cull_mode),
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: convert::texture_format(desc.depth.format),
                    depth_write_enabled: desc.depth.write_enabled,
                    depth_compare: convert::compare(desc.depth.compare),
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: desc.sample_count,
                    ..Default::default()
                },
                multiview: None,
                cache: None,
            });
            GpuPipeline { pipeline, layouts }
        });

        let pipeline = created.map_err(|message| DeviceError::PipelineCreation {
            label: desc.label.clone(),
            message,
        })?;
        let id = PipelineId(self.next());
        self.pipelines.insert(id, pipeline);
        Ok(id)
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineId) {
        if self.pipelines.remove(&pipeline).is_none() {
            tracing::warn!(id = pipeline.0, "destroying unknown pipeline");
        }
    }

    fn create_bind_group(&mut self, desc: &BindGroupDesc) -> Result<BindGroupId, DeviceError> {
        let pipeline = self
            .pipelines
            .get(&desc.pipeline)
            .ok_or(unknown("pipeline", desc.pipeline.0))?;
        let layout = pipeline
            .layouts
            .get(desc.group as usize)
            .ok_or_else(|| DeviceError::BindGroupMismatch {
                label: desc.label.clone(),
                message: format!("pipeline has no bind group {}", desc.group),
            })?;

        let mut entries = Vec::with_capacity(desc.resources.len());
        for (binding, resource) in desc.resources.iter().enumerate() {
            let resource = match *resource {
                BindingResource::Buffer(id) => self.buffer(id)?.as_entire_binding(),
                BindingResource::Texture(id) => wgpu::BindingResource::TextureView(&self.texture(id)?.view),
                BindingResource::Sampler(id) => {
                    wgpu::BindingResource::Sampler(self.samplers.get(&id).ok_or(unknown("sampler", id.0))?)
                }
            };
            entries.push(wgpu::BindGroupEntry {
                binding: binding as u32,
                resource,
            });
        }

        let group = self
            .validated(|device| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(desc.label.as_str()),
                    layout,
                    entries: &entries,
                })
            })
            .map_err(|message| DeviceError::BindGroupMismatch {
                label: desc.label.clone(),
                message,
            })?;
        let id = BindGroupId(self.next());
        self.bind_groups.insert(id, group);
        Ok(id)
    }

    fn release_bind_group(&mut self, group: BindGroupId) {
        if self.bind_groups.remove(&group).is_none() {
            tracing::warn!(id = group.0, "releasing unknown bind group");
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        self.target.size()
    }

    fn surface_format(&self) -> TextureFormat {
        self.target.format()
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<(), DeviceError> {
        self.target.resize(&self.device, width, height);
        Ok(())
    }

    fn submit(&mut self, pass: &RecordedPass) -> Result<(), DeviceError> {
        let frame = self.target.acquire(&self.device)?;
        let commands = self.record(pass, &frame.view)?;
        self.queue.submit(std::iter::once(commands));
        frame.present();
        Ok(())
    }
}
