use crate::config::RendererConfig;
use crate::device::{DrawCommand, PipelineId, RecordedPass, RenderDevice, TextureDesc, TextureId};
use crate::error::RenderError;
use crate::material::Material;
use crate::materials::StandardMaterial;
use crate::mesh_cache::{CacheStats, MeshResourceCache};
use crate::pipeline_cache::PipelineCache;
use crate::placeholder::PlaceholderTextures;
use crate::skybox_cache::{SkyboxResourceCache, SkyboxResources};
use crate::targets::{RenderTargets, TargetFormats};
use crate::uniform::{UniformContext, fill_uniforms};
use glam::Mat4;
use lumen_common::{Color, NodeId};
use lumen_scene::{Camera, NodeKind, Scene, WorldLight};

/// Scene type the renderer draws: materials are trait objects.
pub type RenderScene = Scene<dyn Material>;

/// What one call to [`FrameRenderer::render`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    pub meshes_drawn: usize,
    /// Visible meshes with no vertices.
    pub meshes_skipped: usize,
    pub lights: usize,
    pub draw_calls: usize,
    pub skybox: bool,
    /// Mesh cache activity during this frame only.
    pub mesh_cache: CacheStats,
}

/// Per-frame draw orchestrator.
///
/// Owns the device, the render targets and the three resource caches. One
/// call to [`render`](Self::render) walks the scene once, resolves every
/// visible mesh through the caches, records a single pass (background
/// first, then meshes in traversal order) and submits it.
pub struct FrameRenderer<D: RenderDevice> {
    device: D,
    config: RendererConfig,
    formats: TargetFormats,
    targets: Option<RenderTargets>,
    pending_resize: Option<(u32, u32)>,
    pipelines: PipelineCache,
    meshes: MeshResourceCache,
    skybox: SkyboxResourceCache,
    placeholders: PlaceholderTextures,
    clear_color: Color,
    frame_index: u64,
    last_stats: FrameStats,
    disposed: bool,
}

impl<D: RenderDevice> FrameRenderer<D> {
    pub fn new(mut device: D, config: RendererConfig) -> Result<Self, RenderError> {
        config.validate()?;
        let formats = TargetFormats {
            color_format: device.surface_format(),
            depth_format: config.depth_format,
            sample_count: config.sample_count,
        };
        let (width, height) = device.surface_size();
        let targets = RenderTargets::create(&mut device, &formats, width, height)?;
        tracing::info!(
            width,
            height,
            samples = formats.sample_count,
            color = ?formats.color_format,
            "renderer created"
        );
        Ok(Self {
            device,
            clear_color: config.clear_color,
            config,
            formats,
            targets: Some(targets),
            pending_resize: None,
            pipelines: PipelineCache::new(),
            meshes: MeshResourceCache::new(),
            skybox: SkyboxResourceCache::new(),
            placeholders: PlaceholderTextures::new(),
            frame_index: 0,
            last_stats: FrameStats::default(),
            disposed: false,
        })
    }

    /// Draw one frame. Any error aborts the frame before submission.
    pub fn render(&mut self, scene: &mut RenderScene, camera: &Camera) -> Result<FrameStats, RenderError> {
        if self.disposed {
            return Err(RenderError::Disposed);
        }
        self.apply_pending_resize()?;
        let (aspect, color, depth) = match &self.targets {
            Some(targets) => (targets.aspect(), targets.color_attachment(), targets.depth),
            None => return Err(RenderError::Disposed),
        };

        scene.update_world_transforms();
        let mut mesh_nodes: Vec<(NodeId, Mat4)> = Vec::new();
        let mut lights: Vec<WorldLight> = Vec::new();
        scene.visit(|id, node| match node.kind() {
            NodeKind::Mesh(_) => mesh_nodes.push((id, node.world_matrix())),
            NodeKind::Light(light) => lights.push(light.to_world(node.world_matrix())),
            NodeKind::Group => {}
        });
        let slotted = lights.iter().filter(|l| !l.is_ambient()).count();
        if slotted > StandardMaterial::MAX_LIGHTS {
            tracing::warn!(
                lights = slotted,
                capacity = StandardMaterial::MAX_LIGHTS,
                "more lights than slots; extra lights are ignored"
            );
        }

        let frame_ctx = UniformContext {
            view: camera.view_matrix(),
            projection: camera.projection_matrix(aspect),
            camera_position: camera.position(),
            model: Mat4::IDENTITY,
            lights: &lights,
        };
        let cache_before = self.meshes.stats();
        let mut commands = Vec::new();

        let skybox = match scene.environment() {
            Some(env) => {
                let material = scene.material(env).ok_or(RenderError::UnknownEnvironment(env))?;
                let resources =
                    self.skybox
                        .get(&mut self.device, &mut self.placeholders, env, material, &self.formats)?;
                fill_uniforms(
                    &mut resources.staging,
                    resources.pipeline.transform_layout,
                    material,
                    &frame_ctx,
                )?;
                self.device.write_buffer(resources.uniform_buffer, 0, &resources.staging)?;
                record_skybox(resources, &mut commands);
                true
            }
            None => false,
        };

        let mut rebuilt = Vec::new();
        let outcome = self.record_meshes(scene, &mesh_nodes, &frame_ctx, &mut commands, &mut rebuilt);
        // Rebuilt buffers already hold the new geometry, even if a later
        // mesh failed.
        for id in rebuilt {
            if let Err(err) = scene.clear_content_dirty(id) {
                tracing::warn!(%id, %err, "could not clear content-dirty flag");
            }
        }
        let (meshes_drawn, meshes_skipped) = outcome?;

        let pass = RecordedPass {
            label: format!("frame.{}", self.frame_index),
            color,
            depth,
            clear_color: self.clear_color,
            clear_depth: 1.0,
            commands,
        };
        self.device.submit(&pass)?;

        let cache_after = self.meshes.stats();
        let stats = FrameStats {
            frame: self.frame_index,
            meshes_drawn,
            meshes_skipped,
            lights: lights.len(),
            draw_calls: pass.draw_calls(),
            skybox,
            mesh_cache: CacheStats {
                full_rebuilds: cache_after.full_rebuilds - cache_before.full_rebuilds,
                bind_group_rebuilds: cache_after.bind_group_rebuilds - cache_before.bind_group_rebuilds,
                reuses: cache_after.reuses - cache_before.reuses,
            },
        };
        tracing::trace!(frame = self.frame_index, draws = stats.draw_calls, "frame submitted");
        self.frame_index += 1;
        self.last_stats = stats;
        Ok(stats)
    }

    /// Record every visible mesh. Returns `(drawn, skipped)`.
    fn record_meshes(
        &mut self,
        scene: &RenderScene,
        mesh_nodes: &[(NodeId, Mat4)],
        frame_ctx: &UniformContext<'_>,
        commands: &mut Vec<DrawCommand>,
        rebuilt: &mut Vec<NodeId>,
    ) -> Result<(usize, usize), RenderError> {
        let mut drawn = 0;
        let mut skipped = 0;
        let mut bound: Option<PipelineId> = None;
        for &(id, model) in mesh_nodes {
            let Some(mesh) = scene.mesh(id) else {
                continue;
            };
            if mesh.geometry().vertex_count() == 0 {
                tracing::trace!(%id, "skipping mesh without vertices");
                skipped += 1;
                continue;
            }
            let material_id = mesh.material();
            let material = scene.material(material_id).ok_or(RenderError::UnknownMaterial {
                node: id,
                material: material_id,
            })?;

            let entry = self.pipelines.get(&mut self.device, material, &self.formats)?;
            let cached = self.meshes.get(
                &mut self.device,
                &mut self.placeholders,
                id,
                mesh,
                material_id,
                material,
                entry,
            )?;
            if mesh.is_content_dirty() {
                rebuilt.push(id);
            }

            let ctx = UniformContext { model, ..*frame_ctx };
            fill_uniforms(&mut cached.staging, entry.transform_layout, material, &ctx)?;
            self.device.write_buffer(cached.uniform_buffer, 0, &cached.staging)?;

            if bound != Some(entry.pipeline) {
                commands.push(DrawCommand::SetPipeline(entry.pipeline));
                bound = Some(entry.pipeline);
            }
            commands.push(DrawCommand::SetBindGroup {
                index: 0,
                group: cached.bind_group,
            });
            if let Some(group) = cached.secondary_bind_group {
                commands.push(DrawCommand::SetBindGroup { index: 1, group });
            }
            if let Some(buffer) = cached.vertex_buffer {
                commands.push(DrawCommand::SetVertexBuffer(buffer));
            }
            match (cached.index_buffer, cached.index_format) {
                (Some(buffer), Some(format)) => {
                    commands.push(DrawCommand::SetIndexBuffer { buffer, format });
                    commands.push(DrawCommand::DrawIndexed {
                        indices: 0..cached.index_count,
                    });
                }
                _ => commands.push(DrawCommand::Draw {
                    vertices: 0..cached.vertex_count,
                }),
            }
            drawn += 1;
        }
        Ok((drawn, skipped))
    }

    fn apply_pending_resize(&mut self) -> Result<(), RenderError> {
        let Some((width, height)) = self.pending_resize.take() else {
            return Ok(());
        };
        if let Some(targets) = &self.targets {
            if (targets.width, targets.height) == (width.max(1), height.max(1)) {
                return Ok(());
            }
        }
        self.device.resize_surface(width, height)?;
        if let Some(old) = self.targets.take() {
            old.destroy(&mut self.device);
        }
        self.targets = Some(RenderTargets::create(&mut self.device, &self.formats, width, height)?);
        Ok(())
    }

    /// Request new target dimensions. Applied at the start of the next
    /// [`render`](Self::render), never while a frame is being built.
    pub fn resize(&mut self, width: u32, height: u32) {
        if !self.disposed {
            self.pending_resize = Some((width, height));
        }
    }

    pub fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color;
    }

    pub fn clear_color(&self) -> Color {
        self.clear_color
    }

    /// Release the cached resources of one mesh, typically after removing it
    /// from the scene. Returns whether the mesh had resources.
    pub fn dispose_mesh(&mut self, node: NodeId) -> bool {
        if self.disposed {
            return false;
        }
        self.meshes.release(&mut self.device, node)
    }

    /// Tear everything down. Later [`render`](Self::render) calls fail with
    /// [`RenderError::Disposed`]; later `dispose` calls do nothing.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.pending_resize = None;
        if let Some(targets) = self.targets.take() {
            targets.destroy(&mut self.device);
        }
        let meshes = self.meshes.len();
        let pipelines = self.pipelines.len();
        self.meshes.clear(&mut self.device);
        self.pipelines.clear(&mut self.device);
        self.skybox.clear(&mut self.device);
        self.placeholders.destroy(&mut self.device);
        self.disposed = true;
        tracing::info!(meshes, pipelines, "renderer disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Upload a sampled texture for use by materials.
    pub fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> Result<TextureId, RenderError> {
        if self.disposed {
            return Err(RenderError::Disposed);
        }
        Ok(self.device.create_texture(desc, data)?)
    }

    pub fn destroy_texture(&mut self, texture: TextureId) {
        self.device.destroy_texture(texture);
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn targets(&self) -> Option<&RenderTargets> {
        self.targets.as_ref()
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    pub fn pipelines(&self) -> &PipelineCache {
        &self.pipelines
    }

    pub fn mesh_resource_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn mesh_resources(&self) -> &MeshResourceCache {
        &self.meshes
    }

    pub fn has_skybox_resources(&self) -> bool {
        !self.skybox.is_empty()
    }

    pub fn skybox_resources(&self) -> Option<&SkyboxResources> {
        self.skybox.resources()
    }

    pub fn stats(&self) -> FrameStats {
        self.last_stats
    }
}

fn record_skybox(resources: &SkyboxResources, commands: &mut Vec<DrawCommand>) {
    commands.push(DrawCommand::SetPipeline(resources.pipeline.pipeline));
    commands.push(DrawCommand::SetBindGroup {
        index: 0,
        group: resources.bind_group,
    });
    if let Some(group) = resources.secondary_bind_group {
        commands.push(DrawCommand::SetBindGroup { index: 1, group });
    }
    commands.push(DrawCommand::Draw {
        vertices: 0..SkyboxResources::VERTEX_COUNT,
    });
}
