use glam::{Vec2, Vec3, Vec4};
use lumen_common::{Color, NodeId, Transform};
use lumen_render::{
    BasicMaterial, FrameRenderer, HeadlessDevice, Material, NormalMaterial, RenderError, RenderScene,
    RendererConfig, ShaderSource, SkyboxMaterial, StandardMaterial, TextureDesc, TextureDimension,
    TextureFormat, TextureId, UniformBlock, UniformContext, UniformError, VertexLayout,
};
use lumen_scene::{Camera, Geometry, Light};

fn renderer() -> FrameRenderer<HeadlessDevice> {
    FrameRenderer::new(HeadlessDevice::new(320, 240), RendererConfig::default()).unwrap()
}

fn camera() -> Camera {
    Camera::perspective(60.0, 0.1, 100.0).looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y)
}

fn quad() -> Geometry {
    Geometry::new(
        vec![
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
        ],
        vec![Vec3::Z; 4],
    )
    .unwrap()
    .with_uvs(vec![Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y])
    .unwrap()
    .with_indices(vec![0, 1, 2, 2, 3, 0])
    .unwrap()
}

fn triangle_strip(triangles: usize) -> Geometry {
    let count = triangles + 2;
    let positions: Vec<Vec3> = (0..count).map(|i| Vec3::new(i as f32, (i % 2) as f32, 0.0)).collect();
    let indices: Vec<u32> = (0..triangles as u32).flat_map(|i| [i, i + 1, i + 2]).collect();
    Geometry::new(positions, vec![Vec3::Z; count])
        .unwrap()
        .with_indices(indices)
        .unwrap()
}

fn cube_texture(r: &mut FrameRenderer<HeadlessDevice>) -> TextureId {
    let desc = TextureDesc::sampled("sky", 1, 1, TextureDimension::Cube, TextureFormat::Rgba8Unorm);
    r.create_texture(&desc, Some(&[40u8; 24])).unwrap()
}

fn color_texture(r: &mut FrameRenderer<HeadlessDevice>) -> TextureId {
    let desc = TextureDesc::sampled("albedo", 2, 2, TextureDimension::D2, TextureFormat::Rgba8UnormSrgb);
    r.create_texture(&desc, None).unwrap()
}

fn single_mesh(material: Box<dyn Material>) -> (RenderScene, NodeId) {
    let mut scene = RenderScene::new();
    let m = scene.add_material(material);
    let id = scene.add_mesh(None, quad(), m, Transform::default()).unwrap();
    (scene, id)
}

#[test]
fn first_frame_builds_one_entry_per_cache() {
    let mut r = renderer();
    let (mut scene, id) = single_mesh(Box::new(BasicMaterial::default()));
    let stats = r.render(&mut scene, &camera()).unwrap();
    assert_eq!(stats.meshes_drawn, 1);
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.mesh_cache.full_rebuilds, 1);
    assert_eq!(r.mesh_resource_count(), 1);
    assert_eq!(r.pipeline_count(), 1);
    assert!(!scene.mesh(id).unwrap().is_content_dirty());
}

#[test]
fn unchanged_redraw_allocates_nothing() {
    let mut r = renderer();
    let (mut scene, _) = single_mesh(Box::new(BasicMaterial::default()));
    r.render(&mut scene, &camera()).unwrap();
    let before = r.device().counters();
    let stats = r.render(&mut scene, &camera()).unwrap();
    let after = r.device().counters();
    assert_eq!(after.buffers_created, before.buffers_created);
    assert_eq!(after.bind_groups_created, before.bind_groups_created);
    assert_eq!(after.pipelines_created, before.pipelines_created);
    assert_eq!(stats.mesh_cache.reuses, 1);
}

#[test]
fn content_dirty_replaces_all_buffers() {
    let mut r = renderer();
    let (mut scene, id) = single_mesh(Box::new(BasicMaterial::default()));
    r.render(&mut scene, &camera()).unwrap();
    let old = r.mesh_resources().get_cached(id).unwrap().clone();

    scene.set_geometry(id, triangle_strip(10)).unwrap();
    let stats = r.render(&mut scene, &camera()).unwrap();
    assert_eq!(stats.mesh_cache.full_rebuilds, 1);

    let device = r.device();
    let new = r.mesh_resources().get_cached(id).unwrap();
    for buffer in [old.vertex_buffer.unwrap(), old.index_buffer.unwrap(), old.uniform_buffer] {
        assert!(!device.is_live_buffer(buffer));
    }
    // 12 vertices of position + uv
    let vertex_desc = device.buffer_desc(new.vertex_buffer.unwrap()).unwrap();
    assert_eq!(vertex_desc.size, 12 * 20);
    assert_eq!(new.index_count, 30);
    assert_eq!(device.buffer_desc(new.index_buffer.unwrap()).unwrap().size, 30 * 2);
    assert!(!scene.mesh(id).unwrap().is_content_dirty());
}

#[test]
fn binding_revision_rebuilds_bind_groups_only() {
    let mut r = renderer();
    let mut scene = RenderScene::new();
    let m = scene.add_material(Box::new(StandardMaterial::default()));
    let id = scene.add_mesh(None, quad(), m, Transform::default()).unwrap();
    r.render(&mut scene, &camera()).unwrap();
    let old = r.mesh_resources().get_cached(id).unwrap().clone();
    let buffers_before = r.device().counters().buffers_created;

    let texture = color_texture(&mut r);
    scene
        .material_mut(m)
        .and_then(|m| m.downcast_mut::<StandardMaterial>())
        .unwrap()
        .set_color_map(Some(texture));
    let stats = r.render(&mut scene, &camera()).unwrap();

    let new = r.mesh_resources().get_cached(id).unwrap();
    assert_eq!(stats.mesh_cache.bind_group_rebuilds, 1);
    assert_eq!(new.vertex_buffer, old.vertex_buffer);
    assert_eq!(new.index_buffer, old.index_buffer);
    assert_eq!(new.uniform_buffer, old.uniform_buffer);
    assert_ne!(new.bind_group, old.bind_group);
    assert_ne!(new.secondary_bind_group, old.secondary_bind_group);
    assert!(!r.device().is_live_bind_group(old.bind_group));
    assert_eq!(r.device().counters().buffers_created, buffers_before);
}

#[test]
fn same_type_material_swap_keeps_buffers() {
    let mut r = renderer();
    let mut scene = RenderScene::new();
    let red = scene.add_material(Box::new(BasicMaterial::new(Color::rgb(1.0, 0.0, 0.0))));
    let blue = scene.add_material(Box::new(BasicMaterial::new(Color::rgb(0.0, 0.0, 1.0))));
    let id = scene.add_mesh(None, quad(), red, Transform::default()).unwrap();
    r.render(&mut scene, &camera()).unwrap();
    let old = r.mesh_resources().get_cached(id).unwrap().clone();

    scene.set_mesh_material(id, blue).unwrap();
    let stats = r.render(&mut scene, &camera()).unwrap();
    let new = r.mesh_resources().get_cached(id).unwrap();
    assert_eq!(stats.mesh_cache.bind_group_rebuilds, 1);
    assert_eq!(new.uniform_buffer, old.uniform_buffer);
    assert_eq!(new.material, blue);

    let color = &r.device().buffer_data(new.uniform_buffer).unwrap()[64..80];
    let floats: Vec<f32> = color
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(floats, vec![0.0, 0.0, 1.0, 1.0]);
}

#[test]
fn material_type_swap_rebuilds_and_adds_pipeline() {
    let mut r = renderer();
    let mut scene = RenderScene::new();
    let a = scene.add_material(Box::new(BasicMaterial::default()));
    let b = scene.add_material(Box::new(NormalMaterial::default()));
    let id = scene.add_mesh(None, quad(), a, Transform::default()).unwrap();
    r.render(&mut scene, &camera()).unwrap();
    assert_eq!(r.mesh_resource_count(), 1);
    assert_eq!(r.pipeline_count(), 1);
    let old = r.mesh_resources().get_cached(id).unwrap().clone();

    scene.set_mesh_material(id, b).unwrap();
    let stats = r.render(&mut scene, &camera()).unwrap();
    assert_eq!(stats.mesh_cache.full_rebuilds, 1);
    assert_eq!(r.pipeline_count(), 2);
    assert_eq!(r.mesh_resource_count(), 1);

    let new = r.mesh_resources().get_cached(id).unwrap();
    for buffer in [old.vertex_buffer.unwrap(), old.index_buffer.unwrap(), old.uniform_buffer] {
        assert!(!r.device().is_live_buffer(buffer));
    }
    assert_eq!(new.material_type, "normal");
    assert_eq!(r.device().buffer_desc(new.uniform_buffer).unwrap().size, 208);
}

#[test]
fn wireframe_draws_unique_edges() {
    let mut r = renderer();
    let mut wire = BasicMaterial::default();
    wire.set_wireframe(true);
    let (mut scene, id) = single_mesh(Box::new(wire));
    r.render(&mut scene, &camera()).unwrap();
    assert_eq!(r.mesh_resources().get_cached(id).unwrap().index_count, 10);
}

#[test]
fn light_slots_keep_first_four_in_traversal_order() {
    let mut r = renderer();
    let mut scene = RenderScene::new();
    let m = scene.add_material(Box::new(StandardMaterial::default()));
    let id = scene.add_mesh(None, quad(), m, Transform::default()).unwrap();
    scene
        .add_light(None, Light::ambient(Color::WHITE, 0.5), Transform::default())
        .unwrap();
    for i in 0..6 {
        scene
            .add_light(
                None,
                Light::point(Color::WHITE, 1.0, 10.0),
                Transform::from_position(Vec3::new(i as f32, 0.0, 0.0)),
            )
            .unwrap();
    }
    let stats = r.render(&mut scene, &camera()).unwrap();
    assert_eq!(stats.lights, 7);

    let cached = r.mesh_resources().get_cached(id).unwrap();
    let bytes = r.device().buffer_data(cached.uniform_buffer).unwrap();
    let base = 192 + StandardMaterial::LIGHTS_OFFSET;
    let count = u32::from_ne_bytes([bytes[base + 16], bytes[base + 17], bytes[base + 18], bytes[base + 19]]);
    assert_eq!(count, 4);
    let read = |offset: usize| f32::from_ne_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]]);
    assert_eq!(read(base), 0.5);
    for slot in 0..4 {
        let x = read(base + 32 + slot * 48);
        assert_eq!(x, slot as f32);
    }
}

#[test]
fn skybox_same_shader_keeps_pipeline() {
    let mut r = renderer();
    let sky = cube_texture(&mut r);
    let mut scene = RenderScene::new();
    let e1 = scene.add_material(Box::new(SkyboxMaterial::new(Some(sky))));
    let e2 = scene.add_material(Box::new(SkyboxMaterial::new(Some(sky))));
    scene.set_environment(Some(e1)).unwrap();

    let stats = r.render(&mut scene, &camera()).unwrap();
    assert!(stats.skybox);
    assert!(r.has_skybox_resources());
    let first = r.skybox_resources().unwrap().clone();

    scene.set_environment(Some(e2)).unwrap();
    r.render(&mut scene, &camera()).unwrap();
    let second = r.skybox_resources().unwrap();
    assert_eq!(second.pipeline.pipeline, first.pipeline.pipeline);
    assert_ne!(second.uniform_buffer, first.uniform_buffer);
    assert_ne!(second.bind_group, first.bind_group);
    assert!(!r.device().is_live_buffer(first.uniform_buffer));
    assert_eq!(r.device().live_pipelines(), 1);
}

struct GradientSky(SkyboxMaterial);

impl Material for GradientSky {
    fn material_type(&self) -> &str {
        "gradient_sky"
    }
    fn shader(&self) -> ShaderSource {
        ShaderSource::from_static("fn vs_main() {} fn fs_main() {} // gradient")
    }
    fn vertex_layout(&self) -> VertexLayout {
        VertexLayout::empty()
    }
    fn transform_layout(&self) -> lumen_render::TransformLayout {
        self.0.transform_layout()
    }
    fn uniform_size(&self) -> usize {
        self.0.uniform_size()
    }
    fn texture_slots(&self) -> &[lumen_render::TextureSlot] {
        self.0.texture_slots()
    }
    fn texture(&self, slot: &str) -> Option<TextureId> {
        self.0.texture(slot)
    }
    fn write_uniforms(&self, block: &mut UniformBlock<'_>, ctx: &UniformContext<'_>) -> Result<(), UniformError> {
        self.0.write_uniforms(block, ctx)
    }
}

#[test]
fn skybox_different_shader_recompiles() {
    let mut r = renderer();
    let sky = cube_texture(&mut r);
    let mut scene = RenderScene::new();
    let e1 = scene.add_material(Box::new(SkyboxMaterial::new(Some(sky))));
    let e2 = scene.add_material(Box::new(GradientSky(SkyboxMaterial::new(Some(sky)))));
    scene.set_environment(Some(e1)).unwrap();
    r.render(&mut scene, &camera()).unwrap();
    let first = r.skybox_resources().unwrap().pipeline.pipeline;

    scene.set_environment(Some(e2)).unwrap();
    r.render(&mut scene, &camera()).unwrap();
    assert_ne!(r.skybox_resources().unwrap().pipeline.pipeline, first);
    assert_eq!(r.device().live_pipelines(), 1);
}

#[test]
fn skybox_revision_rebuilds_bind_group_only() {
    let mut r = renderer();
    let a = cube_texture(&mut r);
    let b = cube_texture(&mut r);
    let mut scene = RenderScene::new();
    let env = scene.add_material(Box::new(SkyboxMaterial::new(Some(a))));
    scene.set_environment(Some(env)).unwrap();
    r.render(&mut scene, &camera()).unwrap();
    let first = r.skybox_resources().unwrap().clone();

    scene
        .material_mut(env)
        .and_then(|m| m.downcast_mut::<SkyboxMaterial>())
        .unwrap()
        .set_env_map(Some(b));
    r.render(&mut scene, &camera()).unwrap();
    let second = r.skybox_resources().unwrap();
    assert_eq!(second.uniform_buffer, first.uniform_buffer);
    assert_ne!(second.bind_group, first.bind_group);
}

#[test]
fn skybox_is_drawn_before_meshes() {
    let mut r = renderer();
    let sky = cube_texture(&mut r);
    let mut scene = RenderScene::new();
    let env = scene.add_material(Box::new(SkyboxMaterial::new(Some(sky))));
    scene.set_environment(Some(env)).unwrap();
    let m = scene.add_material(Box::new(BasicMaterial::default()));
    scene.add_mesh(None, quad(), m, Transform::default()).unwrap();
    r.render(&mut scene, &camera()).unwrap();

    let pass = r.device().last_pass().unwrap();
    assert_eq!(pass.draw_calls(), 2);
    assert!(matches!(
        pass.commands.iter().find(|c| matches!(c, lumen_render::DrawCommand::Draw { .. } | lumen_render::DrawCommand::DrawIndexed { .. })),
        Some(lumen_render::DrawCommand::Draw { vertices }) if *vertices == (0..3)
    ));
    let sky_pipeline = r.device().pipeline_desc(r.skybox_resources().unwrap().pipeline.pipeline).unwrap();
    assert!(!sky_pipeline.depth.write_enabled);
    assert!(sky_pipeline.vertex_layout.is_none());
}

#[test]
fn two_scenes_keep_separate_mesh_resources() {
    let mut r = renderer();
    let (mut first, a) = single_mesh(Box::new(BasicMaterial::default()));
    let mut second = RenderScene::new();
    let m = second.add_material(Box::new(BasicMaterial::default()));
    let b = second.add_mesh(None, triangle_strip(10), m, Transform::default()).unwrap();
    assert_ne!(a, b);

    r.render(&mut first, &camera()).unwrap();
    r.render(&mut second, &camera()).unwrap();
    let stats = r.render(&mut first, &camera()).unwrap();
    assert_eq!(stats.mesh_cache.reuses, 1);
    assert_eq!(r.mesh_resource_count(), 2);

    let cached = r.mesh_resources().get_cached(a).unwrap();
    assert_eq!(cached.index_count, 6);
    // 4 vertices of position + uv
    assert_eq!(r.device().buffer_desc(cached.vertex_buffer.unwrap()).unwrap().size, 4 * 20);
    assert_eq!(
        r.device().last_pass().unwrap().commands.last(),
        Some(&lumen_render::DrawCommand::DrawIndexed { indices: 0..6 })
    );
}

#[test]
fn two_scenes_with_different_environments_rebuild_the_skybox() {
    let mut r = renderer();
    let sky = cube_texture(&mut r);
    let mut first = RenderScene::new();
    let e1 = first.add_material(Box::new(SkyboxMaterial::new(Some(sky))));
    first.set_environment(Some(e1)).unwrap();
    let mut second = RenderScene::new();
    let e2 = second.add_material(Box::new(GradientSky(SkyboxMaterial::new(Some(sky)))));
    second.set_environment(Some(e2)).unwrap();
    assert_ne!(e1, e2);

    r.render(&mut first, &camera()).unwrap();
    let before = r.skybox_resources().unwrap().pipeline.pipeline;
    r.render(&mut second, &camera()).unwrap();
    let after = r.skybox_resources().unwrap();
    assert_eq!(after.material, e2);
    assert_eq!(after.pipeline.key.material_type, "gradient_sky");
    assert_ne!(after.pipeline.pipeline, before);
    assert_eq!(r.device().live_pipelines(), 1);
}

#[test]
fn missing_required_texture_names_material_and_slot() {
    let mut r = renderer();
    let mut scene = RenderScene::new();
    let env = scene.add_material(Box::new(SkyboxMaterial::new(None)));
    scene.set_environment(Some(env)).unwrap();
    let err = r.render(&mut scene, &camera()).unwrap_err();
    assert_eq!(
        err,
        RenderError::MissingTexture {
            material: "skybox".into(),
            slot: "env_map".into(),
        }
    );
    assert!(r.device().submitted_passes().is_empty());
    assert!(!r.has_skybox_resources());
    assert_eq!(r.device().live_buffers(), 0);
}

#[test]
fn missing_optional_texture_binds_placeholder() {
    let mut r = renderer();
    let (mut scene, id) = single_mesh(Box::new(StandardMaterial::default()));
    r.render(&mut scene, &camera()).unwrap();
    let cached = r.mesh_resources().get_cached(id).unwrap();
    let group = r.device().bind_group_desc(cached.bind_group).unwrap();
    // uniform + (texture, sampler) x 2
    assert_eq!(group.resources.len(), 5);
    assert!(cached.secondary_bind_group.is_some());
}

#[test]
fn shader_failure_aborts_the_frame() {
    let mut device = HeadlessDevice::new(320, 240);
    device.fail_shaders_containing("normal_to_color");
    let mut r = FrameRenderer::new(device, RendererConfig::default()).unwrap();
    let mut scene = RenderScene::new();
    let a = scene.add_material(Box::new(BasicMaterial::default()));
    let b = scene.add_material(Box::new(NormalMaterial::default()));
    scene.add_mesh(None, quad(), a, Transform::default()).unwrap();
    scene.add_mesh(None, quad(), b, Transform::default()).unwrap();
    let err = r.render(&mut scene, &camera()).unwrap_err();
    assert!(err.is_configuration());
    assert!(r.device().submitted_passes().is_empty());
}

struct Overreach;

impl Material for Overreach {
    fn material_type(&self) -> &str {
        "overreach"
    }
    fn shader(&self) -> ShaderSource {
        ShaderSource::from_static("fn vs_main() {} fn fs_main() {}")
    }
    fn vertex_layout(&self) -> VertexLayout {
        BasicMaterial::default().vertex_layout()
    }
    fn uniform_size(&self) -> usize {
        80
    }
    fn write_uniforms(&self, block: &mut UniformBlock<'_>, _ctx: &UniformContext<'_>) -> Result<(), UniformError> {
        block.write_vec4(0, Vec4::ONE)?;
        block.write_vec4(16, Vec4::ONE)
    }
}

#[test]
fn uniform_overflow_is_a_contract_violation() {
    let mut r = renderer();
    let (mut scene, id) = single_mesh(Box::new(Overreach));
    let err = r.render(&mut scene, &camera()).unwrap_err();
    assert!(err.is_contract_violation());
    assert!(r.device().submitted_passes().is_empty());
    // the buffer upload never happened
    let cached = r.mesh_resources().get_cached(id).unwrap();
    assert!(r.device().buffer_data(cached.uniform_buffer).unwrap().iter().all(|&b| b == 0));
}

#[test]
fn unknown_material_is_reported() {
    let mut r = renderer();
    let (mut scene, id) = single_mesh(Box::new(BasicMaterial::default()));
    let material = scene.mesh(id).unwrap().material();
    scene.remove_material(material);
    assert_eq!(
        r.render(&mut scene, &camera()),
        Err(RenderError::UnknownMaterial { node: id, material })
    );
}

#[test]
fn removed_meshes_are_released_through_dispose_mesh() {
    let mut r = renderer();
    let mut scene = RenderScene::new();
    let m = scene.add_material(Box::new(BasicMaterial::default()));
    let group = scene.add_group(None, Transform::default()).unwrap();
    scene.add_mesh(Some(group), quad(), m, Transform::default()).unwrap();
    scene.add_mesh(Some(group), quad(), m, Transform::default()).unwrap();
    r.render(&mut scene, &camera()).unwrap();
    assert_eq!(r.mesh_resource_count(), 2);

    let released = scene
        .remove(group)
        .unwrap()
        .into_iter()
        .filter(|&id| r.dispose_mesh(id))
        .count();
    assert_eq!(released, 2);
    assert_eq!(r.mesh_resource_count(), 0);
    assert_eq!(r.device().live_buffers(), 0);
}

#[test]
fn dispose_releases_every_renderer_resource() {
    let mut r = renderer();
    let sky = cube_texture(&mut r);
    let mut scene = RenderScene::new();
    let env = scene.add_material(Box::new(SkyboxMaterial::new(Some(sky))));
    scene.set_environment(Some(env)).unwrap();
    let standard = scene.add_material(Box::new(StandardMaterial::default()));
    let basic = scene.add_material(Box::new(BasicMaterial::default()));
    scene.add_mesh(None, quad(), standard, Transform::default()).unwrap();
    scene.add_mesh(None, quad(), basic, Transform::default()).unwrap();
    r.render(&mut scene, &camera()).unwrap();

    r.dispose();
    let device = r.device();
    assert_eq!(device.live_buffers(), 0);
    assert_eq!(device.live_pipelines(), 0);
    assert_eq!(device.live_bind_groups(), 0);
    assert_eq!(device.live_samplers(), 0);
    // only the application's cube map is left
    assert_eq!(device.live_textures(), 1);
    assert_eq!(device.counters().invalid_destroys, 0);
    assert_eq!(r.mesh_resource_count(), 0);
    assert_eq!(r.pipeline_count(), 0);
    assert!(!r.has_skybox_resources());
    assert_eq!(r.render(&mut scene, &camera()), Err(RenderError::Disposed));
}
