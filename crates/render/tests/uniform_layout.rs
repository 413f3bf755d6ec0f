use glam::{Mat4, Vec3};
use lumen_common::Color;
use lumen_render::uniform::{fill_uniforms, write_header};
use lumen_render::{
    BasicMaterial, Material, NormalMaterial, SkyboxMaterial, StandardMaterial, TextureId, UniformContext,
};
use lumen_scene::WorldLight;

fn shipped() -> Vec<Box<dyn Material>> {
    let mut wire = BasicMaterial::new(Color::rgb(0.2, 0.4, 0.6));
    wire.set_wireframe(true);
    vec![
        Box::new(BasicMaterial::default()),
        Box::new(wire),
        Box::new(NormalMaterial::default()),
        Box::new(StandardMaterial::new(Color::rgb(0.8, 0.1, 0.1))),
        Box::new(SkyboxMaterial::new(Some(TextureId(1)))),
    ]
}

fn many_lights() -> Vec<WorldLight> {
    let mut lights = vec![WorldLight::Ambient {
        color: Color::WHITE,
        intensity: 0.1,
    }];
    for i in 0..8 {
        lights.push(WorldLight::Point {
            position: Vec3::new(i as f32, 2.0, 0.0),
            color: Color::WHITE,
            intensity: 1.0,
            range: 5.0,
        });
    }
    lights
}

fn context(lights: &[WorldLight]) -> UniformContext<'_> {
    UniformContext {
        view: Mat4::look_at_rh(Vec3::new(0.0, 1.0, 4.0), Vec3::ZERO, Vec3::Y),
        projection: Mat4::perspective_rh(1.0, 1.5, 0.1, 50.0),
        camera_position: Vec3::new(0.0, 1.0, 4.0),
        model: Mat4::from_translation(Vec3::new(1.0, 0.0, -2.0)),
        lights,
    }
}

#[test]
fn declared_sizes_leave_room_after_the_header() {
    for material in shipped() {
        let header = material.transform_layout().header_size();
        let size = material.uniform_size();
        assert!(size > header, "{} has no block", material.material_type());
        assert_eq!(size % 16, 0, "{} is not 16-byte aligned", material.material_type());
    }
}

#[test]
fn material_writes_never_touch_the_header() {
    let lights = many_lights();
    let ctx = context(&lights);
    for material in shipped() {
        let layout = material.transform_layout();
        let header = layout.header_size();
        let mut staging = vec![0u8; material.uniform_size()];
        fill_uniforms(&mut staging, layout, material.as_ref(), &ctx).unwrap();

        let mut expected = vec![0u8; header];
        write_header(&mut expected, layout, &ctx).unwrap();
        assert_eq!(&staging[..header], &expected[..], "{}", material.material_type());
        assert!(
            staging[header..].iter().any(|&b| b != 0),
            "{} wrote nothing",
            material.material_type()
        );
    }
}

#[test]
fn refilling_clears_previous_values() {
    let lights = many_lights();
    let ctx = context(&lights);
    let material = StandardMaterial::default();
    let mut staging = vec![0xAAu8; material.uniform_size()];
    fill_uniforms(&mut staging, material.transform_layout(), &material, &ctx).unwrap();
    // padding of the last light slot
    let tail = &staging[staging.len() - 4..];
    assert_eq!(tail, &[0, 0, 0, 0]);
}
