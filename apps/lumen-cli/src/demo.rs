//! Demo scene used by `dry-run` and `render`: a lit cube over a floor plane,
//! a ring of point lights and an optional gradient skybox.

use anyhow::Result;
use glam::{Quat, Vec2, Vec3, Vec4};
use lumen_common::{Color, MaterialId, NodeId, Transform};
use lumen_render::{
    BasicMaterial, FrameRenderer, NormalMaterial, RenderDevice, RenderScene, SkyboxMaterial,
    StandardMaterial, TextureDesc, TextureDimension, TextureFormat,
};
use lumen_scene::{Camera, Geometry, Light};

#[derive(Debug, Clone)]
pub struct DemoOptions {
    pub lights: usize,
    pub skybox: bool,
    pub wireframe_floor: bool,
}

pub struct DemoScene {
    pub scene: RenderScene,
    pub camera: Camera,
    pub cube: NodeId,
    pub floor: NodeId,
    red: MaterialId,
    blue: MaterialId,
    normals: MaterialId,
    floor_subdivisions: u32,
}

pub fn cube(size: f32) -> Result<Geometry> {
    let h = size * 0.5;
    // (normal, tangent) per face
    let faces = [
        (Vec3::Z, Vec3::X),
        (Vec3::NEG_Z, Vec3::NEG_X),
        (Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_X, Vec3::Z),
        (Vec3::Y, Vec3::X),
        (Vec3::NEG_Y, Vec3::X),
    ];
    let mut positions = Vec::with_capacity(24);
    let mut normals = Vec::with_capacity(24);
    let mut uvs = Vec::with_capacity(24);
    let mut tangents = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, tangent) in faces {
        let bitangent = normal.cross(tangent);
        let base = positions.len() as u32;
        for (u, v) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
            let offset = tangent * (u * 2.0 - 1.0) + bitangent * (v * 2.0 - 1.0);
            positions.push((normal + offset) * h);
            normals.push(normal);
            uvs.push(Vec2::new(u, v));
            tangents.push(tangent.extend(1.0));
        }
        indices.extend([base, base + 1, base + 2, base + 2, base + 3, base]);
    }
    Ok(Geometry::new(positions, normals)?
        .with_uvs(uvs)?
        .with_tangents(tangents)?
        .with_indices(indices)?)
}

/// Square in the XZ plane split into `subdivisions`² quads.
pub fn plane(size: f32, subdivisions: u32) -> Result<Geometry> {
    let n = subdivisions.max(1);
    let step = size / n as f32;
    let mut positions = Vec::new();
    let mut uvs = Vec::new();
    for z in 0..=n {
        for x in 0..=n {
            positions.push(Vec3::new(x as f32 * step - size * 0.5, 0.0, z as f32 * step - size * 0.5));
            uvs.push(Vec2::new(x as f32 / n as f32, z as f32 / n as f32));
        }
    }
    let row = n + 1;
    let mut indices = Vec::new();
    for z in 0..n {
        for x in 0..n {
            let i = z * row + x;
            indices.extend([i, i + row, i + 1, i + 1, i + row, i + row + 1]);
        }
    }
    let count = positions.len();
    Ok(Geometry::new(positions, vec![Vec3::Y; count])?
        .with_uvs(uvs)?
        .with_tangents(vec![Vec4::new(1.0, 0.0, 0.0, 1.0); count])?
        .with_indices(indices)?)
}

/// Vertical gradient from `zenith` to `horizon` on every cube face.
fn gradient_cube(size: u32, zenith: [u8; 3], horizon: [u8; 3]) -> Vec<u8> {
    let mut data = Vec::with_capacity((size * size * 6 * 4) as usize);
    for _face in 0..6 {
        for y in 0..size {
            let t = y as f32 / (size - 1).max(1) as f32;
            for _x in 0..size {
                for c in 0..3 {
                    let value = f32::from(zenith[c]) * (1.0 - t) + f32::from(horizon[c]) * t;
                    data.push(value as u8);
                }
                data.push(255);
            }
        }
    }
    data
}

pub fn build<D: RenderDevice>(renderer: &mut FrameRenderer<D>, options: &DemoOptions) -> Result<DemoScene> {
    let mut scene = RenderScene::new();

    let red = scene.add_material(Box::new(StandardMaterial::new(Color::rgb(0.8, 0.15, 0.1))));
    let blue = scene.add_material(Box::new(StandardMaterial::new(Color::rgb(0.1, 0.3, 0.9))));
    let normals = scene.add_material(Box::new(NormalMaterial::default()));
    let mut floor_material = BasicMaterial::new(Color::rgb(0.35, 0.35, 0.35));
    floor_material.set_wireframe(options.wireframe_floor);
    let floor_material = scene.add_material(Box::new(floor_material));

    if options.skybox {
        let desc = TextureDesc::sampled("demo.sky", 16, 16, TextureDimension::Cube, TextureFormat::Rgba8UnormSrgb);
        let texture = renderer.create_texture(&desc, Some(&gradient_cube(16, [40, 70, 140], [200, 190, 170])))?;
        let sky = scene.add_material(Box::new(SkyboxMaterial::new(Some(texture))));
        scene.set_environment(Some(sky))?;
    }

    let floor_subdivisions = 4;
    let floor = scene.add_mesh(
        None,
        plane(10.0, floor_subdivisions)?,
        floor_material,
        Transform::from_position(Vec3::new(0.0, -1.0, 0.0)),
    )?;
    let cube = scene.add_mesh(None, cube(1.5)?, red, Transform::default())?;

    scene.add_light(None, Light::ambient(Color::WHITE, 0.15), Transform::default())?;
    scene.add_light(None, Light::directional(Color::WHITE, 0.6), Transform {
        rotation: Quat::from_rotation_x(-0.9),
        ..Transform::default()
    })?;
    let ring = scene.add_group(None, Transform::from_position(Vec3::new(0.0, 2.0, 0.0)))?;
    for i in 0..options.lights {
        let angle = i as f32 / options.lights.max(1) as f32 * std::f32::consts::TAU;
        scene.add_light(
            Some(ring),
            Light::point(Color::rgb(1.0, 0.9, 0.7), 2.0, 8.0),
            Transform::from_position(Vec3::new(angle.cos() * 3.0, 0.0, angle.sin() * 3.0)),
        )?;
    }

    let camera = Camera::perspective(55.0, 0.1, 100.0).looking_at(Vec3::new(4.0, 3.0, 6.0), Vec3::ZERO, Vec3::Y);

    Ok(DemoScene {
        scene,
        camera,
        cube,
        floor,
        red,
        blue,
        normals,
        floor_subdivisions,
    })
}

impl DemoScene {
    /// Apply the edit for `frame` and name it. The edits cycle so a short
    /// dry run touches every cache tier.
    pub fn step(&mut self, frame: u64) -> Result<&'static str> {
        if frame == 0 {
            return Ok("initial build");
        }
        let edit = match frame % 4 {
            1 => {
                let mut transform = *self.node_transform(self.cube)?;
                transform.rotation *= Quat::from_rotation_y(0.4);
                self.scene.set_local_transform(self.cube, transform)?;
                "rotate cube"
            }
            2 => {
                let current = self.mesh_material(self.cube)?;
                let next = if current == self.red { self.blue } else { self.red };
                self.scene.set_mesh_material(self.cube, next)?;
                "swap cube color"
            }
            3 => {
                self.floor_subdivisions += 2;
                self.scene
                    .set_geometry(self.floor, plane(10.0, self.floor_subdivisions)?)?;
                "subdivide floor"
            }
            _ => {
                let current = self.mesh_material(self.cube)?;
                let next = if current == self.normals { self.red } else { self.normals };
                self.scene.set_mesh_material(self.cube, next)?;
                "switch cube material type"
            }
        };
        Ok(edit)
    }

    fn node_transform(&self, id: NodeId) -> Result<&Transform> {
        self.scene
            .node(id)
            .map(|node| node.local_transform())
            .ok_or_else(|| anyhow::anyhow!("demo node {id} is gone"))
    }

    fn mesh_material(&self, id: NodeId) -> Result<MaterialId> {
        self.scene
            .mesh(id)
            .map(|mesh| mesh.material())
            .ok_or_else(|| anyhow::anyhow!("demo mesh {id} is gone"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_render::{HeadlessDevice, RendererConfig};

    #[test]
    fn cube_has_four_vertices_per_face() {
        let g = cube(1.0).unwrap();
        assert_eq!(g.vertex_count(), 24);
        assert_eq!(g.index_count(), 36);
        assert!(g.positions().iter().all(|p| p.abs().max_element() <= 0.5 + f32::EPSILON));
    }

    #[test]
    fn plane_grid_counts() {
        let g = plane(2.0, 3).unwrap();
        assert_eq!(g.vertex_count(), 16);
        assert_eq!(g.index_count(), 54);
    }

    #[test]
    fn demo_renders_every_edit() {
        let mut renderer = FrameRenderer::new(HeadlessDevice::new(64, 64), RendererConfig::default()).unwrap();
        let options = DemoOptions {
            lights: 6,
            skybox: true,
            wireframe_floor: false,
        };
        let mut demo = build(&mut renderer, &options).unwrap();
        for frame in 0..8 {
            demo.step(frame).unwrap();
            let stats = renderer.render(&mut demo.scene, &demo.camera).unwrap();
            assert_eq!(stats.meshes_drawn, 2);
            assert!(stats.skybox);
        }
        // floor, standard, normal
        assert_eq!(renderer.pipeline_count(), 3);
    }
}
