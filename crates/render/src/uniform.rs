//! Uniform memory layout shared by the renderer and materials.
//!
//! ```text
//! offset  field                                  size
//! 0       model-view-projection                  64
//! 64      model matrix           (World only)    64
//! 128     normal matrix          (World only)    64
//! header  material block                         uniform_size - header
//! ```
//!
//! The renderer writes the header into a CPU staging copy, hands the material
//! a [`UniformBlock`] spanning exactly the material block, and uploads the
//! whole staging copy only when the material returned without error.

use crate::error::RenderError;
use crate::material::{Material, TransformLayout};
use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3, Vec4};
use lumen_common::Color;
use lumen_scene::WorldLight;

/// A write that fell outside the material block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("write of {len} bytes at block offset {offset} exceeds {capacity}-byte block")]
pub struct UniformError {
    pub offset: usize,
    pub len: usize,
    pub capacity: usize,
}

/// Bounded, block-relative view over a material's uniform bytes.
pub struct UniformBlock<'a> {
    bytes: &'a mut [u8],
}

impl<'a> UniformBlock<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }

    pub fn write_bytes(&mut self, offset: usize, data: &[u8]) -> Result<(), UniformError> {
        let err = UniformError {
            offset,
            len: data.len(),
            capacity: self.bytes.len(),
        };
        let end = offset.checked_add(data.len()).ok_or(err)?;
        let dst = self.bytes.get_mut(offset..end).ok_or(err)?;
        dst.copy_from_slice(data);
        Ok(())
    }

    pub fn write<T: Pod>(&mut self, offset: usize, value: &T) -> Result<(), UniformError> {
        self.write_bytes(offset, bytemuck::bytes_of(value))
    }

    pub fn write_f32(&mut self, offset: usize, value: f32) -> Result<(), UniformError> {
        self.write(offset, &value)
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) -> Result<(), UniformError> {
        self.write(offset, &value)
    }

    pub fn write_vec4(&mut self, offset: usize, value: Vec4) -> Result<(), UniformError> {
        self.write(offset, &value.to_array())
    }

    pub fn write_color(&mut self, offset: usize, color: Color) -> Result<(), UniformError> {
        self.write(offset, &color.to_array())
    }

    pub fn write_mat4(&mut self, offset: usize, value: Mat4) -> Result<(), UniformError> {
        self.write(offset, &value.to_cols_array())
    }
}

/// Per-draw data available to [`Material::write_uniforms`].
#[derive(Debug, Clone, Copy)]
pub struct UniformContext<'a> {
    pub view: Mat4,
    pub projection: Mat4,
    pub camera_position: Vec3,
    /// World matrix of the mesh being drawn; identity for the background.
    pub model: Mat4,
    /// Every visible light of the frame in traversal order.
    pub lights: &'a [WorldLight],
}

impl UniformContext<'_> {
    pub fn model_view_projection(&self) -> Mat4 {
        self.projection * self.view * self.model
    }

    pub fn normal_matrix(&self) -> Mat4 {
        self.model.inverse().transpose()
    }

    /// Maps clip-space positions back to view directions, ignoring camera
    /// translation.
    pub fn inverse_environment_projection(&self) -> Mat4 {
        let rotation_only = Mat4::from_mat3(Mat3::from_mat4(self.view));
        (self.projection * rotation_only).inverse()
    }
}

/// Write the renderer-owned header into the first bytes of `staging`.
pub fn write_header(staging: &mut [u8], layout: TransformLayout, ctx: &UniformContext<'_>) -> Result<(), UniformError> {
    let mut header = UniformBlock::new(staging);
    match layout {
        TransformLayout::ModelViewProjection => {
            header.write_mat4(TransformLayout::MVP_OFFSET, ctx.model_view_projection())
        }
        TransformLayout::World => {
            header.write_mat4(TransformLayout::MVP_OFFSET, ctx.model_view_projection())?;
            header.write_mat4(TransformLayout::MODEL_OFFSET, ctx.model)?;
            header.write_mat4(TransformLayout::NORMAL_MATRIX_OFFSET, ctx.normal_matrix())
        }
        TransformLayout::Environment => {
            header.write_mat4(TransformLayout::MVP_OFFSET, ctx.inverse_environment_projection())
        }
    }
}

/// Rebuild the full uniform contents for one draw.
///
/// `staging` must be exactly `material.uniform_size()` bytes. It is zeroed
/// first, so fields a material leaves untouched read as zero.
pub fn fill_uniforms(
    staging: &mut [u8],
    layout: TransformLayout,
    material: &dyn Material,
    ctx: &UniformContext<'_>,
) -> Result<(), RenderError> {
    let header = layout.header_size();
    if staging.len() < header {
        return Err(RenderError::configuration(
            material.material_type(),
            format!("uniform size {} is smaller than the {header}-byte transform header", staging.len()),
        ));
    }
    staging.fill(0);
    let (head, body) = staging.split_at_mut(header);
    write_header(head, layout, ctx).map_err(|e| RenderError::configuration(material.material_type(), e.to_string()))?;

    let mut block = UniformBlock::new(body);
    material
        .write_uniforms(&mut block, ctx)
        .map_err(|e| RenderError::UniformOverflow {
            material: material.material_type().to_string(),
            offset: e.offset,
            len: e.len,
            capacity: e.capacity,
        })
}

pub const LIGHT_KIND_DIRECTIONAL: f32 = 0.0;
pub const LIGHT_KIND_POINT: f32 = 1.0;

/// One non-ambient light as laid out in a light array (48 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct GpuLight {
    /// Direction for directional lights, position for point lights; `w` is
    /// the light kind.
    pub position_or_direction: [f32; 4],
    /// `rgb` color, `a` intensity.
    pub color: [f32; 4],
    /// `x` range; the rest is padding.
    pub params: [f32; 4],
}

impl GpuLight {
    pub const SIZE: usize = 48;

    pub fn from_world(light: &WorldLight) -> Option<Self> {
        match *light {
            WorldLight::Ambient { .. } => None,
            WorldLight::Directional {
                color,
                intensity,
                direction,
            } => Some(Self {
                position_or_direction: direction.extend(LIGHT_KIND_DIRECTIONAL).to_array(),
                color: [color.r, color.g, color.b, intensity],
                params: [0.0; 4],
            }),
            WorldLight::Point {
                color,
                intensity,
                position,
                range,
            } => Some(Self {
                position_or_direction: position.extend(LIGHT_KIND_POINT).to_array(),
                color: [color.r, color.g, color.b, intensity],
                params: [range, 0.0, 0.0, 0.0],
            }),
        }
    }
}

/// Fixed-capacity light slot layout.
///
/// ```text
/// +0   ambient   vec4   sum of ambient color * intensity
/// +16  count     u32    (padded to 16)
/// +32  lights    GpuLight[N]
/// ```
///
/// Ambient lights never occupy a slot. Lights past `N` are dropped in
/// traversal order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSlots<const N: usize> {
    pub ambient: [f32; 4],
    pub count: u32,
    pub lights: [GpuLight; N],
    /// Non-ambient lights that did not fit.
    pub dropped: usize,
}

impl<const N: usize> LightSlots<N> {
    pub const AMBIENT_OFFSET: usize = 0;
    pub const COUNT_OFFSET: usize = 16;
    pub const LIGHTS_OFFSET: usize = 32;
    pub const BLOCK_SIZE: usize = 32 + GpuLight::SIZE * N;

    pub fn pack(lights: &[WorldLight]) -> Self {
        let mut ambient = Vec3::ZERO;
        let mut slots = [GpuLight::zeroed(); N];
        let mut count = 0;
        let mut dropped = 0;
        for light in lights {
            if let WorldLight::Ambient { color, intensity } = *light {
                ambient += Vec3::new(color.r, color.g, color.b) * intensity;
                continue;
            }
            match GpuLight::from_world(light) {
                Some(gpu) if count < N => {
                    slots[count] = gpu;
                    count += 1;
                }
                Some(_) => dropped += 1,
                None => {}
            }
        }
        Self {
            ambient: ambient.extend(0.0).to_array(),
            count: count as u32,
            lights: slots,
            dropped,
        }
    }

    pub fn write(&self, block: &mut UniformBlock<'_>, offset: usize) -> Result<(), UniformError> {
        block.write(offset + Self::AMBIENT_OFFSET, &self.ambient)?;
        block.write_u32(offset + Self::COUNT_OFFSET, self.count)?;
        block.write_bytes(offset + Self::LIGHTS_OFFSET, bytemuck::cast_slice(&self.lights))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::ShaderSource;
    use crate::vertex::VertexLayout;

    fn floats(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn ctx(lights: &[WorldLight]) -> UniformContext<'_> {
        UniformContext {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            camera_position: Vec3::ZERO,
            model: Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)),
            lights,
        }
    }

    struct Greedy(usize);

    impl Material for Greedy {
        fn material_type(&self) -> &str {
            "greedy"
        }
        fn shader(&self) -> ShaderSource {
            ShaderSource::from_static("")
        }
        fn vertex_layout(&self) -> VertexLayout {
            VertexLayout::empty()
        }
        fn uniform_size(&self) -> usize {
            80
        }
        fn write_uniforms(&self, block: &mut UniformBlock<'_>, _ctx: &UniformContext<'_>) -> Result<(), UniformError> {
            block.write_vec4(self.0, Vec4::ONE)
        }
    }

    #[test]
    fn block_rejects_out_of_range_writes() {
        let mut bytes = [0u8; 16];
        let mut block = UniformBlock::new(&mut bytes);
        assert!(block.write_vec4(0, Vec4::ONE).is_ok());
        let err = block.write_f32(13, 1.0).unwrap_err();
        assert_eq!(err, UniformError { offset: 13, len: 4, capacity: 16 });
        assert!(block.write_bytes(usize::MAX, &[1]).is_err());
    }

    #[test]
    fn world_header_layout() {
        let mut staging = vec![0u8; 192];
        let c = ctx(&[]);
        write_header(&mut staging, TransformLayout::World, &c).unwrap();
        let floats: Vec<f32> = floats(&staging);
        // model translation column lives at float 16 + 12
        assert_eq!(&floats[28..31], &[1.0, 2.0, 3.0]);
        // mvp == model here since view and projection are identity
        assert_eq!(&floats[12..15], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn fill_hands_material_the_block_after_the_header() {
        let mut staging = vec![0u8; 80];
        fill_uniforms(&mut staging, TransformLayout::ModelViewProjection, &Greedy(0), &ctx(&[])).unwrap();
        let floats: Vec<f32> = floats(&staging);
        assert_eq!(&floats[16..20], &[1.0; 4]);
    }

    #[test]
    fn overflowing_material_is_named() {
        let mut staging = vec![0u8; 80];
        let err = fill_uniforms(&mut staging, TransformLayout::ModelViewProjection, &Greedy(8), &ctx(&[]))
            .unwrap_err();
        assert_eq!(
            err,
            RenderError::UniformOverflow {
                material: "greedy".into(),
                offset: 8,
                len: 16,
                capacity: 16,
            }
        );
    }

    #[test]
    fn light_slots_split_ambient_and_truncate() {
        let mut lights = vec![WorldLight::Ambient {
            color: Color::WHITE,
            intensity: 0.25,
        }];
        for i in 0..6 {
            lights.push(WorldLight::Point {
                color: Color::WHITE,
                intensity: 1.0,
                position: Vec3::new(i as f32, 0.0, 0.0),
                range: 5.0,
            });
        }
        let slots = LightSlots::<4>::pack(&lights);
        assert_eq!(slots.count, 4);
        assert_eq!(slots.dropped, 2);
        assert_eq!(slots.ambient, [0.25, 0.25, 0.25, 0.0]);
        assert_eq!(slots.lights[3].position_or_direction, [3.0, 0.0, 0.0, LIGHT_KIND_POINT]);

        let mut bytes = vec![0u8; LightSlots::<4>::BLOCK_SIZE];
        slots.write(&mut UniformBlock::new(&mut bytes), 0).unwrap();
        let count = u32::from_ne_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
        assert_eq!(count, 4);
    }

    #[test]
    fn gpu_light_is_48_bytes() {
        assert_eq!(std::mem::size_of::<GpuLight>(), GpuLight::SIZE);
    }
}
