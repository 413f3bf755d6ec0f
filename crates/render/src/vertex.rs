//! Vertex layouts, primitive topology and the CPU-side geometry preparation
//! done before upload: interleaving and index derivation.

use lumen_scene::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Topology {
    TriangleList,
    LineList,
    PointList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    pub fn components(self) -> usize {
        match self {
            Self::Float32 => 1,
            Self::Float32x2 => 2,
            Self::Float32x3 => 3,
            Self::Float32x4 => 4,
        }
    }

    pub fn size(self) -> u64 {
        self.components() as u64 * 4
    }
}

/// Which geometry stream feeds an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeSemantic {
    Position,
    Normal,
    Uv,
    Tangent,
    Bitangent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub semantic: AttributeSemantic,
    pub format: VertexFormat,
    pub offset: u64,
    pub location: u32,
}

/// Interleaved single-buffer vertex layout declared by a material.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexLayout {
    pub stride: u64,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// Layout with no vertex buffer at all (procedural vertices).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Pack attributes tightly in declaration order; locations follow order.
    pub fn packed(attributes: &[(AttributeSemantic, VertexFormat)]) -> Self {
        let mut offset = 0;
        let attributes = attributes
            .iter()
            .enumerate()
            .map(|(location, &(semantic, format))| {
                let attr = VertexAttribute {
                    semantic,
                    format,
                    offset,
                    location: location as u32,
                };
                offset += format.size();
                attr
            })
            .collect();
        Self {
            stride: offset,
            attributes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Check the layout is self-consistent.
    pub fn validate(&self) -> Result<(), String> {
        if self.attributes.is_empty() {
            return Ok(());
        }
        if self.stride == 0 || self.stride % 4 != 0 {
            return Err(format!("vertex stride {} must be a non-zero multiple of 4", self.stride));
        }
        let mut locations = HashSet::new();
        for (i, attr) in self.attributes.iter().enumerate() {
            if attr.offset % 4 != 0 {
                return Err(format!("attribute {:?} offset {} is not 4-byte aligned", attr.semantic, attr.offset));
            }
            if attr.offset + attr.format.size() > self.stride {
                return Err(format!(
                    "attribute {:?} ({:?} at offset {}) exceeds stride {}",
                    attr.semantic, attr.format, attr.offset, self.stride
                ));
            }
            if !locations.insert(attr.location) {
                return Err(format!("shader location {} declared twice", attr.location));
            }
            for other in &self.attributes[i + 1..] {
                let a = attr.offset..attr.offset + attr.format.size();
                let b = other.offset..other.offset + other.format.size();
                if a.start < b.end && b.start < a.end {
                    return Err(format!(
                        "attributes {:?} and {:?} overlap",
                        attr.semantic, other.semantic
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

impl IndexFormat {
    pub fn byte_width(self) -> u64 {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}

/// Interleave geometry streams into one vertex buffer following `layout`.
///
/// Optional streams the geometry lacks are zero-filled. A four-component
/// position gets `w = 1`.
pub fn interleave(geometry: &Geometry, layout: &VertexLayout) -> Vec<u8> {
    let count = geometry.vertex_count();
    let stride = layout.stride as usize;
    let mut out = vec![0u8; count * stride];
    for (v, vertex) in out.chunks_exact_mut(stride.max(1)).enumerate().take(count) {
        for attr in &layout.attributes {
            let mut src = [0.0f32; 4];
            match attr.semantic {
                AttributeSemantic::Position => {
                    src[..3].copy_from_slice(&geometry.positions()[v].to_array());
                    src[3] = 1.0;
                }
                AttributeSemantic::Normal => {
                    src[..3].copy_from_slice(&geometry.normals()[v].to_array());
                }
                AttributeSemantic::Uv => {
                    if let Some(uvs) = geometry.uvs() {
                        src[..2].copy_from_slice(&uvs[v].to_array());
                    }
                }
                AttributeSemantic::Tangent => {
                    if let Some(tangents) = geometry.tangents() {
                        src = tangents[v].to_array();
                    }
                }
                AttributeSemantic::Bitangent => {
                    if let Some(bitangents) = geometry.bitangents() {
                        src[..3].copy_from_slice(&bitangents[v].to_array());
                    }
                }
            }
            let n = attr.format.components();
            let start = attr.offset as usize;
            vertex[start..start + n * 4].copy_from_slice(bytemuck::cast_slice(&src[..n]));
        }
    }
    out
}

/// Indices to upload for `topology`.
///
/// Triangle and point lists use the geometry's own indices (if any). Line
/// lists expand the triangle list into its unique edges, in first-seen order;
/// non-indexed geometry is treated as consecutive vertex triplets.
pub fn derive_indices(geometry: &Geometry, topology: Topology) -> Option<Vec<u32>> {
    match topology {
        Topology::TriangleList | Topology::PointList => geometry.indices().map(<[u32]>::to_vec),
        Topology::LineList => Some(wireframe_edges(geometry.indices(), geometry.vertex_count())),
    }
}

pub fn wireframe_edges(indices: Option<&[u32]>, vertex_count: usize) -> Vec<u32> {
    let implicit: Vec<u32>;
    let triangles = match indices {
        Some(indices) => indices,
        None => {
            implicit = (0..vertex_count as u32).collect();
            &implicit
        }
    };

    let mut seen = HashSet::new();
    let mut edges = Vec::with_capacity(triangles.len() * 2);
    for tri in triangles.chunks_exact(3) {
        for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            if seen.insert((a.min(b), a.max(b))) {
                edges.push(a);
                edges.push(b);
            }
        }
    }
    edges
}

/// Encode indices in the narrowest format that holds them.
pub fn encode_indices(indices: &[u32]) -> (IndexFormat, Vec<u8>) {
    let fits_u16 = indices.iter().all(|&i| i <= u32::from(u16::MAX));
    if fits_u16 {
        let narrow: Vec<u16> = indices.iter().map(|&i| i as u16).collect();
        (IndexFormat::Uint16, bytemuck::cast_slice(&narrow).to_vec())
    } else {
        (IndexFormat::Uint32, bytemuck::cast_slice(indices).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};

    fn floats(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn quad() -> Geometry {
        Geometry::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![Vec3::Z; 4],
        )
        .unwrap()
        .with_indices(vec![0, 1, 2, 2, 3, 0])
        .unwrap()
    }

    #[test]
    fn packed_layout_offsets() {
        let layout = VertexLayout::packed(&[
            (AttributeSemantic::Position, VertexFormat::Float32x3),
            (AttributeSemantic::Uv, VertexFormat::Float32x2),
        ]);
        assert_eq!(layout.stride, 20);
        assert_eq!(layout.attributes[1].offset, 12);
        assert_eq!(layout.attributes[1].location, 1);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn overlapping_attributes_rejected() {
        let mut layout = VertexLayout::packed(&[
            (AttributeSemantic::Position, VertexFormat::Float32x3),
            (AttributeSemantic::Normal, VertexFormat::Float32x3),
        ]);
        layout.attributes[1].offset = 8;
        assert!(layout.validate().unwrap_err().contains("overlap"));
    }

    #[test]
    fn attribute_past_stride_rejected() {
        let mut layout =
            VertexLayout::packed(&[(AttributeSemantic::Position, VertexFormat::Float32x3)]);
        layout.stride = 8;
        assert!(layout.validate().is_err());
    }

    #[test]
    fn interleave_zero_fills_missing_uvs() {
        let layout = VertexLayout::packed(&[
            (AttributeSemantic::Position, VertexFormat::Float32x3),
            (AttributeSemantic::Uv, VertexFormat::Float32x2),
        ]);
        let bytes = interleave(&quad(), &layout);
        assert_eq!(bytes.len(), 4 * 20);
        let floats: Vec<f32> = floats(&bytes);
        // second vertex: position (1,0,0), uv (0,0)
        assert_eq!(&floats[5..10], &[1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn interleave_copies_uvs() {
        let geometry = quad()
            .with_uvs(vec![Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y])
            .unwrap();
        let layout = VertexLayout::packed(&[(AttributeSemantic::Uv, VertexFormat::Float32x2)]);
        let floats: Vec<f32> = floats(&interleave(&geometry, &layout));
        assert_eq!(floats, vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn wireframe_dedups_shared_edges() {
        let edges = wireframe_edges(Some(&[0, 1, 2, 2, 3, 0][..]), 4);
        // 5 unique edges: 01 12 20 23 30
        assert_eq!(edges, vec![0, 1, 1, 2, 2, 0, 2, 3, 3, 0]);
    }

    #[test]
    fn wireframe_of_non_indexed_geometry() {
        let edges = wireframe_edges(None, 3);
        assert_eq!(edges, vec![0, 1, 1, 2, 2, 0]);
    }

    #[test]
    fn line_list_derives_edges_triangle_list_keeps_indices() {
        let g = quad();
        assert_eq!(derive_indices(&g, Topology::TriangleList).unwrap().len(), 6);
        assert_eq!(derive_indices(&g, Topology::LineList).unwrap().len(), 10);
    }

    #[test]
    fn index_width_follows_range() {
        assert_eq!(encode_indices(&[0, 1, 2]).0, IndexFormat::Uint16);
        let (format, bytes) = encode_indices(&[0, 70_000, 2]);
        assert_eq!(format, IndexFormat::Uint32);
        assert_eq!(bytes.len(), 12);
    }
}
