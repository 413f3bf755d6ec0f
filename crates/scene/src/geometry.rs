use glam::{Vec2, Vec3, Vec4};

/// Errors raised when assembling geometry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("attribute `{attribute}` has {actual} elements, expected {expected}")]
    LengthMismatch {
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
}

/// Immutable vertex/index data of a mesh.
///
/// Positions and normals are mandatory; uvs, tangents and bitangents are
/// optional. Indices, when present, describe a triangle list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Geometry {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Option<Vec<Vec2>>,
    tangents: Option<Vec<Vec4>>,
    bitangents: Option<Vec<Vec3>>,
    indices: Option<Vec<u32>>,
}

impl Geometry {
    pub fn new(positions: Vec<Vec3>, normals: Vec<Vec3>) -> Result<Self, GeometryError> {
        check_len("normals", positions.len(), normals.len())?;
        Ok(Self {
            positions,
            normals,
            ..Self::default()
        })
    }

    pub fn with_uvs(mut self, uvs: Vec<Vec2>) -> Result<Self, GeometryError> {
        check_len("uvs", self.positions.len(), uvs.len())?;
        self.uvs = Some(uvs);
        Ok(self)
    }

    pub fn with_tangents(mut self, tangents: Vec<Vec4>) -> Result<Self, GeometryError> {
        check_len("tangents", self.positions.len(), tangents.len())?;
        self.tangents = Some(tangents);
        Ok(self)
    }

    pub fn with_bitangents(mut self, bitangents: Vec<Vec3>) -> Result<Self, GeometryError> {
        check_len("bitangents", self.positions.len(), bitangents.len())?;
        self.bitangents = Some(bitangents);
        Ok(self)
    }

    pub fn with_indices(mut self, indices: Vec<u32>) -> Result<Self, GeometryError> {
        let vertex_count = self.positions.len();
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(GeometryError::IndexOutOfRange {
                index,
                vertex_count,
            });
        }
        self.indices = Some(indices);
        Ok(self)
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    pub fn uvs(&self) -> Option<&[Vec2]> {
        self.uvs.as_deref()
    }

    pub fn tangents(&self) -> Option<&[Vec4]> {
        self.tangents.as_deref()
    }

    pub fn bitangents(&self) -> Option<&[Vec3]> {
        self.bitangents.as_deref()
    }

    pub fn indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of indices, zero for non-indexed geometry.
    pub fn index_count(&self) -> usize {
        self.indices.as_ref().map_or(0, Vec::len)
    }
}

fn check_len(attribute: &'static str, expected: usize, actual: usize) -> Result<(), GeometryError> {
    if expected == actual {
        Ok(())
    } else {
        Err(GeometryError::LengthMismatch {
            attribute,
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Geometry {
        Geometry::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![Vec3::Z, Vec3::Z, Vec3::Z],
        )
        .unwrap()
    }

    #[test]
    fn counts() {
        let g = triangle().with_indices(vec![0, 1, 2]).unwrap();
        assert_eq!(g.vertex_count(), 3);
        assert_eq!(g.index_count(), 3);
        assert!(g.uvs().is_none());
    }

    #[test]
    fn mismatched_normals_rejected() {
        let err = Geometry::new(vec![Vec3::ZERO, Vec3::X], vec![Vec3::Z]).unwrap_err();
        assert_eq!(
            err,
            GeometryError::LengthMismatch {
                attribute: "normals",
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn out_of_range_index_rejected() {
        let err = triangle().with_indices(vec![0, 1, 3]).unwrap_err();
        assert!(matches!(err, GeometryError::IndexOutOfRange { index: 3, .. }));
    }

    #[test]
    fn uv_length_checked() {
        assert!(triangle().with_uvs(vec![Vec2::ZERO; 2]).is_err());
        assert!(triangle().with_uvs(vec![Vec2::ZERO; 3]).is_ok());
    }
}
