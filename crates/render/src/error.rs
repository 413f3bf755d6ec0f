//! Error taxonomy of the renderer.
//!
//! - Configuration errors (bad shader, bad vertex layout, unsupported target
//!   configuration) are fatal for the frame that hit them.
//! - Contract violations (a required texture is missing, a material writes
//!   outside its uniform block) are fatal as well and name the material.
//! - A missing optional texture is not an error at all; a placeholder is bound.

use lumen_common::{MaterialId, NodeId};

/// Failures reported by a [`crate::RenderDevice`] implementation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u64 },
    #[error("pipeline `{label}` failed to compile: {message}")]
    PipelineCreation { label: String, message: String },
    #[error("bind group `{label}` does not match its layout: {message}")]
    BindGroupMismatch { label: String, message: String },
    #[error("write of {len} bytes at offset {offset} exceeds buffer of {size} bytes")]
    WriteOutOfRange { offset: u64, len: usize, size: u64 },
    #[error("surface error: {0}")]
    Surface(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Errors that abort construction of a frame.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("configuration error for material `{material}`: {reason}")]
    Configuration { material: String, reason: String },

    #[error("material `{material}` requires texture `{slot}` but none is bound")]
    MissingTexture { material: String, slot: String },

    #[error(
        "material `{material}` wrote {len} bytes at block offset {offset}, past its {capacity}-byte uniform block"
    )]
    UniformOverflow {
        material: String,
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("{node} references unknown {material}")]
    UnknownMaterial { node: NodeId, material: MaterialId },

    #[error("environment references unknown {0}")]
    UnknownEnvironment(MaterialId),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("renderer has been disposed")]
    Disposed,
}

impl RenderError {
    pub fn configuration(material: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            material: material.into(),
            reason: reason.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::Device(DeviceError::PipelineCreation { .. })
        )
    }

    /// A material broke the renderer/material contract.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::MissingTexture { .. } | Self::UniformOverflow { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = RenderError::MissingTexture {
            material: "skybox".into(),
            slot: "env_map".into(),
        };
        assert_eq!(
            err.to_string(),
            "material `skybox` requires texture `env_map` but none is bound"
        );
        assert!(err.is_contract_violation());
        assert!(!err.is_configuration());
    }

    #[test]
    fn pipeline_creation_counts_as_configuration() {
        let err: RenderError = DeviceError::PipelineCreation {
            label: "basic".into(),
            message: "bad wgsl".into(),
        }
        .into();
        assert!(err.is_configuration());
    }
}
