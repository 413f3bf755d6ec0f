use crate::device::TextureFormat;
use crate::error::RenderError;
use lumen_common::Color;
use serde::{Deserialize, Serialize};

/// Renderer settings. Every field has a default, so partial JSON files are
/// accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// MSAA sample count of the color and depth targets: 1 or 4.
    pub sample_count: u32,
    pub clear_color: Color,
    pub depth_format: TextureFormat,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            sample_count: 4,
            clear_color: Color::BLACK,
            depth_format: TextureFormat::Depth32Float,
        }
    }
}

impl RendererConfig {
    pub fn validate(&self) -> Result<(), RenderError> {
        if !matches!(self.sample_count, 1 | 4) {
            return Err(RenderError::configuration(
                "renderer",
                format!("sample count {} is not supported (use 1 or 4)", self.sample_count),
            ));
        }
        if !self.depth_format.is_depth() {
            return Err(RenderError::configuration(
                "renderer",
                format!("{:?} is not a depth format", self.depth_format),
            ));
        }
        Ok(())
    }
}
