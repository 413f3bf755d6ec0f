use crate::device::{ColorAttachment, RenderDevice, TextureDesc, TextureDimension, TextureFormat, TextureId, TextureUsage};
use crate::error::DeviceError;

/// Formats and sample count every pipeline is compiled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetFormats {
    pub color_format: TextureFormat,
    pub depth_format: TextureFormat,
    pub sample_count: u32,
}

/// Depth buffer plus the multisampled color target resolved into the
/// surface. Without MSAA the pass renders straight into the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTargets {
    pub width: u32,
    pub height: u32,
    pub depth: TextureId,
    pub msaa_color: Option<TextureId>,
}

impl RenderTargets {
    pub fn create<D: RenderDevice + ?Sized>(
        device: &mut D,
        formats: &TargetFormats,
        width: u32,
        height: u32,
    ) -> Result<Self, DeviceError> {
        let width = width.max(1);
        let height = height.max(1);
        let attachment = |label: &str, format: TextureFormat| TextureDesc {
            label: label.to_string(),
            width,
            height,
            dimension: TextureDimension::D2,
            format,
            sample_count: formats.sample_count,
            usage: TextureUsage::Attachment,
        };

        let depth = device.create_texture(&attachment("target.depth", formats.depth_format), None)?;
        let msaa_color = if formats.sample_count > 1 {
            match device.create_texture(&attachment("target.msaa_color", formats.color_format), None) {
                Ok(id) => Some(id),
                Err(err) => {
                    device.destroy_texture(depth);
                    return Err(err);
                }
            }
        } else {
            None
        };
        tracing::debug!(width, height, samples = formats.sample_count, "created render targets");
        Ok(Self {
            width,
            height,
            depth,
            msaa_color,
        })
    }

    pub fn color_attachment(&self) -> ColorAttachment {
        match self.msaa_color {
            Some(texture) => ColorAttachment::MultisampledResolve(texture),
            None => ColorAttachment::Surface,
        }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn destroy<D: RenderDevice + ?Sized>(self, device: &mut D) {
        device.destroy_texture(self.depth);
        if let Some(color) = self.msaa_color {
            device.destroy_texture(color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;

    fn formats(sample_count: u32) -> TargetFormats {
        TargetFormats {
            color_format: TextureFormat::Bgra8UnormSrgb,
            depth_format: TextureFormat::Depth32Float,
            sample_count,
        }
    }

    #[test]
    fn zero_size_is_clamped() {
        let mut device = HeadlessDevice::new(0, 0);
        let targets = RenderTargets::create(&mut device, &formats(4), 0, 0).unwrap();
        assert_eq!((targets.width, targets.height), (1, 1));
        assert!(targets.aspect().is_finite());
    }

    #[test]
    fn single_sample_renders_to_surface() {
        let mut device = HeadlessDevice::new(32, 32);
        let targets = RenderTargets::create(&mut device, &formats(1), 32, 32).unwrap();
        assert_eq!(targets.color_attachment(), ColorAttachment::Surface);
        assert_eq!(device.live_textures(), 1);
        targets.destroy(&mut device);
        assert_eq!(device.live_textures(), 0);
    }
}
