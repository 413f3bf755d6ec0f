//! Final color destination of a frame: a window surface or an offscreen
//! texture.

use crate::convert;
use lumen_render::{DeviceError, TextureFormat};
use std::sync::mpsc;

/// Format of the offscreen target, and of the pixels `WgpuDevice::read_back` returns.
pub const OFFSCREEN_FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;

pub(crate) enum ColorTarget {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
        width: u32,
        height: u32,
    },
}

/// View to render into this frame, plus the surface texture to present.
pub(crate) struct Frame {
    pub view: wgpu::TextureView,
    surface_texture: Option<wgpu::SurfaceTexture>,
}

impl Frame {
    pub fn present(self) {
        if let Some(texture) = self.surface_texture {
            texture.present();
        }
    }
}

fn offscreen_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen_target"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: convert::texture_format(OFFSCREEN_FORMAT),
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

/// Rows of a texture-to-buffer copy must be 256-byte aligned.
fn padded_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

impl ColorTarget {
    pub fn offscreen(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        Self::Offscreen {
            texture: offscreen_texture(device, width, height),
            width,
            height,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        match self {
            Self::Surface { config, .. } => (config.width, config.height),
            Self::Offscreen { width, height, .. } => (*width, *height),
        }
    }

    pub fn format(&self) -> TextureFormat {
        match self {
            Self::Surface { config, .. } => {
                convert::from_wgpu_format(config.format).unwrap_or(TextureFormat::Bgra8UnormSrgb)
            }
            Self::Offscreen { .. } => OFFSCREEN_FORMAT,
        }
    }

    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        match self {
            Self::Surface { surface, config } => {
                config.width = width;
                config.height = height;
                surface.configure(device, config);
            }
            Self::Offscreen {
                texture,
                width: w,
                height: h,
            } => {
                texture.destroy();
                *texture = offscreen_texture(device, width, height);
                *w = width;
                *h = height;
            }
        }
        tracing::debug!(width, height, "color target resized");
    }

    pub fn acquire(&self, device: &wgpu::Device) -> Result<Frame, DeviceError> {
        match self {
            Self::Surface { surface, config } => {
                let texture = match surface.get_current_texture() {
                    Ok(texture) => texture,
                    Err(err @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                        surface.configure(device, config);
                        return Err(DeviceError::Surface(format!("{err}; surface reconfigured")));
                    }
                    Err(err) => return Err(DeviceError::Surface(err.to_string())),
                };
                let view = texture.texture.create_view(&wgpu::TextureViewDescriptor::default());
                Ok(Frame {
                    view,
                    surface_texture: Some(texture),
                })
            }
            Self::Offscreen { texture, .. } => Ok(Frame {
                view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
                surface_texture: None,
            }),
        }
    }

    pub fn read_back(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<u8>, DeviceError> {
        let Self::Offscreen { texture, width, height } = self else {
            return Err(DeviceError::Unsupported("read back needs an offscreen target".into()));
        };
        let (width, height) = (*width, *height);
        let row = padded_row(width);
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("read_back"),
            size: u64::from(row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("read_back"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| DeviceError::Surface("read back was never mapped".into()))?
            .map_err(|e| DeviceError::Surface(format!("read back failed: {e}")))?;

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for chunk in mapped.chunks(row as usize) {
            pixels.extend_from_slice(&chunk[..(width * 4) as usize]);
        }
        drop(mapped);
        staging.unmap();
        Ok(pixels)
    }
}
