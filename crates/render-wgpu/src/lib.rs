//! wgpu backend for the lumen renderer.
//!
//! [`WgpuDevice`] implements [`lumen_render::RenderDevice`] on top of a real
//! GPU. It renders either into a window surface or into an offscreen texture
//! that can be read back, which is what the CLI uses.
//!
//! # Invariants
//! - Handles are never reused; a destroyed handle stays unknown forever.
//! - Shader and layout validation failures are reported as errors, never as
//!   panics from wgpu's uncaptured-error handler.

mod convert;
mod device;
mod target;

pub use device::WgpuDevice;
pub use target::OFFSCREEN_FORMAT;
