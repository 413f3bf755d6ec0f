//! Materials shipped with the renderer.

mod basic;
mod normal;
pub mod shaders;
mod skybox;
mod standard;

pub use basic::BasicMaterial;
pub use normal::NormalMaterial;
pub use skybox::SkyboxMaterial;
pub use standard::StandardMaterial;
