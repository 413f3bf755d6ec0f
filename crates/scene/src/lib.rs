//! Scene collaborator for the lumen renderer.
//!
//! The renderer only needs a narrow view of a scene: world transforms kept up
//! to date, a single depth-first traversal, a material arena and an optional
//! environment material. This crate provides exactly that and nothing more.
//!
//! # Invariants
//! - Node and material ids are never reused within one scene.
//! - Traversal order is depth-first in child insertion order and is stable
//!   across frames as long as the tree is not edited.
//! - Replacing a mesh's geometry marks it content-dirty; only the consumer
//!   that uploaded the geometry clears the flag.

mod camera;
mod geometry;
mod light;
mod scene;

pub use camera::{Camera, Projection};
pub use geometry::{Geometry, GeometryError};
pub use light::{Light, WorldLight};
pub use scene::{Mesh, Node, NodeKind, Scene, SceneError};
