//! Shared value types used across the lumen crates.

mod types;

pub use types::{Color, MaterialId, NodeId, Transform};
