//! Rendering orchestrator.
//!
//! [`Graphics`] is the public draw/resource API. It composes the device owner, the camera
//! and the resource managers, and routes every error through the last-error slot.
//!
//! Convention:
//! - world space is +Y up, centered on the camera
//! - meshes are built once and drawn many times with per-draw constants

mod config;
mod graphics;

pub use config::{GraphicsConfig, ResourceCounts};
pub use graphics::Graphics;
