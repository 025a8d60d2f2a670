//! Coordinate and color types shared by the camera, the device owner and callers.
//!
//! World space:
//! - +X right, +Y up
//! - the camera looks down +Z at the `z = 0` plane
//!
//! Screen space (mouse, window events):
//! - physical pixels, origin top-left, +Y down
//!
//! Vector and matrix math comes from `glam`; the re-exports keep callers off a direct
//! dependency.

mod color;
mod viewport;

pub use color::ColorRgba;
pub use glam::{Mat4, Vec2, Vec3, Vec4};
pub use viewport::Viewport;
