//! Built-in programs compiled at initialization.
//!
//! All three share the `PerObject` uniform block at `@group(0) @binding(0)`. The texture
//! program also reads `@group(1)`: texture at binding 0, sampler at binding 1.

pub const DEFAULT_VERTEX: &str = include_str!("default_vertex.wgsl");
pub const COLOR_PIXEL: &str = include_str!("color_pixel.wgsl");
pub const TEXTURE_PIXEL: &str = include_str!("texture_pixel.wgsl");
