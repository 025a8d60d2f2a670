//! Stipple engine crate.
//!
//! A small immediate-mode 2D rendering layer: a device owner with a per-frame draw
//! session, mesh/texture/shader managers with leak accounting, an orthographic camera,
//! and the [`Graphics`] orchestrator that ties them together. [`window::Runtime`] runs
//! it on a winit window through wgpu; [`device::HeadlessBackend`] runs it without a GPU.

pub mod camera;
pub mod coords;
pub mod core;
pub mod device;
pub mod error;
pub mod logging;
pub mod render;
pub mod resources;
pub mod time;
pub mod window;

pub use crate::core::{App, AppControl, FrameCtx};
pub use coords::{ColorRgba, Mat4, Vec2, Viewport};
pub use device::{
    AddressMode, BlendMode, GpuBackend, PixelShaderMode, SampleMode, Topology, Vertex,
    VertexShaderMode, WgpuInit,
};
pub use error::{GraphicsError, Result};
pub use render::{Graphics, GraphicsConfig, ResourceCounts};
pub use resources::{MeshId, PixelShaderId, TextureId, VertexShaderId};
