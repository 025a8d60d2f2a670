//! GPU device + surface management.
//!
//! This module is responsible for:
//! - the [`GpuBackend`] seam and its two implementations (wgpu and headless)
//! - owning the device, swap chain and fixed state objects ([`Gpu`])
//! - the per-frame draw-session bracket and per-object constants
//! - the draw-state modes and the GPU data layouts shared with shaders

mod backend;
mod constants;
mod gpu;
mod headless;
pub mod shaders;
mod state;
mod wgpu_backend;
pub mod wgsl;

pub use backend::{Capabilities, GpuBackend, ShaderModel, ShaderStage};
pub use constants::{PerObjectConstants, Vertex};
pub use gpu::Gpu;
pub use headless::{DrawRecord, FailStep, HeadlessBackend, HeadlessObject, HeadlessProbe};
pub use state::{AddressMode, BlendMode, PixelShaderMode, SampleMode, Topology, VertexShaderMode};
pub use wgpu_backend::{
    SurfaceErrorAction, WgpuBackend, WgpuBlendState, WgpuConstantBuffer, WgpuInit, WgpuProgram,
    WgpuRenderTarget,
};

pub(crate) use state::resolve;
