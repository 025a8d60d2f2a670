//! The seam between the draw-state core and a concrete GPU API.
//!
//! Every GPU object the core owns is an associated type of [`GpuBackend`]. Releasing an
//! object means dropping it, so ownership gives exactly-once release for free. Backends
//! report failures as `anyhow::Result`; the core wraps them into `GraphicsError`.

use anyhow::Result;

use crate::coords::{ColorRgba, Viewport};

use super::constants::Vertex;
use super::state::{AddressMode, BlendMode, SampleMode, Topology};

/// Program stage.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

/// Shader profile a program is compiled against.
///
/// Ordered: a device that supports `Sm5` also supports `Sm4`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShaderModel {
    Sm4,
    Sm5,
}

impl ShaderModel {
    pub fn profile(self, stage: ShaderStage) -> &'static str {
        match (self, stage) {
            (ShaderModel::Sm5, ShaderStage::Vertex) => "vs_5_0",
            (ShaderModel::Sm5, ShaderStage::Pixel) => "ps_5_0",
            (ShaderModel::Sm4, ShaderStage::Vertex) => "vs_4_0",
            (ShaderModel::Sm4, ShaderStage::Pixel) => "ps_4_0",
        }
    }
}

/// What the created device can do.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Highest supported shader model.
    pub shader_model: ShaderModel,
}

/// Immediate-mode GPU driver.
///
/// The call order mirrors a classic device/context API:
/// `create_device`, object creation, then per frame `begin_frame`, state binds and draws,
/// and finally `present`. Binding calls are infallible and take effect for the next draw.
pub trait GpuBackend {
    type Buffer;
    type ConstantBuffer;
    type Texture;
    type TextureView;
    type Program;
    type BlendState;
    type SamplerState;
    type RasterizerState;
    type RenderTarget;

    // ── device / surface ──────────────────────────────────────────────────

    /// Creates the device, context and swap chain.
    fn create_device(&mut self) -> Result<()>;

    /// Releases the device. Every object created from it must already be dropped.
    fn release_device(&mut self);

    /// Current client-area size in physical pixels.
    fn client_size(&self) -> (u32, u32);

    fn capabilities(&self) -> Capabilities;

    /// Creates a render-target view over the current back buffer.
    fn create_render_target(&mut self) -> Result<Self::RenderTarget>;

    /// Resizes the swap-chain buffers, keeping buffer count and format.
    fn resize_swap_chain(&mut self, width: u32, height: u32) -> Result<()>;

    // ── objects ───────────────────────────────────────────────────────────

    fn create_rasterizer_state(&mut self) -> Result<Self::RasterizerState>;

    fn create_blend_state(&mut self, mode: BlendMode) -> Result<Self::BlendState>;

    fn create_sampler_state(
        &mut self,
        sample: SampleMode,
        address: AddressMode,
    ) -> Result<Self::SamplerState>;

    fn create_constant_buffer(&mut self, size: usize) -> Result<Self::ConstantBuffer>;

    fn create_vertex_buffer(&mut self, vertices: &[Vertex]) -> Result<Self::Buffer>;

    fn create_index_buffer(&mut self, indices: &[u32]) -> Result<Self::Buffer>;

    /// Creates a 2D RGBA8 texture from tightly packed pixels (`width * 4` bytes per row).
    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<Self::Texture>;

    fn create_texture_view(&mut self, texture: &Self::Texture) -> Result<Self::TextureView>;

    /// Compiles WGSL `source` for `stage`. `label` names the program in diagnostics.
    fn compile_program(
        &mut self,
        stage: ShaderStage,
        label: &str,
        source: &str,
        model: ShaderModel,
    ) -> Result<Self::Program>;

    /// Called before `program` is dropped so cached state built from it can go too.
    fn release_program(&mut self, program: &Self::Program);

    // ── immediate context ─────────────────────────────────────────────────

    /// Binds `target`, clears it to `clear` and clears the depth buffer to the far plane.
    fn begin_frame(&mut self, target: &Self::RenderTarget, clear: ColorRgba) -> Result<()>;

    fn unbind_render_target(&mut self);

    fn set_viewport(&mut self, viewport: Viewport);

    fn set_rasterizer_state(&mut self, state: &Self::RasterizerState);

    fn set_blend_state(&mut self, state: &Self::BlendState);

    fn set_sampler(&mut self, state: &Self::SamplerState);

    fn set_topology(&mut self, topology: Topology);

    fn set_vertex_program(&mut self, program: &Self::Program);

    fn set_pixel_program(&mut self, program: &Self::Program);

    /// Binds a texture view to the pixel stage, or unbinds with `None`.
    fn set_shader_resource(&mut self, view: Option<&Self::TextureView>);

    fn set_vertex_buffer(&mut self, buffer: &Self::Buffer);

    fn set_index_buffer(&mut self, buffer: Option<&Self::Buffer>);

    /// Uploads `data` into `buffer` and binds it to both stages.
    fn update_constants(&mut self, buffer: &Self::ConstantBuffer, data: &[u8]);

    fn draw(&mut self, vertex_count: u32);

    fn draw_indexed(&mut self, index_count: u32);

    /// Presents the back buffer. Returns `false` when there was no frame to present.
    fn present(&mut self) -> Result<bool>;
}
