use anyhow::Context;
use glam::Mat4;

use crate::coords::{ColorRgba, Viewport};
use crate::error::{GraphicsError, Result};

use super::backend::GpuBackend;
use super::constants::PerObjectConstants;
use super::state::{AddressMode, BlendMode, PixelShaderMode, SampleMode, VertexShaderMode};

/// State objects created once per device.
///
/// Either all of them exist or none do. `render_target` alone can be missing, after a
/// resize step failed.
struct GpuObjects<B: GpuBackend> {
    render_target: Option<B::RenderTarget>,
    rasterizer: B::RasterizerState,
    blend_states: [B::BlendState; BlendMode::COUNT],
    samplers: [[B::SamplerState; AddressMode::COUNT]; SampleMode::COUNT],
    constant_buffer: B::ConstantBuffer,
}

/// Owns the device, swap chain and fixed state objects, plus the draw-session bracket.
///
/// This type is the low-level rendering context:
/// - creates and releases the device and every state object with it
/// - brackets one draw session per frame (`start_frame` / `end_frame`)
/// - keeps the per-object constants and pushes them before each draw
/// - rebuilds the render target when the window size changes
pub struct Gpu<B: GpuBackend> {
    backend: B,
    objects: Option<GpuObjects<B>>,

    constants: PerObjectConstants,
    viewport: Viewport,
    background: ColorRgba,

    blend_mode: BlendMode,
    sampler: (SampleMode, AddressMode),
    pixel_mode: PixelShaderMode,
    vertex_mode: VertexShaderMode,

    in_frame: bool,
    frames_presented: u64,
}

impl<B: GpuBackend> Gpu<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            objects: None,
            constants: PerObjectConstants::default(),
            viewport: Viewport::default(),
            background: ColorRgba::black(),
            blend_mode: BlendMode::default(),
            sampler: (SampleMode::default(), AddressMode::default()),
            pixel_mode: PixelShaderMode::default(),
            vertex_mode: VertexShaderMode::default(),
            in_frame: false,
            frames_presented: 0,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.objects.is_some()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Backend for context calls. Fails when no device exists.
    pub fn context(&mut self) -> Result<&mut B> {
        if self.objects.is_none() {
            return Err(GraphicsError::init("graphics device is not initialized"));
        }
        Ok(&mut self.backend)
    }

    // ── lifetime ──────────────────────────────────────────────────────────

    /// Creates the device and every owned state object, then binds the defaults.
    ///
    /// Atomic: on failure nothing created here survives.
    pub fn initialize(&mut self, world: Mat4) -> Result<()> {
        if self.objects.is_some() {
            return Err(GraphicsError::misuse("graphics device is already initialized"));
        }

        self.backend
            .create_device()
            .map_err(|e| GraphicsError::backend("failed to create device", e))?;

        let objects = match Self::create_objects(&mut self.backend) {
            Ok(objects) => objects,
            Err(e) => {
                self.backend.release_device();
                return Err(GraphicsError::backend("failed to create device objects", e));
            }
        };

        let (width, height) = self.backend.client_size();
        self.viewport = Viewport::from_size(width, height);
        self.constants = PerObjectConstants::default();
        self.constants.set_world(world);
        self.in_frame = false;

        self.backend.set_rasterizer_state(&objects.rasterizer);
        self.backend.set_viewport(self.viewport);
        self.backend
            .set_blend_state(&objects.blend_states[self.blend_mode.index()]);
        self.backend
            .set_sampler(&objects.samplers[self.sampler.0.index()][self.sampler.1.index()]);
        self.objects = Some(objects);

        log::info!("graphics device initialized ({width}x{height})");
        Ok(())
    }

    fn create_objects(backend: &mut B) -> anyhow::Result<GpuObjects<B>> {
        let render_target = backend
            .create_render_target()
            .context("failed to create render target view")?;
        let rasterizer = backend
            .create_rasterizer_state()
            .context("failed to create rasterizer state")?;

        let blend_states = BlendMode::ALL
            .iter()
            .map(|&mode| {
                backend
                    .create_blend_state(mode)
                    .with_context(|| format!("failed to create {mode:?} blend state"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let blend_states: [B::BlendState; BlendMode::COUNT] = blend_states
            .try_into()
            .ok()
            .context("blend state table has the wrong size")?;

        let mut samplers = Vec::with_capacity(SampleMode::COUNT);
        for &sample in SampleMode::ALL {
            let row = AddressMode::ALL
                .iter()
                .map(|&address| {
                    backend
                        .create_sampler_state(sample, address)
                        .with_context(|| format!("failed to create {sample:?}/{address:?} sampler"))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            let row: [B::SamplerState; AddressMode::COUNT] = row
                .try_into()
                .ok()
                .context("sampler row has the wrong size")?;
            samplers.push(row);
        }
        let samplers: [[B::SamplerState; AddressMode::COUNT]; SampleMode::COUNT] = samplers
            .try_into()
            .ok()
            .context("sampler table has the wrong size")?;

        let constant_buffer = backend
            .create_constant_buffer(PerObjectConstants::SIZE)
            .context("failed to create constant buffer")?;

        Ok(GpuObjects {
            render_target: Some(render_target),
            rasterizer,
            blend_states,
            samplers,
            constant_buffer,
        })
    }

    /// Releases every owned object, views first, then the device. No-op when already
    /// released.
    pub fn release(&mut self) {
        let Some(mut objects) = self.objects.take() else {
            return;
        };

        self.backend.unbind_render_target();
        drop(objects.render_target.take());
        drop(objects);
        self.backend.release_device();

        self.in_frame = false;
        log::info!("graphics device released");
    }

    // ── frame bracket ─────────────────────────────────────────────────────

    /// Clears and binds the render target for a new draw session.
    pub fn start_frame(&mut self) -> Result<()> {
        let Some(objects) = self.objects.as_ref() else {
            return Err(GraphicsError::misuse("started drawing when graphics is not initialized"));
        };
        if self.in_frame {
            return Err(GraphicsError::misuse(
                "start_drawing called twice without finish_drawing",
            ));
        }
        let Some(target) = objects.render_target.as_ref() else {
            return Err(GraphicsError::misuse(
                "render target is missing after a failed resize",
            ));
        };

        self.backend
            .begin_frame(target, self.background)
            .map_err(|e| GraphicsError::backend("failed to begin frame", e))?;
        self.backend.set_viewport(self.viewport);
        self.in_frame = true;

        log::trace!("frame {} started", self.frames_presented);
        Ok(())
    }

    /// Presents the frame started by [`start_frame`](Self::start_frame).
    pub fn end_frame(&mut self) -> Result<()> {
        if self.objects.is_none() {
            return Err(GraphicsError::misuse("ended drawing when graphics is not initialized"));
        }
        if !self.in_frame {
            return Err(GraphicsError::misuse(
                "finish_drawing called without calling start_drawing",
            ));
        }
        self.in_frame = false;

        let presented = self
            .backend
            .present()
            .map_err(|e| GraphicsError::backend("failed to present", e))?;
        if presented {
            self.frames_presented += 1;
        } else {
            log::trace!("frame {} skipped, nothing to present", self.frames_presented);
        }
        Ok(())
    }

    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    // ── state ─────────────────────────────────────────────────────────────

    pub fn background(&self) -> ColorRgba {
        self.background
    }

    pub fn set_background(&mut self, color: ColorRgba) {
        self.background = color;
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) -> Result<()> {
        let objects = Self::require(&self.objects)?;
        self.backend.set_blend_state(&objects.blend_states[mode.index()]);
        self.blend_mode = mode;
        Ok(())
    }

    pub fn sampler_state(&self) -> (SampleMode, AddressMode) {
        self.sampler
    }

    pub fn set_sampler_state(&mut self, sample: SampleMode, address: AddressMode) -> Result<()> {
        let objects = Self::require(&self.objects)?;
        self.backend
            .set_sampler(&objects.samplers[sample.index()][address.index()]);
        self.sampler = (sample, address);
        Ok(())
    }

    pub fn pixel_shader_mode(&self) -> PixelShaderMode {
        self.pixel_mode
    }

    pub fn set_pixel_shader_mode(&mut self, mode: PixelShaderMode) {
        self.pixel_mode = mode;
    }

    pub fn vertex_shader_mode(&self) -> VertexShaderMode {
        self.vertex_mode
    }

    pub fn set_vertex_shader_mode(&mut self, mode: VertexShaderMode) {
        self.vertex_mode = mode;
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn constants(&self) -> &PerObjectConstants {
        &self.constants
    }

    pub fn constants_mut(&mut self) -> &mut PerObjectConstants {
        &mut self.constants
    }

    pub fn set_world_matrix(&mut self, world: Mat4) {
        self.constants.set_world(world);
    }

    /// Pushes the per-object constants to the GPU and binds them.
    pub fn update_constant_buffer(&mut self) -> Result<()> {
        let Some(objects) = self.objects.as_ref() else {
            return Err(GraphicsError::init("graphics device is not initialized"));
        };
        self.backend
            .update_constants(&objects.constant_buffer, self.constants.as_bytes());
        Ok(())
    }

    fn require(objects: &Option<GpuObjects<B>>) -> Result<&GpuObjects<B>> {
        objects
            .as_ref()
            .ok_or_else(|| GraphicsError::misuse("graphics is not initialized"))
    }

    // ── resize ────────────────────────────────────────────────────────────

    /// Rebuilds the render target for the current client size.
    ///
    /// Steps run in order and the first failure aborts the rest, leaving the viewport
    /// and world matrix as they were.
    pub fn reset_on_size_change(&mut self, world: Mat4) -> Result<()> {
        let Some(objects) = self.objects.as_mut() else {
            return Err(GraphicsError::misuse("resize when graphics is not initialized"));
        };

        self.backend.unbind_render_target();
        drop(objects.render_target.take());

        let (width, height) = self.backend.client_size();
        self.backend
            .resize_swap_chain(width, height)
            .map_err(|e| GraphicsError::backend("failed to resize swap chain", e))?;

        let target = self
            .backend
            .create_render_target()
            .map_err(|e| GraphicsError::backend("failed to recreate render target view", e))?;
        objects.render_target = Some(target);

        self.viewport = Viewport::from_size(width, height);
        self.backend.set_viewport(self.viewport);
        self.constants.set_world(world);

        log::info!("surface resized to {width}x{height}");
        Ok(())
    }
}

impl<B: GpuBackend> Drop for Gpu<B> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{FailStep, HeadlessBackend};

    fn gpu() -> (Gpu<HeadlessBackend>, crate::device::HeadlessProbe) {
        let backend = HeadlessBackend::new(800, 600);
        let probe = backend.probe();
        (Gpu::new(backend), probe)
    }

    // ── initialize / release ──────────────────────────────────────────────

    #[test]
    fn initialize_creates_full_state_table() {
        let (mut gpu, probe) = gpu();
        gpu.initialize(Mat4::IDENTITY).unwrap();

        // target + rasterizer + 4 blend + 8 samplers + constant buffer
        assert_eq!(probe.live_objects(), 15);
        assert_eq!(gpu.viewport(), Viewport::from_size(800, 600));
        assert_eq!(probe.blend(), Some(BlendMode::None));
        assert_eq!(probe.sampler(), Some((SampleMode::Linear, AddressMode::Wrap)));
    }

    #[test]
    fn failed_step_leaves_nothing_behind() {
        for step in [
            FailStep::Device,
            FailStep::RenderTarget,
            FailStep::BlendState,
            FailStep::SamplerState,
            FailStep::ConstantBuffer,
        ] {
            let (mut gpu, probe) = gpu();
            probe.fail_on(step);
            let err = gpu.initialize(Mat4::IDENTITY).unwrap_err();
            assert!(matches!(err, GraphicsError::Initialization(_)), "{step:?}");
            assert_eq!(probe.live_objects(), 0, "{step:?}");
            assert!(!probe.device_created(), "{step:?}");
            assert!(!gpu.is_initialized());

            probe.clear_failures();
            assert!(gpu.initialize(Mat4::IDENTITY).is_ok(), "{step:?}");
        }
    }

    #[test]
    fn release_is_idempotent() {
        let (mut gpu, probe) = gpu();
        gpu.initialize(Mat4::IDENTITY).unwrap();
        gpu.release();
        assert_eq!(probe.live_objects(), 0);
        assert!(!probe.device_created());
        gpu.release();
        assert!(!gpu.is_initialized());
    }

    // ── frame bracket ─────────────────────────────────────────────────────

    #[test]
    fn frame_bracket_presents_once() {
        let (mut gpu, probe) = gpu();
        gpu.initialize(Mat4::IDENTITY).unwrap();
        gpu.set_background(ColorRgba::rgb(0.1, 0.2, 0.3));

        gpu.start_frame().unwrap();
        gpu.end_frame().unwrap();

        assert_eq!(probe.presents(), 1);
        assert_eq!(gpu.frames_presented(), 1);
        assert_eq!(probe.last_clear(), Some(ColorRgba::rgb(0.1, 0.2, 0.3)));
    }

    #[test]
    fn end_without_start_is_misuse_and_does_not_present() {
        let (mut gpu, probe) = gpu();
        gpu.initialize(Mat4::IDENTITY).unwrap();

        assert!(matches!(gpu.end_frame(), Err(GraphicsError::StateMisuse(_))));
        gpu.start_frame().unwrap();
        gpu.end_frame().unwrap();
        assert!(matches!(gpu.end_frame(), Err(GraphicsError::StateMisuse(_))));

        assert_eq!(probe.presents(), 1);
        assert_eq!(gpu.frames_presented(), 1);
    }

    #[test]
    fn skipped_present_is_not_counted() {
        let (mut gpu, watch) = gpu();
        gpu.initialize(Mat4::IDENTITY).unwrap();

        watch.set_skip_presents(true);
        gpu.start_frame().unwrap();
        gpu.end_frame().unwrap();
        assert_eq!(gpu.frames_presented(), 0);
        assert!(!gpu.in_frame());

        watch.set_skip_presents(false);
        gpu.start_frame().unwrap();
        gpu.end_frame().unwrap();
        assert_eq!(gpu.frames_presented(), 1);
        assert_eq!(watch.presents(), 1);
    }

    #[test]
    fn each_frame_clears_depth() {
        let (mut gpu, watch) = gpu();
        gpu.initialize(Mat4::IDENTITY).unwrap();
        for _ in 0..3 {
            gpu.start_frame().unwrap();
            gpu.end_frame().unwrap();
        }
        assert_eq!(watch.depth_clears(), 3);
    }

    #[test]
    fn frame_before_initialize_is_misuse() {
        let (mut gpu, probe) = gpu();
        assert!(matches!(gpu.start_frame(), Err(GraphicsError::StateMisuse(_))));
        assert!(matches!(gpu.end_frame(), Err(GraphicsError::StateMisuse(_))));
        assert_eq!(probe.frames_begun(), 0);
    }

    // ── state ─────────────────────────────────────────────────────────────

    #[test]
    fn state_setters_bind_table_entries() {
        let (mut gpu, probe) = gpu();
        gpu.initialize(Mat4::IDENTITY).unwrap();

        gpu.set_blend_mode(BlendMode::Add).unwrap();
        gpu.set_sampler_state(SampleMode::Point, AddressMode::MirrorOnce).unwrap();

        assert_eq!(probe.blend(), Some(BlendMode::Add));
        assert_eq!(probe.sampler(), Some((SampleMode::Point, AddressMode::MirrorOnce)));
        assert_eq!(gpu.blend_mode(), BlendMode::Add);
    }

    #[test]
    fn constants_reach_backend() {
        let (mut gpu, probe) = gpu();
        gpu.initialize(Mat4::IDENTITY).unwrap();
        gpu.constants_mut().alpha = 0.25;
        gpu.update_constant_buffer().unwrap();
        gpu.backend_mut().draw(3);
        assert_eq!(probe.draws()[0].constants.map(|c| c.alpha), Some(0.25));
    }

    // ── resize ────────────────────────────────────────────────────────────

    #[test]
    fn resize_rebuilds_target_and_viewport() {
        let (mut gpu, probe) = gpu();
        gpu.initialize(Mat4::IDENTITY).unwrap();
        let world = Mat4::from_scale(glam::Vec3::splat(2.0));

        probe.set_client_size(1024, 768);
        gpu.reset_on_size_change(world).unwrap();

        assert_eq!(probe.swap_chain_size(), (1024, 768));
        assert_eq!(gpu.viewport(), Viewport::from_size(1024, 768));
        assert_eq!(probe.viewport(), Some(Viewport::from_size(1024, 768)));
        assert_eq!(gpu.constants().world(), world);
        assert_eq!(probe.live_objects(), 15);
    }

    #[test]
    fn failed_resize_leaves_viewport_stale() {
        let (mut gpu, probe) = gpu();
        gpu.initialize(Mat4::IDENTITY).unwrap();

        probe.set_client_size(1024, 768);
        probe.fail_on(FailStep::Resize);
        assert!(gpu.reset_on_size_change(Mat4::ZERO).is_err());
        assert_eq!(gpu.viewport(), Viewport::from_size(800, 600));
        assert_eq!(gpu.constants().world(), Mat4::IDENTITY);
        let err = gpu.start_frame().unwrap_err();
        assert!(matches!(err, GraphicsError::StateMisuse(_)));
        assert!(!err.is_fatal());
        assert!(!gpu.in_frame());

        probe.clear_failures();
        gpu.reset_on_size_change(Mat4::IDENTITY).unwrap();
        assert!(gpu.start_frame().is_ok());
    }
}
