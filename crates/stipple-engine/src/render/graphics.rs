use std::path::Path;

use glam::{Mat4, Quat, Vec2};

use crate::camera::Camera;
use crate::coords::{ColorRgba, Viewport};
use crate::device::{
    resolve, AddressMode, BlendMode, Gpu, GpuBackend, PerObjectConstants, PixelShaderMode,
    SampleMode, Topology, Vertex, VertexShaderMode,
};
use crate::error::{ErrorSlot, GraphicsError, Result};
use crate::render::{GraphicsConfig, ResourceCounts};
use crate::resources::{
    DrawBindings, MeshId, MeshManager, PixelShaderId, ShaderManager, TextureId, TextureManager,
    VertexShaderId,
};

/// The rendering orchestrator.
///
/// Owns the device, the camera and every application resource. Each fallible call
/// returns its error and also records it as the last error.
///
/// Field order is drop order: resources go before the device that created them.
pub struct Graphics<B: GpuBackend> {
    config: GraphicsConfig,
    camera: Camera,
    meshes: MeshManager<B>,
    textures: TextureManager<B>,
    shaders: ShaderManager<B>,
    gpu: Option<Gpu<B>>,

    texture: Option<TextureId>,
    custom_pixel: Option<PixelShaderId>,
    custom_vertex: Option<VertexShaderId>,
    errors: ErrorSlot,
}

impl<B: GpuBackend> Default for Graphics<B> {
    fn default() -> Self {
        Self::new(GraphicsConfig::default())
    }
}

impl<B: GpuBackend> Graphics<B> {
    pub fn new(config: GraphicsConfig) -> Self {
        Self {
            config,
            camera: Camera::default(),
            meshes: MeshManager::new(),
            textures: TextureManager::new(),
            shaders: ShaderManager::new(),
            gpu: None,
            texture: None,
            custom_pixel: None,
            custom_vertex: None,
            errors: ErrorSlot::default(),
        }
    }

    /// Runs `f` and records its error, if any, in the last-error slot.
    fn track<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = f(self);
        self.errors.record(result)
    }

    fn gpu_mut<'a>(gpu: &'a mut Option<Gpu<B>>, call: &str) -> Result<&'a mut Gpu<B>> {
        gpu.as_mut()
            .ok_or_else(|| GraphicsError::misuse(format!("{call} when graphics is not initialized")))
    }

    fn push_world(&mut self) {
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.set_world_matrix(self.camera.world_matrix());
        }
    }

    // ── lifecycle ─────────────────────────────────────────────────────────

    /// Creates the device objects on `backend`, compiles the built-in shaders and applies
    /// the configured draw state. On failure nothing stays alive and the call can be retried.
    pub fn initialize(&mut self, backend: B) -> Result<()> {
        self.track(move |g| {
            if g.gpu.is_some() {
                return Err(GraphicsError::misuse("graphics is already initialized"));
            }

            let mut gpu = Gpu::new(backend);
            let (width, height) = gpu.backend().client_size();
            g.camera.set_window_size(width, height);

            gpu.set_background(g.config.background);
            gpu.initialize(g.camera.world_matrix())?;
            gpu.set_blend_mode(g.config.blend_mode)?;
            gpu.set_sampler_state(g.config.sample_mode, g.config.address_mode)?;

            if let Err(err) = g.shaders.compile_defaults(gpu.backend_mut()) {
                g.shaders.release_defaults(gpu.backend_mut());
                gpu.release();
                return Err(err);
            }

            log::info!("graphics initialized ({width}x{height})");
            g.gpu = Some(gpu);
            Ok(())
        })
    }

    /// Frees every resource and the device. Fails with [`GraphicsError::ResourceLeak`]
    /// if the application had not freed everything it created; teardown completes anyway.
    pub fn shutdown(&mut self) -> Result<()> {
        self.track(|g| {
            let Some(mut gpu) = g.gpu.take() else {
                log::debug!("shutdown: graphics is not initialized");
                return Ok(());
            };

            let counts = g.resource_counts();
            g.meshes.clear();
            g.textures.clear();
            g.shaders.clear(gpu.backend_mut());
            g.shaders.release_defaults(gpu.backend_mut());
            g.texture = None;
            g.custom_pixel = None;
            g.custom_vertex = None;

            let frames = gpu.frames_presented();
            gpu.release();
            log::info!("graphics shut down after {frames} frames");

            match counts.leak_message() {
                Some(message) => Err(GraphicsError::ResourceLeak(message)),
                None => Ok(()),
            }
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.gpu.is_some()
    }

    /// Rebuilds the swap chain at the current client size. A zero-sized client area
    /// (minimized window) is ignored.
    pub fn on_resize(&mut self) -> Result<()> {
        self.track(|g| {
            let gpu = Self::gpu_mut(&mut g.gpu, "resize")?;
            let (width, height) = gpu.backend().client_size();
            if width == 0 || height == 0 {
                log::debug!("resize to {width}x{height} ignored");
                return Ok(());
            }

            g.camera.set_window_size(width, height);
            gpu.reset_on_size_change(g.camera.world_matrix())
        })
    }

    // ── frame session ─────────────────────────────────────────────────────

    pub fn start_drawing(&mut self) -> Result<()> {
        self.track(|g| match g.gpu.as_mut() {
            Some(gpu) => gpu.start_frame(),
            None => Err(GraphicsError::misuse(
                "started drawing when graphics is not initialized",
            )),
        })
    }

    pub fn finish_drawing(&mut self) -> Result<()> {
        self.track(|g| match g.gpu.as_mut() {
            Some(gpu) => gpu.end_frame(),
            None => Err(GraphicsError::misuse(
                "ended drawing when graphics is not initialized",
            )),
        })
    }

    // ── modes ─────────────────────────────────────────────────────────────

    pub fn set_background_color(&mut self, color: ColorRgba) -> Result<()> {
        self.track(|g| {
            Self::gpu_mut(&mut g.gpu, "set background color")?.set_background(color);
            g.config.background = color;
            Ok(())
        })
    }

    /// Accepts a [`BlendMode`] or its raw ordinal.
    pub fn set_blend_mode<M>(&mut self, mode: M) -> Result<()>
    where
        M: TryInto<BlendMode>,
        M::Error: Into<GraphicsError>,
    {
        let mode: Result<BlendMode> = resolve(mode);
        self.track(|g| {
            let gpu = Self::gpu_mut(&mut g.gpu, "set blend mode")?;
            gpu.set_blend_mode(mode?)
        })
    }

    /// Selects one of the eight fixed samplers.
    pub fn set_sampler_state<S, A>(&mut self, sample: S, address: A) -> Result<()>
    where
        S: TryInto<SampleMode>,
        S::Error: Into<GraphicsError>,
        A: TryInto<AddressMode>,
        A::Error: Into<GraphicsError>,
    {
        let sample: Result<SampleMode> = resolve(sample);
        let address: Result<AddressMode> = resolve(address);
        self.track(|g| {
            let gpu = Self::gpu_mut(&mut g.gpu, "set sampler state")?;
            gpu.set_sampler_state(sample?, address?)
        })
    }

    pub fn set_pixel_shader_mode<M>(&mut self, mode: M) -> Result<()>
    where
        M: TryInto<PixelShaderMode>,
        M::Error: Into<GraphicsError>,
    {
        let mode: Result<PixelShaderMode> = resolve(mode);
        self.track(|g| {
            let gpu = Self::gpu_mut(&mut g.gpu, "set pixel shader mode")?;
            gpu.set_pixel_shader_mode(mode?);
            Ok(())
        })
    }

    pub fn set_vertex_shader_mode<M>(&mut self, mode: M) -> Result<()>
    where
        M: TryInto<VertexShaderMode>,
        M::Error: Into<GraphicsError>,
    {
        let mode: Result<VertexShaderMode> = resolve(mode);
        self.track(|g| {
            let gpu = Self::gpu_mut(&mut g.gpu, "set vertex shader mode")?;
            gpu.set_vertex_shader_mode(mode?);
            Ok(())
        })
    }

    /// Program used while the pixel shader mode is [`PixelShaderMode::Custom`].
    pub fn set_custom_pixel_shader(&mut self, shader: Option<PixelShaderId>) -> Result<()> {
        self.track(|g| {
            Self::gpu_mut(&mut g.gpu, "set custom pixel shader")?;
            if let Some(id) = shader {
                if g.shaders.pixel_shader(id).is_none() {
                    return Err(GraphicsError::invalid(format!("pixel shader {id:?} is released")));
                }
            }
            g.custom_pixel = shader;
            Ok(())
        })
    }

    pub fn set_custom_vertex_shader(&mut self, shader: Option<VertexShaderId>) -> Result<()> {
        self.track(|g| {
            Self::gpu_mut(&mut g.gpu, "set custom vertex shader")?;
            if let Some(id) = shader {
                if g.shaders.vertex_shader(id).is_none() {
                    return Err(GraphicsError::invalid(format!("vertex shader {id:?} is released")));
                }
            }
            g.custom_vertex = shader;
            Ok(())
        })
    }

    /// Texture sampled while the pixel shader mode is [`PixelShaderMode::Texture`].
    pub fn set_texture(&mut self, texture: Option<TextureId>) -> Result<()> {
        self.track(|g| {
            Self::gpu_mut(&mut g.gpu, "set texture")?;
            if let Some(id) = texture {
                if g.textures.get(id).is_none() {
                    return Err(GraphicsError::invalid(format!("texture {id:?} is released")));
                }
            }
            g.texture = texture;
            Ok(())
        })
    }

    pub fn background_color(&self) -> ColorRgba {
        self.config.background
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.gpu.as_ref().map_or(self.config.blend_mode, Gpu::blend_mode)
    }

    pub fn sampler_state(&self) -> (SampleMode, AddressMode) {
        self.gpu.as_ref().map_or(
            (self.config.sample_mode, self.config.address_mode),
            Gpu::sampler_state,
        )
    }

    pub fn pixel_shader_mode(&self) -> PixelShaderMode {
        self.gpu.as_ref().map_or_else(PixelShaderMode::default, Gpu::pixel_shader_mode)
    }

    pub fn vertex_shader_mode(&self) -> VertexShaderMode {
        self.gpu.as_ref().map_or_else(VertexShaderMode::default, Gpu::vertex_shader_mode)
    }

    // ── textures ──────────────────────────────────────────────────────────

    pub fn load_texture(&mut self, path: impl AsRef<Path>) -> Result<TextureId> {
        self.track(|g| {
            let gpu = Self::gpu_mut(&mut g.gpu, "load texture")?;
            g.textures.load_file(gpu.backend_mut(), path.as_ref())
        })
    }

    /// Creates a texture from tightly packed RGBA8 pixels.
    pub fn load_texture_from_memory(&mut self, rgba: &[u8], width: u32, height: u32) -> Result<TextureId> {
        self.track(|g| {
            let gpu = Self::gpu_mut(&mut g.gpu, "load texture")?;
            g.textures.load_memory(gpu.backend_mut(), rgba, width, height)
        })
    }

    /// Releases the texture and clears the handle. `None` and stale handles are no-ops.
    pub fn free_texture(&mut self, texture: &mut Option<TextureId>) {
        let Some(id) = texture.take() else { return };
        if self.textures.release(id) && self.texture == Some(id) {
            self.texture = None;
        }
    }

    // ── shaders ───────────────────────────────────────────────────────────

    /// Compiles a WGSL fragment program. Loading the same path again returns the live handle.
    pub fn load_pixel_shader(&mut self, path: impl AsRef<Path>) -> Result<PixelShaderId> {
        self.track(|g| {
            let gpu = Self::gpu_mut(&mut g.gpu, "load pixel shader")?;
            g.shaders.load_pixel_shader(gpu.backend_mut(), path.as_ref())
        })
    }

    pub fn load_vertex_shader(&mut self, path: impl AsRef<Path>) -> Result<VertexShaderId> {
        self.track(|g| {
            let gpu = Self::gpu_mut(&mut g.gpu, "load vertex shader")?;
            g.shaders.load_vertex_shader(gpu.backend_mut(), path.as_ref())
        })
    }

    pub fn free_pixel_shader(&mut self, shader: &mut Option<PixelShaderId>) {
        let Some(id) = shader.take() else { return };
        let Some(gpu) = self.gpu.as_mut() else { return };
        if self.shaders.release_pixel_shader(gpu.backend_mut(), id) && self.custom_pixel == Some(id) {
            self.custom_pixel = None;
        }
    }

    pub fn free_vertex_shader(&mut self, shader: &mut Option<VertexShaderId>) {
        let Some(id) = shader.take() else { return };
        let Some(gpu) = self.gpu.as_mut() else { return };
        if self.shaders.release_vertex_shader(gpu.backend_mut(), id) && self.custom_vertex == Some(id) {
            self.custom_vertex = None;
        }
    }

    // ── meshes ────────────────────────────────────────────────────────────

    pub fn start_mesh(&mut self) -> Result<()> {
        self.track(|g| {
            Self::gpu_mut(&mut g.gpu, "start mesh")?;
            g.meshes.start_mesh()
        })
    }

    pub fn add_vertex(&mut self, position: Vec2, color: ColorRgba, tex_coord: Vec2) -> Result<()> {
        self.track(|g| g.meshes.add_vertex(Vertex::new(position, color, tex_coord)))
    }

    pub fn add_triangle(&mut self, a: Vertex, b: Vertex, c: Vertex) -> Result<()> {
        self.track(|g| {
            g.meshes.add_vertex(a)?;
            g.meshes.add_vertex(b)?;
            g.meshes.add_vertex(c)
        })
    }

    pub fn end_mesh(&mut self) -> Result<MeshId> {
        self.track(|g| match g.gpu.as_mut() {
            Some(gpu) => g.meshes.end_mesh(gpu.backend_mut()),
            None => Err(GraphicsError::misuse("end mesh when graphics is not initialized")),
        })
    }

    /// Ends the build with an index list; every index must address a built vertex.
    pub fn end_mesh_indexed(&mut self, indices: &[u32]) -> Result<MeshId> {
        self.track(|g| match g.gpu.as_mut() {
            Some(gpu) => g.meshes.end_mesh_indexed(gpu.backend_mut(), indices),
            None => Err(GraphicsError::misuse("end mesh when graphics is not initialized")),
        })
    }

    pub fn free_mesh(&mut self, mesh: &mut Option<MeshId>) {
        if let Some(id) = mesh.take() {
            self.meshes.release(id);
        }
    }

    /// Draws `mesh` with the current modes and per-draw constants.
    ///
    /// An unknown topology is reported but the draw still happens with the last bound
    /// topology. A custom shader mode with no live custom shader skips the draw.
    pub fn draw_mesh<T>(&mut self, mesh: MeshId, topology: T) -> Result<()>
    where
        T: TryInto<Topology>,
        T::Error: Into<GraphicsError>,
    {
        let topology: Result<Topology> = resolve(topology);
        self.track(move |g| {
            let Self {
                gpu,
                meshes,
                textures,
                shaders,
                texture,
                custom_pixel,
                custom_vertex,
                ..
            } = g;
            let gpu = gpu
                .as_mut()
                .ok_or_else(|| GraphicsError::init("draw mesh when graphics is not initialized"))?;

            let pixel_mode = gpu.pixel_shader_mode();
            let vertex_program = shaders.current_vertex_program(gpu.vertex_shader_mode(), *custom_vertex)?;
            let pixel_program = shaders.current_pixel_program(pixel_mode, *custom_pixel)?;
            let texture = if pixel_mode.uses_texture() {
                (*texture).and_then(|id| textures.view(id))
            } else {
                None
            };

            let (topology, rejected) = match topology {
                Ok(topology) => (Some(topology), None),
                Err(err) => (None, Some(err)),
            };
            let bindings = DrawBindings {
                vertex_program,
                pixel_program,
                texture,
            };
            meshes.draw(mesh, topology, bindings, gpu)?;

            rejected.map_or(Ok(()), Err)
        })
    }

    // ── per-draw constants ────────────────────────────────────────────────

    fn with_constants(&mut self, call: &str, f: impl FnOnce(&mut PerObjectConstants)) -> Result<()> {
        self.track(|g| {
            f(Self::gpu_mut(&mut g.gpu, call)?.constants_mut());
            Ok(())
        })
    }

    /// Sets the object transform to translate · rotate(z) · scale.
    pub fn set_transform(&mut self, position: Vec2, scale: Vec2, rotation: f32) -> Result<()> {
        let transform = Mat4::from_scale_rotation_translation(
            scale.extend(1.0),
            Quat::from_rotation_z(rotation),
            position.extend(0.0),
        );
        self.set_transform_matrix(transform)
    }

    pub fn set_transform_matrix(&mut self, transform: Mat4) -> Result<()> {
        self.with_constants("set transform", |c| c.set_transform(transform))
    }

    pub fn set_texture_offset(&mut self, offset: Vec2) -> Result<()> {
        self.with_constants("set texture offset", |c| c.tex_offset = offset.to_array())
    }

    pub fn set_alpha(&mut self, alpha: f32) -> Result<()> {
        self.with_constants("set alpha", |c| c.alpha = alpha)
    }

    /// Added to the rgb of the sampled or vertex color.
    pub fn set_tint_color(&mut self, tint: ColorRgba) -> Result<()> {
        self.with_constants("set tint color", |c| c.tint = tint.to_array())
    }

    pub fn set_z_layer(&mut self, z: f32) -> Result<()> {
        self.with_constants("set z layer", |c| c.z_layer = z)
    }

    /// Free-form scalar for custom shaders.
    pub fn set_shader_data(&mut self, data: f32) -> Result<()> {
        self.with_constants("set shader data", |c| c.shader_data = data)
    }

    // ── camera ────────────────────────────────────────────────────────────

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_position(&self) -> Vec2 {
        self.camera.position()
    }

    pub fn set_camera_position(&mut self, position: Vec2) {
        self.camera.set_position(position);
        self.push_world();
    }

    pub fn camera_zoom(&self) -> f32 {
        self.camera.zoom()
    }

    pub fn set_camera_zoom(&mut self, zoom: f32) -> Result<()> {
        self.track(|g| g.camera.set_zoom(zoom))?;
        self.push_world();
        Ok(())
    }

    pub fn camera_rotation(&self) -> f32 {
        self.camera.rotation()
    }

    pub fn set_camera_rotation(&mut self, radians: f32) {
        self.camera.set_rotation(radians);
        self.push_world();
    }

    /// Maps a client-area pixel position to world space.
    pub fn screen_to_world(&self, screen: Vec2) -> Vec2 {
        self.camera.screen_to_world(screen)
    }

    // ── diagnostics ───────────────────────────────────────────────────────

    pub fn resource_counts(&self) -> ResourceCounts {
        ResourceCounts {
            meshes: self.meshes.len(),
            textures: self.textures.len(),
            pixel_shaders: self.shaders.pixel_shader_count(),
            vertex_shaders: self.shaders.vertex_shader_count(),
        }
    }

    /// Text of the most recent error, if any call has failed.
    pub fn last_error(&self) -> Option<&str> {
        self.errors.last()
    }

    pub fn clear_last_error(&mut self) {
        self.errors.clear();
    }

    pub fn frames_presented(&self) -> u64 {
        self.gpu.as_ref().map_or(0, Gpu::frames_presented)
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.gpu.as_ref().map(Gpu::viewport)
    }

    pub fn constants(&self) -> Option<&PerObjectConstants> {
        self.gpu.as_ref().map(Gpu::constants)
    }

    pub fn backend(&self) -> Option<&B> {
        self.gpu.as_ref().map(Gpu::backend)
    }

    pub fn is_drawing(&self) -> bool {
        self.gpu.as_ref().is_some_and(Gpu::in_frame)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::device::{FailStep, HeadlessBackend, HeadlessProbe};

    type TestGraphics = Graphics<HeadlessBackend>;

    fn init() -> (TestGraphics, HeadlessProbe) {
        let backend = HeadlessBackend::new(800, 600);
        let probe = backend.probe();
        let mut graphics = TestGraphics::default();
        graphics.initialize(backend).unwrap();
        (graphics, probe)
    }

    fn white() -> ColorRgba {
        ColorRgba::white()
    }

    fn build_triangle(g: &mut TestGraphics) -> MeshId {
        g.start_mesh().unwrap();
        g.add_vertex(Vec2::new(0.0, 1.0), white(), Vec2::ZERO).unwrap();
        g.add_vertex(Vec2::new(1.0, -1.0), white(), Vec2::X).unwrap();
        g.add_vertex(Vec2::new(-1.0, -1.0), white(), Vec2::Y).unwrap();
        g.end_mesh().unwrap()
    }

    fn write_shader(source: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".wgsl").tempfile().unwrap();
        file.write_all(source.as_bytes()).unwrap();
        file
    }

    const MAGENTA_PIXEL: &str = "@fragment\nfn main() -> @location(0) vec4<f32> {\n    return vec4<f32>(1.0, 0.0, 1.0, 1.0);\n}\n";

    const PASS_VERTEX: &str = "@vertex\nfn main(@location(0) position: vec2<f32>) -> @builtin(position) vec4<f32> {\n    return vec4<f32>(position, 0.0, 1.0);\n}\n";

    // ── lifecycle ─────────────────────────────────────────────────────────

    #[test]
    fn initialize_applies_config_and_compiles_defaults() {
        let (g, probe) = init();
        assert!(g.is_initialized());
        assert_eq!(probe.compiles().len(), 3);
        assert_eq!(probe.blend(), Some(BlendMode::None));
        assert_eq!(probe.sampler(), Some((SampleMode::Linear, AddressMode::Wrap)));
        assert_eq!(g.viewport().map(|v| (v.width, v.height)), Some((800.0, 600.0)));
        assert_eq!(g.camera().window_size(), Vec2::new(800.0, 600.0));
    }

    #[test]
    fn failed_initialize_leaves_nothing_alive_and_can_retry() {
        for step in [FailStep::Device, FailStep::RenderTarget, FailStep::Compile] {
            let backend = HeadlessBackend::new(800, 600);
            let probe = backend.probe();
            probe.fail_on(step);
            let mut g = TestGraphics::default();

            let err = g.initialize(backend).unwrap_err();
            assert!(matches!(err, GraphicsError::Initialization(_)), "{step:?}");
            assert!(!g.is_initialized());
            assert_eq!(probe.live_objects(), 0, "{step:?}");
            assert!(!probe.device_created(), "{step:?}");
            assert!(g.last_error().is_some());

            let backend = HeadlessBackend::new(800, 600);
            g.initialize(backend).unwrap();
            assert!(g.is_initialized());
        }
    }

    #[test]
    fn double_initialize_is_misuse() {
        let (mut g, _probe) = init();
        let err = g.initialize(HeadlessBackend::new(10, 10)).unwrap_err();
        assert!(matches!(err, GraphicsError::StateMisuse(_)));
        assert!(g.is_initialized());
    }

    #[test]
    fn clean_shutdown_releases_everything() {
        let (mut g, probe) = init();
        let mut mesh = Some(build_triangle(&mut g));
        g.free_mesh(&mut mesh);
        assert_eq!(mesh, None);

        g.shutdown().unwrap();
        assert!(!g.is_initialized());
        assert_eq!(probe.live_objects(), 0);
        assert!(!probe.device_created());
    }

    #[test]
    fn shutdown_reports_leaks_and_still_releases() {
        let (mut g, probe) = init();
        build_triangle(&mut g);
        g.load_texture_from_memory(&[255; 16], 2, 2).unwrap();

        let err = g.shutdown().unwrap_err();
        assert_eq!(
            err,
            GraphicsError::ResourceLeak("not all resources were released: 1 mesh, 1 texture".into())
        );
        assert_eq!(probe.live_objects(), 0);
        assert!(g.resource_counts().is_zero());
        assert_eq!(g.last_error(), Some(err.to_string().as_str()));
    }

    #[test]
    fn shutdown_without_initialize_is_noop() {
        let mut g = TestGraphics::default();
        assert_eq!(g.shutdown(), Ok(()));
        assert_eq!(g.last_error(), None);
    }

    // ── frame session ─────────────────────────────────────────────────────

    #[test]
    fn frame_bracket_presents_once_per_frame() {
        let (mut g, probe) = init();
        g.set_background_color(ColorRgba::new(0.2, 0.3, 0.4, 1.0)).unwrap();

        g.start_drawing().unwrap();
        assert!(g.is_drawing());
        g.finish_drawing().unwrap();

        assert_eq!(probe.presents(), 1);
        assert_eq!(probe.last_clear(), Some(ColorRgba::new(0.2, 0.3, 0.4, 1.0)));
        assert_eq!(g.frames_presented(), 1);
    }

    #[test]
    fn bracket_misuse_is_reported_without_side_effects() {
        let (mut g, probe) = init();

        assert!(matches!(g.finish_drawing(), Err(GraphicsError::StateMisuse(_))));
        assert_eq!(probe.presents(), 0);

        g.start_drawing().unwrap();
        assert!(matches!(g.start_drawing(), Err(GraphicsError::StateMisuse(_))));
        assert_eq!(probe.frames_begun(), 1);
        g.finish_drawing().unwrap();
        assert_eq!(probe.presents(), 1);
    }

    #[test]
    fn calls_before_initialize_are_misuse() {
        let mut g = TestGraphics::default();
        assert!(matches!(g.start_drawing(), Err(GraphicsError::StateMisuse(_))));
        assert!(matches!(g.start_mesh(), Err(GraphicsError::StateMisuse(_))));
        assert!(matches!(g.set_alpha(0.5), Err(GraphicsError::StateMisuse(_))));
        assert!(matches!(g.set_blend_mode(BlendMode::Add), Err(GraphicsError::StateMisuse(_))));
        assert_eq!(
            g.last_error(),
            Some("state misuse: set blend mode when graphics is not initialized")
        );
    }

    // ── modes ─────────────────────────────────────────────────────────────

    #[test]
    fn raw_modes_are_validated() {
        let (mut g, probe) = init();

        g.set_blend_mode(2u32).unwrap();
        assert_eq!(probe.blend(), Some(BlendMode::Add));

        assert!(matches!(g.set_blend_mode(7u32), Err(GraphicsError::InvalidParameter(_))));
        assert_eq!(g.last_error(), Some("invalid parameter: unknown BlendMode value 7"));
        assert_eq!(g.blend_mode(), BlendMode::Add);
        assert_eq!(probe.blend(), Some(BlendMode::Add));

        g.set_sampler_state(1u32, 2u32).unwrap();
        assert_eq!(probe.sampler(), Some((SampleMode::Point, AddressMode::Clamp)));
        assert!(g.set_sampler_state(SampleMode::Linear, 4u32).is_err());
        assert_eq!(g.sampler_state(), (SampleMode::Point, AddressMode::Clamp));

        assert!(g.set_pixel_shader_mode(3u32).is_err());
        assert_eq!(g.last_error(), Some("invalid parameter: unknown PixelShaderMode value 3"));
        assert!(g.set_vertex_shader_mode(2u32).is_err());
        assert_eq!(g.last_error(), Some("invalid parameter: unknown VertexShaderMode value 2"));
        assert_eq!(g.pixel_shader_mode(), PixelShaderMode::Color);
    }

    #[test]
    fn stale_handles_are_rejected_by_setters() {
        let (mut g, _probe) = init();
        let id = g.load_texture_from_memory(&[0; 4], 1, 1).unwrap();
        let mut handle = Some(id);
        g.free_texture(&mut handle);

        assert!(matches!(g.set_texture(Some(id)), Err(GraphicsError::InvalidParameter(_))));
        g.set_texture(None).unwrap();
    }

    // ── meshes and drawing ────────────────────────────────────────────────

    #[test]
    fn draw_records_bound_state() {
        let (mut g, probe) = init();
        let mut mesh = Some(build_triangle(&mut g));

        g.start_drawing().unwrap();
        g.set_alpha(0.5).unwrap();
        g.set_transform(Vec2::new(10.0, 20.0), Vec2::splat(2.0), 0.0).unwrap();
        g.draw_mesh(mesh.unwrap(), Topology::TriangleList).unwrap();
        g.finish_drawing().unwrap();

        let draws = probe.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].count, 3);
        assert!(!draws[0].indexed);
        assert_eq!(draws[0].topology, Some(Topology::TriangleList));
        assert_eq!(draws[0].texture, None);

        let constants = draws[0].constants.unwrap();
        assert_eq!(constants.alpha, 0.5);
        let expected = Mat4::from_translation(glam::Vec3::new(10.0, 20.0, 0.0))
            * Mat4::from_scale(glam::Vec3::new(2.0, 2.0, 1.0));
        assert!(constants.transform().abs_diff_eq(expected, 1e-6));

        g.free_mesh(&mut mesh);
    }

    #[test]
    fn indexed_mesh_draws_indexed() {
        let (mut g, probe) = init();
        g.start_mesh().unwrap();
        for p in [Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y] {
            g.add_vertex(p, white(), p).unwrap();
        }
        let mut quad = Some(g.end_mesh_indexed(&[0, 1, 2, 0, 2, 3]).unwrap());

        g.draw_mesh(quad.unwrap(), 0u32).unwrap();
        let draws = probe.draws();
        assert!(draws[0].indexed);
        assert_eq!(draws[0].count, 6);

        g.free_mesh(&mut quad);
        g.shutdown().unwrap();
    }

    #[test]
    fn out_of_range_index_builds_nothing() {
        let (mut g, _probe) = init();
        g.start_mesh().unwrap();
        g.add_vertex(Vec2::ZERO, white(), Vec2::ZERO).unwrap();
        assert!(matches!(g.end_mesh_indexed(&[0, 1]), Err(GraphicsError::InvalidParameter(_))));
        assert_eq!(g.resource_counts().meshes, 0);

        // The failed end consumed the build; a new one can start.
        g.start_mesh().unwrap();
    }

    #[test]
    fn add_vertex_outside_build_is_misuse() {
        let (mut g, _probe) = init();
        assert!(matches!(
            g.add_vertex(Vec2::ZERO, white(), Vec2::ZERO),
            Err(GraphicsError::StateMisuse(_))
        ));
    }

    #[test]
    fn invalid_topology_is_reported_but_draw_happens() {
        let (mut g, probe) = init();
        let mut mesh = Some(build_triangle(&mut g));

        g.draw_mesh(mesh.unwrap(), Topology::LineStrip).unwrap();
        let err = g.draw_mesh(mesh.unwrap(), 9u32).unwrap_err();
        assert!(matches!(err, GraphicsError::InvalidParameter(_)));

        let draws = probe.draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[1].topology, Some(Topology::LineStrip));

        g.free_mesh(&mut mesh);
    }

    #[test]
    fn texture_is_bound_only_in_texture_mode() {
        let (mut g, probe) = init();
        let mut mesh = Some(build_triangle(&mut g));
        let mut texture = Some(g.load_texture_from_memory(&[255; 16], 2, 2).unwrap());
        g.set_texture(texture).unwrap();

        g.draw_mesh(mesh.unwrap(), Topology::TriangleList).unwrap();
        g.set_pixel_shader_mode(PixelShaderMode::Texture).unwrap();
        g.draw_mesh(mesh.unwrap(), Topology::TriangleList).unwrap();

        let draws = probe.draws();
        assert_eq!(draws[0].texture, None);
        assert!(draws[1].texture.is_some());
        assert_ne!(draws[0].pixel_program, draws[1].pixel_program);

        g.free_texture(&mut texture);
        g.free_mesh(&mut mesh);
        g.shutdown().unwrap();
    }

    #[test]
    fn freeing_current_texture_unbinds_it() {
        let (mut g, probe) = init();
        let mut mesh = Some(build_triangle(&mut g));
        let mut texture = Some(g.load_texture_from_memory(&[255; 4], 1, 1).unwrap());
        g.set_texture(texture).unwrap();
        g.set_pixel_shader_mode(PixelShaderMode::Texture).unwrap();

        g.free_texture(&mut texture);
        assert_eq!(texture, None);
        g.draw_mesh(mesh.unwrap(), Topology::TriangleList).unwrap();
        assert_eq!(probe.draws()[0].texture, None);

        g.free_mesh(&mut mesh);
    }

    #[test]
    fn custom_mode_without_shader_skips_draw() {
        let (mut g, probe) = init();
        let mut mesh = Some(build_triangle(&mut g));
        g.set_pixel_shader_mode(PixelShaderMode::Custom).unwrap();

        let err = g.draw_mesh(mesh.unwrap(), Topology::TriangleList).unwrap_err();
        assert!(matches!(err, GraphicsError::StateMisuse(_)));
        assert!(probe.draws().is_empty());

        g.free_mesh(&mut mesh);
    }

    #[test]
    fn custom_shaders_are_used_and_cached_by_path() {
        let (mut g, probe) = init();
        let pixel_file = write_shader(MAGENTA_PIXEL);
        let vertex_file = write_shader(PASS_VERTEX);

        let mut pixel = Some(g.load_pixel_shader(pixel_file.path()).unwrap());
        assert_eq!(g.load_pixel_shader(pixel_file.path()).unwrap(), pixel.unwrap());
        let mut vertex = Some(g.load_vertex_shader(vertex_file.path()).unwrap());
        assert_eq!(g.resource_counts().pixel_shaders, 1);
        assert_eq!(g.resource_counts().vertex_shaders, 1);

        let mut mesh = Some(build_triangle(&mut g));
        g.set_custom_pixel_shader(pixel).unwrap();
        g.set_custom_vertex_shader(vertex).unwrap();
        g.set_pixel_shader_mode(PixelShaderMode::Custom).unwrap();
        g.set_vertex_shader_mode(VertexShaderMode::Custom).unwrap();
        g.draw_mesh(mesh.unwrap(), Topology::TriangleList).unwrap();
        assert_eq!(probe.draws().len(), 1);

        g.free_pixel_shader(&mut pixel);
        g.free_vertex_shader(&mut vertex);
        g.free_mesh(&mut mesh);
        assert!(g.draw_mesh(MeshId::default(), Topology::TriangleList).is_err());
        g.shutdown().unwrap();
    }

    #[test]
    fn broken_shader_reports_compile_error() {
        let (mut g, _probe) = init();
        let file = write_shader("@fragment fn main( {");
        let err = g.load_pixel_shader(file.path()).unwrap_err();
        assert!(matches!(err, GraphicsError::Initialization(_)));
        assert_eq!(g.resource_counts().pixel_shaders, 0);
    }

    #[test]
    fn freed_shaders_are_retired_on_the_device() {
        let (mut g, watch) = init();
        let file = write_shader(MAGENTA_PIXEL);
        let mut pixel = Some(g.load_pixel_shader(file.path()).unwrap());
        let mut mesh = Some(build_triangle(&mut g));
        g.set_custom_pixel_shader(pixel).unwrap();
        g.set_pixel_shader_mode(PixelShaderMode::Custom).unwrap();
        g.draw_mesh(mesh.unwrap(), Topology::TriangleList).unwrap();
        let custom_id = watch.draws()[0].pixel_program;

        g.free_pixel_shader(&mut pixel);
        assert_eq!(watch.released_programs().len(), 1);
        assert_eq!(watch.released_programs().first().copied(), custom_id);
        assert!(g.draw_mesh(mesh.unwrap(), Topology::TriangleList).is_err());

        g.free_mesh(&mut mesh);
        g.shutdown().unwrap();
        assert_eq!(watch.released_programs().len(), 4);
    }

    #[test]
    fn shader_outside_binding_layout_is_rejected() {
        let (mut g, _probe) = init();
        let file = write_shader(
            "@group(3) @binding(0) var<uniform> tint: vec4<f32>;\n\
             @fragment\nfn main() -> @location(0) vec4<f32> {\n    return tint;\n}\n",
        );
        let err = g.load_pixel_shader(file.path()).unwrap_err();
        assert!(matches!(err, GraphicsError::Initialization(_)));
        assert!(err.to_string().contains("does not match the pipeline layout"), "{err}");
        assert_eq!(g.resource_counts().pixel_shaders, 0);
    }

    #[test]
    fn free_is_null_safe() {
        let (mut g, _probe) = init();
        g.free_mesh(&mut None);
        g.free_texture(&mut None);
        g.free_pixel_shader(&mut None);
        g.free_vertex_shader(&mut None);
        assert_eq!(g.last_error(), None);
    }

    // ── camera and resize ─────────────────────────────────────────────────

    #[test]
    fn camera_changes_reach_world_matrix() {
        let (mut g, _probe) = init();
        let before = g.constants().unwrap().world();

        g.set_camera_position(Vec2::new(100.0, 0.0));
        let after = g.constants().unwrap().world();
        assert!(!before.abs_diff_eq(after, 1e-6));
        assert!(after.abs_diff_eq(g.camera().world_matrix(), 1e-6));

        assert!(g.set_camera_zoom(0.0).is_err());
        assert_eq!(g.camera_zoom(), 1.0);
    }

    #[test]
    fn screen_to_world_follows_camera() {
        let (mut g, _probe) = init();
        let center = g.screen_to_world(Vec2::new(400.0, 300.0));
        assert!(center.abs_diff_eq(Vec2::ZERO, 1e-3));

        g.set_camera_position(Vec2::new(50.0, -20.0));
        let center = g.screen_to_world(Vec2::new(400.0, 300.0));
        assert!(center.abs_diff_eq(Vec2::new(50.0, -20.0), 1e-3));
    }

    #[test]
    fn resize_updates_viewport_and_camera() {
        let (mut g, probe) = init();
        probe.set_client_size(1024, 512);
        g.on_resize().unwrap();

        assert_eq!(probe.swap_chain_size(), (1024, 512));
        assert_eq!(g.viewport().map(|v| v.aspect()), Some(2.0));
        assert_eq!(g.camera().window_size(), Vec2::new(1024.0, 512.0));
        assert!(g.constants().unwrap().world().abs_diff_eq(g.camera().world_matrix(), 1e-6));
    }

    #[test]
    fn zero_size_resize_is_ignored() {
        let (mut g, probe) = init();
        probe.set_client_size(0, 0);
        g.on_resize().unwrap();
        assert_eq!(probe.swap_chain_size(), (800, 600));
        assert_eq!(g.camera().window_size(), Vec2::new(800.0, 600.0));
    }
}
