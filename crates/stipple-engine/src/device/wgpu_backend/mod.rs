//! `GpuBackend` over wgpu, rendering into a winit window.
//!
//! wgpu has no immediate context, so binds are tracked CPU-side and each draw is recorded
//! with a snapshot of them. `present` uploads every draw's constants into one uniform
//! ring, builds missing pipelines, and replays the frame in a single render pass against
//! the back buffer and a depth buffer cleared to the far plane.

mod init;
mod pipeline;
mod surface;

pub use init::WgpuInit;
pub use surface::SurfaceErrorAction;

use std::borrow::Cow;
use std::collections::HashMap;

use anyhow::{anyhow, bail, Context, Result};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::coords::{ColorRgba, Viewport};

use super::backend::{Capabilities, GpuBackend, ShaderModel, ShaderStage};
use super::constants::{PerObjectConstants, Vertex};
use super::state::{AddressMode, BlendMode, SampleMode, Topology};
use super::wgsl;

use pipeline::{Layouts, PipelineKey};

/// Compiled program. The id keys the pipeline cache.
#[derive(Clone)]
pub struct WgpuProgram {
    id: u64,
    stage: ShaderStage,
    module: wgpu::ShaderModule,
}

impl WgpuProgram {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }
}

#[derive(Clone)]
pub struct WgpuBlendState {
    mode: BlendMode,
}

/// Uniform block slot. The bytes live in the backend's per-frame ring.
pub struct WgpuConstantBuffer {
    size: usize,
}

/// Back-buffer binding for the configured surface size.
pub struct WgpuRenderTarget {
    width: u32,
    height: u32,
}

impl WgpuRenderTarget {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Binds as last set through the context calls.
struct BoundState {
    primitive: wgpu::PrimitiveState,
    topology: Topology,
    blend: BlendMode,
    vertex: Option<WgpuProgram>,
    pixel: Option<WgpuProgram>,
    texture: Option<wgpu::TextureView>,
    sampler: Option<wgpu::Sampler>,
    vertex_buffer: Option<wgpu::Buffer>,
    index_buffer: Option<wgpu::Buffer>,
    constants: Option<u32>,
    viewport: Viewport,
}

impl Default for BoundState {
    fn default() -> Self {
        Self {
            primitive: pipeline::rasterizer_state(),
            topology: Topology::TriangleList,
            blend: BlendMode::None,
            vertex: None,
            pixel: None,
            texture: None,
            sampler: None,
            vertex_buffer: None,
            index_buffer: None,
            constants: None,
            viewport: Viewport::default(),
        }
    }
}

struct DrawCall {
    key: PipelineKey,
    vertex: WgpuProgram,
    pixel: WgpuProgram,
    vertex_buffer: wgpu::Buffer,
    index_buffer: Option<wgpu::Buffer>,
    count: u32,
    texture: Option<wgpu::TextureView>,
    sampler: Option<wgpu::Sampler>,
    uniform_offset: u32,
    viewport: Viewport,
}

/// One acquired back buffer and everything recorded against it.
struct Frame {
    surface_texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    clear: wgpu::Color,
    constants: Vec<u8>,
    draws: Vec<DrawCall>,
}

struct DeviceState<'w> {
    _instance: wgpu::Instance,
    surface: wgpu::Surface<'w>,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,

    layouts: Layouts,
    /// `None` marks a pair the device rejected, so it is not rebuilt every frame.
    pipelines: HashMap<PipelineKey, Option<wgpu::RenderPipeline>>,
    depth: wgpu::TextureView,
    fallback_view: wgpu::TextureView,
    fallback_sampler: wgpu::Sampler,
    uniform_stride: usize,
    uniform_ring: Option<wgpu::Buffer>,

    bound: BoundState,
    frame: Option<Frame>,
}

impl<'w> DeviceState<'w> {
    /// Adapter/device acquisition is asynchronous under wgpu.
    async fn new(window: &'w Window, init: &WgpuInit) -> Result<Self> {
        let size = window.inner_size();
        anyhow::ensure!(size.width > 0 && size.height > 0, "window has zero size");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("stipple device"),
                required_features: init.required_features,
                required_limits: init.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let caps = surface.get_capabilities(&adapter);
        let format = surface::choose_surface_format(&caps, init.prefer_srgb)
            .context("no supported surface formats")?;
        let alpha_mode = surface::choose_alpha_mode(&caps, init.alpha_mode);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: init.present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };
        surface.configure(&device, &config);

        let layouts = Layouts::new(&device)?;
        let depth = create_depth_view(&device, config.width, config.height);

        let fallback = device.create_texture_with_data(
            &queue,
            &texture_descriptor("stipple fallback texture", 1, 1),
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255, 255, 255, 255],
        );
        let fallback_view = fallback.create_view(&wgpu::TextureViewDescriptor::default());
        let fallback_sampler = device.create_sampler(&pipeline::sampler_descriptor(
            SampleMode::Linear,
            AddressMode::Wrap,
        ));

        let alignment = device.limits().min_uniform_buffer_offset_alignment as usize;
        let uniform_stride = PerObjectConstants::SIZE.next_multiple_of(alignment.max(1));

        log::info!(
            "wgpu device created: {} ({:?}), surface {format:?} {}x{}",
            adapter.get_info().name,
            adapter.get_info().backend,
            size.width,
            size.height
        );

        Ok(Self {
            _instance: instance,
            surface,
            adapter,
            device,
            queue,
            config,
            layouts,
            pipelines: HashMap::new(),
            depth,
            fallback_view,
            fallback_sampler,
            uniform_stride,
            uniform_ring: None,
            bound: BoundState::default(),
            frame: None,
        })
    }

    fn ensure_uniform_capacity(&mut self, bytes: usize) {
        let current = self.uniform_ring.as_ref().map_or(0, |b| b.size() as usize);
        if bytes <= current {
            return;
        }

        let size = bytes.next_power_of_two().max(self.uniform_stride * 64);
        self.uniform_ring = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("stipple per-object ring"),
            size: size as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
    }

    fn ensure_pipelines(&mut self, draws: &[DrawCall]) {
        for draw in draws {
            if self.pipelines.contains_key(&draw.key) {
                continue;
            }
            let (pipeline, error) = validated(&self.device, || {
                pipeline::create_pipeline(
                    &self.device,
                    &self.layouts,
                    self.config.format,
                    self.bound.primitive,
                    draw.key,
                    &draw.vertex.module,
                    &draw.pixel.module,
                )
            });
            let pipeline = match error {
                Some(err) => {
                    log::error!(
                        "pipeline for programs {} and {} rejected, their draws are skipped: {err}",
                        draw.vertex.id,
                        draw.pixel.id
                    );
                    None
                }
                None => Some(pipeline),
            };
            self.pipelines.insert(draw.key, pipeline);
        }
    }

    /// Drops every cached pipeline built from program `id` and unbinds it.
    fn retire_program(&mut self, id: u64) {
        let before = self.pipelines.len();
        self.pipelines
            .retain(|key, _| key.vertex != id && key.pixel != id);
        if self.bound.vertex.as_ref().is_some_and(|p| p.id == id) {
            self.bound.vertex = None;
        }
        if self.bound.pixel.as_ref().is_some_and(|p| p.id == id) {
            self.bound.pixel = None;
        }
        if let Some(frame) = self.frame.as_mut() {
            frame.draws.retain(|d| d.key.vertex != id && d.key.pixel != id);
        }
        log::debug!(
            "program {id} retired, {} pipelines dropped",
            before - self.pipelines.len()
        );
    }

    fn submit(&mut self, frame: Frame) -> Result<()> {
        let Frame {
            surface_texture,
            view,
            clear,
            constants,
            draws,
        } = frame;

        if !constants.is_empty() {
            self.ensure_uniform_capacity(constants.len());
        }
        self.ensure_pipelines(&draws);

        let per_object_size = wgpu::BufferSize::new(PerObjectConstants::SIZE as u64)
            .context("per-object constants have zero size")?;
        let uniform_group = self.uniform_ring.as_ref().map(|ring| {
            self.queue.write_buffer(ring, 0, &constants);
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("stipple per-object bind group"),
                layout: &self.layouts.uniforms,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: ring,
                        offset: 0,
                        size: Some(per_object_size),
                    }),
                }],
            })
        });

        let texture_groups: Vec<wgpu::BindGroup> = draws
            .iter()
            .map(|draw| {
                let view = draw.texture.as_ref().unwrap_or(&self.fallback_view);
                let sampler = draw.sampler.as_ref().unwrap_or(&self.fallback_sampler);
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("stipple texture bind group"),
                    layout: &self.layouts.texture,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(sampler),
                        },
                    ],
                })
            })
            .collect();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("stipple frame encoder"),
            });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("stipple frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            let (target_w, target_h) = (self.config.width as f32, self.config.height as f32);

            for (draw, texture_group) in draws.iter().zip(&texture_groups) {
                let Some(Some(pipeline)) = self.pipelines.get(&draw.key) else { continue };
                let Some(uniform_group) = uniform_group.as_ref() else { continue };

                let vp = draw.viewport;
                let w = vp.width.min(target_w - vp.x);
                let h = vp.height.min(target_h - vp.y);
                if w <= 0.0 || h <= 0.0 {
                    continue;
                }

                rpass.set_pipeline(pipeline);
                rpass.set_viewport(vp.x, vp.y, w, h, vp.min_depth, vp.max_depth);
                rpass.set_bind_group(0, uniform_group, &[draw.uniform_offset]);
                rpass.set_bind_group(1, texture_group, &[]);
                rpass.set_vertex_buffer(0, draw.vertex_buffer.slice(..));

                match draw.index_buffer.as_ref() {
                    Some(ib) => {
                        rpass.set_index_buffer(ib.slice(..), wgpu::IndexFormat::Uint32);
                        rpass.draw_indexed(0..draw.count, 0, 0..1);
                    }
                    None => rpass.draw(0..draw.count, 0..1),
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        drop(view);
        surface_texture.present();

        log::trace!("frame presented ({} draws)", draws.len());
        Ok(())
    }

    fn record_draw(&mut self, count: u32, indexed: bool) {
        let Some(frame) = self.frame.as_mut() else {
            log::trace!("draw outside of a frame ignored");
            return;
        };
        let bound = &self.bound;

        let (Some(vertex), Some(pixel), Some(vertex_buffer), Some(uniform_offset)) = (
            bound.vertex.clone(),
            bound.pixel.clone(),
            bound.vertex_buffer.clone(),
            bound.constants,
        ) else {
            log::warn!("draw skipped: programs, vertex buffer or constants not bound");
            return;
        };
        let index_buffer = if indexed { bound.index_buffer.clone() } else { None };
        if indexed && index_buffer.is_none() {
            log::warn!("indexed draw skipped: no index buffer bound");
            return;
        }

        frame.draws.push(DrawCall {
            key: PipelineKey {
                vertex: vertex.id,
                pixel: pixel.id,
                blend: bound.blend,
                topology: bound.topology,
            },
            vertex,
            pixel,
            vertex_buffer,
            index_buffer,
            count,
            texture: bound.texture.clone(),
            sampler: bound.sampler.clone(),
            uniform_offset,
            viewport: bound.viewport,
        });
    }
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    device
        .create_texture(&pipeline::depth_descriptor(width, height))
        .create_view(&wgpu::TextureViewDescriptor::default())
}

/// Runs `f` inside a validation error scope and returns what the device reported.
fn validated<T>(device: &wgpu::Device, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
    let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    let error = pollster::block_on(scope.pop());
    (value, error)
}

fn texture_descriptor(label: &str, width: u32, height: u32) -> wgpu::TextureDescriptor<'_> {
    wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    }
}

/// wgpu implementation of [`GpuBackend`] bound to one window.
///
/// The window must outlive the backend; the surface borrows it for `'w`.
pub struct WgpuBackend<'w> {
    window: &'w Window,
    init: WgpuInit,
    state: Option<DeviceState<'w>>,
    next_program_id: u64,
}

impl<'w> WgpuBackend<'w> {
    pub fn new(window: &'w Window, init: WgpuInit) -> Self {
        Self {
            window,
            init,
            state: None,
            next_program_id: 1,
        }
    }

    pub fn window(&self) -> &'w Window {
        self.window
    }

    /// Active surface format, once the device exists.
    pub fn surface_format(&self) -> Option<wgpu::TextureFormat> {
        self.state.as_ref().map(|s| s.config.format)
    }

    fn state(&mut self) -> Result<&mut DeviceState<'w>> {
        self.state.as_mut().ok_or_else(|| anyhow!("wgpu device not created"))
    }
}

impl<'w> GpuBackend for WgpuBackend<'w> {
    type Buffer = wgpu::Buffer;
    type ConstantBuffer = WgpuConstantBuffer;
    type Texture = wgpu::Texture;
    type TextureView = wgpu::TextureView;
    type Program = WgpuProgram;
    type BlendState = WgpuBlendState;
    type SamplerState = wgpu::Sampler;
    type RasterizerState = wgpu::PrimitiveState;
    type RenderTarget = WgpuRenderTarget;

    fn create_device(&mut self) -> Result<()> {
        if self.state.is_some() {
            bail!("wgpu device already created");
        }
        let state = pollster::block_on(DeviceState::new(self.window, &self.init))?;
        self.state = Some(state);
        Ok(())
    }

    fn release_device(&mut self) {
        if self.state.take().is_some() {
            log::info!("wgpu device released");
        }
    }

    fn client_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    fn capabilities(&self) -> Capabilities {
        let compliant = self
            .state
            .as_ref()
            .is_some_and(|s| s.adapter.get_downlevel_capabilities().is_webgpu_compliant());
        Capabilities {
            shader_model: if compliant { ShaderModel::Sm5 } else { ShaderModel::Sm4 },
        }
    }

    fn create_render_target(&mut self) -> Result<Self::RenderTarget> {
        let state = self.state()?;
        Ok(WgpuRenderTarget {
            width: state.config.width,
            height: state.config.height,
        })
    }

    fn resize_swap_chain(&mut self, width: u32, height: u32) -> Result<()> {
        let state = self.state()?;
        // A frame acquired at the old size cannot be presented after reconfiguring.
        state.frame = None;
        surface::apply_resize(&state.surface, &state.device, &mut state.config, width, height);
        state.depth = create_depth_view(&state.device, state.config.width, state.config.height);
        Ok(())
    }

    fn create_rasterizer_state(&mut self) -> Result<Self::RasterizerState> {
        self.state()?;
        Ok(pipeline::rasterizer_state())
    }

    fn create_blend_state(&mut self, mode: BlendMode) -> Result<Self::BlendState> {
        self.state()?;
        Ok(WgpuBlendState { mode })
    }

    fn create_sampler_state(
        &mut self,
        sample: SampleMode,
        address: AddressMode,
    ) -> Result<Self::SamplerState> {
        let state = self.state()?;
        Ok(state
            .device
            .create_sampler(&pipeline::sampler_descriptor(sample, address)))
    }

    fn create_constant_buffer(&mut self, size: usize) -> Result<Self::ConstantBuffer> {
        let state = self.state()?;
        anyhow::ensure!(
            size <= state.uniform_stride,
            "constant block of {size} bytes exceeds the {}-byte ring stride",
            state.uniform_stride
        );
        Ok(WgpuConstantBuffer { size })
    }

    fn create_vertex_buffer(&mut self, vertices: &[Vertex]) -> Result<Self::Buffer> {
        let state = self.state()?;
        Ok(state
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("stipple mesh vbo"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            }))
    }

    fn create_index_buffer(&mut self, indices: &[u32]) -> Result<Self::Buffer> {
        let state = self.state()?;
        Ok(state
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("stipple mesh ibo"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            }))
    }

    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<Self::Texture> {
        let state = self.state()?;
        let max = state.device.limits().max_texture_dimension_2d;
        anyhow::ensure!(
            width <= max && height <= max,
            "texture {width}x{height} exceeds the device limit of {max}"
        );
        anyhow::ensure!(
            rgba.len() == width as usize * height as usize * 4,
            "texture data is {} bytes, expected {}",
            rgba.len(),
            width as usize * height as usize * 4
        );

        Ok(state.device.create_texture_with_data(
            &state.queue,
            &texture_descriptor("stipple texture", width, height),
            wgpu::util::TextureDataOrder::LayerMajor,
            rgba,
        ))
    }

    fn create_texture_view(&mut self, texture: &Self::Texture) -> Result<Self::TextureView> {
        self.state()?;
        Ok(texture.create_view(&wgpu::TextureViewDescriptor::default()))
    }

    fn compile_program(
        &mut self,
        stage: ShaderStage,
        label: &str,
        source: &str,
        model: ShaderModel,
    ) -> Result<Self::Program> {
        wgsl::validate(stage, label, source, model)?;

        let id = self.next_program_id;
        let state = self.state()?;
        let (module, error) = validated(&state.device, || {
            state.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(Cow::Owned(source.to_owned())),
            })
        });
        if let Some(err) = error {
            bail!("{label}: device rejected the shader module: {err}");
        }
        self.next_program_id += 1;

        Ok(WgpuProgram { id, stage, module })
    }

    fn release_program(&mut self, program: &Self::Program) {
        if let Some(state) = self.state.as_mut() {
            state.retire_program(program.id);
        }
    }

    fn begin_frame(&mut self, target: &Self::RenderTarget, clear: ColorRgba) -> Result<()> {
        let state = self.state()?;
        state.frame = None;
        state.bound.constants = None;

        if (target.width, target.height) != (state.config.width, state.config.height) {
            log::debug!("render target is stale; frame skipped until resize");
            return Ok(());
        }

        let surface_texture = match state.surface.get_current_texture() {
            Ok(t) => t,
            Err(err) => {
                let message = err.to_string();
                return match surface::map_surface_error(
                    &state.surface,
                    &state.device,
                    &state.config,
                    err,
                ) {
                    SurfaceErrorAction::Fatal => Err(anyhow!("surface error: {message}")),
                    action => {
                        log::debug!("surface error {message}: {action:?}, frame skipped");
                        Ok(())
                    }
                };
            }
        };
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        state.frame = Some(Frame {
            surface_texture,
            view,
            clear: clear.to_wgpu(),
            constants: Vec::new(),
            draws: Vec::new(),
        });
        Ok(())
    }

    fn unbind_render_target(&mut self) {
        if let Some(state) = self.state.as_mut() {
            state.frame = None;
        }
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        if let Some(state) = self.state.as_mut() {
            state.bound.viewport = viewport;
        }
    }

    fn set_rasterizer_state(&mut self, rasterizer: &Self::RasterizerState) {
        if let Some(state) = self.state.as_mut() {
            state.bound.primitive = *rasterizer;
        }
    }

    fn set_blend_state(&mut self, blend: &Self::BlendState) {
        if let Some(state) = self.state.as_mut() {
            state.bound.blend = blend.mode;
        }
    }

    fn set_sampler(&mut self, sampler: &Self::SamplerState) {
        if let Some(state) = self.state.as_mut() {
            state.bound.sampler = Some(sampler.clone());
        }
    }

    fn set_topology(&mut self, topology: Topology) {
        if let Some(state) = self.state.as_mut() {
            state.bound.topology = topology;
        }
    }

    fn set_vertex_program(&mut self, program: &Self::Program) {
        if let Some(state) = self.state.as_mut() {
            state.bound.vertex = Some(program.clone());
        }
    }

    fn set_pixel_program(&mut self, program: &Self::Program) {
        if let Some(state) = self.state.as_mut() {
            state.bound.pixel = Some(program.clone());
        }
    }

    fn set_shader_resource(&mut self, view: Option<&Self::TextureView>) {
        if let Some(state) = self.state.as_mut() {
            state.bound.texture = view.cloned();
        }
    }

    fn set_vertex_buffer(&mut self, buffer: &Self::Buffer) {
        if let Some(state) = self.state.as_mut() {
            state.bound.vertex_buffer = Some(buffer.clone());
        }
    }

    fn set_index_buffer(&mut self, buffer: Option<&Self::Buffer>) {
        if let Some(state) = self.state.as_mut() {
            state.bound.index_buffer = buffer.cloned();
        }
    }

    fn update_constants(&mut self, buffer: &Self::ConstantBuffer, data: &[u8]) {
        let Some(state) = self.state.as_mut() else { return };
        let Some(frame) = state.frame.as_mut() else { return };

        let offset = frame.constants.len();
        let len = data.len().min(buffer.size);
        frame.constants.extend_from_slice(&data[..len]);
        frame.constants.resize(offset + state.uniform_stride, 0);
        state.bound.constants = Some(offset as u32);
    }

    fn draw(&mut self, vertex_count: u32) {
        if let Some(state) = self.state.as_mut() {
            state.record_draw(vertex_count, false);
        }
    }

    fn draw_indexed(&mut self, index_count: u32) {
        if let Some(state) = self.state.as_mut() {
            state.record_draw(index_count, true);
        }
    }

    fn present(&mut self) -> Result<bool> {
        let state = self.state()?;
        let Some(frame) = state.frame.take() else {
            return Ok(false);
        };
        state.submit(frame)?;
        Ok(true)
    }
}
