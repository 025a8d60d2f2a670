//! A backend with no GPU behind it.
//!
//! `HeadlessBackend` hands out counted placeholder objects and records every context call.
//! A [`HeadlessProbe`] obtained before the backend is moved into the core keeps reading the
//! same state, so tests can observe presents, bound state and live objects from outside.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use anyhow::{bail, Result};

use crate::coords::{ColorRgba, Viewport};

use super::backend::{Capabilities, GpuBackend, ShaderModel, ShaderStage};
use super::constants::{PerObjectConstants, Vertex};
use super::state::{AddressMode, BlendMode, SampleMode, Topology};
use super::wgsl;

/// Creation steps that can be made to fail on purpose.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FailStep {
    Device,
    RenderTarget,
    Resize,
    Rasterizer,
    BlendState,
    SamplerState,
    ConstantBuffer,
    VertexBuffer,
    IndexBuffer,
    Texture,
    TextureView,
    Compile,
    Present,
}

/// Snapshot of the bound state at the time of one draw call.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub topology: Option<Topology>,
    pub count: u32,
    pub indexed: bool,
    pub vertex_program: Option<u64>,
    pub pixel_program: Option<u64>,
    pub texture: Option<u64>,
    pub blend: Option<BlendMode>,
    pub sampler: Option<(SampleMode, AddressMode)>,
    pub constants: Option<PerObjectConstants>,
}

#[derive(Debug)]
struct HeadlessState {
    client_size: (u32, u32),
    swap_chain_size: (u32, u32),
    shader_model: ShaderModel,
    fail: HashSet<FailStep>,
    device_created: bool,
    next_id: u64,

    frames_begun: usize,
    presents: usize,
    skip_presents: bool,
    depth_clears: usize,
    last_clear: Option<ColorRgba>,
    target_bound: bool,
    viewport: Option<Viewport>,
    blend: Option<BlendMode>,
    sampler: Option<(SampleMode, AddressMode)>,
    topology: Option<Topology>,
    vertex_program: Option<u64>,
    pixel_program: Option<u64>,
    texture: Option<u64>,
    index_bound: bool,
    constants: Option<PerObjectConstants>,
    compiles: Vec<String>,
    released_programs: Vec<u64>,
    draws: Vec<DrawRecord>,
}

impl HeadlessState {
    fn new(width: u32, height: u32) -> Self {
        Self {
            client_size: (width, height),
            swap_chain_size: (0, 0),
            shader_model: ShaderModel::Sm5,
            fail: HashSet::new(),
            device_created: false,
            next_id: 1,
            frames_begun: 0,
            presents: 0,
            skip_presents: false,
            depth_clears: 0,
            last_clear: None,
            target_bound: false,
            viewport: None,
            blend: None,
            sampler: None,
            topology: None,
            vertex_program: None,
            pixel_program: None,
            texture: None,
            index_bound: false,
            constants: None,
            compiles: Vec::new(),
            released_programs: Vec::new(),
            draws: Vec::new(),
        }
    }

    fn check(&self, step: FailStep) -> Result<()> {
        if self.fail.contains(&step) {
            bail!("injected failure at {step:?}");
        }
        if step != FailStep::Device && !self.device_created {
            bail!("{step:?} requested without a device");
        }
        Ok(())
    }

    fn record_draw(&mut self, count: u32, indexed: bool) {
        log::trace!("headless draw: {count} (indexed: {indexed})");
        self.draws.push(DrawRecord {
            topology: self.topology,
            count,
            indexed,
            vertex_program: self.vertex_program,
            pixel_program: self.pixel_program,
            texture: self.texture,
            blend: self.blend,
            sampler: self.sampler,
            constants: self.constants,
        });
    }
}

/// Placeholder GPU object. Counted as live until dropped.
#[derive(Debug)]
pub struct HeadlessObject<T> {
    id: u64,
    value: T,
    live: Rc<Cell<usize>>,
}

impl<T> HeadlessObject<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T> Drop for HeadlessObject<T> {
    fn drop(&mut self) {
        self.live.set(self.live.get().saturating_sub(1));
    }
}

pub struct HeadlessBackend {
    state: Rc<RefCell<HeadlessState>>,
    live: Rc<Cell<usize>>,
}

impl HeadlessBackend {
    /// Creates a backend whose window reports a `width` x `height` client area.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Rc::new(RefCell::new(HeadlessState::new(width, height))),
            live: Rc::new(Cell::new(0)),
        }
    }

    /// Returns a handle that observes this backend after it has been moved.
    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe {
            state: Rc::clone(&self.state),
            live: Rc::clone(&self.live),
        }
    }

    fn create<T>(&mut self, step: FailStep, value: T) -> Result<HeadlessObject<T>> {
        let mut state = self.state.borrow_mut();
        state.check(step)?;
        let id = state.next_id;
        state.next_id += 1;
        self.live.set(self.live.get() + 1);
        Ok(HeadlessObject {
            id,
            value,
            live: Rc::clone(&self.live),
        })
    }
}

impl GpuBackend for HeadlessBackend {
    type Buffer = HeadlessObject<usize>;
    type ConstantBuffer = HeadlessObject<usize>;
    type Texture = HeadlessObject<(u32, u32)>;
    type TextureView = HeadlessObject<()>;
    type Program = HeadlessObject<ShaderStage>;
    type BlendState = HeadlessObject<BlendMode>;
    type SamplerState = HeadlessObject<(SampleMode, AddressMode)>;
    type RasterizerState = HeadlessObject<()>;
    type RenderTarget = HeadlessObject<(u32, u32)>;

    fn create_device(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.check(FailStep::Device)?;
        state.device_created = true;
        state.swap_chain_size = state.client_size;
        Ok(())
    }

    fn release_device(&mut self) {
        let mut state = self.state.borrow_mut();
        if self.live.get() > 0 {
            log::warn!("headless device released with {} live objects", self.live.get());
        }
        state.device_created = false;
        state.target_bound = false;
    }

    fn client_size(&self) -> (u32, u32) {
        self.state.borrow().client_size
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            shader_model: self.state.borrow().shader_model,
        }
    }

    fn create_render_target(&mut self) -> Result<Self::RenderTarget> {
        let size = self.state.borrow().swap_chain_size;
        self.create(FailStep::RenderTarget, size)
    }

    fn resize_swap_chain(&mut self, width: u32, height: u32) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.check(FailStep::Resize)?;
        state.swap_chain_size = (width, height);
        Ok(())
    }

    fn create_rasterizer_state(&mut self) -> Result<Self::RasterizerState> {
        self.create(FailStep::Rasterizer, ())
    }

    fn create_blend_state(&mut self, mode: BlendMode) -> Result<Self::BlendState> {
        self.create(FailStep::BlendState, mode)
    }

    fn create_sampler_state(
        &mut self,
        sample: SampleMode,
        address: AddressMode,
    ) -> Result<Self::SamplerState> {
        self.create(FailStep::SamplerState, (sample, address))
    }

    fn create_constant_buffer(&mut self, size: usize) -> Result<Self::ConstantBuffer> {
        self.create(FailStep::ConstantBuffer, size)
    }

    fn create_vertex_buffer(&mut self, vertices: &[Vertex]) -> Result<Self::Buffer> {
        self.create(FailStep::VertexBuffer, vertices.len())
    }

    fn create_index_buffer(&mut self, indices: &[u32]) -> Result<Self::Buffer> {
        self.create(FailStep::IndexBuffer, indices.len())
    }

    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<Self::Texture> {
        anyhow::ensure!(
            rgba.len() == width as usize * height as usize * 4,
            "texture data is {} bytes, expected {}",
            rgba.len(),
            width as usize * height as usize * 4
        );
        self.create(FailStep::Texture, (width, height))
    }

    fn create_texture_view(&mut self, _texture: &Self::Texture) -> Result<Self::TextureView> {
        self.create(FailStep::TextureView, ())
    }

    fn compile_program(
        &mut self,
        stage: ShaderStage,
        label: &str,
        source: &str,
        model: ShaderModel,
    ) -> Result<Self::Program> {
        self.state.borrow().check(FailStep::Compile)?;
        wgsl::validate(stage, label, source, model)?;
        self.state.borrow_mut().compiles.push(label.to_owned());
        self.create(FailStep::Compile, stage)
    }

    fn release_program(&mut self, program: &Self::Program) {
        let mut state = self.state.borrow_mut();
        state.released_programs.push(program.id);
        if state.vertex_program == Some(program.id) {
            state.vertex_program = None;
        }
        if state.pixel_program == Some(program.id) {
            state.pixel_program = None;
        }
    }

    fn begin_frame(&mut self, _target: &Self::RenderTarget, clear: ColorRgba) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.check(FailStep::RenderTarget)?;
        state.frames_begun += 1;
        state.depth_clears += 1;
        state.last_clear = Some(clear);
        state.target_bound = true;
        Ok(())
    }

    fn unbind_render_target(&mut self) {
        self.state.borrow_mut().target_bound = false;
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.state.borrow_mut().viewport = Some(viewport);
    }

    fn set_rasterizer_state(&mut self, _state: &Self::RasterizerState) {}

    fn set_blend_state(&mut self, state: &Self::BlendState) {
        self.state.borrow_mut().blend = Some(state.value);
    }

    fn set_sampler(&mut self, state: &Self::SamplerState) {
        self.state.borrow_mut().sampler = Some(state.value);
    }

    fn set_topology(&mut self, topology: Topology) {
        self.state.borrow_mut().topology = Some(topology);
    }

    fn set_vertex_program(&mut self, program: &Self::Program) {
        self.state.borrow_mut().vertex_program = Some(program.id);
    }

    fn set_pixel_program(&mut self, program: &Self::Program) {
        self.state.borrow_mut().pixel_program = Some(program.id);
    }

    fn set_shader_resource(&mut self, view: Option<&Self::TextureView>) {
        self.state.borrow_mut().texture = view.map(|v| v.id);
    }

    fn set_vertex_buffer(&mut self, _buffer: &Self::Buffer) {}

    fn set_index_buffer(&mut self, buffer: Option<&Self::Buffer>) {
        self.state.borrow_mut().index_bound = buffer.is_some();
    }

    fn update_constants(&mut self, _buffer: &Self::ConstantBuffer, data: &[u8]) {
        let constants = bytemuck::try_pod_read_unaligned::<PerObjectConstants>(data).ok();
        self.state.borrow_mut().constants = constants;
    }

    fn draw(&mut self, vertex_count: u32) {
        self.state.borrow_mut().record_draw(vertex_count, false);
    }

    fn draw_indexed(&mut self, index_count: u32) {
        self.state.borrow_mut().record_draw(index_count, true);
    }

    fn present(&mut self) -> Result<bool> {
        let mut state = self.state.borrow_mut();
        state.check(FailStep::Present)?;
        if state.skip_presents {
            return Ok(false);
        }
        state.presents += 1;
        Ok(true)
    }
}

/// Read side of a [`HeadlessBackend`], plus the knobs tests turn.
#[derive(Clone)]
pub struct HeadlessProbe {
    state: Rc<RefCell<HeadlessState>>,
    live: Rc<Cell<usize>>,
}

impl HeadlessProbe {
    /// GPU objects created and not yet dropped.
    pub fn live_objects(&self) -> usize {
        self.live.get()
    }

    pub fn device_created(&self) -> bool {
        self.state.borrow().device_created
    }

    pub fn frames_begun(&self) -> usize {
        self.state.borrow().frames_begun
    }

    pub fn presents(&self) -> usize {
        self.state.borrow().presents
    }

    /// Depth-buffer clears, one per begun frame.
    pub fn depth_clears(&self) -> usize {
        self.state.borrow().depth_clears
    }

    pub fn last_clear(&self) -> Option<ColorRgba> {
        self.state.borrow().last_clear
    }

    pub fn target_bound(&self) -> bool {
        self.state.borrow().target_bound
    }

    pub fn swap_chain_size(&self) -> (u32, u32) {
        self.state.borrow().swap_chain_size
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.state.borrow().viewport
    }

    pub fn blend(&self) -> Option<BlendMode> {
        self.state.borrow().blend
    }

    pub fn sampler(&self) -> Option<(SampleMode, AddressMode)> {
        self.state.borrow().sampler
    }

    pub fn topology(&self) -> Option<Topology> {
        self.state.borrow().topology
    }

    pub fn bound_texture(&self) -> Option<u64> {
        self.state.borrow().texture
    }

    pub fn index_bound(&self) -> bool {
        self.state.borrow().index_bound
    }

    /// Labels of every program compiled so far, in order.
    pub fn compiles(&self) -> Vec<String> {
        self.state.borrow().compiles.clone()
    }

    /// Ids of programs handed to `release_program`, in order.
    pub fn released_programs(&self) -> Vec<u64> {
        self.state.borrow().released_programs.clone()
    }

    pub fn draws(&self) -> Vec<DrawRecord> {
        self.state.borrow().draws.clone()
    }

    pub fn set_client_size(&self, width: u32, height: u32) {
        self.state.borrow_mut().client_size = (width, height);
    }

    /// Makes `present` report that there was no frame, like a lost surface does.
    pub fn set_skip_presents(&self, skip: bool) {
        self.state.borrow_mut().skip_presents = skip;
    }

    pub fn set_shader_model(&self, model: ShaderModel) {
        self.state.borrow_mut().shader_model = model;
    }

    /// Makes `step` fail until [`clear_failures`](Self::clear_failures) is called.
    pub fn fail_on(&self, step: FailStep) {
        self.state.borrow_mut().fail.insert(step);
    }

    pub fn clear_failures(&self) {
        self.state.borrow_mut().fail.clear();
    }
}
