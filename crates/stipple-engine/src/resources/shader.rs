use std::collections::HashMap;
use std::path::Path;

use slotmap::{new_key_type, Key, SlotMap};

use crate::device::{shaders, GpuBackend, PixelShaderMode, ShaderStage, VertexShaderMode};
use crate::error::{GraphicsError, Result};

new_key_type! {
    /// Handle to a user pixel program.
    pub struct PixelShaderId;
    /// Handle to a user vertex program.
    pub struct VertexShaderId;
}

/// Built-in programs compiled at initialization. Not counted as user shaders.
pub struct DefaultPrograms<B: GpuBackend> {
    pub vertex: B::Program,
    pub color_pixel: B::Program,
    pub texture_pixel: B::Program,
}

/// Filename-keyed, single-owner program cache.
///
/// A second load of the same name returns the cached key without compiling. Release
/// removes both the name and the program; releasing a stale key does nothing.
struct ProgramCache<K: Key, P> {
    by_name: HashMap<String, K>,
    programs: SlotMap<K, (String, P)>,
}

impl<K: Key, P> Default for ProgramCache<K, P> {
    fn default() -> Self {
        Self {
            by_name: HashMap::new(),
            programs: SlotMap::with_key(),
        }
    }
}

impl<K: Key, P> ProgramCache<K, P> {
    fn load(&mut self, name: &str, compile: impl FnOnce() -> Result<P>) -> Result<K> {
        if let Some(&key) = self.by_name.get(name) {
            log::debug!("shader cache hit: {name}");
            return Ok(key);
        }
        let program = compile()?;
        let key = self.programs.insert((name.to_owned(), program));
        self.by_name.insert(name.to_owned(), key);
        Ok(key)
    }

    fn get(&self, key: K) -> Option<&P> {
        self.programs.get(key).map(|(_, p)| p)
    }

    fn release(&mut self, key: K, retire: impl FnOnce(&P)) -> bool {
        let Some((name, program)) = self.programs.remove(key) else {
            return false;
        };
        retire(&program);
        self.by_name.remove(&name);
        log::debug!("shader released: {name}");
        true
    }

    fn len(&self) -> usize {
        self.programs.len()
    }

    fn clear(&mut self, mut retire: impl FnMut(&P)) -> usize {
        let n = self.programs.len();
        self.by_name.clear();
        for (_, (_, program)) in self.programs.drain() {
            retire(&program);
        }
        n
    }
}

/// Compiles, caches and hands out shader programs.
pub struct ShaderManager<B: GpuBackend> {
    pixel: ProgramCache<PixelShaderId, B::Program>,
    vertex: ProgramCache<VertexShaderId, B::Program>,
    defaults: Option<DefaultPrograms<B>>,
}

impl<B: GpuBackend> Default for ShaderManager<B> {
    fn default() -> Self {
        Self {
            pixel: ProgramCache::default(),
            vertex: ProgramCache::default(),
            defaults: None,
        }
    }
}

impl<B: GpuBackend> ShaderManager<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles the built-in programs against the device's highest shader model.
    pub fn compile_defaults(&mut self, backend: &mut B) -> Result<()> {
        let model = backend.capabilities().shader_model;
        let mut compile = |stage, label: &str, source: &str| {
            backend
                .compile_program(stage, label, source, model)
                .map_err(|e| GraphicsError::backend("failed to compile built-in shader", e))
        };

        let defaults = DefaultPrograms {
            vertex: compile(ShaderStage::Vertex, "default vertex", shaders::DEFAULT_VERTEX)?,
            color_pixel: compile(ShaderStage::Pixel, "color pixel", shaders::COLOR_PIXEL)?,
            texture_pixel: compile(ShaderStage::Pixel, "texture pixel", shaders::TEXTURE_PIXEL)?,
        };
        self.defaults = Some(defaults);
        log::debug!("built-in shaders compiled ({model:?})");
        Ok(())
    }

    pub fn release_defaults(&mut self, backend: &mut B) {
        let Some(defaults) = self.defaults.take() else {
            return;
        };
        backend.release_program(&defaults.vertex);
        backend.release_program(&defaults.color_pixel);
        backend.release_program(&defaults.texture_pixel);
    }

    pub fn defaults(&self) -> Option<&DefaultPrograms<B>> {
        self.defaults.as_ref()
    }

    // ── user programs ─────────────────────────────────────────────────────

    pub fn load_pixel_shader(&mut self, backend: &mut B, path: &Path) -> Result<PixelShaderId> {
        let name = path.to_string_lossy();
        self.pixel
            .load(&name, || compile_file(backend, ShaderStage::Pixel, path))
    }

    pub fn load_vertex_shader(&mut self, backend: &mut B, path: &Path) -> Result<VertexShaderId> {
        let name = path.to_string_lossy();
        self.vertex
            .load(&name, || compile_file(backend, ShaderStage::Vertex, path))
    }

    pub fn pixel_shader(&self, id: PixelShaderId) -> Option<&B::Program> {
        self.pixel.get(id)
    }

    pub fn vertex_shader(&self, id: VertexShaderId) -> Option<&B::Program> {
        self.vertex.get(id)
    }

    pub fn release_pixel_shader(&mut self, backend: &mut B, id: PixelShaderId) -> bool {
        self.pixel.release(id, |p| backend.release_program(p))
    }

    pub fn release_vertex_shader(&mut self, backend: &mut B, id: VertexShaderId) -> bool {
        self.vertex.release(id, |p| backend.release_program(p))
    }

    pub fn pixel_shader_count(&self) -> usize {
        self.pixel.len()
    }

    pub fn vertex_shader_count(&self) -> usize {
        self.vertex.len()
    }

    /// Releases every user program. Returns `(pixel, vertex)` counts that were live.
    pub fn clear(&mut self, backend: &mut B) -> (usize, usize) {
        let pixel = self.pixel.clear(|p| backend.release_program(p));
        let vertex = self.vertex.clear(|p| backend.release_program(p));
        (pixel, vertex)
    }

    // ── mode selection ────────────────────────────────────────────────────

    /// Program the next draw uses for `mode`.
    pub fn current_pixel_program(
        &self,
        mode: PixelShaderMode,
        custom: Option<PixelShaderId>,
    ) -> Result<&B::Program> {
        let defaults = self.require_defaults()?;
        match mode {
            PixelShaderMode::Color => Ok(&defaults.color_pixel),
            PixelShaderMode::Texture => Ok(&defaults.texture_pixel),
            PixelShaderMode::Custom => custom
                .and_then(|id| self.pixel.get(id))
                .ok_or_else(|| {
                    GraphicsError::misuse("custom pixel shader mode without a live custom shader")
                }),
        }
    }

    pub fn current_vertex_program(
        &self,
        mode: VertexShaderMode,
        custom: Option<VertexShaderId>,
    ) -> Result<&B::Program> {
        let defaults = self.require_defaults()?;
        match mode {
            VertexShaderMode::Default => Ok(&defaults.vertex),
            VertexShaderMode::Custom => custom
                .and_then(|id| self.vertex.get(id))
                .ok_or_else(|| {
                    GraphicsError::misuse("custom vertex shader mode without a live custom shader")
                }),
        }
    }

    fn require_defaults(&self) -> Result<&DefaultPrograms<B>> {
        self.defaults
            .as_ref()
            .ok_or_else(|| GraphicsError::init("built-in shaders are not compiled"))
    }
}

fn compile_file<B: GpuBackend>(backend: &mut B, stage: ShaderStage, path: &Path) -> Result<B::Program> {
    let source = std::fs::read_to_string(path).map_err(|e| {
        GraphicsError::invalid(format!("failed to read shader `{}`: {e}", path.display()))
    })?;
    let model = backend.capabilities().shader_model;
    let label = path.display().to_string();

    let program = backend
        .compile_program(stage, &label, &source, model)
        .map_err(|e| GraphicsError::backend("shader compilation failed", e))?;
    log::debug!("shader compiled: {label} ({})", model.profile(stage));
    Ok(program)
}
