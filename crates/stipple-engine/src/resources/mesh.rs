use slotmap::{new_key_type, SlotMap};

use crate::device::{GpuBackend, Gpu, Topology, Vertex};
use crate::error::{GraphicsError, Result};

new_key_type! {
    /// Handle to a mesh owned by [`MeshManager`].
    pub struct MeshId;
}

/// Immutable geometry: GPU buffers plus the CPU copies they were built from.
pub struct Mesh<B: GpuBackend> {
    vertex_buffer: B::Buffer,
    index_buffer: Option<B::Buffer>,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl<B: GpuBackend> Mesh<B> {
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_some()
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }
}

/// Programs and texture bound for one draw.
pub struct DrawBindings<'a, B: GpuBackend> {
    pub vertex_program: &'a B::Program,
    pub pixel_program: &'a B::Program,
    /// `None` explicitly unbinds any previous texture.
    pub texture: Option<&'a B::TextureView>,
}

#[derive(Debug, Default)]
enum BuildState {
    #[default]
    Idle,
    Building(Vec<Vertex>),
}

/// Mesh builder plus the table of live meshes.
///
/// Build bracket: `start_mesh`, any number of `add_vertex`, then `end_mesh` or
/// `end_mesh_indexed`. Only one build can be in flight. Ending a build always consumes
/// the accumulated vertices, whether or not a mesh was produced.
pub struct MeshManager<B: GpuBackend> {
    meshes: SlotMap<MeshId, Mesh<B>>,
    build: BuildState,
}

impl<B: GpuBackend> Default for MeshManager<B> {
    fn default() -> Self {
        Self {
            meshes: SlotMap::with_key(),
            build: BuildState::Idle,
        }
    }
}

impl<B: GpuBackend> MeshManager<B> {
    pub fn new() -> Self {
        Self::default()
    }

    // ── build bracket ─────────────────────────────────────────────────────

    pub fn is_building(&self) -> bool {
        matches!(self.build, BuildState::Building(_))
    }

    /// Starts a new build. Fails without touching the build already in flight.
    pub fn start_mesh(&mut self) -> Result<()> {
        if self.is_building() {
            return Err(GraphicsError::misuse(
                "start_mesh called while a mesh build is already in progress",
            ));
        }
        self.build = BuildState::Building(Vec::new());
        Ok(())
    }

    pub fn add_vertex(&mut self, vertex: Vertex) -> Result<()> {
        let BuildState::Building(vertices) = &mut self.build else {
            return Err(GraphicsError::misuse("add_vertex called without start_mesh"));
        };
        vertices.push(vertex);
        Ok(())
    }

    /// Vertices accumulated by the build in flight.
    pub fn pending_vertices(&self) -> usize {
        match &self.build {
            BuildState::Building(v) => v.len(),
            BuildState::Idle => 0,
        }
    }

    /// Finishes the build as a non-indexed mesh.
    pub fn end_mesh(&mut self, backend: &mut B) -> Result<MeshId> {
        let vertices = self.take_build("end_mesh")?;
        let vertex_buffer = create_vertex_buffer(backend, &vertices)?;

        let id = self.meshes.insert(Mesh {
            vertex_buffer,
            index_buffer: None,
            vertices,
            indices: Vec::new(),
        });
        log::debug!("mesh created: {id:?}");
        Ok(id)
    }

    /// Finishes the build as an indexed mesh. Every index must address a built vertex.
    pub fn end_mesh_indexed(&mut self, backend: &mut B, indices: &[u32]) -> Result<MeshId> {
        let vertices = self.take_build("end_mesh_indexed")?;

        if indices.is_empty() {
            return Err(GraphicsError::invalid("indexed mesh needs at least one index"));
        }
        if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(GraphicsError::invalid(format!(
                "index {bad} out of range for {} vertices",
                vertices.len()
            )));
        }

        let vertex_buffer = create_vertex_buffer(backend, &vertices)?;
        let index_buffer = backend
            .create_index_buffer(indices)
            .map_err(|e| GraphicsError::backend("failed to create index buffer", e))?;

        let id = self.meshes.insert(Mesh {
            vertex_buffer,
            index_buffer: Some(index_buffer),
            vertices,
            indices: indices.to_vec(),
        });
        log::debug!("indexed mesh created: {id:?} ({} indices)", indices.len());
        Ok(id)
    }

    fn take_build(&mut self, call: &str) -> Result<Vec<Vertex>> {
        match std::mem::take(&mut self.build) {
            BuildState::Idle => Err(GraphicsError::misuse(format!(
                "{call} called without start_mesh"
            ))),
            BuildState::Building(v) if v.is_empty() => Err(GraphicsError::invalid(format!(
                "{call}: couldn't create mesh, no vertices added"
            ))),
            BuildState::Building(v) => Ok(v),
        }
    }

    // ── table ─────────────────────────────────────────────────────────────

    pub fn get(&self, id: MeshId) -> Option<&Mesh<B>> {
        self.meshes.get(id)
    }

    /// Releases the mesh's buffers and CPU copies. Returns `false` for a stale id.
    pub fn release(&mut self, id: MeshId) -> bool {
        let released = self.meshes.remove(id).is_some();
        if released {
            log::debug!("mesh released: {id:?}");
        }
        released
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Releases every mesh and abandons any build in flight. Returns how many were live.
    pub fn clear(&mut self) -> usize {
        let n = self.meshes.len();
        self.meshes.clear();
        self.build = BuildState::Idle;
        n
    }

    // ── draw ──────────────────────────────────────────────────────────────

    /// Binds `bindings` and the mesh buffers, pushes the per-draw constants, and draws.
    ///
    /// `topology = None` keeps whatever topology was last bound.
    pub fn draw(
        &self,
        id: MeshId,
        topology: Option<Topology>,
        bindings: DrawBindings<'_, B>,
        gpu: &mut Gpu<B>,
    ) -> Result<()> {
        let mesh = self
            .meshes
            .get(id)
            .ok_or_else(|| GraphicsError::invalid(format!("draw of released mesh {id:?}")))?;

        {
            let backend = gpu.context()?;
            if let Some(topology) = topology {
                backend.set_topology(topology);
            }
            backend.set_vertex_program(bindings.vertex_program);
            backend.set_pixel_program(bindings.pixel_program);
            backend.set_shader_resource(bindings.texture);
            backend.set_vertex_buffer(&mesh.vertex_buffer);
            backend.set_index_buffer(mesh.index_buffer.as_ref());
        }

        gpu.update_constant_buffer()?;

        let backend = gpu.context()?;
        if mesh.is_indexed() {
            backend.draw_indexed(mesh.index_count());
        } else {
            backend.draw(mesh.vertex_count());
        }
        Ok(())
    }
}

fn create_vertex_buffer<B: GpuBackend>(backend: &mut B, vertices: &[Vertex]) -> Result<B::Buffer> {
    backend
        .create_vertex_buffer(vertices)
        .map_err(|e| GraphicsError::backend("failed to create vertex buffer", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::ColorRgba;
    use crate::device::{FailStep, HeadlessBackend};
    use glam::Vec2;

    fn backend() -> HeadlessBackend {
        let mut b = HeadlessBackend::new(64, 64);
        b.create_device().unwrap();
        b
    }

    fn v(x: f32, y: f32) -> Vertex {
        Vertex::new(Vec2::new(x, y), ColorRgba::white(), Vec2::ZERO)
    }

    fn build_triangle(meshes: &mut MeshManager<HeadlessBackend>) {
        meshes.start_mesh().unwrap();
        meshes.add_vertex(v(0.0, 0.0)).unwrap();
        meshes.add_vertex(v(1.0, 0.0)).unwrap();
        meshes.add_vertex(v(0.0, 1.0)).unwrap();
    }

    // ── bracket ───────────────────────────────────────────────────────────

    #[test]
    fn triangle_build_creates_mesh() {
        let mut b = backend();
        let mut meshes = MeshManager::new();
        build_triangle(&mut meshes);
        let id = meshes.end_mesh(&mut b).unwrap();

        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes.get(id).unwrap().vertex_count(), 3);
        assert!(!meshes.get(id).unwrap().is_indexed());
        assert!(!meshes.is_building());
    }

    #[test]
    fn end_without_start_is_misuse() {
        let mut b = backend();
        let mut meshes = MeshManager::new();
        assert!(matches!(meshes.end_mesh(&mut b), Err(GraphicsError::StateMisuse(_))));
        assert!(matches!(
            meshes.end_mesh_indexed(&mut b, &[0]),
            Err(GraphicsError::StateMisuse(_))
        ));
        assert!(meshes.is_empty());
    }

    #[test]
    fn end_with_no_vertices_fails_and_returns_to_idle() {
        let mut b = backend();
        let mut meshes = MeshManager::new();
        meshes.start_mesh().unwrap();
        assert!(meshes.end_mesh(&mut b).is_err());
        assert!(meshes.is_empty());
        assert!(!meshes.is_building());
    }

    #[test]
    fn add_vertex_outside_build_is_ignored() {
        let mut meshes = MeshManager::<HeadlessBackend>::new();
        assert!(meshes.add_vertex(v(0.0, 0.0)).is_err());
        assert_eq!(meshes.pending_vertices(), 0);
    }

    #[test]
    fn nested_start_keeps_build_in_flight() {
        let mut meshes = MeshManager::<HeadlessBackend>::new();
        meshes.start_mesh().unwrap();
        meshes.add_vertex(v(0.0, 0.0)).unwrap();
        assert!(matches!(meshes.start_mesh(), Err(GraphicsError::StateMisuse(_))));
        assert_eq!(meshes.pending_vertices(), 1);
    }

    // ── indexed ───────────────────────────────────────────────────────────

    #[test]
    fn indexed_mesh_keeps_indices() {
        let mut b = backend();
        let mut meshes = MeshManager::new();
        build_triangle(&mut meshes);
        let id = meshes.end_mesh_indexed(&mut b, &[0, 1, 2, 2, 1, 0]).unwrap();
        let mesh = meshes.get(id).unwrap();
        assert!(mesh.is_indexed());
        assert_eq!(mesh.index_count(), 6);
        assert_eq!(mesh.indices(), &[0, 1, 2, 2, 1, 0]);
    }

    #[test]
    fn indexed_mesh_rejects_empty_and_out_of_range() {
        let mut b = backend();
        let mut meshes = MeshManager::new();

        build_triangle(&mut meshes);
        assert!(matches!(
            meshes.end_mesh_indexed(&mut b, &[]),
            Err(GraphicsError::InvalidParameter(_))
        ));

        build_triangle(&mut meshes);
        assert!(matches!(
            meshes.end_mesh_indexed(&mut b, &[0, 1, 3]),
            Err(GraphicsError::InvalidParameter(_))
        ));
        assert!(meshes.is_empty());
    }

    // ── release ───────────────────────────────────────────────────────────

    #[test]
    fn release_frees_gpu_buffers_once() {
        let mut b = backend();
        let probe = b.probe();
        let mut meshes = MeshManager::new();
        build_triangle(&mut meshes);
        let id = meshes.end_mesh_indexed(&mut b, &[0, 1, 2]).unwrap();
        assert_eq!(probe.live_objects(), 2);

        assert!(meshes.release(id));
        assert_eq!(probe.live_objects(), 0);
        assert!(!meshes.release(id));
    }

    #[test]
    fn buffer_failure_creates_nothing() {
        let mut b = backend();
        let probe = b.probe();
        let mut meshes = MeshManager::new();
        probe.fail_on(FailStep::IndexBuffer);
        build_triangle(&mut meshes);
        assert!(matches!(
            meshes.end_mesh_indexed(&mut b, &[0, 1, 2]),
            Err(GraphicsError::Initialization(_))
        ));
        assert_eq!(probe.live_objects(), 0);
        assert!(meshes.is_empty());
    }
}
