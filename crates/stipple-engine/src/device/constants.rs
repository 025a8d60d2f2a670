//! CPU mirrors of the GPU-visible data layouts.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2};

use crate::coords::ColorRgba;

/// One mesh vertex as the vertex programs consume it.
///
/// Layout (32-byte stride):
/// - location 0: position `f32x2`
/// - location 1: color `f32x4`
/// - location 2: texture coordinate `f32x2`
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x4, 2 => Float32x2];

    pub fn new(position: Vec2, color: ColorRgba, tex_coord: Vec2) -> Self {
        Self {
            position: position.to_array(),
            color: color.to_array(),
            tex_coord: tex_coord.to_array(),
        }
    }

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Per-draw uniform block, bound at `@group(0) @binding(0)`.
///
/// Matrices are column-major. The trailing padding rounds the block to 176 bytes so the
/// WGSL struct and this one agree under uniform layout rules.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct PerObjectConstants {
    pub world: [[f32; 4]; 4],
    pub transform: [[f32; 4]; 4],
    pub tint: [f32; 4],
    pub tex_offset: [f32; 2],
    pub alpha: f32,
    pub z_layer: f32,
    pub shader_data: f32,
    pub _pad: [f32; 3],
}

impl Default for PerObjectConstants {
    fn default() -> Self {
        Self {
            world: Mat4::IDENTITY.to_cols_array_2d(),
            transform: Mat4::IDENTITY.to_cols_array_2d(),
            tint: ColorRgba::zero().to_array(),
            tex_offset: [0.0; 2],
            alpha: 1.0,
            z_layer: 0.0,
            shader_data: 0.0,
            _pad: [0.0; 3],
        }
    }
}

impl PerObjectConstants {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    #[inline]
    pub fn set_world(&mut self, m: Mat4) {
        self.world = m.to_cols_array_2d();
    }

    #[inline]
    pub fn set_transform(&mut self, m: Mat4) {
        self.transform = m.to_cols_array_2d();
    }

    #[inline]
    pub fn world(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.world)
    }

    #[inline]
    pub fn transform(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.transform)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_stride_is_32_bytes() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(Vertex::layout().array_stride, 32);
        assert_eq!(Vertex::ATTRIBUTES[1].offset, 8);
        assert_eq!(Vertex::ATTRIBUTES[2].offset, 24);
    }

    #[test]
    fn constant_block_is_176_bytes() {
        assert_eq!(PerObjectConstants::SIZE, 176);
        assert_eq!(PerObjectConstants::default().as_bytes().len(), 176);
    }

    #[test]
    fn defaults_are_neutral() {
        let c = PerObjectConstants::default();
        assert_eq!(c.world(), Mat4::IDENTITY);
        assert_eq!(c.transform(), Mat4::IDENTITY);
        assert_eq!(c.alpha, 1.0);
        assert_eq!(c.tint, [0.0; 4]);
    }

    #[test]
    fn world_matrix_stored_column_major() {
        let mut c = PerObjectConstants::default();
        c.set_world(Mat4::from_translation(glam::Vec3::new(3.0, 4.0, 0.0)));
        assert_eq!(c.world[3], [3.0, 4.0, 0.0, 1.0]);
    }
}
