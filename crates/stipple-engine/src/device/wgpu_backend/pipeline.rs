//! Render-pipeline construction and the fixed-function state mappings.

use anyhow::{Context, Result};

use crate::device::constants::{PerObjectConstants, Vertex};
use crate::device::state::{AddressMode, BlendMode, SampleMode, Topology};
use crate::device::wgsl::ENTRY_POINT;

pub(crate) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Pipelines are cached per program pair and fixed-function state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub vertex: u64,
    pub pixel: u64,
    pub blend: BlendMode,
    pub topology: Topology,
}

/// Layouts shared by every pipeline.
///
/// - group 0: per-object uniform block, dynamic offset, both stages
/// - group 1: texture + sampler, pixel stage
pub(crate) struct Layouts {
    pub uniforms: wgpu::BindGroupLayout,
    pub texture: wgpu::BindGroupLayout,
    pub pipeline: wgpu::PipelineLayout,
}

impl Layouts {
    pub fn new(device: &wgpu::Device) -> Result<Self> {
        let constants_size = wgpu::BufferSize::new(PerObjectConstants::SIZE as u64)
            .context("per-object constants have zero size")?;

        let uniforms = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("stipple per-object bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: Some(constants_size),
                },
                count: None,
            }],
        });

        let texture = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("stipple texture bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("stipple pipeline layout"),
            bind_group_layouts: &[&uniforms, &texture],
            immediate_size: 0,
        });

        Ok(Self { uniforms, texture, pipeline })
    }
}

pub(crate) fn create_pipeline(
    device: &wgpu::Device,
    layouts: &Layouts,
    format: wgpu::TextureFormat,
    primitive: wgpu::PrimitiveState,
    key: PipelineKey,
    vertex: &wgpu::ShaderModule,
    pixel: &wgpu::ShaderModule,
) -> wgpu::RenderPipeline {
    log::debug!("building pipeline {key:?}");

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("stipple mesh pipeline"),
        layout: Some(&layouts.pipeline),

        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some(ENTRY_POINT),
            compilation_options: Default::default(),
            buffers: &[Vertex::layout()],
        },

        fragment: Some(wgpu::FragmentState {
            module: pixel,
            entry_point: Some(ENTRY_POINT),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: blend_state(key.blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),

        primitive: wgpu::PrimitiveState {
            topology: primitive_topology(key.topology),
            strip_index_format: key.topology.is_strip().then_some(wgpu::IndexFormat::Uint32),
            ..primitive
        },

        depth_stencil: Some(depth_state()),
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}

/// Depth test and write, nearer fragments win. A later draw at an equal depth is rejected.
pub(crate) fn depth_state() -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: true,
        depth_compare: wgpu::CompareFunction::Less,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

pub(crate) fn depth_descriptor(width: u32, height: u32) -> wgpu::TextureDescriptor<'static> {
    wgpu::TextureDescriptor {
        label: Some("stipple depth buffer"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    }
}

/// Solid fill, no culling.
pub(crate) fn rasterizer_state() -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        topology: wgpu::PrimitiveTopology::TriangleList,
        strip_index_format: None,
        front_face: wgpu::FrontFace::Ccw,
        cull_mode: None,
        polygon_mode: wgpu::PolygonMode::Fill,
        unclipped_depth: false,
        conservative: false,
    }
}

// ── blend ─────────────────────────────────────────────────────────────────

/// Color factors per mode. Alpha always takes the source value unchanged.
pub(crate) fn blend_state(mode: BlendMode) -> Option<wgpu::BlendState> {
    let (src, dst) = match mode {
        BlendMode::None => return None,
        BlendMode::Blend => (wgpu::BlendFactor::SrcAlpha, wgpu::BlendFactor::OneMinusSrcAlpha),
        BlendMode::Add => (wgpu::BlendFactor::One, wgpu::BlendFactor::One),
        BlendMode::Multiply => (wgpu::BlendFactor::Src, wgpu::BlendFactor::Zero),
    };
    Some(wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: src,
            dst_factor: dst,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::Zero,
            operation: wgpu::BlendOperation::Add,
        },
    })
}

// ── sampler ───────────────────────────────────────────────────────────────

pub(crate) fn filter_mode(mode: SampleMode) -> wgpu::FilterMode {
    match mode {
        SampleMode::Linear => wgpu::FilterMode::Linear,
        SampleMode::Point => wgpu::FilterMode::Nearest,
    }
}

/// wgpu has no mirror-once mode; mirror-repeat is the closest match.
pub(crate) fn address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::Wrap => wgpu::AddressMode::Repeat,
        AddressMode::Mirror | AddressMode::MirrorOnce => wgpu::AddressMode::MirrorRepeat,
        AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
    }
}

pub(crate) fn sampler_descriptor(
    sample: SampleMode,
    address: AddressMode,
) -> wgpu::SamplerDescriptor<'static> {
    let filter = filter_mode(sample);
    let address = address_mode(address);
    wgpu::SamplerDescriptor {
        label: Some("stipple sampler"),
        address_mode_u: address,
        address_mode_v: address,
        address_mode_w: address,
        mag_filter: filter,
        min_filter: filter,
        ..Default::default()
    }
}

// ── topology ──────────────────────────────────────────────────────────────

pub(crate) fn primitive_topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        Topology::LineList => wgpu::PrimitiveTopology::LineList,
        Topology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        Topology::PointList => wgpu::PrimitiveTopology::PointList,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_disables_blending() {
        assert!(blend_state(BlendMode::None).is_none());
    }

    #[test]
    fn blend_factors_per_mode() {
        let blend = blend_state(BlendMode::Blend).unwrap();
        assert_eq!(blend.color.src_factor, wgpu::BlendFactor::SrcAlpha);
        assert_eq!(blend.color.dst_factor, wgpu::BlendFactor::OneMinusSrcAlpha);

        let add = blend_state(BlendMode::Add).unwrap();
        assert_eq!((add.color.src_factor, add.color.dst_factor), (wgpu::BlendFactor::One, wgpu::BlendFactor::One));

        let mul = blend_state(BlendMode::Multiply).unwrap();
        assert_eq!(mul.color.src_factor, wgpu::BlendFactor::Src);
        assert_eq!(mul.alpha.dst_factor, wgpu::BlendFactor::Zero);
    }

    #[test]
    fn mirror_once_approximated() {
        assert_eq!(address_mode(AddressMode::MirrorOnce), wgpu::AddressMode::MirrorRepeat);
        assert_eq!(address_mode(AddressMode::Clamp), wgpu::AddressMode::ClampToEdge);
    }

    #[test]
    fn point_sampling_is_nearest() {
        let desc = sampler_descriptor(SampleMode::Point, AddressMode::Wrap);
        assert_eq!(desc.mag_filter, wgpu::FilterMode::Nearest);
        assert_eq!(desc.address_mode_u, wgpu::AddressMode::Repeat);
    }

    #[test]
    fn depth_test_keeps_nearer_layers() {
        let depth = depth_state();
        assert_eq!(depth.format, DEPTH_FORMAT);
        assert!(depth.depth_write_enabled);
        assert_eq!(depth.depth_compare, wgpu::CompareFunction::Less);

        let desc = depth_descriptor(0, 480);
        assert_eq!((desc.size.width, desc.size.height), (1, 480));
        assert_eq!(desc.format, DEPTH_FORMAT);
    }

    #[test]
    fn rasterizer_is_solid_without_culling() {
        let p = rasterizer_state();
        assert_eq!(p.cull_mode, None);
        assert_eq!(p.polygon_mode, wgpu::PolygonMode::Fill);
    }
}
