use crate::coords::ColorRgba;
use crate::device::{AddressMode, BlendMode, SampleMode};

/// Draw state applied right after initialization.
#[derive(Debug, Clone)]
pub struct GraphicsConfig {
    /// Clear color used by every `start_drawing`.
    pub background: ColorRgba,
    pub blend_mode: BlendMode,
    pub sample_mode: SampleMode,
    pub address_mode: AddressMode,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            background: ColorRgba::rgb(0.1, 0.1, 0.1),
            blend_mode: BlendMode::None,
            sample_mode: SampleMode::Linear,
            address_mode: AddressMode::Wrap,
        }
    }
}

/// Live application resources, for leak accounting.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub meshes: usize,
    pub textures: usize,
    pub pixel_shaders: usize,
    pub vertex_shaders: usize,
}

impl ResourceCounts {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// One message naming every non-zero category, or `None` when nothing leaked.
    pub fn leak_message(&self) -> Option<String> {
        let parts: Vec<String> = [
            (self.meshes, "mesh", "meshes"),
            (self.textures, "texture", "textures"),
            (self.pixel_shaders, "pixel shader", "pixel shaders"),
            (self.vertex_shaders, "vertex shader", "vertex shaders"),
        ]
        .into_iter()
        .filter(|&(n, _, _)| n > 0)
        .map(|(n, one, many)| format!("{n} {}", if n == 1 { one } else { many }))
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(format!("not all resources were released: {}", parts.join(", ")))
        }
    }
}
