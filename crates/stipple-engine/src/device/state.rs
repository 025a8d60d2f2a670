//! Draw-state modes selectable between draw calls.
//!
//! Every mode has a stable `u32` ordinal. Setters on the orchestrator accept either the
//! typed value or the raw ordinal; an unknown ordinal is rejected before any state changes.

use crate::error::GraphicsError;

macro_rules! ordinal_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $name {
            /// Every variant in ordinal order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Number of variants; sizes the state-object tables.
            pub const COUNT: usize = Self::ALL.len();

            #[inline]
            pub const fn index(self) -> usize {
                self as usize
            }
        }

        impl TryFrom<u32> for $name {
            type Error = GraphicsError;

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(GraphicsError::invalid(format!(
                        concat!("unknown ", stringify!($name), " value {}"),
                        other
                    ))),
                }
            }
        }
    };
}

ordinal_enum! {
    /// How a drawn primitive combines with the render target.
    pub enum BlendMode {
        /// Overwrite; blending disabled.
        #[default]
        None = 0,
        /// Source-alpha blending.
        Blend = 1,
        /// Additive.
        Add = 2,
        /// Multiply by the source color.
        Multiply = 3,
    }
}

ordinal_enum! {
    /// Texture filtering.
    pub enum SampleMode {
        #[default]
        Linear = 0,
        Point = 1,
    }
}

ordinal_enum! {
    /// Texture edge handling outside `[0, 1]`.
    pub enum AddressMode {
        #[default]
        Wrap = 0,
        Mirror = 1,
        Clamp = 2,
        MirrorOnce = 3,
    }
}

ordinal_enum! {
    /// Which pixel program the next draw uses.
    pub enum PixelShaderMode {
        /// Vertex color with tint and alpha.
        #[default]
        Color = 0,
        /// Bound texture modulated by vertex color.
        Texture = 1,
        /// The program set with `set_custom_pixel_shader`.
        Custom = 2,
    }
}

ordinal_enum! {
    /// Which vertex program the next draw uses.
    pub enum VertexShaderMode {
        #[default]
        Default = 0,
        Custom = 1,
    }
}

ordinal_enum! {
    /// How a mesh's vertices assemble into primitives.
    pub enum Topology {
        #[default]
        TriangleList = 0,
        TriangleStrip = 1,
        LineList = 2,
        LineStrip = 3,
        PointList = 4,
    }
}

impl PixelShaderMode {
    /// Returns `true` if the program samples the bound texture.
    #[inline]
    pub fn uses_texture(self) -> bool {
        !matches!(self, Self::Color)
    }
}

impl Topology {
    #[inline]
    pub fn is_strip(self) -> bool {
        matches!(self, Self::TriangleStrip | Self::LineStrip)
    }
}

/// Converts a typed mode or a raw ordinal, mapping failures to `InvalidParameter`.
pub(crate) fn resolve<M, T>(value: M) -> crate::error::Result<T>
where
    M: TryInto<T>,
    M::Error: Into<GraphicsError>,
{
    value.try_into().map_err(Into::into)
}
