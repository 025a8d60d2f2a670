//! Application-owned GPU resources.
//!
//! Each manager stores its resources in a `SlotMap` and hands out `Copy` keys. A key
//! stays valid until the matching release; released keys never alias later resources.

mod mesh;
mod shader;
mod texture;

pub use mesh::{DrawBindings, Mesh, MeshId, MeshManager};
pub use shader::{DefaultPrograms, PixelShaderId, ShaderManager, VertexShaderId};
pub use texture::{Texture, TextureId, TextureManager};
