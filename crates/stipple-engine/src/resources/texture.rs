use std::path::Path;

use slotmap::{new_key_type, SlotMap};

use crate::device::GpuBackend;
use crate::error::{GraphicsError, Result};

new_key_type! {
    /// Handle to a texture owned by [`TextureManager`].
    pub struct TextureId;
}

/// GPU image plus its shader-visible view.
///
/// Field order is drop order: the view goes before the image it was created from.
pub struct Texture<B: GpuBackend> {
    view: B::TextureView,
    image: B::Texture,
    width: u32,
    height: u32,
}

impl<B: GpuBackend> Texture<B> {
    pub fn view(&self) -> &B::TextureView {
        &self.view
    }

    pub fn image(&self) -> &B::Texture {
        &self.image
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

pub struct TextureManager<B: GpuBackend> {
    textures: SlotMap<TextureId, Texture<B>>,
}

impl<B: GpuBackend> Default for TextureManager<B> {
    fn default() -> Self {
        Self { textures: SlotMap::with_key() }
    }
}

impl<B: GpuBackend> TextureManager<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes an image file (PNG, JPEG, BMP, GIF) into an RGBA8 texture.
    pub fn load_file(&mut self, backend: &mut B, path: &Path) -> Result<TextureId> {
        let decoded = image::open(path).map_err(|e| {
            GraphicsError::invalid(format!("failed to load texture `{}`: {e}", path.display()))
        })?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();

        let id = self.load_memory(backend, rgba.as_raw(), width, height)?;
        log::debug!("texture loaded from {}: {width}x{height}", path.display());
        Ok(id)
    }

    /// Creates a texture from tightly packed RGBA8 pixels.
    pub fn load_memory(
        &mut self,
        backend: &mut B,
        rgba: &[u8],
        width: u32,
        height: u32,
    ) -> Result<TextureId> {
        if rgba.is_empty() {
            return Err(GraphicsError::invalid("texture data is empty"));
        }
        if width == 0 || height == 0 {
            return Err(GraphicsError::invalid(format!(
                "texture dimensions must be positive, got {width}x{height}"
            )));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(4))
            .ok_or_else(|| GraphicsError::invalid("texture dimensions overflow"))?;
        if rgba.len() != expected {
            return Err(GraphicsError::invalid(format!(
                "texture data is {} bytes, {width}x{height} RGBA needs {expected}",
                rgba.len()
            )));
        }

        let image = backend
            .create_texture(width, height, rgba)
            .map_err(|e| GraphicsError::backend("failed to create texture", e))?;
        let view = backend
            .create_texture_view(&image)
            .map_err(|e| GraphicsError::backend("failed to create texture view", e))?;

        let id = self.textures.insert(Texture { view, image, width, height });
        log::debug!("texture created: {id:?} ({width}x{height})");
        Ok(id)
    }

    pub fn get(&self, id: TextureId) -> Option<&Texture<B>> {
        self.textures.get(id)
    }

    pub fn view(&self, id: TextureId) -> Option<&B::TextureView> {
        self.textures.get(id).map(Texture::view)
    }

    /// Releases the view, then the image. Returns `false` for a stale id.
    pub fn release(&mut self, id: TextureId) -> bool {
        let released = self.textures.remove(id).is_some();
        if released {
            log::debug!("texture released: {id:?}");
        }
        released
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn clear(&mut self) -> usize {
        let n = self.textures.len();
        self.textures.clear();
        n
    }
}
