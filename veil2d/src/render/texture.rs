use wgpu::{Texture, TextureView};

/// Opaque handle used to reference textures owned by the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u32);

/// Offscreen render target: texture, default view, and pixel size.
///
/// Targets are plain RGBA8 (linear) so mask channel values survive readback
/// byte-for-byte. Dropping the target releases the GPU allocation; temporary
/// targets used during bounds extraction rely on this for scoped cleanup.
pub struct RenderTarget {
    pub(crate) texture: Texture,
    pub(crate) view: TextureView,
    pub(crate) size: (u32, u32),
}

impl RenderTarget {
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Explicitly frees the GPU allocation ahead of drop.
    pub fn destroy(&self) {
        self.texture.destroy();
    }
}
