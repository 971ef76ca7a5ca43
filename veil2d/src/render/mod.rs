pub mod backend;
pub mod context;
pub mod readback;
pub mod texture;

pub use backend::MaskRenderer;
pub use context::GpuContext;
pub use texture::{RenderTarget, TextureHandle};

pub(crate) use backend::{FilterUniforms, StampDraw};
