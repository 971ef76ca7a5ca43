//! Veil2D: dynamic per-pixel occlusion masking for 2D tabletop renderers.
//!
//! Tiles flagged as occluders are composited into a shared scene-sized mask
//! texture. Each mask texel encodes the stamping occluder's quantized anchor
//! position in its green/blue channels; a per-token filter samples the mask
//! and replaces occluded token pixels with an outline glow or a flat fill,
//! so tokens stay readable behind overhead tiles.
//!
//! Entry points: [`render::GpuContext`] and [`render::MaskRenderer`] own the
//! GPU side, [`occlusion::OcclusionIndex`] tracks occluders and the mask,
//! and [`occlusion::TokenMaskFilter`] applies the per-token pass.

pub mod flags;
pub mod math;
pub mod occlusion;
pub mod render;
pub mod scene;

pub use occlusion::{OcclusionIndex, TokenMaskFilter};
pub use render::{GpuContext, MaskRenderer};
pub use scene::{Scene, SceneDimensions, TileDocument, TileId, TokenDocument, TokenId};
