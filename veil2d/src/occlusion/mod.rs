//! Dynamic per-pixel occlusion masking.
//!
//! Flagged tiles are stamped into a scene-sized mask texture whose channels
//! carry each occluder's quantized anchor position; token filters sample
//! the mask and outline or tint the pixels that sit behind an occluder.

pub mod bounds;
pub mod encoding;
pub mod filter;
pub mod index;
pub mod occluder;

pub use bounds::{scan_bounds, Bounds, BoundsExtractor};
pub use encoding::{encode_mask_pixel, norm, quantize, QuantizedPosition};
pub use filter::{EffectChain, TokenEffect, TokenMaskFilter};
pub use index::{OccluderRecord, OcclusionIndex};
pub use occluder::OccluderSprite;
