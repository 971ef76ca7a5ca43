//! Quantized occluder positions and the mask channel encoding.
//!
//! Each occluder stamps its anchor point into the mask's green and blue
//! channels at 8-bit precision. The filter later compares a token's own
//! quantized position against the sampled channels, so both sides must
//! quantize identically.

use crate::math::Vec2;
use crate::scene::SceneDimensions;

/// Normalizes `n` from the `[min, max]` range into `[0, 1]`.
///
/// `min > max` is allowed and inverts the axis.
pub fn norm(n: f32, min: f32, max: f32) -> f32 {
    (n - min) / (max - min)
}

/// Snaps a normalized value to the nearest-below 8-bit step, wrapping on
/// overflow exactly like a byte store would.
pub fn quantize(n: f32) -> f32 {
    (((255.0 * n) as i32) & 255) as f32 / 255.0
}

/// An occluder anchor position quantized to mask channel precision.
///
/// `x` runs right-to-left (1.0 at the scene's left edge), `y` top-to-bottom.
/// Both are exact multiples of 1/255.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizedPosition {
    pub x: f32,
    pub y: f32,
}

impl QuantizedPosition {
    pub fn from_world(point: Vec2, dims: &SceneDimensions) -> Self {
        Self {
            x: quantize(norm(point.x, dims.width, 0.0)),
            y: quantize(norm(point.y, 0.0, dims.height)),
        }
    }

    pub(crate) fn encoded(&self) -> [f32; 2] {
        [self.x, self.y]
    }
}

/// Reference form of the stamp shader's output for one texel.
///
/// Covered texels carry `[255, x*255, y*255, 255]`; uncovered texels are
/// fully zero. Tests compare GPU mask readbacks against this.
pub fn encode_mask_pixel(covered: bool, position: QuantizedPosition) -> [u8; 4] {
    if covered {
        [
            255,
            (position.x * 255.0).round() as u8,
            (position.y * 255.0).round() as u8,
            255,
        ]
    } else {
        [0, 0, 0, 0]
    }
}
