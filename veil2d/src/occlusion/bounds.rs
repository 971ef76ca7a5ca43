//! Opaque-pixel bounds extraction for occluder sprites.
//!
//! An occluder's anchor point depends on where its opaque pixels actually
//! sit inside the rendered sprite, not on its nominal frame. The extractor
//! renders the sprite in isolation, reads the pixels back, and scans for
//! the tight box of texels with alpha above one half. Results are cached
//! per structural fingerprint so repeated reindexes skip the GPU round
//! trip.

use std::collections::HashMap;

use anyhow::Result;

use crate::math::{Transform2D, Vec2};
use crate::render::{MaskRenderer, TextureHandle};

/// Coverage threshold: a texel counts as opaque when alpha exceeds half.
const ALPHA_THRESHOLD: u8 = 127;

/// Tight bounds of opaque texels in sprite-local pixels.
///
/// `right` and `bottom` are exclusive. `width`/`height` are the extents of
/// the measured surface itself, not the opaque box, so
/// `0 <= left < right <= width` and `0 <= top < bottom <= height`; the
/// anchor-point math needs the box edges relative to the full frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub width: u32,
    pub height: u32,
}

/// Scans tight RGBA8 pixels for the bounding box of opaque texels.
///
/// Returns `None` when no texel crosses the threshold, or when the buffer
/// does not hold `width * height` RGBA8 texels.
pub fn scan_bounds(pixels: &[u8], width: u32, height: u32) -> Option<Bounds> {
    let w = width as usize;
    if pixels.len() < w * height as usize * 4 {
        return None;
    }
    let mut left = width;
    let mut top = height;
    let mut right = 0u32;
    let mut bottom = 0u32;

    for y in 0..height as usize {
        let row = &pixels[y * w * 4..(y + 1) * w * 4];
        for x in 0..w {
            if row[x * 4 + 3] > ALPHA_THRESHOLD {
                left = left.min(x as u32);
                right = right.max(x as u32 + 1);
                top = top.min(y as u32);
                bottom = bottom.max(y as u32 + 1);
            }
        }
    }

    if right == 0 && bottom == 0 {
        return None;
    }
    Some(Bounds {
        left,
        top,
        right,
        bottom,
        width,
        height,
    })
}

/// Structural fingerprint of the inputs that determine a sprite's bounds.
///
/// Float fields are hashed by bit pattern; two sprites with bit-identical
/// geometry and the same texture share one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BoundsKey {
    texture: TextureHandle,
    size: [u32; 2],
    scale: [u32; 2],
    rotation: u32,
}

impl BoundsKey {
    fn new(texture: TextureHandle, size: Vec2, scale: Vec2, rotation: f32) -> Self {
        Self {
            texture,
            size: [size.x.to_bits(), size.y.to_bits()],
            scale: [scale.x.to_bits(), scale.y.to_bits()],
            rotation: rotation.to_bits(),
        }
    }
}

/// Caching bounds extractor.
#[derive(Default)]
pub struct BoundsExtractor {
    cache: HashMap<BoundsKey, Option<Bounds>>,
}

impl BoundsExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Measures (or recalls) the opaque bounds of a sprite rendered with
    /// the given geometry.
    ///
    /// `Ok(None)` means the sprite has no opaque texels at all.
    pub fn compute_bounds(
        &mut self,
        renderer: &MaskRenderer,
        texture: TextureHandle,
        size: Vec2,
        scale: Vec2,
        rotation: f32,
    ) -> Result<Option<Bounds>> {
        let key = BoundsKey::new(texture, size, scale, rotation);
        if let Some(bounds) = self.cache.get(&key) {
            return Ok(*bounds);
        }

        let scaled = size * scale;
        let extents = Transform2D::new(Vec2::ZERO, Vec2::ONE, rotation).rendered_extents(scaled);
        let width = extents.x.ceil() as u32;
        let height = extents.y.ceil() as u32;

        let bounds = if width == 0 || height == 0 {
            None
        } else {
            let target = renderer.render_sprite_isolated(texture, rotation, scaled, (width, height))?;
            let pixels = renderer.read_target(&target)?;
            target.destroy();
            scan_bounds(&pixels, width, height)
        };

        self.cache.insert(key, bounds);
        Ok(bounds)
    }

    /// Drops every cached result measured from the given texture.
    pub fn invalidate_texture(&mut self, texture: TextureHandle) {
        self.cache.retain(|key, _| key.texture != texture);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    #[cfg(test)]
    fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}
