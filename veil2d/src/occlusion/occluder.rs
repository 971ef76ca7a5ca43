//! Occluder sprite records tracked by the index.

use anyhow::Result;
use glam::Mat4;

use crate::math::{Transform2D, Vec2};
use crate::render::{MaskRenderer, TextureHandle};
use crate::scene::{SceneDimensions, TileDocument, TileId};

use super::bounds::{Bounds, BoundsExtractor};
use super::encoding::QuantizedPosition;

/// A tile's occluder sprite: a copy of the tile's render state plus its
/// measured, quantized anchor position.
///
/// The sprite deliberately snapshots the tile document rather than borrowing
/// it, so the mask can be rebuilt without touching the scene.
#[derive(Debug, Clone)]
pub struct OccluderSprite {
    pub tile_id: TileId,
    pub texture: TextureHandle,
    /// World position of the tile's anchor point.
    pub position: Vec2,
    pub size: Vec2,
    pub anchor: Vec2,
    pub scale: Vec2,
    pub rotation: f32,
    pub z_index: i32,
    pub alpha: f32,
    /// Quantized anchor position; `None` until measured or when the sprite
    /// has no opaque pixels.
    pub encoded: Option<QuantizedPosition>,
}

impl OccluderSprite {
    pub fn from_tile(tile: &TileDocument) -> Self {
        Self {
            tile_id: tile.id.clone(),
            texture: tile.texture,
            position: tile.position,
            size: tile.size,
            anchor: tile.anchor,
            scale: tile.scale,
            rotation: tile.rotation,
            z_index: tile.z_index,
            alpha: tile.alpha,
            encoded: None,
        }
    }

    /// Re-copies the tile's render state, dropping the stale encoding.
    pub fn copy_tile(&mut self, tile: &TileDocument) {
        self.texture = tile.texture;
        self.position = tile.position;
        self.size = tile.size;
        self.anchor = tile.anchor;
        self.scale = tile.scale;
        self.rotation = tile.rotation;
        self.z_index = tile.z_index;
        self.alpha = tile.alpha;
        self.encoded = None;
    }

    /// World position stamped into the mask channels: the tile origin
    /// offset by the opaque box's left and bottom edges, re-centered on the
    /// measured frame (`bounds.width`/`height` are the frame extents).
    pub fn anchor_point(&self, bounds: &Bounds) -> Vec2 {
        let origin = self.position - self.anchor * (self.size * self.scale);
        Vec2::new(
            origin.x + bounds.left as f32 - bounds.width as f32 * 0.5,
            origin.y + bounds.height as f32 * 0.5
                - (bounds.height as f32 - bounds.bottom as f32),
        )
    }

    /// Measures opaque bounds and derives the quantized anchor position.
    ///
    /// Leaves `encoded` as `None` when the sprite is fully transparent.
    pub fn measure_and_encode(
        &mut self,
        renderer: &MaskRenderer,
        extractor: &mut BoundsExtractor,
        dims: &SceneDimensions,
    ) -> Result<()> {
        let bounds =
            extractor.compute_bounds(renderer, self.texture, self.size, self.scale, self.rotation)?;
        self.encoded =
            bounds.map(|b| QuantizedPosition::from_world(self.anchor_point(&b), dims));
        Ok(())
    }

    /// Model matrix placing the sprite in scene pixel space for stamping.
    pub(crate) fn model_matrix(&self) -> Mat4 {
        Transform2D::new(self.position, self.scale, self.rotation)
            .to_matrix(self.size, self.anchor)
    }
}
