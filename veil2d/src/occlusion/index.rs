//! The occlusion index: registry of occluder sprites and owner of the
//! shared mask texture.
//!
//! Tile lifecycle notifications arrive as id-based method calls against the
//! scene; a notification for an id the scene or registry does not know is a
//! no-op, never an error. Every registry mutation triggers a full mask
//! rebuild, and rebuilds are idempotent: two reindexes of the same registry
//! produce bit-identical masks. Tokens never read the registry directly,
//! only the rendered mask and the quantized position side buffer.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use log::debug;

use crate::math::pixel_projection;
use crate::render::{MaskRenderer, RenderTarget, StampDraw, TextureHandle};
use crate::scene::{Scene, SceneDimensions, TileId, TokenId};

use super::bounds::BoundsExtractor;
use super::encoding::QuantizedPosition;
use super::filter::{TokenEffect, TokenMaskFilter};
use super::occluder::OccluderSprite;

/// One tracked occluder.
#[derive(Debug, Clone)]
pub struct OccluderRecord {
    pub sprite: OccluderSprite,
    /// Compositing slot reserved for the stamping pass. Draw order alone
    /// determines the composite today, so this is never assigned.
    pub slot_index: Option<u32>,
}

/// Registry of occluder sprites plus the shared mask render target.
pub struct OcclusionIndex {
    dims: SceneDimensions,
    records: HashMap<TileId, OccluderRecord>,
    /// Quantized anchor positions of every measured occluder, rebuilt on
    /// each reindex. Read-only side buffer for diagnostics and tests.
    positions: HashMap<TileId, QuantizedPosition>,
    bounds: BoundsExtractor,
    /// Created lazily on the first rebuild; `None` means no valid mask
    /// exists yet and token filters must pass through.
    mask: Option<RenderTarget>,
}

impl OcclusionIndex {
    pub fn new(dims: SceneDimensions) -> Self {
        Self {
            dims,
            records: HashMap::new(),
            positions: HashMap::new(),
            bounds: BoundsExtractor::new(),
            mask: None,
        }
    }

    pub fn dimensions(&self) -> SceneDimensions {
        self.dims
    }

    /// The shared mask, if a rebuild has happened.
    pub fn mask(&self) -> Option<&RenderTarget> {
        self.mask.as_ref()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn record(&self, id: &TileId) -> Option<&OccluderRecord> {
        self.records.get(id)
    }

    /// Quantized anchor position of a measured occluder.
    pub fn position_of(&self, id: &TileId) -> Option<QuantizedPosition> {
        self.positions.get(id).copied()
    }

    /// Registers a tile's occluder sprite and rebuilds the mask.
    ///
    /// An id the scene does not know is ignored.
    pub fn add_occluder(
        &mut self,
        renderer: &MaskRenderer,
        scene: &Scene,
        id: &TileId,
    ) -> Result<()> {
        let Some(tile) = scene.tile(id) else {
            return Ok(());
        };
        self.records.insert(
            id.clone(),
            OccluderRecord {
                sprite: OccluderSprite::from_tile(tile),
                slot_index: None,
            },
        );
        self.reindex(renderer, scene)
    }

    /// Drops a tile's occluder sprite and rebuilds the mask.
    ///
    /// Removing an unknown id leaves the index untouched.
    pub fn remove_occluder(
        &mut self,
        renderer: &MaskRenderer,
        scene: &Scene,
        id: &TileId,
    ) -> Result<()> {
        if self.records.remove(id).is_none() {
            return Ok(());
        }
        self.positions.remove(id);
        self.reindex(renderer, scene)
    }

    /// Re-copies a changed tile into its record and rebuilds the mask.
    ///
    /// A tile with no record is silently ignored; the add path is the only
    /// way into the registry, so a tile flagged as occluder after creation
    /// stays untracked until something adds it.
    pub fn update_occluder(
        &mut self,
        renderer: &MaskRenderer,
        scene: &Scene,
        id: &TileId,
    ) -> Result<()> {
        let Some(tile) = scene.tile(id) else {
            return Ok(());
        };
        let Some(record) = self.records.get_mut(id) else {
            return Ok(());
        };
        // The tile's pixels may have changed under the same handle.
        self.bounds.invalidate_texture(record.sprite.texture);
        record.sprite.copy_tile(tile);
        self.reindex(renderer, scene)
    }

    /// Toggles an occluder's contribution by forcing its alpha to 1 or 0.
    ///
    /// A tile without a record is materialized through the add path first
    /// (which rebuilds); for an existing record this is only a field write
    /// and the next reindex picks it up.
    pub fn set_visible(
        &mut self,
        renderer: &MaskRenderer,
        scene: &Scene,
        id: &TileId,
        visible: bool,
    ) -> Result<()> {
        if !self.records.contains_key(id) {
            self.add_occluder(renderer, scene, id)?;
        }
        if let Some(record) = self.records.get_mut(id) {
            record.sprite.alpha = if visible { 1.0 } else { 0.0 };
        }
        Ok(())
    }

    /// Drops texture-derived bounds measurements, e.g. after a texture
    /// swap at an existing handle.
    pub fn invalidate_texture(&mut self, texture: TextureHandle) {
        self.bounds.invalidate_texture(texture);
    }

    /// Measures every tracked sprite and re-stamps the whole mask.
    ///
    /// Flagged tiles the registry has not seen yet are materialized first,
    /// in stable id order. Records are stamped in z order (ties broken by
    /// id) so the composite is deterministic.
    pub fn reindex(&mut self, renderer: &MaskRenderer, scene: &Scene) -> Result<()> {
        for id in scene.occluder_tile_ids() {
            if self.records.contains_key(&id) {
                continue;
            }
            if let Some(tile) = scene.tile(&id) {
                self.records.insert(
                    id,
                    OccluderRecord {
                        sprite: OccluderSprite::from_tile(tile),
                        slot_index: None,
                    },
                );
            }
        }

        let dims = self.dims;
        let mut order: Vec<TileId> = self.records.keys().cloned().collect();
        order.sort_by(|a, b| {
            let za = self.records[a].sprite.z_index;
            let zb = self.records[b].sprite.z_index;
            za.cmp(&zb).then_with(|| a.cmp(b))
        });

        for id in &order {
            if let Some(record) = self.records.get_mut(id) {
                record
                    .sprite
                    .measure_and_encode(renderer, &mut self.bounds, &dims)?;
            }
        }

        self.positions.clear();
        let projection = pixel_projection(dims.width, dims.height);
        let mut draws = Vec::with_capacity(order.len());
        for id in &order {
            let sprite = &self.records[id].sprite;
            let Some(encoded) = sprite.encoded else {
                continue;
            };
            self.positions.insert(id.clone(), encoded);
            draws.push(StampDraw {
                texture: sprite.texture,
                mvp: projection * sprite.model_matrix(),
                encoded: encoded.encoded(),
                alpha: sprite.alpha,
            });
        }

        debug!(
            "occlusion reindex: {} occluders registered, {} stamped",
            order.len(),
            draws.len()
        );

        let target = self.materialize(renderer);
        renderer.render_mask(target, &draws)?;
        Ok(())
    }

    /// Ensures a token carries an up-to-date occlusion filter at the front
    /// of its effect chain.
    ///
    /// Unknown tokens and tokens without a loaded visual are skipped, as
    /// are invisible tokens unless `ignore_visibility` is set.
    pub fn refresh_token(&self, scene: &mut Scene, id: &TokenId, ignore_visibility: bool) {
        let Some(token) = scene.token_mut(id) else {
            return;
        };
        if token.visual.is_none() {
            return;
        }
        if !token.visible && !ignore_visibility {
            return;
        }

        let position = QuantizedPosition::from_world(token.center(), &self.dims);
        let flags = token.flags.clone();
        let disposition = token.disposition;

        match token.effects.occlusion_position() {
            Some(index) => {
                token.effects.move_to_front(index);
                if let Some(filter) = token.effects.occlusion_filter_mut() {
                    filter.update_uniforms(&flags, disposition, position);
                }
            }
            None => {
                let mut filter = TokenMaskFilter::new();
                filter.update_uniforms(&flags, disposition, position);
                token.effects.prepend(TokenEffect::OcclusionMask(filter));
            }
        }
    }

    /// Blocking readback of the current mask as tight RGBA8 bytes.
    pub fn read_mask(&self, renderer: &MaskRenderer) -> Result<Vec<u8>> {
        let mask = self
            .mask
            .as_ref()
            .ok_or_else(|| anyhow!("occlusion mask has not been rendered"))?;
        renderer.read_target(mask)
    }

    /// Releases the mask texture and every cached measurement.
    pub fn teardown(&mut self) {
        if let Some(mask) = self.mask.take() {
            mask.destroy();
        }
        self.records.clear();
        self.positions.clear();
        self.bounds.clear();
    }

    fn materialize(&mut self, renderer: &MaskRenderer) -> &RenderTarget {
        let (width, height) = self.dims.texture_extent();
        self.mask
            .get_or_insert_with(|| renderer.create_target(width, height, "veil2d-occlusion-mask"))
    }
}

impl Drop for OcclusionIndex {
    fn drop(&mut self) {
        self.teardown();
    }
}
