//! Scene documents consumed by the occlusion pipeline.
//!
//! The scene is the external collaborator from the pipeline's point of view:
//! an enumerable collection of live tiles and tokens with stable ids, world
//! transforms, renderable visuals, and per-document flag maps. Lifecycle
//! notifications (tile created/updated/deleted, token refresh) arrive as
//! method calls on [`crate::occlusion::OcclusionIndex`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::flags::{get_bool_flag, FlagMap, IS_TILE_OCCLUDER};
use crate::math::{Rect, Vec2};
use crate::occlusion::EffectChain;
use crate::render::TextureHandle;

/// Stable identifier of a tile document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId(String);

impl TileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Stable identifier of a token document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId(String);

impl TokenId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Token classification influencing the fallback outline glow color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    Hostile,
    #[default]
    Neutral,
    Friendly,
}

impl Disposition {
    /// Glow color used when no explicit outline color flag is usable.
    pub fn glow_color(self) -> [f32; 3] {
        match self {
            Disposition::Friendly => [0.0, 0.702, 0.0],
            Disposition::Neutral => [0.0, 0.035, 1.0],
            Disposition::Hostile => [0.702, 0.035, 0.0],
        }
    }
}

/// Full extents of the scene canvas in world pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneDimensions {
    pub width: f32,
    pub height: f32,
}

impl SceneDimensions {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Integer extent used to size the shared mask render target.
    pub fn texture_extent(&self) -> (u32, u32) {
        (
            (self.width.ceil() as u32).max(1),
            (self.height.ceil() as u32).max(1),
        )
    }
}

/// A placed tile: world transform, renderable visual, and flags.
#[derive(Clone, Debug)]
pub struct TileDocument {
    pub id: TileId,
    /// World position of the anchor point.
    pub position: Vec2,
    /// Unscaled extents in world pixels.
    pub size: Vec2,
    /// Normalized anchor in [0, 1] texture coordinates.
    pub anchor: Vec2,
    pub scale: Vec2,
    /// Rotation in radians.
    pub rotation: f32,
    /// Draw order within the compositing container.
    pub z_index: i32,
    /// Document opacity; an occluder below half opacity stamps nothing.
    pub alpha: f32,
    pub texture: TextureHandle,
    pub flags: FlagMap,
}

impl TileDocument {
    pub fn new(id: TileId, texture: TextureHandle, position: Vec2, size: Vec2) -> Self {
        Self {
            id,
            position,
            size,
            anchor: Vec2::ZERO,
            scale: Vec2::ONE,
            rotation: 0.0,
            z_index: 0,
            alpha: 1.0,
            texture,
            flags: FlagMap::new(),
        }
    }

    pub fn is_occluder(&self) -> bool {
        get_bool_flag(&self.flags, IS_TILE_OCCLUDER, false)
    }
}

/// A placed token: world rect, disposition, optional rendered visual, and
/// the per-token effect chain the mask filter lives on.
#[derive(Clone, Debug)]
pub struct TokenDocument {
    pub id: TokenId,
    /// World position of the token's top-left corner.
    pub position: Vec2,
    /// Extents in world pixels.
    pub size: Vec2,
    pub disposition: Disposition,
    pub visible: bool,
    /// Rendered visual; `None` while the token mesh is not loaded, in which
    /// case refresh calls are no-ops.
    pub visual: Option<TextureHandle>,
    pub flags: FlagMap,
    pub effects: EffectChain,
}

impl TokenDocument {
    pub fn new(id: TokenId, position: Vec2, size: Vec2) -> Self {
        Self {
            id,
            position,
            size,
            disposition: Disposition::Neutral,
            visible: true,
            visual: None,
            flags: FlagMap::new(),
            effects: EffectChain::new(),
        }
    }

    pub fn center(&self) -> Vec2 {
        self.position + self.size * 0.5
    }

    /// World-space rect of the token quad, used to map mask coordinates.
    pub fn frame(&self) -> Rect {
        Rect::from_origin_size(self.position, self.size)
    }
}

/// Live document collections plus canvas dimensions.
pub struct Scene {
    pub dimensions: SceneDimensions,
    tiles: HashMap<TileId, TileDocument>,
    tokens: HashMap<TokenId, TokenDocument>,
}

impl Scene {
    pub fn new(dimensions: SceneDimensions) -> Self {
        Self {
            dimensions,
            tiles: HashMap::new(),
            tokens: HashMap::new(),
        }
    }

    pub fn insert_tile(&mut self, tile: TileDocument) {
        self.tiles.insert(tile.id.clone(), tile);
    }

    pub fn remove_tile(&mut self, id: &TileId) -> Option<TileDocument> {
        self.tiles.remove(id)
    }

    pub fn tile(&self, id: &TileId) -> Option<&TileDocument> {
        self.tiles.get(id)
    }

    pub fn tile_mut(&mut self, id: &TileId) -> Option<&mut TileDocument> {
        self.tiles.get_mut(id)
    }

    pub fn tiles(&self) -> impl Iterator<Item = &TileDocument> {
        self.tiles.values()
    }

    /// Ids of tiles carrying the occluder flag, in stable id order.
    pub fn occluder_tile_ids(&self) -> Vec<TileId> {
        let mut ids: Vec<TileId> = self
            .tiles
            .values()
            .filter(|t| t.is_occluder())
            .map(|t| t.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn insert_token(&mut self, token: TokenDocument) {
        self.tokens.insert(token.id.clone(), token);
    }

    pub fn remove_token(&mut self, id: &TokenId) -> Option<TokenDocument> {
        self.tokens.remove(id)
    }

    pub fn token(&self, id: &TokenId) -> Option<&TokenDocument> {
        self.tokens.get(id)
    }

    pub fn token_mut(&mut self, id: &TokenId) -> Option<&mut TokenDocument> {
        self.tokens.get_mut(id)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &TokenDocument> {
        self.tokens.values()
    }
}
