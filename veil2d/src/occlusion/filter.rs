//! The per-token occlusion filter and the effect chain it lives on.

use anyhow::{anyhow, Result};
use log::warn;

use crate::flags::{
    get_bool_flag, get_f32_flag, get_str_flag, parse_hex_color, FlagMap, DEFAULT_FILL_COLOR,
    DEFAULT_OUTLINE_COLOR, ENABLE_TOKEN_OCCLUDER_FILL, ENABLE_TOKEN_OCCLUDER_OUTLINE,
    TOKEN_OCCLUDER_FILL_ALPHA, TOKEN_OCCLUDER_FILL_COLOR, TOKEN_OCCLUDER_OUTLINE_COLOR,
};
use crate::math::{oscillation, Rect};
use crate::render::{FilterUniforms, MaskRenderer, RenderTarget, TextureHandle};
use crate::scene::{Disposition, SceneDimensions};

use super::encoding::QuantizedPosition;

/// `#6a5858` as linear RGB; used when the fill color flag fails to parse.
const DEFAULT_FILL_RGB: [f32; 3] = [106.0 / 255.0, 88.0 / 255.0, 88.0 / 255.0];

const BASE_GLOW_STRENGTH: f32 = 0.5;
const GLOW_PULSE_PERIOD_MS: f32 = 6000.0;

/// The occlusion filter attached to a token's effect chain.
///
/// Holds the token's quantized position and the resolved outline/fill
/// configuration; the GPU uniforms are derived per application so the glow
/// pulse can track wall-clock time.
#[derive(Debug, Clone)]
pub struct TokenMaskFilter {
    disposition: Disposition,
    position: QuantizedPosition,
    enable_outline: bool,
    /// Parsed outline color; `None` falls back to the disposition color.
    outline_color: Option<[f32; 3]>,
    fill_color: [f32; 3],
    /// Effective fill alpha; zero when the fill flag is disabled.
    fill_alpha: f32,
}

impl TokenMaskFilter {
    pub fn new() -> Self {
        Self {
            disposition: Disposition::Neutral,
            position: QuantizedPosition { x: 0.0, y: 0.0 },
            enable_outline: true,
            outline_color: parse_hex_color(DEFAULT_OUTLINE_COLOR),
            fill_color: DEFAULT_FILL_RGB,
            fill_alpha: 1.0,
        }
    }

    /// Re-resolves the filter configuration from the token's flags.
    pub fn update_uniforms(
        &mut self,
        flags: &FlagMap,
        disposition: Disposition,
        position: QuantizedPosition,
    ) {
        self.disposition = disposition;
        self.position = position;

        self.enable_outline = get_bool_flag(flags, ENABLE_TOKEN_OCCLUDER_OUTLINE, true);
        let outline_hex = get_str_flag(flags, TOKEN_OCCLUDER_OUTLINE_COLOR, DEFAULT_OUTLINE_COLOR);
        self.outline_color = parse_hex_color(outline_hex);
        if self.outline_color.is_none() {
            warn!("unparseable outline color {outline_hex:?}; using disposition color");
        }

        let enable_fill = get_bool_flag(flags, ENABLE_TOKEN_OCCLUDER_FILL, true);
        self.fill_color =
            parse_hex_color(get_str_flag(flags, TOKEN_OCCLUDER_FILL_COLOR, DEFAULT_FILL_COLOR))
                .unwrap_or(DEFAULT_FILL_RGB);
        self.fill_alpha = if enable_fill {
            get_f32_flag(flags, TOKEN_OCCLUDER_FILL_ALPHA, 1.0).clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    pub fn position(&self) -> QuantizedPosition {
        self.position
    }

    /// Outline glow color, falling back to the disposition color when the
    /// configured hex string did not parse.
    pub fn glow_color(&self) -> [f32; 3] {
        self.outline_color
            .unwrap_or_else(|| self.disposition.glow_color())
    }

    pub fn fill_alpha(&self) -> f32 {
        self.fill_alpha
    }

    pub fn outline_enabled(&self) -> bool {
        self.enable_outline
    }

    /// Builds the uniform block for one filter application.
    ///
    /// `frame` is the token quad in world pixels; `input_size` the token
    /// texture extent; `time_ms` drives the glow strength pulse.
    pub(crate) fn build_uniforms(
        &self,
        frame: Rect,
        input_size: (u32, u32),
        dims: &SceneDimensions,
        time_ms: f32,
    ) -> FilterUniforms {
        use glam::{Mat4, Vec3};

        // Token-quad UV -> world pixels -> mask UV.
        let mask_matrix = Mat4::from_scale(Vec3::new(1.0 / dims.width, 1.0 / dims.height, 1.0))
            * Mat4::from_translation(Vec3::new(frame.x, frame.y, 0.0))
            * Mat4::from_scale(Vec3::new(frame.width, frame.height, 1.0));

        let pulse = oscillation(1.0, 2.0, time_ms, GLOW_PULSE_PERIOD_MS);
        let glow = self.glow_color();

        FilterUniforms {
            mask_matrix: mask_matrix.to_cols_array_2d(),
            glow_color: [glow[0], glow[1], glow[2], 1.0],
            fill_color: [
                self.fill_color[0],
                self.fill_color[1],
                self.fill_color[2],
                self.fill_alpha,
            ],
            token_pos: [self.position.x, self.position.y],
            filter_area: [input_size.0 as f32, input_size.1 as f32],
            outer_strength: BASE_GLOW_STRENGTH * pulse,
            inner_strength: BASE_GLOW_STRENGTH * pulse,
            enable_outline: if self.enable_outline { 1.0 } else { 0.0 },
            _pad: 0.0,
        }
    }

    /// Applies the filter to a token's rendered pixels.
    ///
    /// Without a valid mask the input is copied through unchanged; the
    /// filter never fails a frame over missing occlusion state.
    pub fn apply(
        &self,
        renderer: &MaskRenderer,
        mask: Option<&RenderTarget>,
        input: TextureHandle,
        frame: Rect,
        dims: &SceneDimensions,
        time_ms: f32,
        output: &RenderTarget,
    ) -> Result<()> {
        let Some(mask) = mask else {
            return renderer.blit(input, output);
        };
        let input_size = renderer
            .texture_size(input)
            .ok_or_else(|| anyhow!("Unknown texture handle"))?;
        let uniforms = self.build_uniforms(frame, input_size, dims, time_ms);
        renderer.apply_occlusion_filter(input, mask, uniforms, output)
    }
}

impl Default for TokenMaskFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// A single effect in a token's chain.
#[derive(Debug, Clone)]
pub enum TokenEffect {
    /// The occlusion mask filter; at most one per chain, kept at the front.
    OcclusionMask(TokenMaskFilter),
    /// Flat color tint, e.g. for status highlights.
    Tint { color: [f32; 4] },
}

impl TokenEffect {
    pub fn is_occlusion_mask(&self) -> bool {
        matches!(self, TokenEffect::OcclusionMask(_))
    }
}

/// Ordered effect chain attached to a token.
///
/// Effects are identified by variant, not by name strings, so lookup is a
/// plain match over the chain.
#[derive(Debug, Clone, Default)]
pub struct EffectChain {
    effects: Vec<TokenEffect>,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TokenEffect> {
        self.effects.iter()
    }

    pub fn push(&mut self, effect: TokenEffect) {
        self.effects.push(effect);
    }

    /// Inserts at the front of the chain.
    pub fn prepend(&mut self, effect: TokenEffect) {
        self.effects.insert(0, effect);
    }

    /// Index of the occlusion mask effect, if present.
    pub fn occlusion_position(&self) -> Option<usize> {
        self.effects.iter().position(TokenEffect::is_occlusion_mask)
    }

    /// Moves the effect at `index` to the front, preserving the relative
    /// order of the rest.
    pub fn move_to_front(&mut self, index: usize) {
        if index == 0 || index >= self.effects.len() {
            return;
        }
        let effect = self.effects.remove(index);
        self.effects.insert(0, effect);
    }

    pub fn occlusion_filter(&self) -> Option<&TokenMaskFilter> {
        self.effects.iter().find_map(|e| match e {
            TokenEffect::OcclusionMask(filter) => Some(filter),
            _ => None,
        })
    }

    pub fn occlusion_filter_mut(&mut self) -> Option<&mut TokenMaskFilter> {
        self.effects.iter_mut().find_map(|e| match e {
            TokenEffect::OcclusionMask(filter) => Some(filter),
            _ => None,
        })
    }
}
