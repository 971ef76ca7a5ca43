//! Per-document flag storage.
//!
//! Tiles and tokens carry a free-form flag map (JSON values) that drives the
//! occlusion pipeline: whether a tile contributes to the mask, and how an
//! occluded token is outlined or tinted. Unknown or malformed values fall
//! back to the documented defaults; flags never fail a frame.

use std::collections::HashMap;

use serde_json::Value;

/// Marks a tile as contributing opaque geometry to the shared mask.
pub const IS_TILE_OCCLUDER: &str = "is_tile_occluder";
/// Enables the outline glow pass for an occluded token (default true).
pub const ENABLE_TOKEN_OCCLUDER_OUTLINE: &str = "enable_token_occluder_outline";
/// Outline glow color as a hex string (default `#c3fe20`).
pub const TOKEN_OCCLUDER_OUTLINE_COLOR: &str = "token_occluder_outline_color";
/// Enables flat fill tinting for occluded token pixels (default true).
pub const ENABLE_TOKEN_OCCLUDER_FILL: &str = "enable_token_occluder_fill";
/// Fill tint color as a hex string (default `#6a5858`).
pub const TOKEN_OCCLUDER_FILL_COLOR: &str = "token_occluder_fill_color";
/// Fill tint alpha (default 1.0); ignored when fill is disabled.
pub const TOKEN_OCCLUDER_FILL_ALPHA: &str = "token_occluder_fill_alpha";

pub const DEFAULT_OUTLINE_COLOR: &str = "#c3fe20";
pub const DEFAULT_FILL_COLOR: &str = "#6a5858";

/// Flag map attached to every tile/token document.
pub type FlagMap = HashMap<String, Value>;

/// Boolean flag lookup with a default for absent or non-boolean values.
pub fn get_bool_flag(flags: &FlagMap, name: &str, default: bool) -> bool {
    match flags.get(name) {
        Some(Value::Bool(b)) => *b,
        _ => default,
    }
}

/// Numeric flag lookup with a default for absent or non-numeric values.
pub fn get_f32_flag(flags: &FlagMap, name: &str, default: f32) -> f32 {
    match flags.get(name) {
        Some(Value::Number(n)) => n.as_f64().map(|v| v as f32).unwrap_or(default),
        _ => default,
    }
}

/// String flag lookup with a default for absent or non-string values.
pub fn get_str_flag<'a>(flags: &'a FlagMap, name: &str, default: &'a str) -> &'a str {
    match flags.get(name) {
        Some(Value::String(s)) => s.as_str(),
        _ => default,
    }
}

/// Parses a `#rrggbb` (or bare `rrggbb`) color string into linear RGB.
pub fn parse_hex_color(value: &str) -> Option<[f32; 3]> {
    let hex = value.strip_prefix('#').unwrap_or(value);
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([
        f32::from(r) / 255.0,
        f32::from(g) / 255.0,
        f32::from(b) / 255.0,
    ])
}
