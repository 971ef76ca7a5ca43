//! End-to-end occlusion pipeline tests against a real GPU device.
//!
//! Every test acquires its own headless device and skips (with a note on
//! stderr) when the host has no usable adapter, so CI without a GPU stays
//! green.

use serde_json::json;
use veil2d::flags::IS_TILE_OCCLUDER;
use veil2d::math::Vec2;
use veil2d::occlusion::{encode_mask_pixel, BoundsExtractor, QuantizedPosition};
use veil2d::render::TextureHandle;
use veil2d::{
    GpuContext, MaskRenderer, OcclusionIndex, Scene, SceneDimensions, TileDocument, TileId,
    TokenDocument, TokenId,
};

fn setup() -> Option<MaskRenderer> {
    match GpuContext::new() {
        Ok(ctx) => Some(MaskRenderer::new(ctx)),
        Err(err) => {
            eprintln!("skipping GPU test: {err}");
            None
        }
    }
}

fn solid_texture(
    renderer: &mut MaskRenderer,
    width: u32,
    height: u32,
    rgba: [u8; 4],
) -> TextureHandle {
    let data: Vec<u8> = rgba
        .iter()
        .copied()
        .cycle()
        .take((width * height * 4) as usize)
        .collect();
    renderer.load_texture_from_rgba(&data, width, height).unwrap()
}

fn pixel(bytes: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * width + x) * 4) as usize;
    [bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]
}

/// Standard fixture: a scene with one fully opaque 200x200 tile at
/// (100, 100), id "wall".
fn scene_with_wall(renderer: &mut MaskRenderer, dims: SceneDimensions) -> Scene {
    let texture = solid_texture(renderer, 8, 8, [255, 255, 255, 255]);
    let mut scene = Scene::new(dims);
    scene.insert_tile(TileDocument::new(
        TileId::new("wall"),
        texture,
        Vec2::new(100.0, 100.0),
        Vec2::new(200.0, 200.0),
    ));
    scene
}

#[test]
fn bounds_extraction_finds_opaque_block() {
    let Some(mut renderer) = setup() else { return };

    // 8x8 texture, opaque only in cols 2..4 and rows 3..5.
    let mut data = vec![0u8; 8 * 8 * 4];
    for y in 3..5u32 {
        for x in 2..4u32 {
            let i = ((y * 8 + x) * 4) as usize;
            data[i..i + 4].copy_from_slice(&[255, 255, 255, 255]);
        }
    }
    let texture = renderer.load_texture_from_rgba(&data, 8, 8).unwrap();

    let mut extractor = BoundsExtractor::new();
    let bounds = extractor
        .compute_bounds(&renderer, texture, Vec2::new(8.0, 8.0), Vec2::ONE, 0.0)
        .unwrap()
        .unwrap();
    assert_eq!(
        (bounds.left, bounds.top, bounds.right, bounds.bottom),
        (2, 3, 4, 5)
    );
    // width/height report the measured surface, not the opaque box.
    assert_eq!((bounds.width, bounds.height), (8, 8));
}

#[test]
fn fully_transparent_sprite_has_no_bounds() {
    let Some(mut renderer) = setup() else { return };

    let texture = solid_texture(&mut renderer, 8, 8, [0, 0, 0, 0]);
    let mut extractor = BoundsExtractor::new();
    let bounds = extractor
        .compute_bounds(&renderer, texture, Vec2::new(8.0, 8.0), Vec2::ONE, 0.0)
        .unwrap();
    assert!(bounds.is_none());
}

#[test]
fn occluder_stamps_encoded_anchor_into_mask() {
    let Some(mut renderer) = setup() else { return };

    let dims = SceneDimensions::new(1000.0, 1000.0);
    let scene = scene_with_wall(&mut renderer, dims);
    let mut index = OcclusionIndex::new(dims);
    assert!(index.mask().is_none());

    index
        .add_occluder(&renderer, &scene, &TileId::new("wall"))
        .unwrap();

    // Anchor point of a fully opaque 200x200 tile at (100, 100) is its
    // bottom-center (0, 200); quantized that is x=1.0, y=51/255.
    let position = index.position_of(&TileId::new("wall")).unwrap();
    assert_eq!(
        position,
        QuantizedPosition::from_world(Vec2::new(0.0, 200.0), &dims)
    );

    let mask = index.read_mask(&renderer).unwrap();
    let covered = encode_mask_pixel(true, position);
    assert_eq!(pixel(&mask, 1000, 150, 150), covered);
    assert_eq!(pixel(&mask, 1000, 299, 299), covered);
    assert_eq!(pixel(&mask, 1000, 500, 500), [0, 0, 0, 0]);
    assert_eq!(pixel(&mask, 1000, 50, 150), [0, 0, 0, 0]);
}

#[test]
fn partially_transparent_occluder_encodes_opaque_anchor() {
    let Some(mut renderer) = setup() else { return };

    let dims = SceneDimensions::new(1000.0, 1000.0);
    // 200x200 texture, opaque only in cols 0..100 and rows 0..150.
    let mut data = vec![0u8; 200 * 200 * 4];
    for y in 0..150u32 {
        for x in 0..100u32 {
            let i = ((y * 200 + x) * 4) as usize;
            data[i..i + 4].copy_from_slice(&[255, 255, 255, 255]);
        }
    }
    let texture = renderer.load_texture_from_rgba(&data, 200, 200).unwrap();

    let mut scene = Scene::new(dims);
    let id = TileId::new("arch");
    scene.insert_tile(TileDocument::new(
        id.clone(),
        texture,
        Vec2::new(100.0, 100.0),
        Vec2::new(200.0, 200.0),
    ));
    let mut index = OcclusionIndex::new(dims);
    index.add_occluder(&renderer, &scene, &id).unwrap();

    // Opaque box cols 0..100, rows 0..150 in a 200x200 frame at (100, 100):
    // anchor (100 + 0 - 100, 100 + 100 - (200 - 150)) = (0, 150). The box
    // edges count against the full frame, not the box's own size.
    let position = index.position_of(&id).unwrap();
    assert_eq!(
        position,
        QuantizedPosition::from_world(Vec2::new(0.0, 150.0), &dims)
    );

    let covered = encode_mask_pixel(true, position);
    let mask = index.read_mask(&renderer).unwrap();
    assert_eq!(pixel(&mask, 1000, 150, 200), covered);
    // The transparent part of the tile frame stamps nothing.
    assert_eq!(pixel(&mask, 1000, 250, 150), [0, 0, 0, 0]);
}

#[test]
fn add_unknown_tile_is_a_no_op() {
    let Some(mut renderer) = setup() else { return };

    let dims = SceneDimensions::new(256.0, 256.0);
    let scene = scene_with_wall(&mut renderer, dims);
    let mut index = OcclusionIndex::new(dims);

    index
        .add_occluder(&renderer, &scene, &TileId::new("ghost"))
        .unwrap();
    assert_eq!(index.record_count(), 0);
    assert!(index.mask().is_none());
}

#[test]
fn add_then_remove_restores_empty_mask() {
    let Some(mut renderer) = setup() else { return };

    let dims = SceneDimensions::new(256.0, 256.0);
    let mut scene = Scene::new(dims);
    let texture = solid_texture(&mut renderer, 8, 8, [255, 255, 255, 255]);
    let id = TileId::new("t");
    scene.insert_tile(TileDocument::new(
        id.clone(),
        texture,
        Vec2::new(64.0, 64.0),
        Vec2::new(64.0, 64.0),
    ));

    let mut index = OcclusionIndex::new(dims);
    index.add_occluder(&renderer, &scene, &id).unwrap();
    assert_eq!(index.record_count(), 1);
    assert_ne!(
        pixel(&index.read_mask(&renderer).unwrap(), 256, 90, 90),
        [0, 0, 0, 0]
    );

    // Tile deleted from the scene, then its occluder dropped.
    scene.remove_tile(&id);
    index.remove_occluder(&renderer, &scene, &id).unwrap();
    assert_eq!(index.record_count(), 0);
    let mask = index.read_mask(&renderer).unwrap();
    assert!(mask.iter().all(|&b| b == 0));
}

#[test]
fn reindex_is_idempotent() {
    let Some(mut renderer) = setup() else { return };

    let dims = SceneDimensions::new(512.0, 512.0);
    let scene = scene_with_wall(&mut renderer, dims);
    let mut index = OcclusionIndex::new(dims);
    index
        .add_occluder(&renderer, &scene, &TileId::new("wall"))
        .unwrap();

    let first = index.read_mask(&renderer).unwrap();
    index.reindex(&renderer, &scene).unwrap();
    let second = index.read_mask(&renderer).unwrap();
    assert_eq!(first, second);
}

#[test]
fn update_of_untracked_tile_is_a_no_op() {
    let Some(mut renderer) = setup() else { return };

    let dims = SceneDimensions::new(256.0, 256.0);
    let scene = scene_with_wall(&mut renderer, dims);
    let mut index = OcclusionIndex::new(dims);

    index
        .update_occluder(&renderer, &scene, &TileId::new("wall"))
        .unwrap();
    assert_eq!(index.record_count(), 0);
    assert!(index.mask().is_none());
}

#[test]
fn update_moves_the_stamp() {
    let Some(mut renderer) = setup() else { return };

    let dims = SceneDimensions::new(512.0, 512.0);
    let mut scene = Scene::new(dims);
    let texture = solid_texture(&mut renderer, 8, 8, [255, 255, 255, 255]);
    let id = TileId::new("t");
    scene.insert_tile(TileDocument::new(
        id.clone(),
        texture,
        Vec2::new(0.0, 0.0),
        Vec2::new(100.0, 100.0),
    ));

    let mut index = OcclusionIndex::new(dims);
    index.add_occluder(&renderer, &scene, &id).unwrap();
    let mask = index.read_mask(&renderer).unwrap();
    assert_ne!(pixel(&mask, 512, 50, 50), [0, 0, 0, 0]);
    assert_eq!(pixel(&mask, 512, 350, 350), [0, 0, 0, 0]);

    scene.tile_mut(&id).unwrap().position = Vec2::new(300.0, 300.0);
    index.update_occluder(&renderer, &scene, &id).unwrap();
    let mask = index.read_mask(&renderer).unwrap();
    assert_eq!(pixel(&mask, 512, 50, 50), [0, 0, 0, 0]);
    assert_ne!(pixel(&mask, 512, 350, 350), [0, 0, 0, 0]);
}

#[test]
fn set_visible_materializes_and_toggles_alpha() {
    let Some(mut renderer) = setup() else { return };

    let dims = SceneDimensions::new(256.0, 256.0);
    let mut scene = Scene::new(dims);
    let texture = solid_texture(&mut renderer, 8, 8, [255, 255, 255, 255]);
    let id = TileId::new("t");
    scene.insert_tile(TileDocument::new(
        id.clone(),
        texture,
        Vec2::new(64.0, 64.0),
        Vec2::new(64.0, 64.0),
    ));

    // Never indexed before: set_visible goes through the add path.
    let mut index = OcclusionIndex::new(dims);
    index.set_visible(&renderer, &scene, &id, false).unwrap();
    assert_eq!(index.record_count(), 1);
    assert_eq!(index.record(&id).unwrap().sprite.alpha, 0.0);

    // The alpha write alone does not re-render; the next reindex does.
    index.reindex(&renderer, &scene).unwrap();
    let mask = index.read_mask(&renderer).unwrap();
    assert_eq!(pixel(&mask, 256, 90, 90), [0, 0, 0, 0]);

    index.set_visible(&renderer, &scene, &id, true).unwrap();
    index.reindex(&renderer, &scene).unwrap();
    let mask = index.read_mask(&renderer).unwrap();
    assert_ne!(pixel(&mask, 256, 90, 90), [0, 0, 0, 0]);
}

#[test]
fn reindex_materializes_flagged_tiles() {
    let Some(mut renderer) = setup() else { return };

    let dims = SceneDimensions::new(256.0, 256.0);
    let mut scene = Scene::new(dims);
    let texture = solid_texture(&mut renderer, 8, 8, [255, 255, 255, 255]);

    let mut flagged = TileDocument::new(
        TileId::new("occluder"),
        texture,
        Vec2::new(10.0, 10.0),
        Vec2::new(50.0, 50.0),
    );
    flagged
        .flags
        .insert(IS_TILE_OCCLUDER.to_string(), json!(true));
    scene.insert_tile(flagged);
    scene.insert_tile(TileDocument::new(
        TileId::new("plain"),
        texture,
        Vec2::new(100.0, 100.0),
        Vec2::new(50.0, 50.0),
    ));

    let mut index = OcclusionIndex::new(dims);
    index.reindex(&renderer, &scene).unwrap();
    assert_eq!(index.record_count(), 1);
    assert!(index.record(&TileId::new("occluder")).is_some());
    assert!(index.record(&TileId::new("plain")).is_none());
}

#[test]
fn mask_rebuild_handles_more_occluders_than_one_pass() {
    let Some(mut renderer) = setup() else { return };

    // 300 flagged tiles exceed the per-pass uniform ring, so the rebuild
    // spans two passes; stamps from both must land.
    let dims = SceneDimensions::new(1000.0, 1000.0);
    let mut scene = Scene::new(dims);
    let texture = solid_texture(&mut renderer, 8, 8, [255, 255, 255, 255]);
    for i in 0..300u32 {
        let (col, row) = (i % 20, i / 20);
        let mut tile = TileDocument::new(
            TileId::new(format!("tile-{i:03}")),
            texture,
            Vec2::new(col as f32 * 32.0, row as f32 * 32.0),
            Vec2::new(8.0, 8.0),
        );
        tile.flags
            .insert(IS_TILE_OCCLUDER.to_string(), json!(true));
        scene.insert_tile(tile);
    }

    let mut index = OcclusionIndex::new(dims);
    index.reindex(&renderer, &scene).unwrap();
    assert_eq!(index.record_count(), 300);

    let mask = index.read_mask(&renderer).unwrap();
    // First tile in draw order (first pass) and last tile (second pass).
    assert_ne!(pixel(&mask, 1000, 4, 4), [0, 0, 0, 0]);
    assert_ne!(pixel(&mask, 1000, 19 * 32 + 4, 14 * 32 + 4), [0, 0, 0, 0]);
}

#[test]
fn occluded_token_is_fill_tinted() {
    let Some(mut renderer) = setup() else { return };

    let dims = SceneDimensions::new(1000.0, 1000.0);
    let mut scene = scene_with_wall(&mut renderer, dims);
    let mut index = OcclusionIndex::new(dims);
    index
        .add_occluder(&renderer, &scene, &TileId::new("wall"))
        .unwrap();

    // White 50x50 token visual, centered at (200, 200) behind the wall.
    let visual = solid_texture(&mut renderer, 50, 50, [255, 255, 255, 255]);
    let token_id = TokenId::new("pc");
    let mut token = TokenDocument::new(
        token_id.clone(),
        Vec2::new(175.0, 175.0),
        Vec2::new(50.0, 50.0),
    );
    token.visual = Some(visual);
    scene.insert_token(token);
    index.refresh_token(&mut scene, &token_id, false);

    let token = scene.token(&token_id).unwrap();
    let filter = token.effects.occlusion_filter().unwrap();
    let output = renderer.create_target(50, 50, "test-token-output");
    filter
        .apply(
            &renderer,
            index.mask(),
            visual,
            token.frame(),
            &dims,
            0.0,
            &output,
        )
        .unwrap();

    // A fully opaque interior pixel gets the flat fill (#6a5858): the glow
    // pass sees full neighborhood alpha and contributes nothing.
    let bytes = renderer.read_target(&output).unwrap();
    assert_eq!(pixel(&bytes, 50, 25, 25), [106, 88, 88, 255]);
}

#[test]
fn unoccluded_token_passes_through() {
    let Some(mut renderer) = setup() else { return };

    let dims = SceneDimensions::new(1000.0, 1000.0);
    let mut scene = scene_with_wall(&mut renderer, dims);
    let mut index = OcclusionIndex::new(dims);
    index
        .add_occluder(&renderer, &scene, &TileId::new("wall"))
        .unwrap();

    // Token far away from the wall keeps its own pixels.
    let visual = solid_texture(&mut renderer, 50, 50, [255, 255, 255, 255]);
    let token_id = TokenId::new("pc");
    let mut token = TokenDocument::new(
        token_id.clone(),
        Vec2::new(875.0, 875.0),
        Vec2::new(50.0, 50.0),
    );
    token.visual = Some(visual);
    scene.insert_token(token);
    index.refresh_token(&mut scene, &token_id, false);

    let token = scene.token(&token_id).unwrap();
    let filter = token.effects.occlusion_filter().unwrap();
    let output = renderer.create_target(50, 50, "test-token-output");
    filter
        .apply(
            &renderer,
            index.mask(),
            visual,
            token.frame(),
            &dims,
            0.0,
            &output,
        )
        .unwrap();

    let bytes = renderer.read_target(&output).unwrap();
    assert_eq!(pixel(&bytes, 50, 25, 25), [255, 255, 255, 255]);
}

#[test]
fn filter_without_mask_blits_unchanged() {
    let Some(mut renderer) = setup() else { return };

    let dims = SceneDimensions::new(1000.0, 1000.0);
    let mut scene = Scene::new(dims);
    let index = OcclusionIndex::new(dims);
    assert!(index.mask().is_none());

    let visual = solid_texture(&mut renderer, 16, 16, [10, 200, 30, 255]);
    let token_id = TokenId::new("pc");
    let mut token = TokenDocument::new(
        token_id.clone(),
        Vec2::new(0.0, 0.0),
        Vec2::new(16.0, 16.0),
    );
    token.visual = Some(visual);
    scene.insert_token(token);
    index.refresh_token(&mut scene, &token_id, false);

    let token = scene.token(&token_id).unwrap();
    let filter = token.effects.occlusion_filter().unwrap();
    let output = renderer.create_target(16, 16, "test-token-output");
    filter
        .apply(
            &renderer,
            index.mask(),
            visual,
            token.frame(),
            &dims,
            0.0,
            &output,
        )
        .unwrap();

    let bytes = renderer.read_target(&output).unwrap();
    assert_eq!(pixel(&bytes, 16, 8, 8), [10, 200, 30, 255]);
}

#[test]
fn refresh_token_attaches_exactly_one_filter() {
    let Some(mut renderer) = setup() else { return };

    let dims = SceneDimensions::new(100.0, 100.0);
    let mut scene = Scene::new(dims);
    let index = OcclusionIndex::new(dims);
    let visual = solid_texture(&mut renderer, 4, 4, [255, 255, 255, 255]);

    let token_id = TokenId::new("pc");
    let mut token = TokenDocument::new(
        token_id.clone(),
        Vec2::new(10.0, 10.0),
        Vec2::new(4.0, 4.0),
    );
    token.visual = Some(visual);
    token.visible = false;
    scene.insert_token(token);

    // Unknown id: no-op.
    index.refresh_token(&mut scene, &TokenId::new("ghost"), false);

    // Invisible token: skipped unless visibility is ignored.
    index.refresh_token(&mut scene, &token_id, false);
    assert!(scene.token(&token_id).unwrap().effects.is_empty());
    index.refresh_token(&mut scene, &token_id, true);
    assert_eq!(scene.token(&token_id).unwrap().effects.len(), 1);

    // Repeated refreshes keep a single filter at the front.
    scene.token_mut(&token_id).unwrap().visible = true;
    index.refresh_token(&mut scene, &token_id, false);
    index.refresh_token(&mut scene, &token_id, false);
    let effects = &scene.token(&token_id).unwrap().effects;
    assert_eq!(effects.len(), 1);
    assert_eq!(effects.occlusion_position(), Some(0));
}

#[test]
fn refresh_skips_token_without_visual() {
    let dims = SceneDimensions::new(100.0, 100.0);
    let mut scene = Scene::new(dims);
    let index = OcclusionIndex::new(dims);

    let token_id = TokenId::new("pc");
    scene.insert_token(TokenDocument::new(
        token_id.clone(),
        Vec2::new(10.0, 10.0),
        Vec2::new(4.0, 4.0),
    ));
    index.refresh_token(&mut scene, &token_id, true);
    assert!(scene.token(&token_id).unwrap().effects.is_empty());
}

#[test]
fn teardown_releases_the_mask() {
    let Some(mut renderer) = setup() else { return };

    let dims = SceneDimensions::new(256.0, 256.0);
    let scene = scene_with_wall(&mut renderer, dims);
    let mut index = OcclusionIndex::new(dims);
    index
        .add_occluder(&renderer, &scene, &TileId::new("wall"))
        .unwrap();
    assert!(index.mask().is_some());

    index.teardown();
    assert!(index.mask().is_none());
    assert_eq!(index.record_count(), 0);
    assert!(index.read_mask(&renderer).is_err());
}
