//! Blocking RGBA8 texture readback yielding tight (depadded) CPU buffers.
//!
//! Readback is the synchronization point of bounds extraction: the caller
//! treats it as a synchronous GPU round-trip with no cancellation.

use anyhow::{anyhow, ensure, Result};
use wgpu::{
    CommandEncoderDescriptor, Extent3d, Origin3d, TexelCopyBufferInfo, TexelCopyBufferLayout,
    TexelCopyTextureInfo, TextureAspect,
};

const BYTES_PER_PIXEL: usize = 4;

/// Rounds a row byte count up to WebGPU's copy alignment (256 bytes).
fn align_bytes_per_row(value: usize) -> usize {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize;
    value.div_ceil(align) * align
}

/// Copies an RGBA8 texture into a tightly packed `width * height * 4` buffer.
pub fn read_texture_tight(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    src: &wgpu::Texture,
    size: (u32, u32),
) -> Result<Vec<u8>> {
    let (width, height) = size;
    ensure!(width > 0 && height > 0, "readback size must be positive");

    let tight_bpr = BYTES_PER_PIXEL * width as usize;
    let padded_bpr = align_bytes_per_row(tight_bpr);
    let buffer_size = (padded_bpr * height as usize) as wgpu::BufferAddress;

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("veil2d-readback-staging"),
        size: buffer_size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor {
        label: Some("veil2d-readback-encoder"),
    });
    encoder.copy_texture_to_buffer(
        TexelCopyTextureInfo {
            texture: src,
            mip_level: 0,
            origin: Origin3d::ZERO,
            aspect: TextureAspect::All,
        },
        TexelCopyBufferInfo {
            buffer: &staging,
            layout: TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bpr as u32),
                rows_per_image: Some(height),
            },
        },
        Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = crossbeam_channel::bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::PollType::wait_indefinitely())?;

    receiver
        .recv()
        .map_err(|_| anyhow!("map_async callback channel dropped"))??;

    let data = slice.get_mapped_range();
    let mut tight = vec![0u8; tight_bpr * height as usize];
    for row in 0..height as usize {
        let src_offset = row * padded_bpr;
        let dst_offset = row * tight_bpr;
        tight[dst_offset..dst_offset + tight_bpr]
            .copy_from_slice(&data[src_offset..src_offset + tight_bpr]);
    }
    drop(data);
    staging.unmap();

    Ok(tight)
}
