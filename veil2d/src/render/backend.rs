use std::collections::HashMap;

use anyhow::{anyhow, Result};
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use wgpu::util::DeviceExt;
use wgpu::{
    vertex_attr_array, AddressMode, BindGroup, BindGroupDescriptor, BindGroupEntry,
    BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingResource,
    BindingType, Buffer, BufferBindingType, BufferUsages, ColorTargetState, ColorWrites,
    Extent3d, FilterMode, FragmentState, LoadOp, MultisampleState, Operations, Origin3d,
    PipelineLayoutDescriptor, PrimitiveState, RenderPassColorAttachment, RenderPassDescriptor,
    RenderPipeline, RenderPipelineDescriptor, Sampler, SamplerBindingType, SamplerDescriptor,
    ShaderModuleDescriptor, ShaderSource, TexelCopyBufferLayout, TexelCopyTextureInfo, Texture,
    TextureAspect, TextureDescriptor, TextureDimension, TextureFormat, TextureSampleType,
    TextureUsages, TextureView, TextureViewDescriptor, TextureViewDimension, VertexState,
};

use crate::math::{pixel_projection, Transform2D, Vec2};
use crate::render::context::GpuContext;
use crate::render::readback::read_texture_tight;
use crate::render::texture::{RenderTarget, TextureHandle};

/// All offscreen targets are linear RGBA8 so encoded mask channels survive
/// compositing and readback byte-for-byte.
pub(crate) const TARGET_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

/// Stamp uniform slots per render pass; longer draw lists continue in
/// additional passes that load the previous contents.
const MASK_SPRITES_PER_PASS: usize = 256;

struct TextureEntry {
    /// The underlying GPU texture. Must be kept alive for the view to be valid.
    #[allow(dead_code)]
    texture: Texture,
    view: TextureView,
    sampler: Sampler,
    size: (u32, u32),
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 2],
    uv: [f32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SpriteUniforms {
    mvp: [[f32; 4]; 4],
    tint: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct StampUniforms {
    mvp: [[f32; 4]; 4],
    encoded: [f32; 2],
    alpha: f32,
    _pad: f32,
}

/// Uniform block of the occlusion filter pass; layout mirrors
/// `occlusion_filter.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub(crate) struct FilterUniforms {
    pub mask_matrix: [[f32; 4]; 4],
    pub glow_color: [f32; 4],
    pub fill_color: [f32; 4],
    pub token_pos: [f32; 2],
    pub filter_area: [f32; 2],
    pub outer_strength: f32,
    pub inner_strength: f32,
    pub enable_outline: f32,
    pub _pad: f32,
}

/// One occluder sprite queued for compositing into the mask.
pub(crate) struct StampDraw {
    pub texture: TextureHandle,
    pub mvp: Mat4,
    pub encoded: [f32; 2],
    pub alpha: f32,
}

struct SpritePipeline {
    pipeline: RenderPipeline,
    vertex_buffer: Buffer,
    bind_group_layout: BindGroupLayout,
}

struct StampPipeline {
    pipeline: RenderPipeline,
    vertex_buffer: Buffer,
    uniform_buffer: Buffer,
    bind_group_layout: BindGroupLayout,
    uniform_alignment: u64,
}

struct FilterPipeline {
    pipeline: RenderPipeline,
    vertex_buffer: Buffer,
    bind_group_layout: BindGroupLayout,
    /// Nearest filtering: quantized mask channels must never be interpolated
    /// between neighboring texels.
    mask_sampler: Sampler,
}

struct BlitPipeline {
    pipeline: RenderPipeline,
    vertex_buffer: Buffer,
    bind_group_layout: BindGroupLayout,
}

/// Unit quad centered on the origin, UV origin at the top-left.
const QUAD_VERTICES: [QuadVertex; 6] = [
    QuadVertex {
        position: [-0.5, -0.5],
        uv: [0.0, 0.0],
    },
    QuadVertex {
        position: [0.5, -0.5],
        uv: [1.0, 0.0],
    },
    QuadVertex {
        position: [0.5, 0.5],
        uv: [1.0, 1.0],
    },
    QuadVertex {
        position: [-0.5, -0.5],
        uv: [0.0, 0.0],
    },
    QuadVertex {
        position: [0.5, 0.5],
        uv: [1.0, 1.0],
    },
    QuadVertex {
        position: [-0.5, 0.5],
        uv: [0.0, 1.0],
    },
];

/// Fullscreen quad in NDC; NDC +y is up, so v flips.
const FULLSCREEN_VERTICES: [QuadVertex; 6] = [
    QuadVertex {
        position: [-1.0, -1.0],
        uv: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, -1.0],
        uv: [1.0, 1.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        uv: [1.0, 0.0],
    },
    QuadVertex {
        position: [-1.0, -1.0],
        uv: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        uv: [1.0, 0.0],
    },
    QuadVertex {
        position: [-1.0, 1.0],
        uv: [0.0, 0.0],
    },
];

/// Offscreen renderer for the occlusion pipeline: texture pool plus the
/// sprite, stamp, filter, and blit pipelines.
pub struct MaskRenderer {
    ctx: GpuContext,
    sprite_pipeline: SpritePipeline,
    stamp_pipeline: StampPipeline,
    filter_pipeline: FilterPipeline,
    blit_pipeline: BlitPipeline,
    textures: HashMap<TextureHandle, TextureEntry>,
    next_texture_id: u32,
}

impl MaskRenderer {
    pub fn new(ctx: GpuContext) -> Self {
        let sprite_pipeline = create_sprite_pipeline(&ctx.device);
        let stamp_pipeline = create_stamp_pipeline(&ctx.device);
        let filter_pipeline = create_filter_pipeline(&ctx.device);
        let blit_pipeline = create_blit_pipeline(&ctx.device);

        Self {
            ctx,
            sprite_pipeline,
            stamp_pipeline,
            filter_pipeline,
            blit_pipeline,
            textures: HashMap::new(),
            next_texture_id: 1,
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn load_texture_from_bytes(&mut self, bytes: &[u8]) -> Result<TextureHandle> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        let dimensions = image.dimensions();
        self.load_texture_from_rgba(&image, dimensions.0, dimensions.1)
    }

    /// Load a texture from raw RGBA8 data (no decoding).
    ///
    /// `data` must be `width * height * 4` bytes.
    pub fn load_texture_from_rgba(
        &mut self,
        data: &[u8],
        width: u32,
        height: u32,
    ) -> Result<TextureHandle> {
        if data.len() != (width as usize) * (height as usize) * 4 {
            return Err(anyhow!(
                "texture data length {} does not match {}x{} RGBA8",
                data.len(),
                width,
                height
            ));
        }

        let size = Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let texture = self.ctx.device.create_texture(&TextureDescriptor {
            label: Some("veil2d-texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.ctx.queue.write_texture(
            TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: Origin3d::ZERO,
                aspect: TextureAspect::All,
            },
            data,
            TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&TextureViewDescriptor::default());
        let sampler = self.ctx.device.create_sampler(&SamplerDescriptor {
            label: Some("veil2d-sprite-sampler"),
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let handle = TextureHandle(self.next_texture_id);
        self.next_texture_id += 1;
        self.textures.insert(
            handle,
            TextureEntry {
                texture,
                view,
                sampler,
                size: (width, height),
            },
        );

        Ok(handle)
    }

    pub fn texture_size(&self, handle: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(&handle).map(|t| t.size)
    }

    /// Creates an offscreen render target that can also be sampled and
    /// read back.
    pub fn create_target(&self, width: u32, height: u32, label: &str) -> RenderTarget {
        let texture = self.ctx.device.create_texture(&TextureDescriptor {
            label: Some(label),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: TextureUsages::RENDER_ATTACHMENT
                | TextureUsages::TEXTURE_BINDING
                | TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&TextureViewDescriptor::default());
        RenderTarget {
            texture,
            view,
            size: (width, height),
        }
    }

    /// Renders a sprite alone, centered in a target sized to its rendered
    /// extents, so target coordinates equal sprite-local coordinates.
    ///
    /// Used by bounds extraction; the caller reads the target back and drops
    /// it immediately.
    pub(crate) fn render_sprite_isolated(
        &self,
        texture: TextureHandle,
        rotation: f32,
        scaled_size: Vec2,
        target_size: (u32, u32),
    ) -> Result<RenderTarget> {
        let entry = self
            .textures
            .get(&texture)
            .ok_or_else(|| anyhow!("Unknown texture handle"))?;

        let (width, height) = target_size;
        let target = self.create_target(width, height, "veil2d-bounds-target");

        let center = Vec2::new(width as f32 * 0.5, height as f32 * 0.5);
        let transform = Transform2D::new(center, Vec2::ONE, rotation);
        let model = transform.to_matrix(scaled_size, Vec2::new(0.5, 0.5));
        let mvp = pixel_projection(width as f32, height as f32) * model;

        let uniforms = SpriteUniforms {
            mvp: mvp.to_cols_array_2d(),
            tint: [1.0, 1.0, 1.0, 1.0],
        };
        let uniform_buffer =
            self.ctx
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("veil2d-sprite-uniforms"),
                    contents: bytemuck::bytes_of(&uniforms),
                    usage: BufferUsages::UNIFORM,
                });

        let bind_group = self.ctx.device.create_bind_group(&BindGroupDescriptor {
            label: Some("veil2d-sprite-bind-group"),
            layout: &self.sprite_pipeline.bind_group_layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::TextureView(&entry.view),
                },
                BindGroupEntry {
                    binding: 2,
                    resource: BindingResource::Sampler(&entry.sampler),
                },
            ],
        });

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("veil2d-bounds-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("veil2d-bounds-pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                multiview_mask: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.sprite_pipeline.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, self.sprite_pipeline.vertex_buffer.slice(..));
            pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
        }
        self.ctx.queue.submit(Some(encoder.finish()));

        Ok(target)
    }

    /// Blocking readback of a render target into a tight RGBA8 buffer.
    pub fn read_target(&self, target: &RenderTarget) -> Result<Vec<u8>> {
        read_texture_tight(
            &self.ctx.device,
            &self.ctx.queue,
            &target.texture,
            target.size,
        )
    }

    /// Composites all occluder sprites into the mask target in draw order.
    ///
    /// The first pass clears the target, so an empty draw list yields an
    /// empty mask; draw lists longer than the uniform ring continue in
    /// further passes that load the previous contents. Must run to
    /// completion before any token filter samples the mask in the same
    /// frame.
    pub(crate) fn render_mask(&self, target: &RenderTarget, draws: &[StampDraw]) -> Result<()> {
        let alignment = self.stamp_pipeline.uniform_alignment;
        let uniform_size = std::mem::size_of::<StampUniforms>() as u64;

        let mut bind_groups: HashMap<TextureHandle, BindGroup> = HashMap::new();
        for draw in draws {
            if bind_groups.contains_key(&draw.texture) {
                continue;
            }
            let entry = self
                .textures
                .get(&draw.texture)
                .ok_or_else(|| anyhow!("Unknown texture handle"))?;
            let bind_group = self.ctx.device.create_bind_group(&BindGroupDescriptor {
                label: Some("veil2d-stamp-bind-group"),
                layout: &self.stamp_pipeline.bind_group_layout,
                entries: &[
                    BindGroupEntry {
                        binding: 0,
                        resource: BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: &self.stamp_pipeline.uniform_buffer,
                            offset: 0,
                            size: std::num::NonZeroU64::new(uniform_size),
                        }),
                    },
                    BindGroupEntry {
                        binding: 1,
                        resource: BindingResource::TextureView(&entry.view),
                    },
                    BindGroupEntry {
                        binding: 2,
                        resource: BindingResource::Sampler(&entry.sampler),
                    },
                ],
            });
            bind_groups.insert(draw.texture, bind_group);
        }

        let mut cleared = false;
        let mut remaining = draws;
        loop {
            let (chunk, rest) = remaining.split_at(remaining.len().min(MASK_SPRITES_PER_PASS));

            // Buffer writes are ordered against the previous submit, so the
            // ring can be reused per pass.
            for (i, draw) in chunk.iter().enumerate() {
                let uniforms = StampUniforms {
                    mvp: draw.mvp.to_cols_array_2d(),
                    encoded: draw.encoded,
                    alpha: draw.alpha,
                    _pad: 0.0,
                };
                self.ctx.queue.write_buffer(
                    &self.stamp_pipeline.uniform_buffer,
                    i as u64 * alignment,
                    bytemuck::bytes_of(&uniforms),
                );
            }

            let mut encoder = self
                .ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("veil2d-mask-encoder"),
                });
            {
                let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                    label: Some("veil2d-mask-pass"),
                    color_attachments: &[Some(RenderPassColorAttachment {
                        view: &target.view,
                        resolve_target: None,
                        ops: Operations {
                            load: if cleared {
                                LoadOp::Load
                            } else {
                                LoadOp::Clear(wgpu::Color::TRANSPARENT)
                            },
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    multiview_mask: None,
                    occlusion_query_set: None,
                    timestamp_writes: None,
                });

                pass.set_pipeline(&self.stamp_pipeline.pipeline);
                pass.set_vertex_buffer(0, self.stamp_pipeline.vertex_buffer.slice(..));

                for (i, draw) in chunk.iter().enumerate() {
                    let bind_group = bind_groups
                        .get(&draw.texture)
                        .ok_or_else(|| anyhow!("Bind group not found for texture handle"))?;
                    pass.set_bind_group(0, bind_group, &[(i as u64 * alignment) as u32]);
                    pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
                }
            }
            self.ctx.queue.submit(Some(encoder.finish()));

            cleared = true;
            remaining = rest;
            if remaining.is_empty() {
                break;
            }
        }

        Ok(())
    }

    /// Runs the occlusion filter over a token's rendered pixels.
    pub(crate) fn apply_occlusion_filter(
        &self,
        input: TextureHandle,
        mask: &RenderTarget,
        uniforms: FilterUniforms,
        output: &RenderTarget,
    ) -> Result<()> {
        let entry = self
            .textures
            .get(&input)
            .ok_or_else(|| anyhow!("Unknown texture handle"))?;

        let uniform_buffer =
            self.ctx
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("veil2d-filter-uniforms"),
                    contents: bytemuck::bytes_of(&uniforms),
                    usage: BufferUsages::UNIFORM,
                });

        let bind_group = self.ctx.device.create_bind_group(&BindGroupDescriptor {
            label: Some("veil2d-filter-bind-group"),
            layout: &self.filter_pipeline.bind_group_layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::TextureView(&entry.view),
                },
                BindGroupEntry {
                    binding: 2,
                    resource: BindingResource::Sampler(&entry.sampler),
                },
                BindGroupEntry {
                    binding: 3,
                    resource: BindingResource::TextureView(&mask.view),
                },
                BindGroupEntry {
                    binding: 4,
                    resource: BindingResource::Sampler(&self.filter_pipeline.mask_sampler),
                },
            ],
        });

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("veil2d-filter-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("veil2d-filter-pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &output.view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                multiview_mask: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.filter_pipeline.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, self.filter_pipeline.vertex_buffer.slice(..));
            pass.draw(0..FULLSCREEN_VERTICES.len() as u32, 0..1);
        }
        self.ctx.queue.submit(Some(encoder.finish()));

        Ok(())
    }

    /// Copies a texture onto a target unmodified (filter pass-through path).
    pub(crate) fn blit(&self, input: TextureHandle, output: &RenderTarget) -> Result<()> {
        let entry = self
            .textures
            .get(&input)
            .ok_or_else(|| anyhow!("Unknown texture handle"))?;

        let bind_group = self.ctx.device.create_bind_group(&BindGroupDescriptor {
            label: Some("veil2d-blit-bind-group"),
            layout: &self.blit_pipeline.bind_group_layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::TextureView(&entry.view),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::Sampler(&entry.sampler),
                },
            ],
        });

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("veil2d-blit-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("veil2d-blit-pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &output.view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                multiview_mask: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.blit_pipeline.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, self.blit_pipeline.vertex_buffer.slice(..));
            pass.draw(0..FULLSCREEN_VERTICES.len() as u32, 0..1);
        }
        self.ctx.queue.submit(Some(encoder.finish()));

        Ok(())
    }
}

fn texture_sampler_entries(first_binding: u32) -> [BindGroupLayoutEntry; 2] {
    [
        BindGroupLayoutEntry {
            binding: first_binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: BindingType::Texture {
                sample_type: TextureSampleType::Float { filterable: true },
                view_dimension: TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        },
        BindGroupLayoutEntry {
            binding: first_binding + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: BindingType::Sampler(SamplerBindingType::Filtering),
            count: None,
        },
    ]
}

fn uniform_entry(size: u64, has_dynamic_offset: bool) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset,
            min_binding_size: std::num::NonZeroU64::new(size),
        },
        count: None,
    }
}

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    vertex_attr_array![0 => Float32x2, 1 => Float32x2];

fn quad_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &QUAD_ATTRIBUTES,
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    label: &str,
    shader: &wgpu::ShaderModule,
    bind_group_layout: &BindGroupLayout,
    blend: wgpu::BlendState,
) -> RenderPipeline {
    let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[bind_group_layout],
        immediate_size: 0,
    });

    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[quad_vertex_layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(ColorTargetState {
                format: TARGET_FORMAT,
                blend: Some(blend),
                write_mask: ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: PrimitiveState::default(),
        depth_stencil: None,
        multisample: MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}

fn create_sprite_pipeline(device: &wgpu::Device) -> SpritePipeline {
    let shader = device.create_shader_module(ShaderModuleDescriptor {
        label: Some("veil2d-sprite-shader"),
        source: ShaderSource::Wgsl(include_str!("sprite.wgsl").into()),
    });

    let [tex, samp] = texture_sampler_entries(1);
    let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("veil2d-sprite-bind-group-layout"),
        entries: &[
            uniform_entry(std::mem::size_of::<SpriteUniforms>() as u64, false),
            tex,
            samp,
        ],
    });

    let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("veil2d-sprite-vertices"),
        contents: bytemuck::cast_slice(&QUAD_VERTICES),
        usage: BufferUsages::VERTEX,
    });

    let pipeline = build_pipeline(
        device,
        "veil2d-sprite-pipeline",
        &shader,
        &bind_group_layout,
        wgpu::BlendState::ALPHA_BLENDING,
    );

    SpritePipeline {
        pipeline,
        vertex_buffer,
        bind_group_layout,
    }
}

fn create_stamp_pipeline(device: &wgpu::Device) -> StampPipeline {
    let shader = device.create_shader_module(ShaderModuleDescriptor {
        label: Some("veil2d-stamp-shader"),
        source: ShaderSource::Wgsl(include_str!("stamp.wgsl").into()),
    });

    let [tex, samp] = texture_sampler_entries(1);
    let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("veil2d-stamp-bind-group-layout"),
        entries: &[
            uniform_entry(std::mem::size_of::<StampUniforms>() as u64, true),
            tex,
            samp,
        ],
    });

    let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("veil2d-stamp-vertices"),
        contents: bytemuck::cast_slice(&QUAD_VERTICES),
        usage: BufferUsages::VERTEX,
    });

    let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
    let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("veil2d-stamp-uniform-buffer"),
        size: uniform_alignment * MASK_SPRITES_PER_PASS as u64,
        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    // Occluder sprites write premultiplied channel values, so later stamps
    // overwrite earlier ones wherever their binary coverage is set.
    let pipeline = build_pipeline(
        device,
        "veil2d-stamp-pipeline",
        &shader,
        &bind_group_layout,
        wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
    );

    StampPipeline {
        pipeline,
        vertex_buffer,
        uniform_buffer,
        bind_group_layout,
        uniform_alignment,
    }
}

fn create_filter_pipeline(device: &wgpu::Device) -> FilterPipeline {
    let shader = device.create_shader_module(ShaderModuleDescriptor {
        label: Some("veil2d-filter-shader"),
        source: ShaderSource::Wgsl(include_str!("occlusion_filter.wgsl").into()),
    });

    let [token_tex, token_samp] = texture_sampler_entries(1);
    let [mask_tex, mask_samp] = texture_sampler_entries(3);
    let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("veil2d-filter-bind-group-layout"),
        entries: &[
            uniform_entry(std::mem::size_of::<FilterUniforms>() as u64, false),
            token_tex,
            token_samp,
            mask_tex,
            mask_samp,
        ],
    });

    let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("veil2d-filter-vertices"),
        contents: bytemuck::cast_slice(&FULLSCREEN_VERTICES),
        usage: BufferUsages::VERTEX,
    });

    let mask_sampler = device.create_sampler(&SamplerDescriptor {
        label: Some("veil2d-mask-sampler"),
        address_mode_u: AddressMode::ClampToEdge,
        address_mode_v: AddressMode::ClampToEdge,
        address_mode_w: AddressMode::ClampToEdge,
        mag_filter: FilterMode::Nearest,
        min_filter: FilterMode::Nearest,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        ..Default::default()
    });

    let pipeline = build_pipeline(
        device,
        "veil2d-filter-pipeline",
        &shader,
        &bind_group_layout,
        wgpu::BlendState::REPLACE,
    );

    FilterPipeline {
        pipeline,
        vertex_buffer,
        bind_group_layout,
        mask_sampler,
    }
}

fn create_blit_pipeline(device: &wgpu::Device) -> BlitPipeline {
    let shader = device.create_shader_module(ShaderModuleDescriptor {
        label: Some("veil2d-blit-shader"),
        source: ShaderSource::Wgsl(include_str!("blit.wgsl").into()),
    });

    let [tex, samp] = texture_sampler_entries(0);
    let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("veil2d-blit-bind-group-layout"),
        entries: &[tex, samp],
    });

    let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("veil2d-blit-vertices"),
        contents: bytemuck::cast_slice(&FULLSCREEN_VERTICES),
        usage: BufferUsages::VERTEX,
    });

    let pipeline = build_pipeline(
        device,
        "veil2d-blit-pipeline",
        &shader,
        &bind_group_layout,
        wgpu::BlendState::REPLACE,
    );

    BlitPipeline {
        pipeline,
        vertex_buffer,
        bind_group_layout,
    }
}
