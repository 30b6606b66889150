//! Fullscreen phosphor render pass.
//!
//! Two synthesized triangles cover the surface; the fragment shader maps
//! each surface pixel into the display accumulator grid, applies a small
//! 3x3 smoothing filter to the trail, tone-maps brightness on a log curve,
//! and colors it with a green-phosphor polynomial. Bloom adds a
//! green-tinted halo and fast pixels are pushed toward white.

use bytemuck::{Pod, Zeroable};

use crate::config::FieldConfig;
use crate::gpu::buffers::FieldBuffers;

/// Surface-size uniform, rewritten on resize.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct RenderParams {
    pub surface_w: f32,
    pub surface_h: f32,
    pub _pad: [f32; 2],
}

pub const RENDER_WGSL: &str = r#"
struct RenderParams {
    surface_w: f32,
    surface_h: f32,
    pad0: f32,
    pad1: f32,
};

@group(0) @binding(0)
var<storage, read> trail: array<f32>;

@group(0) @binding(1)
var<storage, read> velocity: array<u32>;

@group(0) @binding(2)
var<storage, read> density: array<u32>;

@group(0) @binding(3)
var<storage, read> bloom: array<f32>;

@group(0) @binding(4)
var<uniform> params: RenderParams;

const DISPLAY_W: u32 = %%DISPLAY_W%%;
const DISPLAY_H: u32 = %%DISPLAY_H%%;
// Expected peak trail value; anchors the log tone curve.
const TREF: f32 = 16.0;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var quad = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>( 1.0, -1.0),
        vec2<f32>(-1.0,  1.0),
        vec2<f32>(-1.0,  1.0),
        vec2<f32>( 1.0, -1.0),
        vec2<f32>( 1.0,  1.0),
    );
    var out: VertexOutput;
    out.clip_position = vec4<f32>(quad[vertex_index], 0.0, 1.0);
    return out;
}

fn grid_index(x: i32, y: i32) -> u32 {
    let cx = clamp(x, 0, i32(DISPLAY_W) - 1);
    let cy = clamp(y, 0, i32(DISPLAY_H) - 1);
    return u32(cy) * DISPLAY_W + u32(cx);
}

fn smoothed_trail(x: i32, y: i32) -> f32 {
    // 3x3 binomial filter.
    var acc = trail[grid_index(x, y)] * 4.0;
    acc += trail[grid_index(x - 1, y)] * 2.0;
    acc += trail[grid_index(x + 1, y)] * 2.0;
    acc += trail[grid_index(x, y - 1)] * 2.0;
    acc += trail[grid_index(x, y + 1)] * 2.0;
    acc += trail[grid_index(x - 1, y - 1)];
    acc += trail[grid_index(x + 1, y - 1)];
    acc += trail[grid_index(x - 1, y + 1)];
    acc += trail[grid_index(x + 1, y + 1)];
    return acc / 16.0;
}

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    // Surface pixel -> accumulator cell. The framebuffer's y axis points
    // down while row 0 of the accumulators is NDC y = -1, so flip.
    let u = frag.x / params.surface_w;
    let v = 1.0 - frag.y / params.surface_h;
    let x = i32(u * f32(DISPLAY_W));
    let y = i32(v * f32(DISPLAY_H));
    let idx = grid_index(x, y);

    let t = smoothed_trail(x, y);
    let n = clamp(log(1.0 + t) / log(1.0 + TREF), 0.0, 1.0);

    let d = density[idx];
    var speed = 0.0;
    if d > 0u {
        speed = clamp(f32(velocity[idx]) / (f32(d) * 65535.0), 0.0, 1.0);
    }

    // Green phosphor: dark green at low brightness, near-white at the top.
    var color = vec3<f32>(
        0.10 * n + 0.55 * n * n * n,
        0.88 * n + 0.12 * n * n,
        0.22 * n + 0.45 * n * n * n,
    );
    // White-hot tint for fast atoms.
    color = mix(color, vec3<f32>(n, n, n), speed * 0.85);
    // Additive green halo from the bloom field.
    let b = clamp(log(1.0 + bloom[idx]) / log(1.0 + TREF), 0.0, 1.0);
    color += b * vec3<f32>(0.25, 0.85, 0.35) * 0.5;

    return vec4<f32>(color, 1.0);
}
"#;

pub struct RenderStage {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
}

impl RenderStage {
    pub fn new(
        device: &wgpu::Device,
        config: &FieldConfig,
        buffers: &FieldBuffers,
        surface_format: wgpu::TextureFormat,
    ) -> Self {
        let module = crate::gpu::shader::create_module(
            device,
            "Render Shader",
            RENDER_WGSL,
            &config.shader_constants(),
        );

        let fragment_storage = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Render Bind Group Layout"),
            entries: &[
                fragment_storage(0),
                fragment_storage(1),
                fragment_storage(2),
                fragment_storage(3),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Render Bind Group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffers.trail.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffers.velocity.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffers.density.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: buffers.bloom.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: buffers.render_params.as_entire_binding(),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Render Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self { pipeline, bind_group }
    }

    /// Record the fullscreen pass into `view`, clearing to opaque black.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.draw(0..6, 0..1);
    }
}
