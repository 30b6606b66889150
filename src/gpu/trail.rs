//! Trail decay and bloom kernels.
//!
//! The trail accumulator is never cleared: every frame it is multiplied by
//! a decay factor and the fresh density is added on top, which gives the
//! phosphor afterglow a steady-state half-life of log(0.5)/log(DECAY)
//! frames. Bloom thresholds the trail and blurs the excess with a
//! separable 5x5 Gaussian in two passes.

use crate::config::FieldConfig;
use crate::gpu::buffers::FieldBuffers;
use crate::gpu::physics::storage_entry;
use crate::gpu::shader;

pub const DECAY_WGSL: &str = r#"
@group(0) @binding(0)
var<storage, read> density: array<u32>;

@group(0) @binding(1)
var<storage, read_write> trail: array<f32>;

const PIXELS: u32 = %%DISPLAY_W%% * %%DISPLAY_H%%;
const DECAY: f32 = %%DECAY%%;
// The splat deposits 8-bit fixed-point weights (~256 per atom); the trail
// runs in atoms-per-pixel units so the tone curve's reference peak holds.
const SPLAT_UNIT: f32 = 256.0;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let index = global_id.x;
    if index >= PIXELS {
        return;
    }
    trail[index] = trail[index] * DECAY + f32(density[index]) / SPLAT_UNIT;
}
"#;

pub const BLOOM_WGSL: &str = r#"
@group(0) @binding(0)
var<storage, read> trail: array<f32>;

@group(0) @binding(1)
var<storage, read_write> scratch: array<f32>;

@group(0) @binding(2)
var<storage, read_write> bloom: array<f32>;

const DISPLAY_W: u32 = %%DISPLAY_W%%;
const DISPLAY_H: u32 = %%DISPLAY_H%%;
const PIXELS: u32 = DISPLAY_W * DISPLAY_H;
const THRESHOLD: f32 = 6.0;

// 5-tap Gaussian, sigma ~ 1.5 px, normalized.
const W0: f32 = 0.2921;
const W1: f32 = 0.2339;
const W2: f32 = 0.1201;

fn tap_x(x: i32, y: u32) -> f32 {
    let cx = clamp(x, 0, i32(DISPLAY_W) - 1);
    return max(trail[y * DISPLAY_W + u32(cx)] - THRESHOLD, 0.0);
}

@compute @workgroup_size(256)
fn bloom_x(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let index = global_id.x;
    if index >= PIXELS {
        return;
    }
    let x = i32(index % DISPLAY_W);
    let y = index / DISPLAY_W;
    scratch[index] = tap_x(x - 2, y) * W2
        + tap_x(x - 1, y) * W1
        + tap_x(x, y) * W0
        + tap_x(x + 1, y) * W1
        + tap_x(x + 2, y) * W2;
}

fn tap_y(x: u32, y: i32) -> f32 {
    let cy = clamp(y, 0, i32(DISPLAY_H) - 1);
    return scratch[u32(cy) * DISPLAY_W + x];
}

@compute @workgroup_size(256)
fn bloom_y(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let index = global_id.x;
    if index >= PIXELS {
        return;
    }
    let x = index % DISPLAY_W;
    let y = i32(index / DISPLAY_W);
    bloom[index] = tap_y(x, y - 2) * W2
        + tap_y(x, y - 1) * W1
        + tap_y(x, y) * W0
        + tap_y(x, y + 1) * W1
        + tap_y(x, y + 2) * W2;
}
"#;

/// Decay pipeline plus the optional two-pass bloom.
pub struct TrailStage {
    decay_pipeline: wgpu::ComputePipeline,
    decay_bind_group: wgpu::BindGroup,
    bloom_x_pipeline: wgpu::ComputePipeline,
    bloom_y_pipeline: wgpu::ComputePipeline,
    bloom_bind_group: wgpu::BindGroup,
    bloom_enabled: bool,
    workgroups: u32,
}

impl TrailStage {
    pub fn new(device: &wgpu::Device, config: &FieldConfig, buffers: &FieldBuffers) -> Self {
        let consts = config.shader_constants();

        let decay_module = shader::create_module(device, "Decay Shader", DECAY_WGSL, &consts);
        let decay_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Decay Bind Group Layout"),
            entries: &[storage_entry(0, true), storage_entry(1, false)],
        });
        let decay_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Decay Bind Group"),
            layout: &decay_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffers.density.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffers.trail.as_entire_binding(),
                },
            ],
        });
        let decay_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Decay Pipeline Layout"),
            bind_group_layouts: &[&decay_layout],
            push_constant_ranges: &[],
        });
        let decay_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Decay Pipeline"),
            layout: Some(&decay_pipeline_layout),
            module: &decay_module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let bloom_module = shader::create_module(device, "Bloom Shader", BLOOM_WGSL, &consts);
        let bloom_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bloom Bind Group Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, false),
            ],
        });
        let bloom_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bloom Bind Group"),
            layout: &bloom_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffers.trail.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffers.bloom_tmp.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffers.bloom.as_entire_binding(),
                },
            ],
        });
        let bloom_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Bloom Pipeline Layout"),
            bind_group_layouts: &[&bloom_layout],
            push_constant_ranges: &[],
        });
        let bloom_pipeline = |entry: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Bloom Pipeline"),
                layout: Some(&bloom_pipeline_layout),
                module: &bloom_module,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        Self {
            decay_pipeline,
            decay_bind_group,
            bloom_x_pipeline: bloom_pipeline("bloom_x"),
            bloom_y_pipeline: bloom_pipeline("bloom_y"),
            bloom_bind_group,
            bloom_enabled: config.bloom,
            workgroups: config.pixel_workgroups(),
        }
    }

    /// Record decay, then the bloom passes when enabled.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder) {
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Decay Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.decay_pipeline);
            pass.set_bind_group(0, &self.decay_bind_group, &[]);
            pass.dispatch_workgroups(self.workgroups, 1, 1);
        }
        if self.bloom_enabled {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Bloom X Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.bloom_x_pipeline);
            pass.set_bind_group(0, &self.bloom_bind_group, &[]);
            pass.dispatch_workgroups(self.workgroups, 1, 1);
            drop(pass);

            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Bloom Y Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.bloom_y_pipeline);
            pass.set_bind_group(0, &self.bloom_bind_group, &[]);
            pass.dispatch_workgroups(self.workgroups, 1, 1);
        }
    }
}
