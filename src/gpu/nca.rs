//! Neural cellular automaton inference on the shape grid.
//!
//! Grows an organic density field from the parametric goal before the
//! sampler draws target positions from it. Two back-ends share the same
//! protocol (`run(goal) -> alpha`, both grids `GRID_W x GRID_H` in
//! [0, 1]):
//!
//! - MLP: 16 state channels per cell. Each step perceives the
//!   neighborhood through identity/Sobel-X/Sobel-Y kernels (48 features),
//!   appends 8 deterministic nonlinear features of the goal, pushes the 56
//!   values through a 64-unit ReLU layer and adds the resulting 16-channel
//!   delta under a per-cell stochastic fire mask derived from a hash of
//!   (x, y, step). State is clamped to [-1, 1]; channel 0 clamped to
//!   [0, 1] is the alpha output.
//! - Reaction-diffusion: a single channel seeded from goal + noise,
//!   relaxed by a Gaussian laplacian, a logistic reaction term, and a weak
//!   pull toward the goal. The final field is the alpha output directly.
//!
//! Each step is its own queue submission so the step-index uniform written
//! between submissions is strictly ordered with the dispatches around it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::FieldConfig;
use crate::error::GpuError;
use crate::gpu::buffers::FieldBuffers;
use crate::gpu::physics::storage_entry;
use crate::gpu::shader;
use crate::nca::NcaBackend;

/// Seed noise amplitude for the reaction-diffusion back-end.
const RDS_SEED_NOISE: f32 = 0.08;

pub const MLP_WGSL: &str = r#"
struct NcaParams {
    step: u32,
    pad0: u32,
    pad1: u32,
    pad2: u32,
};

@group(0) @binding(0)
var<storage, read> state_in: array<f32>;

@group(0) @binding(1)
var<storage, read_write> state_out: array<f32>;

@group(0) @binding(2)
var<storage, read> goal: array<f32>;

@group(0) @binding(3)
var<storage, read> w1: array<f32>;

@group(0) @binding(4)
var<storage, read> b1: array<f32>;

@group(0) @binding(5)
var<storage, read> w2: array<f32>;

@group(0) @binding(6)
var<storage, read> b2: array<f32>;

@group(0) @binding(7)
var<storage, read_write> alpha: array<f32>;

@group(0) @binding(8)
var<uniform> params: NcaParams;

const GRID_W: u32 = %%GRID_W%%;
const GRID_H: u32 = %%GRID_H%%;
const FIRE_RATE: f32 = %%FIRE_RATE%%;
const CELLS: u32 = GRID_W * GRID_H;
const CHANNELS: u32 = 16u;
const HIDDEN: u32 = 64u;
const FEATURES: u32 = 56u;
const PI: f32 = 3.14159265;

fn state_at(x: i32, y: i32, c: u32) -> f32 {
    let cx = clamp(x, 0, i32(GRID_W) - 1);
    let cy = clamp(y, 0, i32(GRID_H) - 1);
    return state_in[(u32(cy) * GRID_W + u32(cx)) * CHANNELS + c];
}

@compute @workgroup_size(256)
fn advance(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let index = global_id.x;
    if index >= CELLS {
        return;
    }
    let x = i32(index % GRID_W);
    let y = i32(index / GRID_W);

    // Per-cell stochastic fire mask, deterministic in (x, y, step).
    let fire = rand(hash3(vec3<u32>(u32(x), u32(y), params.step))) < FIRE_RATE;
    if !fire {
        for (var c = 0u; c < CHANNELS; c++) {
            state_out[index * CHANNELS + c] = state_in[index * CHANNELS + c];
        }
        return;
    }

    // Perception: identity, Sobel-X/8, Sobel-Y/8 per channel.
    var features: array<f32, 56>;
    for (var c = 0u; c < CHANNELS; c++) {
        features[c] = state_at(x, y, c);
        let gx = (-state_at(x - 1, y - 1, c) + state_at(x + 1, y - 1, c)
            - 2.0 * state_at(x - 1, y, c) + 2.0 * state_at(x + 1, y, c)
            - state_at(x - 1, y + 1, c) + state_at(x + 1, y + 1, c)) / 8.0;
        let gy = (-state_at(x - 1, y - 1, c) - 2.0 * state_at(x, y - 1, c) - state_at(x + 1, y - 1, c)
            + state_at(x - 1, y + 1, c) + 2.0 * state_at(x, y + 1, c) + state_at(x + 1, y + 1, c)) / 8.0;
        features[CHANNELS + c] = gx;
        features[2u * CHANNELS + c] = gy;
    }

    // Deterministic nonlinear goal features.
    let g = goal[index];
    features[48] = g;
    features[49] = g * g;
    features[50] = 1.0 - g;
    features[51] = sin(PI * g);
    features[52] = cos(2.0 * PI * g);
    features[53] = sqrt(g);
    features[54] = 4.0 * g * (1.0 - g);
    features[55] = select(0.0, 1.0, g > 0.5);

    var hidden: array<f32, 64>;
    for (var h = 0u; h < HIDDEN; h++) {
        var acc = b1[h];
        for (var j = 0u; j < FEATURES; j++) {
            acc += w1[h * FEATURES + j] * features[j];
        }
        hidden[h] = max(acc, 0.0);
    }

    for (var c = 0u; c < CHANNELS; c++) {
        var delta = b2[c];
        for (var h = 0u; h < HIDDEN; h++) {
            delta += w2[c * HIDDEN + h] * hidden[h];
        }
        state_out[index * CHANNELS + c] =
            clamp(state_in[index * CHANNELS + c] + delta, -1.0, 1.0);
    }
}

@compute @workgroup_size(256)
fn extract(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let index = global_id.x;
    if index >= CELLS {
        return;
    }
    alpha[index] = clamp(state_in[index * CHANNELS], 0.0, 1.0);
}
"#;

pub const RDS_WGSL: &str = r#"
@group(0) @binding(0)
var<storage, read> state_in: array<f32>;

@group(0) @binding(1)
var<storage, read_write> state_out: array<f32>;

@group(0) @binding(2)
var<storage, read> goal: array<f32>;

const GRID_W: u32 = %%GRID_W%%;
const GRID_H: u32 = %%GRID_H%%;
const CELLS: u32 = GRID_W * GRID_H;

fn cell_at(x: i32, y: i32) -> f32 {
    let cx = clamp(x, 0, i32(GRID_W) - 1);
    let cy = clamp(y, 0, i32(GRID_H) - 1);
    return state_in[u32(cy) * GRID_W + u32(cx)];
}

@compute @workgroup_size(256)
fn advance(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let index = global_id.x;
    if index >= CELLS {
        return;
    }
    let x = i32(index % GRID_W);
    let y = i32(index / GRID_W);
    let s = state_in[index];
    let g = goal[index];

    // Gaussian-weighted neighbor average, center excluded.
    let avg = (cell_at(x - 1, y - 1) + cell_at(x + 1, y - 1)
        + cell_at(x - 1, y + 1) + cell_at(x + 1, y + 1)) * (1.0 / 12.0)
        + (cell_at(x, y - 1) + cell_at(x, y + 1)
        + cell_at(x - 1, y) + cell_at(x + 1, y)) * (2.0 / 12.0);

    let laplacian = avg - s;
    let reaction = s * (1.0 - s) * g;
    let goal_pull = 0.04 * (g - s);
    state_out[index] = clamp(s + 0.15 * laplacian + 0.10 * reaction + goal_pull, 0.0, 1.0);
}
"#;

/// NCA pipelines and pre-built ping-pong bind groups.
pub struct NcaStage {
    step_pipeline: wgpu::ComputePipeline,
    extract_pipeline: Option<wgpu::ComputePipeline>,
    /// Parity p reads nca_state[p] and writes nca_state[p ^ 1].
    bind_groups: [wgpu::BindGroup; 2],
    steps: u32,
    cells: u32,
    workgroups: u32,
    mlp: bool,
    rng: StdRng,
    /// Host-side seed scratch for the reaction-diffusion back-end.
    seed_scratch: Vec<f32>,
    /// Readback scratch, byte view of the alpha grid.
    readback: Vec<u8>,
}

impl NcaStage {
    pub fn new(
        device: &wgpu::Device,
        config: &FieldConfig,
        buffers: &FieldBuffers,
        backend: &NcaBackend,
    ) -> Self {
        let consts = config.shader_constants();
        let cells = config.grid_cells();
        let mlp = matches!(backend, NcaBackend::Mlp(_));

        let (step_pipeline, extract_pipeline, bind_groups) = if mlp {
            let source = format!("{}\n{}", shader::HASH_WGSL, MLP_WGSL);
            let module = shader::create_module(device, "NCA MLP Shader", &source, &consts);
            let weights = buffers
                .nca_weights
                .as_ref()
                .expect("MLP back-end selected but weights were not uploaded");

            let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("NCA MLP Bind Group Layout"),
                entries: &[
                    storage_entry(0, true),
                    storage_entry(1, false),
                    storage_entry(2, true),
                    storage_entry(3, true),
                    storage_entry(4, true),
                    storage_entry(5, true),
                    storage_entry(6, true),
                    storage_entry(7, false),
                    wgpu::BindGroupLayoutEntry {
                        binding: 8,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });
            let bind_group = |parity: usize| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("NCA MLP Bind Group"),
                    layout: &layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: buffers.nca_state[parity].as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: buffers.nca_state[parity ^ 1].as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: buffers.nca_goal.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: weights.w1.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: weights.b1.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 5,
                            resource: weights.w2.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 6,
                            resource: weights.b2.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 7,
                            resource: buffers.nca_alpha.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 8,
                            resource: buffers.nca_params.as_entire_binding(),
                        },
                    ],
                })
            };
            let bind_groups = [bind_group(0), bind_group(1)];

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("NCA MLP Pipeline Layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
            let make = |entry: &str| {
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("NCA MLP Pipeline"),
                    layout: Some(&pipeline_layout),
                    module: &module,
                    entry_point: Some(entry),
                    compilation_options: Default::default(),
                    cache: None,
                })
            };
            (make("advance"), Some(make("extract")), bind_groups)
        } else {
            let module = shader::create_module(device, "NCA RDS Shader", RDS_WGSL, &consts);
            let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("NCA RDS Bind Group Layout"),
                entries: &[
                    storage_entry(0, true),
                    storage_entry(1, false),
                    storage_entry(2, true),
                ],
            });
            let bind_group = |parity: usize| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("NCA RDS Bind Group"),
                    layout: &layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: buffers.nca_state[parity].as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: buffers.nca_state[parity ^ 1].as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: buffers.nca_goal.as_entire_binding(),
                        },
                    ],
                })
            };
            let bind_groups = [bind_group(0), bind_group(1)];

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("NCA RDS Pipeline Layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("NCA RDS Pipeline"),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some("advance"),
                compilation_options: Default::default(),
                cache: None,
            });
            (pipeline, None, bind_groups)
        };

        Self {
            step_pipeline,
            extract_pipeline,
            bind_groups,
            steps: config.nca_steps,
            cells,
            workgroups: config.cell_workgroups(),
            mlp,
            rng: StdRng::from_entropy(),
            seed_scratch: vec![0.0; cells as usize],
            readback: vec![0u8; cells as usize * 4],
        }
    }

    /// Run the full rollout and read the alpha grid back into `alpha_out`.
    pub fn run(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        buffers: &FieldBuffers,
        goal: &[f32],
        alpha_out: &mut [f32],
    ) -> Result<(), GpuError> {
        assert_eq!(goal.len(), self.cells as usize);
        assert_eq!(alpha_out.len(), self.cells as usize);

        queue.write_buffer(&buffers.nca_goal, 0, bytemuck::cast_slice(goal));

        // Seed slot 0: zeros for the MLP, goal + noise for the fallback.
        if self.mlp {
            queue.write_buffer(&buffers.nca_state[0], 0, &buffers.zero_state);
        } else {
            for (s, &g) in self.seed_scratch.iter_mut().zip(goal) {
                let noise = (self.rng.gen::<f32>() * 2.0 - 1.0) * RDS_SEED_NOISE;
                *s = (g + noise).clamp(0.0, 1.0);
            }
            queue.write_buffer(&buffers.nca_state[0], 0, bytemuck::cast_slice(&self.seed_scratch));
        }

        // One submission per step: the step-index uniform written between
        // submissions is then strictly ordered around each dispatch.
        for step in 0..self.steps {
            if self.mlp {
                queue.write_buffer(
                    &buffers.nca_params,
                    0,
                    bytemuck::cast_slice(&[step, 0u32, 0, 0]),
                );
            }
            let mut encoder = device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("NCA Step") });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("NCA Step Pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.step_pipeline);
                pass.set_bind_group(0, &self.bind_groups[(step & 1) as usize], &[]);
                pass.dispatch_workgroups(self.workgroups, 1, 1);
            }
            queue.submit(Some(encoder.finish()));
        }

        // Extract channel 0 (MLP) or copy the single channel (RDS), then
        // stage the alpha grid for readback.
        let final_parity = (self.steps & 1) as usize;
        let mut encoder = device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("NCA Extract") });
        if let Some(extract) = &self.extract_pipeline {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("NCA Extract Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(extract);
            pass.set_bind_group(0, &self.bind_groups[final_parity], &[]);
            pass.dispatch_workgroups(self.workgroups, 1, 1);
            drop(pass);
        } else {
            encoder.copy_buffer_to_buffer(
                &buffers.nca_state[final_parity],
                0,
                &buffers.nca_alpha,
                0,
                self.cells as u64 * 4,
            );
        }
        encoder.copy_buffer_to_buffer(
            &buffers.nca_alpha,
            0,
            &buffers.alpha_staging,
            0,
            self.cells as u64 * 4,
        );
        queue.submit(Some(encoder.finish()));

        crate::gpu::read_staging(device, &buffers.alpha_staging, &mut self.readback)?;
        alpha_out.copy_from_slice(bytemuck::cast_slice(&self.readback));
        Ok(())
    }
}
