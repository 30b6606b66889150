//! Per-atom physics kernel: wander and morph modes.
//!
//! One thread per atom. Mode is selected per frame by the `has_targets`
//! uniform: morph interpolates between the stored endpoints with an exact
//! smoothstep, wander integrates a deterministic two-frequency sinusoidal
//! force field with soft quadratic walls. Positions are hard-clamped to
//! NDC after every step.

use bytemuck::{Pod, Zeroable};

use crate::config::FieldConfig;
use crate::gpu::buffers::FieldBuffers;
use crate::gpu::shader;

/// Per-frame simulation uniform. Written once per frame, before submission.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct SimParams {
    pub dt: f32,
    pub time: f32,
    pub has_targets: f32,
    pub morph_t: f32,
}

pub const PHYSICS_WGSL: &str = r#"
struct SimParams {
    dt: f32,
    time: f32,
    has_targets: f32,
    morph_t: f32,
};

@group(0) @binding(0)
var<storage, read> atoms_in: array<vec4<f32>>;

@group(0) @binding(1)
var<storage, read_write> atoms_out: array<vec4<f32>>;

@group(0) @binding(2)
var<storage, read> morph_source: array<vec2<f32>>;

@group(0) @binding(3)
var<storage, read> morph_target: array<vec2<f32>>;

@group(0) @binding(4)
var<uniform> params: SimParams;

const N: u32 = %%N%%;
const MAX_VEL: f32 = %%MAX_VEL%%;
const BOUND: f32 = %%BOUND%%;
const WALL_K: f32 = 60.0;
const DRAG: f32 = 0.992;
const TAU: f32 = 6.2831853;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let index = global_id.x;
    if index >= N {
        return;
    }

    if params.has_targets >= 0.5 {
        // Morph: smoothstep between the stored endpoints. Velocity shrinks
        // to zero at arrival so the speed tint fades out with the motion.
        let t = clamp(params.morph_t, 0.0, 1.0);
        let s = t * t * (3.0 - 2.0 * t);
        let src = morph_source[index];
        let dst = morph_target[index];
        let pos = mix(src, dst, vec2<f32>(s, s));
        let vel = (dst - src) * (1.0 - s);
        atoms_out[index] = vec4<f32>(
            clamp(pos, vec2<f32>(-1.0, -1.0), vec2<f32>(1.0, 1.0)),
            vel,
        );
        return;
    }

    // Wander: deterministic given (time, index).
    let a = atoms_in[index];
    var pos = a.xy;
    var vel = a.zw;
    let t = params.time;
    let phase = rand(index) * TAU;
    let phase2 = rand(index + 0x9e3779b9u) * TAU;

    var force = vec2<f32>(
        sin(t * 0.9 + pos.y * 2.3 + phase) + 0.5 * sin(t * 2.7 + pos.y * 5.1 + phase2),
        cos(t * 1.1 + pos.x * 2.9 + phase) + 0.5 * cos(t * 2.3 + pos.x * 4.3 + phase2),
    ) * 0.35;

    // Soft quadratic wall repulsion outside the bound.
    if abs(pos.x) > BOUND {
        let over = abs(pos.x) - BOUND;
        force.x = force.x - sign(pos.x) * over * over * WALL_K;
    }
    if abs(pos.y) > BOUND {
        let over = abs(pos.y) - BOUND;
        force.y = force.y - sign(pos.y) * over * over * WALL_K;
    }

    vel = (vel + force * params.dt) * DRAG;
    let speed = length(vel);
    if speed > MAX_VEL {
        vel = vel * (MAX_VEL / speed);
    }
    pos = clamp(pos + vel * params.dt, vec2<f32>(-1.0, -1.0), vec2<f32>(1.0, 1.0));
    atoms_out[index] = vec4<f32>(pos, vel);
}
"#;

/// Pipeline and pre-built ping-pong bind groups for the physics kernel.
pub struct PhysicsStage {
    pipeline: wgpu::ComputePipeline,
    /// Index f & 1 reads atoms[f & 1] and writes atoms[(f & 1) ^ 1].
    bind_groups: [wgpu::BindGroup; 2],
    workgroups: u32,
}

impl PhysicsStage {
    pub fn new(device: &wgpu::Device, config: &FieldConfig, buffers: &FieldBuffers) -> Self {
        let source = format!("{}\n{}", shader::HASH_WGSL, PHYSICS_WGSL);
        let module = shader::create_module(device, "Physics Shader", &source, &config.shader_constants());

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Physics Bind Group Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, true),
                storage_entry(3, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
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

        let bind_group = |slot: usize| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Physics Bind Group"),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffers.atoms[slot].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: buffers.atoms[slot ^ 1].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: buffers.source.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: buffers.target.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: buffers.sim_params.as_entire_binding(),
                    },
                ],
            })
        };
        let bind_groups = [bind_group(0), bind_group(1)];

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Physics Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Physics Pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Self {
            pipeline,
            bind_groups,
            workgroups: config.atom_workgroups(),
        }
    }

    /// Record the physics pass for the given frame parity.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, slot: usize) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Physics Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_groups[slot], &[]);
        pass.dispatch_workgroups(self.workgroups, 1, 1);
    }
}

pub(crate) fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
