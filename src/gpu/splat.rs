//! Density/velocity splat kernel.
//!
//! One thread per atom. Each atom deposits a 3x3 Gaussian footprint
//! (sigma ~ 0.707 px, fixed-point weights summing to ~256) into the
//! density accumulator, and the same footprint scaled by its encoded
//! normalized speed into the velocity accumulator. Using identical
//! weights for both keeps `velocity / (density * 65535)` a weighted
//! average of normalized speed at every pixel.

use crate::config::FieldConfig;
use crate::gpu::buffers::FieldBuffers;
use crate::gpu::physics::storage_entry;
use crate::gpu::shader;

pub const SPLAT_WGSL: &str = r#"
@group(0) @binding(0)
var<storage, read> atoms: array<vec4<f32>>;

@group(0) @binding(1)
var<storage, read_write> density: array<atomic<u32>>;

@group(0) @binding(2)
var<storage, read_write> velocity: array<atomic<u32>>;

const N: u32 = %%N%%;
const DISPLAY_W: u32 = %%DISPLAY_W%%;
const DISPLAY_H: u32 = %%DISPLAY_H%%;
const MAX_VEL: f32 = %%MAX_VEL%%;
// 2 * sigma^2 for sigma ~ 0.707 px.
const TWO_SIGMA_SQ: f32 = 1.0;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let index = global_id.x;
    if index >= N {
        return;
    }

    let a = atoms[index];
    // NDC -> continuous pixel coordinates; row 0 is NDC y = -1.
    let px = (a.x * 0.5 + 0.5) * f32(DISPLAY_W);
    let py = (a.y * 0.5 + 0.5) * f32(DISPLAY_H);
    let cx = i32(floor(px));
    let cy = i32(floor(py));
    let fx = px - f32(cx) - 0.5;
    let fy = py - f32(cy) - 0.5;

    var wx: array<f32, 3>;
    var wy: array<f32, 3>;
    var sum_x = 0.0;
    var sum_y = 0.0;
    for (var i = 0; i < 3; i++) {
        let dx = f32(i - 1) - fx;
        let dy = f32(i - 1) - fy;
        wx[i] = exp(-dx * dx / TWO_SIGMA_SQ);
        wy[i] = exp(-dy * dy / TWO_SIGMA_SQ);
        sum_x += wx[i];
        sum_y += wy[i];
    }

    let speed = clamp(length(a.zw) / MAX_VEL, 0.0, 1.0);
    let encoded = u32(speed * 65535.0);

    for (var j = 0; j < 3; j++) {
        let y = cy + j - 1;
        if y < 0 || y >= i32(DISPLAY_H) {
            continue;
        }
        for (var i = 0; i < 3; i++) {
            let x = cx + i - 1;
            if x < 0 || x >= i32(DISPLAY_W) {
                continue;
            }
            let w = u32(round(wx[i] * wy[j] / (sum_x * sum_y) * 256.0));
            if w == 0u {
                continue;
            }
            let p = u32(y) * DISPLAY_W + u32(x);
            atomicAdd(&density[p], w);
            atomicAdd(&velocity[p], encoded * w);
        }
    }
}
"#;

/// Pipeline and per-slot bind groups for the splat kernel.
pub struct SplatStage {
    pipeline: wgpu::ComputePipeline,
    /// Indexed by the atom slot the physics pass just wrote.
    bind_groups: [wgpu::BindGroup; 2],
    workgroups: u32,
}

impl SplatStage {
    pub fn new(device: &wgpu::Device, config: &FieldConfig, buffers: &FieldBuffers) -> Self {
        let module =
            shader::create_module(device, "Splat Shader", SPLAT_WGSL, &config.shader_constants());

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Splat Bind Group Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, false),
            ],
        });

        let bind_group = |slot: usize| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Splat Bind Group"),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffers.atoms[slot].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: buffers.density.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: buffers.velocity.as_entire_binding(),
                    },
                ],
            })
        };
        let bind_groups = [bind_group(0), bind_group(1)];

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Splat Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Splat Pipeline"),
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

    /// Record the splat pass reading the atom slot physics just wrote.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, written_slot: usize) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Splat Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_groups[written_slot], &[]);
        pass.dispatch_workgroups(self.workgroups, 1, 1);
    }
}
