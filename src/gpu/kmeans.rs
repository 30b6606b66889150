//! GPU k-means over a 2D point cloud.
//!
//! One run reduces N positions to K centroids plus a per-point label
//! array. Each refinement iteration is its own queue submission: the
//! fixed-point accumulators are cleared with host queue writes *between*
//! submissions, never with in-kernel stores, because atomic-store
//! visibility across dispatches inside one encoder is not guaranteed
//! everywhere. Positions are accumulated as i32 fixed point; the scale is
//! validated at startup so even a cluster holding every point cannot
//! overflow.

use crate::config::{FieldConfig, WORKGROUP_SIZE};
use crate::error::GpuError;
use crate::gpu::buffers::FieldBuffers;
use crate::gpu::physics::storage_entry;
use crate::gpu::shader;

pub const KMEANS_WGSL: &str = r#"
@group(0) @binding(0)
var<storage, read> positions: array<vec2<f32>>;

@group(0) @binding(1)
var<storage, read_write> centroids: array<vec2<f32>>;

@group(0) @binding(2)
var<storage, read_write> labels: array<u32>;

@group(0) @binding(3)
var<storage, read_write> sum_x: array<atomic<i32>>;

@group(0) @binding(4)
var<storage, read_write> sum_y: array<atomic<i32>>;

@group(0) @binding(5)
var<storage, read_write> counts: array<atomic<u32>>;

const N: u32 = %%N%%;
const K: u32 = %%K%%;
const SCALE: f32 = %%SCALE%%;

@compute @workgroup_size(256)
fn assign(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let index = global_id.x;
    if index >= N {
        return;
    }
    let p = positions[index];
    var best = 0u;
    var best_d = 1e30;
    for (var k = 0u; k < K; k++) {
        let d = p - centroids[k];
        let dist = dot(d, d);
        if dist < best_d {
            best_d = dist;
            best = k;
        }
    }
    labels[index] = best;
}

@compute @workgroup_size(256)
fn accumulate(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let index = global_id.x;
    if index >= N {
        return;
    }
    let p = positions[index];
    let l = labels[index];
    atomicAdd(&sum_x[l], i32(round(p.x * SCALE)));
    atomicAdd(&sum_y[l], i32(round(p.y * SCALE)));
    atomicAdd(&counts[l], 1u);
}

@compute @workgroup_size(256)
fn reduce(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let k = global_id.x;
    if k >= K {
        return;
    }
    let c = atomicLoad(&counts[k]);
    if c > 0u {
        let sx = f32(atomicLoad(&sum_x[k])) / SCALE;
        let sy = f32(atomicLoad(&sum_y[k])) / SCALE;
        centroids[k] = vec2<f32>(sx / f32(c), sy / f32(c));
    }
    // Empty clusters keep their previous centroid.
}
"#;

pub struct KmeansStage {
    assign_pipeline: wgpu::ComputePipeline,
    accumulate_pipeline: wgpu::ComputePipeline,
    reduce_pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    iterations: u32,
    atom_count: u32,
    clusters: u32,
    point_workgroups: u32,
    centroid_workgroups: u32,
    seed_scratch: Vec<[f32; 2]>,
    centroid_bytes: Vec<u8>,
    label_bytes: Vec<u8>,
}

impl KmeansStage {
    pub fn new(device: &wgpu::Device, config: &FieldConfig, buffers: &FieldBuffers) -> Self {
        let module =
            shader::create_module(device, "KMeans Shader", KMEANS_WGSL, &config.shader_constants());

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("KMeans Bind Group Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, false),
                storage_entry(3, false),
                storage_entry(4, false),
                storage_entry(5, false),
            ],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("KMeans Bind Group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffers.km_positions.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffers.km_centroids.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffers.km_labels.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: buffers.km_sum_x.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: buffers.km_sum_y.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: buffers.km_counts.as_entire_binding(),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("KMeans Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let make = |entry: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("KMeans Pipeline"),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        let n = config.atom_count;
        let k = config.clusters;
        Self {
            assign_pipeline: make("assign"),
            accumulate_pipeline: make("accumulate"),
            reduce_pipeline: make("reduce"),
            bind_group,
            iterations: config.kmeans_iters,
            atom_count: n,
            clusters: k,
            point_workgroups: config.atom_workgroups(),
            centroid_workgroups: k.div_ceil(WORKGROUP_SIZE),
            seed_scratch: vec![[0.0; 2]; k as usize],
            centroid_bytes: vec![0u8; k as usize * 8],
            label_bytes: vec![0u8; n as usize * 4],
        }
    }

    /// Cluster `positions` into K centroids with converged labels.
    pub fn run(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        buffers: &FieldBuffers,
        positions: &[[f32; 2]],
        centroids_out: &mut [[f32; 2]],
        labels_out: &mut [u32],
    ) -> Result<(), GpuError> {
        assert_eq!(positions.len(), self.atom_count as usize);
        assert_eq!(centroids_out.len(), self.clusters as usize);
        assert_eq!(labels_out.len(), self.atom_count as usize);

        queue.write_buffer(&buffers.km_positions, 0, bytemuck::cast_slice(positions));

        // Seed with K evenly-spaced members of the input cloud.
        let stride = (self.atom_count / self.clusters).max(1) as usize;
        for (k, seed) in self.seed_scratch.iter_mut().enumerate() {
            *seed = positions[(k * stride).min(positions.len() - 1)];
        }
        queue.write_buffer(&buffers.km_centroids, 0, bytemuck::cast_slice(&self.seed_scratch));

        for _ in 0..self.iterations {
            // Clear through the queue: ordered after the previous
            // iteration's submission and before the next one.
            buffers.clear_kmeans_accumulators(queue);

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("KMeans Iteration"),
            });
            self.pass(&mut encoder, &self.assign_pipeline, self.point_workgroups, "Assign");
            self.pass(&mut encoder, &self.accumulate_pipeline, self.point_workgroups, "Accumulate");
            self.pass(&mut encoder, &self.reduce_pipeline, self.centroid_workgroups, "Reduce");
            queue.submit(Some(encoder.finish()));
        }

        // Final assignment against the converged centroids, then download
        // centroids and labels.
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("KMeans Final Assign"),
        });
        self.pass(&mut encoder, &self.assign_pipeline, self.point_workgroups, "Assign");
        encoder.copy_buffer_to_buffer(
            &buffers.km_centroids,
            0,
            &buffers.centroid_staging,
            0,
            self.clusters as u64 * 8,
        );
        encoder.copy_buffer_to_buffer(
            &buffers.km_labels,
            0,
            &buffers.label_staging,
            0,
            self.atom_count as u64 * 4,
        );
        queue.submit(Some(encoder.finish()));

        crate::gpu::read_staging(device, &buffers.centroid_staging, &mut self.centroid_bytes)?;
        crate::gpu::read_staging(device, &buffers.label_staging, &mut self.label_bytes)?;
        centroids_out.copy_from_slice(bytemuck::cast_slice(&self.centroid_bytes));
        labels_out.copy_from_slice(bytemuck::cast_slice(&self.label_bytes));
        Ok(())
    }

    fn pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::ComputePipeline,
        workgroups: u32,
        label: &str,
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.dispatch_workgroups(workgroups, 1, 1);
    }
}
