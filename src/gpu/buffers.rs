//! Buffer registry: every persistent GPU buffer, allocated once at startup.
//!
//! Sizes all derive from five constants (atom count, shape grid, display
//! grid, centroid count) so the registry is the single place where the
//! data layout contract lives. Kernels see the same buffer in the same
//! bind-group slot for both ping-pong parities; dispatch only picks a slot
//! index. Nothing here is allocated per frame; the zero slabs used for
//! queue-write clears are part of the registry too.

use crate::config::FieldConfig;

/// All persistent GPU buffers plus the host-side zero slabs for clears.
pub struct FieldBuffers {
    /// Atom ping-pong: xy = position, zw = velocity, 16 bytes per atom.
    pub atoms: [wgpu::Buffer; 2],
    /// Morph endpoints, one vec2 per atom each.
    pub source: wgpu::Buffer,
    pub target: wgpu::Buffer,
    /// Per-frame simulation uniform (dt, time, has_targets, morph_t).
    pub sim_params: wgpu::Buffer,
    /// Surface-size uniform for the fullscreen pass.
    pub render_params: wgpu::Buffer,

    /// Display accumulators, one entry per display pixel.
    pub density: wgpu::Buffer,
    pub velocity: wgpu::Buffer,
    pub trail: wgpu::Buffer,
    pub bloom_tmp: wgpu::Buffer,
    pub bloom: wgpu::Buffer,

    /// NCA state ping-pong (cells x channels) and scalar grids.
    pub nca_state: [wgpu::Buffer; 2],
    pub nca_goal: wgpu::Buffer,
    pub nca_alpha: wgpu::Buffer,
    pub nca_params: wgpu::Buffer,
    /// MLP weights; allocated only when the learned back-end is active.
    pub nca_weights: Option<NcaWeightBuffers>,

    /// K-means inputs, outputs, and fixed-point accumulators.
    pub km_positions: wgpu::Buffer,
    pub km_centroids: wgpu::Buffer,
    pub km_labels: wgpu::Buffer,
    pub km_sum_x: wgpu::Buffer,
    pub km_sum_y: wgpu::Buffer,
    pub km_counts: wgpu::Buffer,

    /// Staging buffers for the three transition readbacks.
    pub alpha_staging: wgpu::Buffer,
    pub centroid_staging: wgpu::Buffer,
    pub label_staging: wgpu::Buffer,

    /// Pre-allocated zero slabs, written through the queue for clears.
    pub zero_display: Vec<u8>,
    pub zero_accum: Vec<u8>,
    pub zero_state: Vec<u8>,
}

pub struct NcaWeightBuffers {
    pub w1: wgpu::Buffer,
    pub b1: wgpu::Buffer,
    pub w2: wgpu::Buffer,
    pub b2: wgpu::Buffer,
}

fn storage(device: &wgpu::Device, label: &str, size: u64, extra: wgpu::BufferUsages) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::STORAGE | extra,
        mapped_at_creation: false,
    })
}

impl FieldBuffers {
    /// Allocate the registry. `nca_channels` is 16 for the MLP back-end,
    /// 1 for reaction-diffusion.
    pub fn new(device: &wgpu::Device, config: &FieldConfig, nca_channels: usize) -> Self {
        let n = config.atom_count as u64;
        let pixels = config.display_pixels() as u64;
        let cells = config.grid_cells() as u64;
        let k = config.clusters as u64;
        let state_bytes = cells * nca_channels as u64 * 4;

        let atoms = [
            storage(
                device,
                "Atom Buffer A",
                n * 16,
                wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            ),
            storage(
                device,
                "Atom Buffer B",
                n * 16,
                wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            ),
        ];
        let source = storage(device, "Morph Source", n * 8, wgpu::BufferUsages::COPY_DST);
        let target = storage(device, "Morph Target", n * 8, wgpu::BufferUsages::COPY_DST);

        let sim_params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sim Params"),
            size: 16,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let render_params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Render Params"),
            size: 16,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let density = storage(device, "Density Accumulator", pixels * 4, wgpu::BufferUsages::COPY_DST);
        let velocity = storage(device, "Velocity Accumulator", pixels * 4, wgpu::BufferUsages::COPY_DST);
        let trail = storage(device, "Trail Buffer", pixels * 4, wgpu::BufferUsages::empty());
        let bloom_tmp = storage(device, "Bloom Scratch", pixels * 4, wgpu::BufferUsages::empty());
        let bloom = storage(device, "Bloom Buffer", pixels * 4, wgpu::BufferUsages::empty());

        let nca_state = [
            storage(
                device,
                "NCA State A",
                state_bytes,
                wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            ),
            storage(
                device,
                "NCA State B",
                state_bytes,
                wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            ),
        ];
        let nca_goal = storage(device, "NCA Goal", cells * 4, wgpu::BufferUsages::COPY_DST);
        let nca_alpha = storage(
            device,
            "NCA Alpha",
            cells * 4,
            wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        );
        let nca_params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("NCA Step Params"),
            size: 16,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let km_positions = storage(device, "KMeans Positions", n * 8, wgpu::BufferUsages::COPY_DST);
        let km_centroids = storage(
            device,
            "KMeans Centroids",
            k * 8,
            wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        );
        let km_labels = storage(device, "KMeans Labels", n * 4, wgpu::BufferUsages::COPY_SRC);
        let km_sum_x = storage(device, "KMeans Sum X", k * 4, wgpu::BufferUsages::COPY_DST);
        let km_sum_y = storage(device, "KMeans Sum Y", k * 4, wgpu::BufferUsages::COPY_DST);
        let km_counts = storage(device, "KMeans Counts", k * 4, wgpu::BufferUsages::COPY_DST);

        let staging = |label: &str, size: u64| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let alpha_staging = staging("Alpha Staging", cells * 4);
        let centroid_staging = staging("Centroid Staging", k * 8);
        let label_staging = staging("Label Staging", n * 4);

        Self {
            atoms,
            source,
            target,
            sim_params,
            render_params,
            density,
            velocity,
            trail,
            bloom_tmp,
            bloom,
            nca_state,
            nca_goal,
            nca_alpha,
            nca_params,
            nca_weights: None,
            km_positions,
            km_centroids,
            km_labels,
            km_sum_x,
            km_sum_y,
            km_counts,
            alpha_staging,
            centroid_staging,
            label_staging,
            zero_display: vec![0u8; (pixels * 4) as usize],
            zero_accum: vec![0u8; (k * 4) as usize],
            zero_state: vec![0u8; state_bytes as usize],
        }
    }

    /// Upload MLP weights. Called once at startup when the learned
    /// back-end is selected.
    pub fn upload_weights(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, w: &crate::nca::MlpWeights) {
        let make = |label: &str, data: &[f32]| {
            let buf = storage(device, label, (data.len() * 4) as u64, wgpu::BufferUsages::COPY_DST);
            queue.write_buffer(&buf, 0, bytemuck::cast_slice(data));
            buf
        };
        self.nca_weights = Some(NcaWeightBuffers {
            w1: make("NCA W1", &w.w1),
            b1: make("NCA B1", &w.b1),
            w2: make("NCA W2", &w.w2),
            b2: make("NCA B2", &w.b2),
        });
    }

    /// Clear the per-frame display accumulators through the queue.
    ///
    /// Queue writes are ordered between submissions, so the clear lands
    /// after the previous frame's render and before this frame's splat.
    pub fn clear_frame_accumulators(&self, queue: &wgpu::Queue) {
        queue.write_buffer(&self.density, 0, &self.zero_display);
        queue.write_buffer(&self.velocity, 0, &self.zero_display);
    }

    /// Clear the k-means fixed-point accumulators through the queue.
    ///
    /// Never done as in-kernel stores: some implementations do not
    /// guarantee in-encoder atomic-store visibility across subsequent
    /// dispatches, and the queue write gives a hard ordering point
    /// between per-iteration submissions.
    pub fn clear_kmeans_accumulators(&self, queue: &wgpu::Queue) {
        queue.write_buffer(&self.km_sum_x, 0, &self.zero_accum);
        queue.write_buffer(&self.km_sum_y, 0, &self.zero_accum);
        queue.write_buffer(&self.km_counts, 0, &self.zero_accum);
    }
}
