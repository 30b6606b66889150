//! GPU integration tests for the compute stages.
//!
//! These run against a headless device and return early when no adapter is
//! available, so CI without a GPU still passes. They exercise the kernels
//! the inline unit tests cannot: morph endpoint exactness, wander bounds,
//! k-means convergence on separated blobs, and the NCA alpha range.

use phosphor::config::FieldConfig;
use phosphor::gpu::buffers::FieldBuffers;
use phosphor::gpu::kmeans::KmeansStage;
use phosphor::gpu::nca::NcaStage;
use phosphor::gpu::physics::{PhysicsStage, SimParams};
use phosphor::nca::NcaBackend;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn gpu() -> Option<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))?;
    if !adapter
        .get_downlevel_capabilities()
        .flags
        .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
    {
        return None;
    }
    pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("Test Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
        },
        None,
    ))
    .ok()
}

fn small_config() -> FieldConfig {
    FieldConfig {
        atom_count: 4096,
        display_w: 256,
        display_h: 256,
        grid_w: 64,
        grid_h: 64,
        clusters: 8,
        kmeans_iters: 6,
        nca_steps: 16,
        ..FieldConfig::default()
    }
}

/// Read an atom buffer back as [x, y, vx, vy] rows.
fn read_atoms(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffer: &wgpu::Buffer,
    n: usize,
) -> Vec<[f32; 4]> {
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Test Staging"),
        size: (n * 16) as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&Default::default());
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, (n * 16) as u64);
    queue.submit(Some(encoder.finish()));

    let mut bytes = vec![0u8; n * 16];
    phosphor::gpu::read_staging(device, &staging, &mut bytes).unwrap();
    bytemuck::cast_slice(&bytes).to_vec()
}

fn write_atoms(queue: &wgpu::Queue, buffers: &FieldBuffers, atoms: &[[f32; 4]]) {
    queue.write_buffer(&buffers.atoms[0], 0, bytemuck::cast_slice(atoms));
    queue.write_buffer(&buffers.atoms[1], 0, bytemuck::cast_slice(atoms));
}

fn write_sim_params(queue: &wgpu::Queue, buffers: &FieldBuffers, params: SimParams) {
    queue.write_buffer(&buffers.sim_params, 0, bytemuck::bytes_of(&params));
}

#[test]
fn morph_endpoints_match_source_and_target() {
    let Some((device, queue)) = gpu() else {
        eprintln!("no GPU adapter; skipping");
        return;
    };
    let config = small_config();
    let n = config.atom_count as usize;
    let buffers = FieldBuffers::new(&device, &config, 1);
    let physics = PhysicsStage::new(&device, &config, &buffers);

    // Fixed scatter as source; the same cloud rotated 90 degrees as target.
    let mut rng = StdRng::seed_from_u64(11);
    let source: Vec<[f32; 2]> = (0..n)
        .map(|_| [rng.gen_range(-0.9f32..0.9), rng.gen_range(-0.9f32..0.9)])
        .collect();
    let target: Vec<[f32; 2]> = source.iter().map(|p| [-p[1], p[0]]).collect();
    queue.write_buffer(&buffers.source, 0, bytemuck::cast_slice(&source));
    queue.write_buffer(&buffers.target, 0, bytemuck::cast_slice(&target));
    write_atoms(&queue, &buffers, &vec![[0.0f32; 4]; n]);

    for (morph_t, expected) in [(0.0f32, &source), (1.0f32, &target)] {
        write_sim_params(
            &queue,
            &buffers,
            SimParams { dt: 0.016, time: 0.0, has_targets: 1.0, morph_t },
        );
        let mut encoder = device.create_command_encoder(&Default::default());
        physics.encode(&mut encoder, 0);
        queue.submit(Some(encoder.finish()));

        let atoms = read_atoms(&device, &queue, &buffers.atoms[1], n);
        for (atom, want) in atoms.iter().zip(expected.iter()) {
            assert!((atom[0] - want[0]).abs() < 1e-5, "{} vs {}", atom[0], want[0]);
            assert!((atom[1] - want[1]).abs() < 1e-5, "{} vs {}", atom[1], want[1]);
        }
    }

    // At arrival the velocity is dimmed to zero.
    let atoms = read_atoms(&device, &queue, &buffers.atoms[1], n);
    for atom in &atoms {
        assert!(atom[2].abs() < 1e-5 && atom[3].abs() < 1e-5);
    }
}

#[test]
fn wander_stays_in_bounds_and_respects_speed_clamp() {
    let Some((device, queue)) = gpu() else {
        eprintln!("no GPU adapter; skipping");
        return;
    };
    let config = FieldConfig {
        atom_count: 1000,
        ..small_config()
    };
    let n = config.atom_count as usize;
    let buffers = FieldBuffers::new(&device, &config, 1);
    let physics = PhysicsStage::new(&device, &config, &buffers);

    let mut rng = StdRng::seed_from_u64(5);
    let atoms: Vec<[f32; 4]> = (0..n)
        .map(|_| [rng.gen_range(-0.99f32..0.99), rng.gen_range(-0.99f32..0.99), 0.0, 0.0])
        .collect();
    write_atoms(&queue, &buffers, &atoms);

    let dt = 0.016f32;
    let step = |frame: u64| {
        write_sim_params(
            &queue,
            &buffers,
            SimParams { dt, time: frame as f32 * dt, has_targets: 0.0, morph_t: 0.0 },
        );
        let slot = (frame & 1) as usize;
        let mut encoder = device.create_command_encoder(&Default::default());
        physics.encode(&mut encoder, slot);
        queue.submit(Some(encoder.finish()));
        slot ^ 1
    };

    let mut written = 0usize;
    for frame in 0..600u64 {
        written = step(frame);

        if frame % 100 == 99 {
            let atoms = read_atoms(&device, &queue, &buffers.atoms[written], n);
            for atom in &atoms {
                assert!(atom[0].abs() <= 1.0 && atom[1].abs() <= 1.0);
                let speed = (atom[2] * atom[2] + atom[3] * atom[3]).sqrt();
                assert!(speed <= config.max_vel * 1.001, "speed {}", speed);
            }
        }
    }

    // Per-frame displacement never exceeds the speed clamp times dt.
    let before = read_atoms(&device, &queue, &buffers.atoms[written], n);
    let written = step(600);
    let after = read_atoms(&device, &queue, &buffers.atoms[written], n);
    let limit = config.max_vel * dt * 1.01;
    for (a, b) in before.iter().zip(after.iter()) {
        let dx = a[0] - b[0];
        let dy = a[1] - b[1];
        assert!((dx * dx + dy * dy).sqrt() <= limit, "atom jumped {}", (dx * dx + dy * dy).sqrt());
    }
}

#[test]
fn kmeans_recovers_separated_blobs() {
    let Some((device, queue)) = gpu() else {
        eprintln!("no GPU adapter; skipping");
        return;
    };
    let config = small_config();
    let n = config.atom_count as usize;
    let k = config.clusters as usize;
    let buffers = FieldBuffers::new(&device, &config, 1);
    let mut kmeans = KmeansStage::new(&device, &config, &buffers);

    // K well-separated Gaussian blobs on a ring, block-ordered so the
    // evenly-spaced centroid seeding starts with one seed per blob.
    let mut rng = StdRng::seed_from_u64(99);
    let mut positions = vec![[0.0f32; 2]; n];
    let mut truth = vec![0usize; n];
    for (i, p) in positions.iter_mut().enumerate() {
        let blob = (i / (n / k)).min(k - 1);
        let theta = blob as f32 / k as f32 * std::f32::consts::TAU;
        let (cx, cy) = (0.7 * theta.cos(), 0.7 * theta.sin());
        *p = [cx + rng.gen_range(-0.02f32..0.02), cy + rng.gen_range(-0.02f32..0.02)];
        truth[i] = blob;
    }

    let mut centroids = vec![[0.0f32; 2]; k];
    let mut labels = vec![0u32; n];
    kmeans
        .run(&device, &queue, &buffers, &positions, &mut centroids, &mut labels)
        .unwrap();

    // Every label in range.
    for &l in &labels {
        assert!((l as usize) < k);
    }

    // Points of the same ground-truth blob share a k-means label, and
    // distinct blobs got distinct labels, for >= 99% of points.
    let mut blob_label = vec![None::<u32>; k];
    let mut agree = 0usize;
    for (i, &l) in labels.iter().enumerate() {
        match blob_label[truth[i]] {
            None => {
                blob_label[truth[i]] = Some(l);
                agree += 1;
            }
            Some(expect) => {
                if l == expect {
                    agree += 1;
                }
            }
        }
    }
    assert!(agree as f64 / n as f64 >= 0.99, "agreement {}", agree as f64 / n as f64);

    let mut distinct: Vec<u32> = blob_label.iter().flatten().copied().collect();
    distinct.sort_unstable();
    distinct.dedup();
    assert_eq!(distinct.len(), k, "blobs collapsed onto shared centroids");
}

#[test]
fn rds_nca_produces_alpha_in_unit_range() {
    let Some((device, queue)) = gpu() else {
        eprintln!("no GPU adapter; skipping");
        return;
    };
    let config = small_config();
    let cells = config.grid_cells() as usize;
    let buffers = FieldBuffers::new(&device, &config, 1);
    let mut nca = NcaStage::new(&device, &config, &buffers, &NcaBackend::Rds);

    // A filled disc as the goal.
    let w = config.grid_w as usize;
    let h = config.grid_h as usize;
    let mut goal = vec![0.0f32; cells];
    for row in 0..h {
        for col in 0..w {
            let x = (col as f32 + 0.5) / w as f32 * 2.0 - 1.0;
            let y = (row as f32 + 0.5) / h as f32 * 2.0 - 1.0;
            if x * x + y * y < 0.5 {
                goal[row * w + col] = 1.0;
            }
        }
    }

    let mut alpha = vec![0.0f32; cells];
    nca.run(&device, &queue, &buffers, &goal, &mut alpha).unwrap();

    let mut mass = 0.0f64;
    for &a in &alpha {
        assert!((0.0..=1.0).contains(&a), "alpha out of range: {}", a);
        mass += a as f64;
    }
    assert!(mass > 1.0, "alpha field degenerated to zero");

    // The grown density still concentrates inside the goal disc.
    let center = alpha[(h / 2) * w + w / 2];
    let corner = alpha[0];
    assert!(center > corner, "center {} vs corner {}", center, corner);
}
