//! Control state machine and frame/transition coordination.
//!
//! The orchestrator owns every GPU resource for the process lifetime and
//! enforces the one concurrency rule of the whole system: only one shape
//! transition is ever in flight. The frame loop (`redraw`) is
//! non-blocking. A transition (`goto_shape`) runs its pipeline inline
//! (NCA rollout, sampling, k-means, matching, pairing) with the two
//! buffer readbacks as the only blocking points.
//!
//! Global states:
//! - wander: `has_targets` false, atoms follow the sinusoidal field.
//! - morph: `morph_t` advances by dt / MORPH_DURATION per frame.
//! - hold: `morph_t` at 1; the hold timer runs and, unless the user owns
//!   the display, the auto-cycle advances when it expires.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use winit::window::Window;

use crate::config::FieldConfig;
use crate::error::FieldError;
use crate::gpu::buffers::FieldBuffers;
use crate::gpu::kmeans::KmeansStage;
use crate::gpu::nca::NcaStage;
use crate::gpu::physics::{PhysicsStage, SimParams};
use crate::gpu::render::{RenderParams, RenderStage};
use crate::gpu::splat::SplatStage;
use crate::gpu::trail::TrailStage;
use crate::gpu::GpuContext;
use crate::nca::NcaBackend;
use crate::ot::OtWorkspace;
use crate::sampler::Sampler;
use crate::shapes::{self, ShapeLibrary};
use crate::time::Time;

/// Largest dt fed to the simulation; longer frames are clamped so a hitch
/// cannot teleport atoms.
const MAX_DT: f32 = 0.033;

/// Seconds of free wander after startup before the auto-cycle begins.
const WANDER_INTRO: f32 = 5.0;

/// Text labels the core exposes to whatever HUD the host renders.
#[derive(Debug, Default)]
pub struct Hud {
    /// Resolved canonical name of the current shape.
    pub status: String,
    /// Current phase: wander, `nca · growing`, `ot · k-means`,
    /// `morph NN%`, or `hold X.Xs`.
    pub phase: String,
}

pub struct Orchestrator {
    config: FieldConfig,
    ctx: GpuContext,
    buffers: FieldBuffers,
    physics: PhysicsStage,
    splat: SplatStage,
    trail: TrailStage,
    render: RenderStage,
    nca: NcaStage,
    kmeans: KmeansStage,
    shapes: ShapeLibrary,
    sampler: Sampler,
    ot: OtWorkspace,
    time: Time,

    has_targets: bool,
    morph_t: f32,
    hold: f32,
    transitioning: bool,
    user_controlled: bool,
    cycle_index: usize,

    // CPU mirrors and transition workspaces, allocated once.
    source_mirror: Vec<[f32; 2]>,
    target_mirror: Vec<[f32; 2]>,
    target_samples: Vec<[f32; 2]>,
    alpha: Vec<f32>,
    src_centroids: Vec<[f32; 2]>,
    tgt_centroids: Vec<[f32; 2]>,
    src_labels: Vec<u32>,
    tgt_labels: Vec<u32>,
    assigned: Vec<[f32; 2]>,

    pub hud: Hud,
}

impl Orchestrator {
    pub async fn new(window: Arc<Window>, config: FieldConfig) -> Result<Self, FieldError> {
        config.validate()?;
        let ctx = GpuContext::new(window).await?;

        let backend = NcaBackend::select(&config.weight_path);
        let channels = match &backend {
            NcaBackend::Mlp(_) => crate::config::NCA_CHANNELS,
            NcaBackend::Rds => 1,
        };

        let mut buffers = FieldBuffers::new(&ctx.device, &config, channels);
        if let NcaBackend::Mlp(weights) = &backend {
            buffers.upload_weights(&ctx.device, &ctx.queue, weights);
        }

        let physics = PhysicsStage::new(&ctx.device, &config, &buffers);
        let splat = SplatStage::new(&ctx.device, &config, &buffers);
        let trail = TrailStage::new(&ctx.device, &config, &buffers);
        let render = RenderStage::new(&ctx.device, &config, &buffers, ctx.config.format);
        let nca = NcaStage::new(&ctx.device, &config, &buffers, &backend);
        let kmeans = KmeansStage::new(&ctx.device, &config, &buffers);

        let n = config.atom_count as usize;
        let k = config.clusters as usize;
        let cells = config.grid_cells() as usize;

        // Initial scatter: uniform cloud, zero velocity, mirrored on the
        // CPU so the first transition has a source cloud to cluster.
        let mut rng = StdRng::from_entropy();
        let mut atoms = vec![[0.0f32; 4]; n];
        let mut scatter = vec![[0.0f32; 2]; n];
        for (atom, mirror) in atoms.iter_mut().zip(scatter.iter_mut()) {
            let x = rng.gen_range(-0.9f32..0.9);
            let y = rng.gen_range(-0.9f32..0.9);
            *atom = [x, y, 0.0, 0.0];
            *mirror = [x, y];
        }
        ctx.queue.write_buffer(&buffers.atoms[0], 0, bytemuck::cast_slice(&atoms));
        ctx.queue.write_buffer(&buffers.atoms[1], 0, bytemuck::cast_slice(&atoms));
        ctx.queue.write_buffer(&buffers.source, 0, bytemuck::cast_slice(&scatter));
        ctx.queue.write_buffer(&buffers.target, 0, bytemuck::cast_slice(&scatter));
        drop(atoms);

        let params = RenderParams {
            surface_w: ctx.config.width as f32,
            surface_h: ctx.config.height as f32,
            _pad: [0.0; 2],
        };
        ctx.queue
            .write_buffer(&buffers.render_params, 0, bytemuck::bytes_of(&params));

        let shapes = ShapeLibrary::new(config.grid_w, config.grid_h);
        let sampler = Sampler::new(config.grid_w, config.grid_h);
        let ot = OtWorkspace::new(config.atom_count, config.clusters);

        Ok(Self {
            physics,
            splat,
            trail,
            render,
            nca,
            kmeans,
            shapes,
            sampler,
            ot,
            time: Time::new(),
            has_targets: false,
            morph_t: 0.0,
            hold: 0.0,
            transitioning: false,
            user_controlled: false,
            cycle_index: 0,
            source_mirror: scatter.clone(),
            target_mirror: scatter,
            target_samples: vec![[0.0; 2]; n],
            alpha: vec![0.0; cells],
            src_centroids: vec![[0.0; 2]; k],
            tgt_centroids: vec![[0.0; 2]; k],
            src_labels: vec![0; n],
            tgt_labels: vec![0; n],
            assigned: vec![[0.0; 2]; n],
            hud: Hud {
                status: "scatter".to_string(),
                phase: "wander".to_string(),
            },
            config,
            ctx,
            buffers,
        })
    }

    /// Advance the state machine and submit one frame of GPU work.
    pub fn redraw(&mut self) -> Result<(), wgpu::SurfaceError> {
        self.time.update();
        let dt = self.time.delta().min(MAX_DT);

        if self.has_targets {
            if self.morph_t < 1.0 {
                self.morph_t = (self.morph_t + dt / self.config.morph_duration).min(1.0);
                self.hud.phase = format!("morph {:.0}%", self.morph_t * 100.0);
                if self.morph_t >= 1.0 {
                    self.hold = 0.0;
                }
            } else {
                self.hold += dt;
                self.hud.phase = format!("hold {:.1}s", self.hold);
                if !self.user_controlled
                    && self.hold >= self.config.hold_duration
                    && !self.transitioning
                {
                    self.advance_cycle();
                }
            }
        } else if self.time.elapsed() > WANDER_INTRO
            && !self.user_controlled
            && !self.transitioning
        {
            // Leave the startup wander and begin cycling shapes.
            self.advance_cycle();
        }

        let params = SimParams {
            dt,
            time: self.time.elapsed(),
            has_targets: if self.has_targets { 1.0 } else { 0.0 },
            morph_t: self.morph_t,
        };
        self.ctx
            .queue
            .write_buffer(&self.buffers.sim_params, 0, bytemuck::bytes_of(&params));
        self.buffers.clear_frame_accumulators(&self.ctx.queue);

        let frame = self.ctx.surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let slot = (self.time.frame() & 1) as usize;
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Frame") });
        self.physics.encode(&mut encoder, slot);
        self.splat.encode(&mut encoder, slot ^ 1);
        self.trail.encode(&mut encoder);
        self.render.encode(&mut encoder, &view);
        self.ctx.queue.submit(Some(encoder.finish()));
        frame.present();

        Ok(())
    }

    /// Run the full transition pipeline toward the named shape.
    ///
    /// Rejected (returning `None`) while another transition is in flight;
    /// requests are dropped, never queued. Unknown names fall back to the
    /// default shape, so this cannot fail on bad input.
    pub fn goto_shape(&mut self, text: &str) -> Option<&'static str> {
        if self.transitioning {
            log::debug!("transition rejected: one already in flight");
            return None;
        }
        self.transitioning = true;

        let canonical = shapes::resolve(text);
        log::info!("transition -> {}", canonical);
        self.hud.status = canonical.to_string();

        self.hud.phase = "nca · growing".to_string();
        let goal = self.shapes.generate(canonical);
        if let Err(e) =
            self.nca
                .run(&self.ctx.device, &self.ctx.queue, &self.buffers, goal, &mut self.alpha)
        {
            log::error!("NCA readback failed: {}", e);
            self.transitioning = false;
            return None;
        }

        self.sampler.sample_into(&self.alpha, &mut self.target_samples);

        self.hud.phase = "ot · k-means".to_string();
        // The morph departs from wherever the last morph landed, so the
        // new source cloud is the previous target mirror.
        self.source_mirror.copy_from_slice(&self.target_mirror);
        let src = self.kmeans.run(
            &self.ctx.device,
            &self.ctx.queue,
            &self.buffers,
            &self.source_mirror,
            &mut self.src_centroids,
            &mut self.src_labels,
        );
        let tgt = self.kmeans.run(
            &self.ctx.device,
            &self.ctx.queue,
            &self.buffers,
            &self.target_samples,
            &mut self.tgt_centroids,
            &mut self.tgt_labels,
        );
        if let Err(e) = src.and(tgt) {
            log::error!("k-means readback failed: {}", e);
            self.transitioning = false;
            return None;
        }

        self.ot.match_centroids(&self.src_centroids, &self.tgt_centroids);
        self.ot.assign_targets(
            &self.src_labels,
            &self.tgt_labels,
            &self.target_samples,
            &self.tgt_centroids,
            &mut self.assigned,
        );
        self.target_mirror.copy_from_slice(&self.assigned);

        self.ctx.queue.write_buffer(
            &self.buffers.source,
            0,
            bytemuck::cast_slice(&self.source_mirror),
        );
        self.ctx.queue.write_buffer(
            &self.buffers.target,
            0,
            bytemuck::cast_slice(&self.target_mirror),
        );

        self.morph_t = 0.0;
        self.hold = 0.0;
        self.has_targets = true;
        self.hud.phase = "morph 0%".to_string();
        self.transitioning = false;
        Some(canonical)
    }

    /// Side-panel submit: user takes control of the display.
    pub fn submit(&mut self, text: &str) -> Option<&'static str> {
        let resolved = self.goto_shape(text)?;
        self.user_controlled = true;
        Some(resolved)
    }

    /// Side-panel clear: release user control and advance immediately.
    pub fn clear(&mut self) {
        self.user_controlled = false;
        if !self.transitioning {
            self.advance_cycle();
        }
    }

    fn advance_cycle(&mut self) {
        let name = self.config.cycle[self.cycle_index % self.config.cycle.len()].clone();
        self.cycle_index += 1;
        self.goto_shape(&name);
    }

    /// Reconfigure the surface after a window resize. The accumulator
    /// grids keep their startup resolution; only the presentation scales.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.ctx.resize(width, height);
        let params = RenderParams {
            surface_w: self.ctx.config.width as f32,
            surface_h: self.ctx.config.height as f32,
            _pad: [0.0; 2],
        };
        self.ctx
            .queue
            .write_buffer(&self.buffers.render_params, 0, bytemuck::bytes_of(&params));
    }

    pub fn fps(&self) -> f32 {
        self.time.fps()
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.ctx.config.width, self.ctx.config.height)
    }
}
