use clap::Parser;

use phosphor::{app, FieldConfig};

/// Interactive GPU particle-field display.
#[derive(Parser)]
#[command(name = "phosphor")]
#[command(about = "1.5M atoms morphing between shapes via NCA densities and approximate OT")]
struct Cli {
    /// Number of atoms
    #[arg(long, default_value_t = 1_500_000)]
    atoms: u32,

    /// Display accumulator width in pixels
    #[arg(long, default_value_t = 2560)]
    display_width: u32,

    /// Display accumulator height in pixels
    #[arg(long, default_value_t = 1440)]
    display_height: u32,

    /// Shape/density grid width
    #[arg(long, default_value_t = 128)]
    grid_width: u32,

    /// Shape/density grid height
    #[arg(long, default_value_t = 128)]
    grid_height: u32,

    /// K-means centroids per cloud
    #[arg(long, default_value_t = 512)]
    clusters: u32,

    /// K-means refinement iterations
    #[arg(long, default_value_t = 6)]
    kmeans_iters: u32,

    /// NCA rollout steps per transition
    #[arg(long, default_value_t = 64)]
    nca_steps: u32,

    /// NCA per-cell fire probability
    #[arg(long, default_value_t = 0.5)]
    fire_rate: f32,

    /// Morph duration in seconds
    #[arg(long, default_value_t = 2.0)]
    morph_duration: f32,

    /// Hold duration before the auto-cycle advances, in seconds
    #[arg(long, default_value_t = 3.5)]
    hold_duration: f32,

    /// Per-frame trail decay factor, in (0, 1)
    #[arg(long, default_value_t = 0.90)]
    decay: f32,

    /// Wander speed clamp, NDC units per second
    #[arg(long, default_value_t = 0.55)]
    max_vel: f32,

    /// Soft-wall boundary coordinate
    #[arg(long, default_value_t = 0.92)]
    bound: f32,

    /// Fixed-point scale for k-means accumulation
    #[arg(long, default_value_t = 1024)]
    scale: u32,

    /// Disable the bloom passes
    #[arg(long)]
    no_bloom: bool,

    /// Path to the NCA weight file (missing selects the fallback)
    #[arg(long, default_value = "nca_weights.json")]
    weights: String,

    /// Comma-separated auto-cycle shape list
    #[arg(long)]
    cycle: Option<String>,
}

impl Cli {
    fn into_config(self) -> FieldConfig {
        let defaults = FieldConfig::default();
        FieldConfig {
            atom_count: self.atoms,
            display_w: self.display_width,
            display_h: self.display_height,
            grid_w: self.grid_width,
            grid_h: self.grid_height,
            clusters: self.clusters,
            kmeans_iters: self.kmeans_iters,
            nca_steps: self.nca_steps,
            fire_rate: self.fire_rate,
            morph_duration: self.morph_duration,
            hold_duration: self.hold_duration,
            decay: self.decay,
            max_vel: self.max_vel,
            bound: self.bound,
            scale: self.scale,
            bloom: !self.no_bloom,
            weight_path: self.weights,
            cycle: self
                .cycle
                .map(|list| {
                    list.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cycle),
        }
    }
}

fn print_banner(config: &FieldConfig) {
    log::info!("phosphor starting");
    log::info!("  atoms        : {}", config.atom_count);
    log::info!("  display grid : {}x{}", config.display_w, config.display_h);
    log::info!("  shape grid   : {}x{}", config.grid_w, config.grid_h);
    log::info!("  clusters     : {} ({} iterations)", config.clusters, config.kmeans_iters);
    log::info!("  nca          : {} steps, fire rate {}", config.nca_steps, config.fire_rate);
    log::info!("  morph / hold : {:.1}s / {:.1}s", config.morph_duration, config.hold_duration);
    log::info!("  cycle        : {}", config.cycle.join(", "));
}

fn main() {
    env_logger::init();

    let config = Cli::parse().into_config();
    print_banner(&config);

    if let Err(e) = app::run(config) {
        eprintln!("phosphor: {}", e);
        std::process::exit(1);
    }
}
