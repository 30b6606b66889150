//! Runtime configuration for the particle field.
//!
//! Every size on the GPU side derives from five constants (atom count,
//! shape grid dimensions, display grid dimensions, centroid count), so all
//! of them live here together with the timing and physics tunables. The
//! shaders bake these values as literals at pipeline-build time; changing
//! any of them requires rebuilding the pipelines.

use crate::error::FieldError;

/// Number of state channels in the NCA MLP back-end.
pub const NCA_CHANNELS: usize = 16;
/// Perception features per cell: identity + Sobel-X + Sobel-Y per channel.
pub const NCA_PERCEPT: usize = 3 * NCA_CHANNELS;
/// Deterministic nonlinear features of the scalar goal.
pub const NCA_GOAL_FEATURES: usize = 8;
/// Total MLP input width.
pub const NCA_FEATURES: usize = NCA_PERCEPT + NCA_GOAL_FEATURES;
/// Hidden units in the update MLP.
pub const NCA_HIDDEN: usize = 64;

/// Compute workgroup size shared by every per-atom and per-pixel kernel.
pub const WORKGROUP_SIZE: u32 = 256;

/// All tunables for the display and its transition pipeline.
#[derive(Debug, Clone)]
pub struct FieldConfig {
    /// Number of atoms.
    pub atom_count: u32,
    /// Display accumulator width in pixels.
    pub display_w: u32,
    /// Display accumulator height in pixels.
    pub display_h: u32,
    /// Shape/density grid width.
    pub grid_w: u32,
    /// Shape/density grid height.
    pub grid_h: u32,
    /// Number of k-means centroids per cloud.
    pub clusters: u32,
    /// K-means refinement iterations.
    pub kmeans_iters: u32,
    /// NCA rollout steps per transition.
    pub nca_steps: u32,
    /// Probability that a cell fires on a given NCA step.
    pub fire_rate: f32,
    /// Seconds a morph takes from source to target.
    pub morph_duration: f32,
    /// Seconds a finished shape is held before the auto-cycle advances.
    pub hold_duration: f32,
    /// Per-frame trail decay factor, in (0, 1).
    pub decay: f32,
    /// Speed clamp for wander mode, NDC units per second.
    pub max_vel: f32,
    /// Soft-wall boundary; quadratic repulsion starts past this |coordinate|.
    pub bound: f32,
    /// Fixed-point multiplier for k-means position accumulation.
    pub scale: u32,
    /// Whether the bloom passes run.
    pub bloom: bool,
    /// Path to the NCA weight file. Missing or malformed selects the
    /// reaction-diffusion fallback.
    pub weight_path: String,
    /// Shape names visited by the auto-cycle, in order.
    pub cycle: Vec<String>,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            atom_count: 1_500_000,
            display_w: 2560,
            display_h: 1440,
            grid_w: 128,
            grid_h: 128,
            clusters: 512,
            kmeans_iters: 6,
            nca_steps: 64,
            fire_rate: 0.5,
            morph_duration: 2.0,
            hold_duration: 3.5,
            decay: 0.90,
            max_vel: 0.55,
            bound: 0.92,
            scale: 1024,
            bloom: true,
            weight_path: "nca_weights.json".to_string(),
            cycle: [
                "circle", "star5", "ring", "dna", "heart", "spiral", "benzene", "snowflake",
                "clifford",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl FieldConfig {
    /// Check the configuration for internal consistency.
    ///
    /// The fixed-point bound is the one that actually bites: a single
    /// k-means cluster can in the worst case receive every atom, so the
    /// accumulated magnitude must satisfy `N * SCALE * max|coord| <= i32::MAX`.
    pub fn validate(&self) -> Result<(), FieldError> {
        if self.atom_count == 0 {
            return Err(FieldError::Config("atom count must be nonzero".into()));
        }
        if self.grid_w == 0 || self.grid_h == 0 {
            return Err(FieldError::Config("shape grid must be nonzero".into()));
        }
        if self.display_w == 0 || self.display_h == 0 {
            return Err(FieldError::Config("display grid must be nonzero".into()));
        }
        if self.clusters == 0 || self.clusters > self.atom_count {
            return Err(FieldError::Config(format!(
                "cluster count {} must be in 1..={}",
                self.clusters, self.atom_count
            )));
        }
        if !(self.decay > 0.0 && self.decay < 1.0) {
            return Err(FieldError::Config(format!(
                "decay {} must lie in (0, 1)",
                self.decay
            )));
        }
        if !(self.fire_rate >= 0.0 && self.fire_rate <= 1.0) {
            return Err(FieldError::Config(format!(
                "fire rate {} must lie in [0, 1]",
                self.fire_rate
            )));
        }
        let worst = self.atom_count as u64 * self.scale as u64;
        if worst > i32::MAX as u64 {
            return Err(FieldError::Config(format!(
                "fixed-point overflow: atom_count * scale = {} exceeds i32::MAX; lower --scale",
                worst
            )));
        }
        if self.cycle.is_empty() {
            return Err(FieldError::Config("auto-cycle list must not be empty".into()));
        }
        Ok(())
    }

    /// Atoms per display pixel row, for the startup banner.
    pub fn display_pixels(&self) -> u32 {
        self.display_w * self.display_h
    }

    /// Cells in the shape grid.
    pub fn grid_cells(&self) -> u32 {
        self.grid_w * self.grid_h
    }

    /// Workgroup count for a one-thread-per-atom dispatch.
    pub fn atom_workgroups(&self) -> u32 {
        self.atom_count.div_ceil(WORKGROUP_SIZE)
    }

    /// Workgroup count for a one-thread-per-display-pixel dispatch.
    pub fn pixel_workgroups(&self) -> u32 {
        self.display_pixels().div_ceil(WORKGROUP_SIZE)
    }

    /// Workgroup count for a one-thread-per-grid-cell dispatch.
    pub fn cell_workgroups(&self) -> u32 {
        self.grid_cells().div_ceil(WORKGROUP_SIZE)
    }

    /// The constant table injected into every shader source.
    ///
    /// Integer constants are emitted as `u32` literals, floats with a
    /// guaranteed decimal point so WGSL types them as f32.
    pub fn shader_constants(&self) -> Vec<(&'static str, String)> {
        vec![
            ("N", format!("{}u", self.atom_count)),
            ("DISPLAY_W", format!("{}u", self.display_w)),
            ("DISPLAY_H", format!("{}u", self.display_h)),
            ("GRID_W", format!("{}u", self.grid_w)),
            ("GRID_H", format!("{}u", self.grid_h)),
            ("K", format!("{}u", self.clusters)),
            ("SCALE", float_literal(self.scale as f32)),
            ("DECAY", float_literal(self.decay)),
            ("MAX_VEL", float_literal(self.max_vel)),
            ("BOUND", float_literal(self.bound)),
            ("FIRE_RATE", float_literal(self.fire_rate)),
        ]
    }
}

/// Format an f32 so the WGSL literal always parses as a float.
fn float_literal(v: f32) -> String {
    let s = format!("{}", v);
    if s.contains('.') || s.contains('e') {
        s
    } else {
        format!("{}.0", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        FieldConfig::default().validate().unwrap();
    }

    #[test]
    fn test_scale_overflow_rejected() {
        let cfg = FieldConfig {
            scale: 16384,
            ..FieldConfig::default()
        };
        // 1.5M atoms * 16384 overflows i32; the historical default of 16384
        // is only safe for small clouds.
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_scale_ok_for_small_cloud() {
        let cfg = FieldConfig {
            atom_count: 100_000,
            clusters: 512,
            scale: 16384,
            ..FieldConfig::default()
        };
        cfg.validate().unwrap();
    }

    #[test]
    fn test_decay_bounds() {
        let cfg = FieldConfig {
            decay: 1.0,
            ..FieldConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_clusters_capped_by_atoms() {
        let cfg = FieldConfig {
            atom_count: 100,
            clusters: 512,
            ..FieldConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_float_literals_have_decimal_point() {
        for (_, v) in FieldConfig::default().shader_constants() {
            // Every constant must parse as a typed literal: either a u32
            // with trailing `u` or a float containing `.` or an exponent.
            assert!(
                v.ends_with('u') || v.contains('.') || v.contains('e'),
                "bad literal: {}",
                v
            );
        }
    }

    #[test]
    fn test_workgroup_rounding() {
        let cfg = FieldConfig {
            atom_count: 257,
            clusters: 16,
            ..FieldConfig::default()
        };
        assert_eq!(cfg.atom_workgroups(), 2);
    }
}
