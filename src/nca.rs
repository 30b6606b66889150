//! NCA back-end selection and weight loading.
//!
//! The transition pipeline grows an organic density field from the
//! parametric goal with a neural cellular automaton. When a trained weight
//! file is present the learned MLP rule runs; otherwise a
//! reaction-diffusion rule stands in. The choice is made once at startup
//! and never revisited.
//!
//! Weight file format: a JSON object with `w1` (HIDDEN x FEATURES,
//! row-major), `b1` (HIDDEN), `w2` (CHANNELS x HIDDEN, row-major) and
//! `b2` (CHANNELS). Anything missing or mis-shaped selects the fallback
//! with a single warning; it is never an error.

use std::path::Path;

use serde::Deserialize;

use crate::config::{NCA_CHANNELS, NCA_FEATURES, NCA_HIDDEN};
use crate::error::WeightError;

/// Flattened MLP weights, validated against the fixed architecture.
#[derive(Debug, Clone)]
pub struct MlpWeights {
    /// HIDDEN x FEATURES, row-major.
    pub w1: Vec<f32>,
    /// HIDDEN.
    pub b1: Vec<f32>,
    /// CHANNELS x HIDDEN, row-major.
    pub w2: Vec<f32>,
    /// CHANNELS.
    pub b2: Vec<f32>,
}

#[derive(Deserialize)]
struct WeightFile {
    w1: Vec<Vec<f32>>,
    b1: Vec<f32>,
    w2: Vec<Vec<f32>>,
    b2: Vec<f32>,
}

/// Which update rule the NCA engine runs. Fixed for the process lifetime.
#[derive(Debug, Clone)]
pub enum NcaBackend {
    /// Learned per-cell MLP over 16 state channels.
    Mlp(MlpWeights),
    /// Single-channel reaction-diffusion rule.
    Rds,
}

impl NcaBackend {
    /// Load weights from `path`, falling back to reaction-diffusion on any
    /// failure. Logs exactly one warning when the fallback is taken.
    pub fn select(path: &str) -> Self {
        match load_weights(path) {
            Ok(w) => {
                log::info!("NCA weights loaded from {}", path);
                NcaBackend::Mlp(w)
            }
            Err(e) => {
                log::warn!("NCA weights unavailable ({}); using reaction-diffusion fallback", e);
                NcaBackend::Rds
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NcaBackend::Mlp(_) => "mlp",
            NcaBackend::Rds => "rds",
        }
    }
}

/// Parse and shape-check a weight file.
pub fn load_weights(path: impl AsRef<Path>) -> Result<MlpWeights, WeightError> {
    let text = std::fs::read_to_string(path)?;
    let file: WeightFile = serde_json::from_str(&text)?;

    let w1 = flatten_matrix(file.w1, "w1", NCA_HIDDEN, NCA_FEATURES)?;
    let w2 = flatten_matrix(file.w2, "w2", NCA_CHANNELS, NCA_HIDDEN)?;
    check_vector(&file.b1, "b1", NCA_HIDDEN)?;
    check_vector(&file.b2, "b2", NCA_CHANNELS)?;

    Ok(MlpWeights { w1, b1: file.b1, w2, b2: file.b2 })
}

fn flatten_matrix(
    rows: Vec<Vec<f32>>,
    field: &'static str,
    expect_rows: usize,
    expect_cols: usize,
) -> Result<Vec<f32>, WeightError> {
    if rows.len() != expect_rows {
        return Err(WeightError::Shape {
            field,
            expected: (expect_rows, expect_cols),
            got: (rows.len(), rows.first().map_or(0, |r| r.len())),
        });
    }
    let mut flat = Vec::with_capacity(expect_rows * expect_cols);
    for row in &rows {
        if row.len() != expect_cols {
            return Err(WeightError::Shape {
                field,
                expected: (expect_rows, expect_cols),
                got: (rows.len(), row.len()),
            });
        }
        flat.extend_from_slice(row);
    }
    Ok(flat)
}

fn check_vector(v: &[f32], field: &'static str, expect: usize) -> Result<(), WeightError> {
    if v.len() != expect {
        return Err(WeightError::Shape {
            field,
            expected: (expect, 1),
            got: (v.len(), 1),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(tag: &str, content: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("phosphor_weights_{}_{}.json", std::process::id(), tag));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    fn valid_json() -> String {
        let row56 = vec![0.01f32; NCA_FEATURES];
        let w1: Vec<Vec<f32>> = vec![row56; NCA_HIDDEN];
        let b1 = vec![0.0f32; NCA_HIDDEN];
        let row_h = vec![0.02f32; NCA_HIDDEN];
        let w2: Vec<Vec<f32>> = vec![row_h; NCA_CHANNELS];
        let b2 = vec![0.0f32; NCA_CHANNELS];
        serde_json::json!({ "w1": w1, "b1": b1, "w2": w2, "b2": b2 }).to_string()
    }

    #[test]
    fn test_load_valid_weights() {
        let path = write_temp("valid", &valid_json());
        let w = load_weights(&path).unwrap();
        assert_eq!(w.w1.len(), NCA_HIDDEN * NCA_FEATURES);
        assert_eq!(w.w2.len(), NCA_CHANNELS * NCA_HIDDEN);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_file_selects_fallback() {
        let backend = NcaBackend::select("/nonexistent/weights.json");
        assert!(matches!(backend, NcaBackend::Rds));
    }

    #[test]
    fn test_malformed_json_is_soft_error() {
        let path = write_temp("malformed", "{ not json");
        assert!(matches!(load_weights(&path), Err(WeightError::Parse(_))));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_wrong_shape_rejected() {
        let row = vec![0.0f32; NCA_FEATURES - 1];
        let w1: Vec<Vec<f32>> = vec![row; NCA_HIDDEN];
        let json = serde_json::json!({
            "w1": w1,
            "b1": vec![0.0f32; NCA_HIDDEN],
            "w2": vec![vec![0.0f32; NCA_HIDDEN]; NCA_CHANNELS],
            "b2": vec![0.0f32; NCA_CHANNELS],
        })
        .to_string();
        let path = write_temp("shape", &json);
        assert!(matches!(load_weights(&path), Err(WeightError::Shape { field: "w1", .. })));
        std::fs::remove_file(path).ok();
    }
}
