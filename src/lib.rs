//! # phosphor: an interactive GPU particle-field display
//!
//! Continuously animates ~1.5 million atoms on a 2D canvas and, on user
//! input or an auto-cycle timer, reorganizes them into a named shape
//! through a pipeline of GPU compute kernels.
//!
//! ## Per-frame pipeline
//!
//! physics → density/velocity splat → exponential trail decay →
//! optional bloom → phosphor-tone render.
//!
//! ## Transition pipeline
//!
//! parametric shape → organic density (neural cellular automaton) →
//! importance sampling → optimal-transport assignment (GPU k-means +
//! centroid matching + intra-cluster pairing) → smoothstep morph.
//!
//! ## Quick start
//!
//! ```ignore
//! use phosphor::{app, FieldConfig};
//!
//! fn main() {
//!     env_logger::init();
//!     app::run(FieldConfig::default()).unwrap();
//! }
//! ```
//!
//! Type a shape name into the window (`dna`, `heart`, `snowflake`, ...)
//! and press Enter; Escape returns control to the auto-cycle.

pub mod app;
pub mod config;
pub mod error;
pub mod gpu;
pub mod nca;
pub mod orchestrator;
pub mod ot;
pub mod sampler;
pub mod shapes;
pub mod time;

pub use config::FieldConfig;
pub use error::{FieldError, GpuError, WeightError};
pub use nca::NcaBackend;
pub use orchestrator::Orchestrator;
pub use shapes::{resolve, ShapeLibrary};
