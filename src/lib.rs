//! Locus - Location inference engine for geotagged user events
//!
//! Locus turns a batch of geotagged user events (logins, UPI payments, app opens)
//! into one best-guess location per user through a deterministic pipeline:
//! normalization → spatial clustering → event weighting → cluster aggregation
//! → prediction selection → anomaly detection → report assembly.
//!
//! ## Modules
//!
//! - **Pipeline**: [`analyze`] and [`LocationAnalyzer`] run the full analysis
//! - **Clustering**: DBSCAN over raw (lat, lon) degrees
//! - **Accuracy**: score a prediction against a user's events

pub mod accuracy;
pub mod aggregator;
pub mod anomaly;
pub mod clustering;
pub mod config;
pub mod error;
pub mod index;
pub mod normalizer;
pub mod pipeline;
pub mod report;
pub mod selector;
pub mod stats;
pub mod types;
pub mod weights;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use accuracy::{prediction_accuracy, PredictionAccuracy};
pub use config::AnalysisConfig;
pub use error::{ComputeError, ValidationError};
pub use pipeline::{analyze, CancellationToken, LocationAnalyzer};
pub use types::{AnalysisOutcome, AnalysisReport, LocationPrediction, RawEvent};

/// Locus version
pub const LOCUS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by tooling
pub const PRODUCER_NAME: &str = "locus";
