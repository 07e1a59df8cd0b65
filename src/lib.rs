//! packdiag - Diagnostic analytics for hybrid battery pack logs
//!
//! packdiag ingests a multi-module pack voltage/current log and produces a
//! ranked health diagnosis through a deterministic, single-pass pipeline:
//! loading → per-sample statistics → imbalance and dynamic-resistance
//! rankings → rule-based diagnosis → report encoding.
//!
//! Each run is stateless: one log in, one result bundle out.

pub mod config;
pub mod diagnosis;
pub mod encoder;
pub mod error;
pub mod imbalance;
pub mod loader;
pub mod pipeline;
pub mod resistance;
pub mod statistics;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{AnalysisConfig, ChannelSchema, HeaderMatch, LoaderConfig, Thresholds};
pub use error::DiagnosticError;
pub use pipeline::{analyze_csv, analyze_dataset, PackAnalyzer};
pub use types::{AnalysisResult, Dataset, Diagnosis, Finding, FindingKind, Ranking, Severity};

/// packdiag version embedded in all reports
pub const PACKDIAG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "packdiag";
