//! Pipeline orchestration
//!
//! This module provides the public API for packdiag.
//! It runs the full analysis from a raw pack log to the result bundle.

use std::io::Read;
use std::path::Path;

use crate::config::AnalysisConfig;
use crate::diagnosis::DiagnosisSynthesizer;
use crate::encoder::ReportEncoder;
use crate::error::DiagnosticError;
use crate::imbalance::ImbalanceRanker;
use crate::loader::DatasetLoader;
use crate::resistance::ResistanceEstimator;
use crate::statistics::PackStatistics;
use crate::types::{AnalysisResult, Dataset, NamedSeries, PlotSeries};

/// Analyse a delimited pack log held in memory.
///
/// # Arguments
/// * `csv` - Log text: header row plus one row per sample
/// * `config` - Column layout and thresholds
///
/// # Example
/// ```ignore
/// let result = analyze_csv(&log_text, &AnalysisConfig::default())?;
/// println!("{}", result.diagnosis.to_text());
/// ```
pub fn analyze_csv(csv: &str, config: &AnalysisConfig) -> Result<AnalysisResult, DiagnosticError> {
    config.validate()?;
    let dataset = DatasetLoader::load_str(csv, &config.loader)?;
    run_stages(&dataset, config)
}

/// Analyse an already-loaded dataset.
pub fn analyze_dataset(
    dataset: &Dataset,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, DiagnosticError> {
    config.thresholds.validate()?;
    run_stages(dataset, config)
}

/// Run the analysis stages over a dataset.
///
/// Pipeline stages:
/// 1. PackStatistics - Per-sample aggregates and pack delta V
/// 2. ImbalanceRanker / ResistanceEstimator - Independent rankings, forked
/// 3. DiagnosisSynthesizer - Rule-based findings
fn run_stages(
    dataset: &Dataset,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, DiagnosticError> {
    let thresholds = config.thresholds;

    // Stage 1: Row-wise statistics
    let stats = PackStatistics::compute(dataset);
    tracing::debug!(
        max_delta_v = stats.max_delta_v,
        mean_delta_v = stats.mean_delta_v,
        "Computed pack statistics"
    );

    // Stage 2: Both rankings only read the dataset, so they run side by side
    let estimator = ResistanceEstimator::new(thresholds.current_noise_floor);
    let (imbalance_ranking, resistance) = rayon::join(
        || ImbalanceRanker::rank(dataset, &stats.mean),
        || estimator.estimate(dataset),
    );

    // Stage 3: Findings
    let diagnosis = DiagnosisSynthesizer::new(thresholds).synthesize(
        stats.max_delta_v,
        stats.mean_delta_v,
        &imbalance_ranking,
        &resistance.ranking,
    );

    tracing::info!(
        samples = dataset.sample_count(),
        modules = dataset.module_count(),
        max_delta_v = stats.max_delta_v,
        findings = diagnosis.findings().len(),
        severity = diagnosis.worst_severity().map(|s| s.as_str()).unwrap_or("none"),
        "Pack analysis complete"
    );

    let series = PlotSeries {
        module_voltages: dataset
            .modules()
            .iter()
            .map(|m| NamedSeries {
                name: m.name.clone(),
                values: m.values.clone(),
            })
            .collect(),
        current: NamedSeries {
            name: dataset.current().name.clone(),
            values: dataset.current().values.clone(),
        },
        delta_v: stats.delta_v,
        mean_v: stats.mean,
        std_v: stats.std,
        max_v: stats.max,
        min_v: stats.min,
    };

    Ok(AnalysisResult {
        sample_count: dataset.sample_count(),
        module_count: dataset.module_count(),
        current_channel: dataset.current().name.clone(),
        max_delta_v: stats.max_delta_v,
        mean_delta_v: stats.mean_delta_v,
        diagnosis,
        imbalance_ranking,
        resistance_ranking: resistance.ranking,
        valid_current_transitions: resistance.valid_transitions,
        total_current_transitions: resistance.total_transitions,
        series,
    })
}

/// Reusable analyzer holding a validated configuration and a report encoder.
///
/// Each call is independent; nothing carries over between logs.
pub struct PackAnalyzer {
    config: AnalysisConfig,
    encoder: ReportEncoder,
}

impl Default for PackAnalyzer {
    fn default() -> Self {
        Self {
            config: AnalysisConfig::default(),
            encoder: ReportEncoder::new(),
        }
    }
}

impl PackAnalyzer {
    /// Create an analyzer with default thresholds and layout
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an analyzer with a specific configuration
    pub fn with_config(config: AnalysisConfig) -> Result<Self, DiagnosticError> {
        config.validate()?;
        Ok(Self {
            config,
            encoder: ReportEncoder::new(),
        })
    }

    /// Load the configuration from a TOML file
    pub fn from_config_file(path: &Path) -> Result<Self, DiagnosticError> {
        Self::with_config(AnalysisConfig::load_from_file(path)?)
    }

    /// Replace the report encoder
    pub fn with_encoder(mut self, encoder: ReportEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Load a dataset without analysing it
    pub fn load_str(&self, csv: &str) -> Result<Dataset, DiagnosticError> {
        DatasetLoader::load_str(csv, &self.config.loader)
    }

    pub fn load_reader<R: Read>(&self, reader: R) -> Result<Dataset, DiagnosticError> {
        DatasetLoader::load_reader(reader, &self.config.loader)
    }

    pub fn analyze_str(&self, csv: &str) -> Result<AnalysisResult, DiagnosticError> {
        let dataset = self.load_str(csv)?;
        run_stages(&dataset, &self.config)
    }

    pub fn analyze_reader<R: Read>(&self, reader: R) -> Result<AnalysisResult, DiagnosticError> {
        let dataset = DatasetLoader::load_reader(reader, &self.config.loader)?;
        run_stages(&dataset, &self.config)
    }

    pub fn analyze_path(&self, path: &Path) -> Result<AnalysisResult, DiagnosticError> {
        let dataset = DatasetLoader::load_path(path, &self.config.loader)?;
        run_stages(&dataset, &self.config)
    }

    /// Load a text or workbook file, chosen by extension, without analysing it
    pub fn load_file(&self, path: &Path) -> Result<Dataset, DiagnosticError> {
        DatasetLoader::load_file(path, &self.config.loader)
    }

    /// Analyse a text or workbook file, chosen by extension
    pub fn analyze_file(&self, path: &Path) -> Result<AnalysisResult, DiagnosticError> {
        let dataset = self.load_file(path)?;
        run_stages(&dataset, &self.config)
    }

    /// Analyse the first worksheet of an Excel workbook
    #[cfg(feature = "xlsx")]
    pub fn analyze_xlsx(&self, path: &Path) -> Result<AnalysisResult, DiagnosticError> {
        let dataset = DatasetLoader::load_xlsx(path, &self.config.loader)?;
        run_stages(&dataset, &self.config)
    }

    pub fn analyze_dataset(&self, dataset: &Dataset) -> Result<AnalysisResult, DiagnosticError> {
        run_stages(dataset, &self.config)
    }

    /// Analyse a log and encode the report as JSON
    pub fn analyze_to_json(&self, csv: &str, source: &str) -> Result<String, DiagnosticError> {
        let result = self.analyze_str(csv)?;
        self.encoder.encode_to_json(&result, source)
    }
}
