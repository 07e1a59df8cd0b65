//! Core types for the packdiag pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: the loaded dataset, per-sample aggregates, module rankings, the
//! diagnosis, and the result bundle handed back to callers.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::DiagnosticError;

/// One battery module's voltage time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleChannel {
    /// Column header in the source table
    pub name: String,
    /// Zero-based column position in the source table
    pub column: usize,
    /// Voltage readings (V), one per sample
    pub values: Vec<f64>,
}

/// Pack current time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentChannel {
    /// Column header in the source table
    pub name: String,
    /// Zero-based column position in the source table
    pub column: usize,
    /// Current readings (A), one per sample
    pub values: Vec<f64>,
}

/// Immutable, channel-oriented view of one pack log.
///
/// Construction guarantees at least one module channel, at least two samples,
/// equal channel lengths and finite values everywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    modules: Vec<ModuleChannel>,
    current: CurrentChannel,
    sample_count: usize,
}

impl Dataset {
    /// Build a dataset from already-parsed channels
    pub fn new(
        modules: Vec<ModuleChannel>,
        current: CurrentChannel,
    ) -> Result<Self, DiagnosticError> {
        if modules.is_empty() {
            return Err(DiagnosticError::DegenerateInput(
                "dataset has no module channels".to_string(),
            ));
        }

        let sample_count = current.values.len();
        if sample_count < 2 {
            return Err(DiagnosticError::DegenerateInput(format!(
                "dataset has {sample_count} sample(s), at least 2 are required"
            )));
        }

        for module in &modules {
            if module.values.len() != sample_count {
                return Err(DiagnosticError::DataFormat(format!(
                    "module channel '{}' has {} samples, current channel '{}' has {}",
                    module.name,
                    module.values.len(),
                    current.name,
                    sample_count
                )));
            }
            if let Some(i) = module.values.iter().position(|v| !v.is_finite()) {
                return Err(DiagnosticError::DataFormat(format!(
                    "module channel '{}' has a non-finite value at sample {i}",
                    module.name
                )));
            }
        }
        if let Some(i) = current.values.iter().position(|v| !v.is_finite()) {
            return Err(DiagnosticError::DataFormat(format!(
                "current channel '{}' has a non-finite value at sample {i}",
                current.name
            )));
        }

        Ok(Self {
            modules,
            current,
            sample_count,
        })
    }

    pub fn modules(&self) -> &[ModuleChannel] {
        &self.modules
    }

    pub fn current(&self) -> &CurrentChannel {
        &self.current
    }

    /// Number of time samples (N)
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Synthesized sample index `0..N`
    pub fn sample_index(&self) -> Range<usize> {
        0..self.sample_count
    }
}

/// Row-wise statistics across all module channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleAggregates {
    /// Mean module voltage per sample
    pub mean: Vec<f64>,
    /// Population standard deviation per sample
    pub std: Vec<f64>,
    /// Highest module voltage per sample
    pub max: Vec<f64>,
    /// Lowest module voltage per sample
    pub min: Vec<f64>,
    /// Spread `max - min` per sample
    pub delta_v: Vec<f64>,
    /// Largest spread over the whole log
    pub max_delta_v: f64,
    /// Average spread over the whole log
    pub mean_delta_v: f64,
}

/// One module's position in a ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedModule {
    pub module: String,
    pub column: usize,
    pub value: f64,
}

/// Modules ordered worst first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ranking {
    entries: Vec<RankedModule>,
}

impl Ranking {
    /// Sort entries by value, descending. Equal values keep their input order.
    pub fn from_unsorted(mut entries: Vec<RankedModule>) -> Self {
        entries.sort_by(|a, b| b.value.total_cmp(&a.value));
        Self { entries }
    }

    pub fn entries(&self) -> &[RankedModule] {
        &self.entries
    }

    /// Worst-ranked module
    pub fn top(&self) -> Option<&RankedModule> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mean of all ranked values, 0 for an empty ranking
    pub fn mean_value(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.entries.iter().map(|e| e.value).sum::<f64>() / self.entries.len() as f64
    }

    /// Value recorded for a module, by name
    pub fn value_of(&self, module: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.module == module)
            .map(|e| e.value)
    }

    /// 1-based rank of a module, by name
    pub fn rank_of(&self, module: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.module == module)
            .map(|p| p + 1)
    }
}

/// Output of the dynamic resistance stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResistanceEstimates {
    /// Modules ordered by estimated resistance (ohm), highest first
    pub ranking: Ranking,
    /// Transitions where the current step exceeded the noise floor
    pub valid_transitions: usize,
    /// All transitions (N - 1)
    pub total_transitions: usize,
}

/// Severity attached to a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Nominal,
    Alert,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Nominal => "nominal",
            Severity::Alert => "alert",
            Severity::Critical => "critical",
        }
    }
}

/// Which rule produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// Voltage spread beyond the critical limit
    ReplaceModule,
    /// Voltage spread beyond the alert limit
    ImbalanceDetected,
    /// Voltage spread within limits
    ModulesBalanced,
    /// One module's dynamic resistance stands out from the pack
    HighResistance,
}

/// One human-readable diagnostic finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub kind: FindingKind,
    /// Module the finding points at, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub message: String,
}

/// Ordered list of findings, most specific first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnosis {
    findings: Vec<Finding>,
}

impl Diagnosis {
    pub fn new(findings: Vec<Finding>) -> Self {
        Self { findings }
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Highest severity present
    pub fn worst_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }

    pub fn contains(&self, kind: FindingKind) -> bool {
        self.findings.iter().any(|f| f.kind == kind)
    }

    /// Findings rendered one per line
    pub fn to_text(&self) -> String {
        self.findings
            .iter()
            .map(|f| f.message.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A named series for plotting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedSeries {
    pub name: String,
    pub values: Vec<f64>,
}

/// Raw per-sample series exposed for plotting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotSeries {
    pub module_voltages: Vec<NamedSeries>,
    pub current: NamedSeries,
    pub delta_v: Vec<f64>,
    pub mean_v: Vec<f64>,
    pub std_v: Vec<f64>,
    pub max_v: Vec<f64>,
    pub min_v: Vec<f64>,
}

/// Complete result of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub sample_count: usize,
    pub module_count: usize,
    /// Header of the column used as pack current
    pub current_channel: String,
    pub max_delta_v: f64,
    pub mean_delta_v: f64,
    pub diagnosis: Diagnosis,
    pub imbalance_ranking: Ranking,
    pub resistance_ranking: Ranking,
    pub valid_current_transitions: usize,
    pub total_current_transitions: usize,
    pub series: PlotSeries,
}

/// Report producer metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Report provenance information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportProvenance {
    /// File name or other label of the analysed log
    pub source: String,
    pub computed_at_utc: String,
}

/// Headline numbers of a report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub sample_count: usize,
    pub module_count: usize,
    pub current_channel: String,
    pub max_delta_v: f64,
    pub mean_delta_v: f64,
    pub worst_severity: Option<Severity>,
    pub peak_imbalance_module: Option<String>,
    pub peak_resistance_module: Option<String>,
    pub valid_current_transitions: usize,
    pub total_current_transitions: usize,
}

/// Complete diagnostic report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub report_version: String,
    pub producer: ReportProducer,
    pub provenance: ReportProvenance,
    pub summary: ReportSummary,
    pub diagnosis: Diagnosis,
    pub imbalance_ranking: Ranking,
    pub resistance_ranking: Ranking,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<PlotSeries>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(name: &str, column: usize, values: Vec<f64>) -> ModuleChannel {
        ModuleChannel {
            name: name.to_string(),
            column,
            values,
        }
    }

    fn current(values: Vec<f64>) -> CurrentChannel {
        CurrentChannel {
            name: "Current".to_string(),
            column: 9,
            values,
        }
    }

    #[test]
    fn test_dataset_rejects_single_sample() {
        let result = Dataset::new(vec![channel("M1", 1, vec![3.7])], current(vec![1.0]));
        assert!(matches!(result, Err(DiagnosticError::DegenerateInput(_))));
    }

    #[test]
    fn test_dataset_rejects_no_modules() {
        let result = Dataset::new(vec![], current(vec![1.0, 2.0]));
        assert!(matches!(result, Err(DiagnosticError::DegenerateInput(_))));
    }

    #[test]
    fn test_dataset_rejects_length_mismatch() {
        let result = Dataset::new(
            vec![channel("M1", 1, vec![3.7, 3.7, 3.7])],
            current(vec![1.0, 2.0]),
        );
        assert!(matches!(result, Err(DiagnosticError::DataFormat(_))));
    }

    #[test]
    fn test_dataset_rejects_nan() {
        let result = Dataset::new(
            vec![channel("M1", 1, vec![3.7, f64::NAN])],
            current(vec![1.0, 2.0]),
        );
        assert!(matches!(result, Err(DiagnosticError::DataFormat(_))));
    }

    #[test]
    fn test_ranking_sorts_descending_and_keeps_ties_stable() {
        let ranking = Ranking::from_unsorted(vec![
            RankedModule {
                module: "A".into(),
                column: 1,
                value: 1.0,
            },
            RankedModule {
                module: "B".into(),
                column: 2,
                value: 3.0,
            },
            RankedModule {
                module: "C".into(),
                column: 3,
                value: 1.0,
            },
            RankedModule {
                module: "D".into(),
                column: 4,
                value: 3.0,
            },
        ]);

        let order: Vec<&str> = ranking.entries().iter().map(|e| e.module.as_str()).collect();
        assert_eq!(order, vec!["B", "D", "A", "C"]);
        assert_eq!(ranking.rank_of("A"), Some(3));
        assert!((ranking.mean_value() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_severity_ordering() {
        let diagnosis = Diagnosis::new(vec![
            Finding {
                severity: Severity::Nominal,
                kind: FindingKind::ModulesBalanced,
                module: None,
                message: "ok".into(),
            },
            Finding {
                severity: Severity::Alert,
                kind: FindingKind::HighResistance,
                module: Some("M3".into()),
                message: "vent".into(),
            },
        ]);
        assert_eq!(diagnosis.worst_severity(), Some(Severity::Alert));
        assert_eq!(diagnosis.to_text(), "ok\nvent");
    }
}
