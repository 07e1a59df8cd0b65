//! Report encoding
//!
//! This module wraps an [`AnalysisResult`] into a versioned JSON report with
//! producer and provenance metadata. The analytical content is copied as-is;
//! only the envelope (instance id, timestamp) differs between runs.

use chrono::Utc;
use uuid::Uuid;

use crate::error::DiagnosticError;
use crate::types::{
    AnalysisResult, DiagnosticReport, ReportProducer, ReportProvenance, ReportSummary,
};
use crate::{PACKDIAG_VERSION, PRODUCER_NAME};

/// Current report schema version
pub const REPORT_VERSION: &str = "1.0.0";

/// Encoder for diagnostic reports
pub struct ReportEncoder {
    instance_id: String,
    include_series: bool,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
            include_series: true,
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self {
            instance_id,
            include_series: true,
        }
    }

    /// Leave the per-sample plotting series out of reports
    pub fn without_series(mut self) -> Self {
        self.include_series = false;
        self
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Build the report for one analysis result
    pub fn encode(&self, result: &AnalysisResult, source: &str) -> DiagnosticReport {
        let producer = ReportProducer {
            name: PRODUCER_NAME.to_string(),
            version: PACKDIAG_VERSION.to_string(),
            instance_id: self.instance_id.clone(),
        };

        let provenance = ReportProvenance {
            source: source.to_string(),
            computed_at_utc: Utc::now().to_rfc3339(),
        };

        let summary = ReportSummary {
            sample_count: result.sample_count,
            module_count: result.module_count,
            current_channel: result.current_channel.clone(),
            max_delta_v: result.max_delta_v,
            mean_delta_v: result.mean_delta_v,
            worst_severity: result.diagnosis.worst_severity(),
            peak_imbalance_module: result.imbalance_ranking.top().map(|e| e.module.clone()),
            peak_resistance_module: result.resistance_ranking.top().map(|e| e.module.clone()),
            valid_current_transitions: result.valid_current_transitions,
            total_current_transitions: result.total_current_transitions,
        };

        DiagnosticReport {
            report_version: REPORT_VERSION.to_string(),
            producer,
            provenance,
            summary,
            diagnosis: result.diagnosis.clone(),
            imbalance_ranking: result.imbalance_ranking.clone(),
            resistance_ranking: result.resistance_ranking.clone(),
            series: self.include_series.then(|| result.series.clone()),
        }
    }

    /// Encode to a pretty-printed JSON string
    pub fn encode_to_json(
        &self,
        result: &AnalysisResult,
        source: &str,
    ) -> Result<String, DiagnosticError> {
        let report = self.encode(result, source);
        serde_json::to_string_pretty(&report).map_err(DiagnosticError::JsonError)
    }
}
