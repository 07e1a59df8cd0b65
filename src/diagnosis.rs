//! Diagnosis synthesis
//!
//! Applies the rule set to the stage outputs:
//!
//! 1. `max_delta_v > critical_delta_v`: replace the worst imbalance module (critical)
//! 2. else `max_delta_v > alert_delta_v`: imbalance, schedule balancing (alert)
//! 3. else: modules balanced (nominal)
//! 4. independently, top resistance `> ventilation_factor × mean resistance`:
//!    check cooling (alert)
//!
//! Findings come out in rule order.

use crate::config::Thresholds;
use crate::types::{Diagnosis, Finding, FindingKind, Ranking, Severity};

/// Turns pack statistics and rankings into findings
#[derive(Debug, Clone, Copy)]
pub struct DiagnosisSynthesizer {
    thresholds: Thresholds,
}

impl Default for DiagnosisSynthesizer {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}

impl DiagnosisSynthesizer {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Evaluate every rule family and collect the findings
    pub fn synthesize(
        &self,
        max_delta_v: f64,
        mean_delta_v: f64,
        imbalance: &Ranking,
        resistance: &Ranking,
    ) -> Diagnosis {
        let mut findings = vec![self.voltage_balance(max_delta_v, mean_delta_v, imbalance)];

        if let Some(finding) = self.ventilation(resistance) {
            findings.push(finding);
        }

        Diagnosis::new(findings)
    }

    fn voltage_balance(&self, max_delta_v: f64, mean_delta_v: f64, imbalance: &Ranking) -> Finding {
        let worst = imbalance.top().map(|e| e.module.clone());
        let worst_label = worst.as_deref().unwrap_or("unknown");

        if max_delta_v > self.thresholds.critical_delta_v {
            Finding {
                severity: Severity::Critical,
                kind: FindingKind::ReplaceModule,
                message: format!(
                    "CRITICAL: Replace module {worst_label}. Delta V ({max_delta_v:.2}V) out of limits."
                ),
                module: worst,
            }
        } else if max_delta_v > self.thresholds.alert_delta_v {
            Finding {
                severity: Severity::Alert,
                kind: FindingKind::ImbalanceDetected,
                message: format!(
                    "ALERT: Imbalance detected in module {worst_label}. Maintenance/balancing recommended."
                ),
                module: worst,
            }
        } else {
            Finding {
                severity: Severity::Nominal,
                kind: FindingKind::ModulesBalanced,
                message: format!(
                    "HEALTHY: Module voltages are balanced (max delta V {max_delta_v:.2}V, mean {mean_delta_v:.2}V)."
                ),
                module: None,
            }
        }
    }

    fn ventilation(&self, resistance: &Ranking) -> Option<Finding> {
        let top = resistance.top()?;
        let threshold = resistance.mean_value() * self.thresholds.ventilation_factor;

        if top.value > threshold {
            Some(Finding {
                severity: Severity::Alert,
                kind: FindingKind::HighResistance,
                module: Some(top.module.clone()),
                message: format!(
                    "VENTILATION: High resistance detected (module {}, {:.4} ohm). Clean the fan and inspect the cooling ducts.",
                    top.module, top.value
                ),
            })
        } else {
            None
        }
    }
}
