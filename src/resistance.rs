//! Dynamic resistance estimation
//!
//! Estimates each module's dynamic internal resistance from successive
//! voltage and current steps:
//!
//! ```text
//! ΔV(m, i) = v(m, i+1) - v(m, i)
//! ΔI(i)    = I(i+1) - I(i)
//! R(m)     = mean over valid i of |ΔV(m, i) / ΔI(i)|
//! ```
//!
//! A transition is valid only when `|ΔI(i)|` exceeds the noise floor; flat
//! current steps would blow the ratio up. The mask depends on the current
//! alone, so every module is averaged over the same transitions. A module with
//! no valid transitions gets an estimate of exactly 0 and still ranks.

use crate::types::{Dataset, RankedModule, Ranking, ResistanceEstimates};

/// Masked finite-difference resistance estimator
#[derive(Debug, Clone, Copy)]
pub struct ResistanceEstimator {
    noise_floor: f64,
}

impl ResistanceEstimator {
    pub fn new(noise_floor: f64) -> Self {
        Self { noise_floor }
    }

    pub fn noise_floor(&self) -> f64 {
        self.noise_floor
    }

    /// Estimate and rank dynamic resistance for every module
    pub fn estimate(&self, dataset: &Dataset) -> ResistanceEstimates {
        let current_steps = first_difference(&dataset.current().values);
        let valid: Vec<usize> = current_steps
            .iter()
            .enumerate()
            .filter(|(_, di)| di.abs() > self.noise_floor)
            .map(|(i, _)| i)
            .collect();

        if valid.is_empty() {
            tracing::warn!(
                noise_floor = self.noise_floor,
                transitions = current_steps.len(),
                "No current transition exceeds the noise floor; resistance estimates are 0"
            );
        }

        let entries = dataset
            .modules()
            .iter()
            .map(|module| RankedModule {
                module: module.name.clone(),
                column: module.column,
                value: masked_mean_ratio(&module.values, &current_steps, &valid),
            })
            .collect();

        ResistanceEstimates {
            ranking: Ranking::from_unsorted(entries),
            valid_transitions: valid.len(),
            total_transitions: current_steps.len(),
        }
    }
}

/// `x[i+1] - x[i]`, length `len - 1`
pub fn first_difference(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

fn masked_mean_ratio(voltages: &[f64], current_steps: &[f64], valid: &[usize]) -> f64 {
    if valid.is_empty() {
        return 0.0;
    }
    let total: f64 = valid
        .iter()
        .map(|&i| ((voltages[i + 1] - voltages[i]) / current_steps[i]).abs())
        .sum();
    total / valid.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CurrentChannel, ModuleChannel};

    fn dataset(modules: Vec<Vec<f64>>, current: Vec<f64>) -> Dataset {
        let modules = modules
            .into_iter()
            .enumerate()
            .map(|(i, values)| ModuleChannel {
                name: format!("M{}", i + 1),
                column: i + 1,
                values,
            })
            .collect();
        let current = CurrentChannel {
            name: "Current".to_string(),
            column: 30,
            values: current,
        };
        Dataset::new(modules, current).unwrap()
    }

    #[test]
    fn test_first_difference() {
        assert_eq!(first_difference(&[1.0, 3.0, 2.0]), vec![2.0, -1.0]);
        assert!(first_difference(&[1.0]).is_empty());
    }

    #[test]
    fn test_step_response() {
        // Current steps 10 -> 20 between samples 2 and 3; M2 drops 2 V with it.
        let data = dataset(
            vec![
                vec![3.7, 3.7, 3.7, 3.7, 3.7],
                vec![5.0, 5.0, 5.0, 3.0, 3.0],
                vec![3.7, 3.7, 3.7, 3.7, 3.7],
            ],
            vec![10.0, 10.0, 10.0, 20.0, 20.0],
        );
        let estimates = ResistanceEstimator::new(0.1).estimate(&data);

        assert_eq!(estimates.valid_transitions, 1);
        assert_eq!(estimates.total_transitions, 4);
        let top = estimates.ranking.top().unwrap();
        assert_eq!(top.module, "M2");
        assert!((top.value - 0.2).abs() < 1e-12);
        assert_eq!(estimates.ranking.value_of("M1"), Some(0.0));
    }

    #[test]
    fn test_flat_current_gives_zero_estimates() {
        let data = dataset(
            vec![vec![3.7, 3.5, 3.9], vec![3.6, 3.6, 3.6]],
            vec![12.0, 12.0, 12.0],
        );
        let estimates = ResistanceEstimator::new(0.1).estimate(&data);

        assert_eq!(estimates.valid_transitions, 0);
        assert_eq!(estimates.ranking.len(), 2);
        assert!(estimates.ranking.entries().iter().all(|e| e.value == 0.0));
    }

    #[test]
    fn test_small_current_steps_are_masked() {
        // The 0.05 A step would give 0.5 / 0.05 = 10 ohm if it were not masked.
        let data = dataset(
            vec![vec![3.0, 3.5, 4.5]],
            vec![0.0, 0.05, 10.05],
        );
        let estimates = ResistanceEstimator::new(0.1).estimate(&data);

        assert_eq!(estimates.valid_transitions, 1);
        assert!((estimates.ranking.value_of("M1").unwrap() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_step_exactly_at_floor_is_masked() {
        let data = dataset(vec![vec![3.0, 4.0]], vec![0.0, 0.5]);
        let estimates = ResistanceEstimator::new(0.5).estimate(&data);
        assert_eq!(estimates.valid_transitions, 0);
        assert_eq!(estimates.ranking.value_of("M1"), Some(0.0));
    }

    #[test]
    fn test_mean_of_absolute_ratios() {
        // Steps: ΔI = +10, -10 ; ΔV = -1, +3  => |ratios| = 0.1, 0.3
        let data = dataset(vec![vec![4.0, 3.0, 6.0]], vec![0.0, 10.0, 0.0]);
        let estimates = ResistanceEstimator::new(0.1).estimate(&data);
        assert!((estimates.ranking.value_of("M1").unwrap() - 0.2).abs() < 1e-12);
    }
}
