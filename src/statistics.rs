//! Per-sample pack statistics
//!
//! For every sample, aggregates the module voltages into mean, population
//! standard deviation, max, min and spread (delta V), plus the pack-wide
//! max and mean of the spread.

use crate::types::{Dataset, SampleAggregates};

/// Computes row-wise aggregates across all module channels
pub struct PackStatistics;

impl PackStatistics {
    /// Compute aggregates for every sample of the dataset
    pub fn compute(dataset: &Dataset) -> SampleAggregates {
        let n = dataset.sample_count();
        let modules = dataset.modules();
        let k = modules.len() as f64;

        let mut mean = Vec::with_capacity(n);
        let mut std = Vec::with_capacity(n);
        let mut max = Vec::with_capacity(n);
        let mut min = Vec::with_capacity(n);
        let mut delta_v = Vec::with_capacity(n);

        for i in dataset.sample_index() {
            let row = modules.iter().map(|m| m.values[i]);

            // Shifted by the first module so a constant row has an exact mean.
            let pivot = modules[0].values[i];
            let row_mean = pivot + row.clone().map(|v| v - pivot).sum::<f64>() / k;
            let variance = row.clone().map(|v| (v - row_mean).powi(2)).sum::<f64>() / k;
            let row_max = row.clone().fold(f64::NEG_INFINITY, f64::max);
            let row_min = row.fold(f64::INFINITY, f64::min);

            mean.push(row_mean);
            std.push(variance.sqrt());
            max.push(row_max);
            min.push(row_min);
            delta_v.push(row_max - row_min);
        }

        let max_delta_v = delta_v.iter().copied().fold(0.0, f64::max);
        let mean_delta_v = delta_v.iter().sum::<f64>() / n as f64;

        SampleAggregates {
            mean,
            std,
            max,
            min,
            delta_v,
            max_delta_v,
            mean_delta_v,
        }
    }
}
