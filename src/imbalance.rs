//! Imbalance ranking
//!
//! Scores each module by its cumulative absolute deviation from the per-sample
//! pack mean, `Σ_i |v(m, i) - mean[i]|`, and ranks modules worst first.
//! The L1 form keeps one outlier sample from dominating the ranking while
//! still accumulating chronic small offsets.

use crate::types::{Dataset, RankedModule, Ranking};

/// Ranks modules by cumulative deviation from the pack average
pub struct ImbalanceRanker;

impl ImbalanceRanker {
    /// Rank modules given the per-sample mean from [`crate::statistics::PackStatistics`]
    pub fn rank(dataset: &Dataset, sample_mean: &[f64]) -> Ranking {
        debug_assert_eq!(sample_mean.len(), dataset.sample_count());

        let entries = dataset
            .modules()
            .iter()
            .map(|module| RankedModule {
                module: module.name.clone(),
                column: module.column,
                value: imbalance_score(&module.values, sample_mean),
            })
            .collect();

        Ranking::from_unsorted(entries)
    }
}

fn imbalance_score(values: &[f64], sample_mean: &[f64]) -> f64 {
    values
        .iter()
        .zip(sample_mean)
        .map(|(v, mean)| (v - mean).abs())
        .sum()
}
