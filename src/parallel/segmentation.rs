//! Performance-weighted segmentation
//!
//! [`allocate`] splits a job of `total` units proportionally to a weight per
//! system. Proportional shares are floored, then the units left over go one
//! each to the systems with the largest fractional parts (largest-remainder
//! method). Ties go to the larger weight, then to the earlier system. The
//! result always sums to `total` exactly, and a larger weight never receives
//! fewer units than a smaller one.
//!
//! [`performance_index`] turns a system's mean throughput into its weight:
//!
//! ```text
//! z     = (throughput - mean) / std      over every system with history
//! index = max(baseline + z * z_scale, min_index)
//! ```
//!
//! A system without history gets `baseline`; when the population has no spread
//! (`std == 0`, or a single system) `z` is 0.

use crate::config::SegmentationConfig;
use crate::error::{Error, Result};
use std::cmp::Ordering;

/// Split `total` units proportionally to `weights`
///
/// Zero weights receive nothing. Fails when there are no weights, when a weight
/// is negative or not finite, or when every weight is zero.
pub fn allocate(total: usize, weights: &[f64]) -> Result<Vec<usize>> {
    if weights.is_empty() {
        return Err(Error::Segmentation("no systems to allocate to".to_string()));
    }
    if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(Error::Segmentation(format!("invalid weight {}", bad)));
    }

    let sum: f64 = weights.iter().sum();
    if sum <= 0.0 {
        return Err(Error::Segmentation("every weight is zero".to_string()));
    }

    // Floors of the exact shares, plus their fractional parts
    let mut counts = Vec::with_capacity(weights.len());
    let mut fractions = Vec::with_capacity(weights.len());
    for &weight in weights {
        let share = total as f64 * weight / sum;
        let floor = share.floor();
        counts.push(floor as usize);
        fractions.push(share - floor);
    }

    let mut order: Vec<usize> = (0..weights.len()).filter(|&i| weights[i] > 0.0).collect();
    order.sort_by(|&a, &b| {
        fractions[b]
            .partial_cmp(&fractions[a])
            .unwrap_or(Ordering::Equal)
            .then(weights[b].partial_cmp(&weights[a]).unwrap_or(Ordering::Equal))
            .then(a.cmp(&b))
    });

    let assigned: usize = counts.iter().sum();
    if assigned <= total {
        // Rounding can leave at most one unit per positive weight, cycling covers float drift
        for &i in order.iter().cycle().take(total - assigned) {
            counts[i] += 1;
        }
    } else {
        // Float drift pushed a floor over its exact value; take back from the smallest fractions
        let mut excess = assigned - total;
        for &i in order.iter().rev().cycle() {
            if excess == 0 {
                break;
            }
            if counts[i] > 0 {
                counts[i] -= 1;
                excess -= 1;
            }
        }
    }

    Ok(counts)
}

/// Weight of one system from its mean throughput
///
/// `population` holds the mean throughputs of every system with history,
/// including this one.
pub fn performance_index(
    throughput: Option<f64>,
    population: &[f64],
    config: &SegmentationConfig,
) -> f64 {
    let Some(throughput) = throughput else {
        return config.baseline_index;
    };

    let z = z_score(throughput, population);
    (config.baseline_index + z * config.z_scale).max(config.min_index)
}

/// Standard score of `value` within `population` (population standard deviation)
pub fn z_score(value: f64, population: &[f64]) -> f64 {
    if population.len() < 2 {
        return 0.0;
    }

    let n = population.len() as f64;
    let mean = population.iter().sum::<f64>() / n;
    let variance = population.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();

    if std <= f64::EPSILON * mean.abs().max(1.0) || !std.is_finite() {
        0.0
    } else {
        (value - mean) / std
    }
}
