//! Distribution summaries for half-violin plots
//!
//! [`summarize`] turns a raw sample into a Gaussian kernel density estimate
//! on an evenly spaced grid plus the usual location and spread statistics.
//! It never fails: near-constant samples get a three-point triangle instead
//! of a KDE, and a KDE that cannot be evaluated falls back to a triangle
//! spanning one standard deviation.

use crate::config::DensityConfig;
use serde::Serialize;
use std::f64::consts::PI;
use thiserror::Error;

/// How the support and density of a [`DensitySummary`] were produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DensityKind {
    /// Fewer than two finite values; support and density are empty
    Insufficient,
    /// Effectively constant sample
    Degenerate,
    Kde,
    /// KDE failed; triangle over mean ± std
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DensitySummary {
    pub support: Vec<f64>,
    pub density: Vec<f64>,
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation
    pub std: f64,
    /// Standard error of the mean (sample std / sqrt(n))
    pub sem: f64,
    pub count: usize,
    pub kind: DensityKind,
}

#[derive(Error, Debug, Clone, PartialEq)]
enum KdeError {
    #[error("invalid bandwidth {0}")]
    InvalidBandwidth(f64),
    #[error("density is not finite at support point {0}")]
    NonFinite(f64),
}

pub fn summarize(sample: &[f64]) -> DensitySummary {
    summarize_with(sample, &DensityConfig::default(), None)
}

/// Summarize `sample`, using `bandwidth` as the kernel standard deviation
/// when given instead of the rule-of-thumb value.
///
/// `bandwidth` is an absolute sigma in the units of the sample. It is not a
/// scale factor on the sample standard deviation, so `Some(1.0)` means a
/// kernel one unit wide whatever the spread of the data.
pub fn summarize_with(
    sample: &[f64],
    config: &DensityConfig,
    bandwidth: Option<f64>,
) -> DensitySummary {
    let values: Vec<f64> = sample.iter().copied().filter(|v| v.is_finite()).collect();
    let n = values.len();

    let mean = mean(&values);
    let median = median(&values);
    let std = population_std(&values, mean);
    let sem = if n > 1 {
        sample_std(&values, mean) / (n as f64).sqrt()
    } else {
        f64::NAN
    };

    let mut summary = DensitySummary {
        support: Vec::new(),
        density: Vec::new(),
        mean,
        median,
        std,
        sem,
        count: n,
        kind: DensityKind::Insufficient,
    };
    if n <= 1 {
        return summary;
    }

    let (min, max) = min_max(&values);
    let range = max - min;
    if std < config.degenerate_epsilon && range < config.degenerate_epsilon {
        let delta = (mean.abs() * 0.01).max(1e-3);
        summary.support = vec![mean - delta, mean, mean + delta];
        summary.density = vec![0.0, n as f64, 0.0];
        summary.kind = DensityKind::Degenerate;
        return summary;
    }

    let sigma = bandwidth
        .unwrap_or_else(|| config.bandwidth_factor * std * (n as f64).powf(-0.2));
    let lo = min - config.range_padding * range;
    let hi = max + config.range_padding * range;
    let support = linspace(lo, hi, config.grid_points);

    match gaussian_kde(&values, sigma, &support) {
        Ok(density) => {
            summary.support = support;
            summary.density = density;
            summary.kind = DensityKind::Kde;
        }
        Err(e) => {
            log::warn!("Density estimate failed ({}); using a mean ± std triangle", e);
            summary.support = vec![mean - std, mean, mean + std];
            summary.density = vec![0.0, n as f64, 0.0];
            summary.kind = DensityKind::Fallback;
        }
    }
    summary
}

fn gaussian_kde(values: &[f64], sigma: f64, support: &[f64]) -> Result<Vec<f64>, KdeError> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(KdeError::InvalidBandwidth(sigma));
    }
    let norm = 1.0 / (values.len() as f64 * sigma * (2.0 * PI).sqrt());
    support
        .iter()
        .map(|&x| {
            let sum: f64 = values
                .iter()
                .map(|&v| {
                    let u = (x - v) / sigma;
                    (-0.5 * u * u).exp()
                })
                .sum();
            let density = sum * norm;
            if density.is_finite() {
                Ok(density)
            } else {
                Err(KdeError::NonFinite(x))
            }
        })
        .collect()
}

fn linspace(lo: f64, hi: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![lo],
        _ => {
            let step = (hi - lo) / (points - 1) as f64;
            (0..points).map(|i| lo + step * i as f64).collect()
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / values.len() as f64).sqrt()
}

fn sample_std(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

fn median(values: &[f64]) -> f64 {
    percentile_sorted(&sorted(values), 50.0)
}

/// Linear-interpolation percentile of an ascending slice; NaN when empty.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}

/// Descriptive statistics of the finite values of a sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasicStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation (n - 1); NaN for a single value
    pub std: f64,
    pub sem: f64,
    pub min: f64,
    pub max: f64,
    pub q25: f64,
    pub q75: f64,
}

impl BasicStats {
    /// `None` when the sample has no finite value.
    pub fn from_sample(sample: &[f64]) -> Option<Self> {
        let values: Vec<f64> = sample.iter().copied().filter(|v| v.is_finite()).collect();
        if values.is_empty() {
            return None;
        }
        let n = values.len();
        let mean = mean(&values);
        let std = sample_std(&values, mean);
        let sorted = sorted(&values);
        Some(Self {
            count: n,
            mean,
            median: percentile_sorted(&sorted, 50.0),
            std,
            sem: std / (n as f64).sqrt(),
            min: sorted[0],
            max: sorted[n - 1],
            q25: percentile_sorted(&sorted, 25.0),
            q75: percentile_sorted(&sorted, 75.0),
        })
    }
}

/// Split finite values into those inside `[q1 - factor*IQR, q3 + factor*IQR]`
/// and the outliers, both in input order. Samples with fewer than four
/// finite values are returned whole.
pub fn remove_outliers(values: &[f64], factor: f64) -> (Vec<f64>, Vec<f64>) {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 4 {
        return (finite, Vec::new());
    }
    let sorted = sorted(&finite);
    let q1 = percentile_sorted(&sorted, 25.0);
    let q3 = percentile_sorted(&sorted, 75.0);
    let iqr = q3 - q1;
    let (lo, hi) = (q1 - factor * iqr, q3 + factor * iqr);
    finite.into_iter().partition(|v| (lo..=hi).contains(v))
}
