//! Aggregation of per-experiment results into grouped views
//!
//! Each aggregator loads an experiment's files, extracts one complete row
//! of metric values per file and only then appends that row to every view
//! it belongs to. A [`Series`] keeps the originating experiment, group and
//! age of every value next to it, so all columns of a series always have
//! the same length.

pub mod activity;
pub mod cartography;
pub mod network;

pub use activity::{ActivityAggregator, ActivityModel, ExperimentActivity};
pub use cartography::{
    CartographyAggregator, CartographyBucket, CartographyModel, ExperimentCartography, RoleTally,
};
pub use network::{ExperimentNetwork, LagBuckets, LagMetrics, NetworkAggregator, NetworkModel};

use crate::error::Result;
use crate::mat::{RawRecord, StructReader};
use crate::types::{Age, Scalar};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where a row of values came from
#[derive(Debug, Clone, Copy)]
pub struct Origin<'a> {
    pub group: &'a str,
    pub experiment: &'a str,
    pub age: Option<&'a Age>,
}

/// Key of an experiment in the `by_experiment` views. Experiment names are
/// only unique within a group.
pub fn experiment_key(group: &str, experiment: &str) -> String {
    format!("{}/{}", group, experiment)
}

/// Values of one metric with their parallel origin columns
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Series {
    values: Vec<Scalar>,
    exp_names: Vec<String>,
    groups: Vec<String>,
    divs: Vec<Option<Age>>,
}

impl Series {
    /// Append `values`, tagging each with `origin`.
    pub fn push_row(&mut self, origin: &Origin<'_>, values: &[Scalar]) {
        for value in values {
            self.values.push(value.clone());
            self.exp_names.push(origin.experiment.to_string());
            self.groups.push(origin.group.to_string());
            self.divs.push(origin.age.cloned());
        }
    }

    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    pub fn exp_names(&self) -> &[String] {
        &self.exp_names
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn divs(&self) -> &[Option<Age>] {
        &self.divs
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Numeric view of the values, NaN where a value is not numeric.
    pub fn numbers(&self) -> Vec<f64> {
        self.values
            .iter()
            .map(|v| v.as_f64().unwrap_or(f64::NAN))
            .collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.values.iter().map(Scalar::to_label).collect()
    }
}

/// The values one file contributes, by metric name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    metrics: Vec<(String, Vec<Scalar>)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, metric: impl Into<String>, values: Vec<Scalar>) {
        let metric = metric.into();
        match self.metrics.iter_mut().find(|(name, _)| *name == metric) {
            Some(slot) => slot.1 = values,
            None => self.metrics.push((metric, values)),
        }
    }

    /// Insert every metric of `other`, replacing same-named ones.
    pub fn merge(&mut self, other: &Row) {
        for (metric, values) in other.iter() {
            self.insert(metric, values.to_vec());
        }
    }

    pub fn get(&self, metric: &str) -> Option<&[Scalar]> {
        self.metrics
            .iter()
            .find(|(name, _)| name == metric)
            .map(|(_, values)| values.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Scalar])> {
        self.metrics.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Plain map for the `by_experiment` views
    pub fn to_map(&self) -> BTreeMap<String, Vec<Scalar>> {
        self.metrics.iter().cloned().collect()
    }
}

/// Metric series of one view key (group, age or lag)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Bucket {
    #[serde(flatten)]
    metrics: BTreeMap<String, Series>,
    /// One entry per appended row
    exp_names: Vec<String>,
}

impl Bucket {
    /// Append a complete row. Empty rows leave the bucket untouched.
    pub fn append(&mut self, origin: &Origin<'_>, row: &Row) {
        if row.is_empty() {
            return;
        }
        for (metric, values) in row.iter() {
            self.metrics
                .entry(metric.to_string())
                .or_default()
                .push_row(origin, values);
        }
        self.exp_names.push(origin.experiment.to_string());
    }

    pub fn get(&self, metric: &str) -> Option<&Series> {
        self.metrics.get(metric)
    }

    /// Values of `metric`, empty when absent.
    pub fn values(&self, metric: &str) -> &[Scalar] {
        self.metrics.get(metric).map(Series::values).unwrap_or(&[])
    }

    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }

    pub fn series(&self) -> impl Iterator<Item = (&str, &Series)> {
        self.metrics.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Experiments that contributed a row, in append order
    pub fn exp_names(&self) -> &[String] {
        &self.exp_names
    }

    pub fn is_empty(&self) -> bool {
        self.exp_names.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Files an aggregator tried to load and how many succeeded. Files that
/// were absent are not counted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub attempted: usize,
    pub loaded: usize,
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    /// Load `path`, recording the outcome. Failures are logged and yield
    /// `None` so the caller moves on to the next file.
    pub fn load(&mut self, reader: &StructReader, path: &Path) -> Option<RawRecord> {
        self.record(path, reader.load(path))
    }

    pub fn record<T>(&mut self, path: &Path, result: Result<T>) -> Option<T> {
        self.attempted += 1;
        match result {
            Ok(value) => {
                self.loaded += 1;
                Some(value)
            }
            Err(e) => {
                log::warn!("Skipping {}: {}", path.display(), e);
                self.failures.push(LoadFailure {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                });
                None
            }
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub(crate) fn log_summary(&self, aggregator: &str) {
        log::info!(
            "{}: loaded {} of {} files ({} failed)",
            aggregator,
            self.loaded,
            self.attempted,
            self.failed()
        );
    }
}
