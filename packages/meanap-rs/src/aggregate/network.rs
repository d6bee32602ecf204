//! Per-lag node-level and network-level graph metrics

use super::{experiment_key, Bucket, LoadReport, Origin, Row};
use crate::catalog::{FileKind, CHANNELS, NETWORK_METRICS, NODE_METRICS};
use crate::config::MeaConfig;
use crate::fields::get_field;
use crate::mat::{MatValue, StructReader};
use crate::normalize::flatten;
use crate::scanner::ExperimentIndex;
use crate::types::{Age, Scalar};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Node and network families of one lag
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LagBuckets {
    pub node_metrics: Bucket,
    pub network_metrics: Bucket,
}

/// Values one experiment contributed at one lag
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LagMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_metrics: Option<BTreeMap<String, Vec<Scalar>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_metrics: Option<BTreeMap<String, Vec<Scalar>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentNetwork {
    pub group: String,
    pub experiment: String,
    pub age: Option<Age>,
    pub lags: BTreeMap<u32, LagMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkModel {
    /// Keyed by `group/experiment`
    pub by_experiment: BTreeMap<String, ExperimentNetwork>,
    pub by_group: BTreeMap<String, BTreeMap<u32, LagBuckets>>,
    #[serde(rename = "by_div")]
    pub by_age: BTreeMap<Age, BTreeMap<u32, LagBuckets>>,
    pub by_lag: BTreeMap<u32, LagBuckets>,
    pub report: LoadReport,
}

impl NetworkModel {
    pub fn experiment(&self, group: &str, experiment: &str) -> Option<&ExperimentNetwork> {
        self.by_experiment.get(&experiment_key(group, experiment))
    }

    /// Node metric values of a group at a lag; empty when there are none.
    pub fn group_node_values(&self, group: &str, lag: u32, metric: &str) -> &[Scalar] {
        self.by_group
            .get(group)
            .and_then(|lags| lags.get(&lag))
            .map(|buckets| buckets.node_metrics.values(metric))
            .unwrap_or(&[])
    }
}

/// Which bucket of a [`LagBuckets`] a row goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Node,
    Network,
}

impl Family {
    fn file_kind(self) -> FileKind {
        match self {
            Family::Node => FileKind::NodeMetrics,
            Family::Network => FileKind::NetworkMetrics,
        }
    }

    fn bucket(self, buckets: &mut LagBuckets) -> &mut Bucket {
        match self {
            Family::Node => &mut buckets.node_metrics,
            Family::Network => &mut buckets.network_metrics,
        }
    }

    fn extract(self, section: &MatValue) -> Row {
        let mut row = Row::new();
        let metrics: &[&str] = match self {
            Family::Node => &NODE_METRICS,
            Family::Network => &NETWORK_METRICS,
        };
        for metric in metrics {
            if let Some(value) = get_field(section, metric) {
                row.insert(*metric, flatten(&value));
            }
        }
        if self == Family::Node {
            if let Some(channels) = get_field(section, CHANNELS) {
                row.insert(CHANNELS, flatten(&channels));
            }
        }
        row
    }
}

pub struct NetworkAggregator<'a> {
    config: &'a MeaConfig,
    reader: StructReader,
}

impl<'a> NetworkAggregator<'a> {
    pub fn new(config: &'a MeaConfig) -> Self {
        Self::with_reader(config, StructReader::new())
    }

    pub fn with_reader(config: &'a MeaConfig, reader: StructReader) -> Self {
        Self { config, reader }
    }

    pub fn run(&self, index: &ExperimentIndex) -> NetworkModel {
        let mut model = NetworkModel::default();
        for group in &index.groups {
            let lags = model.by_group.entry(group.clone()).or_default();
            for &lag in &index.lags {
                lags.entry(lag).or_default();
            }
        }
        for age in index.all_ages() {
            let lags = model.by_age.entry(age).or_default();
            for &lag in &index.lags {
                lags.entry(lag).or_default();
            }
        }
        for &lag in &index.lags {
            model.by_lag.entry(lag).or_default();
        }

        for exp in index.iter() {
            let origin = Origin {
                group: exp.group,
                experiment: exp.name,
                age: exp.age,
            };
            let exp_dir = index.experiment_dir(exp.group, exp.name);
            let mut lag_metrics = BTreeMap::new();

            for &lag in &index.lags {
                let mut metrics = LagMetrics::default();
                for family in [Family::Node, Family::Network] {
                    let loaded =
                        self.load_row(&mut model.report, &exp_dir, exp.name, lag, family);
                    let row = match loaded {
                        Some(row) => row,
                        None => continue,
                    };
                    append(&mut model, &origin, lag, family, &row);
                    match family {
                        Family::Node => metrics.node_metrics = Some(row.to_map()),
                        Family::Network => metrics.network_metrics = Some(row.to_map()),
                    }
                }
                if metrics.node_metrics.is_some() || metrics.network_metrics.is_some() {
                    lag_metrics.insert(lag, metrics);
                }
            }

            if !lag_metrics.is_empty() {
                model.by_experiment.insert(
                    experiment_key(exp.group, exp.name),
                    ExperimentNetwork {
                        group: exp.group.to_string(),
                        experiment: exp.name.to_string(),
                        age: exp.age.cloned(),
                        lags: lag_metrics,
                    },
                );
            }
        }

        model.report.log_summary("Network");
        model
    }

    fn load_row(
        &self,
        report: &mut LoadReport,
        exp_dir: &Path,
        experiment: &str,
        lag: u32,
        family: Family,
    ) -> Option<Row> {
        let kind = family.file_kind();
        let path = kind.locate(exp_dir, experiment, Some(lag), self.config)?;
        let record = report.load(&self.reader, &path)?;
        let section = record.section(kind.wrapper());
        Some(family.extract(&section))
    }
}

/// Append one file's row to its group, age and lag buckets.
fn append(model: &mut NetworkModel, origin: &Origin<'_>, lag: u32, family: Family, row: &Row) {
    let group = model
        .by_group
        .entry(origin.group.to_string())
        .or_default()
        .entry(lag)
        .or_default();
    family.bucket(group).append(origin, row);

    if let Some(age) = origin.age {
        let by_age = model
            .by_age
            .entry(age.clone())
            .or_default()
            .entry(lag)
            .or_default();
        family.bucket(by_age).append(origin, row);
    }

    let by_lag = model.by_lag.entry(lag).or_default();
    family.bucket(by_lag).append(origin, row);
}
