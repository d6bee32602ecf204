//! Per-lag node cartography: within-module degree (z), participation
//! coefficient (p) and the node roles derived from them.
//!
//! Role counts accumulate in a [`RoleTally`] while files are folded in and
//! become proportions only once a view is complete, when the tally is
//! consumed into a [`CartographyBucket`].

use super::{experiment_key, Bucket, LoadReport, Origin, Row};
use crate::catalog::{
    FileKind, CARTOGRAPHY_P, CARTOGRAPHY_ROLES, CARTOGRAPHY_Z, NODAL_ROLES, ROLE_LABELS,
};
use crate::config::MeaConfig;
use crate::fields::get_field;
use crate::mat::{MatValue, StructReader};
use crate::normalize::flatten;
use crate::scanner::ExperimentIndex;
use crate::types::{Age, Scalar};
use serde::Serialize;
use std::collections::BTreeMap;

/// Running counts of the six canonical roles
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleTally {
    counts: [u64; 6],
    unrecognized: u64,
}

impl RoleTally {
    /// Count one role label. Labels outside the canonical six are only
    /// counted as unrecognized.
    pub fn add(&mut self, label: &str) {
        match ROLE_LABELS.iter().position(|&role| role == label) {
            Some(i) => self.counts[i] += 1,
            None => self.unrecognized += 1,
        }
    }

    pub fn extend<'s>(&mut self, labels: impl IntoIterator<Item = &'s str>) {
        for label in labels {
            self.add(label);
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn unrecognized(&self) -> u64 {
        self.unrecognized
    }

    pub fn finalize(self, series: Bucket) -> CartographyBucket {
        let total = self.total();
        let role_counts = ROLE_LABELS
            .iter()
            .zip(self.counts)
            .map(|(role, count)| (role.to_string(), count))
            .collect();
        let role_proportions = ROLE_LABELS
            .iter()
            .zip(self.counts)
            .map(|(role, count)| {
                let share = if total > 0 {
                    count as f64 / total as f64
                } else {
                    0.0
                };
                (role.to_string(), share)
            })
            .collect();
        CartographyBucket {
            series,
            role_counts,
            role_proportions,
            total_roles: total,
            unrecognized_roles: self.unrecognized,
        }
    }
}

/// Finished cartography view for one group, age or lag key
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CartographyBucket {
    /// `z`, `p` and `nodal_roles` series
    #[serde(flatten)]
    pub series: Bucket,
    pub role_counts: BTreeMap<String, u64>,
    pub role_proportions: BTreeMap<String, f64>,
    pub total_roles: u64,
    pub unrecognized_roles: u64,
}

impl CartographyBucket {
    pub fn nodal_roles(&self) -> Vec<String> {
        self.series
            .get(NODAL_ROLES)
            .map(|s| s.labels())
            .unwrap_or_default()
    }
}

/// A bucket still being filled
#[derive(Debug, Default)]
struct Pending {
    series: Bucket,
    tally: RoleTally,
}

impl Pending {
    fn append(&mut self, origin: &Origin<'_>, row: &Row) {
        self.series.append(origin, row);
        if let Some(roles) = row.get(NODAL_ROLES) {
            self.tally.extend(roles.iter().filter_map(Scalar::as_text));
        }
    }

    fn finalize(self) -> CartographyBucket {
        self.tally.finalize(self.series)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentCartography {
    pub group: String,
    pub experiment: String,
    pub age: Option<Age>,
    pub lags: BTreeMap<u32, BTreeMap<String, Vec<Scalar>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CartographyModel {
    /// Keyed by `group/experiment`
    pub by_experiment: BTreeMap<String, ExperimentCartography>,
    pub by_group: BTreeMap<String, BTreeMap<u32, CartographyBucket>>,
    #[serde(rename = "by_div")]
    pub by_age: BTreeMap<Age, BTreeMap<u32, CartographyBucket>>,
    pub by_lag: BTreeMap<u32, CartographyBucket>,
    pub report: LoadReport,
}

impl CartographyModel {
    pub fn experiment(&self, group: &str, experiment: &str) -> Option<&ExperimentCartography> {
        self.by_experiment.get(&experiment_key(group, experiment))
    }
}

fn cartography_row(section: &MatValue) -> Row {
    let mut row = Row::new();
    for metric in [CARTOGRAPHY_Z, CARTOGRAPHY_P] {
        if let Some(value) = get_field(section, metric) {
            row.insert(metric, flatten(&value));
        }
    }
    if let Some(roles) = get_field(section, CARTOGRAPHY_ROLES) {
        // Roles are matched as text whatever the file stored them as
        let labels = flatten(&roles)
            .iter()
            .map(|r| Scalar::Text(r.to_label()))
            .collect();
        row.insert(NODAL_ROLES, labels);
    }
    row
}

fn finalize_all<K: Ord>(pending: BTreeMap<K, Pending>) -> BTreeMap<K, CartographyBucket> {
    pending.into_iter().map(|(k, p)| (k, p.finalize())).collect()
}

pub struct CartographyAggregator<'a> {
    config: &'a MeaConfig,
    reader: StructReader,
}

impl<'a> CartographyAggregator<'a> {
    pub fn new(config: &'a MeaConfig) -> Self {
        Self::with_reader(config, StructReader::new())
    }

    pub fn with_reader(config: &'a MeaConfig, reader: StructReader) -> Self {
        Self { config, reader }
    }

    pub fn run(&self, index: &ExperimentIndex) -> CartographyModel {
        let mut report = LoadReport::default();
        let mut by_experiment = BTreeMap::new();
        let mut by_group: BTreeMap<String, BTreeMap<u32, Pending>> = BTreeMap::new();
        let mut by_age: BTreeMap<Age, BTreeMap<u32, Pending>> = BTreeMap::new();
        let mut by_lag: BTreeMap<u32, Pending> = BTreeMap::new();

        for group in &index.groups {
            let lags = by_group.entry(group.clone()).or_default();
            for &lag in &index.lags {
                lags.entry(lag).or_default();
            }
        }
        for age in index.all_ages() {
            let lags = by_age.entry(age).or_default();
            for &lag in &index.lags {
                lags.entry(lag).or_default();
            }
        }
        for &lag in &index.lags {
            by_lag.entry(lag).or_default();
        }

        for exp in index.iter() {
            let origin = Origin {
                group: exp.group,
                experiment: exp.name,
                age: exp.age,
            };
            let exp_dir = index.experiment_dir(exp.group, exp.name);
            let mut lag_rows = BTreeMap::new();

            for &lag in &index.lags {
                let located =
                    FileKind::Cartography.locate(&exp_dir, exp.name, Some(lag), self.config);
                let path = match located {
                    Some(path) => path,
                    None => continue,
                };
                let record = match report.load(&self.reader, &path) {
                    Some(record) => record,
                    None => continue,
                };
                let row = cartography_row(&record.section(FileKind::Cartography.wrapper()));

                by_group
                    .entry(origin.group.to_string())
                    .or_default()
                    .entry(lag)
                    .or_default()
                    .append(&origin, &row);
                if let Some(age) = origin.age {
                    by_age
                        .entry(age.clone())
                        .or_default()
                        .entry(lag)
                        .or_default()
                        .append(&origin, &row);
                }
                by_lag.entry(lag).or_default().append(&origin, &row);
                lag_rows.insert(lag, row.to_map());
            }

            if !lag_rows.is_empty() {
                by_experiment.insert(
                    experiment_key(exp.group, exp.name),
                    ExperimentCartography {
                        group: exp.group.to_string(),
                        experiment: exp.name.to_string(),
                        age: exp.age.cloned(),
                        lags: lag_rows,
                    },
                );
            }
        }

        report.log_summary("Cartography");
        CartographyModel {
            by_experiment,
            by_group: by_group
                .into_iter()
                .map(|(group, lags)| (group, finalize_all(lags)))
                .collect(),
            by_age: by_age
                .into_iter()
                .map(|(age, lags)| (age, finalize_all(lags)))
                .collect(),
            by_lag: finalize_all(by_lag),
            report,
        }
    }
}
