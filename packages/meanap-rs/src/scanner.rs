//! Experiment directory discovery
//!
//! Layout: `root/<group>/<experiment>/<experiment>_<suffix>.<ext>`. The scan
//! reads directory listings only, never file contents.

use crate::catalog::FileKind;
use crate::config::MeaConfig;
use crate::error::{MeaError, Result};
use crate::types::Age;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn trailing_digits() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)$").ok()).as_ref()
}

/// An experiment whose name carries no age token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnagedExperiment {
    pub group: String,
    pub experiment: String,
}

/// Groups, experiments, ages and lags found under a root directory
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExperimentIndex {
    pub root: PathBuf,
    /// Group directory names, sorted
    pub groups: Vec<String>,
    /// Experiment directory names per group, sorted
    pub experiments: BTreeMap<String, Vec<String>>,
    /// Experiments per group and age; experiments without an age token are
    /// listed in `unaged` instead
    pub ages: BTreeMap<String, BTreeMap<Age, Vec<String>>>,
    /// Lag values with at least one node-metrics file, sorted
    pub lags: Vec<u32>,
    pub unaged: Vec<UnagedExperiment>,
}

/// One experiment of the index, in scan order
#[derive(Debug, Clone, Copy)]
pub struct Experiment<'a> {
    pub group: &'a str,
    pub name: &'a str,
    pub age: Option<&'a Age>,
}

impl ExperimentIndex {
    pub fn experiment_dir(&self, group: &str, experiment: &str) -> PathBuf {
        self.root.join(group).join(experiment)
    }

    pub fn age_of(&self, group: &str, experiment: &str) -> Option<&Age> {
        self.ages
            .get(group)?
            .iter()
            .find(|(_, names)| names.iter().any(|n| n == experiment))
            .map(|(age, _)| age)
    }

    /// Experiments group by group, each group's experiments in name order.
    pub fn iter(&self) -> impl Iterator<Item = Experiment<'_>> + '_ {
        self.groups.iter().flat_map(move |group| {
            self.experiments
                .get(group)
                .into_iter()
                .flatten()
                .map(move |name| Experiment {
                    group,
                    name,
                    age: self.age_of(group, name),
                })
        })
    }

    /// Every distinct age across groups, sorted.
    pub fn all_ages(&self) -> Vec<Age> {
        self.ages
            .values()
            .flat_map(|by_age| by_age.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn experiment_count(&self) -> usize {
        self.experiments.values().map(Vec::len).sum()
    }
}

/// Age from an experiment name.
///
/// The first `_`-separated segment containing `marker` is used; `None` when
/// no segment contains it.
pub fn extract_age(experiment: &str, marker: &str) -> Option<Age> {
    experiment
        .split('_')
        .find(|segment| segment.contains(marker))
        .map(|segment| parse_age_token(segment, marker))
}

/// Strip `marker` from an age segment and read its trailing digits; the
/// stripped text is kept as a label when it does not end in a number.
pub fn parse_age_token(segment: &str, marker: &str) -> Age {
    let remainder = segment.replace(marker, "");
    trailing_digits()
        .and_then(|re| re.captures(&remainder))
        .and_then(|caps| caps[1].parse::<u64>().ok())
        .map(Age::Days)
        .unwrap_or(Age::Label(remainder))
}

/// Lag value from a lagged result file name such as
/// `exp_nodeMetrics_lag10.mat`; `None` when the token is not an integer.
pub fn extract_lag(file_name: &str, marker: &str) -> Option<u32> {
    let stem = Path::new(file_name).file_stem()?.to_str()?;
    let (_, token) = stem.rsplit_once(&format!("_{}", marker))?;
    token.parse().ok()
}

/// Sorted names of the subdirectories of `dir`.
fn subdirectories(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Lags of the node-metrics files present in one experiment folder.
fn scan_lags(exp_dir: &Path, experiment: &str, config: &MeaConfig) -> BTreeSet<u32> {
    let mut lags = BTreeSet::new();
    let dir = glob::Pattern::escape(&exp_dir.to_string_lossy());
    let exp = glob::Pattern::escape(experiment);

    for suffix in FileKind::NodeMetrics.suffixes() {
        let pattern = format!(
            "{}/{}_{}_{}*.{}",
            dir, exp, suffix, config.lag_marker, config.file_extension
        );
        let paths = match glob::glob(&pattern) {
            Ok(paths) => paths,
            Err(e) => {
                log::warn!("Invalid lag pattern '{}': {}", pattern, e);
                continue;
            }
        };
        for entry in paths {
            match entry {
                Ok(path) => {
                    let lag = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .and_then(|n| extract_lag(n, &config.lag_marker));
                    match lag {
                        Some(lag) => {
                            lags.insert(lag);
                        }
                        None => log::debug!("Ignoring {}: no integer lag", path.display()),
                    }
                }
                Err(e) => log::warn!("Glob error: {}", e),
            }
        }
    }
    lags
}

/// Build the experiment index for `root`.
pub fn scan_experiment_dir(root: &Path, config: &MeaConfig) -> Result<ExperimentIndex> {
    if !root.is_dir() {
        return Err(MeaError::DirectoryNotFound(root.to_path_buf()));
    }

    let mut index = ExperimentIndex {
        root: root.to_path_buf(),
        ..Default::default()
    };
    let mut lags = BTreeSet::new();

    for group in subdirectories(root)? {
        let group_dir = root.join(&group);
        let experiments = match subdirectories(&group_dir) {
            Ok(names) => names,
            Err(e) => {
                log::warn!("Cannot list group {}: {}", group_dir.display(), e);
                Vec::new()
            }
        };

        let group_ages = index.ages.entry(group.clone()).or_default();
        for experiment in &experiments {
            match extract_age(experiment, &config.age_marker) {
                Some(age) => group_ages.entry(age).or_default().push(experiment.clone()),
                None => {
                    log::warn!(
                        "Experiment {}/{} has no {} token; excluded from age views",
                        group,
                        experiment,
                        config.age_marker
                    );
                    index.unaged.push(UnagedExperiment {
                        group: group.clone(),
                        experiment: experiment.clone(),
                    });
                }
            }
            lags.extend(scan_lags(&group_dir.join(experiment), experiment, config));
        }

        index.experiments.insert(group.clone(), experiments);
        index.groups.push(group);
    }

    index.lags = lags.into_iter().collect();
    log::info!(
        "Scanned {}: {} groups, {} experiments, lags {:?}",
        root.display(),
        index.groups.len(),
        index.experiment_count(),
        index.lags
    );
    Ok(index)
}
