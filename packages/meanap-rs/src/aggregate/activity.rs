//! Electrode- and recording-level spike activity

use super::{experiment_key, Bucket, LoadReport, Origin, Row};
use crate::catalog::{
    self, FileKind, CHANNELS, ELECTRODE_METRICS, FR_ACTIVE, FR_IN_BURST, RECORDING_METRICS,
};
use crate::config::MeaConfig;
use crate::fields::{get_any, get_field};
use crate::mat::{MatValue, StructReader};
use crate::normalize::{flatten, flatten_f64};
use crate::scanner::ExperimentIndex;
use crate::types::{finite_numbers, Age, Scalar};
use serde::Serialize;
use std::collections::BTreeMap;

/// Below this a burst-time denominator counts as zero
const MIN_BURST_TIME: f64 = 1e-10;

/// Everything loaded for one experiment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentActivity {
    pub group: String,
    pub experiment: String,
    pub age: Option<Age>,
    pub metrics: BTreeMap<String, Vec<Scalar>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActivityModel {
    /// Keyed by `group/experiment`
    pub by_experiment: BTreeMap<String, ExperimentActivity>,
    /// Electrode metrics as one mean per experiment, recording metrics as is
    pub by_group: BTreeMap<String, Bucket>,
    /// Raw per-channel values and recording metrics
    #[serde(rename = "by_div")]
    pub by_age: BTreeMap<Age, Bucket>,
    pub report: LoadReport,
}

impl ActivityModel {
    pub fn experiment(&self, group: &str, experiment: &str) -> Option<&ExperimentActivity> {
        self.by_experiment.get(&experiment_key(group, experiment))
    }
}

/// Within-burst firing rate per channel.
///
/// `FR * frac / ((burst_rate / 60) * (burst_dur / 1000))`, NaN where an
/// input is not finite, negative, or the time spent bursting is
/// effectively zero. All NaN when the inputs disagree in length.
pub fn within_burst_firing_rate(
    fr: &[f64],
    burst_rate: &[f64],
    burst_dur: &[f64],
    frac: &[f64],
) -> Vec<f64> {
    let n = fr.len();
    if burst_rate.len() != n || burst_dur.len() != n || frac.len() != n {
        log::warn!(
            "Cannot derive {}: channel counts differ ({}, {}, {}, {})",
            FR_IN_BURST,
            n,
            burst_rate.len(),
            burst_dur.len(),
            frac.len()
        );
        return vec![f64::NAN; n];
    }

    (0..n)
        .map(|i| {
            let (f, rate, dur, q) = (fr[i], burst_rate[i], burst_dur[i], frac[i]);
            let inputs_valid = [f, rate, dur, q].iter().all(|v| v.is_finite() && *v >= 0.0);
            // burst/min * ms -> fraction of each second spent bursting
            let burst_time = (rate / 60.0) * (dur / 1000.0);
            if !inputs_valid || burst_time <= MIN_BURST_TIME {
                f64::NAN
            } else {
                f * q / burst_time
            }
        })
        .collect()
}

/// Mean firing rate of electrodes above `threshold`, `None` when none are.
pub fn active_firing_rate(fr: &[f64], threshold: f64) -> Option<f64> {
    let active: Vec<f64> = catalog::valid_values("FR", fr)
        .into_iter()
        .filter(|&v| v > threshold)
        .collect();
    if active.is_empty() {
        None
    } else {
        Some(active.iter().sum::<f64>() / active.len() as f64)
    }
}

fn finite_mean(values: &[Scalar]) -> Option<f64> {
    let finite = finite_numbers(values);
    if finite.is_empty() {
        None
    } else {
        Some(finite.iter().sum::<f64>() / finite.len() as f64)
    }
}

fn numbers(values: Vec<f64>) -> Vec<Scalar> {
    values.into_iter().map(Scalar::Number).collect()
}

/// Electrode metrics of one file: raw per-channel values
fn electrode_row(section: &MatValue, threshold: f64) -> Row {
    let mut row = Row::new();
    let mut channel_values: BTreeMap<&str, Vec<f64>> = BTreeMap::new();

    for metric in ELECTRODE_METRICS {
        if let Some((name, value)) = get_any(section, catalog::field_variations(metric)) {
            if name != metric {
                log::debug!("Reading {} from field '{}'", metric, name);
            }
            let values = flatten_f64(&value);
            channel_values.insert(metric, values.clone());
            row.insert(metric, numbers(values));
        }
    }

    let stored = get_any(section, catalog::field_variations(FR_IN_BURST));
    match stored {
        Some((_, value)) => row.insert(FR_IN_BURST, numbers(flatten_f64(&value))),
        None => {
            let inputs = (
                channel_values.get("FR"),
                channel_values.get("channelBurstRate"),
                channel_values.get("channelBurstDur"),
                channel_values.get("channelFracSpikesInBursts"),
            );
            if let (Some(fr), Some(rate), Some(dur), Some(frac)) = inputs {
                row.insert(FR_IN_BURST, numbers(within_burst_firing_rate(fr, rate, dur, frac)));
            }
        }
    }

    if let Some(fr) = channel_values.get("FR") {
        if let Some(mean) = active_firing_rate(fr, threshold) {
            row.insert(FR_ACTIVE, vec![Scalar::Number(mean)]);
        }
    }

    if let Some(channels) = get_field(section, CHANNELS) {
        row.insert(CHANNELS, flatten(&channels));
    }
    row
}

fn recording_row(section: &MatValue) -> Row {
    let mut row = Row::new();
    for metric in RECORDING_METRICS {
        if let Some(value) = get_field(section, metric) {
            let values = flatten(&value);
            if !values.is_empty() {
                row.insert(metric, values);
            }
        }
    }
    row
}

/// Group view of an electrode row: every per-channel metric reduced to its
/// finite mean. Channel ids have no group-level meaning and are dropped.
fn group_row(electrodes: &Row) -> Row {
    let mut row = Row::new();
    for (metric, values) in electrodes.iter() {
        if metric == CHANNELS {
            continue;
        }
        if let Some(mean) = finite_mean(values) {
            row.insert(metric, vec![Scalar::Number(mean)]);
        }
    }
    row
}

pub struct ActivityAggregator<'a> {
    config: &'a MeaConfig,
    reader: StructReader,
}

impl<'a> ActivityAggregator<'a> {
    pub fn new(config: &'a MeaConfig) -> Self {
        Self::with_reader(config, StructReader::new())
    }

    pub fn with_reader(config: &'a MeaConfig, reader: StructReader) -> Self {
        Self { config, reader }
    }

    pub fn run(&self, index: &ExperimentIndex) -> ActivityModel {
        let mut model = ActivityModel::default();
        for group in &index.groups {
            model.by_group.entry(group.clone()).or_default();
        }
        for age in index.all_ages() {
            model.by_age.entry(age).or_default();
        }

        for exp in index.iter() {
            let origin = Origin {
                group: exp.group,
                experiment: exp.name,
                age: exp.age,
            };
            let exp_dir = index.experiment_dir(exp.group, exp.name);

            let recording = FileKind::RecordingActivity
                .locate(&exp_dir, exp.name, None, self.config)
                .and_then(|path| model.report.load(&self.reader, &path))
                .map(|record| {
                    recording_row(&record.section(FileKind::RecordingActivity.wrapper()))
                });

            let electrode_record = FileKind::ElectrodeActivity
                .locate(&exp_dir, exp.name, None, self.config)
                .and_then(|path| model.report.load(&self.reader, &path));
            let (electrodes, embedded_recording) = match &electrode_record {
                Some(record) => {
                    let section = record.section(FileKind::ElectrodeActivity.wrapper());
                    (
                        Some(electrode_row(&section, self.config.active_electrode_threshold)),
                        Some(recording_row(&section)),
                    )
                }
                None => (None, None),
            };

            // Older exports keep recording metrics inside the electrode file
            let recording = match recording {
                Some(row) if !row.is_empty() => Some(row),
                _ => embedded_recording.filter(|row| !row.is_empty()),
            };

            if recording.is_none() && electrodes.is_none() {
                continue;
            }
            self.fold(&mut model, &origin, electrodes.as_ref(), recording.as_ref());
        }

        model.report.log_summary("Activity");
        model
    }

    fn fold(
        &self,
        model: &mut ActivityModel,
        origin: &Origin<'_>,
        electrodes: Option<&Row>,
        recording: Option<&Row>,
    ) {
        // One row per experiment and view: electrode and recording metrics together
        let mut group_view = Row::new();
        let mut age_view = Row::new();
        if let Some(row) = electrodes {
            group_view.merge(&group_row(row));
            age_view.merge(row);
        }
        if let Some(row) = recording {
            group_view.merge(row);
            age_view.merge(row);
        }

        model
            .by_group
            .entry(origin.group.to_string())
            .or_default()
            .append(origin, &group_view);
        if let Some(age) = origin.age {
            model.by_age.entry(age.clone()).or_default().append(origin, &age_view);
        }
        let record = ExperimentActivity {
            group: origin.group.to_string(),
            experiment: origin.experiment.to_string(),
            age: origin.age.cloned(),
            metrics: age_view.to_map(),
        };
        model
            .by_experiment
            .insert(experiment_key(origin.group, origin.experiment), record);
    }
}
