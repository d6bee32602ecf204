//! Metric vocabulary and result-file naming
//!
//! Metric names are the keys the visualization layer queries; they match
//! the MEA-NAP field names exactly (including the historical
//! `channeISIoutsideBurst` spelling) and must not be renamed here alone.

use crate::config::MeaConfig;
use std::path::{Path, PathBuf};

pub const CHANNELS: &str = "channels";

/// Per-electrode activity metrics (one value per channel)
pub const ELECTRODE_METRICS: [&str; 6] = [
    "FR",
    "channelBurstRate",
    "channelBurstDur",
    "channelISIwithinBurst",
    "channeISIoutsideBurst",
    "channelFracSpikesInBursts",
];

/// Within-burst firing rate, derived from the electrode metrics
pub const FR_IN_BURST: &str = "channelFRinBurst";

/// Per-recording activity metrics (one value per experiment)
pub const RECORDING_METRICS: [&str; 15] = [
    "numActiveElec",
    "FRmean",
    "FRmedian",
    "NBurstRate",
    "meanNBstLengthS",
    "CVofINBI",
    "fracInNburst",
    "meanNumChansInvolvedInNbursts",
    "meanISIWithinNbursts_ms",
    "meanISIoutsideNbursts_ms",
    "singleElecBurstRate",
    "singleElecBurstDur",
    "singleElecISIwithinBurst",
    "singleElecISIoutsideBurst",
    "meanFracSpikesInBurstsPerElec",
];

/// Mean firing rate over active electrodes, derived from `FR`
pub const FR_ACTIVE: &str = "FRActive";

/// Node-level graph metrics (one value per node)
pub const NODE_METRICS: [&str; 17] = [
    "ND",
    "NS",
    "MEW",
    "Eloc",
    "BC",
    "PC",
    "Z",
    "aveControl",
    "modalControl",
    "degree",
    "strength",
    "clustering",
    "betweenness",
    "efficiency_local",
    "participation",
    "control_average",
    "control_modal",
];

/// Network-level graph metrics (one value per recording and lag)
pub const NETWORK_METRICS: [&str; 16] = [
    "aN",
    "Dens",
    "CC",
    "nMod",
    "Q",
    "PL",
    "Eglob",
    "SW",
    "SWw",
    "effRank",
    "num_nnmf_components",
    "nComponentsRelNS",
    "density",
    "efficiency_global",
    "modularity",
    "smallworldness",
];

pub const CARTOGRAPHY_Z: &str = "z";
pub const CARTOGRAPHY_P: &str = "p";
/// Field holding the per-node role labels in a cartography file
pub const CARTOGRAPHY_ROLES: &str = "roles";
/// Series name the role labels are stored under in the model
pub const NODAL_ROLES: &str = "nodal_roles";

/// The six node roles of the cartography, in display order
pub const ROLE_LABELS: [&str; 6] = [
    "Peripheral",
    "Non-hub connector",
    "Non-hub kinless",
    "Provincial hub",
    "Connector hub",
    "Kinless hub",
];

/// Field names a metric has been written under, canonical name first.
pub fn field_variations(metric: &str) -> &'static [&'static str] {
    match metric {
        "FR" => &["FR", "firing_rate", "firingRate", "channel_FR"],
        "channelBurstRate" => &["channelBurstRate", "burstRate", "BurstRate", "channel_burst_rate"],
        "channelBurstDur" => &[
            "channelBurstDur",
            "burstDur",
            "BurstDur",
            "burst_duration",
            "channel_burst_dur",
        ],
        "channelISIwithinBurst" => &[
            "channelISIwithinBurst",
            "ISIwithinBurst",
            "ISI_within_burst",
            "channel_ISI_within_burst",
        ],
        "channeISIoutsideBurst" => &[
            "channeISIoutsideBurst",
            "channelISIoutsideBurst",
            "ISIoutsideBurst",
            "ISI_outside_burst",
        ],
        "channelFracSpikesInBursts" => &[
            "channelFracSpikesInBursts",
            "fracSpikesInBursts",
            "FracSpikesInBursts",
        ],
        "channelFRinBurst" => &[
            "channelFRinBurst",
            "FRinBurst",
            "FR_in_burst",
            "channel_FR_in_burst",
        ],
        _ => &[],
    }
}

/// Kinds of result file found in an experiment folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    ElectrodeActivity,
    RecordingActivity,
    NodeMetrics,
    NetworkMetrics,
    Cartography,
}

impl FileKind {
    /// Accepted file-name suffixes, preferred first.
    pub fn suffixes(self) -> &'static [&'static str] {
        match self {
            FileKind::ElectrodeActivity => &["electrodeLevelActivity", "electrodeSpikeActivity"],
            FileKind::RecordingActivity => &["recordingLevelActivity", "recordingSpikeActivity"],
            FileKind::NodeMetrics => &["nodeLevelMetrics", "nodeMetrics"],
            FileKind::NetworkMetrics => &["networkLevelMetrics", "networkMetrics"],
            FileKind::Cartography => &["nodeCartography"],
        }
    }

    /// Struct the metrics are usually wrapped in
    pub fn wrapper(self) -> &'static str {
        match self {
            FileKind::ElectrodeActivity => "activityData",
            FileKind::RecordingActivity => "recordingData",
            FileKind::NodeMetrics => "nodeMetrics",
            FileKind::NetworkMetrics => "netMetrics",
            FileKind::Cartography => "cartographyData",
        }
    }

    pub fn is_lagged(self) -> bool {
        matches!(
            self,
            FileKind::NodeMetrics | FileKind::NetworkMetrics | FileKind::Cartography
        )
    }

    /// Candidate paths for this file in `exp_dir`, preferred first.
    /// `lag` is ignored for activity files.
    pub fn candidates(
        self,
        exp_dir: &Path,
        experiment: &str,
        lag: Option<u32>,
        config: &MeaConfig,
    ) -> Vec<PathBuf> {
        self.suffixes()
            .iter()
            .map(|suffix| {
                let stem = match lag {
                    Some(lag) if self.is_lagged() => {
                        format!("{}_{}_{}{}", experiment, suffix, config.lag_marker, lag)
                    }
                    _ => format!("{}_{}", experiment, suffix),
                };
                exp_dir.join(format!("{}.{}", stem, config.file_extension))
            })
            .collect()
    }

    /// First candidate that exists on disk.
    pub fn locate(
        self,
        exp_dir: &Path,
        experiment: &str,
        lag: Option<u32>,
        config: &MeaConfig,
    ) -> Option<PathBuf> {
        self.candidates(exp_dir, experiment, lag, config)
            .into_iter()
            .find(|p| p.is_file())
    }
}

/// Keep the values that are meaningful for `metric`.
///
/// Non-finite values are always dropped. Rates, durations and the derived
/// within-burst rate must be non-negative, inter-spike intervals positive,
/// fractions within [0, 1].
pub fn valid_values(metric: &str, values: &[f64]) -> Vec<f64> {
    let keep: fn(f64) -> bool = match metric {
        "channelFracSpikesInBursts" | "fracInNburst" | "meanFracSpikesInBurstsPerElec" => {
            |v| (0.0..=1.0).contains(&v)
        }
        "channelISIwithinBurst" | "channeISIoutsideBurst" => |v| v > 0.0,
        "FR" | "channelBurstRate" | "channelBurstDur" | "channelFRinBurst" | "FRActive" => {
            |v| v >= 0.0
        }
        _ => |_| true,
    };
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite() && keep(*v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_for_lagged_file() {
        let config = MeaConfig::default();
        let paths = FileKind::NodeMetrics.candidates(Path::new("/g/e"), "e", Some(10), &config);
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/g/e/e_nodeLevelMetrics_lag10.mat"),
                PathBuf::from("/g/e/e_nodeMetrics_lag10.mat"),
            ]
        );
    }

    #[test]
    fn test_candidates_ignore_lag_for_activity() {
        let config = MeaConfig::default();
        let paths =
            FileKind::RecordingActivity.candidates(Path::new("/g/e"), "e", Some(10), &config);
        assert_eq!(paths[0], PathBuf::from("/g/e/e_recordingLevelActivity.mat"));
    }

    #[test]
    fn test_valid_values_filters() {
        let values = [-1.0, 0.0, 0.5, 2.0, f64::NAN, f64::INFINITY];
        assert_eq!(valid_values("FR", &values), vec![0.0, 0.5, 2.0]);
        assert_eq!(valid_values("channelISIwithinBurst", &values), vec![0.5, 2.0]);
        assert_eq!(valid_values("channelFracSpikesInBursts", &values), vec![0.0, 0.5]);
        assert_eq!(valid_values("ND", &values), vec![-1.0, 0.0, 0.5, 2.0]);
    }

    #[test]
    fn test_field_variations_start_with_canonical_name() {
        for metric in ELECTRODE_METRICS {
            assert_eq!(field_variations(metric)[0], metric);
        }
        assert!(field_variations("ND").is_empty());
    }
}
