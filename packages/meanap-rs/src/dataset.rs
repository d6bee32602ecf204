//! One-call loading of a whole MEA-NAP output tree

use crate::aggregate::{
    ActivityAggregator, ActivityModel, CartographyAggregator, CartographyModel,
    NetworkAggregator, NetworkModel,
};
use crate::config::MeaConfig;
use crate::error::Result;
use crate::scanner::{scan_experiment_dir, ExperimentIndex};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

/// Everything loaded from one root directory
#[derive(Debug, Clone, Serialize)]
pub struct Dataset {
    pub created_at: String,
    pub config: MeaConfig,
    pub index: ExperimentIndex,
    pub activity: ActivityModel,
    pub network: NetworkModel,
    pub cartography: CartographyModel,
}

impl Dataset {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Failed file loads across all three aggregators
    pub fn failure_count(&self) -> usize {
        self.activity.report.failed()
            + self.network.report.failed()
            + self.cartography.report.failed()
    }
}

/// Scan `root` and run the activity, network and cartography aggregators
/// over it.
///
/// Only configuration and directory errors are returned; unreadable files
/// are recorded in each model's load report.
pub fn load_dataset(root: &Path, config: &MeaConfig) -> Result<Dataset> {
    config.validate()?;
    let start = Instant::now();
    let index = scan_experiment_dir(root, config)?;

    let (activity, (network, cartography)) = if config.parallel_aggregation {
        rayon::join(
            || ActivityAggregator::new(config).run(&index),
            || {
                rayon::join(
                    || NetworkAggregator::new(config).run(&index),
                    || CartographyAggregator::new(config).run(&index),
                )
            },
        )
    } else {
        (
            ActivityAggregator::new(config).run(&index),
            (
                NetworkAggregator::new(config).run(&index),
                CartographyAggregator::new(config).run(&index),
            ),
        )
    };

    let dataset = Dataset {
        created_at: chrono::Utc::now().to_rfc3339(),
        config: config.clone(),
        index,
        activity,
        network,
        cartography,
    };
    log::info!(
        "Loaded {} experiments from {} in {:.2?} ({} file failures)",
        dataset.index.experiment_count(),
        root.display(),
        start.elapsed(),
        dataset.failure_count()
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MeaError;

    #[test]
    fn test_invalid_config_is_rejected_before_scanning() {
        let config = MeaConfig {
            age_marker: String::new(),
            ..MeaConfig::default()
        };
        let result = load_dataset(Path::new("/definitely/not/here"), &config);
        assert!(matches!(result, Err(MeaError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_root() {
        let result = load_dataset(Path::new("/definitely/not/here"), &MeaConfig::default());
        assert!(matches!(result, Err(MeaError::DirectoryNotFound(_))));
    }

    #[test]
    fn test_empty_root_loads_empty_models() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = load_dataset(dir.path(), &MeaConfig::default()).unwrap();
        assert!(dataset.index.groups.is_empty());
        assert!(dataset.network.by_lag.is_empty());
        assert_eq!(dataset.failure_count(), 0);

        let json: serde_json::Value = serde_json::from_str(&dataset.to_json().unwrap()).unwrap();
        assert!(json["activity"]["by_div"].is_object());
    }
}
