use crate::error::{MeaError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Kernel density settings used by [`crate::density::summarize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityConfig {
    /// Number of evenly spaced support points
    pub grid_points: usize,
    /// Fraction of the sample range added on each side of the support
    pub range_padding: f64,
    /// Rule-of-thumb factor in `factor * std * n^(-1/5)`
    pub bandwidth_factor: f64,
    /// Samples whose std and range both fall below this are treated as constant
    pub degenerate_epsilon: f64,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            grid_points: 100,
            range_padding: 0.05,
            bandwidth_factor: 1.06,
            degenerate_epsilon: 1e-10,
        }
    }
}

/// Loader configuration
///
/// Every field has a default matching the MEA-NAP output conventions, so an
/// empty JSON object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeaConfig {
    /// Token marking the days-in-vitro segment of an experiment name
    pub age_marker: String,
    /// Token preceding the lag value in graph-metric file names
    pub lag_marker: String,
    /// Extension of the binary result files (without the dot)
    pub file_extension: String,
    /// Firing rate (Hz) above which an electrode counts as active
    pub active_electrode_threshold: f64,
    pub density: DensityConfig,
    /// Run the three aggregators concurrently
    pub parallel_aggregation: bool,
}

impl Default for MeaConfig {
    fn default() -> Self {
        Self {
            age_marker: "DIV".to_string(),
            lag_marker: "lag".to_string(),
            file_extension: "mat".to_string(),
            active_electrode_threshold: 0.01,
            density: DensityConfig::default(),
            parallel_aggregation: true,
        }
    }
}

impl MeaConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: MeaConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.age_marker.is_empty() {
            return Err(MeaError::InvalidConfig("age_marker must not be empty".to_string()));
        }
        if self.lag_marker.is_empty() {
            return Err(MeaError::InvalidConfig("lag_marker must not be empty".to_string()));
        }
        if self.file_extension.is_empty() || self.file_extension.starts_with('.') {
            return Err(MeaError::InvalidConfig(format!(
                "file_extension must be a bare extension, got '{}'",
                self.file_extension
            )));
        }
        if !self.active_electrode_threshold.is_finite() || self.active_electrode_threshold < 0.0 {
            return Err(MeaError::InvalidConfig(format!(
                "active_electrode_threshold must be a non-negative number, got {}",
                self.active_electrode_threshold
            )));
        }

        let density = &self.density;
        if density.grid_points < 2 {
            return Err(MeaError::InvalidConfig(format!(
                "density.grid_points must be at least 2, got {}",
                density.grid_points
            )));
        }
        if !density.range_padding.is_finite() || density.range_padding < 0.0 {
            return Err(MeaError::InvalidConfig(format!(
                "density.range_padding must be non-negative, got {}",
                density.range_padding
            )));
        }
        if !density.bandwidth_factor.is_finite() || density.bandwidth_factor <= 0.0 {
            return Err(MeaError::InvalidConfig(format!(
                "density.bandwidth_factor must be positive, got {}",
                density.bandwidth_factor
            )));
        }
        if !density.degenerate_epsilon.is_finite() || density.degenerate_epsilon < 0.0 {
            return Err(MeaError::InvalidConfig(format!(
                "density.degenerate_epsilon must be non-negative, got {}",
                density.degenerate_epsilon
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = MeaConfig::from_json_str("{}").unwrap();
        assert_eq!(config, MeaConfig::default());
        assert_eq!(config.density.grid_points, 100);
    }

    #[test]
    fn test_partial_override() {
        let config =
            MeaConfig::from_json_str(r#"{"age_marker": "AGE", "density": {"grid_points": 50}}"#)
                .unwrap();
        assert_eq!(config.age_marker, "AGE");
        assert_eq!(config.density.grid_points, 50);
        assert_eq!(config.density.bandwidth_factor, 1.06);
    }

    #[test]
    fn test_rejects_dotted_extension() {
        let result = MeaConfig::from_json_str(r#"{"file_extension": ".mat"}"#);
        assert!(matches!(result, Err(MeaError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_tiny_grid() {
        let result = MeaConfig::from_json_str(r#"{"density": {"grid_points": 1}}"#);
        assert!(matches!(result, Err(MeaError::InvalidConfig(_))));
    }
}
