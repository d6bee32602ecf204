pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod dataset;
pub mod density;
pub mod error;
pub mod fields;
pub mod mat;
pub mod mmap_utils;
pub mod normalize;
pub mod scanner;
pub mod types;

pub use aggregate::{
    ActivityAggregator, ActivityModel, Bucket, CartographyAggregator, CartographyModel,
    LoadReport, NetworkAggregator, NetworkModel, Series,
};
pub use config::{DensityConfig, MeaConfig};
pub use dataset::{load_dataset, Dataset};
pub use density::{summarize, summarize_with, BasicStats, DensitySummary};
pub use error::{MeaError, Result};
pub use fields::get_field;
pub use mat::{load_mat_file, MatValue, RawRecord, StructReader};
pub use normalize::flatten;
pub use scanner::{scan_experiment_dir, ExperimentIndex};
pub use types::*;
