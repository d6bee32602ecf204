mod common;

use common::*;
use meanap_rs::aggregate::{ActivityAggregator, CartographyAggregator, NetworkAggregator};
use meanap_rs::density::DensityKind;
use meanap_rs::{load_dataset, scan_experiment_dir, summarize, Age, MeaConfig, Scalar};
use std::path::Path;
use tempfile::TempDir;

const EXP: &str = "A1_DIV50_foo";

fn numbers(values: &[f64]) -> Vec<Scalar> {
    values.iter().copied().map(Scalar::Number).collect()
}

fn write_node_metrics(root: &Path, group: &str, experiment: &str, lag: u32, nd: &[f64]) {
    write_result(
        root,
        group,
        experiment,
        &format!("nodeLevelMetrics_lag{}", lag),
        &[("nodeMetrics", structure(vec![("ND", column(nd))]))],
    );
}

/// Two groups holding an experiment of the same name
fn two_group_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    for (group, fr_mean, nd) in [("A", 2.0, &[1.0, 2.0, 3.0][..]), ("B", 4.0, &[4.0, 5.0][..])] {
        write_result(
            root,
            group,
            EXP,
            "recordingLevelActivity",
            &[("recordingData", structure(vec![("FRmean", scalar(fr_mean))]))],
        );
        write_node_metrics(root, group, EXP, 10, nd);
    }
    dir
}

#[test]
fn test_scan_finds_groups_ages_and_lags() {
    init_logger();
    let dir = two_group_tree();
    let index = scan_experiment_dir(dir.path(), &MeaConfig::default()).unwrap();

    assert_eq!(index.groups, vec!["A", "B"]);
    assert_eq!(index.ages["A"][&Age::Days(50)], vec![EXP]);
    assert_eq!(index.lags, vec![10]);
    assert!(index.unaged.is_empty());
    assert_eq!(index.experiment_count(), 2);
}

#[test]
fn test_network_views_keep_groups_apart() {
    init_logger();
    let dir = two_group_tree();
    let config = MeaConfig::default();
    let index = scan_experiment_dir(dir.path(), &config).unwrap();
    let network = NetworkAggregator::new(&config).run(&index);

    assert_eq!(network.by_group["A"][&10].node_metrics.values("ND"), numbers(&[1.0, 2.0, 3.0]));
    assert_eq!(network.group_node_values("B", 10, "ND"), numbers(&[4.0, 5.0]));

    // Same experiment name in both groups: two distinct records
    assert_eq!(network.by_experiment.len(), 2);
    assert!(network.experiment("A", EXP).is_some());
    assert!(network.experiment("B", EXP).is_some());

    let by_age = network.by_age[&Age::Days(50)][&10].node_metrics.get("ND").unwrap();
    assert_eq!(by_age.len(), 5);
    assert_eq!(by_age.groups(), ["A", "A", "A", "B", "B"]);
    assert!(by_age.exp_names().iter().all(|name| name == EXP));

    assert_eq!(network.by_lag[&10].node_metrics.exp_names(), [EXP, EXP]);
    assert_eq!(network.report.attempted, 2);
    assert_eq!(network.report.loaded, 2);
}

#[test]
fn test_corrupt_file_is_reported_and_skipped() {
    init_logger();
    let dir = two_group_tree();
    let root = dir.path();
    let bad = root.join("B").join(EXP).join(format!("{}_nodeLevelMetrics_lag10.mat", EXP));
    let bytes = mat5_bytes(&[("nodeMetrics", structure(vec![("ND", column(&[4.0, 5.0]))]))]);
    write_file(&bad, &bytes[..bytes.len() - 24]);

    let config = MeaConfig::default();
    let index = scan_experiment_dir(root, &config).unwrap();
    let network = NetworkAggregator::new(&config).run(&index);

    assert_eq!(network.report.attempted, 2);
    assert_eq!(network.report.failed(), 1);
    assert_eq!(network.report.failures[0].path, bad);
    assert_eq!(network.group_node_values("A", 10, "ND"), numbers(&[1.0, 2.0, 3.0]));
    assert!(network.by_group["B"][&10].node_metrics.is_empty());
    assert!(network.experiment("B", EXP).is_none());

    // The recording file next to it still loads
    let activity = ActivityAggregator::new(&config).run(&index);
    assert_eq!(activity.by_group["B"].values("FRmean"), numbers(&[4.0]));
}

#[test]
fn test_activity_group_means_and_raw_age_values() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_result(
        root,
        "WT",
        "WT1_DIV14",
        "electrodeLevelActivity",
        &[(
            "activityData",
            structure(vec![
                ("FR", column(&[1.0, 3.0, 0.0])),
                ("channels", column(&[12.0, 13.0, 14.0])),
            ]),
        )],
    );
    write_result(
        root,
        "WT",
        "WT1_DIV14",
        "recordingLevelActivity",
        &[("recordingData", structure(vec![("FRmean", scalar(1.3))]))],
    );

    let config = MeaConfig::default();
    let index = scan_experiment_dir(root, &config).unwrap();
    let activity = ActivityAggregator::new(&config).run(&index);

    let group = &activity.by_group["WT"];
    assert_eq!(group.values("FR"), numbers(&[4.0 / 3.0]));
    assert_eq!(group.values("FRmean"), numbers(&[1.3]));
    assert!(group.get("channels").is_none());
    // Electrode and recording files of one experiment form a single row
    assert_eq!(group.exp_names(), ["WT1_DIV14"]);

    let age = &activity.by_age[&Age::Days(14)];
    assert_eq!(age.values("FR"), numbers(&[1.0, 3.0, 0.0]));
    assert_eq!(age.values("channels"), numbers(&[12.0, 13.0, 14.0]));
    assert_eq!(age.values("FRActive"), numbers(&[2.0]));
    assert_eq!(age.exp_names().len(), 1);
    assert_eq!(age.get("FRmean").unwrap().exp_names(), ["WT1_DIV14"]);

    let record = activity.experiment("WT", "WT1_DIV14").unwrap();
    assert_eq!(record.age, Some(Age::Days(14)));
    assert!(record.metrics.contains_key("FRmean"));
}

#[test]
fn test_recording_metrics_fall_back_to_electrode_file() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_result(
        root,
        "KO",
        "KO1_DIV21",
        "electrodeSpikeActivity",
        &[("FR", row(&[0.5, 1.5])), ("numActiveElec", scalar(2.0))],
    );

    let config = MeaConfig::default();
    let index = scan_experiment_dir(root, &config).unwrap();
    let activity = ActivityAggregator::new(&config).run(&index);

    assert_eq!(activity.by_group["KO"].values("numActiveElec"), numbers(&[2.0]));
    assert_eq!(activity.by_age[&Age::Days(21)].values("FR"), numbers(&[0.5, 1.5]));
}

#[test]
fn test_unaged_experiment_skips_age_views() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_node_metrics(root, "A", "A2_noage", 5, &[7.0]);
    write_node_metrics(root, "A", "A3_DIV7", 5, &[8.0]);

    let config = MeaConfig::default();
    let index = scan_experiment_dir(root, &config).unwrap();
    assert_eq!(index.unaged.len(), 1);
    assert_eq!(index.unaged[0].experiment, "A2_noage");

    let network = NetworkAggregator::new(&config).run(&index);
    assert_eq!(network.group_node_values("A", 5, "ND"), numbers(&[7.0, 8.0]));
    assert_eq!(network.by_age.len(), 1);
    assert_eq!(network.by_age[&Age::Days(7)][&5].node_metrics.values("ND"), numbers(&[8.0]));
    assert_eq!(network.experiment("A", "A2_noage").unwrap().age, None);
}

#[test]
fn test_cartography_role_proportions() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_node_metrics(root, "A", "A1_DIV28", 15, &[1.0, 2.0, 3.0, 4.0]);
    write_result(
        root,
        "A",
        "A1_DIV28",
        "nodeCartography_lag15",
        &[(
            "cartographyData",
            structure(vec![
                ("z", column(&[0.1, 2.7, -0.4, 0.3])),
                ("p", column(&[0.0, 0.2, 0.8, 0.5])),
                (
                    "roles",
                    cellstr(&["Peripheral", "Provincial hub", "Peripheral", "Non-hub connector"]),
                ),
            ]),
        )],
    );

    let config = MeaConfig::default();
    let index = scan_experiment_dir(root, &config).unwrap();
    let cartography = CartographyAggregator::new(&config).run(&index);

    let bucket = &cartography.by_lag[&15];
    assert_eq!(bucket.total_roles, 4);
    assert_eq!(bucket.role_counts["Peripheral"], 2);
    assert_eq!(bucket.role_proportions["Peripheral"], 0.5);
    assert_eq!(bucket.role_proportions["Provincial hub"], 0.25);
    assert_eq!(bucket.role_proportions["Kinless hub"], 0.0);
    assert_eq!(bucket.series.values("z").len(), 4);

    let by_age = &cartography.by_age[&Age::Days(28)][&15];
    assert_eq!(by_age.nodal_roles().len(), 4);
}

#[test]
fn test_load_dataset_is_the_same_in_parallel_and_sequentially() {
    init_logger();
    let dir = two_group_tree();
    let parallel = load_dataset(dir.path(), &MeaConfig::default()).unwrap();
    let sequential = load_dataset(
        dir.path(),
        &MeaConfig {
            parallel_aggregation: false,
            ..MeaConfig::default()
        },
    )
    .unwrap();

    assert_eq!(parallel.activity, sequential.activity);
    assert_eq!(parallel.network, sequential.network);
    assert_eq!(parallel.cartography, sequential.cartography);

    let json: serde_json::Value = serde_json::from_str(&parallel.to_json().unwrap()).unwrap();
    assert_eq!(json["index"]["lags"][0], 10);
    assert!(json["network"]["by_div"]["50"]["10"]["node_metrics"]["ND"]["values"].is_array());
    assert_eq!(json["activity"]["by_group"]["A"]["FRmean"]["values"][0], 2.0);
}

#[test]
fn test_density_of_a_group_series() {
    let dir = two_group_tree();
    let dataset = load_dataset(dir.path(), &MeaConfig::default()).unwrap();
    let nd = dataset.network.by_lag[&10].node_metrics.get("ND").unwrap();

    let summary = summarize(&nd.numbers());
    assert_eq!(summary.kind, DensityKind::Kde);
    assert_eq!(summary.count, 5);
    assert_eq!(summary.mean, 3.0);
    assert_eq!(summary.median, 3.0);
    assert_eq!(summary.support.len(), 100);
}
