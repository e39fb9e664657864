use std::fs;
use std::path::Path;

use btj_params::{
    Generator, GeneratorConfig, ParamsError, Stage, PARTITIONS_COST_FILE,
};

const SINGLE_MATRIX: &str = "
dataset:
  root: datasets
  name: solar
stages:
  partition_matrix: true
  rearrangement: false
  partitioning: false
dimensions:
  buckets: [100]
  sparsities: [1]
  bands: [1]
  bands_offset_seeds: [0]
  rearrangement_policies: [none]
";

fn config(raw: &str) -> GeneratorConfig {
    GeneratorConfig::from_yaml_str(raw, Path::new("inline.yaml")).expect("config")
}

fn lines(base: &Path, stage: Stage) -> Vec<String> {
    let path = base.join("parameters").join("solar").join(stage.file_name());
    fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("read {}: {}", path.display(), e))
        .lines()
        .map(str::to_string)
        .collect()
}

fn mkdir(base: &Path, rel: &str) {
    fs::create_dir_all(base.join(rel)).expect("mkdir");
}

fn assert_sorted_unique_keys(line: &str) {
    let keys: Vec<&str> = line
        .split('\t')
        .map(|pair| pair.split_once('=').expect("key=value").0)
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(keys, sorted, "keys not sorted/unique: {}", line);
}

#[test]
fn partition_matrix_only_emits_one_record() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let summary = Generator::new(config(SINGLE_MATRIX), tmp.path())
        .expect("generator")
        .run()
        .expect("run");
    assert_eq!(summary.emitted(Stage::PartitionMatrix), 1);
    assert!(summary.stage(Stage::Rearrangement).is_none());

    let out = lines(tmp.path(), Stage::PartitionMatrix);
    assert_eq!(out.len(), 1);
    for field in [
        "executionMode=realPartitionMatrix",
        "buckets=100",
        "sparsity=1",
        "bands=1",
        "bandsOffsetSeed=0",
    ] {
        assert!(out[0].split('\t').any(|f| f == field), "{} in {}", field, out[0]);
    }
    assert_sorted_unique_keys(&out[0]);
    assert!(!tmp
        .path()
        .join("parameters/solar")
        .join(Stage::Rearrangement.file_name())
        .exists());
}

#[test]
fn permutation_policy_fans_out_and_identity_emits_nothing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    mkdir(tmp.path(), "datasets/solar/100/1_1_0");
    let raw = format!(
        "{}  num_partitions: [10, 20]\n",
        SINGLE_MATRIX
            .replace("rearrangement: false", "rearrangement: true")
            .replace("[none]", "[none, TSPk]")
    );
    let summary = Generator::new(config(&raw), tmp.path())
        .expect("generator")
        .run()
        .expect("run");

    let out = lines(tmp.path(), Stage::Rearrangement);
    assert_eq!(out.len(), 2);
    assert!(out[0].contains("partitionMatrixRearrangedDirectory=datasets/solar/100/1_1_0/TSPk_10"));
    assert!(out[1].contains("partitionMatrixRearrangedDirectory=datasets/solar/100/1_1_0/TSPk_20"));
    out.iter().for_each(|l| assert_sorted_unique_keys(l));

    let stage = summary.stage(Stage::Rearrangement).expect("stage");
    assert_eq!(stage.emitted, 2);
    assert_eq!(stage.skipped.get("identity_rearrangement"), Some(&1));
}

#[test]
fn missing_partition_matrix_skips_rearrangement_silently() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let raw = SINGLE_MATRIX
        .replace("rearrangement: false", "rearrangement: true")
        .replace("[none]", "[BEA, BEARadius, TSPk]");
    let summary = Generator::new(config(&raw), tmp.path())
        .expect("generator")
        .run()
        .expect("missing artifacts are not fatal");
    assert!(lines(tmp.path(), Stage::Rearrangement).is_empty());
    let stage = summary.stage(Stage::Rearrangement).expect("stage");
    assert_eq!(stage.skipped.get("missing_partition_matrix"), Some(&3));
}

#[test]
fn like_default_without_baseline_emits_nothing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    mkdir(tmp.path(), "datasets/solar/100/1_1_0");
    let raw = "
dataset: { name: solar }
stages: { partition_matrix: false, rearrangement: false, partitioning: true }
dimensions:
  num_partitions_modes: [likeDefault]
  search_policies: [BINARY_SEARCH, RANGE_SEARCH]
  buckets: [100]
  sparsities: [1]
  bands: [1]
  bands_offset_seeds: [0]
  rearrangement_policies: [none]
  partitioning_policies: [MBI, AICPM]
  num_partitions: [10, 20]
";
    let summary = Generator::new(config(raw), tmp.path())
        .expect("generator")
        .run()
        .expect("run");
    assert!(lines(tmp.path(), Stage::Partitioning).is_empty());
    let stage = summary.stage(Stage::Partitioning).expect("stage");
    assert_eq!(stage.emitted, 0);
    assert!(stage.skipped_total() > 0);
}

const LIKE_DEFAULT_BINARY: &str = "
dataset: { name: solar }
stages: { partition_matrix: false, rearrangement: false, partitioning: true }
dimensions:
  num_partitions_modes: [likeDefault]
  search_policies: [BINARY_SEARCH]
  buckets: [100]
  sparsities: [1]
  bands: [1]
  bands_offset_seeds: [0]
  rearrangement_policies: [none]
  partitioning_policies: [AICPM]
  num_partitions: [20]
  binary_search_policies: [MAX_PARTITION_INPUT]
";

const LIKE_DEFAULT_BASELINE: &str =
    "datasets/solar/100/1_1_0/MBI_20_actual/BINARY_SEARCH-MAX_PARTITION_INPUT";

#[test]
fn like_default_reads_partition_count_from_baseline() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let baseline = LIKE_DEFAULT_BASELINE;
    mkdir(tmp.path(), baseline);
    fs::write(
        tmp.path().join(baseline).join(PARTITIONS_COST_FILE),
        (0..18).map(|i| format!("{},{}\n", i, i * 10)).collect::<String>(),
    )
    .expect("cost file");
    Generator::new(config(LIKE_DEFAULT_BINARY), tmp.path())
        .expect("generator")
        .run()
        .expect("run");
    let out = lines(tmp.path(), Stage::Partitioning);
    assert_eq!(out.len(), 1);
    assert_sorted_unique_keys(&out[0]);
    assert!(out[0].contains("\tnumPartitions=18\t"), "{}", out[0]);
    assert!(out[0].contains(
        "partitioningDirectory=datasets/solar/100/1_1_0/AICPM_18_actual/BINARY_SEARCH-MAX_PARTITION_INPUT"
    ));
}

#[test]
fn like_default_counts_undecodable_baseline_rows() {
    let tmp = tempfile::tempdir().expect("tempdir");
    mkdir(tmp.path(), LIKE_DEFAULT_BASELINE);
    fs::write(
        tmp.path().join(LIKE_DEFAULT_BASELINE).join(PARTITIONS_COST_FILE),
        b"0,\xff\xfe\n1,2\n2,3\n",
    )
    .expect("cost file");
    Generator::new(config(LIKE_DEFAULT_BINARY), tmp.path())
        .expect("generator")
        .run()
        .expect("run");
    let out = lines(tmp.path(), Stage::Partitioning);
    assert_eq!(out.len(), 1);
    assert!(out[0].contains("\tnumPartitions=3\t"), "{}", out[0]);
}

#[test]
fn like_default_skips_empty_baseline() {
    let tmp = tempfile::tempdir().expect("tempdir");
    mkdir(tmp.path(), LIKE_DEFAULT_BASELINE);
    fs::write(
        tmp.path().join(LIKE_DEFAULT_BASELINE).join(PARTITIONS_COST_FILE),
        "",
    )
    .expect("cost file");
    let summary = Generator::new(config(LIKE_DEFAULT_BINARY), tmp.path())
        .expect("generator")
        .run()
        .expect("run");
    assert!(lines(tmp.path(), Stage::Partitioning).is_empty());
    let stage = summary.stage(Stage::Partitioning).expect("partitioning summary");
    assert_eq!(stage.skipped.get("missing_partitioning"), Some(&1));
}

#[test]
fn full_pipeline_over_materialized_tree() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let matrix = "datasets/solar/100/1_1_0";
    mkdir(tmp.path(), &format!("{}/TSPk_10", matrix));
    for policy in ["MBI", "AICPM"] {
        let run = format!(
            "{}/TSPk_10/{}_10_actual/BINARY_SEARCH-MAX_PARTITION_INPUT",
            matrix, policy
        );
        mkdir(tmp.path(), &run);
        fs::write(tmp.path().join(&run).join(PARTITIONS_COST_FILE), "1\n2\n").expect("cost");
    }
    // a binary run that never finished: directory only, no cost file
    mkdir(
        tmp.path(),
        &format!(
            "{}/TSPk_10/AICPM_10_actual/BINARY_SEARCH-MAX_PARTITION_CANDIDATE_CELLS",
            matrix
        ),
    );
    let raw = "
dataset: { name: solar }
stages: { partition_matrix: true, rearrangement: true, partitioning: true, downstream: true }
dimensions:
  search_policies: [BINARY_SEARCH, RANGE_SEARCH]
  buckets: [100]
  sparsities: [1]
  bands: [1]
  bands_offset_seeds: [0]
  rearrangement_policies: [TSPk]
  partitioning_policies: [MBI, AICPM]
  num_partitions: [10]
  range_search_weights: ['x_1-y_1', 'y_0.5-x_0.5', 'x_3-y_1']
";
    let generator = Generator::new(config(raw), tmp.path()).expect("generator");
    assert_eq!(generator.weight_sets(), ["x_0.5-y_0.5", "x_0.75-y_0.25"]);
    let summary = generator.run().expect("run");

    assert_eq!(lines(tmp.path(), Stage::PartitionMatrix).len(), 1);
    assert_eq!(lines(tmp.path(), Stage::Rearrangement).len(), 1);

    // binary: MBI(1) + AICPM(2); range: (MBI(1) + AICPM(2)) * weight sets(2)
    let partitioning = lines(tmp.path(), Stage::Partitioning);
    assert_eq!(partitioning.len(), 9);
    for line in &partitioning {
        assert_sorted_unique_keys(line);
        assert!(line.contains("rearrangements=datasets/solar/100/1_1_0/TSPk_10/rearrangements.csv"));
        let range = line.contains("searchPolicy=RANGE_SEARCH");
        assert_eq!(line.contains("rangeSearchWeights="), range, "{}", line);
        assert_eq!(line.contains("rangeSearchUpperBoundGranularity=2.0_11"), range, "{}", line);
    }
    assert_eq!(summary.pruned.get("input_size_policy_non_baseline_sub_policy"), Some(&4));
    assert_eq!(summary.pruned.get("weight_set_without_range_search"), Some(&3));

    // only the two binary MAX_PARTITION_INPUT runs have cost files
    let joins = lines(tmp.path(), Stage::Downstream);
    assert_eq!(joins.len(), 2);
    for line in &joins {
        assert!(line.contains("executionMode=join"));
        assert!(line.contains("numPartitions=2"));
    }
}

#[test]
fn malformed_weight_set_aborts_before_writing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut config = GeneratorConfig::default();
    config.dimensions.range_search_weights = vec!["a_0-b_0".to_string()];
    let err = Generator::new(config, tmp.path())
        .err()
        .expect("malformed weights are fatal");
    assert!(matches!(err, ParamsError::MalformedWeightSet { .. }), "{}", err);
    assert!(!tmp.path().join("parameters").exists());
}

#[test]
fn disabled_stages_do_not_create_files() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut config = config(SINGLE_MATRIX);
    config.stages.partition_matrix = false;
    let summary = Generator::new(config, tmp.path())
        .expect("generator")
        .run()
        .expect("run");
    assert!(summary.stages.is_empty());
    assert_eq!(summary.leaves, 0);
    let dir = tmp.path().join("parameters/solar");
    for stage in Stage::ALL {
        assert!(!dir.join(stage.file_name()).exists(), "{}", stage);
    }
}
