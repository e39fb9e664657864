use std::path::{Path, PathBuf};

use crate::config::{GeneratorConfig, NumPartitionsMode, RearrangementPolicy, Stage};
use crate::enumerate::PartitioningLeaf;
use crate::error::{ParamsError, Result};
use crate::paths::{
    Arrangement, ArtifactTree, MatrixCoords, PartitioningCoords, StageDir, HISTOGRAM_MAPPING_FILE,
    JOIN_DIR, PARTITIONS_COST_FILE, PARTITION_CELLS_FILE, PROPERTIES_FILE, REARRANGEMENTS_FILE,
};
use crate::record::{Outcome, ParameterRecord, SkipReason};

const NO_PARTITION_TARGET: &str = "-1";

pub struct BuildContext<'a> {
    pub config: &'a GeneratorConfig,
    pub tree: &'a ArtifactTree,
    dataset_dir: PathBuf,
}

impl<'a> BuildContext<'a> {
    pub fn new(config: &'a GeneratorConfig, tree: &'a ArtifactTree) -> Self {
        Self {
            config,
            tree,
            dataset_dir: config.dataset_directory(),
        }
    }

    pub fn dataset_dir(&self) -> &Path {
        &self.dataset_dir
    }

    pub fn resolve(&self, dir: &StageDir) -> PathBuf {
        dir.path(&self.dataset_dir)
    }

    fn require_dir(&self, dir: &StageDir) -> std::result::Result<PathBuf, SkipReason> {
        let path = self.resolve(dir);
        if self.tree.dir_exists(&path) {
            Ok(path)
        } else {
            Err(SkipReason::missing(dir.stage(), path))
        }
    }
}

pub fn build_partition_matrix(ctx: &BuildContext<'_>, matrix: &MatrixCoords) -> Outcome {
    let mut record = ParameterRecord::new("realPartitionMatrix");
    record.insert("buckets", matrix.buckets);
    record.insert("sparsity", matrix.sparsity);
    record.insert("bands", matrix.bands);
    record.insert("bandsOffsetSeed", matrix.bands_offset_seed);
    record.insert_path("datasetDirectory", ctx.dataset_dir());
    record.insert_path(
        "histogramsDirectory",
        &ctx.resolve(&StageDir::Histograms {
            buckets: matrix.buckets,
        }),
    );
    record.insert_path(
        "partitionMatrixDirectory",
        &ctx.resolve(&StageDir::PartitionMatrix(*matrix)),
    );
    Outcome::Emitted(record)
}

/// Permutation policies fan out into one outcome per configured partition
/// count; every other policy yields exactly one outcome.
pub fn build_rearrangement(
    ctx: &BuildContext<'_>,
    matrix: &MatrixCoords,
    policy: &RearrangementPolicy,
) -> Vec<Outcome> {
    let matrix_dir = match ctx.require_dir(&StageDir::PartitionMatrix(*matrix)) {
        Ok(path) => path,
        Err(reason) => return vec![Outcome::Skipped(reason)],
    };
    let targets: Vec<Option<u32>> = match policy {
        RearrangementPolicy::Identity => {
            return vec![Outcome::Skipped(SkipReason::IdentityRearrangement)]
        }
        RearrangementPolicy::Permutation(_) => ctx
            .config
            .dimensions
            .num_partitions
            .iter()
            .map(|n| Some(*n))
            .collect(),
        RearrangementPolicy::Single(_) | RearrangementPolicy::Radius(_) => vec![None],
    };

    let radius = ctx.config.defaults.bea_radius;
    targets
        .into_iter()
        .map(|target| {
            let arrangement = Arrangement::new(policy, radius, target.unwrap_or_default());
            let mut record = ParameterRecord::new("rearrangement");
            record.insert("rearrangementPolicy", policy.name());
            record.insert_path("partitionMatrixDirectory", &matrix_dir);
            record.insert_path("datasetDirectory", ctx.dataset_dir());
            record.insert_path(
                "partitionMatrixRearrangedDirectory",
                &ctx.resolve(&StageDir::Rearranged(*matrix, arrangement)),
            );
            match target {
                Some(n) => {
                    record.insert("numPartitions", n);
                    record.insert("tspk", &ctx.config.defaults.tspk_path);
                }
                None => record.insert("numPartitions", NO_PARTITION_TARGET),
            }
            Outcome::Emitted(record)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PartitioningTarget {
    rearranged_dir: PathBuf,
    num_partitions: u32,
    partitioning_dir: PathBuf,
    default_partitioning_dir: Option<PathBuf>,
}

enum Resolution {
    Ready(PartitioningTarget),
    Skip(SkipReason),
}

macro_rules! require {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(reason) => return Ok(Resolution::Skip(reason)),
        }
    };
}

fn resolve_partitioning(ctx: &BuildContext<'_>, leaf: &PartitioningLeaf) -> Result<Resolution> {
    let defaults = &ctx.config.defaults;
    let arrangement = Arrangement::new(
        &leaf.rearrangement,
        defaults.bea_radius,
        leaf.num_partitions,
    );
    let partitioning = |coords: PartitioningCoords| {
        StageDir::Partitioning(leaf.matrix, arrangement.clone(), coords)
    };

    let rearranged_dir = require!(ctx.require_dir(&StageDir::Rearranged(
        leaf.matrix,
        arrangement.clone()
    )));
    let coords = PartitioningCoords::new(
        &leaf.partitioning_policy,
        leaf.num_partitions,
        leaf.mode,
        leaf.search_policy,
        &leaf.binary_search_policy,
        &defaults.range_search_upper_bound_granularity,
    );
    let range = leaf.search_policy.is_range();

    let target = match leaf.mode {
        NumPartitionsMode::Actual => {
            let default_partitioning_dir = if range {
                let reference = coords.binary_reference(defaults, leaf.num_partitions);
                Some(require!(ctx.require_dir(&partitioning(reference))))
            } else {
                None
            };
            PartitioningTarget {
                rearranged_dir,
                num_partitions: leaf.num_partitions,
                partitioning_dir: ctx.resolve(&partitioning(coords)),
                default_partitioning_dir,
            }
        }
        NumPartitionsMode::LikeDefault => {
            let baseline_dir = require!(ctx.require_dir(&partitioning(
                PartitioningCoords::baseline(defaults, leaf.num_partitions)
            )));
            let used = match ctx.tree.count_cost_rows(&baseline_dir)? {
                Some(rows) if rows > 0 => u32::try_from(rows).map_err(|_| {
                    ParamsError::Config(format!(
                        "{} in {} lists more partitions than supported",
                        PARTITIONS_COST_FILE,
                        baseline_dir.display()
                    ))
                })?,
                // Absent or empty: no baseline partitions to match.
                _ => {
                    return Ok(Resolution::Skip(SkipReason::missing(
                        Stage::Partitioning,
                        baseline_dir.join(PARTITIONS_COST_FILE),
                    )))
                }
            };
            if range {
                let reference = coords.binary_reference(defaults, used);
                let default_partitioning_dir = require!(ctx.require_dir(&partitioning(reference)));
                PartitioningTarget {
                    rearranged_dir,
                    num_partitions: used,
                    partitioning_dir: ctx.resolve(&partitioning(coords)),
                    default_partitioning_dir: Some(default_partitioning_dir),
                }
            } else {
                // Binary search under the baseline's count is an ordinary actual run.
                let actual = PartitioningCoords {
                    num_partitions: used,
                    mode: defaults.num_partitions_mode,
                    ..coords
                };
                PartitioningTarget {
                    rearranged_dir,
                    num_partitions: used,
                    partitioning_dir: ctx.resolve(&partitioning(actual)),
                    default_partitioning_dir: None,
                }
            }
        }
    };
    Ok(Resolution::Ready(target))
}

pub fn build_partitioning(ctx: &BuildContext<'_>, leaf: &PartitioningLeaf) -> Result<Outcome> {
    let target = match resolve_partitioning(ctx, leaf)? {
        Resolution::Ready(target) => target,
        Resolution::Skip(reason) => return Ok(Outcome::Skipped(reason)),
    };

    let mut record = ParameterRecord::new("partitioning");
    record.insert("partitioningPolicy", &leaf.partitioning_policy);
    record.insert_path("partitionMatrixDirectory", &target.rearranged_dir);
    record.insert("searchPolicy", leaf.search_policy.as_str());
    record.insert("binarySearchPolicy", &leaf.binary_search_policy);
    record.insert_path("datasetDirectory", ctx.dataset_dir());
    if !leaf.rearrangement.is_identity() {
        record.insert_path(
            "rearrangements",
            &target.rearranged_dir.join(REARRANGEMENTS_FILE),
        );
    }
    record.insert("numPartitions", target.num_partitions);
    if leaf.search_policy.is_range() {
        record.insert(
            "rangeSearchUpperBoundGranularity",
            &ctx.config.defaults.range_search_upper_bound_granularity,
        );
        if let Some(weights) = &leaf.weight_set {
            record.insert("rangeSearchWeights", weights);
        }
    }
    record.insert_path("partitioningDirectory", &target.partitioning_dir);
    if let Some(dir) = &target.default_partitioning_dir {
        record.insert_path("defaultPartitioningDirectory", dir);
    }
    Ok(Outcome::Emitted(record))
}

pub fn build_downstream(ctx: &BuildContext<'_>, leaf: &PartitioningLeaf) -> Result<Outcome> {
    let target = match resolve_partitioning(ctx, leaf)? {
        Resolution::Ready(target) => target,
        Resolution::Skip(reason) => return Ok(Outcome::Skipped(reason)),
    };
    let partitioning_dir = &target.partitioning_dir;
    if !ctx.tree.dir_exists(partitioning_dir) {
        return Ok(Outcome::Skipped(SkipReason::missing(
            Stage::Partitioning,
            partitioning_dir.clone(),
        )));
    }
    let Some(used) = ctx
        .tree
        .count_cost_rows(partitioning_dir)?
        .filter(|rows| *rows > 0)
    else {
        return Ok(Outcome::Skipped(SkipReason::missing(
            Stage::Partitioning,
            partitioning_dir.join(PARTITIONS_COST_FILE),
        )));
    };

    let mut record = ParameterRecord::new("join");
    record.insert("numPartitions", used);
    record.insert(
        "jobMaxExecutionHours",
        ctx.config.defaults.job_max_execution_hours,
    );
    record.insert_path("datasetDirectory", ctx.dataset_dir());
    record.insert_path(
        "properties",
        &target.rearranged_dir.join(PROPERTIES_FILE),
    );
    if !leaf.rearrangement.is_identity() {
        record.insert_path(
            "rearrangements",
            &target.rearranged_dir.join(REARRANGEMENTS_FILE),
        );
    }
    record.insert_path(
        "histogramIndexToPartitionsMapping",
        &partitioning_dir.join(HISTOGRAM_MAPPING_FILE),
    );
    record.insert_path(
        "partitionToCellsMapping",
        &partitioning_dir.join(PARTITION_CELLS_FILE),
    );
    record.insert_path("mBucketIDirectory", &partitioning_dir.join(JOIN_DIR));
    Ok(Outcome::Emitted(record))
}
