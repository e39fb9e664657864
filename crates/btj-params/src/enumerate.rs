use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::builders::{
    build_downstream, build_partition_matrix, build_partitioning, build_rearrangement,
    BuildContext,
};
use crate::config::{
    is_input_size_policy, Defaults, Dimensions, GeneratorConfig, NumPartitionsMode,
    RearrangementPolicy, SearchPolicy, Stage,
};
use crate::error::Result;
use crate::paths::{ArtifactTree, MatrixCoords};
use crate::record::Outcome;
use crate::writer::{StageFile, StageWriters};

/// Mixed-radix counter over index tuples; the last position moves fastest.
#[derive(Debug, Clone)]
pub struct Odometer {
    radices: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl Odometer {
    pub fn new(radices: Vec<usize>) -> Self {
        let next = if radices.iter().any(|r| *r == 0) {
            None
        } else {
            Some(vec![0; radices.len()])
        };
        Self { radices, next }
    }

    pub fn len(&self) -> usize {
        self.radices.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Iterator for Odometer {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        let mut following = current.clone();
        for pos in (0..following.len()).rev() {
            following[pos] += 1;
            if following[pos] < self.radices[pos] {
                self.next = Some(following);
                break;
            }
            following[pos] = 0;
        }
        Some(current)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitioningLeaf {
    pub mode: NumPartitionsMode,
    pub search_policy: SearchPolicy,
    pub matrix: MatrixCoords,
    pub rearrangement: RearrangementPolicy,
    pub partitioning_policy: String,
    pub num_partitions: u32,
    pub weight_index: usize,
    pub weight_set: Option<String>,
    pub binary_search_policy: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Prune {
    InputSizePolicyNonBaselineSubPolicy,
    WeightSetWithoutRangeSearch,
}

impl Prune {
    pub const ALL: [Prune; 2] = [
        Prune::InputSizePolicyNonBaselineSubPolicy,
        Prune::WeightSetWithoutRangeSearch,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Prune::InputSizePolicyNonBaselineSubPolicy => {
                "input_size_policy_non_baseline_sub_policy"
            }
            Prune::WeightSetWithoutRangeSearch => "weight_set_without_range_search",
        }
    }

    pub fn applies(&self, leaf: &PartitioningLeaf, defaults: &Defaults) -> bool {
        match self {
            Prune::InputSizePolicyNonBaselineSubPolicy => {
                is_input_size_policy(&leaf.partitioning_policy)
                    && leaf.binary_search_policy != defaults.binary_search_policy
            }
            Prune::WeightSetWithoutRangeSearch => {
                !leaf.search_policy.is_range() && leaf.weight_index > 0
            }
        }
    }

    pub fn first_match(leaf: &PartitioningLeaf, defaults: &Defaults) -> Option<Prune> {
        Prune::ALL.into_iter().find(|p| p.applies(leaf, defaults))
    }
}

pub fn matrix_choices(dims: &Dimensions) -> impl Iterator<Item = MatrixCoords> + '_ {
    Odometer::new(vec![
        dims.buckets.len(),
        dims.sparsities.len(),
        dims.bands.len(),
        dims.bands_offset_seeds.len(),
    ])
    .map(move |idx| MatrixCoords {
        buckets: dims.buckets[idx[0]],
        sparsity: dims.sparsities[idx[1]],
        bands: dims.bands[idx[2]],
        bands_offset_seed: dims.bands_offset_seeds[idx[3]],
    })
}

pub fn rearrangement_choices<'a>(
    dims: &'a Dimensions,
) -> impl Iterator<Item = (MatrixCoords, &'a RearrangementPolicy)> + 'a {
    matrix_choices(dims).flat_map(move |matrix| {
        dims.rearrangement_policies
            .iter()
            .map(move |policy| (matrix, policy))
    })
}

pub fn partitioning_leaves<'a>(
    dims: &'a Dimensions,
    weight_sets: &'a [String],
) -> impl Iterator<Item = PartitioningLeaf> + 'a {
    Odometer::new(vec![
        dims.num_partitions_modes.len(),
        dims.search_policies.len(),
        dims.buckets.len(),
        dims.sparsities.len(),
        dims.bands.len(),
        dims.bands_offset_seeds.len(),
        dims.rearrangement_policies.len(),
        dims.partitioning_policies.len(),
        dims.num_partitions.len(),
        weight_sets.len().max(1),
        dims.binary_search_policies.len(),
    ])
    .map(move |idx| {
        let search_policy = dims.search_policies[idx[1]];
        PartitioningLeaf {
            mode: dims.num_partitions_modes[idx[0]],
            search_policy,
            matrix: MatrixCoords {
                buckets: dims.buckets[idx[2]],
                sparsity: dims.sparsities[idx[3]],
                bands: dims.bands[idx[4]],
                bands_offset_seed: dims.bands_offset_seeds[idx[5]],
            },
            rearrangement: dims.rearrangement_policies[idx[6]].clone(),
            partitioning_policy: dims.partitioning_policies[idx[7]].clone(),
            num_partitions: dims.num_partitions[idx[8]],
            weight_index: idx[9],
            weight_set: if search_policy.is_range() {
                weight_sets.get(idx[9]).cloned()
            } else {
                None
            },
            binary_search_policy: dims.binary_search_policies[idx[10]].clone(),
        }
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageSummary {
    pub emitted: usize,
    pub skipped: BTreeMap<String, usize>,
    pub path: Option<PathBuf>,
}

impl StageSummary {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub stages: BTreeMap<Stage, StageSummary>,
    pub leaves: usize,
    pub pruned: BTreeMap<&'static str, usize>,
}

impl RunSummary {
    pub fn stage(&self, stage: Stage) -> Option<&StageSummary> {
        self.stages.get(&stage)
    }

    pub fn emitted(&self, stage: Stage) -> usize {
        self.stage(stage).map(|s| s.emitted).unwrap_or(0)
    }

    fn record_files(&mut self, files: Vec<StageFile>) {
        for file in files {
            self.stages.entry(file.stage).or_default().path = Some(file.path);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanCounts {
    pub matrices: usize,
    pub rearrangements: usize,
    pub leaves: usize,
    pub pruned: BTreeMap<&'static str, usize>,
}

impl PlanCounts {
    pub fn surviving_leaves(&self) -> usize {
        self.leaves - self.pruned.values().sum::<usize>()
    }
}

pub struct Generator {
    config: GeneratorConfig,
    weight_sets: Vec<String>,
    tree: ArtifactTree,
}

impl Generator {
    pub fn new(config: GeneratorConfig, base_dir: impl Into<PathBuf>) -> Result<Self> {
        config.validate()?;
        let weight_sets = config.canonical_weight_sets()?;
        Ok(Self {
            config,
            weight_sets,
            tree: ArtifactTree::new(base_dir),
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn weight_sets(&self) -> &[String] {
        &self.weight_sets
    }

    pub fn parameters_directory(&self) -> PathBuf {
        self.tree.base().join(self.config.parameters_directory())
    }

    pub fn plan_counts(&self) -> PlanCounts {
        let dims = &self.config.dimensions;
        let mut counts = PlanCounts {
            matrices: matrix_choices(dims).count(),
            rearrangements: rearrangement_choices(dims).count(),
            ..PlanCounts::default()
        };
        for leaf in partitioning_leaves(dims, &self.weight_sets) {
            counts.leaves += 1;
            if let Some(prune) = Prune::first_match(&leaf, &self.config.defaults) {
                *counts.pruned.entry(prune.name()).or_default() += 1;
            }
        }
        counts
    }

    pub fn run(&self) -> Result<RunSummary> {
        let dir = self.parameters_directory();
        let mut writers = StageWriters::open(&dir, &self.config.stages.enabled())?;
        let mut summary = self.generate(&mut writers)?;
        summary.record_files(writers.close()?);
        info!(
            leaves = summary.leaves,
            partition_matrix = summary.emitted(Stage::PartitionMatrix),
            rearrangement = summary.emitted(Stage::Rearrangement),
            partitioning = summary.emitted(Stage::Partitioning),
            downstream = summary.emitted(Stage::Downstream),
            "parameter generation finished"
        );
        Ok(summary)
    }

    pub fn generate(&self, writers: &mut StageWriters) -> Result<RunSummary> {
        let ctx = BuildContext::new(&self.config, &self.tree);
        let dims = &self.config.dimensions;
        let mut summary = RunSummary::default();
        for stage in Stage::ALL {
            if writers.is_open(stage) {
                summary.stages.insert(stage, StageSummary::default());
            }
        }

        if writers.is_open(Stage::PartitionMatrix) {
            for matrix in matrix_choices(dims) {
                let outcome = build_partition_matrix(&ctx, &matrix);
                Self::handle(Stage::PartitionMatrix, outcome, writers, &mut summary)?;
            }
        }

        if writers.is_open(Stage::Rearrangement) {
            for (matrix, policy) in rearrangement_choices(dims) {
                for outcome in build_rearrangement(&ctx, &matrix, policy) {
                    Self::handle(Stage::Rearrangement, outcome, writers, &mut summary)?;
                }
            }
        }

        let partitioning = writers.is_open(Stage::Partitioning);
        let downstream = writers.is_open(Stage::Downstream);
        if partitioning || downstream {
            for leaf in partitioning_leaves(dims, &self.weight_sets) {
                summary.leaves += 1;
                if let Some(prune) = Prune::first_match(&leaf, &self.config.defaults) {
                    *summary.pruned.entry(prune.name()).or_default() += 1;
                    continue;
                }
                if partitioning {
                    let outcome = build_partitioning(&ctx, &leaf)?;
                    Self::handle(Stage::Partitioning, outcome, writers, &mut summary)?;
                }
                if downstream {
                    let outcome = build_downstream(&ctx, &leaf)?;
                    Self::handle(Stage::Downstream, outcome, writers, &mut summary)?;
                }
            }
        }
        Ok(summary)
    }

    fn handle(
        stage: Stage,
        outcome: Outcome,
        writers: &mut StageWriters,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let entry = summary.stages.entry(stage).or_default();
        match outcome {
            Outcome::Emitted(record) => {
                writers.append(stage, &record)?;
                entry.emitted += 1;
            }
            Outcome::Skipped(reason) => {
                debug!(stage = %stage, reason = %reason, "combination skipped");
                *entry.skipped.entry(reason.key()).or_default() += 1;
            }
        }
        Ok(())
    }
}
