pub mod builders;
pub mod config;
pub mod enumerate;
pub mod error;
pub mod paths;
pub mod record;
pub mod weights;
pub mod writer;

pub use builders::{
    build_downstream, build_partition_matrix, build_partitioning, build_rearrangement,
    BuildContext,
};
pub use config::{
    GeneratorConfig, NumPartitionsMode, RearrangementPolicy, SearchPolicy, Stage, StageToggles,
};
pub use enumerate::{Generator, PartitioningLeaf, PlanCounts, Prune, RunSummary, StageSummary};
pub use error::{ParamsError, Result};
pub use paths::{ArtifactTree, MatrixCoords, StageDir, PARTITIONS_COST_FILE};
pub use record::{Outcome, ParameterRecord, SkipReason};
pub use weights::{canonicalize_weight_set, canonicalize_weight_sets};
pub use writer::{StageFile, StageWriter, StageWriters};
