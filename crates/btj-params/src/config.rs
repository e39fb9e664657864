use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ParamsError, Result};
use crate::weights::canonicalize_weight_sets;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    PartitionMatrix,
    Rearrangement,
    Partitioning,
    Downstream,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::PartitionMatrix,
        Stage::Rearrangement,
        Stage::Partitioning,
        Stage::Downstream,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::PartitionMatrix => "partition_matrix",
            Stage::Rearrangement => "rearrangement",
            Stage::Partitioning => "partitioning",
            Stage::Downstream => "downstream",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Stage::PartitionMatrix => "realPartitionMatrix.txt",
            Stage::Rearrangement => "rearrangements.txt",
            Stage::Partitioning => "partitioning.txt",
            Stage::Downstream => "mBucketI.txt",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchPolicy {
    BinarySearch,
    RangeSearch,
}

impl SearchPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchPolicy::BinarySearch => "BINARY_SEARCH",
            SearchPolicy::RangeSearch => "RANGE_SEARCH",
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self, SearchPolicy::RangeSearch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NumPartitionsMode {
    Actual,
    LikeDefault,
}

impl NumPartitionsMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NumPartitionsMode::Actual => "actual",
            NumPartitionsMode::LikeDefault => "likeDefault",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum RearrangementPolicy {
    Identity,
    Single(String),
    Radius(String),
    Permutation(String),
}

impl RearrangementPolicy {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "none" => Ok(Self::Identity),
            "BEA" => Ok(Self::Single(name.to_string())),
            "BEARadius" => Ok(Self::Radius(name.to_string())),
            n if n.starts_with("TSP") => Ok(Self::Permutation(n.to_string())),
            other => Err(ParamsError::Config(format!(
                "unknown rearrangement policy '{}'",
                other
            ))),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Identity => "none",
            Self::Single(n) | Self::Radius(n) | Self::Permutation(n) => n,
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }
}

impl TryFrom<String> for RearrangementPolicy {
    type Error = ParamsError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl fmt::Display for RearrangementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Partitioning policies whose names start with this prefix size partitions
/// by input only, so alternative binary-search sub-policies add nothing.
pub const INPUT_SIZE_POLICY_PREFIX: &str = "MBI";

pub fn is_input_size_policy(partitioning_policy: &str) -> bool {
    partitioning_policy.starts_with(INPUT_SIZE_POLICY_PREFIX)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetConfig {
    pub root: PathBuf,
    pub name: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("datasets"),
            name: "solarAltitude_1m".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub parameters_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            parameters_dir: PathBuf::from("parameters"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageToggles {
    pub partition_matrix: bool,
    pub rearrangement: bool,
    pub partitioning: bool,
    pub downstream: bool,
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            partition_matrix: true,
            rearrangement: true,
            partitioning: true,
            downstream: false,
        }
    }
}

impl StageToggles {
    pub fn is_enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::PartitionMatrix => self.partition_matrix,
            Stage::Rearrangement => self.rearrangement,
            Stage::Partitioning => self.partitioning,
            Stage::Downstream => self.downstream,
        }
    }

    pub fn set(&mut self, stage: Stage, enabled: bool) {
        match stage {
            Stage::PartitionMatrix => self.partition_matrix = enabled,
            Stage::Rearrangement => self.rearrangement = enabled,
            Stage::Partitioning => self.partitioning = enabled,
            Stage::Downstream => self.downstream = enabled,
        }
    }

    pub fn enabled(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|s| self.is_enabled(*s))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Dimensions {
    pub num_partitions_modes: Vec<NumPartitionsMode>,
    pub search_policies: Vec<SearchPolicy>,
    pub buckets: Vec<u32>,
    pub sparsities: Vec<u32>,
    pub bands: Vec<u32>,
    pub bands_offset_seeds: Vec<u32>,
    pub rearrangement_policies: Vec<RearrangementPolicy>,
    pub partitioning_policies: Vec<String>,
    pub num_partitions: Vec<u32>,
    pub range_search_weights: Vec<String>,
    pub binary_search_policies: Vec<String>,
}

impl Default for Dimensions {
    fn default() -> Self {
        Self {
            num_partitions_modes: vec![NumPartitionsMode::Actual],
            search_policies: vec![SearchPolicy::RangeSearch],
            buckets: vec![100],
            sparsities: vec![1],
            bands: (1..=6).collect(),
            bands_offset_seeds: (0..=9).collect(),
            rearrangement_policies: vec![
                RearrangementPolicy::Identity,
                RearrangementPolicy::Permutation("TSPk".to_string()),
            ],
            partitioning_policies: vec!["MBI".to_string(), "AICPM".to_string()],
            num_partitions: vec![10, 20, 40, 80],
            range_search_weights: [
                "BJrepIC_1.0-BJmaxIC_0.0-BJmaxCC_0.0",
                "BJrepIC_0.0-BJmaxIC_1.0-BJmaxCC_0.0",
                "BJrepIC_0.0-BJmaxIC_0.0-BJmaxCC_1.0",
                "BJrepIC_0.5-BJmaxIC_0.0-BJmaxCC_0.5",
                "BJrepIC_0.33-BJmaxIC_0.33-BJmaxCC_0.33",
                "BJrepIC_0.25-BJmaxIC_0.25-BJmaxCC_0.5",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            binary_search_policies: vec![
                "MAX_PARTITION_INPUT".to_string(),
                "MAX_PARTITION_CANDIDATE_CELLS".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Defaults {
    pub partitioning_policy: String,
    pub search_policy: SearchPolicy,
    pub binary_search_policy: String,
    pub num_partitions_mode: NumPartitionsMode,
    pub range_search_upper_bound_granularity: String,
    pub bea_radius: u32,
    pub tspk_path: String,
    pub job_max_execution_hours: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            partitioning_policy: "MBI".to_string(),
            search_policy: SearchPolicy::BinarySearch,
            binary_search_policy: "MAX_PARTITION_INPUT".to_string(),
            num_partitions_mode: NumPartitionsMode::Actual,
            range_search_upper_bound_granularity: "2.0_11".to_string(),
            bea_radius: 3,
            tspk_path: "btj/tspk".to_string(),
            job_max_execution_hours: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    pub dataset: DatasetConfig,
    pub output: OutputConfig,
    pub stages: StageToggles,
    pub dimensions: Dimensions,
    pub defaults: Defaults,
}

impl GeneratorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| ParamsError::io(path, e))?;
        Self::from_yaml_str(&raw, path)
    }

    /// `origin` only labels parse errors.
    pub fn from_yaml_str(raw: &str, origin: &Path) -> Result<Self> {
        let config: GeneratorConfig =
            serde_yaml::from_str(raw).map_err(|source| ParamsError::Yaml {
                path: origin.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dataset.name.trim().is_empty() {
            return Err(ParamsError::Config("dataset.name must not be empty".into()));
        }
        let dims = &self.dimensions;
        let numeric = [
            ("buckets", &dims.buckets),
            ("num_partitions", &dims.num_partitions),
        ];
        for (name, values) in numeric {
            if values.contains(&0) {
                return Err(ParamsError::Config(format!(
                    "dimensions.{} must only hold positive values",
                    name
                )));
            }
        }
        if dims.search_policies.iter().any(|s| s.is_range()) {
            if dims.range_search_weights.is_empty() {
                return Err(ParamsError::Config(
                    "RANGE_SEARCH needs at least one entry in dimensions.range_search_weights"
                        .into(),
                ));
            }
            if self
                .defaults
                .range_search_upper_bound_granularity
                .trim()
                .is_empty()
            {
                return Err(ParamsError::Config(
                    "RANGE_SEARCH needs defaults.range_search_upper_bound_granularity".into(),
                ));
            }
        }
        if self.defaults.search_policy.is_range() {
            return Err(ParamsError::Config(
                "defaults.search_policy must be BINARY_SEARCH".into(),
            ));
        }
        self.canonical_weight_sets()?;
        Ok(())
    }

    pub fn canonical_weight_sets(&self) -> Result<Vec<String>> {
        canonicalize_weight_sets(&self.dimensions.range_search_weights)
    }

    pub fn dataset_directory(&self) -> PathBuf {
        self.dataset.root.join(&self.dataset.name)
    }

    pub fn parameters_directory(&self) -> PathBuf {
        self.output.parameters_dir.join(&self.dataset.name)
    }
}
