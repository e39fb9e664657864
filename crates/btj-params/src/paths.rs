//! Directory naming for the artifact tree.
//!
//! Every stage writes its artifacts under a directory whose name encodes the
//! choices of all ancestor stages:
//!
//! ```text
//! <dataset>/<buckets>/<sparsity>_<bands>_<seed>                      partition matrix
//!     [/<policy> | /<policy>_<radius> | /<policy>_<numPartitions>]   rearrangement
//!     /<partitioning>_<numPartitions>_<mode>/<search>-<sub>[-<gran>] partitioning
//! ```
//!
//! [`StageDir::path`] is the only place these rules are spelled out.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use crate::config::{Defaults, NumPartitionsMode, RearrangementPolicy, SearchPolicy, Stage};
use crate::error::{ParamsError, Result};

pub const PARTITIONS_COST_FILE: &str = "partitionsInputCost.csv";
pub const REARRANGEMENTS_FILE: &str = "rearrangements.csv";
pub const PROPERTIES_FILE: &str = "properties.csv";
pub const HISTOGRAM_MAPPING_FILE: &str = "histogramIndexToPartitionsMapping.csv";
pub const PARTITION_CELLS_FILE: &str = "partitionToCellsMapping.csv";
pub const JOIN_DIR: &str = "MBucketI";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatrixCoords {
    pub buckets: u32,
    pub sparsity: u32,
    pub bands: u32,
    pub bands_offset_seed: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arrangement {
    Identity,
    Single { policy: String },
    Radius { policy: String, radius: u32 },
    Permutation { policy: String, num_partitions: u32 },
}

impl Arrangement {
    pub fn new(policy: &RearrangementPolicy, radius: u32, num_partitions: u32) -> Self {
        match policy {
            RearrangementPolicy::Identity => Arrangement::Identity,
            RearrangementPolicy::Single(p) => Arrangement::Single { policy: p.clone() },
            RearrangementPolicy::Radius(p) => Arrangement::Radius {
                policy: p.clone(),
                radius,
            },
            RearrangementPolicy::Permutation(p) => Arrangement::Permutation {
                policy: p.clone(),
                num_partitions,
            },
        }
    }

    fn segment(&self) -> Option<String> {
        match self {
            Arrangement::Identity => None,
            Arrangement::Single { policy } => Some(policy.clone()),
            Arrangement::Radius { policy, radius } => Some(format!("{}_{}", policy, radius)),
            Arrangement::Permutation {
                policy,
                num_partitions,
            } => Some(format!("{}_{}", policy, num_partitions)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitioningCoords {
    pub partitioning_policy: String,
    pub num_partitions: u32,
    pub mode: NumPartitionsMode,
    pub search_policy: SearchPolicy,
    pub binary_search_policy: String,
    pub granularity: Option<String>,
}

impl PartitioningCoords {
    pub fn new(
        partitioning_policy: &str,
        num_partitions: u32,
        mode: NumPartitionsMode,
        search_policy: SearchPolicy,
        binary_search_policy: &str,
        granularity: &str,
    ) -> Self {
        Self {
            partitioning_policy: partitioning_policy.to_string(),
            num_partitions,
            mode,
            search_policy,
            binary_search_policy: binary_search_policy.to_string(),
            granularity: search_policy.is_range().then(|| granularity.to_string()),
        }
    }

    pub fn baseline(defaults: &Defaults, num_partitions: u32) -> Self {
        Self::new(
            &defaults.partitioning_policy,
            num_partitions,
            defaults.num_partitions_mode,
            defaults.search_policy,
            &defaults.binary_search_policy,
            "",
        )
    }

    pub fn binary_reference(&self, defaults: &Defaults, num_partitions: u32) -> Self {
        Self::new(
            &self.partitioning_policy,
            num_partitions,
            defaults.num_partitions_mode,
            defaults.search_policy,
            &self.binary_search_policy,
            "",
        )
    }

    fn segments(&self) -> [String; 2] {
        let mut search = format!(
            "{}-{}",
            self.search_policy.as_str(),
            self.binary_search_policy
        );
        if let Some(granularity) = &self.granularity {
            search.push('-');
            search.push_str(granularity);
        }
        [
            format!(
                "{}_{}_{}",
                self.partitioning_policy,
                self.num_partitions,
                self.mode.as_str()
            ),
            search,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageDir {
    Histograms {
        buckets: u32,
    },
    PartitionMatrix(MatrixCoords),
    Rearranged(MatrixCoords, Arrangement),
    Partitioning(MatrixCoords, Arrangement, PartitioningCoords),
}

impl StageDir {
    pub fn stage(&self) -> Stage {
        match self {
            StageDir::Histograms { .. }
            | StageDir::PartitionMatrix(_)
            | StageDir::Rearranged(_, Arrangement::Identity) => Stage::PartitionMatrix,
            StageDir::Rearranged(..) => Stage::Rearrangement,
            StageDir::Partitioning(..) => Stage::Partitioning,
        }
    }

    pub fn path(&self, dataset_dir: &Path) -> PathBuf {
        match self {
            StageDir::Histograms { buckets } => dataset_dir.join(buckets.to_string()),
            StageDir::PartitionMatrix(m) => StageDir::Histograms { buckets: m.buckets }
                .path(dataset_dir)
                .join(format!("{}_{}_{}", m.sparsity, m.bands, m.bands_offset_seed)),
            StageDir::Rearranged(m, arrangement) => {
                let matrix = StageDir::PartitionMatrix(*m).path(dataset_dir);
                match arrangement.segment() {
                    Some(segment) => matrix.join(segment),
                    None => matrix,
                }
            }
            StageDir::Partitioning(m, arrangement, p) => {
                let [run, search] = p.segments();
                StageDir::Rearranged(*m, arrangement.clone())
                    .path(dataset_dir)
                    .join(run)
                    .join(search)
            }
        }
    }
}

pub fn display_path(path: &Path) -> String {
    path.display().to_string()
}

#[derive(Debug, Clone)]
pub struct ArtifactTree {
    base: PathBuf,
}

impl ArtifactTree {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn locate(&self, path: &Path) -> PathBuf {
        self.base.join(path)
    }

    pub fn dir_exists(&self, path: &Path) -> bool {
        self.locate(path).is_dir()
    }

    /// Newline-delimited rows in `dir`'s cost file, or `None` when the file
    /// is absent. Row contents are not decoded.
    pub fn count_cost_rows(&self, dir: &Path) -> Result<Option<usize>> {
        let file_path = self.locate(dir).join(PARTITIONS_COST_FILE);
        let file = match File::open(&file_path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ParamsError::io(file_path, e)),
        };
        let mut rows = 0;
        for row in BufReader::new(file).split(b'\n') {
            row.map_err(|e| ParamsError::io(&file_path, e))?;
            rows += 1;
        }
        Ok(Some(rows))
    }
}
