use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::Stage;
use crate::paths::display_path;

pub const FIELD_SEPARATOR: char = '\t';

/// One line of a parameters file. Keys are unique and always serialized in
/// lexicographic order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterRecord {
    fields: BTreeMap<String, String>,
}

impl ParameterRecord {
    pub fn new(execution_mode: &str) -> Self {
        let mut record = Self::default();
        record.insert("executionMode", execution_mode);
        record
    }

    pub fn insert(&mut self, key: &str, value: impl ToString) {
        self.fields.insert(key.to_string(), value.to_string());
    }

    pub fn insert_path(&mut self, key: &str, path: &Path) {
        self.insert(key, display_path(path));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_line(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(&FIELD_SEPARATOR.to_string())
    }
}

impl fmt::Display for ParameterRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingDependency { stage: Stage, path: PathBuf },
    IdentityRearrangement,
}

impl SkipReason {
    pub fn missing(stage: Stage, path: impl Into<PathBuf>) -> Self {
        SkipReason::MissingDependency {
            stage,
            path: path.into(),
        }
    }

    pub fn key(&self) -> String {
        match self {
            SkipReason::MissingDependency { stage, .. } => format!("missing_{}", stage),
            SkipReason::IdentityRearrangement => "identity_rearrangement".to_string(),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingDependency { stage, path } => {
                write!(f, "missing {} artifact {}", stage, path.display())
            }
            SkipReason::IdentityRearrangement => f.write_str("identity rearrangement"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Emitted(ParameterRecord),
    Skipped(SkipReason),
}

impl Outcome {
    pub fn record(&self) -> Option<&ParameterRecord> {
        match self {
            Outcome::Emitted(record) => Some(record),
            Outcome::Skipped(_) => None,
        }
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            Outcome::Emitted(_) => None,
            Outcome::Skipped(reason) => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_sorted_tab_separated_pairs() {
        let mut record = ParameterRecord::new("partitioning");
        record.insert("numPartitions", 20);
        record.insert("buckets", 100);
        record.insert_path("datasetDirectory", Path::new("datasets/solar"));
        assert_eq!(
            record.to_line(),
            "buckets=100\tdatasetDirectory=datasets/solar\texecutionMode=partitioning\tnumPartitions=20"
        );
        assert_eq!(record.to_string(), record.to_line());
    }

    #[test]
    fn insert_overwrites_existing_key() {
        let mut record = ParameterRecord::new("partitioning");
        record.insert("numPartitions", 20);
        record.insert("numPartitions", 17);
        assert_eq!(record.get("numPartitions"), Some("17"));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn skip_reason_keys_name_the_missing_stage() {
        let reason = SkipReason::missing(Stage::PartitionMatrix, "datasets/x/100/1_1_0");
        assert_eq!(reason.key(), "missing_partition_matrix");
        assert!(reason.to_string().contains("datasets/x/100/1_1_0"));
        assert_eq!(
            SkipReason::IdentityRearrangement.key(),
            "identity_rearrangement"
        );
        let outcome = Outcome::Skipped(reason.clone());
        assert_eq!(outcome.skip_reason(), Some(&reason));
        assert!(outcome.record().is_none());
    }
}
