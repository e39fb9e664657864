use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors. Missing artifacts are not errors; see [`crate::SkipReason`].
#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("malformed weight set '{raw}': {reason}")]
    MalformedWeightSet { raw: String, reason: String },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl ParamsError {
    pub(crate) fn malformed(raw: &str, reason: impl Into<String>) -> Self {
        Self::MalformedWeightSet {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ParamsError>;
