use std::fs::File;
use std::io::BufReader;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MetaPathError, Result};
use crate::graph::TraversalDirection;

/// Longest meta-path (in node tokens) any engine will accept.
pub const MAX_PATH_LENGTH: usize = 64;

/// Settings for one meta-path computation.
///
/// Every field has a default, so a config file only needs to name what it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaPathConfig {
    /// Maximum number of node labels in a meta-path (hops + 1).
    pub path_length: usize,
    /// Fraction of nodes, by descending degree, treated as high-degree.
    pub high_degree_ratio: f64,
    pub direction: TraversalDirection,
    /// Upper bound on concurrently running workers. None = available parallelism.
    pub worker_limit: Option<usize>,
    pub full_output: PathBuf,
    pub high_degree_output: PathBuf,
    pub instances_output: PathBuf,
}

impl Default for MetaPathConfig {
    fn default() -> Self {
        Self {
            path_length: 5,
            high_degree_ratio: 0.01,
            direction: TraversalDirection::Both,
            worker_limit: None,
            full_output: PathBuf::from("Precomputed_MetaPaths.txt"),
            high_degree_output: PathBuf::from("Precomputed_MetaPaths_HighDegree.txt"),
            instances_output: PathBuf::from("Precomputed_MetaPaths_Instances.txt"),
        }
    }
}

impl MetaPathConfig {
    /// Load from a JSON file and validate.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let config: MetaPathConfig =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| {
                MetaPathError::Configuration(format!("{}: {}", path.as_ref().display(), e))
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_path_length(self.path_length)?;
        if !(self.high_degree_ratio > 0.0 && self.high_degree_ratio <= 1.0) {
            return Err(MetaPathError::Configuration(format!(
                "high_degree_ratio must be in (0, 1], got {}",
                self.high_degree_ratio
            )));
        }
        if self.worker_limit == Some(0) {
            return Err(MetaPathError::Configuration(
                "worker_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Effective worker bound.
    pub fn workers(&self) -> usize {
        self.worker_limit.unwrap_or_else(available_parallelism)
    }
}

pub(crate) fn check_path_length(path_length: usize) -> Result<()> {
    if path_length == 0 || path_length > MAX_PATH_LENGTH {
        return Err(MetaPathError::Configuration(format!(
            "path_length must be in [1, {}], got {}",
            MAX_PATH_LENGTH, path_length
        )));
    }
    Ok(())
}

pub fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
