use std::io;

use thiserror::Error;

use crate::graph::{Label, NodeId};

pub type Result<T> = std::result::Result<T, MetaPathError>;

#[derive(Debug, Error)]
pub enum MetaPathError {
    /// Invalid length bound, ratio, worker limit or label universe.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A label, node or dense index referenced but never registered.
    #[error("{kind} {id} is not registered")]
    Lookup { kind: &'static str, id: u64 },
    #[error("invalid weight {0}: must be in [1, 10]")]
    Validation(u32),
    /// A single worker failed or panicked.
    #[error("worker for {unit} failed: {reason}")]
    Worker { unit: String, reason: String },
    #[error("malformed index line {line}: {reason}")]
    IndexFormat { line: usize, reason: String },
}

impl MetaPathError {
    pub(crate) fn unknown_node(node: NodeId) -> Self {
        MetaPathError::Lookup { kind: "node", id: node }
    }

    pub(crate) fn unknown_label(kind: &'static str, label: Label) -> Self {
        MetaPathError::Lookup {
            kind,
            id: u64::from(label),
        }
    }
}
