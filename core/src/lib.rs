//! metapath-core: meta-path enumeration over labeled graphs.
//!
//! A meta-path is the alternating sequence of node and edge labels seen
//! along a walk. This crate provides three engines over any
//! [`GraphProvider`]:
//!
//! - [`FullEnumeration`] counts every meta-path up to a length bound.
//! - [`HighDegreePrecompute`] writes per-node suffix records for the densest
//!   nodes, loaded back as a [`HighDegreeIndex`].
//! - [`InstanceSearch`] finds the meta-paths linking a start set to an end
//!   set, splicing indexed suffixes instead of walking through dense nodes.
//!
//! Graph storage is pluggable; [`Graph`] is the in-memory provider used by
//! the benchmark and the tests.

mod config;
mod enumerate;
mod error;
mod graph;
mod index;
mod instances;
mod labels;
mod metapath;
mod precompute;
mod sync;

#[cfg(test)]
mod fixtures;

pub use config::{available_parallelism, MetaPathConfig, MAX_PATH_LENGTH};
pub use enumerate::{FullEnumeration, PathCounts};
pub use error::{MetaPathError, Result};
pub use graph::{
    select_high_degree_nodes, Edge, EdgeRecord, Graph, GraphProvider, Label, NodeId, NodeInfo,
    TraversalDirection,
};
pub use index::{HighDegreeIndex, IndexedSuffix};
pub use instances::{
    validate_weight, InstanceResult, InstanceSearch, ScoredPaths, MAX_WEIGHT, MIN_WEIGHT,
};
pub use labels::{LabelDictionary, LabelIndex, LabelMapping};
pub use metapath::MetaPath;
pub use precompute::{HighDegreePrecompute, PrecomputeReport};
pub use sync::{Semaphore, SemaphorePermit};
