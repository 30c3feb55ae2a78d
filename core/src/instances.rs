use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::{check_path_length, MetaPathConfig};
use crate::error::{MetaPathError, Result};
use crate::graph::{GraphProvider, NodeId};
use crate::index::{HighDegreeIndex, IndexedSuffix};
use crate::labels::{LabelIndex, LabelMapping};
use crate::metapath::MetaPath;
use crate::sync::panic_message;

pub const MIN_WEIGHT: u32 = 1;
pub const MAX_WEIGHT: u32 = 10;

/// Distinct meta-paths connecting a start node to an end node.
#[derive(Debug, Clone, Default)]
pub struct InstanceResult {
    paths: HashSet<MetaPath>,
    pub elapsed: Duration,
}

impl InstanceResult {
    pub fn contains(&self, path: &MetaPath) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn as_set(&self) -> &HashSet<MetaPath> {
        &self.paths
    }

    /// Paths in token order.
    pub fn sorted(&self) -> Vec<&MetaPath> {
        let mut paths: Vec<&MetaPath> = self.paths.iter().collect();
        paths.sort();
        paths
    }

    /// Found paths, each with the default weight, for review and ranking.
    pub fn into_scored(self) -> ScoredPaths {
        let mut paths: Vec<MetaPath> = self.paths.into_iter().collect();
        paths.sort();
        let weights = vec![MIN_WEIGHT; paths.len()];
        ScoredPaths { paths, weights }
    }
}

/// Check that a weight lies in `[MIN_WEIGHT, MAX_WEIGHT]`.
pub fn validate_weight(weight: u32) -> Result<u32> {
    if (MIN_WEIGHT..=MAX_WEIGHT).contains(&weight) {
        Ok(weight)
    } else {
        Err(MetaPathError::Validation(weight))
    }
}

/// Found meta-paths with a user-assigned weight each.
#[derive(Debug, Clone)]
pub struct ScoredPaths {
    paths: Vec<MetaPath>,
    weights: Vec<u32>,
}

impl ScoredPaths {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn path(&self, index: usize) -> Option<&MetaPath> {
        self.paths.get(index)
    }

    pub fn weight(&self, index: usize) -> Option<u32> {
        self.weights.get(index).copied()
    }

    pub fn set_weight(&mut self, index: usize, weight: u32) -> Result<()> {
        let weight = validate_weight(weight)?;
        let slot = self.weights.get_mut(index).ok_or(MetaPathError::Lookup {
            kind: "path index",
            id: index as u64,
        })?;
        *slot = weight;
        Ok(())
    }

    /// Heaviest first; equal weights in path order.
    pub fn ranked(&self) -> Vec<(&MetaPath, u32)> {
        let mut rows: Vec<(&MetaPath, u32)> =
            self.paths.iter().zip(self.weights.iter().copied()).collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        rows
    }
}

/// In-flight search state: a path prefix, the nodes at its end, and the
/// number of hops still allowed.
struct SearchState {
    path: MetaPath,
    frontier: HashSet<NodeId>,
    remaining: usize,
}

/// Duplicate filter and output stream, guarded together so that
/// test-insert-log is one critical section.
struct Discovered<W> {
    seen: HashSet<MetaPath>,
    out: W,
}

/// Finds every distinct meta-path of at most `path_length` node labels that
/// connects some start node to some end node.
///
/// Whenever the walk reaches a node in the high-degree index, its
/// precomputed suffixes are spliced in instead of walking through it. The
/// index must have been built with a path length at least as large as the
/// search's; a node missing from the index is walked normally.
pub struct InstanceSearch<'g, G: ?Sized, W> {
    graph: &'g G,
    labels: &'g LabelMapping,
    index: &'g HighDegreeIndex,
    path_length: usize,
    progress_every: usize,
    shared: Mutex<Discovered<W>>,
}

impl<'g, G: GraphProvider + ?Sized> InstanceSearch<'g, G, BufWriter<File>> {
    /// Open `config.instances_output` for writing.
    pub fn create(
        graph: &'g G,
        labels: &'g LabelMapping,
        index: &'g HighDegreeIndex,
        config: &MetaPathConfig,
    ) -> Result<Self> {
        config.validate()?;
        let file = File::create(&config.instances_output)?;
        Self::new(graph, labels, index, config.path_length, BufWriter::new(file))
    }
}

impl<'g, G: GraphProvider + ?Sized, W: Write + Send> InstanceSearch<'g, G, W> {
    pub fn new(
        graph: &'g G,
        labels: &'g LabelMapping,
        index: &'g HighDegreeIndex,
        path_length: usize,
        out: W,
    ) -> Result<Self> {
        check_path_length(path_length)?;
        // Rough upper bound on the number of paths, for progress logging.
        let estimated = (labels.nodes.len() as f64).powi(path_length as i32 + 1);
        Ok(Self {
            graph,
            labels,
            index,
            path_length,
            progress_every: ((estimated / 50.0) as usize).max(1),
            shared: Mutex::new(Discovered {
                seen: HashSet::new(),
                out,
            }),
        })
    }

    /// Search from `start` to `end`. Each found path is written once, on
    /// first discovery.
    pub fn compute(&mut self, start: &[NodeId], end: &[NodeId]) -> Result<InstanceResult> {
        let started = Instant::now();
        self.shared.get_mut().seen.clear();

        let mut classes: BTreeMap<LabelIndex, HashSet<NodeId>> = BTreeMap::new();
        for &node in start {
            let idx = self.labels.node_index_of(self.graph, node)?;
            classes.entry(idx).or_default().insert(node);
        }
        let mut targets: HashSet<NodeId> = HashSet::with_capacity(end.len());
        for &node in end {
            self.labels.node_index_of(self.graph, node)?;
            targets.insert(node);
        }

        info!(
            path_length = self.path_length,
            start_nodes = start.len(),
            end_nodes = targets.len(),
            label_classes = classes.len(),
            indexed_nodes = self.index.len(),
            "started instance meta-path search"
        );

        let this = &*self;
        let targets = &targets;
        let mut first_error: Option<MetaPathError> = None;
        thread::scope(|s| {
            let handles: Vec<_> = classes
                .into_iter()
                .map(|(label, nodes)| {
                    let handle = s.spawn(move || this.search_from(label, nodes, targets));
                    (label, handle)
                })
                .collect();

            for (label, handle) in handles {
                let outcome = match handle.join() {
                    Ok(result) => result,
                    Err(payload) => Err(MetaPathError::Worker {
                        unit: format!("start label index {}", label),
                        reason: panic_message(&*payload),
                    }),
                };
                if let Err(e) = outcome {
                    first_error.get_or_insert(e);
                }
            }
        });
        if let Some(e) = first_error {
            return Err(e);
        }

        let shared = self.shared.get_mut();
        shared.out.flush()?;
        let result = InstanceResult {
            paths: std::mem::take(&mut shared.seen),
            elapsed: started.elapsed(),
        };
        info!(
            paths = result.len(),
            elapsed_ms = result.elapsed.as_secs_f64() * 1000.0,
            "finished instance meta-path search"
        );
        Ok(result)
    }

    pub fn into_writer(self) -> W {
        self.shared.into_inner().out
    }

    /// Depth-first search for one start label class, on an explicit stack.
    fn search_from(
        &self,
        label: LabelIndex,
        starts: HashSet<NodeId>,
        targets: &HashSet<NodeId>,
    ) -> Result<()> {
        let root = MetaPath::new(label);
        if starts.iter().any(|n| targets.contains(n)) {
            self.record(&root)?;
        }

        let mut stack = vec![SearchState {
            path: root,
            frontier: starts,
            remaining: self.path_length - 1,
        }];

        while let Some(state) = stack.pop() {
            if state.remaining == 0 {
                continue;
            }
            let budget = state.remaining - 1;

            let mut buckets: BTreeMap<(LabelIndex, LabelIndex), HashSet<NodeId>> = BTreeMap::new();
            let mut spliced: HashSet<(NodeId, LabelIndex)> = HashSet::new();

            for &node in &state.frontier {
                for (neighbor, edge_label) in self.graph.adjacent_edges(node) {
                    let edge_label = edge_label.ok_or(MetaPathError::Lookup {
                        kind: "edge label from node",
                        id: node,
                    })?;
                    let edge = self.labels.edge_index(edge_label)?;
                    let next = self.labels.node_index_of(self.graph, neighbor)?;

                    match self.index.get(neighbor) {
                        Some(suffixes) => {
                            if spliced.insert((neighbor, edge)) {
                                let via = state.path.extend(edge, next);
                                self.shortcut(&via, suffixes, budget, targets)?;
                            }
                        }
                        None => {
                            buckets.entry((edge, next)).or_default().insert(neighbor);
                        }
                    }
                }
            }

            for ((edge, next), reached) in buckets {
                let path = state.path.extend(edge, next);
                if reached.iter().any(|n| targets.contains(n)) {
                    self.record(&path)?;
                }
                if budget > 0 {
                    stack.push(SearchState {
                        path,
                        frontier: reached,
                        remaining: budget,
                    });
                }
            }
        }
        Ok(())
    }

    /// Splice every indexed suffix that fits the budget and ends at a target.
    fn shortcut(
        &self,
        via: &MetaPath,
        suffixes: &[IndexedSuffix],
        budget: usize,
        targets: &HashSet<NodeId>,
    ) -> Result<()> {
        for suffix in suffixes {
            if suffix.hops() > budget {
                continue;
            }
            if suffix.ends.iter().any(|n| targets.contains(n)) {
                self.record(&via.splice(&suffix.tokens)?)?;
            }
        }
        Ok(())
    }

    /// Insert `path` and log it if it was not seen before.
    fn record(&self, path: &MetaPath) -> Result<()> {
        let mut shared = self.shared.lock();
        if shared.seen.contains(path) {
            return Ok(());
        }
        let line = path.render(self.labels)?;
        writeln!(shared.out, "{}", line)?;
        shared.seen.insert(path.clone());

        let found = shared.seen.len();
        if found % self.progress_every == 0 {
            debug!(found, "instance search progress");
        }
        Ok(())
    }
}
