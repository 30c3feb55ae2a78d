use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::{check_path_length, MetaPathConfig};
use crate::error::{MetaPathError, Result};
use crate::graph::{GraphProvider, NodeId};
use crate::labels::{LabelIndex, LabelMapping};
use crate::metapath::MetaPath;
use crate::sync::{panic_message, Semaphore};

/// Every meta-path found by full enumeration with its occurrence count.
///
/// The count of a path is the sum of per-node multiplicities at its end
/// position: a node reached by k partial walks contributes k.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathCounts {
    counts: HashMap<MetaPath, u64>,
}

impl PathCounts {
    pub fn get(&self, path: &MetaPath) -> Option<u64> {
        self.counts.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetaPath, u64)> {
        self.counts.iter().map(|(p, &c)| (p, c))
    }

    /// Entries ordered by path tokens.
    pub fn sorted(&self) -> Vec<(&MetaPath, u64)> {
        let mut rows: Vec<_> = self.iter().collect();
        rows.sort_by(|a, b| a.0.cmp(b.0));
        rows
    }

    /// `path\tcount` lines using the dense diagnostic rendering.
    pub fn to_lines(&self) -> Vec<String> {
        self.sorted()
            .into_iter()
            .map(|(p, c)| format!("{}\t{}", p, c))
            .collect()
    }
}

/// Nodes occupying the end of a partial meta-path, with multiplicities.
struct Frontier {
    path: MetaPath,
    nodes: HashMap<NodeId, u64>,
    remaining: usize,
}

impl Frontier {
    fn total_count(&self) -> u64 {
        self.nodes.values().fold(0u64, |acc, &c| acc.saturating_add(c))
    }
}

/// Enumerates every meta-path of at most `path_length` node labels across
/// the whole graph.
///
/// One worker per start node label. Workers share only the result table.
pub struct FullEnumeration<'g, G: ?Sized, W> {
    graph: &'g G,
    labels: &'g LabelMapping,
    path_length: usize,
    workers: usize,
    out: W,
}

impl<'g, G: GraphProvider + ?Sized> FullEnumeration<'g, G, BufWriter<File>> {
    /// Open `config.full_output` for writing. Fails before any work starts if
    /// the file cannot be created.
    pub fn create(graph: &'g G, labels: &'g LabelMapping, config: &MetaPathConfig) -> Result<Self> {
        config.validate()?;
        let file = File::create(&config.full_output)?;
        Ok(Self::new(graph, labels, config.path_length, BufWriter::new(file))?
            .with_workers(config.workers()))
    }
}

impl<'g, G: GraphProvider + ?Sized, W: Write> FullEnumeration<'g, G, W> {
    pub fn new(graph: &'g G, labels: &'g LabelMapping, path_length: usize, out: W) -> Result<Self> {
        check_path_length(path_length)?;
        Ok(Self {
            graph,
            labels,
            path_length,
            workers: crate::config::available_parallelism(),
            out,
        })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Run the enumeration, write `<rendered path>:<count>` lines, and return
    /// the table.
    pub fn compute(&mut self) -> Result<PathCounts> {
        let start = Instant::now();
        info!(path_length = self.path_length, "started full meta-path enumeration");

        let roots = self.root_frontiers()?;
        let table: Mutex<HashMap<MetaPath, u64>> = Mutex::new(HashMap::new());
        let semaphore = Semaphore::new(self.workers);
        let graph = self.graph;
        let labels = self.labels;

        let mut first_error: Option<MetaPathError> = None;
        thread::scope(|s| {
            let mut handles = Vec::with_capacity(roots.len());
            for root in roots {
                let permit = semaphore.acquire();
                let label = root.path.first_node();
                let table = &table;
                let handle = s.spawn(move || {
                    let _permit = permit;
                    enumerate_from(graph, labels, root, table)
                });
                handles.push((label, handle));
            }

            for (label, handle) in handles {
                let outcome = match handle.join() {
                    Ok(result) => result,
                    Err(payload) => Err(MetaPathError::Worker {
                        unit: format!("node label index {}", label),
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

        let counts = PathCounts {
            counts: table.into_inner(),
        };
        for (path, count) in counts.sorted() {
            writeln!(self.out, "{}:{}", path.render(self.labels)?, count)?;
        }
        self.out.flush()?;

        info!(
            paths = counts.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "finished full meta-path enumeration"
        );
        Ok(counts)
    }

    pub fn into_writer(self) -> W {
        self.out
    }

    /// One frontier per node label, holding every node with that label at
    /// multiplicity 1.
    fn root_frontiers(&self) -> Result<Vec<Frontier>> {
        let mut by_label: BTreeMap<LabelIndex, HashMap<NodeId, u64>> = BTreeMap::new();
        for node in self.graph.node_ids() {
            let idx = self.labels.node_index_of(self.graph, node)?;
            by_label.entry(idx).or_default().insert(node, 1);
        }
        Ok(by_label
            .into_iter()
            .map(|(idx, nodes)| Frontier {
                path: MetaPath::new(idx),
                nodes,
                remaining: self.path_length - 1,
            })
            .collect())
    }
}

/// Breadth-first over frontiers, so a worker emits paths in increasing length.
fn enumerate_from<G: GraphProvider + ?Sized>(
    graph: &G,
    labels: &LabelMapping,
    root: Frontier,
    table: &Mutex<HashMap<MetaPath, u64>>,
) -> Result<()> {
    let mut queue = VecDeque::new();
    queue.push_back(root);
    let mut recorded = 0usize;

    while let Some(frontier) = queue.pop_front() {
        table.lock().insert(frontier.path.clone(), frontier.total_count());
        recorded += 1;

        if frontier.remaining == 0 {
            continue;
        }
        queue.extend(expand(graph, labels, &frontier)?);
    }

    debug!(recorded, "full enumeration worker done");
    Ok(())
}

/// Bucket every neighbor of the frontier by (edge label, node label),
/// accumulating the multiplicity of the node it was reached from.
fn expand<G: GraphProvider + ?Sized>(
    graph: &G,
    labels: &LabelMapping,
    frontier: &Frontier,
) -> Result<Vec<Frontier>> {
    let mut buckets: BTreeMap<(LabelIndex, LabelIndex), HashMap<NodeId, u64>> = BTreeMap::new();

    for (&node, &count) in &frontier.nodes {
        for (neighbor, edge_label) in graph.adjacent_edges(node) {
            let edge_label = edge_label.ok_or(MetaPathError::Lookup {
                kind: "edge label from node",
                id: node,
            })?;
            let key = (
                labels.edge_index(edge_label)?,
                labels.node_index_of(graph, neighbor)?,
            );
            let slot = buckets.entry(key).or_default().entry(neighbor).or_insert(0);
            *slot = slot.saturating_add(count);
        }
    }

    Ok(buckets
        .into_iter()
        .map(|((edge, node), nodes)| Frontier {
            path: frontier.path.extend(edge, node),
            nodes,
            remaining: frontier.remaining - 1,
        })
        .collect())
}
