use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::thread::{self, ScopedJoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::config::{check_path_length, MetaPathConfig};
use crate::error::{MetaPathError, Result};
use crate::graph::{GraphProvider, NodeId};
use crate::index::write_record;
use crate::labels::{LabelIndex, LabelMapping};
use crate::sync::{panic_message, Semaphore};

/// Outcome of a precompute run.
#[derive(Debug, Clone, Default)]
pub struct PrecomputeReport {
    /// Records written to the index output.
    pub written: usize,
    /// Nodes whose worker failed. They have no index entry.
    pub failed: Vec<NodeId>,
    pub elapsed: Duration,
}

/// Suffix tokens reached so far from the indexed node.
struct Pending {
    suffix: Vec<LabelIndex>,
    frontier: HashSet<NodeId>,
    remaining: usize,
}

/// Builds the high-degree index: every meta-path suffix of at most
/// `path_length - 1` hops starting at each selected node, with the nodes it
/// reaches.
///
/// One worker per node, at most `workers` alive at once. Each worker owns its
/// result map until it has written its record, then drops it.
pub struct HighDegreePrecompute<'g, G: ?Sized, W> {
    graph: &'g G,
    labels: &'g LabelMapping,
    path_length: usize,
    workers: usize,
    out: Mutex<W>,
}

impl<'g, G: GraphProvider + ?Sized> HighDegreePrecompute<'g, G, BufWriter<File>> {
    /// Open `config.high_degree_output` for writing.
    pub fn create(graph: &'g G, labels: &'g LabelMapping, config: &MetaPathConfig) -> Result<Self> {
        config.validate()?;
        let file = File::create(&config.high_degree_output)?;
        Ok(Self::new(graph, labels, config.path_length, BufWriter::new(file))?
            .with_workers(config.workers()))
    }
}

impl<'g, G: GraphProvider + ?Sized, W: Write + Send> HighDegreePrecompute<'g, G, W> {
    pub fn new(graph: &'g G, labels: &'g LabelMapping, path_length: usize, out: W) -> Result<Self> {
        check_path_length(path_length)?;
        Ok(Self {
            graph,
            labels,
            path_length,
            workers: crate::config::available_parallelism(),
            out: Mutex::new(out),
        })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Index every node in `nodes`. Worker failures are logged and reported,
    /// never propagated; only a failure to flush the output is an error.
    pub fn compute(&self, nodes: &[NodeId]) -> Result<PrecomputeReport> {
        let start = Instant::now();
        info!(
            path_length = self.path_length,
            nodes = nodes.len(),
            workers = self.workers,
            "started high-degree precompute"
        );

        let semaphore = Semaphore::new(self.workers);
        let mut report = PrecomputeReport::default();
        let mut seen: HashSet<NodeId> = HashSet::with_capacity(nodes.len());

        thread::scope(|s| {
            let mut pending: Vec<(NodeId, ScopedJoinHandle<'_, Result<()>>)> = Vec::new();

            for &node in nodes {
                if !seen.insert(node) {
                    debug!(node, "skipping duplicate high-degree node");
                    continue;
                }
                let permit = semaphore.acquire();

                // Reap finished workers so their threads do not pile up.
                let (done, running): (Vec<_>, Vec<_>) =
                    pending.into_iter().partition(|(_, h)| h.is_finished());
                pending = running;
                for (n, handle) in done {
                    settle(&mut report, n, handle.join());
                }

                let handle = s.spawn(move || {
                    let _permit = permit;
                    self.index_node(node)
                });
                pending.push((node, handle));
            }

            for (n, handle) in pending {
                settle(&mut report, n, handle.join());
            }
        });

        self.out.lock().flush()?;
        report.elapsed = start.elapsed();
        info!(
            written = report.written,
            failed = report.failed.len(),
            elapsed_ms = report.elapsed.as_secs_f64() * 1000.0,
            "finished high-degree precompute"
        );
        Ok(report)
    }

    pub fn into_writer(self) -> W {
        self.out.into_inner()
    }

    fn index_node(&self, node: NodeId) -> Result<()> {
        let suffixes = suffixes_from(self.graph, self.labels, node, self.path_length)?;
        {
            let mut out = self.out.lock();
            write_record(&mut *out, node, &suffixes, self.labels)?;
        }
        debug!(node, paths = suffixes.len(), "indexed high-degree node");
        Ok(())
    }
}

fn settle(report: &mut PrecomputeReport, node: NodeId, joined: thread::Result<Result<()>>) {
    let outcome = match joined {
        Ok(result) => result,
        Err(payload) => Err(MetaPathError::Worker {
            unit: format!("node {}", node),
            reason: panic_message(&*payload),
        }),
    };
    match outcome {
        Ok(()) => report.written += 1,
        Err(e) => {
            error!(node, error = %e, "high-degree worker failed, node left out of index");
            report.failed.push(node);
        }
    }
}

/// Depth-bounded expansion rooted at a single node, driven by an explicit
/// stack. Returns suffix -> reached nodes, including the empty suffix.
pub(crate) fn suffixes_from<G: GraphProvider + ?Sized>(
    graph: &G,
    labels: &LabelMapping,
    node: NodeId,
    path_length: usize,
) -> Result<HashMap<Vec<LabelIndex>, HashSet<NodeId>>> {
    labels.node_index_of(graph, node)?;

    let mut found: HashMap<Vec<LabelIndex>, HashSet<NodeId>> = HashMap::new();
    found.insert(Vec::new(), HashSet::from([node]));

    let mut stack = vec![Pending {
        suffix: Vec::new(),
        frontier: HashSet::from([node]),
        remaining: path_length - 1,
    }];

    while let Some(state) = stack.pop() {
        if state.remaining == 0 {
            continue;
        }

        let mut buckets: BTreeMap<(LabelIndex, LabelIndex), HashSet<NodeId>> = BTreeMap::new();
        for &n in &state.frontier {
            for (neighbor, edge_label) in graph.adjacent_edges(n) {
                let edge_label = edge_label.ok_or(MetaPathError::Lookup {
                    kind: "edge label from node",
                    id: n,
                })?;
                let key = (
                    labels.edge_index(edge_label)?,
                    labels.node_index_of(graph, neighbor)?,
                );
                buckets.entry(key).or_default().insert(neighbor);
            }
        }

        for ((edge, label), reached) in buckets {
            let mut suffix = Vec::with_capacity(state.suffix.len() + 2);
            suffix.extend_from_slice(&state.suffix);
            suffix.push(edge);
            suffix.push(label);

            found
                .entry(suffix.clone())
                .or_default()
                .extend(reached.iter().copied());
            stack.push(Pending {
                suffix,
                frontier: reached,
                remaining: state.remaining - 1,
            });
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::fixtures::{abc, labeled, star, two_triangles};
    use crate::graph::{Graph, Label};
    use crate::index::HighDegreeIndex;

    fn run(graph: &Graph, nodes: &[NodeId], path_length: usize) -> (PrecomputeReport, String) {
        let labels = LabelMapping::from_graph(graph).unwrap();
        let engine = HighDegreePrecompute::new(graph, &labels, path_length, Vec::new())
            .unwrap()
            .with_workers(2);
        let report = engine.compute(nodes).unwrap();
        (report, String::from_utf8(engine.into_writer()).unwrap())
    }

    #[test]
    fn test_isolated_node_emits_self_record() {
        let g = labeled(&[(0, 1), (1, 1), (2, 1)], &[(0, 1, 0)]);
        let (report, text) = run(&g, &[2], 3);
        assert_eq!(report.written, 1);
        assert_eq!(text, "2:=2-\n");
    }

    #[test]
    fn test_star_hub_record() {
        // hub 0 (label 0), leaves 1..=3 (label 1), edge label 0
        let (report, text) = run(&star(0, 3), &[0], 3);
        assert_eq!(report.written, 1);
        assert_eq!(text, "0:=0-0|1=1,2,3-0|1|0|0=0-\n");
    }

    #[test]
    fn test_one_line_per_node() {
        let g = abc();
        let nodes = [6, 7, 0];
        let (report, text) = run(&g, &nodes, 3);
        assert_eq!(report.written, 3);
        assert!(report.failed.is_empty());
        let mut heads: Vec<&str> = text.lines().map(|l| l.split(':').next().unwrap()).collect();
        heads.sort();
        assert_eq!(heads, vec!["0", "6", "7"]);
    }

    #[test]
    fn test_duplicates_are_indexed_once() {
        let (report, text) = run(&abc(), &[6, 6, 6], 2);
        assert_eq!(report.written, 1);
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_suffixes_match_reachability() {
        let g = two_triangles();
        let labels = LabelMapping::from_graph(&g).unwrap();
        let found = suffixes_from(&g, &labels, 2, 3).unwrap();

        // 2 -(bridge 3)-> 6 (label 13)
        let to_bridge = vec![labels.edge_index(3).unwrap(), labels.node_index(13).unwrap()];
        assert_eq!(found[&to_bridge], HashSet::from([6]));
        // 2 -(1)-> {0 (10)} and {1 (11)}
        let to_ten = vec![labels.edge_index(1).unwrap(), labels.node_index(10).unwrap()];
        assert_eq!(found[&to_ten], HashSet::from([0]));
        // at most two hops
        assert!(found.keys().all(|k| k.len() <= 4));
        assert_eq!(found[&Vec::new()], HashSet::from([2]));
    }

    #[test]
    fn test_output_round_trips_through_index() {
        let g = two_triangles();
        let labels = LabelMapping::from_graph(&g).unwrap();
        let (_, text) = run(&g, &[2, 3], 4);
        let index = HighDegreeIndex::parse(text.as_bytes(), &labels).unwrap();
        assert_eq!(index.len(), 2);

        let direct = suffixes_from(&g, &labels, 3, 4).unwrap();
        let loaded = index.get(3).unwrap();
        assert_eq!(loaded.len(), direct.len());
        for suffix in loaded {
            assert_eq!(direct[&suffix.tokens], suffix.ends);
        }
    }

    #[test]
    fn test_unknown_node_is_reported_not_fatal() {
        let (report, text) = run(&abc(), &[0, 404, 1], 2);
        assert_eq!(report.written, 2);
        assert_eq!(report.failed, vec![404]);
        assert_eq!(text.lines().count(), 2);
    }

    /// Delegates to a Graph but panics when asked for `poisoned`'s neighbors.
    struct PanickyGraph {
        inner: Graph,
        poisoned: NodeId,
    }

    impl GraphProvider for PanickyGraph {
        fn node_ids(&self) -> Vec<NodeId> {
            self.inner.node_ids()
        }
        fn label_of(&self, node: NodeId) -> Option<Label> {
            self.inner.label_of(node)
        }
        fn all_node_labels(&self) -> BTreeSet<Label> {
            self.inner.all_node_labels()
        }
        fn all_edge_labels(&self) -> BTreeSet<Label> {
            self.inner.all_edge_labels()
        }
        fn adjacent_nodes(&self, node: NodeId) -> Vec<NodeId> {
            if node == self.poisoned {
                panic!("adjacency unavailable for {}", node);
            }
            self.inner.adjacent_nodes(node)
        }
        fn edge_label(&self, from: NodeId, to: NodeId) -> Option<Label> {
            self.inner.edge_label(from, to)
        }
        fn degree(&self, node: NodeId) -> usize {
            self.inner.degree(node)
        }
    }

    #[test]
    fn test_panicking_worker_does_not_abort_siblings() {
        let g = PanickyGraph {
            inner: abc(),
            poisoned: 7,
        };
        let labels = LabelMapping::from_graph(&g).unwrap();
        let engine = HighDegreePrecompute::new(&g, &labels, 2, Vec::new())
            .unwrap()
            .with_workers(1);
        let report = engine.compute(&[0, 7, 6]).unwrap();
        assert_eq!(report.written, 2);
        assert_eq!(report.failed, vec![7]);

        let text = String::from_utf8(engine.into_writer()).unwrap();
        assert!(text.lines().all(|l| !l.starts_with("7:")));
    }

    /// Delegates to a Graph and records how many adjacency lookups overlap.
    struct OverlapGraph {
        inner: Graph,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl GraphProvider for OverlapGraph {
        fn node_ids(&self) -> Vec<NodeId> {
            self.inner.node_ids()
        }
        fn label_of(&self, node: NodeId) -> Option<Label> {
            self.inner.label_of(node)
        }
        fn all_node_labels(&self) -> BTreeSet<Label> {
            self.inner.all_node_labels()
        }
        fn all_edge_labels(&self) -> BTreeSet<Label> {
            self.inner.all_edge_labels()
        }
        fn adjacent_nodes(&self, node: NodeId) -> Vec<NodeId> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
            let adjacent = self.inner.adjacent_nodes(node);
            self.running.fetch_sub(1, Ordering::SeqCst);
            adjacent
        }
        fn edge_label(&self, from: NodeId, to: NodeId) -> Option<Label> {
            self.inner.edge_label(from, to)
        }
        fn degree(&self, node: NodeId) -> usize {
            self.inner.degree(node)
        }
    }

    #[test]
    fn test_worker_limit_bounds_concurrent_nodes() {
        let g = OverlapGraph {
            inner: star(0, 30),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        let labels = LabelMapping::from_graph(&g).unwrap();
        let nodes: Vec<NodeId> = (0..=30).collect();

        for workers in [1, 3] {
            g.peak.store(0, Ordering::SeqCst);
            let engine = HighDegreePrecompute::new(&g, &labels, 2, Vec::new())
                .unwrap()
                .with_workers(workers);
            let report = engine.compute(&nodes).unwrap();
            assert_eq!(report.written, 31);
            let peak = g.peak.load(Ordering::SeqCst);
            assert!((1..=workers).contains(&peak), "workers {} peak {}", workers, peak);
            assert_eq!(g.running.load(Ordering::SeqCst), 0);
        }
    }

    #[test]
    fn test_create_fails_on_bad_output_path() {
        let g = abc();
        let labels = LabelMapping::from_graph(&g).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = MetaPathConfig {
            high_degree_output: dir.path().join("no").join("such").join("dir.txt"),
            ..Default::default()
        };
        assert!(matches!(
            HighDegreePrecompute::create(&g, &labels, &config),
            Err(MetaPathError::Io(_))
        ));
    }
}
