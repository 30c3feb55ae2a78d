use std::collections::{BTreeSet, VecDeque};
use std::error::Error;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use metapath_core::{
    select_high_degree_nodes, FullEnumeration, Graph, GraphProvider, HighDegreeIndex,
    HighDegreePrecompute, InstanceSearch, LabelMapping, MetaPathConfig, NodeId,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() {
    if let Err(err) = try_main() {
        eprintln!("metapath-bench failed: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    install_tracing_subscriber();

    let mut config = match &args.config {
        Some(path) => MetaPathConfig::from_json_file(path)?,
        None => MetaPathConfig::default(),
    };
    if let Some(path_length) = args.path_length {
        config.path_length = path_length;
    }
    if let Some(ratio) = args.ratio {
        config.high_degree_ratio = ratio;
    }
    if args.workers.is_some() {
        config.worker_limit = args.workers;
    }
    config.validate()?;

    if !args.json {
        println!("metapath-bench");
        println!("==============");
        println!();
    }

    let mut summaries = Vec::new();
    for generator in args.mode.generators() {
        summaries.push(run_benchmark(*generator, &args, &config)?);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    }
    Ok(())
}

fn install_tracing_subscriber() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt().with_env_filter(filter).with_writer(io::stderr).try_init();
}

#[derive(Parser, Debug)]
#[command(
    name = "metapath-bench",
    about = "Run the meta-path engines over synthetic labeled graphs"
)]
struct Args {
    /// Graph generator to benchmark.
    #[arg(value_enum, default_value_t = Mode::All)]
    mode: Mode,

    /// Target number of nodes per generated graph.
    #[arg(default_value_t = 2_000)]
    node_count: u64,

    /// JSON file with engine settings. Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum number of node labels per meta-path.
    #[arg(long)]
    path_length: Option<usize>,

    /// Fraction of nodes, by degree, to precompute.
    #[arg(long)]
    ratio: Option<f64>,

    /// Upper bound on concurrent workers.
    #[arg(long)]
    workers: Option<usize>,

    /// Output files go to `<out-dir>/<generator>/`.
    #[arg(long, default_value = "metapath-out")]
    out_dir: PathBuf,

    /// Size of the sampled start and end node sets.
    #[arg(long, default_value_t = 8)]
    sample: usize,

    /// Also time instance search without the high-degree index.
    #[arg(long)]
    compare: bool,

    /// Print a JSON summary instead of the table.
    #[arg(long)]
    json: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Mode {
    /// Run all generators.
    All,
    /// Fractal branching tree (deep paths).
    Lsystem,
    /// Preferential attachment via edge sampling (hub-and-spoke).
    Scalefree,
    /// Watts-Strogatz ring lattice + shortcuts.
    Smallworld,
    /// Erdos-Renyi uniform random edges.
    Random,
    /// Two dense cliques connected by a thin bridge.
    Barbell,
    /// Diffusion-limited aggregation (organic branching).
    Dla,
}

type Generator = (&'static str, &'static str, fn(u64) -> Graph);

const GENERATORS: [Generator; 6] = [
    ("lsystem", "L-system tree", gen_lsystem),
    ("scalefree", "Scale-free (edge sampling)", gen_scale_free),
    ("smallworld", "Small-world (Watts-Strogatz)", gen_small_world),
    ("random", "Erdos-Renyi random", gen_random),
    ("barbell", "Barbell (clique-bridge-clique)", gen_barbell),
    ("dla", "DLA (organic branching)", gen_dla),
];

impl Mode {
    fn generators(self) -> &'static [Generator] {
        match self {
            Mode::All => &GENERATORS,
            Mode::Lsystem => &GENERATORS[0..1],
            Mode::Scalefree => &GENERATORS[1..2],
            Mode::Smallworld => &GENERATORS[2..3],
            Mode::Random => &GENERATORS[3..4],
            Mode::Barbell => &GENERATORS[4..5],
            Mode::Dla => &GENERATORS[5..6],
        }
    }
}

#[derive(Debug, Serialize)]
struct BenchSummary {
    generator: &'static str,
    nodes: usize,
    edges: usize,
    memory_mb: f64,
    path_length: usize,
    full_paths: usize,
    full_ms: f64,
    indexed_nodes: usize,
    failed_nodes: usize,
    precompute_ms: f64,
    instance_paths: usize,
    instance_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    unindexed_instance_ms: Option<f64>,
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn run_benchmark(
    (slug, name, generator): Generator,
    args: &Args,
    base: &MetaPathConfig,
) -> Result<BenchSummary, Box<dyn Error>> {
    let dir = args.out_dir.join(slug);
    fs::create_dir_all(&dir)?;
    let config = MetaPathConfig {
        full_output: dir.join(file_name(&base.full_output)),
        high_degree_output: dir.join(file_name(&base.high_degree_output)),
        instances_output: dir.join(file_name(&base.instances_output)),
        ..base.clone()
    };

    let t = Instant::now();
    let graph = generator(args.node_count).with_direction(config.direction);
    let gen_time = t.elapsed();
    let labels = LabelMapping::from_graph(&graph)?;
    info!(
        generator = slug,
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "generated graph"
    );

    let t = Instant::now();
    let full = FullEnumeration::create(&graph, &labels, &config)?.compute()?;
    let full_time = t.elapsed();

    let t = Instant::now();
    let dense = select_high_degree_nodes(&graph, config.high_degree_ratio);
    let report = HighDegreePrecompute::create(&graph, &labels, &config)?.compute(&dense)?;
    let index = HighDegreeIndex::load(&config.high_degree_output, &labels)?;
    let precompute_time = t.elapsed();

    let (start, end) = sample_endpoints(&graph, args.sample);
    let found = InstanceSearch::create(&graph, &labels, &index, &config)?.compute(&start, &end)?;

    let unindexed = if args.compare {
        let empty = HighDegreeIndex::new();
        let mut plain =
            InstanceSearch::new(&graph, &labels, &empty, config.path_length, io::sink())?;
        Some(plain.compute(&start, &end)?.elapsed)
    } else {
        None
    };

    let summary = BenchSummary {
        generator: slug,
        nodes: graph.node_count(),
        edges: graph.edge_count(),
        memory_mb: graph.memory_usage() as f64 / 1_048_576.0,
        path_length: config.path_length,
        full_paths: full.len(),
        full_ms: millis(full_time),
        indexed_nodes: report.written,
        failed_nodes: report.failed.len(),
        precompute_ms: millis(precompute_time),
        instance_paths: found.len(),
        instance_ms: millis(found.elapsed),
        unindexed_instance_ms: unindexed.map(millis),
    };

    if !args.json {
        println!("--- {} ---", name);
        println!(
            "Generated in {:.2}s: {} nodes, {} edges, ~{:.0}MB",
            gen_time.as_secs_f64(),
            summary.nodes,
            summary.edges,
            summary.memory_mb
        );
        println!();
        println!("{:>14} {:>12} {:>12}", "stage", "paths", "time");
        println!("{:->14} {:->12} {:->12}", "", "", "");
        println!("{:>14} {:>12} {:>10.1}ms", "full", summary.full_paths, summary.full_ms);
        println!(
            "{:>14} {:>12} {:>10.1}ms",
            "precompute", summary.indexed_nodes, summary.precompute_ms
        );
        println!(
            "{:>14} {:>12} {:>10.1}ms",
            "instances", summary.instance_paths, summary.instance_ms
        );
        if let Some(ms) = summary.unindexed_instance_ms {
            println!("{:>14} {:>12} {:>10.1}ms", "no index", summary.instance_paths, ms);
        }
        if summary.failed_nodes > 0 {
            println!("{} high-degree nodes failed to index", summary.failed_nodes);
        }
        println!("Output written to {}", dir.display());
        println!();
    }
    Ok(summary)
}

fn file_name(path: &std::path::Path) -> PathBuf {
    path.file_name().map(PathBuf::from).unwrap_or_else(|| path.to_path_buf())
}

/// Deterministic start and end sets, spread over the id range.
fn sample_endpoints(graph: &Graph, sample: usize) -> (Vec<NodeId>, Vec<NodeId>) {
    let ids: BTreeSet<NodeId> = graph.node_ids().into_iter().collect();
    let ids: Vec<NodeId> = ids.into_iter().collect();
    if ids.is_empty() || sample == 0 {
        return (Vec::new(), Vec::new());
    }
    let mut rng = FastRng::new(2024);
    let mut pick = || -> Vec<NodeId> {
        let set: BTreeSet<NodeId> = (0..sample)
            .map(|_| ids[rng.next(ids.len() as u64) as usize])
            .collect();
        set.into_iter().collect()
    };
    let start = pick();
    let end = pick();
    (start, end)
}

// ---------------------------------------------------------------------------
// Generators: all O(n) or O(n + edges), single-threaded, deterministic
// ---------------------------------------------------------------------------

/// Simple LCG for deterministic, fast pseudo-random numbers.
struct FastRng(u64);

impl FastRng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next(&mut self, max: u64) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.0 >> 33) % max
    }
    fn next_f64(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Node labels handed out at random by the generators.
const NODE_LABELS: u64 = 4;
/// Edge labels handed out at random by the generators.
const EDGE_LABELS: u64 = 5;
/// Reserved labels for barbell structure.
const BRIDGE_NODE: u32 = 10;
const BRIDGE_EDGE: u32 = 10;

fn node_label(rng: &mut FastRng) -> u32 {
    rng.next(NODE_LABELS) as u32
}

fn edge_label(rng: &mut FastRng) -> u32 {
    rng.next(EDGE_LABELS) as u32
}

/// L-system fractal tree: deep branching with self-similar structure.
///
/// Each node spawns `branching_factor` children. Produces deep paths (log depth)
/// with exponential width.
fn gen_lsystem(node_count: u64) -> Graph {
    let mut graph = Graph::with_capacity(node_count as usize);
    let mut rng = FastRng::new(42);

    let branching = 3u64;
    graph.add_node(0, node_label(&mut rng));

    let mut next_id: u64 = 1;
    let mut frontier: Vec<u64> = vec![0];

    while next_id < node_count && !frontier.is_empty() {
        let mut next_frontier = Vec::with_capacity(frontier.len() * branching as usize);
        for &parent in &frontier {
            for _ in 0..branching {
                if next_id >= node_count {
                    break;
                }
                let child = next_id;
                next_id += 1;
                graph.add_node(child, node_label(&mut rng));
                graph.add_edge(parent, child, edge_label(&mut rng));
                next_frontier.push(child);
            }
        }
        frontier = next_frontier;
    }

    graph
}

/// Scale-free via edge-list sampling (O(edges), not O(n²)).
///
/// Preferential attachment by picking a random existing edge and connecting
/// to one of its endpoints. Produces the hubs the high-degree index targets.
fn gen_scale_free(node_count: u64) -> Graph {
    let edges_per_node = 3u64;
    let mut graph = Graph::with_capacity(node_count as usize);
    let mut rng = FastRng::new(12345);

    let mut edge_endpoints: Vec<u64> =
        Vec::with_capacity((node_count * edges_per_node * 2) as usize);

    // Seed: small clique
    let seed = 5u64.min(node_count);
    for i in 0..seed {
        graph.add_node(i, node_label(&mut rng));
    }
    for i in 0..seed {
        for j in (i + 1)..seed {
            graph.add_edge(i, j, edge_label(&mut rng));
            edge_endpoints.push(i);
            edge_endpoints.push(j);
        }
    }

    for new_node in seed..node_count {
        graph.add_node(new_node, node_label(&mut rng));

        let attach = edges_per_node.min(new_node);
        for _ in 0..attach {
            if edge_endpoints.is_empty() {
                break;
            }
            // Proportional to degree
            let idx = rng.next(edge_endpoints.len() as u64) as usize;
            let target = edge_endpoints[idx];
            if target != new_node {
                graph.add_edge(new_node, target, edge_label(&mut rng));
                edge_endpoints.push(new_node);
                edge_endpoints.push(target);
            }
        }
    }

    graph
}

/// Small-world (Watts-Strogatz): ring lattice + random rewiring.
fn gen_small_world(node_count: u64) -> Graph {
    let k = 3u64; // neighbors on each side
    let p = 0.05f64; // rewire probability
    let mut graph = Graph::with_capacity(node_count as usize);
    let mut rng = FastRng::new(67890);

    for i in 0..node_count {
        graph.add_node(i, node_label(&mut rng));
    }

    for i in 0..node_count {
        for j in 1..=k {
            let neighbor = (i + j) % node_count;
            let label = edge_label(&mut rng);

            if rng.next_f64() < p {
                let rewired = rng.next(node_count);
                if rewired != i {
                    graph.add_edge(i, rewired, label);
                } else {
                    graph.add_edge(i, neighbor, label);
                }
            } else {
                graph.add_edge(i, neighbor, label);
            }
        }
    }

    graph
}

/// Erdos-Renyi: uniform random edges, ~3 per node on average.
fn gen_random(node_count: u64) -> Graph {
    let target_edges = node_count * 3;
    let mut graph = Graph::with_capacity(node_count as usize);
    let mut rng = FastRng::new(54321);

    for i in 0..node_count {
        graph.add_node(i, node_label(&mut rng));
    }
    if node_count == 0 {
        return graph;
    }

    for _ in 0..target_edges {
        let from = rng.next(node_count);
        let to = rng.next(node_count);
        if from != to {
            graph.add_edge(from, to, edge_label(&mut rng));
        }
    }

    graph
}

/// Barbell: two dense cliques connected by a single thin bridge.
///
/// Bridge nodes and edges carry their own labels, so every meta-path that
/// crosses between the cliques shows the bridge.
fn gen_barbell(node_count: u64) -> Graph {
    let bridge_len = 10u64.min(node_count);
    let clique_size = (node_count - bridge_len) / 2;
    let fan_out = 6u64.min(clique_size.saturating_sub(1));
    let mut graph = Graph::with_capacity(node_count as usize);
    let mut rng = FastRng::new(99999);

    // Clique A: nodes 0..clique_size
    for i in 0..clique_size {
        graph.add_node(i, node_label(&mut rng));
    }
    for i in 0..clique_size {
        for _ in 0..fan_out {
            let target = rng.next(clique_size);
            if target != i {
                graph.add_edge(i, target, edge_label(&mut rng));
            }
        }
    }

    // Bridge: chain from last node of A to first node of B
    let bridge_start = clique_size;
    for i in 0..bridge_len {
        let id = bridge_start + i;
        graph.add_node(id, BRIDGE_NODE);
        if i > 0 {
            graph.add_edge(id - 1, id, BRIDGE_EDGE);
        } else if clique_size > 0 {
            graph.add_edge(clique_size - 1, id, BRIDGE_EDGE);
        }
    }

    // Clique B: nodes after bridge
    let b_start = bridge_start + bridge_len;
    for i in 0..clique_size {
        graph.add_node(b_start + i, node_label(&mut rng));
    }
    if clique_size > 0 && bridge_len > 0 {
        graph.add_edge(b_start - 1, b_start, BRIDGE_EDGE);
    }

    for i in 0..clique_size {
        for _ in 0..fan_out {
            let target = rng.next(clique_size);
            if target != i {
                graph.add_edge(b_start + i, b_start + target, edge_label(&mut rng));
            }
        }
    }

    graph
}

/// DLA (Diffusion-Limited Aggregation): organic branching growth.
///
/// Simplified: each new node attaches to a recent "surface" node, with
/// occasional long-range jumps.
fn gen_dla(node_count: u64) -> Graph {
    let mut graph = Graph::with_capacity(node_count as usize);
    let mut rng = FastRng::new(77777);
    if node_count == 0 {
        return graph;
    }

    graph.add_node(0, node_label(&mut rng));

    // Keep growth at the frontier; evict the oldest surface nodes.
    let surface_max = 10000usize;
    let mut surface: VecDeque<u64> = VecDeque::with_capacity(surface_max + 1);
    surface.push_back(0);

    for new_node in 1..node_count {
        graph.add_node(new_node, node_label(&mut rng));

        let attach_to = surface[rng.next(surface.len() as u64) as usize];
        graph.add_edge(new_node, attach_to, edge_label(&mut rng));

        // 10% chance of a second connection (creates loops / shortcuts)
        if rng.next(10) == 0 && new_node > 1 {
            let other = rng.next(new_node);
            if other != attach_to {
                graph.add_edge(new_node, other, edge_label(&mut rng));
            }
        }

        surface.push_back(new_node);
        if surface.len() > surface_max {
            surface.pop_front();
        }
    }

    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generators_hit_node_count() {
        for (slug, _, generator) in GENERATORS {
            let g = generator(200);
            assert_eq!(g.node_count(), 200, "{}", slug);
            assert!(g.edge_count() > 0, "{}", slug);
        }
    }

    #[test]
    fn test_generators_are_deterministic() {
        let a = gen_scale_free(300);
        let b = gen_scale_free(300);
        assert_eq!(a.edge_count(), b.edge_count());
        assert_eq!(
            select_high_degree_nodes(&a, 0.05),
            select_high_degree_nodes(&b, 0.05)
        );
    }

    #[test]
    fn test_barbell_bridge_labels() {
        let g = gen_barbell(50);
        assert!(g.all_node_labels().contains(&BRIDGE_NODE));
        assert!(g.all_edge_labels().contains(&BRIDGE_EDGE));
    }

    #[test]
    fn test_sample_endpoints() {
        let g = gen_random(100);
        let (start, end) = sample_endpoints(&g, 5);
        assert!(!start.is_empty() && start.len() <= 5);
        assert!(!end.is_empty() && end.len() <= 5);
        assert!(start.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(sample_endpoints(&g, 0), (Vec::new(), Vec::new()));
    }

    #[test]
    fn test_cli_parses_overrides() {
        let args = Args::parse_from([
            "metapath-bench",
            "dla",
            "500",
            "--path-length",
            "3",
            "--json",
        ]);
        assert!(matches!(args.mode, Mode::Dla));
        assert_eq!(args.node_count, 500);
        assert_eq!(args.path_length, Some(3));
        assert!(args.json);
        assert_eq!(args.mode.generators().len(), 1);
    }
}
