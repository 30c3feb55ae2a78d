use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Node identifier as handed out by the graph provider.
pub type NodeId = u64;

/// Raw node or edge label. Dense indices are assigned by [`crate::LabelDictionary`].
pub type Label = u32;

/// Which stored edges a traversal may follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalDirection {
    Outgoing,
    Incoming,
    /// Undirected: follow edges regardless of stored direction.
    #[default]
    Both,
}

/// Everything the enumeration engines need to know about a graph.
///
/// The graph is assumed static for the duration of a computation. All
/// methods take `&self` and implementations must be shareable across the
/// engines' worker threads.
pub trait GraphProvider: Sync {
    /// Every node id in the graph.
    fn node_ids(&self) -> Vec<NodeId>;

    /// Label of `node`, or None if the node is unknown.
    fn label_of(&self, node: NodeId) -> Option<Label>;

    fn all_node_labels(&self) -> BTreeSet<Label>;

    fn all_edge_labels(&self) -> BTreeSet<Label>;

    /// Neighbors of `node` under the provider's direction policy. A neighbor
    /// reachable over k parallel edges appears k times.
    fn adjacent_nodes(&self, node: NodeId) -> Vec<NodeId>;

    /// Label of an edge connecting `from` to `to` under the direction policy.
    fn edge_label(&self, from: NodeId, to: NodeId) -> Option<Label>;

    /// Number of adjacent edges, used to rank high-degree nodes.
    fn degree(&self, node: NodeId) -> usize;

    /// Neighbors paired with the label of the edge that reaches them.
    ///
    /// The default composes `adjacent_nodes` and `edge_label`, which reports
    /// one label per neighbor. Providers with parallel edges of different
    /// labels should override this.
    fn adjacent_edges(&self, node: NodeId) -> Vec<(NodeId, Option<Label>)> {
        self.adjacent_nodes(node)
            .into_iter()
            .map(|n| (n, self.edge_label(node, n)))
            .collect()
    }
}

/// Metadata about a node.
#[derive(Debug, Clone, Copy)]
pub struct NodeInfo {
    pub label: Label,
}

/// A directed edge in the adjacency list.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub target: NodeId,
    pub label: Label,
}

/// One edge as handed to [`Graph::load_edges`], carrying both endpoint labels.
#[derive(Debug, Clone)]
pub struct EdgeRecord {
    pub from_id: NodeId,
    pub to_id: NodeId,
    pub label: Label,
    pub from_label: Label,
    pub to_label: Label,
}

/// In-memory labeled graph: adjacency lists + per-node label.
///
/// Edges are stored bidirectionally: `outgoing[a]` contains edges from a,
/// `incoming[b]` contains edges into b. Both are populated on load; the
/// direction policy decides which of them a traversal sees.
pub struct Graph {
    outgoing: HashMap<NodeId, Vec<Edge>>,
    incoming: HashMap<NodeId, Vec<Edge>>,
    nodes: HashMap<NodeId, NodeInfo>,
    edge_labels: BTreeSet<Label>,
    direction: TraversalDirection,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
            nodes: HashMap::new(),
            edge_labels: BTreeSet::new(),
            direction: TraversalDirection::Both,
        }
    }

    /// Pre-allocate for a known graph size.
    pub fn with_capacity(node_count: usize) -> Self {
        Self {
            outgoing: HashMap::with_capacity(node_count),
            incoming: HashMap::with_capacity(node_count),
            nodes: HashMap::with_capacity(node_count),
            edge_labels: BTreeSet::new(),
            direction: TraversalDirection::Both,
        }
    }

    pub fn with_direction(mut self, direction: TraversalDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Register a node. Re-adding a node replaces its label.
    pub fn add_node(&mut self, id: NodeId, label: Label) {
        self.nodes.insert(id, NodeInfo { label });
    }

    /// Add a directed edge. Also inserts into the incoming adjacency list.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, label: Label) {
        self.outgoing
            .entry(from)
            .or_default()
            .push(Edge { target: to, label });
        self.incoming
            .entry(to)
            .or_default()
            .push(Edge { target: from, label });
        self.edge_labels.insert(label);
    }

    /// Bulk load edges, registering endpoints that are not yet known.
    pub fn load_edges<I>(&mut self, edges: I)
    where
        I: IntoIterator<Item = EdgeRecord>,
    {
        for rec in edges {
            self.nodes
                .entry(rec.from_id)
                .or_insert(NodeInfo { label: rec.from_label });
            self.nodes
                .entry(rec.to_id)
                .or_insert(NodeInfo { label: rec.to_label });
            self.add_edge(rec.from_id, rec.to_id, rec.label);
        }
    }

    pub fn neighbors_out(&self, id: NodeId) -> &[Edge] {
        self.outgoing.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn neighbors_in(&self, id: NodeId) -> &[Edge] {
        self.incoming.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Edges visible from `id` under the configured direction policy.
    ///
    /// Uses boolean flags rather than boxing, so the iterator stays a plain
    /// chain over two slices.
    pub fn edges(&self, id: NodeId) -> impl Iterator<Item = &Edge> {
        let (use_out, use_inc) = match self.direction {
            TraversalDirection::Outgoing => (true, false),
            TraversalDirection::Incoming => (false, true),
            TraversalDirection::Both => (true, true),
        };
        let out_iter = self.neighbors_out(id).iter().filter(move |_| use_out);
        let in_iter = self.neighbors_in(id).iter().filter(move |_| use_inc);
        out_iter.chain(in_iter)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.outgoing.values().map(|v| v.len()).sum()
    }

    /// Approximate memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        use std::mem::size_of;

        let nodes_mem = self.nodes.len() * (size_of::<NodeId>() + size_of::<NodeInfo>() + 16);
        let out_edges: usize = self.outgoing.values().map(|v| v.len() * size_of::<Edge>()).sum();
        let in_edges: usize = self.incoming.values().map(|v| v.len() * size_of::<Edge>()).sum();

        nodes_mem + out_edges + in_edges
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphProvider for Graph {
    fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    fn label_of(&self, node: NodeId) -> Option<Label> {
        self.nodes.get(&node).map(|n| n.label)
    }

    fn all_node_labels(&self) -> BTreeSet<Label> {
        self.nodes.values().map(|n| n.label).collect()
    }

    fn all_edge_labels(&self) -> BTreeSet<Label> {
        self.edge_labels.clone()
    }

    fn adjacent_nodes(&self, node: NodeId) -> Vec<NodeId> {
        self.edges(node).map(|e| e.target).collect()
    }

    fn edge_label(&self, from: NodeId, to: NodeId) -> Option<Label> {
        self.edges(from).find(|e| e.target == to).map(|e| e.label)
    }

    fn degree(&self, node: NodeId) -> usize {
        self.edges(node).count()
    }

    fn adjacent_edges(&self, node: NodeId) -> Vec<(NodeId, Option<Label>)> {
        self.edges(node).map(|e| (e.target, Some(e.label))).collect()
    }
}

/// Pick the top `ceil(n * ratio)` nodes by degree.
///
/// Ties are broken by node id (ascending) so the selection is stable across
/// runs. A ratio of 1.0 selects every node; a ratio <= 0 selects none.
pub fn select_high_degree_nodes<G: GraphProvider + ?Sized>(graph: &G, ratio: f64) -> Vec<NodeId> {
    let mut ranked: Vec<(usize, NodeId)> = graph
        .node_ids()
        .into_iter()
        .map(|id| (graph.degree(id), id))
        .collect();

    // Degree descending, then node id ascending
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    let wanted = if ratio <= 0.0 {
        0
    } else {
        ((ranked.len() as f64) * ratio.min(1.0)).ceil() as usize
    };
    ranked.truncate(wanted);

    for &(degree, id) in &ranked {
        tracing::debug!(
            node = id,
            degree,
            label = ?graph.label_of(id),
            "selected high-degree node"
        );
    }

    ranked.into_iter().map(|(_, id)| id).collect()
}
