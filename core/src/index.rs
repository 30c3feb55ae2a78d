use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use tracing::{info, warn};

use crate::error::{MetaPathError, Result};
use crate::graph::{Label, NodeId};
use crate::labels::{LabelIndex, LabelMapping};
use crate::metapath::render_tokens;

/// Meta-path suffix walked from an indexed node, with the nodes it ends at.
///
/// `tokens` is a run of (edge, node) dense label pairs; the indexed node's
/// own label is not repeated. The empty suffix ends at the indexed node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedSuffix {
    pub tokens: Vec<LabelIndex>,
    pub ends: HashSet<NodeId>,
}

impl IndexedSuffix {
    pub fn hops(&self) -> usize {
        self.tokens.len() / 2
    }
}

/// Per-node precomputed suffixes for high-degree nodes, loaded read-only
/// from the precompute stage's output.
///
/// A node without an entry simply has no shortcut.
#[derive(Debug, Clone, Default)]
pub struct HighDegreeIndex {
    entries: HashMap<NodeId, Vec<IndexedSuffix>>,
}

impl HighDegreeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add suffixes for `node`, merging with any existing entry. The
    /// self-suffix (empty path ending at `node`) is always present afterwards.
    pub fn insert(&mut self, node: NodeId, suffixes: Vec<IndexedSuffix>) {
        let mut merged: SuffixMap = self
            .entries
            .remove(&node)
            .unwrap_or_default()
            .into_iter()
            .map(|s| (s.tokens, s.ends))
            .collect();
        merge_suffixes(&mut merged, suffixes);
        self.entries.insert(node, finish_entry(node, merged));
    }

    pub fn get(&self, node: NodeId) -> Option<&[IndexedSuffix]> {
        self.entries.get(&node).map(|v| v.as_slice())
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.entries.contains_key(&node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load an index file. A missing file yields an empty index: every node
    /// is then searched without shortcuts.
    pub fn load(path: impl AsRef<Path>, labels: &LabelMapping) -> Result<Self> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(
                    path = %path.display(),
                    "high-degree index not found, searching without shortcuts"
                );
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };
        let index = Self::parse(BufReader::new(file), labels)?;
        info!(path = %path.display(), nodes = index.len(), "loaded high-degree index");
        Ok(index)
    }

    /// Parse `<node>:<suffix>=<end>,<end>-<suffix>=<end>-` lines.
    pub fn parse<R: BufRead>(reader: R, labels: &LabelMapping) -> Result<Self> {
        let mut pending: HashMap<NodeId, SuffixMap> = HashMap::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (node, suffixes) = parse_line(line, i + 1, labels)?;
            merge_suffixes(pending.entry(node).or_default(), suffixes);
        }
        let entries = pending
            .into_iter()
            .map(|(node, merged)| (node, finish_entry(node, merged)))
            .collect();
        Ok(Self { entries })
    }
}

/// Suffix tokens -> end nodes for one node while its entry is assembled.
type SuffixMap = HashMap<Vec<LabelIndex>, HashSet<NodeId>>;

fn merge_suffixes(merged: &mut SuffixMap, suffixes: Vec<IndexedSuffix>) {
    for suffix in suffixes {
        merged.entry(suffix.tokens).or_default().extend(suffix.ends);
    }
}

/// Freeze a merged entry: add the self-suffix if absent, order by tokens.
fn finish_entry(node: NodeId, mut merged: SuffixMap) -> Vec<IndexedSuffix> {
    merged.entry(Vec::new()).or_insert_with(|| HashSet::from([node]));
    let mut suffixes: Vec<IndexedSuffix> = merged
        .into_iter()
        .map(|(tokens, ends)| IndexedSuffix { tokens, ends })
        .collect();
    suffixes.sort_by(|a, b| a.tokens.cmp(&b.tokens));
    suffixes
}

fn parse_line(
    line: &str,
    line_no: usize,
    labels: &LabelMapping,
) -> Result<(NodeId, Vec<IndexedSuffix>)> {
    let bad = |reason: String| MetaPathError::IndexFormat { line: line_no, reason };

    let (node, rest) = line
        .split_once(':')
        .ok_or_else(|| bad("missing ':' after node id".into()))?;
    let node: NodeId = node
        .trim()
        .parse()
        .map_err(|_| bad(format!("invalid node id '{}'", node)))?;

    let mut suffixes = Vec::new();
    for part in rest.split('-').filter(|p| !p.is_empty()) {
        let (path, ends) = part
            .split_once('=')
            .ok_or_else(|| bad(format!("missing '=' in '{}'", part)))?;

        let raw: Vec<Label> = if path.is_empty() {
            Vec::new()
        } else {
            path.split('|')
                .map(|t| t.parse::<Label>().map_err(|_| bad(format!("invalid label '{}'", t))))
                .collect::<Result<_>>()?
        };
        if raw.len() % 2 != 0 {
            return Err(bad(format!("suffix '{}' is not (edge, node) pairs", path)));
        }
        let mut tokens = Vec::with_capacity(raw.len());
        for pair in raw.chunks(2) {
            tokens.push(labels.edge_index(pair[0])?);
            tokens.push(labels.node_index(pair[1])?);
        }

        let ends: HashSet<NodeId> = ends
            .split(',')
            .map(|e| e.parse::<NodeId>().map_err(|_| bad(format!("invalid end node '{}'", e))))
            .collect::<Result<_>>()?;

        suffixes.push(IndexedSuffix { tokens, ends });
    }
    Ok((node, suffixes))
}

/// Write one index record. Suffixes come out in token order with the empty
/// suffix first; end nodes ascending.
pub(crate) fn write_record<W: Write + ?Sized>(
    out: &mut W,
    node: NodeId,
    suffixes: &HashMap<Vec<LabelIndex>, HashSet<NodeId>>,
    labels: &LabelMapping,
) -> Result<()> {
    let ordered: BTreeMap<&Vec<LabelIndex>, &HashSet<NodeId>> = suffixes.iter().collect();
    let mut line = format!("{}:", node);
    for (tokens, ends) in ordered {
        line.push_str(&render_tokens(tokens, 1, labels)?);
        line.push('=');
        let ends: BTreeSet<&NodeId> = ends.iter().collect();
        let ends: Vec<String> = ends.into_iter().map(|e| e.to_string()).collect();
        line.push_str(&ends.join(","));
        line.push('-');
    }
    line.push('\n');
    out.write_all(line.as_bytes())?;
    Ok(())
}
