use std::collections::HashMap;

use crate::error::{MetaPathError, Result};
use crate::graph::{GraphProvider, Label};

/// Dense index assigned to a raw label. Meta-path tokens are stored as these.
pub type LabelIndex = u16;

/// Bidirectional raw label ↔ dense index mapping.
///
/// Assignment is first-seen-wins and never changes for the lifetime of the
/// dictionary. There is no removal.
#[derive(Debug, Clone, Default)]
pub struct LabelDictionary {
    labels: Vec<Label>,
    index: HashMap<Label, LabelIndex>,
}

impl LabelDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the dense index for `label`, assigning the next free one if the
    /// label has not been seen.
    pub fn assign(&mut self, label: Label) -> Result<LabelIndex> {
        if let Some(&idx) = self.index.get(&label) {
            return Ok(idx);
        }
        let idx = LabelIndex::try_from(self.labels.len()).map_err(|_| {
            MetaPathError::Configuration(format!(
                "label dictionary exceeded maximum of {} labels",
                LabelIndex::MAX as usize + 1
            ))
        })?;
        self.labels.push(label);
        self.index.insert(label, idx);
        Ok(idx)
    }

    pub fn index_of(&self, label: Label) -> Option<LabelIndex> {
        self.index.get(&label).copied()
    }

    pub fn resolve(&self, idx: LabelIndex) -> Option<Label> {
        self.labels.get(idx as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Node and edge dictionaries for one computation.
#[derive(Debug, Clone, Default)]
pub struct LabelMapping {
    pub nodes: LabelDictionary,
    pub edges: LabelDictionary,
}

impl LabelMapping {
    /// Pre-populate both dictionaries from the provider's label universe, in
    /// ascending raw label order.
    pub fn from_graph<G: GraphProvider + ?Sized>(graph: &G) -> Result<Self> {
        let mut mapping = LabelMapping::default();
        for label in graph.all_node_labels() {
            mapping.nodes.assign(label)?;
        }
        if mapping.nodes.is_empty() {
            return Err(MetaPathError::Configuration(
                "graph has no node labels".into(),
            ));
        }
        for label in graph.all_edge_labels() {
            mapping.edges.assign(label)?;
        }
        Ok(mapping)
    }

    pub fn node_index(&self, label: Label) -> Result<LabelIndex> {
        self.nodes
            .index_of(label)
            .ok_or_else(|| MetaPathError::unknown_label("node label", label))
    }

    pub fn edge_index(&self, label: Label) -> Result<LabelIndex> {
        self.edges
            .index_of(label)
            .ok_or_else(|| MetaPathError::unknown_label("edge label", label))
    }

    pub fn node_label(&self, idx: LabelIndex) -> Result<Label> {
        self.nodes.resolve(idx).ok_or(MetaPathError::Lookup {
            kind: "node label index",
            id: u64::from(idx),
        })
    }

    pub fn edge_label(&self, idx: LabelIndex) -> Result<Label> {
        self.edges.resolve(idx).ok_or(MetaPathError::Lookup {
            kind: "edge label index",
            id: u64::from(idx),
        })
    }

    /// Dense label of a node, looked up through the provider.
    pub(crate) fn node_index_of<G: GraphProvider + ?Sized>(
        &self,
        graph: &G,
        node: crate::graph::NodeId,
    ) -> Result<LabelIndex> {
        let label = graph
            .label_of(node)
            .ok_or_else(|| MetaPathError::unknown_node(node))?;
        self.node_index(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::labeled;
    use crate::graph::Graph;

    #[test]
    fn test_assign_first_seen_wins() {
        let mut d = LabelDictionary::new();
        assert_eq!(d.assign(40).unwrap(), 0);
        assert_eq!(d.assign(7).unwrap(), 1);
        assert_eq!(d.assign(40).unwrap(), 0);
        assert_eq!(d.len(), 2);
        assert_eq!(d.resolve(1), Some(7));
        assert_eq!(d.index_of(7), Some(1));
        assert_eq!(d.resolve(2), None);
    }

    #[test]
    fn test_dictionary_overflow() {
        let mut d = LabelDictionary::new();
        for label in 0..=u32::from(u16::MAX) {
            d.assign(label).unwrap();
        }
        let err = d.assign(1_000_000).unwrap_err();
        assert!(matches!(err, MetaPathError::Configuration(_)));
    }

    #[test]
    fn test_from_graph_is_sorted() {
        let g = labeled(&[(0, 9), (1, 3), (2, 5)], &[(0, 1, 20), (1, 2, 4)]);
        let m = LabelMapping::from_graph(&g).unwrap();
        assert_eq!(m.node_index(3).unwrap(), 0);
        assert_eq!(m.node_index(5).unwrap(), 1);
        assert_eq!(m.node_index(9).unwrap(), 2);
        assert_eq!(m.edge_index(4).unwrap(), 0);
        assert_eq!(m.edge_label(1).unwrap(), 20);
    }

    #[test]
    fn test_unknown_label_is_lookup_error() {
        let g = labeled(&[(0, 1)], &[]);
        let m = LabelMapping::from_graph(&g).unwrap();
        assert!(matches!(
            m.node_index(2),
            Err(MetaPathError::Lookup { kind: "node label", id: 2 })
        ));
        assert!(matches!(m.edge_label(0), Err(MetaPathError::Lookup { .. })));
        assert!(matches!(
            m.node_index_of(&g, 42),
            Err(MetaPathError::Lookup { kind: "node", id: 42 })
        ));
    }

    #[test]
    fn test_empty_graph_is_configuration_error() {
        let g = Graph::new();
        assert!(matches!(
            LabelMapping::from_graph(&g),
            Err(MetaPathError::Configuration(_))
        ));
    }
}
