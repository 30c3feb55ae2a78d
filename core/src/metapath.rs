use std::fmt;

use crate::error::{MetaPathError, Result};
use crate::labels::{LabelIndex, LabelMapping};

/// An alternating sequence `[node, edge, node, edge, ..., node]` of dense
/// label indices.
///
/// Always starts and ends with a node token, so the token count is odd.
/// Equality and hashing are by token content. Paths are never mutated in
/// place: `extend` and `splice` allocate a fresh sequence, so branches that
/// share a prefix never alias each other's storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetaPath {
    tokens: Vec<LabelIndex>,
}

impl MetaPath {
    /// Single-token path consisting of one node label.
    pub fn new(node: LabelIndex) -> Self {
        Self { tokens: vec![node] }
    }

    pub fn from_tokens(tokens: Vec<LabelIndex>) -> Result<Self> {
        if tokens.len() % 2 == 0 {
            return Err(MetaPathError::Configuration(format!(
                "meta-path must have an odd number of tokens, got {}",
                tokens.len()
            )));
        }
        Ok(Self { tokens })
    }

    /// New path with one more (edge, node) hop. `self` is left untouched.
    pub fn extend(&self, edge: LabelIndex, node: LabelIndex) -> MetaPath {
        let mut tokens = Vec::with_capacity(self.tokens.len() + 2);
        tokens.extend_from_slice(&self.tokens);
        tokens.push(edge);
        tokens.push(node);
        MetaPath { tokens }
    }

    /// New path with a run of (edge, node) pairs appended.
    pub fn splice(&self, suffix: &[LabelIndex]) -> Result<MetaPath> {
        if suffix.len() % 2 != 0 {
            return Err(MetaPathError::Configuration(format!(
                "suffix must be (edge, node) pairs, got {} tokens",
                suffix.len()
            )));
        }
        let mut tokens = Vec::with_capacity(self.tokens.len() + suffix.len());
        tokens.extend_from_slice(&self.tokens);
        tokens.extend_from_slice(suffix);
        Ok(MetaPath { tokens })
    }

    pub fn tokens(&self) -> &[LabelIndex] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Always false; a meta-path has at least its start node.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of edges walked.
    pub fn hops(&self) -> usize {
        self.tokens.len() / 2
    }

    pub fn first_node(&self) -> LabelIndex {
        self.tokens[0]
    }

    pub fn last_node(&self) -> LabelIndex {
        self.tokens[self.tokens.len() - 1]
    }

    /// Render with raw labels, pipe-delimited (`3|0|5`). This is the
    /// persisted form.
    pub fn render(&self, labels: &LabelMapping) -> Result<String> {
        render_tokens(&self.tokens, 0, labels)
    }
}

/// Render tokens whose first element sits at position `offset` of a full
/// path. Even positions are node labels, odd ones edge labels.
pub(crate) fn render_tokens(
    tokens: &[LabelIndex],
    offset: usize,
    labels: &LabelMapping,
) -> Result<String> {
    let mut out = String::with_capacity(tokens.len() * 4);
    for (i, &tok) in tokens.iter().enumerate() {
        if i > 0 {
            out.push('|');
        }
        let raw = if (i + offset) % 2 == 0 {
            labels.node_label(tok)?
        } else {
            labels.edge_label(tok)?
        };
        out.push_str(&raw.to_string());
    }
    Ok(out)
}

/// Diagnostic form using dense indices: `0 | 0 | 2`.
impl fmt::Display for MetaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tok) in self.tokens.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}", tok)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::labeled;

    #[test]
    fn test_extend_leaves_parent_untouched() {
        let parent = MetaPath::new(2);
        let child = parent.extend(0, 1);
        let grandchild = child.extend(1, 2);
        assert_eq!(parent.tokens(), &[2]);
        assert_eq!(child.tokens(), &[2, 0, 1]);
        assert_eq!(grandchild.tokens(), &[2, 0, 1, 1, 2]);
        assert_eq!(grandchild.hops(), 2);
        assert_eq!(grandchild.last_node(), 2);
    }

    #[test]
    fn test_siblings_do_not_alias() {
        let parent = MetaPath::new(0).extend(0, 1);
        let a = parent.extend(0, 0);
        let b = parent.extend(1, 1);
        assert_ne!(a, b);
        assert_eq!(parent.len(), 3);
    }

    #[test]
    fn test_equality_is_by_content() {
        let a = MetaPath::new(0).extend(1, 2);
        let b = MetaPath::from_tokens(vec![0, 1, 2]).unwrap();
        assert_eq!(a, b);
        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_from_tokens_rejects_even_length() {
        assert!(MetaPath::from_tokens(vec![0, 1]).is_err());
        assert!(MetaPath::from_tokens(vec![]).is_err());
    }

    #[test]
    fn test_splice() {
        let p = MetaPath::new(1).extend(0, 2);
        let spliced = p.splice(&[0, 1, 0, 0]).unwrap();
        assert_eq!(spliced.tokens(), &[1, 0, 2, 0, 1, 0, 0]);
        assert_eq!(p.splice(&[]).unwrap(), p);
        assert!(p.splice(&[0]).is_err());
    }

    #[test]
    fn test_render_uses_raw_labels() {
        let g = labeled(&[(0, 10), (1, 30)], &[(0, 1, 7)]);
        let labels = LabelMapping::from_graph(&g).unwrap();
        let p = MetaPath::new(0).extend(0, 1).extend(0, 0);
        assert_eq!(p.render(&labels).unwrap(), "10|7|30|7|10");
        assert_eq!(p.to_string(), "0 | 0 | 1 | 0 | 0");
        assert!(MetaPath::new(5).render(&labels).is_err());
    }
}
