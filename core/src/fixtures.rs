//! Small hand-built graphs shared by the unit tests.

use crate::graph::{Graph, Label, NodeId};

/// Build an undirected graph from explicit node labels and labeled edges.
pub fn labeled(nodes: &[(NodeId, Label)], edges: &[(NodeId, NodeId, Label)]) -> Graph {
    let mut g = Graph::new();
    for &(id, label) in nodes {
        g.add_node(id, label);
    }
    for &(from, to, label) in edges {
        g.add_edge(from, to, label);
    }
    g
}

/// Hub (label 0) with `leaves` spokes (label 1), all edges labeled 0.
pub fn star(center: NodeId, leaves: u64) -> Graph {
    let mut g = Graph::new();
    g.add_node(center, 0);
    for i in 1..=leaves {
        g.add_node(center + i, 1);
        g.add_edge(center, center + i, 0);
    }
    g
}

/// A=0, B=1, C=2, one edge label 0.
///
/// ```text
/// a(A) -- t(C), c(A), b(B), s(C)
/// b(B) -- s(C), t(C)
/// c(A) -- s(C), b(B)
/// i(A) -- t(C)
/// t(C) -- s(C), o(A)
/// k(B) -- s(C)
/// ```
///
/// Node ids: a=0 b=1 c=2 i=3 k=4 o=5 s=6 t=7.
pub fn abc() -> Graph {
    let (a, b, c, i, k, o, s, t) = (0, 1, 2, 3, 4, 5, 6, 7);
    labeled(
        &[(a, 0), (b, 1), (c, 0), (i, 0), (k, 1), (o, 0), (s, 2), (t, 2)],
        &[
            (a, t, 0),
            (a, c, 0),
            (a, b, 0),
            (a, s, 0),
            (b, s, 0),
            (b, t, 0),
            (c, s, 0),
            (c, b, 0),
            (i, t, 0),
            (t, s, 0),
            (t, o, 0),
            (k, s, 0),
        ],
    )
}

/// Two triangles joined by a three-node bridge, nine nodes in total.
///
/// ```text
/// triangle 0-1-2 (edge label 1)   bridge 2-6-7-8-3 (edge label 3)   triangle 3-4-5 (edge label 2)
/// ```
///
/// Node labels: 0,3 -> 10; 1,2,5 -> 11; 4 -> 12; 6,7,8 -> 13.
pub fn two_triangles() -> Graph {
    labeled(
        &[
            (0, 10),
            (1, 11),
            (2, 11),
            (3, 10),
            (4, 12),
            (5, 11),
            (6, 13),
            (7, 13),
            (8, 13),
        ],
        &[
            (0, 1, 1),
            (1, 2, 1),
            (2, 0, 1),
            (3, 4, 2),
            (4, 5, 2),
            (5, 3, 2),
            (2, 6, 3),
            (6, 7, 3),
            (7, 8, 3),
            (8, 3, 3),
        ],
    )
}
