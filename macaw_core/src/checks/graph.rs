//! The error-topology graph: heterogeneous edges emitted by the checks and
//! the connected-component labeling that turns them into pathways

use indexmap::{IndexMap, IndexSet};
use petgraph::unionfind::UnionFind;

/// A node of the error-topology graph
///
/// The dead-end and dilution checks emit bipartite metabolite-reaction edges
/// while the duplicate and loop checks emit reaction-reaction edges; the tag
/// keeps the two id namespaces apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Node {
    Metabolite(String),
    Reaction(String),
}

impl Node {
    pub fn id(&self) -> &str {
        match self {
            Node::Metabolite(id) | Node::Reaction(id) => id,
        }
    }
}

/// An unordered pair of nodes
///
/// Endpoints are stored in canonical order so that equality and hashing treat
/// (a, b) and (b, a) as the same edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    a: Node,
    b: Node,
}

impl Edge {
    pub fn new(first: Node, second: Node) -> Edge {
        if second < first {
            Edge {
                a: second,
                b: first,
            }
        } else {
            Edge { a: first, b: second }
        }
    }

    /// A bipartite metabolite-reaction edge
    pub fn metabolite_reaction(met_id: &str, rxn_id: &str) -> Edge {
        Edge::new(
            Node::Metabolite(met_id.to_string()),
            Node::Reaction(rxn_id.to_string()),
        )
    }

    /// A monopartite reaction-reaction edge
    pub fn reaction_pair(first: &str, second: &str) -> Edge {
        Edge::new(
            Node::Reaction(first.to_string()),
            Node::Reaction(second.to_string()),
        )
    }

    pub fn endpoints(&self) -> (&Node, &Node) {
        (&self.a, &self.b)
    }
}

/// A deduplicated, insertion-ordered set of edges
pub type EdgeSet = IndexSet<Edge>;

/// Label the connected components of the combined edge set
///
/// Every reaction mentioned in any edge receives the positive integer label
/// of its component; labels are assigned in first-encounter order over the
/// edge set, so the same edges always yield the same labels. Reactions absent
/// from the graph are simply absent from the returned map (the results table
/// gives them pathway 0).
pub fn form_pathways(edges: &EdgeSet) -> IndexMap<String, u32> {
    let mut node_indices: IndexMap<&Node, usize> = IndexMap::new();
    for edge in edges {
        let (a, b) = edge.endpoints();
        let next = node_indices.len();
        node_indices.entry(a).or_insert(next);
        let next = node_indices.len();
        node_indices.entry(b).or_insert(next);
    }
    let mut components: UnionFind<usize> = UnionFind::new(node_indices.len());
    for edge in edges {
        let (a, b) = edge.endpoints();
        components.union(node_indices[a], node_indices[b]);
    }
    let mut labels: IndexMap<String, u32> = IndexMap::new();
    let mut component_labels: IndexMap<usize, u32> = IndexMap::new();
    for (node, index) in &node_indices {
        if let Node::Reaction(rxn_id) = node {
            let root = components.find(*index);
            let next = component_labels.len() as u32 + 1;
            let label = *component_labels.entry(root).or_insert(next);
            labels.insert(rxn_id.clone(), label);
        }
    }
    labels
}
