//! Graph traversal over loaded nodes: path enumeration and DOT export.

use crate::content_id::ContentId;
use crate::types::EdgeKind;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// One directed edge.
pub type EdgeTriple = (ContentId, EdgeKind, ContentId);

/// In-memory adjacency list for algorithms requiring full graph view.
#[derive(Debug, Clone, Default)]
pub struct AdjacencyList {
    /// Forward edges: node -> [(kind, target)]
    forward: BTreeMap<ContentId, Vec<(EdgeKind, ContentId)>>,
    /// Backward edges: node -> [(kind, source)]
    backward: BTreeMap<ContentId, Vec<(EdgeKind, ContentId)>>,
    /// All nodes in the graph
    nodes: BTreeSet<ContentId>,
}

impl AdjacencyList {
    /// Build adjacency list from edges.
    pub fn from_edges(edges: impl IntoIterator<Item = EdgeTriple>) -> Self {
        let mut adj = Self::default();
        for (from, kind, to) in edges {
            adj.nodes.insert(from);
            adj.nodes.insert(to);
            adj.forward.entry(from).or_default().push((kind, to));
            adj.backward.entry(to).or_default().push((kind, from));
        }
        adj
    }

    /// Adds a node with no edges.
    pub fn add_node(&mut self, node: ContentId) {
        self.nodes.insert(node);
    }

    /// Get outgoing edges for a node.
    pub fn outgoing(&self, node: &ContentId) -> &[(EdgeKind, ContentId)] {
        self.forward.get(node).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Get incoming edges for a node.
    pub fn incoming(&self, node: &ContentId) -> &[(EdgeKind, ContentId)] {
        self.backward.get(node).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Get all nodes in the graph.
    pub fn nodes(&self) -> impl Iterator<Item = &ContentId> {
        self.nodes.iter()
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.forward.values().map(|v| v.len()).sum()
    }
}

/// Limits for reachability and path searches.
#[derive(Debug, Clone)]
pub struct TraversalConfig {
    /// Maximum number of edges in a path.
    pub max_depth: u32,
    /// Edge kinds to follow; empty follows every kind.
    pub follow: Vec<EdgeKind>,
    /// Stop after this many results.
    pub max_results: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            follow: Vec::new(),
            max_results: 100,
        }
    }
}

impl TraversalConfig {
    fn follows(&self, kind: EdgeKind) -> bool {
        self.follow.is_empty() || self.follow.contains(&kind)
    }
}

/// A path as the list of edges walked, in order.
pub type GraphPath = Vec<EdgeTriple>;

/// Enumerates simple paths from `from` to `to` of at most `max_depth` edges.
///
/// Paths are returned shortest first. The search deepens one edge at a
/// time, so when `max_results` cuts it short the paths kept are the
/// shortest ones.
pub fn paths_between(
    adjacency: &AdjacencyList,
    from: ContentId,
    to: ContentId,
    config: &TraversalConfig,
) -> Vec<GraphPath> {
    let mut search = PathSearch {
        adjacency,
        to,
        config,
        length: 0,
        on_path: HashSet::from([from]),
        current: Vec::new(),
        found: Vec::new(),
        deeper: false,
    };
    for length in 1..=config.max_depth as usize {
        if search.found.len() >= config.max_results {
            break;
        }
        search.length = length;
        search.deeper = false;
        search.walk(from);
        if !search.deeper {
            break;
        }
    }
    search.found
}

/// Depth-limited search for paths of exactly `length` edges.
struct PathSearch<'a> {
    adjacency: &'a AdjacencyList,
    to: ContentId,
    config: &'a TraversalConfig,
    length: usize,
    on_path: HashSet<ContentId>,
    current: GraphPath,
    found: Vec<GraphPath>,
    /// Some walk hit the length limit short of `to`.
    deeper: bool,
}

impl PathSearch<'_> {
    fn walk(&mut self, node: ContentId) {
        for &(kind, next) in self.adjacency.outgoing(&node) {
            if self.found.len() >= self.config.max_results {
                return;
            }
            if !self.config.follows(kind) || self.on_path.contains(&next) {
                continue;
            }
            self.current.push((node, kind, next));
            if next == self.to {
                if self.current.len() == self.length {
                    self.found.push(self.current.clone());
                }
            } else if self.current.len() < self.length {
                self.on_path.insert(next);
                self.walk(next);
                self.on_path.remove(&next);
            } else {
                self.deeper = true;
            }
            self.current.pop();
        }
    }
}

/// Export full graph to DOT format.
///
/// `labels` maps node ids to display text; unlabeled nodes show a short id.
pub fn adjacency_to_dot(adjacency: &AdjacencyList, labels: &HashMap<ContentId, String>) -> String {
    let mut output = String::from("digraph privmap {\n");
    output.push_str("  rankdir=LR;\n");
    output.push_str("  node [shape=box];\n\n");

    let mut ids: HashMap<&ContentId, String> = HashMap::new();
    for (i, node) in adjacency.nodes().enumerate() {
        let label = labels
            .get(node)
            .cloned()
            .unwrap_or_else(|| node.as_hex()[..12].to_string());
        ids.insert(node, format!("n{}", i));
        output.push_str(&format!(
            "  n{} [label=\"{}\"];\n",
            i,
            escape_dot_label(&label)
        ));
    }

    output.push('\n');

    for node in adjacency.nodes() {
        let from = &ids[node];
        for (kind, target) in adjacency.outgoing(node) {
            let to = &ids[target];
            output.push_str(&format!("  {} -> {} [label=\"{}\"];\n", from, to, kind));
        }
    }

    output.push_str("}\n");
    output
}

/// Escape special characters in DOT labels.
fn escape_dot_label(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
