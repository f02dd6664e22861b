//! In-process graph that interprets statements directly.
//!
//! Used for offline processing and for tests. Uniqueness constraints are
//! enforced the way a server enforces them: only once declared, and a
//! violating `CreateNodes` fails as a whole.

use super::{GraphClient, JoinSpec, LinkSpec, RunSummary, Statement, WriteTransaction};
use crate::content_id::ContentId;
use crate::error::StoreError;
use crate::graph::{self, AdjacencyList, GraphPath, TraversalConfig};
use crate::types::EdgeKind;
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, BTreeSet, HashMap};

type SchemaKey = (String, String);
type Edge = (usize, EdgeKind, usize);

#[derive(Debug, Clone)]
struct StoredNode {
    labels: Vec<&'static str>,
    props: BTreeMap<String, String>,
}

impl StoredNode {
    fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| *l == label)
    }

    fn nid(&self) -> Option<ContentId> {
        self.props
            .get("nid")
            .and_then(|hex| ContentId::from_hex(hex).ok())
    }
}

#[derive(Debug, Clone, Default)]
struct GraphState {
    nodes: Vec<StoredNode>,
    edges: BTreeSet<Edge>,
    indexes: BTreeSet<SchemaKey>,
    /// Declared constraints and the values they have seen.
    unique: BTreeMap<SchemaKey, HashMap<String, usize>>,
}

/// Inverse of one applied change.
enum Undo {
    NodesFrom(usize),
    Edge(Edge),
    Constraint(SchemaKey),
    Index(SchemaKey),
    Restore(Box<GraphState>),
}

/// Read-only view of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeView {
    /// Labels, primary first.
    pub labels: Vec<&'static str>,
    /// Properties.
    pub props: BTreeMap<String, String>,
}

impl NodeView {
    /// The node's primary key.
    pub fn nid(&self) -> Option<ContentId> {
        self.props
            .get("nid")
            .and_then(|hex| ContentId::from_hex(hex).ok())
    }
}

/// Graph held in memory.
///
/// One write transaction at a time; `begin` blocks while another is open.
///
/// # Examples
///
/// ```
/// use privmap_core::store::{execute, MemoryGraph, Statement};
///
/// let graph = MemoryGraph::new();
/// execute(&graph, &Statement::UniqueConstraint { label: "Exe", property: "nid" }).unwrap();
/// assert_eq!(graph.constraint_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryGraph {
    state: Mutex<GraphState>,
}

impl MemoryGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }

    /// Number of relationships.
    pub fn edge_count(&self) -> usize {
        self.state.lock().edges.len()
    }

    /// Number of declared uniqueness constraints.
    pub fn constraint_count(&self) -> usize {
        self.state.lock().unique.len()
    }

    /// Number of declared indexes.
    pub fn index_count(&self) -> usize {
        self.state.lock().indexes.len()
    }

    /// Nodes carrying `label`.
    pub fn count_label(&self, label: &str) -> usize {
        self.state
            .lock()
            .nodes
            .iter()
            .filter(|n| n.has_label(label))
            .count()
    }

    /// Relationships of `kind`.
    pub fn count_edges(&self, kind: EdgeKind) -> usize {
        self.state
            .lock()
            .edges
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .count()
    }

    /// First node with `label` whose `property` equals `value`.
    pub fn find(&self, label: &str, property: &str, value: &str) -> Option<NodeView> {
        let state = self.state.lock();
        state
            .nodes
            .iter()
            .find(|n| n.has_label(label) && n.props.get(property).map(String::as_str) == Some(value))
            .map(|n| NodeView {
                labels: n.labels.clone(),
                props: n.props.clone(),
            })
    }

    /// Relationship kinds from node `from` to node `to` (by nid).
    pub fn edges_between(&self, from: ContentId, to: ContentId) -> Vec<EdgeKind> {
        let state = self.state.lock();
        let by_nid = nid_index(&state);
        let (Some(a), Some(b)) = (by_nid.get(&from), by_nid.get(&to)) else {
            return Vec::new();
        };
        state
            .edges
            .iter()
            .filter(|(f, _, t)| f == a && t == b)
            .map(|(_, k, _)| *k)
            .collect()
    }

    /// Snapshot of the graph as an adjacency list keyed by nid.
    pub fn adjacency(&self) -> AdjacencyList {
        let state = self.state.lock();
        let nids: Vec<Option<ContentId>> = state.nodes.iter().map(StoredNode::nid).collect();
        let mut adj = AdjacencyList::from_edges(state.edges.iter().filter_map(|(f, k, t)| {
            Some((nids[*f]?, *k, nids[*t]?))
        }));
        for nid in nids.into_iter().flatten() {
            adj.add_node(nid);
        }
        adj
    }

    /// Privilege paths from one node to another, shortest first.
    pub fn paths_between(
        &self,
        from: ContentId,
        to: ContentId,
        config: &TraversalConfig,
    ) -> Vec<GraphPath> {
        graph::paths_between(&self.adjacency(), from, to, config)
    }

    /// Display label per node: `Label: path-or-name`.
    pub fn display_labels(&self) -> HashMap<ContentId, String> {
        let state = self.state.lock();
        state
            .nodes
            .iter()
            .filter_map(|n| {
                let nid = n.nid()?;
                let primary = n.labels.first().copied().unwrap_or("Node");
                let text = n
                    .props
                    .get("path")
                    .or_else(|| n.props.get("name"))
                    .cloned()
                    .unwrap_or_else(|| nid.as_hex()[..12].to_string());
                Some((nid, format!("{}: {}", primary, text)))
            })
            .collect()
    }

    /// Renders the whole graph as Graphviz DOT.
    pub fn to_dot(&self) -> String {
        graph::adjacency_to_dot(&self.adjacency(), &self.display_labels())
    }
}

impl GraphClient for MemoryGraph {
    fn begin(&self) -> Result<Box<dyn WriteTransaction + '_>, StoreError> {
        Ok(Box::new(MemoryTxn {
            state: self.state.lock(),
            undo: Vec::new(),
            open: true,
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

fn nid_index(state: &GraphState) -> HashMap<ContentId, usize> {
    state
        .nodes
        .iter()
        .enumerate()
        .filter_map(|(i, n)| Some((n.nid()?, i)))
        .collect()
}

struct MemoryTxn<'g> {
    state: MutexGuard<'g, GraphState>,
    undo: Vec<Undo>,
    open: bool,
}

impl MemoryTxn<'_> {
    fn create_nodes(&mut self, rows: &[crate::record::NodeSpec]) -> Result<RunSummary, StoreError> {
        if rows.is_empty() {
            return Ok(RunSummary::default());
        }

        // Validate the whole batch before touching anything.
        let mut pending: BTreeMap<&SchemaKey, Vec<&str>> = BTreeMap::new();
        for row in rows {
            for (key, seen) in &self.state.unique {
                let (label, property) = key;
                if !row.kind.labels().contains(&label.as_str()) {
                    continue;
                }
                let Some(value) = row.props.get(property) else {
                    continue;
                };
                let batch = pending.entry(key).or_default();
                if seen.contains_key(value) || batch.contains(&value.as_str()) {
                    return Err(StoreError::ConstraintViolation(format!(
                        "Node already exists with label `{}` and property `{}` = '{}'",
                        label, property, value
                    )));
                }
                batch.push(value);
            }
        }

        let start = self.state.nodes.len();
        for (offset, row) in rows.iter().enumerate() {
            let index = start + offset;
            for ((label, property), seen) in self.state.unique.iter_mut() {
                if row.kind.labels().contains(&label.as_str()) {
                    if let Some(value) = row.props.get(property) {
                        seen.insert(value.clone(), index);
                    }
                }
            }
            self.state.nodes.push(StoredNode {
                labels: row.kind.labels().to_vec(),
                props: row.props.clone(),
            });
        }
        self.undo.push(Undo::NodesFrom(start));
        Ok(RunSummary {
            nodes_created: rows.len() as u64,
            relationships_created: 0,
        })
    }

    fn add_constraint(&mut self, label: &str, property: &str) -> Result<RunSummary, StoreError> {
        let key = (label.to_string(), property.to_string());
        if self.state.unique.contains_key(&key) {
            return Err(StoreError::SchemaAlreadyExists(format!(
                "constraint on :{}({}) already exists",
                label, property
            )));
        }
        let mut seen = HashMap::new();
        for (i, node) in self.state.nodes.iter().enumerate() {
            if !node.has_label(label) {
                continue;
            }
            if let Some(value) = node.props.get(property) {
                if seen.insert(value.clone(), i).is_some() {
                    return Err(StoreError::ConstraintViolation(format!(
                        "existing nodes share :{}({}) = '{}'",
                        label, property, value
                    )));
                }
            }
        }
        self.state.unique.insert(key.clone(), seen);
        self.undo.push(Undo::Constraint(key));
        Ok(RunSummary::default())
    }

    fn add_index(&mut self, label: &str, property: &str) -> Result<RunSummary, StoreError> {
        let key = (label.to_string(), property.to_string());
        if !self.state.indexes.insert(key.clone()) {
            return Err(StoreError::SchemaAlreadyExists(format!(
                "index on :{}({}) already exists",
                label, property
            )));
        }
        self.undo.push(Undo::Index(key));
        Ok(RunSummary::default())
    }

    fn merge_edge(&mut self, edge: Edge) -> u64 {
        if self.state.edges.insert(edge) {
            self.undo.push(Undo::Edge(edge));
            1
        } else {
            0
        }
    }

    fn join(&mut self, join: &JoinSpec) -> RunSummary {
        let mut sources: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, node) in self.state.nodes.iter().enumerate() {
            if node.has_label(join.from.label) {
                if let Some(value) = node.props.get(join.from.property) {
                    sources.entry(value.clone()).or_default().push(i);
                }
            }
        }

        let mut new_edges = Vec::new();
        for (i, node) in self.state.nodes.iter().enumerate() {
            if !node.has_label(join.to.label) {
                continue;
            }
            let Some(value) = node.props.get(join.to.property) else {
                continue;
            };
            for &source in sources.get(value).into_iter().flatten() {
                new_edges.push((source, join.edge, i));
            }
        }

        let created = new_edges.into_iter().map(|e| self.merge_edge(e)).sum();
        RunSummary {
            nodes_created: 0,
            relationships_created: created,
        }
    }

    fn link(&mut self, link: &LinkSpec) -> RunSummary {
        let mut from = HashMap::new();
        let mut to = HashMap::new();
        for (i, node) in self.state.nodes.iter().enumerate() {
            let Some(nid) = node.nid() else { continue };
            if node.has_label(link.from_label) {
                from.insert(nid, i);
            }
            if node.has_label(link.to_label) {
                to.insert(nid, i);
            }
        }

        let edges: Vec<Edge> = link
            .pairs
            .iter()
            .filter_map(|(a, b)| Some((*from.get(a)?, link.edge, *to.get(b)?)))
            .collect();
        let created = edges.into_iter().map(|e| self.merge_edge(e)).sum();
        RunSummary {
            nodes_created: 0,
            relationships_created: created,
        }
    }

    fn replace(&mut self, next: GraphState) {
        let previous = std::mem::replace(&mut *self.state, next);
        self.undo.push(Undo::Restore(Box::new(previous)));
    }

    fn undo_all(&mut self) {
        while let Some(undo) = self.undo.pop() {
            match undo {
                Undo::NodesFrom(start) => {
                    self.state.nodes.truncate(start);
                    for seen in self.state.unique.values_mut() {
                        seen.retain(|_, index| *index < start);
                    }
                }
                Undo::Edge(edge) => {
                    self.state.edges.remove(&edge);
                }
                Undo::Constraint(key) => {
                    self.state.unique.remove(&key);
                }
                Undo::Index(key) => {
                    self.state.indexes.remove(&key);
                }
                Undo::Restore(previous) => {
                    *self.state = *previous;
                }
            }
        }
    }
}

impl WriteTransaction for MemoryTxn<'_> {
    fn run(&mut self, statement: &Statement) -> Result<RunSummary, StoreError> {
        match statement {
            Statement::UniqueConstraint { label, property } => self.add_constraint(label, property),
            Statement::Index { label, property } => self.add_index(label, property),
            Statement::CreateNodes { rows, .. } => self.create_nodes(rows),
            Statement::Join(join) => Ok(self.join(join)),
            Statement::Link(link) => Ok(self.link(link)),
            Statement::DeleteAll { .. } => {
                let next = GraphState {
                    indexes: self.state.indexes.clone(),
                    unique: self
                        .state
                        .unique
                        .keys()
                        .map(|k| (k.clone(), HashMap::new()))
                        .collect(),
                    ..GraphState::default()
                };
                self.replace(next);
                Ok(RunSummary::default())
            }
            Statement::DropSchema => {
                let next = GraphState {
                    nodes: self.state.nodes.clone(),
                    edges: self.state.edges.clone(),
                    ..GraphState::default()
                };
                self.replace(next);
                Ok(RunSummary::default())
            }
        }
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.undo.clear();
        self.open = false;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        self.undo_all();
        self.open = false;
        Ok(())
    }
}

impl Drop for MemoryTxn<'_> {
    fn drop(&mut self) {
        if self.open {
            self.undo_all();
        }
    }
}
