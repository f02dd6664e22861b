use anyhow::Result;
use privmap_core::store::MemoryGraph;
use privmap_core::{ContentId, EdgeKind, Identifier, ProcessReport};
use std::path::Path;

/// A node named the way a user would name it
#[derive(Debug, Clone)]
pub enum Node {
    Principal(String),
    Path(String),
    /// Path relative to the workspace host root
    Host(String),
    Runner(String),
    Dep(String),
}

impl Node {
    pub fn principal(name: &str) -> Self {
        Self::Principal(name.to_string())
    }

    pub fn path(path: &str) -> Self {
        Self::Path(path.to_string())
    }

    pub fn host(path: &str) -> Self {
        Self::Host(path.to_string())
    }

    pub fn runner(name: &str) -> Self {
        Self::Runner(name.to_string())
    }

    pub fn dep(name: &str) -> Self {
        Self::Dep(name.to_string())
    }

    /// Content id under `ident`
    pub fn id(&self, ident: &Identifier, host_root: &Path) -> ContentId {
        match self {
            Self::Principal(name) => ident.principal_id(name),
            Self::Path(path) => ident.path_id(path),
            Self::Host(path) => ident.path_id(&host_root.join(path).to_string_lossy()),
            Self::Runner(name) | Self::Dep(name) => ident.name_id(name),
        }
    }
}

/// Declarative assertions on the loaded graph and the last load report
pub enum Assertion {
    // Graph shape
    NodeCount(usize),
    LabelCount {
        label: String,
        count: usize,
    },
    EdgeCount {
        kind: EdgeKind,
        count: usize,
    },
    EdgeExists {
        from: Node,
        kind: EdgeKind,
        to: Node,
    },
    NoEdge {
        from: Node,
        to: Node,
    },

    // Paths
    PathCount {
        from: Node,
        to: Node,
        count: usize,
    },
    ShortestPath {
        from: Node,
        to: Node,
        kinds: Vec<EdgeKind>,
    },

    // Last process report
    Created(u64),
    Conflicts(u64),
    Malformed(u64),
    NoFailures,

    // Custom
    Custom(Box<dyn Fn(&MemoryGraph, Option<&ProcessReport>) -> Result<()> + Send + Sync>),
}

impl std::fmt::Debug for Assertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NodeCount(n) => write!(f, "NodeCount({})", n),
            Self::LabelCount { label, count } => {
                write!(f, "LabelCount {{ label: {:?}, count: {} }}", label, count)
            }
            Self::EdgeCount { kind, count } => {
                write!(f, "EdgeCount {{ kind: {}, count: {} }}", kind, count)
            }
            Self::EdgeExists { from, kind, to } => {
                write!(f, "EdgeExists {{ from: {:?}, kind: {}, to: {:?} }}", from, kind, to)
            }
            Self::NoEdge { from, to } => write!(f, "NoEdge {{ from: {:?}, to: {:?} }}", from, to),
            Self::PathCount { from, to, count } => {
                write!(f, "PathCount {{ from: {:?}, to: {:?}, count: {} }}", from, to, count)
            }
            Self::ShortestPath { from, to, kinds } => {
                write!(f, "ShortestPath {{ from: {:?}, to: {:?}, kinds: {:?} }}", from, to, kinds)
            }
            Self::Created(n) => write!(f, "Created({})", n),
            Self::Conflicts(n) => write!(f, "Conflicts({})", n),
            Self::Malformed(n) => write!(f, "Malformed({})", n),
            Self::NoFailures => write!(f, "NoFailures"),
            Self::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}
