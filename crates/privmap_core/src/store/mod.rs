//! Graph store access: statements, transactions, and the clients that run them.
//!
//! Loaders build [`Statement`] values and run them inside a
//! [`WriteTransaction`]; they never see query text. [`BoltGraph`] renders
//! statements to Cypher for a Neo4j-compatible server, [`MemoryGraph`]
//! interprets them directly.

mod bolt;
mod cypher;
mod memory;

pub use bolt::{BoltConfig, BoltGraph};
pub use cypher::{render, BatchOutcome, CypherQuery};
pub use memory::{MemoryGraph, NodeView};

use crate::content_id::ContentId;
use crate::error::StoreError;
use crate::record::NodeSpec;
use crate::types::{EdgeKind, NodeKind};

/// A labeled property used as one side of a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Node label to match.
    pub label: &'static str,
    /// Property compared across the join.
    pub property: &'static str,
}

impl Endpoint {
    /// Shorthand constructor.
    pub const fn new(label: &'static str, property: &'static str) -> Self {
        Self { label, property }
    }
}

/// Connect every `from` node to every `to` node whose join properties are equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    /// Relationship type to merge.
    pub edge: EdgeKind,
    /// Edge source side.
    pub from: Endpoint,
    /// Edge target side.
    pub to: Endpoint,
    /// Server-side batch size.
    pub chunk: usize,
}

/// Connect explicit (from nid, to nid) pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpec {
    /// Relationship type to merge.
    pub edge: EdgeKind,
    /// Label of the source nodes.
    pub from_label: &'static str,
    /// Label of the target nodes.
    pub to_label: &'static str,
    /// Endpoint pairs.
    pub pairs: Vec<(ContentId, ContentId)>,
}

/// Every mutation the pipeline issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Uniqueness constraint on `label.property`.
    UniqueConstraint {
        /// Constrained label.
        label: &'static str,
        /// Constrained property.
        property: &'static str,
    },
    /// Secondary index on `label.property`.
    Index {
        /// Indexed label.
        label: &'static str,
        /// Indexed property.
        property: &'static str,
    },
    /// Create one node per row; fails as a whole on any uniqueness violation.
    CreateNodes {
        /// Kind (and therefore labels) of every row.
        kind: NodeKind,
        /// Nodes to create.
        rows: Vec<NodeSpec>,
    },
    /// Property join, merged edges.
    Join(JoinSpec),
    /// Explicit pairs, merged edges.
    Link(LinkSpec),
    /// Delete every node and relationship, in chunks.
    DeleteAll {
        /// Nodes per server-side batch.
        chunk: usize,
    },
    /// Drop every constraint and index.
    DropSchema,
}

impl Statement {
    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            Statement::UniqueConstraint { label, property } => {
                format!("unique {}.{}", label, property)
            }
            Statement::Index { label, property } => format!("index {}.{}", label, property),
            Statement::CreateNodes { kind, rows } => format!("create {} {}", rows.len(), kind),
            Statement::Join(join) => format!(
                "join {}.{} -[{}]-> {}.{}",
                join.from.label, join.from.property, join.edge, join.to.label, join.to.property
            ),
            Statement::Link(link) => format!(
                "link {} {} -[{}]-> {}",
                link.pairs.len(),
                link.from_label,
                link.edge,
                link.to_label
            ),
            Statement::DeleteAll { .. } => "delete all".to_string(),
            Statement::DropSchema => "drop schema".to_string(),
        }
    }
}

/// Counters reported by a client for one statement.
///
/// Clients that cannot observe counters report zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Nodes created.
    pub nodes_created: u64,
    /// Relationships created.
    pub relationships_created: u64,
}

/// An open write transaction.
pub trait WriteTransaction {
    /// Runs one statement.
    fn run(&mut self, statement: &Statement) -> Result<RunSummary, StoreError>;

    /// Makes every statement run so far durable.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discards every statement run so far.
    fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// A transactional graph endpoint.
pub trait GraphClient: Send + Sync {
    /// Opens a write transaction.
    fn begin(&self) -> Result<Box<dyn WriteTransaction + '_>, StoreError>;

    /// Where this client points, for logs.
    fn describe(&self) -> String;
}

/// Runs `statement` in its own transaction, rolling back on failure.
pub fn execute(client: &dyn GraphClient, statement: &Statement) -> Result<RunSummary, StoreError> {
    let mut txn = client.begin()?;
    match txn.run(statement) {
        Ok(summary) => {
            txn.commit()?;
            Ok(summary)
        }
        Err(e) => {
            if let Err(rollback) = txn.rollback() {
                tracing::debug!(error = %rollback, "rollback after failed statement also failed");
            }
            Err(e)
        }
    }
}
