//! Schema manager: constraints and indexes declared before any node is loaded.

use crate::error::{Result, StoreError};
use crate::store::{execute, GraphClient, Statement};
use crate::types::{NodeKind, INODE_LABEL};
use tracing::{debug, info};

/// Properties the relationship joins look up, per label.
const JOIN_INDEXES: &[(&str, &str)] = &[
    (INODE_LABEL, "parent"),
    (INODE_LABEL, "owner"),
    (INODE_LABEL, "group"),
    ("Principal", "group"),
    ("Runner", "exe"),
    ("Runner", "exe_parent"),
    ("Runner", "exe_path"),
    ("Runner", "context"),
];

/// Outcome of declaring the schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaReport {
    /// Rules created by this call.
    pub created: usize,
    /// Rules that were already present.
    pub existing: usize,
}

/// Every schema statement, constraints first.
///
/// Each primary label gets a uniqueness constraint on `nid` and on its
/// identity property. `INode` gets one on `nid` so the three file labels
/// share a key space.
pub fn statements() -> Vec<Statement> {
    let mut out = Vec::new();
    for kind in NodeKind::ALL {
        out.push(Statement::UniqueConstraint {
            label: kind.label(),
            property: "nid",
        });
        out.push(Statement::UniqueConstraint {
            label: kind.label(),
            property: kind.identity_property(),
        });
    }
    out.push(Statement::UniqueConstraint {
        label: INODE_LABEL,
        property: "nid",
    });
    for &(label, property) in JOIN_INDEXES {
        out.push(Statement::Index { label, property });
    }
    out
}

/// Declares every constraint and index, one transaction each.
///
/// A rule that already exists counts as success; any other store error
/// stops the declaration and is returned.
pub fn declare(client: &dyn GraphClient) -> Result<SchemaReport> {
    let mut report = SchemaReport::default();
    for statement in statements() {
        match execute(client, &statement) {
            Ok(_) => report.created += 1,
            Err(StoreError::SchemaAlreadyExists(reason)) => {
                debug!(rule = %statement.describe(), %reason, "schema rule already present");
                report.existing += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
    info!(
        created = report.created,
        existing = report.existing,
        store = %client.describe(),
        "schema declared"
    );
    Ok(report)
}

/// Deletes every node and relationship, then every schema rule.
pub fn drop_all(client: &dyn GraphClient, chunk: usize) -> Result<()> {
    info!(store = %client.describe(), "clearing graph");
    execute(client, &Statement::DeleteAll { chunk })?;
    execute(client, &Statement::DropSchema)?;
    Ok(())
}
