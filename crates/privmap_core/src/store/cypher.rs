//! Cypher text for each [`Statement`].

use super::{Endpoint, JoinSpec, LinkSpec, RunSummary, Statement};
use crate::error::StoreError;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Query text plus the `$rows` parameter, if the statement carries rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CypherQuery {
    /// Cypher source.
    pub text: String,
    /// Value bound to `$rows`.
    pub rows: Option<Vec<BTreeMap<String, String>>>,
    /// The query runs server-side batches and returns one [`BatchOutcome`] row.
    pub batched: bool,
}

impl CypherQuery {
    fn plain(text: String) -> Self {
        Self {
            text,
            rows: None,
            batched: false,
        }
    }

    fn with_rows(text: String, rows: Vec<BTreeMap<String, String>>) -> Self {
        Self {
            text,
            rows: Some(rows),
            batched: false,
        }
    }

    fn batched(text: String) -> Self {
        Self {
            text,
            rows: None,
            batched: true,
        }
    }
}

/// The row returned by a batched statement.
///
/// A batch that fails inside `apoc.periodic.iterate` does not fail the
/// call itself; it only shows up here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BatchOutcome {
    /// Batches run.
    pub batches: i64,
    /// Outer rows processed.
    pub total: i64,
    /// Batches that failed.
    #[serde(rename = "failedBatches")]
    pub failed_batches: i64,
    /// Distinct error messages from failed batches.
    #[serde(default)]
    pub errors: Vec<String>,
    /// Relationships created across all batches.
    #[serde(rename = "relationshipsCreated", default)]
    pub relationships_created: i64,
}

impl BatchOutcome {
    /// Turns the outcome into a summary, or an error if any batch failed.
    pub fn into_summary(self) -> Result<RunSummary, StoreError> {
        if self.failed_batches > 0 {
            return Err(StoreError::Query(format!(
                "{} of {} batches failed: {}",
                self.failed_batches,
                self.batches,
                if self.errors.is_empty() {
                    "no message".to_string()
                } else {
                    self.errors.join("; ")
                }
            )));
        }
        Ok(RunSummary {
            nodes_created: 0,
            relationships_created: self.relationships_created.max(0) as u64,
        })
    }
}

/// Renders a statement.
///
/// Labels, property names and relationship types are fixed identifiers
/// chosen by this crate; every observed value travels as a parameter.
///
/// # Examples
///
/// ```
/// use privmap_core::store::{render, Statement};
///
/// let q = render(&Statement::UniqueConstraint { label: "Exe", property: "nid" });
/// assert!(q.text.contains("REQUIRE n.nid IS UNIQUE"));
/// ```
pub fn render(statement: &Statement) -> CypherQuery {
    match statement {
        Statement::UniqueConstraint { label, property } => CypherQuery::plain(format!(
            "CREATE CONSTRAINT {} IF NOT EXISTS FOR (n:{}) REQUIRE n.{} IS UNIQUE",
            schema_name(label, property, "unique"),
            label,
            property
        )),
        Statement::Index { label, property } => CypherQuery::plain(format!(
            "CREATE INDEX {} IF NOT EXISTS FOR (n:{}) ON (n.{})",
            schema_name(label, property, "idx"),
            label,
            property
        )),
        Statement::CreateNodes { kind, rows } => CypherQuery::with_rows(
            format!("UNWIND $rows AS row CREATE (n:{}) SET n = row", kind.labels().join(":")),
            rows.iter().map(|r| r.props.clone()).collect(),
        ),
        Statement::Join(join) => CypherQuery::batched(render_join(join)),
        Statement::Link(link) => render_link(link),
        Statement::DeleteAll { chunk } => {
            CypherQuery::batched(periodic("MATCH (n) RETURN n", "DETACH DELETE n", *chunk))
        }
        Statement::DropSchema => CypherQuery::plain("CALL apoc.schema.assert({}, {}, true)".to_string()),
    }
}

fn schema_name(label: &str, property: &str, suffix: &str) -> String {
    format!("{}_{}_{}", label.to_lowercase(), property, suffix)
}

/// Server-side batched join.
///
/// The outer query scans whichever side holds the reference (the side
/// whose property is not `nid`); the inner query looks the other side up
/// through its constraint or index.
fn render_join(join: &JoinSpec) -> String {
    let JoinSpec {
        edge,
        from,
        to,
        chunk,
    } = join;
    let (outer, inner) = if to.property != "nid" {
        (
            scan("b", to),
            format!(
                "MATCH (a:{} {{{}: b.{}}}) MERGE (a)-[:{}]->(b)",
                from.label, from.property, to.property, edge
            ),
        )
    } else {
        (
            scan("a", from),
            format!(
                "MATCH (b:{} {{{}: a.{}}}) MERGE (a)-[:{}]->(b)",
                to.label, to.property, from.property, edge
            ),
        )
    };
    periodic(&outer, &inner, *chunk)
}

/// `apoc.periodic.iterate` call returning the [`BatchOutcome`] columns.
fn periodic(outer: &str, inner: &str, chunk: usize) -> String {
    format!(
        "CALL apoc.periodic.iterate(\"{}\", \"{}\", {{batchSize: {}, parallel: false}}) \
         YIELD batches, total, failedBatches, errorMessages, updateStatistics \
         RETURN batches, total, failedBatches, keys(errorMessages) AS errors, \
         coalesce(updateStatistics.relationshipsCreated, 0) AS relationshipsCreated",
        outer, inner, chunk
    )
}

fn scan(var: &str, side: &Endpoint) -> String {
    format!(
        "MATCH ({v}:{}) WHERE {v}.{} IS NOT NULL RETURN {v}",
        side.label,
        side.property,
        v = var
    )
}

fn render_link(link: &LinkSpec) -> CypherQuery {
    let rows = link
        .pairs
        .iter()
        .map(|(from, to)| {
            BTreeMap::from([
                ("from".to_string(), from.as_hex()),
                ("to".to_string(), to.as_hex()),
            ])
        })
        .collect();
    CypherQuery::with_rows(
        format!(
            "UNWIND $rows AS row MATCH (a:{} {{nid: row.from}}) MATCH (b:{} {{nid: row.to}}) MERGE (a)-[:{}]->(b)",
            link.from_label, link.to_label, link.edge
        ),
        rows,
    )
}
