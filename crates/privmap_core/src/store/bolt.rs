//! Neo4j-compatible server over the Bolt protocol.

use super::cypher::{render, BatchOutcome, CypherQuery};
use super::{GraphClient, RunSummary, Statement, WriteTransaction};
use crate::error::StoreError;
use neo4rs::{query, BoltType, ConfigBuilder, Graph, Txn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// Connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BoltConfig {
    /// URI scheme: `bolt`, `bolt+s`, `neo4j`, `neo4j+s`.
    pub scheme: String,
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: String,
    /// Target database.
    pub database: String,
}

impl Default for BoltConfig {
    fn default() -> Self {
        Self {
            scheme: "bolt".to_string(),
            host: "localhost".to_string(),
            port: 7687,
            user: "neo4j".to_string(),
            password: String::new(),
            database: "neo4j".to_string(),
        }
    }
}

impl BoltConfig {
    /// `scheme://host:port`.
    pub fn uri(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Blocking client for a Bolt server.
///
/// Owns a small tokio runtime; every call blocks the calling thread until
/// the server answers, so loader threads can share one client.
pub struct BoltGraph {
    graph: Graph,
    runtime: Runtime,
    uri: String,
}

impl std::fmt::Debug for BoltGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoltGraph").field("uri", &self.uri).finish()
    }
}

impl BoltGraph {
    /// Connects and authenticates.
    pub fn connect(config: &BoltConfig) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("bolt-io")
            .enable_all()
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let uri = config.uri();
        let neo_config = ConfigBuilder::default()
            .uri(uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_str())
            .db(config.database.as_str())
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let graph = runtime
            .block_on(Graph::connect(neo_config))
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        info!(uri = %uri, database = %config.database, "connected to graph store");

        Ok(Self {
            graph,
            runtime,
            uri,
        })
    }
}

impl GraphClient for BoltGraph {
    fn begin(&self) -> Result<Box<dyn WriteTransaction + '_>, StoreError> {
        let txn = self
            .runtime
            .block_on(self.graph.start_txn())
            .map_err(|e| classify(&e.to_string()))?;
        Ok(Box::new(BoltTxn {
            txn: Some(txn),
            runtime: &self.runtime,
        }))
    }

    fn describe(&self) -> String {
        self.uri.clone()
    }
}

struct BoltTxn<'g> {
    txn: Option<Txn>,
    runtime: &'g Runtime,
}

impl BoltTxn<'_> {
    fn open(&mut self) -> Result<&mut Txn, StoreError> {
        self.txn
            .as_mut()
            .ok_or_else(|| StoreError::Transaction("transaction already closed".to_string()))
    }
}

impl WriteTransaction for BoltTxn<'_> {
    fn run(&mut self, statement: &Statement) -> Result<RunSummary, StoreError> {
        let CypherQuery { text, rows, batched } = render(statement);
        debug!(statement = %statement.describe(), "running");
        let mut q = query(&text);
        if let Some(rows) = rows {
            q = q.param("rows", bolt_rows(rows));
        }
        let runtime = self.runtime;
        let txn = self.open()?;
        if !batched {
            runtime
                .block_on(txn.run(q))
                .map_err(|e| classify(&e.to_string()))?;
            // Bolt does not hand back counters through `run`.
            return Ok(RunSummary::default());
        }

        let outcomes = runtime
            .block_on(async move {
                let mut stream = txn.execute(q).await?;
                let mut outcomes = Vec::new();
                while let Some(row) = stream.next(txn.handle()).await? {
                    outcomes.push(row);
                }
                Ok::<_, neo4rs::Error>(outcomes)
            })
            .map_err(|e| classify(&e.to_string()))?;

        let mut summary = RunSummary::default();
        for row in outcomes {
            let outcome: BatchOutcome = row
                .to()
                .map_err(|e| StoreError::Query(format!("unreadable batch outcome: {e}")))?;
            debug!(batches = outcome.batches, total = outcome.total, "batched statement finished");
            summary.relationships_created += outcome.into_summary()?.relationships_created;
        }
        Ok(summary)
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let txn = self
            .txn
            .take()
            .ok_or_else(|| StoreError::Transaction("transaction already closed".to_string()))?;
        self.runtime
            .block_on(txn.commit())
            .map_err(|e| StoreError::Transaction(e.to_string()))
    }

    fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        let Some(txn) = self.txn.take() else {
            return Ok(());
        };
        self.runtime
            .block_on(txn.rollback())
            .map_err(|e| StoreError::Transaction(e.to_string()))
    }
}

impl Drop for BoltTxn<'_> {
    fn drop(&mut self) {
        if let Some(txn) = self.txn.take() {
            if let Err(e) = self.runtime.block_on(txn.rollback()) {
                debug!(error = %e, "rollback of abandoned transaction failed");
            }
        }
    }
}

fn bolt_rows(rows: Vec<std::collections::BTreeMap<String, String>>) -> Vec<HashMap<String, BoltType>> {
    rows.into_iter()
        .map(|row| row.into_iter().map(|(k, v)| (k, v.into())).collect())
        .collect()
}

/// Maps a server error message onto [`StoreError`].
fn classify(message: &str) -> StoreError {
    let lower = message.to_lowercase();
    if message.contains("ConstraintValidationFailed") || lower.contains("already exists with label") {
        StoreError::ConstraintViolation(message.to_string())
    } else if message.contains("EquivalentSchemaRuleAlreadyExists") || message.contains("AlreadyExists") {
        StoreError::SchemaAlreadyExists(message.to_string())
    } else if lower.contains("connection") || lower.contains("io error") || lower.contains("broken pipe") {
        StoreError::Connection(message.to_string())
    } else {
        StoreError::Query(message.to_string())
    }
}
