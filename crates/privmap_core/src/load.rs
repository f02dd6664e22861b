//! Batch load pipeline: staged records become graph nodes.
//!
//! Each node store is streamed, filtered through the "created" scope
//! [`DedupCache`], and cut into batches of `batch_size` rows. Every batch is
//! one write transaction. A batch rejected by a uniqueness constraint is
//! replayed one record per transaction so the new records in it still land;
//! the records that conflict are already in the graph and are counted, not
//! reported.

use crate::dedup::DedupCache;
use crate::error::{PrivmapError, Result, StoreError};
use crate::limiter::Limiter;
use crate::record::{DependencyRecord, FileRecord, NodeRecord, NodeSpec, PrincipalRecord, RunnerRecord};
use crate::staging::{StagingDir, Store};
use crate::store::{execute, GraphClient, Statement};
use crate::types::NodeKind;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Default rows per node-creation transaction.
pub const DEFAULT_BATCH_SIZE: usize = 2000;

/// Tunables for node loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Rows per transaction.
    pub batch_size: usize,
    /// Node kinds loading at the same time.
    pub max_in_flight: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight: 2,
        }
    }
}

/// Counters for one node kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindLoad {
    /// Well-formed records read.
    pub records: u64,
    /// Nodes created.
    pub created: u64,
    /// Records already present in the graph.
    pub conflicts: u64,
    /// Records already created earlier in this run.
    pub duplicates: u64,
    /// Lines that could not be parsed.
    pub malformed: u64,
    /// Batch transactions attempted.
    pub batches: u64,
}

/// Outcome of loading a staging directory.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Per-kind counters, for kinds that loaded.
    pub kinds: BTreeMap<NodeKind, KindLoad>,
    /// Kinds whose load stopped on an error, with the error text.
    pub failed: Vec<(NodeKind, String)>,
}

impl LoadReport {
    /// Nodes created across all kinds.
    pub fn created(&self) -> u64 {
        self.kinds.values().map(|k| k.created).sum()
    }

    /// Conflicts across all kinds.
    pub fn conflicts(&self) -> u64 {
        self.kinds.values().map(|k| k.conflicts).sum()
    }

    /// Malformed lines across all kinds.
    pub fn malformed(&self) -> u64 {
        self.kinds.values().map(|k| k.malformed).sum()
    }
}

/// Drives node creation for every node store of a staging directory.
pub struct LoadPipeline<'a> {
    client: &'a dyn GraphClient,
    created: &'a DedupCache,
    options: LoadOptions,
}

impl<'a> LoadPipeline<'a> {
    /// Builds a pipeline writing through `client`.
    ///
    /// `created` is the run's "created in store" scope; pass a fresh cache
    /// per run.
    pub fn new(client: &'a dyn GraphClient, created: &'a DedupCache, options: LoadOptions) -> Self {
        Self {
            client,
            created,
            options: LoadOptions {
                batch_size: options.batch_size.max(1),
                max_in_flight: options.max_in_flight.max(1),
            },
        }
    }

    /// Loads every node kind, at most `max_in_flight` at a time.
    ///
    /// A kind that fails is logged and recorded in [`LoadReport::failed`];
    /// the other kinds still load.
    pub fn load_all(&self, dir: &StagingDir) -> LoadReport {
        let limiter = Limiter::new(self.options.max_in_flight);
        let outcomes: Vec<(NodeKind, Result<KindLoad>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = NodeKind::ALL
                .into_iter()
                .map(|kind| {
                    let limiter = &limiter;
                    let handle = std::thread::Builder::new()
                        .name(format!("load-{}", kind.label().to_lowercase()))
                        .spawn_scoped(scope, move || {
                            let _permit = limiter.acquire();
                            self.load_kind(dir, kind)
                        });
                    (kind, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(kind, handle)| {
                    let outcome = match handle {
                        Ok(handle) => handle.join().unwrap_or_else(|_| {
                            Err(PrivmapError::Staging {
                                path: dir.path().join(kind.store_file()),
                                reason: "loader thread panicked".to_string(),
                            })
                        }),
                        Err(e) => Err(PrivmapError::Io(e)),
                    };
                    (kind, outcome)
                })
                .collect()
        });

        let mut report = LoadReport::default();
        for (kind, outcome) in outcomes {
            match outcome {
                Ok(load) => {
                    report.kinds.insert(kind, load);
                }
                Err(e) => {
                    error!(kind = %kind, error = %e, "node load failed");
                    report.failed.push((kind, e.to_string()));
                }
            }
        }
        info!(
            created = report.created(),
            conflicts = report.conflicts(),
            malformed = report.malformed(),
            failed = report.failed.len(),
            "node loading finished"
        );
        report
    }

    /// Loads one node kind from its store.
    pub fn load_kind(&self, dir: &StagingDir, kind: NodeKind) -> Result<KindLoad> {
        match kind {
            NodeKind::Exe | NodeKind::Dll | NodeKind::Directory => self.load_store::<FileRecord>(dir, kind),
            NodeKind::Principal => self.load_store::<PrincipalRecord>(dir, kind),
            NodeKind::Runner => self.load_store::<RunnerRecord>(dir, kind),
            NodeKind::Dependency => self.load_store::<DependencyRecord>(dir, kind),
        }
    }

    fn load_store<R: NodeRecord>(&self, dir: &StagingDir, kind: NodeKind) -> Result<KindLoad> {
        let store = Store::for_kind(kind);
        let mut load = KindLoad::default();
        let mut batch: Vec<(u64, NodeSpec)> = Vec::with_capacity(self.options.batch_size);

        for item in dir.records::<R>(store)? {
            let staged = match item {
                Ok(staged) => staged,
                Err(PrivmapError::MalformedRecord { line, reason, .. }) => {
                    warn!(store = store.file_name(), line, %reason, "skipping malformed record");
                    load.malformed += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            load.records += 1;

            if !self.created.try_claim(kind, staged.record.nid()) {
                debug!(kind = %kind, nid = %staged.record.nid(), "already created in this run");
                load.duplicates += 1;
                continue;
            }
            batch.push((staged.line, staged.record.to_node(kind)));
            if batch.len() >= self.options.batch_size {
                self.commit_batch(store, kind, &mut batch, &mut load)?;
            }
        }
        if !batch.is_empty() {
            self.commit_batch(store, kind, &mut batch, &mut load)?;
        }

        info!(
            kind = %kind,
            records = load.records,
            created = load.created,
            conflicts = load.conflicts,
            batches = load.batches,
            "kind loaded"
        );
        Ok(load)
    }

    fn commit_batch(
        &self,
        store: Store,
        kind: NodeKind,
        batch: &mut Vec<(u64, NodeSpec)>,
        load: &mut KindLoad,
    ) -> Result<()> {
        load.batches += 1;
        let number = load.batches as usize;
        let first_line = batch.first().map(|(line, _)| *line).unwrap_or(0);
        let last_line = batch.last().map(|(line, _)| *line).unwrap_or(0);
        let entries: Vec<(u64, NodeSpec)> = std::mem::take(batch);
        let rows: Vec<NodeSpec> = entries.iter().map(|(_, spec)| spec.clone()).collect();
        let size = rows.len() as u64;

        match execute(self.client, &Statement::CreateNodes { kind, rows }) {
            Ok(_) => {
                debug!(kind = %kind, batch = number, rows = size, "batch committed");
                load.created += size;
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                debug!(kind = %kind, batch = number, "batch hit existing nodes, retrying per record");
                self.replay(store, kind, number, entries, load)
            }
            Err(source) => Err(batch_error(store, number, first_line, last_line, source)),
        }
    }

    fn replay(
        &self,
        store: Store,
        kind: NodeKind,
        number: usize,
        entries: Vec<(u64, NodeSpec)>,
        load: &mut KindLoad,
    ) -> Result<()> {
        for (line, row) in entries {
            let nid = row.nid;
            match execute(self.client, &Statement::CreateNodes { kind, rows: vec![row] }) {
                Ok(_) => load.created += 1,
                Err(e) if e.is_conflict() => {
                    debug!(kind = %kind, nid = %nid, "node already exists");
                    load.conflicts += 1;
                }
                Err(source) => return Err(batch_error(store, number, line, line, source)),
            }
        }
        Ok(())
    }
}

fn batch_error(store: Store, batch: usize, first_line: u64, last_line: u64, source: StoreError) -> PrivmapError {
    PrivmapError::Batch {
        store: store.file_name().to_string(),
        batch,
        first_line,
        last_line,
        source,
    }
}
