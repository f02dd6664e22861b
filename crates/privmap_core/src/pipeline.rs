//! Run-level orchestration: `collect` produces a staging directory,
//! `process` takes one into a graph store.

use crate::collect::{
    AccessResolver, CollectOptions, CollectReport, Collector, HostEnumerator, ImageParser,
};
use crate::content_id::Identifier;
use crate::dedup::DedupCache;
use crate::error::Result;
use crate::load::{LoadOptions, LoadPipeline, LoadReport};
use crate::relate::{RelateOptions, RelateReport, RelationshipConstructor};
use crate::schema::{self, SchemaReport};
use crate::staging::{Manifest, StagingDir, StagingSet};
use crate::store::GraphClient;
use std::path::Path;
use tracing::{info, warn};

/// Collects every universe into a fresh staging directory at `out`.
///
/// The staging set is locked for the whole run and flushed before
/// returning; per-object failures are counted in the report, never returned.
pub fn collect(
    out: &Path,
    ident: &Identifier,
    options: &CollectOptions,
    host: &dyn HostEnumerator,
    access: &dyn AccessResolver,
    parser: &dyn ImageParser,
) -> Result<(Manifest, CollectReport)> {
    let staged = DedupCache::new();
    let staging = StagingSet::create(out, ident)?;
    let report = {
        let collector = Collector::new(ident, &staged, &staging, access, parser, options);
        collector.run(host)?
    };
    let manifest = staging.finish()?;
    info!(
        examined = report.examined,
        skipped = report.skipped,
        staged = staged.len(),
        "collection finished"
    );
    Ok((manifest, report))
}

/// What `process` does besides the three mandatory phases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Clear nodes, relationships, and schema first.
    pub drop_existing: bool,
    /// Node loading tunables.
    pub load: LoadOptions,
    /// Relationship tunables.
    pub relate: RelateOptions,
}

/// Outcome of the three phases.
#[derive(Debug, Clone, Default)]
pub struct ProcessReport {
    /// Schema declaration.
    pub schema: SchemaReport,
    /// Node loading.
    pub load: LoadReport,
    /// Relationship construction.
    pub relate: RelateReport,
}

impl ProcessReport {
    /// Returns true if any kind or step failed.
    pub fn has_failures(&self) -> bool {
        !self.load.failed.is_empty() || self.relate.failed().next().is_some()
    }
}

/// Schema, then nodes, then relationships.
///
/// Schema errors abort the run. Node and relationship failures are logged,
/// recorded in the report, and the run continues with degraded coverage.
pub fn process(
    client: &dyn GraphClient,
    dir: &StagingDir,
    ident: &Identifier,
    options: &ProcessOptions,
) -> Result<ProcessReport> {
    check_key(dir, ident)?;

    if options.drop_existing {
        schema::drop_all(client, options.relate.chunk)?;
    }

    info!(store = %client.describe(), dir = %dir.path().display(), "declaring schema");
    let schema = schema::declare(client)?;

    info!("loading nodes");
    let created = DedupCache::new();
    let load = LoadPipeline::new(client, &created, options.load).load_all(dir);

    info!("building relationships");
    let relate = RelationshipConstructor::new(client, options.relate).run(dir);

    Ok(ProcessReport {
        schema,
        load,
        relate,
    })
}

/// Warns if the staging directory was produced with a different hash key.
///
/// Ids from another key never collide with ours, so the load still works;
/// the graph just ends up with two disjoint id spaces.
fn check_key(dir: &StagingDir, ident: &Identifier) -> Result<()> {
    match dir.manifest()? {
        Some(manifest) if manifest.key_fingerprint != ident.fingerprint() => {
            warn!(
                staged = %manifest.key_fingerprint,
                configured = %ident.fingerprint(),
                "staging directory was collected with a different hash key"
            );
        }
        Some(manifest) => info!(run_id = %manifest.run_id, host = %manifest.host, "staging manifest"),
        None => warn!(dir = %dir.path().display(), "no manifest; collection may have been interrupted"),
    }
    Ok(())
}
