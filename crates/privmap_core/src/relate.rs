//! Relationship constructor: the fixed sequence of edge-building steps run
//! after every node is loaded.
//!
//! Steps 1 to 4 are property joins evaluated by the store. Steps 5 and 6,
//! plus the explicit memberships of step 3, come from the edge-only staging
//! stores and are sent as chunks of (from nid, to nid) pairs. All edges are
//! merged, so running a step twice adds nothing.

use crate::content_id::ContentId;
use crate::error::{PrivmapError, Result};
use crate::record::{AceRecord, LinkRecord, MemberRecord};
use crate::staging::{StagingDir, Store};
use crate::store::{execute, Endpoint, GraphClient, JoinSpec, LinkSpec, Statement};
use crate::types::{AbusableRight, EdgeKind, LinkKind, NodeKind, INODE_LABEL};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Default server-side chunk size for joins and pair links.
pub const DEFAULT_EDGE_CHUNK: usize = 10_000;

/// Tunables for relationship construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelateOptions {
    /// Rows per server-side join batch, and pairs per link transaction.
    pub chunk: usize,
}

impl Default for RelateOptions {
    fn default() -> Self {
        Self {
            chunk: DEFAULT_EDGE_CHUNK,
        }
    }
}

/// The six steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    /// Directory CONTAINS file or directory.
    Containment,
    /// Principal OWNS file or directory.
    Ownership,
    /// Principal MEMBER_OF principal.
    Membership,
    /// HOSTS, RUNS_AS, EXECUTED_BY.
    RunnerWiring,
    /// Abusable-right edges from ACEs.
    Acl,
    /// IMPORTED_BY and FORWARDS.
    Dependencies,
}

impl Step {
    /// All steps in order.
    pub const ALL: [Step; 6] = [
        Step::Containment,
        Step::Ownership,
        Step::Membership,
        Step::RunnerWiring,
        Step::Acl,
        Step::Dependencies,
    ];

    /// Name for logs and reports.
    pub fn name(self) -> &'static str {
        match self {
            Step::Containment => "containment",
            Step::Ownership => "ownership",
            Step::Membership => "membership",
            Step::RunnerWiring => "runner-wiring",
            Step::Acl => "acl",
            Step::Dependencies => "dependencies",
        }
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// Which step.
    pub step: Step,
    /// Statements committed.
    pub statements: usize,
    /// Relationships created, as far as the client reports them.
    pub relationships: u64,
    /// Why the step stopped, if it did.
    pub error: Option<String>,
}

/// Outcome of every step.
#[derive(Debug, Clone, Default)]
pub struct RelateReport {
    /// One entry per step, in order.
    pub steps: Vec<StepOutcome>,
}

impl RelateReport {
    /// Steps that stopped on an error.
    pub fn failed(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| s.error.is_some())
    }

    /// Relationships created across all steps.
    pub fn relationships(&self) -> u64 {
        self.steps.iter().map(|s| s.relationships).sum()
    }
}

/// Builds every relationship for a loaded staging directory.
pub struct RelationshipConstructor<'a> {
    client: &'a dyn GraphClient,
    options: RelateOptions,
}

impl<'a> RelationshipConstructor<'a> {
    /// Creates a constructor writing through `client`.
    pub fn new(client: &'a dyn GraphClient, options: RelateOptions) -> Self {
        Self {
            client,
            options: RelateOptions {
                chunk: options.chunk.max(1),
            },
        }
    }

    /// Runs all six steps. A failing step is logged and the rest still run.
    pub fn run(&self, dir: &StagingDir) -> RelateReport {
        let mut report = RelateReport::default();
        for step in Step::ALL {
            report.steps.push(self.run_step(dir, step));
        }
        info!(
            relationships = report.relationships(),
            failed = report.failed().count(),
            "relationships built"
        );
        report
    }

    /// Runs one step, committing each statement as soon as it is built.
    pub fn run_step(&self, dir: &StagingDir, step: Step) -> StepOutcome {
        let mut outcome = StepOutcome {
            step,
            statements: 0,
            relationships: 0,
            error: None,
        };
        let result = self.emit(dir, step, |statement| self.apply(&statement, &mut outcome));
        match result {
            Ok(()) => info!(
                step = step.name(),
                statements = outcome.statements,
                relationships = outcome.relationships,
                "step complete"
            ),
            Err(e) => {
                error!(step = step.name(), error = %e, "step failed, continuing with the next");
                outcome.error = Some(e.to_string());
            }
        }
        outcome
    }

    fn apply(&self, statement: &Statement, outcome: &mut StepOutcome) -> Result<()> {
        debug!(statement = %statement.describe(), "relating");
        let summary = execute(self.client, statement)?;
        outcome.statements += 1;
        outcome.relationships += summary.relationships_created;
        Ok(())
    }

    /// Statements for one step, collected.
    pub fn statements(&self, dir: &StagingDir, step: Step) -> Result<Vec<Statement>> {
        let mut out = Vec::new();
        self.emit(dir, step, |statement| {
            out.push(statement);
            Ok(())
        })?;
        Ok(out)
    }

    /// Builds the statements for one step and hands each to `sink` in order.
    ///
    /// Edge stores are streamed; at most one chunk of pairs per link target
    /// is held in memory.
    fn emit<F>(&self, dir: &StagingDir, step: Step, mut sink: F) -> Result<()>
    where
        F: FnMut(Statement) -> Result<()>,
    {
        let join = |edge, from, to| {
            Statement::Join(JoinSpec {
                edge,
                from,
                to,
                chunk: self.options.chunk,
            })
        };
        let nid = |label: &'static str| Endpoint::new(label, "nid");
        let mut links = LinkBuffer::new(self.options.chunk);

        match step {
            Step::Containment => sink(join(
                EdgeKind::Contains,
                nid(NodeKind::Directory.label()),
                Endpoint::new(INODE_LABEL, "parent"),
            ))?,
            Step::Ownership => {
                sink(join(EdgeKind::Owns, nid("Principal"), Endpoint::new(INODE_LABEL, "owner")))?;
                sink(join(EdgeKind::Owns, nid("Principal"), Endpoint::new(INODE_LABEL, "group")))?;
            }
            Step::Membership => {
                sink(join(
                    EdgeKind::MemberOf,
                    Endpoint::new("Principal", "group"),
                    nid("Principal"),
                ))?;
                let target = (EdgeKind::MemberOf, "Principal", "Principal");
                for_each_edge(dir, Store::Members, |m: MemberRecord| {
                    match links.push(target, (m.member, m.group)) {
                        Some(full) => sink(full),
                        None => Ok(()),
                    }
                })?;
            }
            Step::RunnerWiring => {
                sink(join(EdgeKind::Hosts, nid("Directory"), Endpoint::new("Runner", "exe_parent")))?;
                sink(join(EdgeKind::RunsAs, Endpoint::new("Runner", "context"), nid("Principal")))?;
                sink(join(EdgeKind::ExecutedBy, nid("Exe"), Endpoint::new("Runner", "exe")))?;
            }
            Step::Acl => {
                let mut ignored = 0u64;
                for_each_edge(dir, Store::Aces, |ace: AceRecord| {
                    let Some(right) = AbusableRight::parse(&ace.right) else {
                        ignored += 1;
                        return Ok(());
                    };
                    let target = (EdgeKind::Acl(right), "Principal", ace.target_kind.label());
                    match links.push(target, (ace.principal, ace.target)) {
                        Some(full) => sink(full),
                        None => Ok(()),
                    }
                })?;
                debug!(ignored, "non-abusable rights left out");
            }
            Step::Dependencies => {
                let dep = NodeKind::Dependency.label();
                for_each_edge(dir, Store::Imports, |link: LinkRecord| {
                    let full = match link.kind {
                        LinkKind::Import => links
                            .push((EdgeKind::ImportedBy, dep, INODE_LABEL), (link.dependency, link.file)),
                        LinkKind::Forward => links
                            .push((EdgeKind::Forwards, INODE_LABEL, dep), (link.file, link.dependency)),
                    };
                    match full {
                        Some(full) => sink(full),
                        None => Ok(()),
                    }
                })?;
            }
        }

        for statement in links.drain() {
            sink(statement)?;
        }
        Ok(())
    }
}

/// Relationship type plus the endpoint labels a pair link connects.
type LinkTarget = (EdgeKind, &'static str, &'static str);

/// Pending pairs per link target, released one chunk at a time.
struct LinkBuffer {
    chunk: usize,
    pending: BTreeMap<LinkTarget, Vec<(ContentId, ContentId)>>,
}

impl LinkBuffer {
    fn new(chunk: usize) -> Self {
        Self {
            chunk: chunk.max(1),
            pending: BTreeMap::new(),
        }
    }

    /// Adds a pair; returns a link statement once its target's chunk is full.
    fn push(&mut self, target: LinkTarget, pair: (ContentId, ContentId)) -> Option<Statement> {
        let pairs = self.pending.entry(target).or_default();
        pairs.push(pair);
        if pairs.len() < self.chunk {
            return None;
        }
        let full = std::mem::take(pairs);
        Some(link(target, full))
    }

    /// Remaining partial chunks, in target order.
    fn drain(self) -> impl Iterator<Item = Statement> {
        self.pending
            .into_iter()
            .filter(|(_, pairs)| !pairs.is_empty())
            .map(|(target, pairs)| link(target, pairs))
    }
}

/// Duplicates inside a chunk are dropped; across chunks the merge absorbs them.
fn link((edge, from_label, to_label): LinkTarget, mut pairs: Vec<(ContentId, ContentId)>) -> Statement {
    pairs.sort_unstable();
    pairs.dedup();
    Statement::Link(LinkSpec {
        edge,
        from_label,
        to_label,
        pairs,
    })
}

/// Streams an edge-only store into `f`, skipping malformed lines.
fn for_each_edge<R, F>(dir: &StagingDir, store: Store, mut f: F) -> Result<()>
where
    R: DeserializeOwned,
    F: FnMut(R) -> Result<()>,
{
    for item in dir.records::<R>(store)? {
        match item {
            Ok(staged) => f(staged.record)?,
            Err(PrivmapError::MalformedRecord { line, reason, .. }) => {
                warn!(store = store.file_name(), line, %reason, "skipping malformed record");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
