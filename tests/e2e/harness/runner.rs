use super::assertions::{Assertion, Node};
use super::steps::ScenarioStep;
use super::workspace::TestWorkspace;
use anyhow::{anyhow, bail, Context, Result};
use privmap_core::collect::{AccessResolver, CollectOptions, ImageInfo, ImageParser, JsonInventory};
use privmap_core::normalize;
use privmap_core::store::MemoryGraph;
use privmap_core::{
    Ace, AceRecord, ContentId, DedupCache, DependencyRecord, FileRecord, Identifier, LinkKind,
    LinkRecord, LoadOptions, MemberRecord, NodeKind, PrincipalKind, PrincipalRecord,
    ProcessOptions, ProcessReport, RunnerKind, RunnerRecord, SecurityDescriptor, StagingDir,
    StagingSet, Store, TraversalConfig,
};
use std::fs;
use std::path::Path;

/// Executes scenarios against a real staging directory and an in-memory graph
pub struct ScenarioRunner {
    workspace: TestWorkspace,
    ident: Identifier,
    staged: DedupCache,
    staging: Option<StagingSet>,
    graph: MemoryGraph,
    report: Option<ProcessReport>,
    current_step: usize,
}

impl ScenarioRunner {
    /// Create a new runner over an empty workspace
    pub fn new() -> Result<Self> {
        Ok(Self {
            workspace: TestWorkspace::empty()?,
            ident: Identifier::default(),
            staged: DedupCache::new(),
            staging: None,
            graph: MemoryGraph::new(),
            report: None,
            current_step: 0,
        })
    }

    /// Get current step number
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Execute all steps in sequence
    pub fn execute(&mut self, steps: &[ScenarioStep]) -> Result<()> {
        for (i, step) in steps.iter().enumerate() {
            self.current_step = i;
            self.execute_step(step)
                .with_context(|| format!("Step {}: {:?}", i, step))?;
        }
        Ok(())
    }

    /// Execute a single step
    fn execute_step(&mut self, step: &ScenarioStep) -> Result<()> {
        match step {
            ScenarioStep::StageFile { kind, path } => self.handle_stage_file(*kind, path).map(|_| ()),
            ScenarioStep::StagePrincipal { name, group } => {
                self.handle_stage_principal(name, group.as_deref()).map(|_| ())
            }
            ScenarioStep::StageMember { member, group } => self.handle_stage_member(member, group),
            ScenarioStep::StageAce {
                principal,
                right,
                kind,
                target,
            } => self.handle_stage_ace(principal, right, *kind, target),
            ScenarioStep::StageRunner {
                kind,
                name,
                exe,
                context,
            } => self.handle_stage_runner(*kind, name, exe, context),
            ScenarioStep::StageLink {
                file,
                symbol,
                forward,
            } => self.handle_stage_link(file, symbol, *forward),
            ScenarioStep::FinishStaging => self.handle_finish_staging(),

            ScenarioStep::AppendRaw { store, bytes } => self.handle_append_raw(*store, bytes),

            ScenarioStep::HostFile { path, content } => {
                self.workspace.write_host_file(path, content)
            }
            ScenarioStep::Collect { inventory } => self.handle_collect(inventory),

            ScenarioStep::Process {
                batch_size,
                drop_existing,
            } => self.handle_process(*batch_size, *drop_existing),

            ScenarioStep::Assert { assertion } => self.handle_assertion(assertion),
        }
    }

    // ===== Staging handlers =====

    /// Open staging set, creating it on first use.
    ///
    /// Creating truncates every store, so staging after a finish starts over.
    fn staging(&mut self) -> Result<&StagingSet> {
        if self.staging.is_none() {
            let set = StagingSet::create(&self.workspace.staging_dir(), &self.ident)?;
            self.staged = DedupCache::new();
            self.staging = Some(set);
        }
        self.staging
            .as_ref()
            .ok_or_else(|| anyhow!("staging set not open"))
    }

    fn append<R: serde::Serialize>(&mut self, store: Store, record: &R) -> Result<()> {
        self.staging()?.append(store, record)?;
        Ok(())
    }

    fn handle_stage_file(&mut self, kind: NodeKind, raw: &str) -> Result<ContentId> {
        if !kind.is_securable() {
            bail!("{} is not a file object kind", kind);
        }
        self.staging()?;
        let path = normalize::normalize_path(raw);
        let nid = self.ident.identify(&path);
        if !self.staged.try_claim(kind, nid) {
            return Ok(nid);
        }
        let parent_path = normalize::parent_of(&path);
        let record = FileRecord {
            nid,
            name: normalize::file_name(&path).to_string(),
            parent: parent_path.as_deref().map(|p| self.ident.identify(p)),
            parent_path: parent_path.unwrap_or_default(),
            path,
            owner: None,
            group: None,
            imphash: None,
        };
        self.append(Store::for_kind(kind), &record)?;
        Ok(nid)
    }

    fn handle_stage_principal(&mut self, raw: &str, group: Option<&str>) -> Result<ContentId> {
        self.staging()?;
        let name = normalize::canonical_principal(raw);
        let nid = self.ident.identify(&name);
        if !self.staged.try_claim(NodeKind::Principal, nid) {
            return Ok(nid);
        }
        let record = PrincipalRecord {
            nid,
            name,
            kind: if group.is_some() {
                PrincipalKind::User
            } else {
                PrincipalKind::Unknown
            },
            group: group.map(|g| self.ident.principal_id(g)),
        };
        self.append(Store::Principals, &record)?;
        Ok(nid)
    }

    fn handle_stage_member(&mut self, member: &str, group: &str) -> Result<()> {
        let member = self.handle_stage_principal(member, None)?;
        let group = self.handle_stage_principal(group, None)?;
        self.append(Store::Members, &MemberRecord { member, group })
    }

    fn handle_stage_ace(
        &mut self,
        principal: &str,
        right: &str,
        kind: NodeKind,
        target: &str,
    ) -> Result<()> {
        let principal_id = self.handle_stage_principal(principal, None)?;
        let record = AceRecord {
            principal: principal_id,
            principal_name: normalize::canonical_principal(principal),
            right: right.to_string(),
            target: self.ident.path_id(target),
            target_kind: kind,
        };
        self.append(Store::Aces, &record)
    }

    fn handle_stage_runner(
        &mut self,
        kind: RunnerKind,
        name: &str,
        exe: &str,
        context: &str,
    ) -> Result<()> {
        let exe_id = self.handle_stage_file(NodeKind::Exe, exe)?;
        let context_id = self.handle_stage_principal(context, None)?;

        let name = normalize::normalize_name(&format!("{}:{}", kind.as_str(), name));
        let nid = self.ident.identify(&name);
        if !self.staged.try_claim(NodeKind::Runner, nid) {
            return Ok(());
        }
        let exe_path = normalize::normalize_path(exe);
        let record = RunnerRecord {
            nid,
            name,
            kind,
            args: String::new(),
            exe_parent: normalize::parent_of(&exe_path).map(|p| self.ident.identify(&p)),
            exe_path,
            exe: exe_id,
            context_name: normalize::canonical_principal(context),
            context: context_id,
            run_level: None,
        };
        self.append(Store::Runners, &record)
    }

    fn handle_stage_link(&mut self, file: &str, symbol: &str, forward: bool) -> Result<()> {
        self.staging()?;
        let name = normalize::normalize_name(symbol);
        let dependency = self.ident.identify(&name);
        if self.staged.try_claim(NodeKind::Dependency, dependency) {
            self.append(
                Store::Deps,
                &DependencyRecord {
                    nid: dependency,
                    name,
                },
            )?;
        }
        let record = LinkRecord {
            file: self.ident.path_id(file),
            kind: if forward { LinkKind::Forward } else { LinkKind::Import },
            dependency,
        };
        self.append(Store::Imports, &record)
    }

    fn handle_finish_staging(&mut self) -> Result<()> {
        match self.staging.take() {
            Some(set) => {
                set.finish()?;
                Ok(())
            }
            None => bail!("no staging set open"),
        }
    }

    fn handle_append_raw(&mut self, store: Store, bytes: &[u8]) -> Result<()> {
        if let Some(set) = self.staging.take() {
            set.finish()?;
        }
        self.workspace.append_raw(store, bytes)
    }

    // ===== Collection =====

    fn handle_collect(&mut self, inventory: &JsonInventory) -> Result<()> {
        if self.staging.is_some() {
            bail!("staging set already open; finish it before collecting");
        }
        let inventory = on_host(inventory, &self.workspace.host_root().to_string_lossy());
        let options = CollectOptions {
            roots: vec![self.workspace.host_root()],
            workers: 4,
            ..CollectOptions::default()
        };
        let (_, report) = privmap_core::collect(
            &self.workspace.staging_dir(),
            &self.ident,
            &options,
            &inventory,
            &FixedAccess,
            &TextImageParser,
        )?;
        if !report.failed_universes.is_empty() {
            bail!("universes failed: {:?}", report.failed_universes);
        }
        Ok(())
    }

    // ===== Loading =====

    fn handle_process(&mut self, batch_size: usize, drop_existing: bool) -> Result<()> {
        if let Some(set) = self.staging.take() {
            set.finish()?;
        }
        let dir = StagingDir::open(&self.workspace.staging_dir())?;
        let options = ProcessOptions {
            drop_existing,
            load: LoadOptions {
                batch_size,
                ..LoadOptions::default()
            },
            ..ProcessOptions::default()
        };
        let report = privmap_core::process(&self.graph, &dir, &self.ident, &options)?;
        self.report = Some(report);
        Ok(())
    }

    // ===== Assertions =====

    fn handle_assertion(&self, assertion: &Assertion) -> Result<()> {
        match assertion {
            Assertion::NodeCount(n) => {
                let actual = self.graph.node_count();
                if actual != *n {
                    bail!("Expected {} nodes, found {}", n, actual);
                }
            }
            Assertion::LabelCount { label, count } => {
                let actual = self.graph.count_label(label);
                if actual != *count {
                    bail!("Expected {} {} nodes, found {}", count, label, actual);
                }
            }
            Assertion::EdgeCount { kind, count } => {
                let actual = self.graph.count_edges(*kind);
                if actual != *count {
                    bail!("Expected {} {} edges, found {}", count, kind, actual);
                }
            }
            Assertion::EdgeExists { from, kind, to } => {
                let edges = self.graph.edges_between(self.id(from), self.id(to));
                if !edges.contains(kind) {
                    bail!("No {} edge from {:?} to {:?} (found {:?})", kind, from, to, edges);
                }
            }
            Assertion::NoEdge { from, to } => {
                let edges = self.graph.edges_between(self.id(from), self.id(to));
                if !edges.is_empty() {
                    bail!("Expected no edge from {:?} to {:?}, found {:?}", from, to, edges);
                }
            }
            Assertion::PathCount { from, to, count } => {
                let actual = self.paths(from, to).len();
                if actual != *count {
                    bail!("Expected {} paths from {:?} to {:?}, found {}", count, from, to, actual);
                }
            }
            Assertion::ShortestPath { from, to, kinds } => {
                let paths = self.paths(from, to);
                let shortest = paths
                    .first()
                    .ok_or_else(|| anyhow!("No path from {:?} to {:?}", from, to))?;
                let actual: Vec<_> = shortest.iter().map(|(_, kind, _)| *kind).collect();
                if &actual != kinds {
                    bail!("Expected shortest path {:?}, found {:?}", kinds, actual);
                }
            }
            Assertion::Created(n) => {
                let actual = self.report()?.load.created();
                if actual != *n {
                    bail!("Expected {} created nodes, found {}", n, actual);
                }
            }
            Assertion::Conflicts(n) => {
                let actual = self.report()?.load.conflicts();
                if actual != *n {
                    bail!("Expected {} conflicts, found {}", n, actual);
                }
            }
            Assertion::Malformed(n) => {
                let actual = self.report()?.load.malformed();
                if actual != *n {
                    bail!("Expected {} malformed lines, found {}", n, actual);
                }
            }
            Assertion::NoFailures => {
                let report = self.report()?;
                if report.has_failures() {
                    bail!(
                        "Process reported failures: kinds {:?}, steps {:?}",
                        report.load.failed,
                        report.relate.failed().collect::<Vec<_>>()
                    );
                }
            }
            Assertion::Custom(check) => check(&self.graph, self.report.as_ref())?,
        }
        Ok(())
    }

    fn id(&self, node: &Node) -> ContentId {
        node.id(&self.ident, &self.workspace.host_root())
    }

    fn paths(&self, from: &Node, to: &Node) -> Vec<privmap_core::GraphPath> {
        self.graph
            .paths_between(self.id(from), self.id(to), &TraversalConfig::default())
    }

    fn report(&self) -> Result<&ProcessReport> {
        self.report
            .as_ref()
            .ok_or_else(|| anyhow!("No process step has run"))
    }
}

/// Replaces `{host}` in inventory paths with the workspace host root.
fn on_host(inventory: &JsonInventory, host: &str) -> JsonInventory {
    let mut inventory = inventory.clone();
    let fix = |s: &mut String| *s = s.replace("{host}", host);
    for service in &mut inventory.services {
        fix(&mut service.command_line);
    }
    for task in &mut inventory.tasks {
        fix(&mut task.path);
    }
    for autorun in &mut inventory.autoruns {
        fix(&mut autorun.command_line);
    }
    for process in &mut inventory.processes {
        fix(&mut process.exe_path);
    }
    inventory
}

/// Every collected object is owned by SYSTEM and writable by BUILTIN\Users.
struct FixedAccess;

impl AccessResolver for FixedAccess {
    fn security_descriptor(&self, _path: &Path) -> privmap_core::Result<SecurityDescriptor> {
        Ok(SecurityDescriptor {
            owner: Some("S-1-5-18".into()),
            group: None,
            aces: vec![Ace::Basic {
                trustee: "S-1-5-32-545".into(),
                rights: vec!["READ".into(), "GENERIC_WRITE".into()],
            }],
        })
    }

    fn resolve_name(&self, raw: &str) -> String {
        match raw {
            "S-1-5-18" => "SYSTEM".into(),
            "S-1-5-32-545" => r"BUILTIN\Users".into(),
            other => other.into(),
        }
    }
}

/// Reads `import <symbol>` and `forward <symbol>` lines from host files.
struct TextImageParser;

impl ImageParser for TextImageParser {
    fn parse(&self, path: &Path) -> privmap_core::Result<ImageInfo> {
        let text = fs::read_to_string(path)?;
        let mut info = ImageInfo::default();
        for line in text.lines() {
            if let Some(symbol) = line.strip_prefix("import ") {
                info.imports.push(symbol.to_string());
            } else if let Some(symbol) = line.strip_prefix("forward ") {
                info.forwards.push(symbol.to_string());
            }
        }
        Ok(info)
    }
}
