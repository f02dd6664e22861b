use super::assertions::{Assertion, Node};
use super::runner::ScenarioRunner;
use super::steps::ScenarioStep;
use privmap_core::collect::JsonInventory;
use privmap_core::{EdgeKind, NodeKind, RunnerKind, Store, DEFAULT_BATCH_SIZE};

/// Fluent DSL for building test scenarios
pub struct Scenario {
    name: String,
    steps: Vec<ScenarioStep>,
}

impl Scenario {
    /// Create a new scenario with the given name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            steps: Vec::new(),
        }
    }

    // ===== Staging =====

    /// Stage an executable at `path`
    pub fn stage_exe(self, path: &str) -> Self {
        self.stage_file(NodeKind::Exe, path)
    }

    /// Stage a library at `path`
    pub fn stage_dll(self, path: &str) -> Self {
        self.stage_file(NodeKind::Dll, path)
    }

    /// Stage a directory at `path`
    pub fn stage_dir(self, path: &str) -> Self {
        self.stage_file(NodeKind::Directory, path)
    }

    fn stage_file(mut self, kind: NodeKind, path: &str) -> Self {
        self.steps.push(ScenarioStep::StageFile {
            kind,
            path: path.to_string(),
        });
        self
    }

    /// Stage a principal with no group hint
    pub fn stage_principal(mut self, name: &str) -> Self {
        self.steps.push(ScenarioStep::StagePrincipal {
            name: name.to_string(),
            group: None,
        });
        self
    }

    /// Stage a principal whose record carries a group hint
    pub fn stage_principal_in(mut self, name: &str, group: &str) -> Self {
        self.steps.push(ScenarioStep::StagePrincipal {
            name: name.to_string(),
            group: Some(group.to_string()),
        });
        self
    }

    /// Stage a membership observation
    pub fn stage_member(mut self, member: &str, group: &str) -> Self {
        self.steps.push(ScenarioStep::StageMember {
            member: member.to_string(),
            group: group.to_string(),
        });
        self
    }

    /// Stage one ACE right on a file object
    pub fn stage_ace(mut self, principal: &str, right: &str, kind: NodeKind, target: &str) -> Self {
        self.steps.push(ScenarioStep::StageAce {
            principal: principal.to_string(),
            right: right.to_string(),
            kind,
            target: target.to_string(),
        });
        self
    }

    /// Stage a runner launching `exe` as `context`
    pub fn stage_runner(mut self, kind: RunnerKind, name: &str, exe: &str, context: &str) -> Self {
        self.steps.push(ScenarioStep::StageRunner {
            kind,
            name: name.to_string(),
            exe: exe.to_string(),
            context: context.to_string(),
        });
        self
    }

    /// Stage an import of `symbol` by `file`, plus the dependency node
    pub fn stage_import(mut self, file: &str, symbol: &str) -> Self {
        self.steps.push(ScenarioStep::StageLink {
            file: file.to_string(),
            symbol: symbol.to_string(),
            forward: false,
        });
        self
    }

    /// Stage a forwarded export from `file` to `symbol`, plus the dependency node
    pub fn stage_forward(mut self, file: &str, symbol: &str) -> Self {
        self.steps.push(ScenarioStep::StageLink {
            file: file.to_string(),
            symbol: symbol.to_string(),
            forward: true,
        });
        self
    }

    /// Flush the staging set and write its manifest
    pub fn finish_staging(mut self) -> Self {
        self.steps.push(ScenarioStep::FinishStaging);
        self
    }

    // ===== Damage =====

    /// Append raw bytes to a finished store
    pub fn append_raw(mut self, store: Store, bytes: &[u8]) -> Self {
        self.steps.push(ScenarioStep::AppendRaw {
            store,
            bytes: bytes.to_vec(),
        });
        self
    }

    // ===== Collection =====

    /// Write a file into the fake host tree
    pub fn host_file(mut self, path: &str, content: &[u8]) -> Self {
        self.steps.push(ScenarioStep::HostFile {
            path: path.to_string(),
            content: content.to_vec(),
        });
        self
    }

    /// Run the collector pool over the host tree and `inventory`
    pub fn collect(mut self, inventory: JsonInventory) -> Self {
        self.steps.push(ScenarioStep::Collect { inventory });
        self
    }

    // ===== Loading =====

    /// Process the staging directory into the in-memory graph
    pub fn process(self) -> Self {
        self.process_with_batch(DEFAULT_BATCH_SIZE)
    }

    /// Process with a specific batch size
    pub fn process_with_batch(mut self, batch_size: usize) -> Self {
        self.steps.push(ScenarioStep::Process {
            batch_size,
            drop_existing: false,
        });
        self
    }

    /// Clear the graph first, then process
    pub fn process_dropping(mut self) -> Self {
        self.steps.push(ScenarioStep::Process {
            batch_size: DEFAULT_BATCH_SIZE,
            drop_existing: true,
        });
        self
    }

    // ===== Assertions =====

    /// Add a general assertion
    pub fn assert(mut self, assertion: Assertion) -> Self {
        self.steps.push(ScenarioStep::Assert { assertion });
        self
    }

    /// Assert total node count
    pub fn assert_nodes(self, count: usize) -> Self {
        self.assert(Assertion::NodeCount(count))
    }

    /// Assert node count for one label
    pub fn assert_label_count(self, label: &str, count: usize) -> Self {
        self.assert(Assertion::LabelCount {
            label: label.to_string(),
            count,
        })
    }

    /// Assert edge count for one relationship type
    pub fn assert_edge_count(self, kind: EdgeKind, count: usize) -> Self {
        self.assert(Assertion::EdgeCount { kind, count })
    }

    /// Assert a typed edge between two nodes
    pub fn assert_edge(self, from: Node, kind: EdgeKind, to: Node) -> Self {
        self.assert(Assertion::EdgeExists { from, kind, to })
    }

    /// Assert no edge of any type between two nodes
    pub fn assert_no_edge(self, from: Node, to: Node) -> Self {
        self.assert(Assertion::NoEdge { from, to })
    }

    /// Assert number of simple paths
    pub fn assert_path_count(self, from: Node, to: Node, count: usize) -> Self {
        self.assert(Assertion::PathCount { from, to, count })
    }

    /// Assert the edge types along the shortest path
    pub fn assert_shortest_path(self, from: Node, to: Node, kinds: Vec<EdgeKind>) -> Self {
        self.assert(Assertion::ShortestPath { from, to, kinds })
    }

    /// Assert nodes created by the last process step
    pub fn assert_created(self, n: u64) -> Self {
        self.assert(Assertion::Created(n))
    }

    /// Assert conflicts seen by the last process step
    pub fn assert_conflicts(self, n: u64) -> Self {
        self.assert(Assertion::Conflicts(n))
    }

    /// Assert malformed lines skipped by the last process step
    pub fn assert_malformed(self, n: u64) -> Self {
        self.assert(Assertion::Malformed(n))
    }

    /// Assert the last process step had no failed kinds or steps
    pub fn assert_no_failures(self) -> Self {
        self.assert(Assertion::NoFailures)
    }

    // ===== Execution =====

    /// Execute the scenario and return results
    pub fn run(self) -> ScenarioResult {
        let mut runner = match ScenarioRunner::new() {
            Ok(r) => r,
            Err(e) => {
                return ScenarioResult {
                    name: self.name.clone(),
                    success: false,
                    steps_executed: 0,
                    failure_step: Some(0),
                    error: Some(format!("Failed to create runner: {}", e)),
                }
            }
        };

        match runner.execute(&self.steps) {
            Ok(()) => ScenarioResult {
                name: self.name,
                success: true,
                steps_executed: self.steps.len(),
                failure_step: None,
                error: None,
            },
            Err(e) => {
                let failure_step = runner.current_step();
                ScenarioResult {
                    name: self.name,
                    success: false,
                    steps_executed: failure_step,
                    failure_step: Some(failure_step),
                    error: Some(format!("{:?}", e)),
                }
            }
        }
    }
}

/// Result of running a scenario
#[derive(Debug)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub steps_executed: usize,
    pub failure_step: Option<usize>,
    pub error: Option<String>,
}

impl ScenarioResult {
    /// Unwrap the result, panicking if it failed
    pub fn unwrap(self) {
        if !self.success {
            panic!(
                "Scenario '{}' failed at step {}: {}",
                self.name,
                self.failure_step.unwrap_or(0),
                self.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
    }

    /// Expect the result to be successful
    pub fn expect(self, msg: &str) {
        if !self.success {
            panic!(
                "{}: Scenario '{}' failed at step {}: {}",
                msg,
                self.name,
                self.failure_step.unwrap_or(0),
                self.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
    }
}
