use super::assertions::Assertion;
use privmap_core::collect::JsonInventory;
use privmap_core::{NodeKind, RunnerKind, Store};

/// All possible actions in a test scenario
#[derive(Debug)]
pub enum ScenarioStep {
    // Staging, as a collector would write it
    StageFile {
        kind: NodeKind,
        path: String,
    },
    StagePrincipal {
        name: String,
        group: Option<String>,
    },
    StageMember {
        member: String,
        group: String,
    },
    StageAce {
        principal: String,
        right: String,
        kind: NodeKind,
        target: String,
    },
    StageRunner {
        kind: RunnerKind,
        name: String,
        exe: String,
        context: String,
    },
    StageLink {
        file: String,
        symbol: String,
        forward: bool,
    },
    FinishStaging,

    // Damage
    AppendRaw {
        store: Store,
        bytes: Vec<u8>,
    },

    // Collection from a real tree
    HostFile {
        path: String,
        content: Vec<u8>,
    },
    Collect {
        inventory: JsonInventory,
    },

    // Loading
    Process {
        batch_size: usize,
        drop_existing: bool,
    },

    Assert {
        assertion: Assertion,
    },
}
