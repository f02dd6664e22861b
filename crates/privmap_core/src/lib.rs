//! privmap core library
//!
//! Inventories a host's executables, libraries, directories, principals,
//! and runners, stages them as per-kind CSV stores, and loads them into a
//! property graph where privilege-escalation paths can be queried:
//! - Path and name normalization
//! - Keyed content identifiers as node primary keys
//! - Type-partitioned dedup cache shared by concurrent collectors
//! - Batched, conflict-tolerant node loading
//! - Relationship construction by property joins
//!
//! # Quick Start
//!
//! ```
//! use privmap_core::{ContentId, DedupCache, Identifier, NodeKind};
//!
//! let ident = Identifier::default();
//! let cache = DedupCache::new();
//!
//! // Differently spelled paths name the same node.
//! let a = ident.path_id(r"C:\Tools\A.exe");
//! let b = ident.path_id("c:/tools/a.exe");
//! assert_eq!(a, b);
//!
//! assert!(cache.try_claim(NodeKind::Exe, a));
//! assert!(!cache.try_claim(NodeKind::Exe, b));
//! ```
//!
//! # Pipeline
//!
//! ```
//! use privmap_core::collect::{CollectOptions, JsonInventory, NoAccessResolver, NoImageParser};
//! use privmap_core::store::MemoryGraph;
//! use privmap_core::{collect, process, Identifier, ProcessOptions, StagingDir};
//! use tempfile::TempDir;
//!
//! let out = TempDir::new().unwrap();
//! let ident = Identifier::default();
//! collect(
//!     out.path(),
//!     &ident,
//!     &CollectOptions::default(),
//!     &JsonInventory::default(),
//!     &NoAccessResolver,
//!     &NoImageParser,
//! )
//! .unwrap();
//!
//! let graph = MemoryGraph::new();
//! let dir = StagingDir::open(out.path()).unwrap();
//! let report = process(&graph, &dir, &ident, &ProcessOptions::default()).unwrap();
//! assert!(!report.has_failures());
//! ```

pub mod collect;
mod config;
mod content_id;
mod dedup;
mod error;
mod graph;
mod limiter;
mod load;
pub mod normalize;
mod pipeline;
mod record;
mod relate;
mod schema;
mod staging;
pub mod store;
mod types;

pub use config::{CollectConfig, Config, HashConfig, LoadConfig, CONFIG_FILE};
pub use content_id::{ContentId, Identifier, DEFAULT_HASH_KEY};
pub use dedup::DedupCache;
pub use error::{PrivmapError, Result, StoreError};
pub use graph::{
    adjacency_to_dot, paths_between, AdjacencyList, EdgeTriple, GraphPath, TraversalConfig,
};
pub use limiter::{Limiter, Permit};
pub use load::{KindLoad, LoadOptions, LoadPipeline, LoadReport, DEFAULT_BATCH_SIZE};
pub use pipeline::{collect, process, ProcessOptions, ProcessReport};
pub use record::{
    AceRecord, DependencyRecord, FileRecord, LinkRecord, MemberRecord, NodeRecord, NodeSpec,
    PrincipalRecord, RunnerRecord,
};
pub use relate::{RelateOptions, RelateReport, RelationshipConstructor, Step, StepOutcome, DEFAULT_EDGE_CHUNK};
pub use schema::{declare as declare_schema, drop_all as drop_graph, statements as schema_statements, SchemaReport};
pub use staging::{
    Manifest, Staged, StagingDir, StagingReport, StagingSet, Store, StoreReader, StoreSummary,
    MANIFEST_FILE,
};
pub use types::*;
