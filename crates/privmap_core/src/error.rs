//! Error types for privmap_core operations.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for privmap_core operations.
#[derive(Error, Debug)]
pub enum PrivmapError {
    /// Invalid hex string for ContentId parsing.
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    /// The configured hash key is not 32 bytes of hex.
    #[error("invalid hash key: {0}")]
    InvalidHashKey(String),

    /// A staged record could not be parsed.
    #[error("malformed record in {store} at line {line}: {reason}")]
    MalformedRecord {
        /// Name of the staging store (e.g. `exes.csv`)
        store: String,
        /// 1-based line number of the record
        line: u64,
        /// Description of what's wrong
        reason: String,
    },

    /// Reading or writing a staging store failed.
    #[error("staging store {} failed: {}", path.display(), reason)]
    Staging {
        /// Path to the staging store
        path: PathBuf,
        /// Description of the failure
        reason: String,
    },

    /// Another process holds the staging directory lock.
    #[error("staging directory locked by another process: {}", .0.display())]
    StagingLocked(PathBuf),

    /// A whole object universe (services, tasks, groups...) could not be enumerated.
    #[error("cannot enumerate {universe}: {reason}")]
    Enumeration {
        /// Which universe failed
        universe: String,
        /// Description of the failure
        reason: String,
    },

    /// Graph store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A batch failed with a non-conflict store error.
    #[error("batch {batch} of {store} (lines {first_line}-{last_line}) failed: {source}")]
    Batch {
        /// Staging store the batch was read from
        store: String,
        /// 1-based batch counter
        batch: usize,
        /// First staged line in the batch
        first_line: u64,
        /// Last staged line in the batch
        last_line: u64,
        /// Underlying store error
        #[source]
        source: StoreError,
    },

    /// Configuration error (loading, parsing, invalid values).
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (inventory or manifest) could not be parsed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PrivmapError {
    /// Returns a user-friendly recovery suggestion for the error, if available.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::StagingLocked(_) => Some(
                "Wait for the other collection to finish, or remove the .lock file if that process is dead.",
            ),
            Self::MalformedRecord { .. } => {
                Some("Run 'privmap verify <dir>' to list every malformed staged record.")
            }
            Self::Store(StoreError::Connection(_)) => {
                Some("Check --host/--port/--scheme and that the graph database is reachable.")
            }
            Self::InvalidHashKey(_) => {
                Some("The [hash] key must be exactly 64 hex characters (32 bytes).")
            }
            Self::ConfigError(_) => Some("Check privmap.toml for typos or invalid values."),
            _ => None,
        }
    }
}

/// Structured errors reported by a graph client.
///
/// Loaders match on these variants to decide between "already there" and
/// "something is broken".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected a create.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// An equivalent constraint or index already exists.
    #[error("schema rule already exists: {0}")]
    SchemaAlreadyExists(String),

    /// Could not reach or authenticate against the store.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The store rejected a statement.
    #[error("query failed: {0}")]
    Query(String),

    /// Begin, commit, or rollback failed.
    #[error("transaction failed: {0}")]
    Transaction(String),
}

impl StoreError {
    /// Returns true if this error means the node is already present.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConstraintViolation(_))
    }
}

/// Convenience Result type for privmap_core operations.
pub type Result<T> = std::result::Result<T, PrivmapError>;
