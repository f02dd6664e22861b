//! Per-type staging stores.
//!
//! A staging directory holds one append-only CSV file per [`Store`] plus a
//! `manifest.json` describing the run. [`StagingSet`] owns every writer for
//! the duration of a collection; [`StagingDir`] reads the result back.

use crate::content_id::Identifier;
use crate::error::{PrivmapError, Result};
use crate::record::{
    AceRecord, DependencyRecord, FileRecord, LinkRecord, MemberRecord, PrincipalRecord,
    RunnerRecord,
};
use crate::types::NodeKind;
use fs2::FileExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Name of the run manifest inside a staging directory.
pub const MANIFEST_FILE: &str = "manifest.json";

const LOCK_FILE: &str = ".lock";

/// One staging store file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Store {
    /// Executables.
    Exes,
    /// Libraries.
    Dlls,
    /// Directories.
    Dirs,
    /// Users and groups.
    Principals,
    /// Services, tasks, autoruns, processes.
    Runners,
    /// Imported/forwarded symbols.
    Deps,
    /// ACE observations.
    Aces,
    /// File → dependency links.
    Imports,
    /// Group memberships.
    Members,
}

impl Store {
    /// Every store, in a stable order.
    pub const ALL: [Store; 9] = [
        Store::Dirs,
        Store::Exes,
        Store::Dlls,
        Store::Principals,
        Store::Runners,
        Store::Deps,
        Store::Aces,
        Store::Imports,
        Store::Members,
    ];

    /// File name inside the staging directory.
    pub fn file_name(self) -> &'static str {
        match self.node_kind() {
            Some(kind) => kind.store_file(),
            None => match self {
                Store::Aces => "aces.csv",
                Store::Imports => "imports.csv",
                _ => "members.csv",
            },
        }
    }

    /// Node kind staged in this store, if it holds nodes.
    pub fn node_kind(self) -> Option<NodeKind> {
        match self {
            Store::Exes => Some(NodeKind::Exe),
            Store::Dlls => Some(NodeKind::Dll),
            Store::Dirs => Some(NodeKind::Directory),
            Store::Principals => Some(NodeKind::Principal),
            Store::Runners => Some(NodeKind::Runner),
            Store::Deps => Some(NodeKind::Dependency),
            Store::Aces | Store::Imports | Store::Members => None,
        }
    }

    /// Store holding nodes of `kind`.
    pub fn for_kind(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Exe => Store::Exes,
            NodeKind::Dll => Store::Dlls,
            NodeKind::Directory => Store::Dirs,
            NodeKind::Principal => Store::Principals,
            NodeKind::Runner => Store::Runners,
            NodeKind::Dependency => Store::Deps,
        }
    }
}

/// Describes the run that produced a staging directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Unique id of the collection run.
    pub run_id: String,
    /// Unix seconds when collection started.
    pub created_at: u64,
    /// Fingerprint of the hash key the ids were derived with.
    pub key_fingerprint: String,
    /// Host the stores were collected on.
    pub host: String,
    /// Records appended per store file.
    pub counts: BTreeMap<String, u64>,
}

impl Manifest {
    /// Reads `manifest.json` from a staging directory, if present.
    pub fn read(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

struct StoreWriter {
    inner: csv::Writer<BufWriter<File>>,
    appended: u64,
}

/// Exclusive owner of every store writer for one collection run.
///
/// Appends from any number of threads are serialized per store, so a
/// record is always written whole. The directory lock is held until the
/// set is finished or dropped.
pub struct StagingSet {
    dir: PathBuf,
    writers: BTreeMap<Store, Mutex<StoreWriter>>,
    lock: Option<File>,
    run_id: String,
    created_at: u64,
    key_fingerprint: String,
}

impl StagingSet {
    /// Creates (or truncates) every store in `dir` and locks the directory.
    ///
    /// # Errors
    ///
    /// Returns `PrivmapError::StagingLocked` if another process is writing
    /// to the same directory.
    pub fn create(dir: &Path, ident: &Identifier) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| PrivmapError::Staging {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;

        let lock = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;
        lock.try_lock_exclusive()
            .map_err(|_| PrivmapError::StagingLocked(dir.to_path_buf()))?;

        let mut writers = BTreeMap::new();
        for store in Store::ALL {
            let path = dir.join(store.file_name());
            let file = File::create(&path).map_err(|e| PrivmapError::Staging {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            let inner = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(BufWriter::new(file));
            writers.insert(store, Mutex::new(StoreWriter { inner, appended: 0 }));
        }

        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(dir = %dir.display(), run_id = %run_id, "staging directory opened");

        Ok(Self {
            dir: dir.to_path_buf(),
            writers,
            lock: Some(lock),
            run_id,
            created_at,
            key_fingerprint: ident.fingerprint(),
        })
    }

    /// Staging directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Appends one record to `store`.
    pub fn append<R: Serialize>(&self, store: Store, record: &R) -> Result<()> {
        let Some(writer) = self.writers.get(&store) else {
            return Err(PrivmapError::Staging {
                path: self.dir.join(store.file_name()),
                reason: "store not open".to_string(),
            });
        };
        let mut writer = writer.lock();
        writer
            .inner
            .serialize(record)
            .map_err(|e| PrivmapError::Staging {
                path: self.dir.join(store.file_name()),
                reason: e.to_string(),
            })?;
        writer.appended += 1;
        Ok(())
    }

    /// Flushes every store, writes the manifest, and releases the lock.
    pub fn finish(mut self) -> Result<Manifest> {
        let mut counts = BTreeMap::new();
        for (store, writer) in &self.writers {
            let mut writer = writer.lock();
            writer.inner.flush().map_err(|e| PrivmapError::Staging {
                path: self.dir.join(store.file_name()),
                reason: e.to_string(),
            })?;
            counts.insert(store.file_name().to_string(), writer.appended);
        }

        let manifest = Manifest {
            run_id: self.run_id.clone(),
            created_at: self.created_at,
            key_fingerprint: self.key_fingerprint.clone(),
            host: host_name(),
            counts,
        };
        let json = serde_json::to_string_pretty(&manifest)?;
        fs::write(self.dir.join(MANIFEST_FILE), json)?;

        self.release_lock();
        info!(run_id = %manifest.run_id, "staging directory finished");
        Ok(manifest)
    }

    fn release_lock(&mut self) {
        if let Some(lock) = self.lock.take() {
            let _ = lock.unlock();
            let _ = fs::remove_file(self.dir.join(LOCK_FILE));
        }
    }
}

impl Drop for StagingSet {
    fn drop(&mut self) {
        for writer in self.writers.values() {
            let _ = writer.lock().inner.flush();
        }
        self.release_lock();
    }
}

fn host_name() -> String {
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_default()
}

/// A record read back from a store, with its line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staged<R> {
    /// 1-based line number.
    pub line: u64,
    /// Parsed record.
    pub record: R,
}

/// Read-only view of a finished (or interrupted) staging directory.
#[derive(Debug, Clone)]
pub struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    /// Opens a staging directory for reading.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(PrivmapError::Staging {
                path: path.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The run manifest, if collection finished cleanly.
    pub fn manifest(&self) -> Result<Option<Manifest>> {
        Manifest::read(&self.path)
    }

    /// Streams the records of `store`.
    ///
    /// A missing store file reads as empty. A trailing line without a
    /// terminating newline is an interrupted append and is never yielded.
    pub fn records<R: DeserializeOwned>(&self, store: Store) -> Result<StoreReader<R>> {
        StoreReader::open(&self.path.join(store.file_name()), store)
    }

    /// Counts good, malformed, and truncated records in every store.
    pub fn verify(&self) -> Result<StagingReport> {
        let mut report = StagingReport::default();
        for store in Store::ALL {
            let summary = match store {
                Store::Exes | Store::Dlls | Store::Dirs => self.summarize::<FileRecord>(store)?,
                Store::Principals => self.summarize::<PrincipalRecord>(store)?,
                Store::Runners => self.summarize::<RunnerRecord>(store)?,
                Store::Deps => self.summarize::<DependencyRecord>(store)?,
                Store::Aces => self.summarize::<AceRecord>(store)?,
                Store::Imports => self.summarize::<LinkRecord>(store)?,
                Store::Members => self.summarize::<MemberRecord>(store)?,
            };
            report.stores.insert(store, summary);
        }
        Ok(report)
    }

    fn summarize<R: DeserializeOwned>(&self, store: Store) -> Result<StoreSummary> {
        let mut reader = self.records::<R>(store)?;
        let mut summary = StoreSummary {
            present: reader.present,
            truncated_bytes: reader.truncated_bytes,
            ..StoreSummary::default()
        };
        for item in &mut reader {
            match item {
                Ok(_) => summary.records += 1,
                Err(PrivmapError::MalformedRecord { line, reason, .. }) => {
                    summary.malformed.push((line, reason))
                }
                Err(e) => return Err(e),
            }
        }
        Ok(summary)
    }
}

/// Result of verifying one store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSummary {
    /// Whether the file exists.
    pub present: bool,
    /// Well-formed records.
    pub records: u64,
    /// (line, reason) for every malformed record.
    pub malformed: Vec<(u64, String)>,
    /// Bytes of an unterminated trailing line.
    pub truncated_bytes: u64,
}

/// Result of verifying a staging directory.
#[derive(Debug, Clone, Default)]
pub struct StagingReport {
    /// Per-store results.
    pub stores: BTreeMap<Store, StoreSummary>,
}

impl StagingReport {
    /// Total well-formed records.
    pub fn total_records(&self) -> u64 {
        self.stores.values().map(|s| s.records).sum()
    }

    /// Returns true if any record was malformed or truncated.
    pub fn has_issues(&self) -> bool {
        self.stores
            .values()
            .any(|s| !s.malformed.is_empty() || s.truncated_bytes > 0)
    }
}

/// Streaming reader over one store file.
pub struct StoreReader<R> {
    store: Store,
    records: Option<csv::StringRecordsIntoIter<std::io::Take<BufReader<File>>>>,
    present: bool,
    truncated_bytes: u64,
    _marker: PhantomData<R>,
}

impl<R: DeserializeOwned> StoreReader<R> {
    fn open(path: &Path, store: Store) -> Result<Self> {
        if !path.exists() {
            debug!(store = store.file_name(), "store file absent, reading as empty");
            return Ok(Self {
                store,
                records: None,
                present: false,
                truncated_bytes: 0,
                _marker: PhantomData,
            });
        }

        let mut file = File::open(path).map_err(|e| PrivmapError::Staging {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let len = file.metadata()?.len();
        let complete = complete_prefix_len(&mut file, len)?;
        if complete < len {
            warn!(
                store = store.file_name(),
                bytes = len - complete,
                "dropping unterminated trailing record"
            );
        }
        file.seek(SeekFrom::Start(0))?;

        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(BufReader::new(file).take(complete));

        Ok(Self {
            store,
            records: Some(reader.into_records()),
            present: true,
            truncated_bytes: len - complete,
            _marker: PhantomData,
        })
    }

    /// Bytes dropped from an unterminated trailing line.
    pub fn truncated_bytes(&self) -> u64 {
        self.truncated_bytes
    }

    fn malformed(&self, line: u64, reason: String) -> PrivmapError {
        PrivmapError::MalformedRecord {
            store: self.store.file_name().to_string(),
            line,
            reason,
        }
    }
}

impl<R: DeserializeOwned> Iterator for StoreReader<R> {
    type Item = Result<Staged<R>>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = self.records.as_mut()?.next()?;
        Some(match raw {
            Ok(record) => {
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                record
                    .deserialize::<R>(None)
                    .map(|record| Staged { line, record })
                    .map_err(|e| self.malformed(line, e.to_string()))
            }
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                Err(self.malformed(line, e.to_string()))
            }
        })
    }
}

/// Length of the file up to and including its last newline.
fn complete_prefix_len(file: &mut File, len: u64) -> Result<u64> {
    const CHUNK: u64 = 8192;
    let mut end = len;
    let mut buf = vec![0u8; CHUNK as usize];
    while end > 0 {
        let start = end.saturating_sub(CHUNK);
        let size = (end - start) as usize;
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut buf[..size])?;
        if let Some(pos) = buf[..size].iter().rposition(|&b| b == b'\n') {
            return Ok(start + pos as u64 + 1);
        }
        end = start;
    }
    Ok(0)
}
