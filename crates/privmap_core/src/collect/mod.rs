//! Collector pool: walks every object universe and stages what it finds.
//!
//! Workers share three things: the [`Identifier`], the "staged" scope
//! [`DedupCache`], and the [`StagingSet`]. Everything else is per-object.
//! Each object is normalized, claimed, and appended at most once per run.

mod files;
mod principals;
mod runners;
mod sources;

pub use sources::{
    AccessResolver, AutorunEntry, GroupEntry, HostEnumerator, ImageInfo, ImageParser,
    JsonInventory, NoAccessResolver, NoImageParser, ProcessEntry, ServiceEntry, TaskEntry,
};

#[cfg(unix)]
pub use sources::PosixAccessResolver;

use crate::content_id::{ContentId, Identifier};
use crate::dedup::DedupCache;
use crate::error::Result;
use crate::normalize;
use crate::record::{AceRecord, FileRecord, PrincipalRecord};
use crate::staging::{StagingSet, Store};
use crate::types::{NodeKind, PrincipalKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

/// Tunables for one collection run.
#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Filesystem roots to walk.
    pub roots: Vec<PathBuf>,
    /// Worker threads in the pool.
    pub workers: usize,
    /// Extensions staged as executables.
    pub exe_extensions: Vec<String>,
    /// Extensions staged as libraries.
    pub dll_extensions: Vec<String>,
    /// Follow symbolic links while walking.
    pub follow_links: bool,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            workers: 8,
            exe_extensions: vec!["exe".to_string()],
            dll_extensions: vec!["dll".to_string()],
            follow_links: false,
        }
    }
}

impl CollectOptions {
    /// Classifies a normalized path by extension.
    pub fn classify(&self, path: &str) -> Option<NodeKind> {
        let name = normalize::file_name(path);
        let (_, ext) = name.rsplit_once('.')?;
        if self.exe_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
            Some(NodeKind::Exe)
        } else if self.dll_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
            Some(NodeKind::Dll)
        } else {
            None
        }
    }
}

/// Counters for a finished collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectReport {
    /// Objects examined (files, runners, principals).
    pub examined: u64,
    /// Objects skipped after a per-object error.
    pub skipped: u64,
    /// Universes that could not be enumerated.
    pub failed_universes: Vec<String>,
}

/// Shared state handed to every collector worker.
pub struct Collector<'a> {
    ident: &'a Identifier,
    staged: &'a DedupCache,
    staging: &'a StagingSet,
    access: &'a dyn AccessResolver,
    parser: &'a dyn ImageParser,
    options: &'a CollectOptions,
    examined: AtomicU64,
    skipped: AtomicU64,
}

impl<'a> Collector<'a> {
    /// Builds a collector over the run's shared components.
    pub fn new(
        ident: &'a Identifier,
        staged: &'a DedupCache,
        staging: &'a StagingSet,
        access: &'a dyn AccessResolver,
        parser: &'a dyn ImageParser,
        options: &'a CollectOptions,
    ) -> Self {
        Self {
            ident,
            staged,
            staging,
            access,
            parser,
            options,
            examined: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    /// Walks the filesystem roots and every host universe.
    ///
    /// Groups go first: a principal's kind is fixed by whichever call
    /// claims it, and ACE trustees would otherwise claim groups as Unknown.
    pub fn run(&self, host: &dyn HostEnumerator) -> Result<CollectReport> {
        let mut failed = Vec::new();

        if let Err(e) = principals::collect_groups(self, host) {
            error!(universe = "groups", error = %e, "universe could not be enumerated, continuing without it");
            failed.push("groups".to_string());
        }

        info!(roots = self.options.roots.len(), workers = self.options.workers, "collecting files");
        files::walk(self)?;

        for (universe, outcome) in [
            ("services", runners::collect_services(self, host)),
            ("tasks", runners::collect_tasks(self, host)),
            ("autoruns", runners::collect_autoruns(self, host)),
            ("processes", runners::collect_processes(self, host)),
        ] {
            if let Err(e) = outcome {
                error!(universe, error = %e, "universe could not be enumerated, continuing without it");
                failed.push(universe.to_string());
            }
        }

        Ok(CollectReport {
            examined: self.examined.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed_universes: failed,
        })
    }

    pub(crate) fn count_examined(&self) {
        self.examined.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn skip(&self, what: &str, reason: impl std::fmt::Display) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        warn!(object = what, reason = %reason, "skipping object");
    }

    /// Stages a principal by name if not already staged; returns its id.
    ///
    /// The group hint is only recorded by whichever call claims first.
    pub(crate) fn stage_principal(
        &self,
        raw_name: &str,
        kind: PrincipalKind,
        group: Option<ContentId>,
    ) -> Result<ContentId> {
        let name = normalize::canonical_principal(raw_name);
        let nid = self.ident.identify(&name);
        if self.staged.try_claim(NodeKind::Principal, nid) {
            self.staging.append(
                Store::Principals,
                &PrincipalRecord {
                    nid,
                    name,
                    kind,
                    group,
                },
            )?;
        }
        Ok(nid)
    }

    /// Stages a directory if not already staged; returns its id.
    ///
    /// `fs_path` is where the directory lives on disk; `path` is its
    /// normalized identity. Ancestors are staged on the way up until one
    /// that was already claimed, so every staged object has a containment
    /// chain to its root.
    pub(crate) fn stage_directory(&self, path: &str, fs_path: &Path) -> Result<ContentId> {
        let nid = self.ident.identify(path);
        let mut next = Some((path.to_string(), fs_path.to_path_buf(), nid));
        while let Some((dir, dir_fs, dir_nid)) = next.take() {
            if !self.staged.try_claim(NodeKind::Directory, dir_nid) {
                break;
            }
            self.stage_securable(NodeKind::Directory, &dir, &dir_fs, dir_nid, None)?;
            if let (Some(parent), Some(parent_fs)) = (normalize::parent_of(&dir), dir_fs.parent()) {
                let parent_nid = self.ident.identify(&parent);
                next = Some((parent, parent_fs.to_path_buf(), parent_nid));
            }
        }
        Ok(nid)
    }

    /// Stages a file or directory record plus its DACL observations.
    ///
    /// The caller must already hold the claim for `nid`.
    pub(crate) fn stage_securable(
        &self,
        kind: NodeKind,
        path: &str,
        fs_path: &Path,
        nid: ContentId,
        imphash: Option<String>,
    ) -> Result<()> {
        let parent_path = normalize::parent_of(path);
        let parent = parent_path.as_deref().map(|p| self.ident.identify(p));

        let (owner, group) = match self.access.security_descriptor(fs_path) {
            Ok(sd) => {
                let owner = match &sd.owner {
                    Some(raw) => Some(self.stage_trustee(raw)?.0),
                    None => None,
                };
                let group = match &sd.group {
                    Some(raw) => Some(self.stage_trustee(raw)?.0),
                    None => None,
                };
                for ace in &sd.aces {
                    let (principal, principal_name) = self.stage_trustee(ace.trustee())?;
                    for right in ace.rights() {
                        self.staging.append(
                            Store::Aces,
                            &AceRecord {
                                principal,
                                principal_name: principal_name.clone(),
                                right: right.clone(),
                                target: nid,
                                target_kind: kind,
                            },
                        )?;
                    }
                }
                (owner, group)
            }
            Err(e) => {
                debug!(path, error = %e, "no security descriptor");
                (None, None)
            }
        };

        self.staging.append(
            Store::for_kind(kind),
            &FileRecord {
                nid,
                name: normalize::file_name(path).to_string(),
                path: path.to_string(),
                parent_path: parent_path.unwrap_or_default(),
                parent,
                owner,
                group,
                imphash,
            },
        )
    }

    /// Resolves and stages an ACE/owner trustee; returns (id, canonical name).
    fn stage_trustee(&self, raw: &str) -> Result<(ContentId, String)> {
        let name = normalize::canonical_principal(&self.access.resolve_name(raw));
        let nid = self.stage_principal(&name, PrincipalKind::Unknown, None)?;
        Ok((nid, name))
    }
}
