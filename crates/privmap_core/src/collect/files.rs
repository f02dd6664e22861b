//! Filesystem universe: parallel directory walks.

use super::{Collector, ImageInfo};
use crate::content_id::ContentId;
use crate::error::{PrivmapError, Result};
use crate::normalize;
use crate::record::{DependencyRecord, LinkRecord};
use crate::staging::Store;
use crate::types::{LinkKind, NodeKind};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use walkdir::WalkDir;

/// One unit of work for the pool.
enum Task {
    /// Files sitting directly in a root.
    RootFiles(Vec<PathBuf>),
    /// A top-level directory walked recursively.
    Subtree(PathBuf),
}

/// Walks every configured root on a pool of `workers` threads.
///
/// Each top-level directory of a root is one task; files directly in a
/// root form one more.
pub(super) fn walk(c: &Collector<'_>) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(c.options.workers.max(1))
        .thread_name(|i| format!("collector-{i}"))
        .build()
        .map_err(|e| PrivmapError::Enumeration {
            universe: "filesystem".to_string(),
            reason: e.to_string(),
        })?;

    let mut tasks = Vec::new();
    for root in &c.options.roots {
        match partition(root) {
            Ok(mut root_tasks) => tasks.append(&mut root_tasks),
            Err(e) => error!(root = %root.display(), error = %e, "cannot read root, skipping"),
        }
    }
    info!(tasks = tasks.len(), "filesystem walk partitioned");

    pool.scope(|s| {
        for task in tasks {
            s.spawn(move |_| match task {
                Task::RootFiles(files) => {
                    for file in files {
                        visit_file(c, &file);
                    }
                }
                Task::Subtree(dir) => walk_subtree(c, &dir),
            });
        }
    });
    Ok(())
}

fn partition(root: &Path) -> std::io::Result<Vec<Task>> {
    let mut files = Vec::new();
    let mut tasks = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            tasks.push(Task::Subtree(entry.path()));
        } else if file_type.is_file() {
            files.push(entry.path());
        }
    }
    if !files.is_empty() {
        tasks.push(Task::RootFiles(files));
    }
    Ok(tasks)
}

fn walk_subtree(c: &Collector<'_>, dir: &Path) {
    let walker = WalkDir::new(dir).follow_links(c.options.follow_links);
    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() => visit_file(c, entry.path()),
            Ok(_) => {}
            Err(e) => {
                let what = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| dir.display().to_string());
                c.skip(&what, e);
            }
        }
    }
}

fn visit_file(c: &Collector<'_>, fs_path: &Path) {
    if let Err(e) = stage_file(c, fs_path) {
        c.skip(&fs_path.display().to_string(), e);
    }
}

/// Stages an executable or library, its directory chain, and its links.
fn stage_file(c: &Collector<'_>, fs_path: &Path) -> Result<()> {
    let path = normalize::normalize_path(&fs_path.to_string_lossy());
    let Some(kind) = c.options.classify(&path) else {
        return Ok(());
    };
    c.count_examined();

    let nid = c.ident.identify(&path);
    if !c.staged.try_claim(kind, nid) {
        debug!(path, "already staged");
        return Ok(());
    }

    if let (Some(parent), Some(parent_fs)) = (normalize::parent_of(&path), fs_path.parent()) {
        c.stage_directory(&parent, parent_fs)?;
    }

    let info = c.parser.parse(fs_path).unwrap_or_else(|e| {
        debug!(path, error = %e, "image not parsed");
        ImageInfo::default()
    });

    c.stage_securable(kind, &path, fs_path, nid, info.imphash.clone())?;
    stage_links(c, nid, &info)
}

fn stage_links(c: &Collector<'_>, file: ContentId, info: &ImageInfo) -> Result<()> {
    let mut seen = HashSet::new();
    let links = info
        .imports
        .iter()
        .map(|s| (LinkKind::Import, s))
        .chain(info.forwards.iter().map(|s| (LinkKind::Forward, s)));

    for (link, symbol) in links {
        let name = normalize::normalize_name(symbol);
        if name.is_empty() {
            continue;
        }
        let dependency = c.ident.identify(&name);
        if !seen.insert((link, dependency)) {
            continue;
        }
        if c.staged.try_claim(NodeKind::Dependency, dependency) {
            c.staging
                .append(Store::Deps, &DependencyRecord { nid: dependency, name })?;
        }
        c.staging.append(
            Store::Imports,
            &LinkRecord {
                file,
                kind: link,
                dependency,
            },
        )?;
    }
    Ok(())
}
