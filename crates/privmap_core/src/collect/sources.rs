//! Collaborators the collector pool depends on, and the implementations
//! that ship with the crate.

use crate::error::{PrivmapError, Result};
use crate::types::SecurityDescriptor;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// What an image parser reports for one executable or library.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageInfo {
    /// Imported symbols, `module!function`.
    pub imports: Vec<String>,
    /// Forwarded exports, `module!function`.
    pub forwards: Vec<String>,
    /// Import hash, if the parser computes one.
    pub imphash: Option<String>,
}

/// Extracts import and forward tables from an image.
pub trait ImageParser: Send + Sync {
    /// Parses the image at `path`. Failures skip the file's dependencies only.
    fn parse(&self, path: &Path) -> Result<ImageInfo>;
}

/// Parser that reports no dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImageParser;

impl ImageParser for NoImageParser {
    fn parse(&self, _path: &Path) -> Result<ImageInfo> {
        Ok(ImageInfo::default())
    }
}

/// Turns a path into its security descriptor and raw identifiers into names.
pub trait AccessResolver: Send + Sync {
    /// Owner, group, and entries of the object at `path`.
    fn security_descriptor(&self, path: &Path) -> Result<SecurityDescriptor>;

    /// Best-effort display name for a raw principal identifier.
    ///
    /// Returns `raw` unchanged when it cannot be resolved.
    fn resolve_name(&self, raw: &str) -> String;
}

/// Resolver that reports nothing: no owner, no group, no entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAccessResolver;

impl AccessResolver for NoAccessResolver {
    fn security_descriptor(&self, _path: &Path) -> Result<SecurityDescriptor> {
        Ok(SecurityDescriptor::default())
    }

    fn resolve_name(&self, raw: &str) -> String {
        raw.to_string()
    }
}

/// Scheduled task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEntry {
    /// Task path/name.
    pub name: String,
    /// Disabled tasks never run and are skipped.
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    /// Target executable.
    pub path: String,
    /// Argument string.
    #[serde(default)]
    pub args: String,
    /// Principal the task runs as.
    #[serde(default)]
    pub context: String,
    /// `limited` or `highest`.
    #[serde(default)]
    pub run_level: Option<String>,
}

fn enabled_default() -> bool {
    true
}

/// Service manager entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Service name.
    pub name: String,
    /// Binary path with arguments, as registered.
    pub command_line: String,
    /// Start-as account; empty means LocalSystem.
    #[serde(default)]
    pub start_name: String,
}

/// Run-key or startup-folder entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutorunEntry {
    /// Value or shortcut name.
    pub name: String,
    /// Command line.
    pub command_line: String,
    /// Principal whose logon triggers it.
    #[serde(default)]
    pub context: String,
}

/// Local group and its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
    /// Group name.
    pub name: String,
    /// Member names.
    #[serde(default)]
    pub members: Vec<String>,
}

/// Running process with a resolvable owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEntry {
    /// Process id.
    pub pid: u32,
    /// Image name.
    pub name: String,
    /// Full image path.
    pub exe_path: String,
    /// Owning token's principal.
    pub owner: String,
}

/// Lists the non-filesystem object universes.
///
/// Each method is one universe; an error means that universe is absent
/// from the run, not that the run fails.
pub trait HostEnumerator: Send + Sync {
    /// Scheduled tasks.
    fn tasks(&self) -> Result<Vec<TaskEntry>>;
    /// Services.
    fn services(&self) -> Result<Vec<ServiceEntry>>;
    /// Autorun entries.
    fn autoruns(&self) -> Result<Vec<AutorunEntry>>;
    /// Local groups with members.
    fn local_groups(&self) -> Result<Vec<GroupEntry>>;
    /// Running processes.
    fn processes(&self) -> Result<Vec<ProcessEntry>>;
}

/// Host data exported to a JSON file.
///
/// ```json
/// { "services": [{ "name": "spooler", "command_line": "C:\\Windows\\System32\\spoolsv.exe" }],
///   "groups": [{ "name": "tools-admins", "members": ["alice"] }] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonInventory {
    /// Scheduled tasks.
    pub tasks: Vec<TaskEntry>,
    /// Services.
    pub services: Vec<ServiceEntry>,
    /// Autoruns.
    pub autoruns: Vec<AutorunEntry>,
    /// Local groups.
    pub groups: Vec<GroupEntry>,
    /// Processes.
    pub processes: Vec<ProcessEntry>,
}

impl JsonInventory {
    /// Reads an inventory file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| PrivmapError::Enumeration {
            universe: "inventory".to_string(),
            reason: format!("{}: {}", path.display(), e),
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl HostEnumerator for JsonInventory {
    fn tasks(&self) -> Result<Vec<TaskEntry>> {
        Ok(self.tasks.clone())
    }

    fn services(&self) -> Result<Vec<ServiceEntry>> {
        Ok(self.services.clone())
    }

    fn autoruns(&self) -> Result<Vec<AutorunEntry>> {
        Ok(self.autoruns.clone())
    }

    fn local_groups(&self) -> Result<Vec<GroupEntry>> {
        Ok(self.groups.clone())
    }

    fn processes(&self) -> Result<Vec<ProcessEntry>> {
        Ok(self.processes.clone())
    }
}

#[cfg(unix)]
pub use posix::PosixAccessResolver;

#[cfg(unix)]
mod posix {
    use super::AccessResolver;
    use crate::error::Result;
    use crate::types::{Ace, AbusableRight, SecurityDescriptor};
    use std::collections::HashMap;
    use std::fs;
    use std::os::unix::fs::MetadataExt;
    use std::path::Path;

    /// Trustee used for the world permission bits.
    const EVERYONE: &str = "everyone";

    /// Maps unix ownership and mode bits onto the ACE model.
    ///
    /// Owner gets GENERIC_ALL; a writable group or world bit grants
    /// GENERIC_WRITE to the group or to `everyone`; anything else is READ.
    #[derive(Debug, Clone, Default)]
    pub struct PosixAccessResolver {
        users: HashMap<u32, String>,
        groups: HashMap<u32, String>,
    }

    impl PosixAccessResolver {
        /// Loads account names from `/etc/passwd` and `/etc/group`.
        pub fn new() -> Self {
            Self::from_files(Path::new("/etc/passwd"), Path::new("/etc/group"))
        }

        /// Loads account names from the given files; missing files resolve nothing.
        pub fn from_files(passwd: &Path, group: &Path) -> Self {
            Self {
                users: read_id_map(passwd),
                groups: read_id_map(group),
            }
        }
    }

    fn read_id_map(path: &Path) -> HashMap<u32, String> {
        let Ok(content) = fs::read_to_string(path) else {
            return HashMap::new();
        };
        content
            .lines()
            .filter(|l| !l.starts_with('#'))
            .filter_map(|line| {
                let mut fields = line.split(':');
                let name = fields.next()?;
                let id = fields.nth(1)?.parse().ok()?;
                Some((id, name.to_string()))
            })
            .collect()
    }

    impl AccessResolver for PosixAccessResolver {
        fn security_descriptor(&self, path: &Path) -> Result<SecurityDescriptor> {
            let meta = fs::symlink_metadata(path)?;
            let mode = meta.mode();
            let owner = format!("uid:{}", meta.uid());
            let group = format!("gid:{}", meta.gid());

            let write = |mask: u32| {
                if mode & mask != 0 {
                    AbusableRight::GenericWrite.as_str()
                } else {
                    "READ"
                }
            };
            let aces = vec![
                Ace::Basic {
                    trustee: owner.clone(),
                    rights: vec![AbusableRight::GenericAll.as_str().to_string()],
                },
                Ace::Basic {
                    trustee: group.clone(),
                    rights: vec![write(0o020).to_string()],
                },
                Ace::Basic {
                    trustee: EVERYONE.to_string(),
                    rights: vec![write(0o002).to_string()],
                },
            ];

            Ok(SecurityDescriptor {
                owner: Some(owner),
                group: Some(group),
                aces,
            })
        }

        fn resolve_name(&self, raw: &str) -> String {
            let lookup = |table: &HashMap<u32, String>, id: &str| {
                id.parse::<u32>().ok().and_then(|id| table.get(&id).cloned())
            };
            let resolved = if let Some(id) = raw.strip_prefix("uid:") {
                lookup(&self.users, id)
            } else if let Some(id) = raw.strip_prefix("gid:") {
                lookup(&self.groups, id)
            } else {
                None
            };
            resolved.unwrap_or_else(|| raw.to_string())
        }
    }

}
