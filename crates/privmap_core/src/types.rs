//! Core data types: node kinds, edge kinds, rights, and access-control entries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Label carried by every filesystem node (Exe, Dll, Directory).
pub const INODE_LABEL: &str = "INode";

/// Kind tag for every node in the graph.
///
/// Edge construction switches on this tag rather than on separate structs
/// per node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Executable image.
    Exe,
    /// Library image.
    Dll,
    /// Filesystem directory.
    Directory,
    /// User or group.
    Principal,
    /// Service, task, autorun entry, or observed process.
    Runner,
    /// Imported or forwarded symbol/module.
    Dependency,
}

impl NodeKind {
    /// All node kinds, in load order.
    pub const ALL: [NodeKind; 6] = [
        NodeKind::Directory,
        NodeKind::Exe,
        NodeKind::Dll,
        NodeKind::Principal,
        NodeKind::Runner,
        NodeKind::Dependency,
    ];

    /// Primary graph label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Exe => "Exe",
            Self::Dll => "Dll",
            Self::Directory => "Directory",
            Self::Principal => "Principal",
            Self::Runner => "Runner",
            Self::Dependency => "Dep",
        }
    }

    /// Every label the node carries (primary first).
    pub fn labels(self) -> &'static [&'static str] {
        match self {
            Self::Exe => &["Exe", INODE_LABEL],
            Self::Dll => &["Dll", INODE_LABEL],
            Self::Directory => &["Directory", INODE_LABEL],
            Self::Principal => &["Principal"],
            Self::Runner => &["Runner"],
            Self::Dependency => &["Dep"],
        }
    }

    /// Human-readable identity property (unique per kind).
    pub fn identity_property(self) -> &'static str {
        if self.is_securable() {
            "path"
        } else {
            "name"
        }
    }

    /// Staging store file name for this kind.
    pub fn store_file(self) -> &'static str {
        match self {
            Self::Exe => "exes.csv",
            Self::Dll => "dlls.csv",
            Self::Directory => "dirs.csv",
            Self::Principal => "principals.csv",
            Self::Runner => "runners.csv",
            Self::Dependency => "deps.csv",
        }
    }

    /// True for filesystem objects that carry a DACL and a parent.
    pub fn is_securable(self) -> bool {
        matches!(self, Self::Exe | Self::Dll | Self::Directory)
    }

    /// Parses a primary label back to a kind.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.label() == label)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Rights whose possession is materialized as an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AbusableRight {
    /// Can take ownership.
    WriteOwner,
    /// Can rewrite the DACL.
    WriteDacl,
    /// Can write properties.
    WriteProp,
    /// Full control.
    GenericAll,
    /// Write access.
    GenericWrite,
    /// Extended/control access.
    ControlAccess,
}

impl AbusableRight {
    /// The full allow-list.
    pub const ALL: [AbusableRight; 6] = [
        AbusableRight::WriteOwner,
        AbusableRight::WriteDacl,
        AbusableRight::WriteProp,
        AbusableRight::GenericAll,
        AbusableRight::GenericWrite,
        AbusableRight::ControlAccess,
    ];

    /// Right name, also used as the edge type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WriteOwner => "WRITE_OWNER",
            Self::WriteDacl => "WRITE_DACL",
            Self::WriteProp => "WRITE_PROP",
            Self::GenericAll => "GENERIC_ALL",
            Self::GenericWrite => "GENERIC_WRITE",
            Self::ControlAccess => "CONTROL_ACCESS",
        }
    }

    /// Looks up an observed right string; `None` means "observed, not abusable".
    ///
    /// # Examples
    ///
    /// ```
    /// use privmap_core::AbusableRight;
    ///
    /// assert_eq!(AbusableRight::parse("generic_all"), Some(AbusableRight::GenericAll));
    /// assert_eq!(AbusableRight::parse("READ"), None);
    /// ```
    pub fn parse(right: &str) -> Option<Self> {
        let right = right.trim();
        Self::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(right))
    }
}

impl fmt::Display for AbusableRight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge types created by the relationship constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeKind {
    /// Directory → FileObject/Directory.
    Contains,
    /// Principal → FileObject/Directory (owner or group).
    Owns,
    /// Principal → Principal (group).
    MemberOf,
    /// Directory → Runner whose executable lives there.
    Hosts,
    /// Runner → Principal it executes as.
    RunsAs,
    /// Exe → Runner that launches it.
    ExecutedBy,
    /// Dependency → FileObject importing it.
    ImportedBy,
    /// FileObject → Dependency it forwards to.
    Forwards,
    /// Principal → object, typed by the abusable right.
    Acl(AbusableRight),
}

impl EdgeKind {
    /// Relationship type name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contains => "CONTAINS",
            Self::Owns => "OWNS",
            Self::MemberOf => "MEMBER_OF",
            Self::Hosts => "HOSTS",
            Self::RunsAs => "RUNS_AS",
            Self::ExecutedBy => "EXECUTED_BY",
            Self::ImportedBy => "IMPORTED_BY",
            Self::Forwards => "FORWARDS",
            Self::Acl(right) => right.as_str(),
        }
    }

    /// Parses a relationship type name.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_uppercase();
        let fixed = match name.as_str() {
            "CONTAINS" => Some(Self::Contains),
            "OWNS" => Some(Self::Owns),
            "MEMBER_OF" => Some(Self::MemberOf),
            "HOSTS" => Some(Self::Hosts),
            "RUNS_AS" => Some(Self::RunsAs),
            "EXECUTED_BY" => Some(Self::ExecutedBy),
            "IMPORTED_BY" => Some(Self::ImportedBy),
            "FORWARDS" => Some(Self::Forwards),
            _ => None,
        };
        fixed.or_else(|| AbusableRight::parse(&name).map(Self::Acl))
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a principal is a user or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    /// Individual account.
    User,
    /// Group account.
    Group,
    /// Seen only as an ACE/owner reference.
    #[default]
    Unknown,
}

impl PrincipalKind {
    /// Stored property value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Unknown => "unknown",
        }
    }
}

/// Mechanism that makes an executable run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    /// Service manager entry.
    Service,
    /// Scheduled task.
    Task,
    /// Autorun (run key, startup folder).
    Autorun,
    /// Running process observed with its owning token.
    Process,
}

impl RunnerKind {
    /// Stored property value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Task => "task",
            Self::Autorun => "autorun",
            Self::Process => "process",
        }
    }
}

/// How a file references a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// Import table entry.
    Import,
    /// Export forwarded to another module.
    Forward,
}

/// One access-control entry as returned by the access resolver.
///
/// Basic and object ACEs carry their trustee differently; callers use
/// [`Ace::trustee`] instead of inspecting variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ace {
    /// Plain allow/deny entry.
    Basic {
        /// Raw principal identifier (SID or uid/gid form).
        trustee: String,
        /// Right names granted.
        rights: Vec<String>,
    },
    /// Object-specific entry (carries object GUIDs).
    Object {
        /// Raw principal identifier.
        trustee: String,
        /// Right names granted.
        rights: Vec<String>,
        /// Object type GUID, if present.
        object_type: Option<String>,
        /// Inherited object type GUID, if present.
        inherited_object_type: Option<String>,
    },
}

impl Ace {
    /// Raw identifier of the principal this entry grants rights to.
    pub fn trustee(&self) -> &str {
        match self {
            Ace::Basic { trustee, .. } => trustee,
            Ace::Object { trustee, .. } => trustee,
        }
    }

    /// Rights granted by this entry.
    pub fn rights(&self) -> &[String] {
        match self {
            Ace::Basic { rights, .. } | Ace::Object { rights, .. } => rights,
        }
    }
}

/// Owner, group, and entries of one securable object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityDescriptor {
    /// Raw owner identifier.
    pub owner: Option<String>,
    /// Raw primary group identifier.
    pub group: Option<String>,
    /// Ordered entries.
    pub aces: Vec<Ace>,
}
