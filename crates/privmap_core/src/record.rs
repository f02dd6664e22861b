//! Staged record layouts.
//!
//! Every staging store holds one CSV row per record, no header, fields in
//! declaration order. Cross-references between records are content ids, so
//! the loader and the relationship constructor never look anything up by
//! path or name.

use crate::content_id::ContentId;
use crate::types::{LinkKind, NodeKind, PrincipalKind, RunnerKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A node ready to be created: kind tag, primary key, and properties.
///
/// Properties always include `nid` and the kind's identity property.
/// Absent optional references are left out rather than stored empty, so a
/// property join never matches on an empty value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    /// Node kind.
    pub kind: NodeKind,
    /// Primary key.
    pub nid: ContentId,
    /// Property map.
    pub props: BTreeMap<String, String>,
}

impl NodeSpec {
    fn new(kind: NodeKind, nid: ContentId) -> Self {
        let mut props = BTreeMap::new();
        props.insert("nid".to_string(), nid.as_hex());
        Self { kind, nid, props }
    }

    fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.props.insert(key.to_string(), value.into());
        self
    }

    fn with_opt<V: ToString>(mut self, key: &str, value: Option<&V>) -> Self {
        if let Some(value) = value {
            self.props.insert(key.to_string(), value.to_string());
        }
        self
    }

    /// The identity property value (path or name).
    pub fn identity(&self) -> Option<&str> {
        self.props
            .get(self.kind.identity_property())
            .map(String::as_str)
    }
}

/// A staged record that materializes as a graph node.
pub trait NodeRecord: Serialize + DeserializeOwned + Send {
    /// Primary key of the node this record describes.
    fn nid(&self) -> ContentId;

    /// Converts to a node of the given kind.
    fn to_node(&self, kind: NodeKind) -> NodeSpec;
}

/// Executable, library, or directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Content id of `path`.
    pub nid: ContentId,
    /// Final path component.
    pub name: String,
    /// Normalized absolute path.
    pub path: String,
    /// Normalized parent path; empty for roots.
    pub parent_path: String,
    /// Content id of the parent directory.
    pub parent: Option<ContentId>,
    /// Content id of the owning principal.
    pub owner: Option<ContentId>,
    /// Content id of the primary group.
    pub group: Option<ContentId>,
    /// Import hash reported by the image parser.
    pub imphash: Option<String>,
}

impl NodeRecord for FileRecord {
    fn nid(&self) -> ContentId {
        self.nid
    }

    fn to_node(&self, kind: NodeKind) -> NodeSpec {
        NodeSpec::new(kind, self.nid)
            .with("name", &self.name)
            .with("path", &self.path)
            .with_opt("parent", self.parent.as_ref())
            .with_opt("owner", self.owner.as_ref())
            .with_opt("group", self.group.as_ref())
            .with_opt("imphash", self.imphash.as_ref())
    }
}

/// User or group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalRecord {
    /// Content id of the canonical name.
    pub nid: ContentId,
    /// Canonical name.
    pub name: String,
    /// User, group, or unknown.
    pub kind: PrincipalKind,
    /// Group hint: content id of a group this principal belongs to.
    pub group: Option<ContentId>,
}

impl NodeRecord for PrincipalRecord {
    fn nid(&self) -> ContentId {
        self.nid
    }

    fn to_node(&self, kind: NodeKind) -> NodeSpec {
        NodeSpec::new(kind, self.nid)
            .with("name", &self.name)
            .with("kind", self.kind.as_str())
            .with_opt("group", self.group.as_ref())
    }
}

/// Service, task, autorun entry, or process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerRecord {
    /// Content id of `name`.
    pub nid: ContentId,
    /// Normalized runner name (prefixed by its kind).
    pub name: String,
    /// Mechanism.
    pub kind: RunnerKind,
    /// Argument string.
    pub args: String,
    /// Normalized target executable path.
    pub exe_path: String,
    /// Content id of the target executable.
    pub exe: ContentId,
    /// Content id of the executable's directory.
    pub exe_parent: Option<ContentId>,
    /// Canonical name of the executing principal.
    pub context_name: String,
    /// Content id of the executing principal.
    pub context: ContentId,
    /// Task run level (`limited` / `highest`).
    pub run_level: Option<String>,
}

impl NodeRecord for RunnerRecord {
    fn nid(&self) -> ContentId {
        self.nid
    }

    fn to_node(&self, kind: NodeKind) -> NodeSpec {
        NodeSpec::new(kind, self.nid)
            .with("name", &self.name)
            .with("type", self.kind.as_str())
            .with("args", &self.args)
            .with("exe_path", &self.exe_path)
            .with("exe", self.exe.as_hex())
            .with_opt("exe_parent", self.exe_parent.as_ref())
            .with("context_name", &self.context_name)
            .with("context", self.context.as_hex())
            .with_opt("run_level", self.run_level.as_ref())
    }
}

/// Imported or forwarded symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    /// Content id of `name`.
    pub nid: ContentId,
    /// Normalized `module!function` name.
    pub name: String,
}

impl NodeRecord for DependencyRecord {
    fn nid(&self) -> ContentId {
        self.nid
    }

    fn to_node(&self, kind: NodeKind) -> NodeSpec {
        NodeSpec::new(kind, self.nid).with("name", &self.name)
    }
}

/// One (principal, right, target) observation.
///
/// Every right is staged; only abusable ones become edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AceRecord {
    /// Content id of the trustee.
    pub principal: ContentId,
    /// Resolved trustee name.
    pub principal_name: String,
    /// Right name as observed.
    pub right: String,
    /// Content id of the securable object.
    pub target: ContentId,
    /// Kind of the securable object.
    pub target_kind: NodeKind,
}

/// File → dependency reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Content id of the referencing file.
    pub file: ContentId,
    /// Import or forward.
    pub kind: LinkKind,
    /// Content id of the dependency.
    pub dependency: ContentId,
}

/// Group membership observed from group enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    /// Content id of the member principal.
    pub member: ContentId,
    /// Content id of the group principal.
    pub group: ContentId,
}
