use std::fmt;

pub type Key = String;
pub type Revision = i64;
pub type LeaseId = i64;

/// A stored value plus the metadata the store assigned to it.
///
/// Entries are snapshots: a mutation or notification produces a new `Entry`,
/// fields are never edited in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub key: Key,
    pub value: String,
    pub create_revision: Revision,
    pub mod_revision: Revision,
    pub version: i64,
    /// 0 means the entry is not attached to a lease.
    pub lease: LeaseId,
}

impl Entry {
    pub fn new(key: impl Into<Key>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            create_revision: 0,
            mod_revision: 0,
            version: 0,
            lease: 0,
        }
    }

    pub fn with_revisions(mut self, create: Revision, modified: Revision, version: i64) -> Self {
        self.create_revision = create;
        self.mod_revision = modified;
        self.version = version;
        self
    }

    pub fn with_lease(mut self, lease: LeaseId) -> Self {
        self.lease = lease;
        self
    }

    pub fn has_lease(&self) -> bool {
        self.lease > 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchEventKind {
    Put,
    Delete,
}

impl WatchEventKind {
    pub fn label(&self) -> &'static str {
        match self {
            WatchEventKind::Put => "PUT",
            WatchEventKind::Delete => "DELETE",
        }
    }
}

/// A single change notification delivered by a watch subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub key: Key,
    /// New value for puts, empty for deletes.
    pub value: String,
    pub mod_revision: Revision,
}

impl WatchEvent {
    pub fn put(key: impl Into<Key>, value: impl Into<String>, mod_revision: Revision) -> Self {
        Self {
            kind: WatchEventKind::Put,
            key: key.into(),
            value: value.into(),
            mod_revision,
        }
    }

    pub fn delete(key: impl Into<Key>, mod_revision: Revision) -> Self {
        Self {
            kind: WatchEventKind::Delete,
            key: key.into(),
            value: String::new(),
            mod_revision,
        }
    }
}

/// What a watch subscription listens to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchScope {
    Key(Key),
    Prefix(Key),
}

impl WatchScope {
    pub fn matches(&self, key: &str) -> bool {
        match self {
            WatchScope::Key(k) => k == key,
            WatchScope::Prefix(p) => key.starts_with(p.as_str()),
        }
    }

    pub fn target(&self) -> &str {
        match self {
            WatchScope::Key(k) | WatchScope::Prefix(k) => k,
        }
    }
}

impl fmt::Display for WatchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchScope::Key(k) => write!(f, "{}", k),
            WatchScope::Prefix(p) => write!(f, "{}*", p),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberStatus {
    pub id: u64,
    pub name: String,
    pub endpoint: Option<String>,
    pub is_leader: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterStatus {
    pub leader: Option<String>,
    pub members: Vec<MemberStatus>,
    pub healthy: bool,
}

impl ClusterStatus {
    pub fn leader_label(&self) -> &str {
        self.leader.as_deref().unwrap_or("unknown")
    }
}
