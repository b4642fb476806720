//! ACL model: named permission rules of object, command, and store kind

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AuthDbError, AuthDbResult};

/// Whether a rule grants or denies
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AclMode {
    Allow,
    Deny,
}

/// Generic named allow/deny rule
#[derive(Clone, Debug, PartialEq)]
pub struct AclObject {
    pub name: String,
    pub mode: AclMode,
}

/// Rule scoped to a set of command names
#[derive(Clone, Debug, PartialEq)]
pub struct AclCommand {
    pub name: String,
    pub mode: AclMode,
    pub commands: Vec<String>,
}

/// Rule scoped to a set of secrets-store paths
#[derive(Clone, Debug, PartialEq)]
pub struct AclStore {
    pub name: String,
    pub mode: AclMode,
    pub store_paths: Vec<String>,
}

/// A named permission rule, polymorphic over its kind
#[derive(Clone, Debug, PartialEq)]
pub enum Acl {
    Object(AclObject),
    Command(AclCommand),
    Store(AclStore),
}

const TAG_OBJECT: &str = "ACLObject";
const TAG_COMMAND: &str = "ACLCommand";
const TAG_STORE: &str = "ACLStore";

/// Wire form of one ACL entry: the `object` field carries the kind tag
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct AclRecord {
    pub object: String,
    pub name: String,
    pub mode: AclMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub store_paths: Vec<String>,
}

impl Acl {
    /// Decode a raw record, dispatching on its kind tag.
    ///
    /// Unknown tags are rejected with a typed error at load time.
    pub(crate) fn from_record(record: AclRecord) -> AuthDbResult<Self> {
        match record.object.as_str() {
            TAG_OBJECT => Ok(Acl::Object(AclObject {
                name: record.name,
                mode: record.mode,
            })),
            TAG_COMMAND => Ok(Acl::Command(AclCommand {
                name: record.name,
                mode: record.mode,
                commands: record.commands,
            })),
            TAG_STORE => Ok(Acl::Store(AclStore {
                name: record.name,
                mode: record.mode,
                store_paths: record.store_paths,
            })),
            other => Err(AuthDbError::UnknownAclKind(other.to_string())),
        }
    }

    pub(crate) fn to_record(&self) -> AclRecord {
        match self {
            Acl::Object(a) => AclRecord {
                object: TAG_OBJECT.to_string(),
                name: a.name.clone(),
                mode: a.mode,
                commands: Vec::new(),
                store_paths: Vec::new(),
            },
            Acl::Command(a) => AclRecord {
                object: TAG_COMMAND.to_string(),
                name: a.name.clone(),
                mode: a.mode,
                commands: a.commands.clone(),
                store_paths: Vec::new(),
            },
            Acl::Store(a) => AclRecord {
                object: TAG_STORE.to_string(),
                name: a.name.clone(),
                mode: a.mode,
                store_paths: a.store_paths.clone(),
                commands: Vec::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Acl::Object(a) => &a.name,
            Acl::Command(a) => &a.name,
            Acl::Store(a) => &a.name,
        }
    }

    pub fn mode(&self) -> AclMode {
        match self {
            Acl::Object(a) => a.mode,
            Acl::Command(a) => a.mode,
            Acl::Store(a) => a.mode,
        }
    }

    /// Kind tag as persisted in the `object` field
    pub fn kind(&self) -> &'static str {
        match self {
            Acl::Object(_) => TAG_OBJECT,
            Acl::Command(_) => TAG_COMMAND,
            Acl::Store(_) => TAG_STORE,
        }
    }
}

/// Name-keyed collection of every ACL entry loaded from the database.
///
/// Users and groups hold references (by name) into this container, not
/// ownership; references are validated once at load.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AclContainer {
    entries: BTreeMap<String, Acl>,
}

impl AclContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry; names are unique within the container
    pub fn insert(&mut self, acl: Acl) -> AuthDbResult<()> {
        let name = acl.name().to_string();
        if self.entries.contains_key(&name) {
            return Err(AuthDbError::DuplicateAcl(name));
        }
        self.entries.insert(name, acl);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Acl> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Acl> {
        self.entries.values()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn from_records(records: Vec<AclRecord>) -> AuthDbResult<Self> {
        let mut container = Self::new();
        for record in records {
            container.insert(Acl::from_record(record)?)?;
        }
        Ok(container)
    }

    pub(crate) fn to_records(&self) -> Vec<AclRecord> {
        self.entries.values().map(Acl::to_record).collect()
    }
}
