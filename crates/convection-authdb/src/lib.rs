//! convection-authdb: the encrypted authorization database
//!
//! Users (with API key pairs and tokens), groups, and named ACL rules,
//! persisted as one encrypted TOML document per deployment. The database is
//! a strict CLOSED/OPEN state machine: nothing is resident until
//! [`AuthDb::open`] and everything is cleared again by [`AuthDb::save`] or
//! [`AuthDb::close`]. All references between entities are by name and are
//! validated when the document is loaded.

mod acl;
mod db;
mod document;
mod error;
mod group;
mod keys;
mod metadata;
mod token;
mod user;

pub use acl::{Acl, AclCommand, AclContainer, AclMode, AclObject, AclStore};
pub use db::{AuthDb, KeyField};
pub use error::{AuthDbError, AuthDbResult};
pub use group::Group;
pub use keys::AccessKeyPair;
pub use metadata::{PluginMetadata, PLUGIN_NAME, PLUGIN_VERSION};
pub use token::AuthToken;
pub use user::{is_protected, User, PROTECTED_USERS};
