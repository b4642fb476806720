//! AuthDB error types

use thiserror::Error;

pub type AuthDbResult<T> = Result<T, AuthDbError>;

#[derive(Debug, Error)]
pub enum AuthDbError {
    #[error("Authorization database is not loaded")]
    NotLoaded,

    #[error("No user holds key: {0}")]
    InvalidAccessKey(String),

    #[error("Unknown ACL kind: {0}")]
    UnknownAclKind(String),

    #[error("Duplicate ACL name: {0}")]
    DuplicateAcl(String),

    #[error("ACL not found: {0}")]
    AclNotFound(String),

    #[error("{owner} references missing ACL: {acl}")]
    DanglingAclRef { owner: String, acl: String },

    #[error("Group {group} references missing user: {user}")]
    DanglingUserRef { group: String, user: String },

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Group already exists: {0}")]
    GroupExists(String),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Username is protected: {0}")]
    ProtectedUser(String),

    #[error("Stored database is incompatible: plugin {stored_plugin} v{stored_version}, runtime expects {runtime_plugin} v{runtime_version}")]
    Incompatible {
        stored_plugin: String,
        stored_version: String,
        runtime_plugin: String,
        runtime_version: String,
    },

    #[error("Database payload is not valid UTF-8")]
    NotUtf8,

    #[error("Crypto error: {0}")]
    Crypto(#[from] convection_crypto::CryptoError),

    #[error("Failed to serialize database: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to parse database: {0}")]
    Deserialize(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
