//! User entity

use crate::error::{AuthDbError, AuthDbResult};
use crate::keys::AccessKeyPair;
use crate::token::AuthToken;

/// Usernames reserved by the system; they can never be deleted or renamed
pub const PROTECTED_USERS: &[&str] = &["root", "recovery"];

pub fn is_protected(name: &str) -> bool {
    PROTECTED_USERS.contains(&name)
}

/// A provisioned user: key pairs, issued tokens, and ACL references.
///
/// `acl_names` are lookup keys into the database's
/// [`AclContainer`](crate::AclContainer), validated when the database is
/// loaded and treated as immutable for the rest of the open session.
#[derive(Clone, Debug, PartialEq)]
pub struct User {
    name: String,
    pub keys: Vec<AccessKeyPair>,
    pub tokens: Vec<AuthToken>,
    pub acl_names: Vec<String>,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: Vec::new(),
            tokens: Vec::new(),
            acl_names: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_protected(&self) -> bool {
        is_protected(&self.name)
    }

    pub fn add_key(&mut self, key: AccessKeyPair) {
        self.keys.push(key);
    }

    /// Drop the key pair holding the given access key id
    pub fn revoke_key(&mut self, access_key_id: &str) -> AuthDbResult<()> {
        let before = self.keys.len();
        self.keys.retain(|k| k.access_key_id != access_key_id);
        if self.keys.len() == before {
            return Err(AuthDbError::InvalidAccessKey(access_key_id.to_string()));
        }
        Ok(())
    }

    pub fn add_token(&mut self, token: AuthToken) {
        self.tokens.push(token);
    }

    /// Drop expired tokens, returning how many were removed
    pub fn prune_tokens(&mut self) -> usize {
        let before = self.tokens.len();
        self.tokens.retain(|t| !t.is_expired());
        before - self.tokens.len()
    }
}
