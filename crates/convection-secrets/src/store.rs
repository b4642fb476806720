//! Store plugin contract

use std::sync::Arc;

use serde_json::Value;

use crate::error::{SecretsError, SecretsResult};

/// Operation arguments, opaque to the command layer.
///
/// The manager passes these through to the plugin verbatim; which keys are
/// meaningful is a per-plugin contract.
pub type SecretArgs = serde_json::Map<String, Value>;

/// A named, pluggable secrets backend.
///
/// Implementations must be thread-safe; the command layer serializes calls
/// through its rotation lock, but a store handle may be shared more widely.
pub trait SecretStore: Send + Sync {
    /// Store a new secret. Fails if the secret already exists.
    fn create(&self, args: &SecretArgs) -> SecretsResult<bool>;

    /// Replace an existing secret. Fails if the secret does not exist.
    fn modify(&self, args: &SecretArgs) -> SecretsResult<bool>;

    /// Remove a secret. Fails if the secret does not exist.
    fn destroy(&self, args: &SecretArgs) -> SecretsResult<bool>;

    /// Fetch a secret's decrypted payload.
    fn get(&self, args: &SecretArgs) -> SecretsResult<Value>;

    /// Names of stored secrets.
    fn list(&self, args: &SecretArgs) -> SecretsResult<Vec<String>>;
}

/// Materializes stores on first touch.
///
/// `Ok(None)` means the name does not correspond to a loadable store; the
/// manager turns that into [`SecretsError::StoreNotLoaded`].
pub trait StoreLoader: Send + Sync {
    fn load(&self, name: &str) -> SecretsResult<Option<Arc<dyn SecretStore>>>;
}

/// A loader for managers that only use directly attached stores
pub struct NullStoreLoader;

impl StoreLoader for NullStoreLoader {
    fn load(&self, _name: &str) -> SecretsResult<Option<Arc<dyn SecretStore>>> {
        Ok(None)
    }
}

/// Fetch a required string argument
pub fn required_str<'a>(args: &'a SecretArgs, name: &'static str) -> SecretsResult<&'a str> {
    match args.get(name) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(SecretsError::InvalidArgument {
            name,
            reason: format!("expected string, got {other}"),
        }),
        None => Err(SecretsError::MissingArgument(name)),
    }
}

/// Fetch a required argument of any shape
pub fn required<'a>(args: &'a SecretArgs, name: &'static str) -> SecretsResult<&'a Value> {
    args.get(name).ok_or(SecretsError::MissingArgument(name))
}
