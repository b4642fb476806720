//! convection-secrets: the secrets store command layer
//!
//! A [`SecretsManager`] fronts any number of named, pluggable secret stores.
//! Every create/modify/destroy/get/list passes three gates (initialized,
//! unlocked, root encryptor present) and then runs under the process-wide
//! rotation lock, so no two store operations (or a store operation and a key
//! rotation) ever overlap.

mod error;
mod file;
mod manager;
mod memory;
mod store;

pub use error::{SecretsError, SecretsResult};
pub use file::{DirectoryStoreLoader, FileSecretStore};
pub use manager::SecretsManager;
pub use memory::MemorySecretStore;
pub use store::{required, required_str, NullStoreLoader, SecretArgs, SecretStore, StoreLoader};
