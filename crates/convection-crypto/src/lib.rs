//! convection-crypto: sealed-envelope encryption for the secrets manager
//!
//! Everything persisted by the manager (the authorization database and the
//! per-store secret documents) goes through an [`Encryptor`]. The concrete
//! [`SealedKeyEncryptor`] wraps XChaCha20-Poly1305 with an Argon2id password
//! KDF; consumers only ever see the trait.

mod error;
mod sealed;

pub use error::{CryptoError, CryptoResult};
pub use sealed::{derive_key, extract_salt, Encryptor, SealedKeyEncryptor};
