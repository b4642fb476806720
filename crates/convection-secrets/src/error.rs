//! Secrets manager error types

use thiserror::Error;

pub type SecretsResult<T> = Result<T, SecretsError>;

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("Secrets manager is not initialized")]
    NotInitialized,

    #[error("Secrets manager is locked")]
    Locked,

    #[error("Secrets store could not be loaded: {0}")]
    StoreNotLoaded(String),

    #[error("Secret not found: {0}")]
    SecretNotFound(String),

    #[error("Secret already exists: {0}")]
    AlreadyExists(String),

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Invalid argument {name}: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("Store backend error: {0}")]
    Store(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] convection_crypto::CryptoError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
