//! Crypto error types

use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Envelope too short: {0} bytes")]
    TooShort(usize),

    #[error("Invalid envelope (bad magic)")]
    BadMagic,

    #[error("Unsupported envelope version: {0}")]
    UnsupportedVersion(u8),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed (wrong key?)")]
    Decryption,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}
