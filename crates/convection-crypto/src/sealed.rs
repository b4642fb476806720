//! Sealed envelope: authenticated encryption for documents at rest.
//!
//! Layout: `magic || version || salt || nonce || ciphertext` (tag included in
//! the ciphertext). The salt is carried in the header so password-derived
//! keys can be re-derived by readers; a fresh nonce is drawn per seal.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305,
};
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};

const MAGIC: &[u8; 4] = b"CSDB";
const VERSION: u8 = 1;

const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = 4 + 1 + SALT_LEN;

// Argon2id params (OWASP recommendations)
const ARGON2_M_COST: u32 = 65536; // 64 MiB
const ARGON2_T_COST: u32 = 3; // 3 iterations
const ARGON2_P_COST: u32 = 4; // 4 parallelism

/// Symmetric encryption capability consumed by the AuthDB core and the
/// secrets store plugins.
pub trait Encryptor: Send + Sync {
    /// Seal a plaintext document
    fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Open a sealed document
    fn decrypt(&self, sealed: &[u8]) -> CryptoResult<Vec<u8>>;
}

/// Derive a 32-byte encryption key from a password and salt using Argon2id
pub fn derive_key(password: &str, salt: &[u8; SALT_LEN]) -> CryptoResult<[u8; 32]> {
    let params = Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(32))
        .map_err(|e| CryptoError::KeyDerivation(format!("invalid Argon2 parameters: {e:?}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = [0u8; 32];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(format!("{e:?}")))?;
    Ok(key)
}

/// Extract the salt from a sealed envelope header (for key re-derivation)
pub fn extract_salt(sealed: &[u8]) -> CryptoResult<[u8; SALT_LEN]> {
    if sealed.len() < HEADER_LEN {
        return Err(CryptoError::TooShort(sealed.len()));
    }
    if &sealed[0..4] != MAGIC {
        return Err(CryptoError::BadMagic);
    }
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&sealed[5..HEADER_LEN]);
    Ok(salt)
}

/// XChaCha20-Poly1305 encryptor over a fixed 32-byte key
pub struct SealedKeyEncryptor {
    key: [u8; 32],
    salt: [u8; SALT_LEN],
}

impl SealedKeyEncryptor {
    /// Wrap an externally-provisioned key. The salt is still embedded in
    /// every envelope so password-derived readers stay interoperable.
    pub fn from_key(key: [u8; 32], salt: [u8; SALT_LEN]) -> Self {
        Self { key, salt }
    }

    /// Derive the key from a password with a fresh random salt
    pub fn from_password(password: &str) -> CryptoResult<Self> {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let key = derive_key(password, &salt)?;
        Ok(Self { key, salt })
    }

    /// Derive the key from a password and the salt of an existing envelope
    pub fn from_password_and_salt(password: &str, salt: [u8; SALT_LEN]) -> CryptoResult<Self> {
        let key = derive_key(password, &salt)?;
        Ok(Self { key, salt })
    }

    /// Generate a random key (root encryptor provisioning)
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        rand::thread_rng().fill_bytes(&mut salt);
        Self { key, salt }
    }
}

impl Encryptor for SealedKeyEncryptor {
    fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let cipher = XChaCha20Poly1305::new(&self.key.into());
        let ciphertext = cipher
            .encrypt(&nonce.into(), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut output = Vec::with_capacity(HEADER_LEN + NONCE_LEN + ciphertext.len());
        output.extend_from_slice(MAGIC);
        output.push(VERSION);
        output.extend_from_slice(&self.salt);
        output.extend_from_slice(&nonce);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    fn decrypt(&self, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
        if sealed.len() < HEADER_LEN + NONCE_LEN + TAG_LEN {
            return Err(CryptoError::TooShort(sealed.len()));
        }
        if &sealed[0..4] != MAGIC {
            return Err(CryptoError::BadMagic);
        }
        let version = sealed[4];
        if version != VERSION {
            return Err(CryptoError::UnsupportedVersion(version));
        }

        let nonce: [u8; NONCE_LEN] = sealed[HEADER_LEN..HEADER_LEN + NONCE_LEN]
            .try_into()
            .map_err(|_| CryptoError::TooShort(sealed.len()))?;
        let ciphertext = &sealed[HEADER_LEN + NONCE_LEN..];

        let cipher = XChaCha20Poly1305::new(&self.key.into());
        cipher
            .decrypt(&nonce.into(), ciphertext)
            .map_err(|_| CryptoError::Decryption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_roundtrip() {
        let enc = SealedKeyEncryptor::generate();
        let sealed = enc.encrypt(b"attack at dawn").unwrap();
        assert_eq!(enc.decrypt(&sealed).unwrap(), b"attack at dawn");
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let enc = SealedKeyEncryptor::generate();
        let a = enc.encrypt(b"same input").unwrap();
        let b = enc.encrypt(b"same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let enc = SealedKeyEncryptor::generate();
        let other = SealedKeyEncryptor::generate();
        let sealed = enc.encrypt(b"secret").unwrap();

        assert!(matches!(other.decrypt(&sealed), Err(CryptoError::Decryption)));
    }

    #[test]
    fn test_bad_magic_fails() {
        let enc = SealedKeyEncryptor::generate();
        let mut sealed = enc.encrypt(b"secret").unwrap();
        sealed[0] = b'X';

        assert!(matches!(enc.decrypt(&sealed), Err(CryptoError::BadMagic)));
    }

    #[test]
    fn test_unsupported_version_fails() {
        let enc = SealedKeyEncryptor::generate();
        let mut sealed = enc.encrypt(b"secret").unwrap();
        sealed[4] = 99;

        assert!(matches!(
            enc.decrypt(&sealed),
            Err(CryptoError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_truncated_envelope_fails() {
        let enc = SealedKeyEncryptor::generate();
        let sealed = enc.encrypt(b"secret").unwrap();

        assert!(matches!(
            enc.decrypt(&sealed[..10]),
            Err(CryptoError::TooShort(10))
        ));
    }

    #[test]
    fn test_password_rederivation() {
        let enc = SealedKeyEncryptor::from_password("hunter2").unwrap();
        let sealed = enc.encrypt(b"payload").unwrap();

        let salt = extract_salt(&sealed).unwrap();
        let reader = SealedKeyEncryptor::from_password_and_salt("hunter2", salt).unwrap();
        assert_eq!(reader.decrypt(&sealed).unwrap(), b"payload");

        let wrong = SealedKeyEncryptor::from_password_and_salt("hunter3", salt).unwrap();
        assert!(wrong.decrypt(&sealed).is_err());
    }

    #[test]
    fn test_derive_key_deterministic() {
        let salt = [0x42u8; 32];
        let key1 = derive_key("password", &salt).unwrap();
        let key2 = derive_key("password", &salt).unwrap();
        assert_eq!(key1, key2);

        let key3 = derive_key("different", &salt).unwrap();
        assert_ne!(key1, key3);
    }
}
