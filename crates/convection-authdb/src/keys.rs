//! API key pairs: public key plus server-issued access key id

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Number of random bytes behind a freshly minted access key id
const ACCESS_KEY_ID_LEN: usize = 20;

/// One API key pair held by a user.
///
/// The public key is client-provided; the access key id is minted server-side
/// and is what API callers present on requests. A user may hold several.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKeyPair {
    #[serde(rename = "pubkey")]
    pub public_key: String,
    pub access_key_id: String,
}

impl AccessKeyPair {
    pub fn new(public_key: impl Into<String>, access_key_id: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            access_key_id: access_key_id.into(),
        }
    }

    /// Mint a pair for a client public key with a fresh random access key id
    pub fn generate(public_key: impl Into<String>) -> Self {
        let mut raw = [0u8; ACCESS_KEY_ID_LEN];
        rand::thread_rng().fill_bytes(&mut raw);
        Self {
            public_key: public_key.into(),
            access_key_id: bs58::encode(raw).into_string(),
        }
    }
}
