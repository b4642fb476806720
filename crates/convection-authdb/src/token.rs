//! API tokens issued to users

use serde::{Deserialize, Serialize};

/// An opaque API token tied to a user.
///
/// Only the fields this core needs are typed; anything else a future issuer
/// attaches survives a load/save cycle untouched via the flattened table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthToken {
    pub token: String,
    pub issued_at: u64,
    /// Unix seconds, 0 = no expiry
    #[serde(default)]
    pub expires_at: u64,
    #[serde(flatten)]
    pub extra: toml::value::Table,
}

impl AuthToken {
    pub fn new(token: impl Into<String>, issued_at: u64, expires_at: Option<u64>) -> Self {
        Self {
            token: token.into(),
            issued_at,
            expires_at: expires_at.unwrap_or(0),
            extra: toml::value::Table::new(),
        }
    }

    pub fn is_expired(&self) -> bool {
        if self.expires_at == 0 {
            return false;
        }

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();

        now > self.expires_at
    }
}
