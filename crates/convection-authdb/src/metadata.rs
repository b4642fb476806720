//! Database document metadata and compatibility checking

use serde::{Deserialize, Serialize};

use crate::error::{AuthDbError, AuthDbResult};

/// Plugin name stamped into every document this runtime writes
pub const PLUGIN_NAME: &str = "authdb";

/// Document format version this runtime writes
pub const PLUGIN_VERSION: &str = "1.0.0";

/// Metadata header persisted with the database document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub plugin: String,
    pub version: String,
}

impl PluginMetadata {
    pub fn current() -> Self {
        Self {
            plugin: PLUGIN_NAME.to_string(),
            version: PLUGIN_VERSION.to_string(),
        }
    }

    /// Verify a stored document can be trusted by this runtime.
    ///
    /// Same plugin name and same major version; anything else refuses to
    /// load rather than misreading the document.
    pub fn compat_check(&self, stored: &PluginMetadata) -> AuthDbResult<()> {
        if self.plugin == stored.plugin && major(&self.version) == major(&stored.version) {
            return Ok(());
        }
        Err(AuthDbError::Incompatible {
            stored_plugin: stored.plugin.clone(),
            stored_version: stored.version.clone(),
            runtime_plugin: self.plugin.clone(),
            runtime_version: self.version.clone(),
        })
    }
}

/// Leading component of a dotted version; None never equals Some
fn major(version: &str) -> Option<u64> {
    version.split('.').next()?.parse().ok()
}
