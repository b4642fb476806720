//! On-disk document shape.
//!
//! The persisted database is `encrypt(toml(RawDocument))`. This module owns
//! the wire structs only; rehydration into live entities (with reference
//! validation) lives in the database core.

use indexmap::IndexMap;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::acl::AclRecord;
use crate::keys::AccessKeyPair;
use crate::metadata::PluginMetadata;
use crate::token::AuthToken;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RawDocument {
    pub metadata: PluginMetadata,
    #[serde(default)]
    pub users: IndexMap<String, RawUser>,
    #[serde(default)]
    pub groups: IndexMap<String, RawGroup>,
    #[serde(default)]
    pub acls: Vec<AclRecord>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct RawUser {
    #[serde(default)]
    pub tokens: Vec<AuthToken>,
    #[serde(default)]
    pub acls: Vec<String>,
    #[serde(default)]
    pub keys: Vec<AccessKeyPair>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct RawGroup {
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub acls: Vec<String>,
}

impl RawDocument {
    /// Re-randomize document layout before persisting.
    ///
    /// Runs on every save, ahead of serialization. Entry order carries no
    /// meaning on the wire, so each written file gets a fresh arrangement.
    pub(crate) fn shuffle(&mut self, rng: &mut impl Rng) {
        shuffle_map(&mut self.users, rng);
        shuffle_map(&mut self.groups, rng);
        self.acls.shuffle(rng);
    }
}

fn shuffle_map<V>(map: &mut IndexMap<String, V>, rng: &mut impl Rng) {
    let mut entries: Vec<(String, V)> = map.drain(..).collect();
    entries.shuffle(rng);
    map.extend(entries);
}
