//! In-memory secrets store (for testing and embedding)

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;

use crate::error::{SecretsError, SecretsResult};
use crate::store::{required, required_str, SecretArgs, SecretStore};

/// Thread-safe map-backed store. Not persistent; contents are lost on drop.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<String, Value>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.secrets.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.secrets.write().unwrap().clear();
    }
}

impl SecretStore for MemorySecretStore {
    fn create(&self, args: &SecretArgs) -> SecretsResult<bool> {
        let name = required_str(args, "name")?;
        let value = required(args, "value")?;

        let mut secrets = self.secrets.write().unwrap();
        if secrets.contains_key(name) {
            return Err(SecretsError::AlreadyExists(name.to_string()));
        }
        secrets.insert(name.to_string(), value.clone());
        Ok(true)
    }

    fn modify(&self, args: &SecretArgs) -> SecretsResult<bool> {
        let name = required_str(args, "name")?;
        let value = required(args, "value")?;

        let mut secrets = self.secrets.write().unwrap();
        match secrets.get_mut(name) {
            Some(slot) => {
                *slot = value.clone();
                Ok(true)
            }
            None => Err(SecretsError::SecretNotFound(name.to_string())),
        }
    }

    fn destroy(&self, args: &SecretArgs) -> SecretsResult<bool> {
        let name = required_str(args, "name")?;

        let mut secrets = self.secrets.write().unwrap();
        if secrets.remove(name).is_none() {
            return Err(SecretsError::SecretNotFound(name.to_string()));
        }
        Ok(true)
    }

    fn get(&self, args: &SecretArgs) -> SecretsResult<Value> {
        let name = required_str(args, "name")?;

        self.secrets
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| SecretsError::SecretNotFound(name.to_string()))
    }

    fn list(&self, _args: &SecretArgs) -> SecretsResult<Vec<String>> {
        let mut names: Vec<String> = self.secrets.read().unwrap().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(name: &str, value: Option<Value>) -> SecretArgs {
        let mut map = SecretArgs::new();
        map.insert("name".to_string(), json!(name));
        if let Some(value) = value {
            map.insert("value".to_string(), value);
        }
        map
    }

    #[test]
    fn test_create_get_roundtrip() {
        let store = MemorySecretStore::new();
        assert!(store
            .create(&args("db_pw", Some(json!("secret123"))))
            .unwrap());

        let value = store.get(&args("db_pw", None)).unwrap();
        assert_eq!(value, json!("secret123"));
    }

    #[test]
    fn test_create_rejects_duplicate() {
        let store = MemorySecretStore::new();
        store.create(&args("x", Some(json!(1)))).unwrap();

        let result = store.create(&args("x", Some(json!(2))));
        assert!(matches!(result, Err(SecretsError::AlreadyExists(_))));
        assert_eq!(store.get(&args("x", None)).unwrap(), json!(1));
    }

    #[test]
    fn test_modify_requires_existing() {
        let store = MemorySecretStore::new();
        let result = store.modify(&args("ghost", Some(json!(1))));
        assert!(matches!(result, Err(SecretsError::SecretNotFound(_))));

        store.create(&args("x", Some(json!(1)))).unwrap();
        store.modify(&args("x", Some(json!(2)))).unwrap();
        assert_eq!(store.get(&args("x", None)).unwrap(), json!(2));
    }

    #[test]
    fn test_destroy() {
        let store = MemorySecretStore::new();
        store.create(&args("x", Some(json!(1)))).unwrap();

        assert!(store.destroy(&args("x", None)).unwrap());
        assert!(matches!(
            store.destroy(&args("x", None)),
            Err(SecretsError::SecretNotFound(_))
        ));
    }

    #[test]
    fn test_list_sorted() {
        let store = MemorySecretStore::new();
        store.create(&args("zeta", Some(json!(1)))).unwrap();
        store.create(&args("alpha", Some(json!(2)))).unwrap();

        assert_eq!(store.list(&SecretArgs::new()).unwrap(), vec!["alpha", "zeta"]);
    }
}
