//! Command-layer tests: delegation, concurrency, and the file-backed loader

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use convection_crypto::SealedKeyEncryptor;
use convection_secrets::{
    DirectoryStoreLoader, MemorySecretStore, NullStoreLoader, SecretArgs, SecretStore,
    SecretsError, SecretsManager, SecretsResult,
};
use serde_json::{json, Value};
use tempfile::TempDir;

fn secret_args(name: &str, value: &str) -> SecretArgs {
    let mut args = SecretArgs::new();
    args.insert("name".to_string(), json!(name));
    args.insert("value".to_string(), json!(value));
    args
}

fn ready_manager() -> SecretsManager {
    let manager = SecretsManager::new(Box::new(NullStoreLoader));
    manager.initialize(Arc::new(SealedKeyEncryptor::generate()));
    manager
}

/// Counts plugin calls and records the argument bags it was handed
#[derive(Default)]
struct RecordingStore {
    creates: AtomicUsize,
    seen: std::sync::Mutex<Vec<SecretArgs>>,
}

impl SecretStore for RecordingStore {
    fn create(&self, args: &SecretArgs) -> SecretsResult<bool> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(args.clone());
        Ok(true)
    }
    fn modify(&self, _args: &SecretArgs) -> SecretsResult<bool> {
        Ok(true)
    }
    fn destroy(&self, _args: &SecretArgs) -> SecretsResult<bool> {
        Ok(true)
    }
    fn get(&self, _args: &SecretArgs) -> SecretsResult<Value> {
        Ok(Value::Null)
    }
    fn list(&self, _args: &SecretArgs) -> SecretsResult<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Tracks how many plugin calls are in flight at once
struct GaugeStore {
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
}

impl GaugeStore {
    fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
        }
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);
        // Dwell long enough that overlapping callers would be caught
        thread::sleep(Duration::from_millis(5));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SecretStore for GaugeStore {
    fn create(&self, _args: &SecretArgs) -> SecretsResult<bool> {
        self.enter();
        Ok(true)
    }
    fn modify(&self, _args: &SecretArgs) -> SecretsResult<bool> {
        self.enter();
        Ok(true)
    }
    fn destroy(&self, _args: &SecretArgs) -> SecretsResult<bool> {
        self.enter();
        Ok(true)
    }
    fn get(&self, _args: &SecretArgs) -> SecretsResult<Value> {
        self.enter();
        Ok(Value::Null)
    }
    fn list(&self, _args: &SecretArgs) -> SecretsResult<Vec<String>> {
        self.enter();
        Ok(Vec::new())
    }
}

#[test]
fn test_happy_path_delegates_exactly_once() {
    let manager = ready_manager();
    let store = Arc::new(RecordingStore::default());
    manager.attach_store("vault1", store.clone());

    let result = manager
        .new_secret("vault1", &secret_args("db_pw", "secret123"))
        .unwrap();
    assert!(result);

    assert_eq!(store.creates.load(Ordering::SeqCst), 1);
    let seen = store.seen.lock().unwrap();
    assert_eq!(seen[0].get("name").unwrap(), &json!("db_pw"));
    assert_eq!(seen[0].get("value").unwrap(), &json!("secret123"));
}

#[test]
fn test_operations_never_overlap() {
    let manager = Arc::new(ready_manager());
    let store = Arc::new(GaugeStore::new());
    manager.attach_store("vault1", store.clone());

    let mut handles = Vec::new();
    for i in 0..8 {
        let manager = manager.clone();
        handles.push(thread::spawn(move || {
            let args = secret_args(&format!("s{i}"), "v");
            match i % 5 {
                0 => manager.new_secret("vault1", &args).map(|_| ()),
                1 => manager.update_secret("vault1", &args).map(|_| ()),
                2 => manager.remove_secret("vault1", &args).map(|_| ()),
                3 => manager.get_secret("vault1", &args).map(|_| ()),
                _ => manager.list_secrets("vault1", &args).map(|_| ()),
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(store.high_water.load(Ordering::SeqCst), 1);
}

#[test]
fn test_operations_on_different_stores_serialize_too() {
    let manager = Arc::new(ready_manager());
    let store = Arc::new(GaugeStore::new());
    manager.attach_store("vault1", store.clone());
    manager.attach_store("vault2", store.clone());

    let mut handles = Vec::new();
    for i in 0..6 {
        let manager = manager.clone();
        let target = if i % 2 == 0 { "vault1" } else { "vault2" };
        handles.push(thread::spawn(move || {
            manager.get_secret(target, &secret_args("x", "y"))
        }));
    }
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(store.high_water.load(Ordering::SeqCst), 1);
}

#[test]
fn test_rotation_guard_excludes_secret_operations() {
    let manager = Arc::new(ready_manager());
    manager.attach_store("vault1", Arc::new(MemorySecretStore::new()));

    let guard = manager.rotation_guard();
    let worker = {
        let manager = manager.clone();
        thread::spawn(move || manager.new_secret("vault1", &secret_args("k", "v")))
    };

    // The worker must block behind the rotation guard
    thread::sleep(Duration::from_millis(20));
    assert!(!worker.is_finished());

    drop(guard);
    assert!(worker.join().unwrap().unwrap());
}

#[test]
fn test_end_to_end_with_directory_loader() {
    let dir = TempDir::new().unwrap();
    let encryptor = Arc::new(SealedKeyEncryptor::generate());
    let loader = DirectoryStoreLoader::new(dir.path().join("stores"), encryptor.clone()).unwrap();
    loader.create_store("vault1").unwrap();

    let manager = SecretsManager::new(Box::new(loader));
    manager.initialize(encryptor);

    assert!(manager
        .new_secret("vault1", &secret_args("db_pw", "secret123"))
        .unwrap());
    assert_eq!(
        manager
            .get_secret("vault1", &secret_args("db_pw", ""))
            .unwrap(),
        json!("secret123")
    );
    assert_eq!(
        manager
            .list_secrets("vault1", &SecretArgs::new())
            .unwrap(),
        vec!["db_pw"]
    );

    assert!(manager
        .update_secret("vault1", &secret_args("db_pw", "rotated"))
        .unwrap());
    assert_eq!(
        manager
            .get_secret("vault1", &secret_args("db_pw", ""))
            .unwrap(),
        json!("rotated")
    );

    assert!(manager
        .remove_secret("vault1", &secret_args("db_pw", ""))
        .unwrap());
    assert!(matches!(
        manager.get_secret("vault1", &secret_args("db_pw", "")),
        Err(SecretsError::SecretNotFound(_))
    ));

    // A store that was never provisioned stays unloadable
    assert!(matches!(
        manager.get_secret("vault9", &secret_args("x", "")),
        Err(SecretsError::StoreNotLoaded(_))
    ));
}
