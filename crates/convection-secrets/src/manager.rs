//! The secrets command layer.
//!
//! [`SecretsManager`] mediates every secret operation: state checks up
//! front, then the rotation lock for the duration of the store call. The
//! same lock must be taken by key-rotation logic, so a rotation and a
//! secret operation can never interleave.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use convection_crypto::Encryptor;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{SecretsError, SecretsResult};
use crate::store::{SecretArgs, SecretStore, StoreLoader};

pub struct SecretsManager {
    initialized: AtomicBool,
    locked: AtomicBool,
    root_encryptor: RwLock<Option<Arc<dyn Encryptor>>>,
    /// Serializes all secret-store access process-wide, shared with rotation
    rotation_lock: Mutex<()>,
    /// Lazily populated store registry; entries are never evicted
    stores: Mutex<HashMap<String, Arc<dyn SecretStore>>>,
    loader: Box<dyn StoreLoader>,
}

impl SecretsManager {
    /// A manager starts uninitialized; no secret operation succeeds until
    /// [`initialize`](Self::initialize).
    pub fn new(loader: Box<dyn StoreLoader>) -> Self {
        Self {
            initialized: AtomicBool::new(false),
            locked: AtomicBool::new(false),
            root_encryptor: RwLock::new(None),
            rotation_lock: Mutex::new(()),
            stores: Mutex::new(HashMap::new()),
            loader,
        }
    }

    /// Install the root encryptor and mark the manager ready
    pub fn initialize(&self, root: Arc<dyn Encryptor>) {
        *self.root_encryptor.write().unwrap() = Some(root);
        self.locked.store(false, Ordering::SeqCst);
        self.initialized.store(true, Ordering::SeqCst);
        info!("secrets manager initialized");
    }

    /// Refuse all secret operations until [`unlock`](Self::unlock)
    pub fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
        info!("secrets manager locked");
    }

    pub fn unlock(&self, root: Arc<dyn Encryptor>) {
        *self.root_encryptor.write().unwrap() = Some(root);
        self.locked.store(false, Ordering::SeqCst);
        info!("secrets manager unlocked");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// Swap the root encryptor. Rotation-only: callers must hold
    /// [`rotation_guard`](Self::rotation_guard) while the old and new roots
    /// are being exchanged.
    pub fn set_root_encryptor(&self, root: Option<Arc<dyn Encryptor>>) {
        *self.root_encryptor.write().unwrap() = root;
    }

    /// The process-wide mutual-exclusion guard around secret-store access.
    /// Key-rotation logic takes this same guard.
    pub fn rotation_guard(&self) -> MutexGuard<'_, ()> {
        self.rotation_lock.lock().unwrap()
    }

    /// Register a store directly, bypassing the lazy loader
    pub fn attach_store(&self, name: impl Into<String>, store: Arc<dyn SecretStore>) {
        self.stores.lock().unwrap().insert(name.into(), store);
    }

    /// Names of stores currently resident in the registry
    pub fn loaded_store_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    // === secret operations ===

    pub fn new_secret(&self, store_name: &str, args: &SecretArgs) -> SecretsResult<bool> {
        self.check_ready()?;
        let _rotation = self.rotation_lock.lock().unwrap();
        let store = self.store_handle(store_name)?;
        store.create(args)
    }

    pub fn update_secret(&self, store_name: &str, args: &SecretArgs) -> SecretsResult<bool> {
        self.check_ready()?;
        let _rotation = self.rotation_lock.lock().unwrap();
        let store = self.store_handle(store_name)?;
        store.modify(args)
    }

    pub fn remove_secret(&self, store_name: &str, args: &SecretArgs) -> SecretsResult<bool> {
        self.check_ready()?;
        let _rotation = self.rotation_lock.lock().unwrap();
        let store = self.store_handle(store_name)?;
        store.destroy(args)
    }

    pub fn get_secret(&self, store_name: &str, args: &SecretArgs) -> SecretsResult<Value> {
        self.check_ready()?;
        let _rotation = self.rotation_lock.lock().unwrap();
        let store = self.store_handle(store_name)?;
        store.get(args)
    }

    pub fn list_secrets(&self, store_name: &str, args: &SecretArgs) -> SecretsResult<Vec<String>> {
        self.check_ready()?;
        let _rotation = self.rotation_lock.lock().unwrap();
        let store = self.store_handle(store_name)?;
        store.list(args)
    }

    /// State checks shared by every operation, before the lock is touched.
    ///
    /// # Panics
    ///
    /// Panics when the manager is initialized and unlocked but has no root
    /// encryptor. That state cannot be reached through this API without a
    /// rotation gone wrong, and secrets must not be touched under it.
    fn check_ready(&self) -> SecretsResult<()> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(SecretsError::NotInitialized);
        }
        if self.locked.load(Ordering::SeqCst) {
            return Err(SecretsError::Locked);
        }
        if self.root_encryptor.read().unwrap().is_none() {
            panic!(
                "root encryptor missing on an initialized, unlocked secrets manager; \
                 refusing to touch secret stores"
            );
        }
        Ok(())
    }

    /// Fetch a store handle, loading and caching it on first touch.
    /// Callers hold the rotation lock.
    fn store_handle(&self, name: &str) -> SecretsResult<Arc<dyn SecretStore>> {
        let mut stores = self.stores.lock().unwrap();
        if let Some(store) = stores.get(name) {
            return Ok(store.clone());
        }

        debug!(store = name, "loading secrets store");
        match self.loader.load(name)? {
            Some(store) => {
                stores.insert(name.to_string(), store.clone());
                Ok(store)
            }
            None => Err(SecretsError::StoreNotLoaded(name.to_string())),
        }
    }
}
