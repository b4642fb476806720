//! Encrypted file-backed secrets store

use std::fs::{self, File, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use convection_crypto::Encryptor;
use serde_json::Value;
use tracing::debug;

use crate::error::{SecretsError, SecretsResult};
use crate::store::{required, required_str, SecretArgs, SecretStore, StoreLoader};

/// File mode for store documents
const STORE_FILE_MODE: u32 = 0o600;

/// Directory mode for the store root
const STORE_DIR_MODE: u32 = 0o700;

const STORE_EXTENSION: &str = "store";

type SecretDoc = serde_json::Map<String, Value>;

/// One store = one encrypted JSON document on disk.
///
/// Every operation reads the document, applies the change, and writes it
/// back atomically with owner-only permissions.
pub struct FileSecretStore {
    path: PathBuf,
    encryptor: Arc<dyn Encryptor>,
    io_lock: Mutex<()>,
}

impl FileSecretStore {
    /// Bind to an existing store file
    pub fn new(path: impl Into<PathBuf>, encryptor: Arc<dyn Encryptor>) -> Self {
        Self {
            path: path.into(),
            encryptor,
            io_lock: Mutex::new(()),
        }
    }

    /// Create an empty store file. Refuses to clobber an existing one.
    pub fn initialize(
        path: impl Into<PathBuf>,
        encryptor: Arc<dyn Encryptor>,
    ) -> SecretsResult<Self> {
        let store = Self::new(path, encryptor);
        if store.path.exists() {
            return Err(SecretsError::AlreadyExists(store.path.display().to_string()));
        }
        store.write_doc(&SecretDoc::new())?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_doc(&self) -> SecretsResult<SecretDoc> {
        let sealed = fs::read(&self.path)?;
        let plaintext = self.encryptor.decrypt(&sealed)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    fn write_doc(&self, doc: &SecretDoc) -> SecretsResult<()> {
        let plaintext = serde_json::to_vec(doc)?;
        let sealed = self.encryptor.encrypt(&plaintext)?;
        write_atomic(&self.path, &sealed)?;
        Ok(())
    }
}

impl SecretStore for FileSecretStore {
    fn create(&self, args: &SecretArgs) -> SecretsResult<bool> {
        let name = required_str(args, "name")?;
        let value = required(args, "value")?;

        let _io = self.io_lock.lock().unwrap();
        let mut doc = self.read_doc()?;
        if doc.contains_key(name) {
            return Err(SecretsError::AlreadyExists(name.to_string()));
        }
        doc.insert(name.to_string(), value.clone());
        self.write_doc(&doc)?;
        Ok(true)
    }

    fn modify(&self, args: &SecretArgs) -> SecretsResult<bool> {
        let name = required_str(args, "name")?;
        let value = required(args, "value")?;

        let _io = self.io_lock.lock().unwrap();
        let mut doc = self.read_doc()?;
        if !doc.contains_key(name) {
            return Err(SecretsError::SecretNotFound(name.to_string()));
        }
        doc.insert(name.to_string(), value.clone());
        self.write_doc(&doc)?;
        Ok(true)
    }

    fn destroy(&self, args: &SecretArgs) -> SecretsResult<bool> {
        let name = required_str(args, "name")?;

        let _io = self.io_lock.lock().unwrap();
        let mut doc = self.read_doc()?;
        if doc.remove(name).is_none() {
            return Err(SecretsError::SecretNotFound(name.to_string()));
        }
        self.write_doc(&doc)?;
        Ok(true)
    }

    fn get(&self, args: &SecretArgs) -> SecretsResult<Value> {
        let name = required_str(args, "name")?;

        let _io = self.io_lock.lock().unwrap();
        let doc = self.read_doc()?;
        doc.get(name)
            .cloned()
            .ok_or_else(|| SecretsError::SecretNotFound(name.to_string()))
    }

    fn list(&self, _args: &SecretArgs) -> SecretsResult<Vec<String>> {
        let _io = self.io_lock.lock().unwrap();
        let doc = self.read_doc()?;
        let mut names: Vec<String> = doc.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Loads [`FileSecretStore`]s from a 0700 root directory, one file per store
pub struct DirectoryStoreLoader {
    root: PathBuf,
    encryptor: Arc<dyn Encryptor>,
}

impl DirectoryStoreLoader {
    /// Create the loader, ensuring the root directory exists owner-only
    pub fn new(root: impl Into<PathBuf>, encryptor: Arc<dyn Encryptor>) -> SecretsResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        fs::set_permissions(&root, Permissions::from_mode(STORE_DIR_MODE))?;
        Ok(Self { root, encryptor })
    }

    /// Provision a new, empty store under this root
    pub fn create_store(&self, name: &str) -> SecretsResult<()> {
        validate_store_name(name)?;
        FileSecretStore::initialize(self.store_path(name), self.encryptor.clone())?;
        debug!(store = name, "created secrets store");
        Ok(())
    }

    fn store_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{STORE_EXTENSION}"))
    }
}

impl StoreLoader for DirectoryStoreLoader {
    fn load(&self, name: &str) -> SecretsResult<Option<Arc<dyn SecretStore>>> {
        validate_store_name(name)?;
        let path = self.store_path(name);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Arc::new(FileSecretStore::new(
            path,
            self.encryptor.clone(),
        ))))
    }
}

/// Store names become file names; reject anything that could escape the root
fn validate_store_name(name: &str) -> SecretsResult<()> {
    if name.is_empty() || name.len() > 255 {
        return Err(SecretsError::InvalidArgument {
            name: "store_name",
            reason: "must be 1-255 characters".to_string(),
        });
    }
    if name.contains('/') || name.contains('\0') || name.contains("..") {
        return Err(SecretsError::InvalidArgument {
            name: "store_name",
            reason: "contains path characters".to_string(),
        });
    }
    Ok(())
}

fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::set_permissions(&tmp, Permissions::from_mode(STORE_FILE_MODE))?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use convection_crypto::SealedKeyEncryptor;
    use serde_json::json;
    use tempfile::TempDir;

    fn args(name: &str, value: Option<Value>) -> SecretArgs {
        let mut map = SecretArgs::new();
        map.insert("name".to_string(), json!(name));
        if let Some(value) = value {
            map.insert("value".to_string(), value);
        }
        map
    }

    fn test_store(dir: &TempDir) -> FileSecretStore {
        FileSecretStore::initialize(
            dir.path().join("vault1.store"),
            Arc::new(SealedKeyEncryptor::generate()),
        )
        .unwrap()
    }

    #[test]
    fn test_crud_cycle() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        store
            .create(&args("db_pw", Some(json!("secret123"))))
            .unwrap();
        assert_eq!(store.get(&args("db_pw", None)).unwrap(), json!("secret123"));

        store.modify(&args("db_pw", Some(json!("rotated")))).unwrap();
        assert_eq!(store.get(&args("db_pw", None)).unwrap(), json!("rotated"));

        assert_eq!(store.list(&SecretArgs::new()).unwrap(), vec!["db_pw"]);

        store.destroy(&args("db_pw", None)).unwrap();
        assert!(matches!(
            store.get(&args("db_pw", None)),
            Err(SecretsError::SecretNotFound(_))
        ));
    }

    #[test]
    fn test_persists_across_handles() {
        let dir = TempDir::new().unwrap();
        let encryptor = Arc::new(SealedKeyEncryptor::generate());
        let path = dir.path().join("vault1.store");

        let store = FileSecretStore::initialize(&path, encryptor.clone()).unwrap();
        store.create(&args("k", Some(json!(42)))).unwrap();
        drop(store);

        let reopened = FileSecretStore::new(&path, encryptor);
        assert_eq!(reopened.get(&args("k", None)).unwrap(), json!(42));
    }

    #[test]
    fn test_initialize_refuses_existing() {
        let dir = TempDir::new().unwrap();
        let encryptor = Arc::new(SealedKeyEncryptor::generate());
        let path = dir.path().join("vault1.store");

        FileSecretStore::initialize(&path, encryptor.clone()).unwrap();
        assert!(matches!(
            FileSecretStore::initialize(&path, encryptor),
            Err(SecretsError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_store_file_is_owner_only() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        store.create(&args("k", Some(json!(1)))).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_loader_misses_unknown_store() {
        let dir = TempDir::new().unwrap();
        let loader = DirectoryStoreLoader::new(
            dir.path().join("stores"),
            Arc::new(SealedKeyEncryptor::generate()),
        )
        .unwrap();

        assert!(loader.load("vault1").unwrap().is_none());

        loader.create_store("vault1").unwrap();
        assert!(loader.load("vault1").unwrap().is_some());
    }

    #[test]
    fn test_loader_rejects_path_escapes() {
        let dir = TempDir::new().unwrap();
        let loader = DirectoryStoreLoader::new(
            dir.path().join("stores"),
            Arc::new(SealedKeyEncryptor::generate()),
        )
        .unwrap();

        for bad in ["", "../etc/passwd", "a/b", "x\0y"] {
            assert!(loader.load(bad).is_err(), "accepted {bad:?}");
        }
    }
}
