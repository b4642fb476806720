//! The authorization database core.
//!
//! One [`AuthDb`] owns one encrypted database file. The in-memory form is
//! either CLOSED (nothing resident) or OPEN (users, groups, and ACLs live).
//! [`AuthDb::open`] decrypts and rehydrates; [`AuthDb::save`] re-encrypts,
//! persists owner-only, and closes. Every transition and lookup goes through
//! an internal mutex, and file access holds an advisory `flock` so two
//! processes cannot interleave reads and writes on the same deployment.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use convection_crypto::Encryptor;
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::acl::{Acl, AclContainer};
use crate::document::{RawDocument, RawGroup, RawUser};
use crate::error::{AuthDbError, AuthDbResult};
use crate::group::Group;
use crate::keys::AccessKeyPair;
use crate::metadata::PluginMetadata;
use crate::token::AuthToken;
use crate::user::{is_protected, User};

/// File mode forced onto the database file after every write
const DB_FILE_MODE: u32 = 0o600;

/// Which per-user key field a lookup scans
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyField {
    AccessKeyId,
    PublicKey,
}

/// Encrypted, file-backed authorization database
pub struct AuthDb {
    path: PathBuf,
    encryptor: Arc<dyn Encryptor>,
    inner: Mutex<DbInner>,
}

struct DbInner {
    /// `None` = CLOSED
    state: Option<DbState>,
    metadata: Option<PluginMetadata>,
    /// Stored-document compatibility is verified once per process
    compat_checked: bool,
}

struct DbState {
    users: HashMap<String, User>,
    groups: HashMap<String, Group>,
    acls: AclContainer,
}

impl DbInner {
    fn state(&self) -> AuthDbResult<&DbState> {
        self.state.as_ref().ok_or(AuthDbError::NotLoaded)
    }

    fn state_mut(&mut self) -> AuthDbResult<&mut DbState> {
        self.state.as_mut().ok_or(AuthDbError::NotLoaded)
    }

    fn close(&mut self) {
        if let Some(state) = self.state.as_mut() {
            state.users.clear();
            state.groups.clear();
            state.acls.clear();
        }
        self.state = None;
    }
}

impl AuthDb {
    /// Bind to a database file. The database starts CLOSED; no I/O happens
    /// until [`open`](Self::open) or [`initialize`](Self::initialize).
    pub fn new(path: impl Into<PathBuf>, encryptor: Arc<dyn Encryptor>) -> Self {
        Self {
            path: path.into(),
            encryptor,
            inner: Mutex::new(DbInner {
                state: None,
                metadata: None,
                compat_checked: false,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the database file with the protected users provisioned.
    ///
    /// Refuses to clobber an existing file. Leaves the database CLOSED.
    pub fn initialize(&self) -> AuthDbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if self.path.exists() {
            return Err(AuthDbError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("database file already exists: {}", self.path.display()),
            )));
        }

        let mut users = HashMap::new();
        for name in crate::user::PROTECTED_USERS {
            users.insert(name.to_string(), User::new(*name));
        }
        inner.state = Some(DbState {
            users,
            groups: HashMap::new(),
            acls: AclContainer::new(),
        });
        inner.metadata = Some(PluginMetadata::current());

        self.save_inner(&mut inner)?;
        info!(path = %self.path.display(), "authorization database initialized");
        Ok(())
    }

    /// CLOSED → OPEN: decrypt, parse, and rehydrate the database.
    ///
    /// A second call while already OPEN is a no-op. The stored metadata is
    /// compatibility-checked on the first read of the process lifetime.
    /// Dangling ACL or user references fail the load outright.
    pub fn open(&self) -> AuthDbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state.is_some() {
            debug!(path = %self.path.display(), "open requested on already-open database");
            return Ok(());
        }

        let _file_lock = FileLock::acquire(&self.lock_path())?;
        let sealed = fs::read(&self.path)?;
        let plaintext = self.encryptor.decrypt(&sealed)?;
        let text = String::from_utf8(plaintext).map_err(|_| AuthDbError::NotUtf8)?;
        let doc: RawDocument = toml::from_str(&text)?;

        if !inner.compat_checked {
            PluginMetadata::current().compat_check(&doc.metadata)?;
            inner.compat_checked = true;
        }

        let (state, metadata) = rehydrate(doc)?;
        warn_on_shared_keys(&state);

        info!(
            path = %self.path.display(),
            users = state.users.len(),
            groups = state.groups.len(),
            acls = state.acls.len(),
            "authorization database opened"
        );
        inner.state = Some(state);
        inner.metadata = Some(metadata);
        Ok(())
    }

    /// OPEN → CLOSED: persist and clear.
    ///
    /// Shuffles the document layout, serializes, encrypts, writes atomically
    /// under the advisory file lock, forces mode 0600, then closes. Fails
    /// with [`AuthDbError::NotLoaded`] when CLOSED.
    ///
    /// # Panics
    ///
    /// Panics if no metadata object is resident. A database that reached
    /// OPEN without metadata is deployment corruption, not a caller error.
    pub fn save(&self) -> AuthDbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        self.save_inner(&mut inner)
    }

    fn save_inner(&self, inner: &mut DbInner) -> AuthDbResult<()> {
        let state = inner.state.as_ref().ok_or(AuthDbError::NotLoaded)?;
        let metadata = match inner.metadata.clone() {
            Some(m) => m,
            None => panic!(
                "authorization database metadata missing while open; \
                 refusing to persist a document that cannot be compat-checked"
            ),
        };

        let mut doc = build_document(state, metadata);
        doc.shuffle(&mut rand::thread_rng());

        let text = toml::to_string(&doc)?;
        let sealed = self.encryptor.encrypt(text.as_bytes())?;

        let _file_lock = FileLock::acquire(&self.lock_path())?;
        write_atomic(&self.path, &sealed)?;
        fs::set_permissions(&self.path, Permissions::from_mode(DB_FILE_MODE))?;

        info!(
            path = %self.path.display(),
            users = doc.users.len(),
            "authorization database saved and closed"
        );
        inner.close();
        Ok(())
    }

    /// Any state → CLOSED. Clears all in-memory structures. Idempotent.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.close();
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().unwrap().state.is_some()
    }

    /// username → access key ids, over every user's key pairs. Requires OPEN.
    pub fn access_key_map(&self) -> AuthDbResult<HashMap<String, Vec<String>>> {
        let inner = self.inner.lock().unwrap();
        let state = inner.state()?;
        Ok(state
            .users
            .values()
            .map(|u| {
                let ids = u.keys.iter().map(|k| k.access_key_id.clone()).collect();
                (u.name().to_string(), ids)
            })
            .collect())
    }

    /// username → public keys. Requires OPEN.
    pub fn public_key_map(&self) -> AuthDbResult<HashMap<String, Vec<String>>> {
        let inner = self.inner.lock().unwrap();
        let state = inner.state()?;
        Ok(state
            .users
            .values()
            .map(|u| {
                let keys = u.keys.iter().map(|k| k.public_key.clone()).collect();
                (u.name().to_string(), keys)
            })
            .collect())
    }

    /// Resolve a key value to the user holding it, scanning the chosen key
    /// field. Requires OPEN; a miss reports the queried value.
    pub fn user_for_key(&self, key: &str, field: KeyField) -> AuthDbResult<String> {
        let inner = self.inner.lock().unwrap();
        let state = inner.state()?;
        for user in state.users.values() {
            let hit = user.keys.iter().any(|k| match field {
                KeyField::AccessKeyId => k.access_key_id == key,
                KeyField::PublicKey => k.public_key == key,
            });
            if hit {
                return Ok(user.name().to_string());
            }
        }
        Err(AuthDbError::InvalidAccessKey(key.to_string()))
    }

    pub fn user_by_access_key(&self, access_key_id: &str) -> AuthDbResult<String> {
        self.user_for_key(access_key_id, KeyField::AccessKeyId)
    }

    pub fn user_by_public_key(&self, public_key: &str) -> AuthDbResult<String> {
        self.user_for_key(public_key, KeyField::PublicKey)
    }

    /// Snapshot of one user. Requires OPEN.
    pub fn user(&self, name: &str) -> AuthDbResult<User> {
        let inner = self.inner.lock().unwrap();
        let state = inner.state()?;
        state
            .users
            .get(name)
            .cloned()
            .ok_or_else(|| AuthDbError::UserNotFound(name.to_string()))
    }

    /// Snapshot of one group. Requires OPEN.
    pub fn group(&self, name: &str) -> AuthDbResult<Group> {
        let inner = self.inner.lock().unwrap();
        let state = inner.state()?;
        state
            .groups
            .get(name)
            .cloned()
            .ok_or_else(|| AuthDbError::GroupNotFound(name.to_string()))
    }

    /// Snapshot of one ACL entry. Requires OPEN.
    pub fn acl(&self, name: &str) -> AuthDbResult<Acl> {
        let inner = self.inner.lock().unwrap();
        let state = inner.state()?;
        state
            .acls
            .get(name)
            .cloned()
            .ok_or_else(|| AuthDbError::AclNotFound(name.to_string()))
    }

    pub fn user_names(&self) -> AuthDbResult<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let state = inner.state()?;
        let mut names: Vec<String> = state.users.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn group_names(&self) -> AuthDbResult<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let state = inner.state()?;
        let mut names: Vec<String> = state.groups.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    // === user/group management ===

    /// Add a user. Its ACL references must already resolve.
    pub fn add_user(&self, user: User) -> AuthDbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.state_mut()?;
        if state.users.contains_key(user.name()) {
            return Err(AuthDbError::UserExists(user.name().to_string()));
        }
        check_acl_refs(&state.acls, &format!("user {}", user.name()), &user.acl_names)?;
        state.users.insert(user.name().to_string(), user);
        Ok(())
    }

    /// Delete a user and drop it from every group. Protected usernames are
    /// refused.
    pub fn remove_user(&self, name: &str) -> AuthDbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.state_mut()?;
        if is_protected(name) {
            return Err(AuthDbError::ProtectedUser(name.to_string()));
        }
        if state.users.remove(name).is_none() {
            return Err(AuthDbError::UserNotFound(name.to_string()));
        }
        for group in state.groups.values_mut() {
            group.remove_member(name);
        }
        Ok(())
    }

    /// Rename a user, rewriting group memberships. Protected usernames can
    /// be neither source nor target.
    pub fn rename_user(&self, name: &str, new_name: &str) -> AuthDbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.state_mut()?;
        if is_protected(name) {
            return Err(AuthDbError::ProtectedUser(name.to_string()));
        }
        if is_protected(new_name) {
            return Err(AuthDbError::ProtectedUser(new_name.to_string()));
        }
        if state.users.contains_key(new_name) {
            return Err(AuthDbError::UserExists(new_name.to_string()));
        }
        let user = state
            .users
            .remove(name)
            .ok_or_else(|| AuthDbError::UserNotFound(name.to_string()))?;

        let mut renamed = User::new(new_name);
        renamed.keys = user.keys;
        renamed.tokens = user.tokens;
        renamed.acl_names = user.acl_names;
        state.users.insert(new_name.to_string(), renamed);

        for group in state.groups.values_mut() {
            if group.remove_member(name) {
                group.add_member(new_name);
            }
        }
        Ok(())
    }

    pub fn add_user_key(&self, name: &str, key: AccessKeyPair) -> AuthDbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.state_mut()?;
        let user = state
            .users
            .get_mut(name)
            .ok_or_else(|| AuthDbError::UserNotFound(name.to_string()))?;
        user.add_key(key);
        Ok(())
    }

    pub fn revoke_user_key(&self, name: &str, access_key_id: &str) -> AuthDbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.state_mut()?;
        let user = state
            .users
            .get_mut(name)
            .ok_or_else(|| AuthDbError::UserNotFound(name.to_string()))?;
        user.revoke_key(access_key_id)
    }

    pub fn add_user_token(&self, name: &str, token: AuthToken) -> AuthDbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.state_mut()?;
        let user = state
            .users
            .get_mut(name)
            .ok_or_else(|| AuthDbError::UserNotFound(name.to_string()))?;
        user.add_token(token);
        Ok(())
    }

    /// Add a group. Member and ACL references must already resolve.
    pub fn add_group(&self, group: Group) -> AuthDbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.state_mut()?;
        if state.groups.contains_key(group.name()) {
            return Err(AuthDbError::GroupExists(group.name().to_string()));
        }
        for member in &group.user_names {
            if !state.users.contains_key(member) {
                return Err(AuthDbError::DanglingUserRef {
                    group: group.name().to_string(),
                    user: member.clone(),
                });
            }
        }
        check_acl_refs(
            &state.acls,
            &format!("group {}", group.name()),
            &group.acl_names,
        )?;
        state.groups.insert(group.name().to_string(), group);
        Ok(())
    }

    pub fn remove_group(&self, name: &str) -> AuthDbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.state_mut()?;
        if state.groups.remove(name).is_none() {
            return Err(AuthDbError::GroupNotFound(name.to_string()));
        }
        Ok(())
    }

    pub fn add_group_member(&self, group: &str, user: &str) -> AuthDbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.state_mut()?;
        if !state.users.contains_key(user) {
            return Err(AuthDbError::DanglingUserRef {
                group: group.to_string(),
                user: user.to_string(),
            });
        }
        let entry = state
            .groups
            .get_mut(group)
            .ok_or_else(|| AuthDbError::GroupNotFound(group.to_string()))?;
        entry.add_member(user);
        Ok(())
    }

    pub fn remove_group_member(&self, group: &str, user: &str) -> AuthDbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.state_mut()?;
        let entry = state
            .groups
            .get_mut(group)
            .ok_or_else(|| AuthDbError::GroupNotFound(group.to_string()))?;
        entry.remove_member(user);
        Ok(())
    }

    /// Register a new ACL entry
    pub fn add_acl(&self, acl: Acl) -> AuthDbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.state_mut()?;
        state.acls.insert(acl)
    }

    /// Attach an existing ACL to a user by name
    pub fn grant_user_acl(&self, name: &str, acl_name: &str) -> AuthDbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.state_mut()?;
        if !state.acls.contains(acl_name) {
            return Err(AuthDbError::AclNotFound(acl_name.to_string()));
        }
        let user = state
            .users
            .get_mut(name)
            .ok_or_else(|| AuthDbError::UserNotFound(name.to_string()))?;
        if !user.acl_names.iter().any(|a| a == acl_name) {
            user.acl_names.push(acl_name.to_string());
        }
        Ok(())
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }
}

fn check_acl_refs(acls: &AclContainer, owner: &str, names: &[String]) -> AuthDbResult<()> {
    for name in names {
        if !acls.contains(name) {
            return Err(AuthDbError::DanglingAclRef {
                owner: owner.to_string(),
                acl: name.clone(),
            });
        }
    }
    Ok(())
}

/// Rebuild live state from a parsed document: ACLs first, then users, then
/// groups, so every reference can be validated against what came before it.
fn rehydrate(doc: RawDocument) -> AuthDbResult<(DbState, PluginMetadata)> {
    let acls = AclContainer::from_records(doc.acls)?;

    let mut users = HashMap::with_capacity(doc.users.len());
    for (name, raw) in doc.users {
        check_acl_refs(&acls, &format!("user {name}"), &raw.acls)?;
        let mut user = User::new(name.clone());
        user.keys = raw.keys;
        user.tokens = raw.tokens;
        user.acl_names = raw.acls;
        users.insert(name, user);
    }

    let mut groups = HashMap::with_capacity(doc.groups.len());
    for (name, raw) in doc.groups {
        for member in &raw.users {
            if !users.contains_key(member) {
                return Err(AuthDbError::DanglingUserRef {
                    group: name.clone(),
                    user: member.clone(),
                });
            }
        }
        check_acl_refs(&acls, &format!("group {name}"), &raw.acls)?;
        let mut group = Group::new(name.clone());
        group.user_names = raw.users;
        group.acl_names = raw.acls;
        groups.insert(name, group);
    }

    Ok((
        DbState {
            users,
            groups,
            acls,
        },
        doc.metadata,
    ))
}

fn build_document(state: &DbState, metadata: PluginMetadata) -> RawDocument {
    let mut users = IndexMap::with_capacity(state.users.len());
    for user in state.users.values() {
        users.insert(
            user.name().to_string(),
            RawUser {
                tokens: user.tokens.clone(),
                acls: user.acl_names.clone(),
                keys: user.keys.clone(),
            },
        );
    }

    let mut groups = IndexMap::with_capacity(state.groups.len());
    for group in state.groups.values() {
        groups.insert(
            group.name().to_string(),
            RawGroup {
                users: group.user_names.clone(),
                acls: group.acl_names.clone(),
            },
        );
    }

    RawDocument {
        metadata,
        users,
        groups,
        acls: state.acls.to_records(),
    }
}

/// Key material is expected to be unique across users; a shared id makes
/// key-to-user resolution order-dependent. Not a load failure, only surfaced
/// for operators.
fn warn_on_shared_keys(state: &DbState) {
    let mut by_access_key: HashMap<&str, &str> = HashMap::new();
    let mut by_public_key: HashMap<&str, &str> = HashMap::new();

    for user in state.users.values() {
        for key in &user.keys {
            if let Some(holder) = by_access_key.insert(key.access_key_id.as_str(), user.name()) {
                warn!(
                    access_key_id = %key.access_key_id,
                    first = holder,
                    second = user.name(),
                    "access key id held by multiple key pairs"
                );
            }
            if let Some(holder) = by_public_key.insert(key.public_key.as_str(), user.name()) {
                warn!(
                    first = holder,
                    second = user.name(),
                    "public key held by multiple key pairs"
                );
            }
        }
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    // Owner-only before the data becomes visible under the real name
    fs::set_permissions(&tmp, Permissions::from_mode(DB_FILE_MODE))?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Advisory exclusive lock on a sidecar file, held for the duration of a
/// database read or write. Blocks until the holder releases.
struct FileLock {
    file: File,
}

impl FileLock {
    fn acquire(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).write(true).open(path)?;
        {
            use std::os::unix::io::AsRawFd;
            let fd = file.as_raw_fd();
            // SAFETY: flock is a standard POSIX call; fd is a valid
            // descriptor owned by `file`. LOCK_EX blocks until granted.
            let rc = unsafe { libc::flock(fd, libc::LOCK_EX) };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;
        // SAFETY: fd is still owned by `self.file`; LOCK_UN cannot fail in a
        // way we could meaningfully handle during drop.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}
