use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use shared_models::auth::User;
use shared_models::error::ClientError;

/// The three persisted client entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    AccessToken,
    RefreshToken,
    User,
}

impl StorageKey {
    pub const ALL: [StorageKey; 3] = [StorageKey::AccessToken, StorageKey::RefreshToken, StorageKey::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::AccessToken => "accessToken",
            StorageKey::RefreshToken => "refreshToken",
            StorageKey::User => "user",
        }
    }
}

/// Key/value storage backing the session. Reads are synchronous and cheap.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: StorageKey) -> Option<String>;
    fn set(&self, key: StorageKey, value: &str) -> Result<(), ClientError>;
    fn remove(&self, key: StorageKey) -> Result<(), ClientError>;
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<StorageKey, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: StorageKey) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&key).cloned()
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), ClientError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<(), ClientError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(&key);
        Ok(())
    }
}

/// JSON file store so a login survives between CLI invocations.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileSessionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| ClientError::Storage(format!("{}: {}", path.display(), e)))?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&raw)
                    .map_err(|e| ClientError::Storage(format!("{}: {}", path.display(), e)))?
            }
        } else {
            HashMap::new()
        };

        debug!("Opened session file {} with {} entries", path.display(), entries.len());

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| ClientError::Storage(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let serialized = serde_json::to_string_pretty(entries)
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        write_private(&self.path, &serialized)
            .map_err(|e| ClientError::Storage(format!("{}: {}", self.path.display(), e)))
    }
}

/// Writes `contents` readable by the owner only; the file holds bearer tokens.
fn write_private(path: &Path, contents: &str) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    // `mode` only applies on creation.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(contents.as_bytes())
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: StorageKey) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key.as_str()).cloned()
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), ClientError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.as_str().to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: StorageKey) -> Result<(), ClientError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.remove(key.as_str()).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}

/// Credentials shared by the client pipeline and the services. Cloning is
/// cheap and every clone sees the same store.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn SessionStore>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

impl Session {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionStore::new()))
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.get(StorageKey::AccessToken).filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.store.get(StorageKey::RefreshToken).filter(|t| !t.is_empty())
    }

    pub fn user(&self) -> Option<User> {
        let raw = self.store.get(StorageKey::User)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("Ignoring unreadable cached user profile: {}", e);
                None
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    pub fn store_tokens(&self, access_token: &str, refresh_token: Option<&str>) -> Result<(), ClientError> {
        self.store.set(StorageKey::AccessToken, access_token)?;
        if let Some(refresh_token) = refresh_token {
            self.store.set(StorageKey::RefreshToken, refresh_token)?;
        }
        Ok(())
    }

    pub fn store_access_token(&self, access_token: &str) -> Result<(), ClientError> {
        self.store.set(StorageKey::AccessToken, access_token)
    }

    pub fn store_user(&self, user: &User) -> Result<(), ClientError> {
        let serialized = serde_json::to_string(user)?;
        self.store.set(StorageKey::User, &serialized)
    }

    /// Drops every stored credential. Storage failures are logged, never returned.
    pub fn clear(&self) {
        for key in StorageKey::ALL {
            if let Err(e) = self.store.remove(key) {
                warn!("Failed to clear {}: {}", key.as_str(), e);
            }
        }
        debug!("Session cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_user() -> User {
        User {
            id: "7".to_string(),
            email: Some("admin@clinic.test".to_string()),
            name: Some("Admin".to_string()),
            role: Some("admin".to_string()),
        }
    }

    #[test]
    fn test_memory_session_lifecycle() {
        let session = Session::in_memory();
        assert!(!session.is_authenticated());

        session.store_tokens("access-1", Some("refresh-1")).unwrap();
        session.store_user(&sample_user()).unwrap();

        assert_eq!(session.access_token().as_deref(), Some("access-1"));
        assert_eq!(session.refresh_token().as_deref(), Some("refresh-1"));
        assert_eq!(session.user(), Some(sample_user()));

        session.clear();
        assert!(session.access_token().is_none());
        assert!(session.refresh_token().is_none());
        assert!(session.user().is_none());
    }

    #[test]
    fn test_store_access_token_keeps_refresh_token() {
        let session = Session::in_memory();
        session.store_tokens("access-1", Some("refresh-1")).unwrap();
        session.store_access_token("access-2").unwrap();

        assert_eq!(session.access_token().as_deref(), Some("access-2"));
        assert_eq!(session.refresh_token().as_deref(), Some("refresh-1"));
    }

    #[test]
    fn test_clones_share_storage() {
        let session = Session::in_memory();
        let other = session.clone();
        session.store_access_token("shared").unwrap();
        assert_eq!(other.access_token().as_deref(), Some("shared"));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        {
            let store = FileSessionStore::open(&path).unwrap();
            let session = Session::new(Arc::new(store));
            session.store_tokens("access-1", Some("refresh-1")).unwrap();
            session.store_user(&sample_user()).unwrap();
        }

        let reopened = Session::new(Arc::new(FileSessionStore::open(&path).unwrap()));
        assert_eq!(reopened.access_token().as_deref(), Some("access-1"));
        assert_eq!(reopened.refresh_token().as_deref(), Some("refresh-1"));
        assert_eq!(reopened.user(), Some(sample_user()));

        reopened.clear();
        let cleared = Session::new(Arc::new(FileSessionStore::open(&path).unwrap()));
        assert!(!cleared.is_authenticated());
        assert!(cleared.user().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let fresh = dir.path().join("fresh.json");
        let existing = dir.path().join("existing.json");
        fs::write(&existing, "{}").unwrap();
        fs::set_permissions(&existing, fs::Permissions::from_mode(0o644)).unwrap();

        for path in [&fresh, &existing] {
            let session = Session::new(Arc::new(FileSessionStore::open(path).unwrap()));
            session.store_tokens("access-1", Some("refresh-1")).unwrap();

            let mode = fs::metadata(path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600, "{}", path.display());
        }
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{ not json").unwrap();

        let result = FileSessionStore::open(&path);
        assert!(matches!(result, Err(ClientError::Storage(_))));
    }

    #[test]
    fn test_unreadable_user_is_ignored() {
        let store = Arc::new(MemorySessionStore::new());
        store.set(StorageKey::User, "not-json").unwrap();
        let session = Session::new(store);
        assert!(session.user().is_none());
    }
}
