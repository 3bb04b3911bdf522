//! Token pair persistence.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::jwt::TokenPair;

/// What the client remembers between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<String>,
}

impl SessionState {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.identity_id.is_none()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("session file io: {0}")]
    Io(#[from] std::io::Error),
    #[error("session file format: {0}")]
    Format(#[from] serde_json::Error),
}

/// Durable home for [`SessionState`].
pub trait SessionStorage: Send + Sync {
    fn load(&self) -> Result<SessionState, StorageError>;
    fn save(&self, state: &SessionState) -> Result<(), StorageError>;
    fn clear(&self) -> Result<(), StorageError>;
}

/// JSON file on disk.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.keyward/session.json`, or a relative fallback without a home directory.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(".keyward"))
            .unwrap_or_else(|| PathBuf::from(".keyward"))
            .join("session.json")
    }
}

impl SessionStorage for FileStorage {
    fn load(&self) -> Result<SessionState, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SessionState::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, state: &SessionState) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            create_private_dir(parent)?;
        }
        let content = serde_json::to_string_pretty(state)?;

        // Write then rename so a crash never leaves half a pair on disk
        let tmp = self.path.with_extension("json.tmp");
        write_private(&tmp, content.as_bytes())?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Create `dir` and its parents; on Unix new directories are 0o700.
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}

/// Write `data` readable by the owner only. The file holds a refresh token.
fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;

    // mode() only applies on creation; tighten a leftover temp file too
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(data)?;
    file.sync_all()
}

/// Process-local storage, lost on exit.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<SessionState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<SessionState, StorageError> {
        Ok(self.state.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, state: &SessionState) -> Result<(), StorageError> {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state.clone();
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = SessionState::default();
        Ok(())
    }
}

/// Holds the current session and keeps storage in sync with it.
///
/// Both tokens always change together under one write lock. Storage is
/// written before the in-memory copy, so a failed save leaves the old pair
/// in place.
pub struct SessionManager {
    storage: Box<dyn SessionStorage>,
    state: RwLock<SessionState>,
}

impl SessionManager {
    /// Load any existing session from `storage`.
    pub fn open(storage: impl SessionStorage + 'static) -> Result<Self, StorageError> {
        let state = storage.load()?;
        Ok(Self {
            storage: Box::new(storage),
            state: RwLock::new(state),
        })
    }

    /// Manager backed by [`MemoryStorage`].
    pub fn in_memory() -> Self {
        Self {
            storage: Box::new(MemoryStorage::new()),
            state: RwLock::new(SessionState::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current(&self) -> SessionState {
        self.read().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token.clone()
    }

    pub fn identity_id(&self) -> Option<String> {
        self.read().identity_id.clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.read().refresh_token.is_some()
    }

    /// Full replacement after login or registration.
    pub fn replace(&self, pair: &TokenPair, identity_id: &str) -> Result<(), StorageError> {
        let next = SessionState {
            access_token: Some(pair.access_token.clone()),
            refresh_token: Some(pair.refresh_token.clone()),
            identity_id: Some(identity_id.to_string()),
        };
        let mut state = self.write();
        self.storage.save(&next)?;
        *state = next;
        debug!(identity_id = %identity_id, "Session replaced");
        Ok(())
    }

    /// Swap in a refreshed pair, keeping the identity.
    pub fn rotate(&self, pair: &TokenPair) -> Result<(), StorageError> {
        let mut state = self.write();
        let next = SessionState {
            access_token: Some(pair.access_token.clone()),
            refresh_token: Some(pair.refresh_token.clone()),
            identity_id: state.identity_id.clone(),
        };
        self.storage.save(&next)?;
        *state = next;
        debug!("Session rotated");
        Ok(())
    }

    /// Forget everything. The in-memory state is cleared even if storage fails.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut state = self.write();
        *state = SessionState::default();
        self.storage.clear()
    }
}
