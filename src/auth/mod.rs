//! Bearer-token storage for the operator session.
//!
//! Every request reads the token from a [`TokenStore`]; a `401` from the
//! backend clears it (see `client::ApiClient`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
};
use tracing::{debug, warn};

use crate::errors::ServiceError;

pub trait TokenStore: Send + Sync {
    fn token(&self) -> Option<String>;
    fn store(&self, token: &str) -> Result<(), ServiceError>;
    fn clear(&self) -> Result<(), ServiceError>;
}

/// Token held only for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|guard| guard.clone())
    }

    fn store(&self, token: &str) -> Result<(), ServiceError> {
        let mut guard = self
            .token
            .write()
            .map_err(|_| ServiceError::InvalidState("token store poisoned".into()))?;
        *guard = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), ServiceError> {
        if let Ok(mut guard) = self.token.write() {
            *guard = None;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    #[serde(default)]
    pub operator: Option<String>,
    pub saved_at: DateTime<Utc>,
}

/// Token persisted as a small JSON session file, shared between CLI runs.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_session(&self) -> Result<Option<StoredSession>, ServiceError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&self.path)?;
        let session = serde_json::from_str(&data)?;
        Ok(Some(session))
    }

    pub fn save_session(&self, session: &StoredSession) -> Result<(), ServiceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let payload = serde_json::to_vec_pretty(session)?;
        fs::write(&self.path, payload)?;
        debug!(path = %self.path.display(), "session saved");
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn token(&self) -> Option<String> {
        match self.read_session() {
            Ok(session) => session.map(|s| s.access_token),
            Err(err) => {
                warn!(path = %self.path.display(), "ignoring unreadable session file: {}", err);
                None
            }
        }
    }

    fn store(&self, token: &str) -> Result<(), ServiceError> {
        let operator = self.read_session().ok().flatten().and_then(|s| s.operator);
        self.save_session(&StoredSession {
            access_token: token.to_string(),
            operator,
            saved_at: Utc::now(),
        })
    }

    fn clear(&self) -> Result<(), ServiceError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryTokenStore::with_token("abc");
        assert_eq!(store.token().as_deref(), Some("abc"));
        store.clear().unwrap();
        assert_eq!(store.token(), None);
    }

    #[test]
    fn file_store_persists_and_clears() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested").join("session.json"));
        assert_eq!(store.token(), None);

        store.store("token-123").unwrap();
        assert_eq!(store.token().as_deref(), Some("token-123"));
        assert!(store.path().exists());

        store.clear().unwrap();
        assert_eq!(store.token(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn corrupt_session_file_reads_as_signed_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();
        assert_eq!(FileTokenStore::new(path).token(), None);
    }
}
