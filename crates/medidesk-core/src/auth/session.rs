use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Session file name in the session directory
const SESSION_FILE: &str = "session.json";

/// Read access to the session token plus the writes login/logout need.
///
/// Reads happen on every outbound request and must not block on I/O.
pub trait TokenStore: Send + Sync {
    fn token(&self) -> Option<String>;

    fn set_token(&self, token: String) -> Result<()>;

    fn clear(&self) -> Result<()>;

    fn has_session(&self) -> bool {
        self.token().is_some()
    }
}

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
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_token(&self, token: String) -> Result<()> {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionData {
    pub token: String,
    #[serde(default)]
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(token: impl Into<String>, username: Option<String>) -> Self {
        Self {
            token: token.into(),
            username,
            created_at: Utc::now(),
        }
    }
}

/// Token store persisted as JSON so the session survives restarts.
///
/// The file is read once on open; afterwards reads come from memory and
/// every write goes through to disk.
pub struct FileTokenStore {
    session_dir: PathBuf,
    data: RwLock<Option<SessionData>>,
}

impl FileTokenStore {
    /// Open the store, loading an existing session file if present.
    pub fn open(session_dir: impl Into<PathBuf>) -> Result<Self> {
        let session_dir = session_dir.into();
        let data = Self::load(&session_dir.join(SESSION_FILE))?;
        debug!(has_session = data.is_some(), dir = %session_dir.display(), "Session store opened");
        Ok(Self {
            session_dir,
            data: RwLock::new(data),
        })
    }

    fn load(path: &Path) -> Result<Option<SessionData>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path).context("Failed to read session file")?;
        let data: SessionData =
            serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(Some(data))
    }

    /// Replace the stored session, keeping the username alongside the token.
    pub fn save_session(&self, data: SessionData) -> Result<()> {
        let path = self.session_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create session directory")?;
        }
        let contents = serde_json::to_string_pretty(&data)?;
        std::fs::write(&path, contents).context("Failed to write session file")?;
        *self.data.write().unwrap_or_else(|e| e.into_inner()) = Some(data);
        Ok(())
    }

    pub fn session(&self) -> Option<SessionData> {
        self.data.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn session_path(&self) -> PathBuf {
        self.session_dir.join(SESSION_FILE)
    }
}

impl TokenStore for FileTokenStore {
    fn token(&self) -> Option<String> {
        self.data
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|d| d.token.clone())
    }

    fn set_token(&self, token: String) -> Result<()> {
        let username = self.session().and_then(|d| d.username);
        self.save_session(SessionData::new(token, username))
    }

    fn clear(&self) -> Result<()> {
        *self.data.write().unwrap_or_else(|e| e.into_inner()) = None;
        let path = self.session_path();
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(error = %e, "Failed to remove session file");
                return Err(e).context("Failed to remove session file");
            }
        }
        Ok(())
    }
}
