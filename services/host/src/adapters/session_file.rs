//! services/host/src/adapters/session_file.rs
//!
//! Persists signed-in sessions as JSON files, one per user, the host-side
//! counterpart of the platform's secure storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;
use unveil_core::domain::AuthSession;
use unveil_core::ports::{PortError, PortResult, SessionStorage};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    dir: PathBuf,
}

impl FileSessionStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, user_id: Uuid) -> PathBuf {
        self.dir.join(format!("{user_id}.json"))
    }
}

fn io_error(path: &Path, e: std::io::Error) -> PortError {
    PortError::Unexpected(format!("Session file {}: {e}", path.display()))
}

#[async_trait]
impl SessionStorage for FileSessionStorage {
    async fn load(&self, user_id: Uuid) -> PortResult<Option<AuthSession>> {
        let path = self.path_for(user_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };
        match serde_json::from_slice::<AuthSession>(&raw) {
            Ok(session) if session.user.id == user_id => Ok(Some(session)),
            Ok(session) => {
                warn!(
                    "Session file {:?} belongs to user {}, ignoring",
                    path, session.user.id
                );
                Ok(None)
            }
            Err(e) => {
                warn!("Ignoring unreadable session file {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    async fn save(&self, session: &AuthSession) -> PortResult<()> {
        let raw = serde_json::to_vec_pretty(session)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;
        let path = self.path_for(session.user.id);
        tokio::fs::write(&path, raw)
            .await
            .map_err(|e| io_error(&path, e))
    }

    async fn clear(&self, user_id: Uuid) -> PortResult<()> {
        let path = self.path_for(user_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}
