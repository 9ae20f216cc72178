//! Anonymous sessions and the acting identity behind a request.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Opaque identifier of an anonymous authoring session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A client's session, created on first use and kept until replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            session_id: SessionId::generate(),
            created_at: Utc::now(),
        }
    }

    /// Read the session persisted at `path`, creating one if none exists yet.
    pub async fn load_or_create(path: &Path) -> Result<Self, AppError> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(session) => Ok(session),
                Err(e) => {
                    tracing::warn!("Discarding unreadable session file {:?}: {}", path, e);
                    Self::renew(path).await
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::renew(path).await,
            Err(e) => Err(session_io_error(path, e)),
        }
    }

    /// Replace the persisted session with a new one. Drafts created under the
    /// previous id can no longer be edited or deleted from this client.
    pub async fn renew(path: &Path) -> Result<Self, AppError> {
        let session = Self::new();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| session_io_error(path, e))?;
        }
        let raw = serde_json::to_string_pretty(&session)
            .map_err(|e| AppError::Internal(format!("Failed to encode session: {}", e)))?;
        tokio::fs::write(path, raw)
            .await
            .map_err(|e| session_io_error(path, e))?;
        tracing::info!("Started session {}", session.session_id);
        Ok(session)
    }
}

fn session_io_error(path: &Path, err: std::io::Error) -> AppError {
    tracing::error!("Session file {:?}: {}", path, err);
    AppError::Internal(format!("Failed to access session file {:?}: {}", path, err))
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Who is performing an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor {
    pub session: Option<SessionId>,
    /// Out-of-band capability granting approve/edit/delete on any draft.
    pub elevated: bool,
}

impl Actor {
    pub fn new(session: Option<SessionId>, elevated: bool) -> Self {
        Self { session, elevated }
    }

    pub fn for_session(session: SessionId) -> Self {
        Self::new(Some(session), false)
    }

    pub fn elevated(session: SessionId) -> Self {
        Self::new(Some(session), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_session_created_lazily_and_reused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client").join("session.json");

        let first = Session::load_or_create(&path).await.unwrap();
        let second = Session::load_or_create(&path).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_renew_replaces_session() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");

        let first = Session::load_or_create(&path).await.unwrap();
        let renewed = Session::renew(&path).await.unwrap();
        let reloaded = Session::load_or_create(&path).await.unwrap();

        assert_ne!(first.session_id, renewed.session_id);
        assert_eq!(renewed, reloaded);
    }

    #[tokio::test]
    async fn test_corrupt_session_file_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let session = Session::load_or_create(&path).await.unwrap();
        assert!(!session.session_id.as_str().is_empty());
    }

    #[tokio::test]
    async fn test_session_file_failure_is_internal() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        tokio::fs::write(&blocker, "a file, not a directory").await.unwrap();
        let path = blocker.join("session.json");

        let err = Session::renew(&path).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)), "{:?}", err);
        let err = Session::load_or_create(&path).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)), "{:?}", err);
    }
}
