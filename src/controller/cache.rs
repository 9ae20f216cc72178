//! Last-known POI snapshot kept on the client.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::Poi;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoiCache {
    pub pois: Vec<Poi>,
    /// When the store last answered a full fetch.
    #[serde(default)]
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl PoiCache {
    pub fn new(pois: Vec<Poi>, last_sync_time: Option<DateTime<Utc>>) -> Self {
        Self {
            pois,
            last_sync_time,
        }
    }

    /// The cached snapshot, or `None` when there is none or it cannot be read.
    pub async fn load(path: &Path) -> Result<Option<Self>, AppError> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::Internal(format!(
                    "Failed to read POI cache {:?}: {}",
                    path, e
                )))
            }
        };

        match serde_json::from_str(&raw) {
            Ok(cache) => Ok(Some(cache)),
            Err(e) => {
                tracing::warn!("Ignoring unreadable POI cache {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    /// Replace the cache file with this snapshot.
    pub async fn save(&self, path: &Path) -> Result<(), AppError> {
        let io_error = |e: std::io::Error| {
            AppError::Internal(format!("Failed to write POI cache {:?}: {}", path, e))
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Internal(format!("Failed to encode POI cache: {}", e)))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw).await.map_err(io_error)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_error)?;
        Ok(())
    }
}
