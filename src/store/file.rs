//! Two flat JSON files: `pois.json` (approved) and `pois-draft.json` (draft).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    amend_in, approve_into, delete_draft, write_draft, ApprovalSnapshot, PoiStore, StoreInfo,
    StoreSnapshot,
};
use crate::errors::AppError;
use crate::models::Poi;

pub const APPROVED_FILE: &str = "pois.json";
pub const DRAFT_FILE: &str = "pois-draft.json";

/// File-backed store. Each write rewrites the whole collection.
pub struct JsonFileStore {
    dir: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open a store rooted at `dir`, creating the directory and seeding
    /// both files with `[]` if they are missing.
    pub async fn open(dir: &Path) -> Result<Self, AppError> {
        tokio::fs::create_dir_all(dir).await?;
        let store = Self {
            dir: dir.to_path_buf(),
            lock: Mutex::new(()),
        };
        for path in [store.approved_path(), store.draft_path()] {
            if !tokio::fs::try_exists(&path).await? {
                tracing::info!("Creating empty POI file {:?}", path);
                Self::write_list(&path, &[]).await?;
            }
        }
        Ok(store)
    }

    pub fn approved_path(&self) -> PathBuf {
        self.dir.join(APPROVED_FILE)
    }

    pub fn draft_path(&self) -> PathBuf {
        self.dir.join(DRAFT_FILE)
    }

    async fn read_list(path: &Path) -> Result<Vec<Poi>, AppError> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|e| {
            tracing::error!("Unreadable POI file {:?}: {}", path, e);
            AppError::Internal(format!("Unreadable POI file {}: {}", path.display(), e))
        })
    }

    /// Write to a sibling temp file, then rename over the target.
    async fn write_list(path: &Path, pois: &[Poi]) -> Result<(), AppError> {
        let body = serde_json::to_string_pretty(pois)
            .map_err(|e| AppError::Internal(format!("Failed to encode POIs: {}", e)))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn write_draft_file(&self, poi: Poi) -> Result<StoreSnapshot, AppError> {
        let _guard = self.lock.lock().await;
        let path = self.draft_path();
        let mut draft = Self::read_list(&path).await?;
        let message = write_draft(&mut draft, poi);
        Self::write_list(&path, &draft).await?;
        Ok(StoreSnapshot { message, pois: draft })
    }
}

#[async_trait]
impl PoiStore for JsonFileStore {
    async fn fetch_approved(&self) -> Result<Vec<Poi>, AppError> {
        Self::read_list(&self.approved_path()).await
    }

    async fn fetch_draft(&self) -> Result<Vec<Poi>, AppError> {
        Self::read_list(&self.draft_path()).await
    }

    async fn submit_create(&self, poi: Poi) -> Result<StoreSnapshot, AppError> {
        self.write_draft_file(poi).await
    }

    async fn submit_update(&self, poi: Poi) -> Result<StoreSnapshot, AppError> {
        self.write_draft_file(poi).await
    }

    async fn submit_delete(&self, id: &str) -> Result<StoreSnapshot, AppError> {
        let _guard = self.lock.lock().await;
        let path = self.draft_path();
        let mut draft = Self::read_list(&path).await?;
        delete_draft(&mut draft, id)?;
        Self::write_list(&path, &draft).await?;
        Ok(StoreSnapshot {
            message: "POI deleted successfully".to_string(),
            pois: draft,
        })
    }

    async fn submit_approve(&self, poi: Poi) -> Result<ApprovalSnapshot, AppError> {
        let _guard = self.lock.lock().await;
        let mut draft = Self::read_list(&self.draft_path()).await?;
        let mut approved = Self::read_list(&self.approved_path()).await?;

        let outcome = approve_into(&mut draft, &mut approved, poi);

        // Approved is written before draft; an interrupted approve leaves the
        // record in both files, which reconcile resolves.
        Self::write_list(&self.approved_path(), &approved).await?;
        Self::write_list(&self.draft_path(), &draft).await?;

        Ok(ApprovalSnapshot {
            outcome,
            draft,
            approved,
        })
    }

    async fn amend_approved(&self, poi: Poi) -> Result<StoreSnapshot, AppError> {
        let _guard = self.lock.lock().await;
        let path = self.approved_path();
        let mut approved = Self::read_list(&path).await?;
        amend_in(&mut approved, poi)?;
        Self::write_list(&path, &approved).await?;
        Ok(StoreSnapshot {
            message: "Approved POI updated".to_string(),
            pois: approved,
        })
    }

    async fn inspect(&self) -> Result<StoreInfo, AppError> {
        let exists = tokio::fs::try_exists(&self.dir).await?;
        let mut files = Vec::new();
        if exists {
            let mut entries = tokio::fs::read_dir(&self.dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
            files.sort();
        }
        Ok(StoreInfo {
            backend: "file".to_string(),
            location: self.dir.display().to_string(),
            exists,
            files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coord;
    use crate::store::{load_working_set, ApprovalOutcome};
    use tempfile::TempDir;

    fn poi(id: &str) -> Poi {
        Poi {
            id: id.to_string(),
            kind: "landmark".to_string(),
            description: "tower".to_string(),
            x: Coord::new(10),
            y: Coord::new(-20),
            visible: true,
            approved: false,
            session_id: None,
            date_added: None,
            last_edited: None,
        }
    }

    #[tokio::test]
    async fn test_missing_files_read_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        tokio::fs::remove_file(store.approved_path()).await.unwrap();
        tokio::fs::write(store.draft_path(), "  \n").await.unwrap();

        assert!(store.fetch_approved().await.unwrap().is_empty());
        assert!(store.fetch_draft().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_then_approve_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();

        store.submit_create(poi("a")).await.unwrap();
        store.submit_create(poi("b")).await.unwrap();
        let snapshot = store.submit_approve(poi("a")).await.unwrap();

        assert_eq!(snapshot.outcome, ApprovalOutcome::Approved);
        assert_eq!(snapshot.draft.len(), 1);
        assert_eq!(snapshot.approved.len(), 1);

        let raw = tokio::fs::read_to_string(store.approved_path()).await.unwrap();
        assert!(raw.contains("\"+0010\""));
        assert!(raw.contains("\"-0020\""));

        let set = load_working_set(&store).await.unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.get("a").unwrap().approved);
        assert!(!set.get("b").unwrap().approved);
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();

        let err = store.submit_delete("ghost").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reads_legacy_numeric_records() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        tokio::fs::write(
            store.approved_path(),
            r#"[{"id":"poi-1","type":"boss","x":12,"y":-4.4}]"#,
        )
        .await
        .unwrap();

        let approved = store.fetch_approved().await.unwrap();
        assert_eq!(approved[0].x, Coord::new(12));
        assert_eq!(approved[0].y, Coord::new(-4));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_internal_error() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        tokio::fs::write(store.draft_path(), "{ nope").await.unwrap();

        let err = store.fetch_draft().await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn test_open_seeds_both_files() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("pois");
        let store = JsonFileStore::open(&data).await.unwrap();

        let info = store.inspect().await.unwrap();
        assert_eq!(info.backend, "file");
        assert!(info.exists);
        assert_eq!(info.files, vec![DRAFT_FILE.to_string(), APPROVED_FILE.to_string()]);

        let raw = tokio::fs::read_to_string(store.draft_path()).await.unwrap();
        assert_eq!(raw.trim(), "[]");
    }
}
