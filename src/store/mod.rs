//! External store contract for POI persistence.
//!
//! The store keeps two collections: approved (committed) and draft (pending).
//! Creates, updates and deletes only touch the draft collection; approval moves
//! a record across.

mod file;
mod http;
mod memory;
mod sqlite;

pub use file::JsonFileStore;
pub use http::HttpStore;
pub use memory::MemoryStore;
pub use sqlite::{init_database, SqliteStore};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{Config, StoreBackend};
use crate::errors::AppError;
use crate::models::{Poi, SessionId};
use crate::reconcile::{reconcile, WorkingSet};

/// State of one collection after a write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub message: String,
    pub pois: Vec<Poi>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApprovalOutcome {
    Approved,
    AlreadyApproved,
}

/// Both collections after an approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalSnapshot {
    pub outcome: ApprovalOutcome,
    pub draft: Vec<Poi>,
    pub approved: Vec<Poi>,
}

/// Diagnostic description of a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreInfo {
    pub backend: String,
    pub location: String,
    pub exists: bool,
    #[serde(default)]
    pub files: Vec<String>,
}

/// Persistence operations consumed by the reconciliation engine.
#[async_trait]
pub trait PoiStore: Send + Sync {
    /// Committed POIs. A missing store reads as empty.
    async fn fetch_approved(&self) -> Result<Vec<Poi>, AppError>;

    /// Pending POIs. A missing store reads as empty.
    async fn fetch_draft(&self) -> Result<Vec<Poi>, AppError>;

    /// Upsert into the draft collection.
    async fn submit_create(&self, poi: Poi) -> Result<StoreSnapshot, AppError>;

    /// Upsert into the draft collection; an unknown id is created.
    async fn submit_update(&self, poi: Poi) -> Result<StoreSnapshot, AppError>;

    /// Remove from the draft collection; `NotFound` if absent.
    async fn submit_delete(&self, id: &str) -> Result<StoreSnapshot, AppError>;

    /// Move a record from draft to approved. No-op success when already approved.
    async fn submit_approve(&self, poi: Poi) -> Result<ApprovalSnapshot, AppError>;

    /// Rewrite an approved record in place; `NotFound` if it is not approved.
    async fn amend_approved(&self, poi: Poi) -> Result<StoreSnapshot, AppError>;

    async fn inspect(&self) -> Result<StoreInfo, AppError>;

    /// Act as `session` on later writes. Local backends ignore it; the
    /// caller's identity only matters to a remote store.
    fn set_session(&self, _session: SessionId) {}
}

/// Fetch both collections and merge them.
pub async fn load_working_set(store: &dyn PoiStore) -> Result<WorkingSet, AppError> {
    let (approved, draft) = tokio::try_join!(store.fetch_approved(), store.fetch_draft())?;
    Ok(reconcile(approved, draft))
}

/// Open the backend selected in `config`.
pub async fn open_store(config: &Config) -> Result<Arc<dyn PoiStore>, AppError> {
    let store: Arc<dyn PoiStore> = match config.store_backend {
        StoreBackend::File => Arc::new(JsonFileStore::open(&config.data_dir).await?),
        StoreBackend::Sqlite => {
            let pool = init_database(&config.db_path).await?;
            Arc::new(SqliteStore::new(pool, config.db_path.display().to_string()))
        }
        StoreBackend::Memory => Arc::new(MemoryStore::default()),
    };
    Ok(store)
}

// List helpers shared by the file and memory backends.

/// Insert or replace by id. Returns true when the id was new.
pub(crate) fn upsert(list: &mut Vec<Poi>, poi: Poi) -> bool {
    match list.iter_mut().find(|p| p.id == poi.id) {
        Some(existing) => {
            *existing = poi;
            false
        }
        None => {
            list.push(poi);
            true
        }
    }
}

pub(crate) fn remove(list: &mut Vec<Poi>, id: &str) -> Option<Poi> {
    let index = list.iter().position(|p| p.id == id)?;
    Some(list.remove(index))
}

pub(crate) fn write_draft(draft: &mut Vec<Poi>, mut poi: Poi) -> String {
    poi.approved = false;
    if upsert(draft, poi) {
        "POI added successfully".to_string()
    } else {
        "POI updated successfully".to_string()
    }
}

pub(crate) fn delete_draft(draft: &mut Vec<Poi>, id: &str) -> Result<(), AppError> {
    remove(draft, id)
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(format!("POI {} not found", id)))
}

pub(crate) fn approve_into(draft: &mut Vec<Poi>, approved: &mut Vec<Poi>, mut poi: Poi) -> ApprovalOutcome {
    let was_draft = remove(draft, &poi.id).is_some();
    if !was_draft && approved.iter().any(|p| p.id == poi.id) {
        return ApprovalOutcome::AlreadyApproved;
    }
    poi.approved = true;
    upsert(approved, poi);
    ApprovalOutcome::Approved
}

pub(crate) fn amend_in(approved: &mut [Poi], mut poi: Poi) -> Result<(), AppError> {
    let existing = approved
        .iter_mut()
        .find(|p| p.id == poi.id)
        .ok_or_else(|| AppError::NotFound(format!("Approved POI {} not found", poi.id)))?;
    poi.approved = true;
    *existing = poi;
    Ok(())
}
