//! In-process store; contents are lost on restart.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    amend_in, approve_into, delete_draft, write_draft, ApprovalSnapshot, PoiStore, StoreInfo,
    StoreSnapshot,
};
use crate::errors::AppError;
use crate::models::Poi;

#[derive(Default)]
struct Collections {
    approved: Vec<Poi>,
    draft: Vec<Poi>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    /// Seeded store, mainly for tests and demos.
    pub fn with_pois(approved: Vec<Poi>, draft: Vec<Poi>) -> Self {
        Self {
            inner: RwLock::new(Collections { approved, draft }),
        }
    }
}

#[async_trait]
impl PoiStore for MemoryStore {
    async fn fetch_approved(&self) -> Result<Vec<Poi>, AppError> {
        Ok(self.inner.read().await.approved.clone())
    }

    async fn fetch_draft(&self) -> Result<Vec<Poi>, AppError> {
        Ok(self.inner.read().await.draft.clone())
    }

    async fn submit_create(&self, poi: Poi) -> Result<StoreSnapshot, AppError> {
        let mut inner = self.inner.write().await;
        let message = write_draft(&mut inner.draft, poi);
        Ok(StoreSnapshot {
            message,
            pois: inner.draft.clone(),
        })
    }

    async fn submit_update(&self, poi: Poi) -> Result<StoreSnapshot, AppError> {
        self.submit_create(poi).await
    }

    async fn submit_delete(&self, id: &str) -> Result<StoreSnapshot, AppError> {
        let mut inner = self.inner.write().await;
        delete_draft(&mut inner.draft, id)?;
        Ok(StoreSnapshot {
            message: "POI deleted successfully".to_string(),
            pois: inner.draft.clone(),
        })
    }

    async fn submit_approve(&self, poi: Poi) -> Result<ApprovalSnapshot, AppError> {
        let mut inner = self.inner.write().await;
        let Collections { approved, draft } = &mut *inner;
        let outcome = approve_into(draft, approved, poi);
        Ok(ApprovalSnapshot {
            outcome,
            draft: draft.clone(),
            approved: approved.clone(),
        })
    }

    async fn amend_approved(&self, poi: Poi) -> Result<StoreSnapshot, AppError> {
        let mut inner = self.inner.write().await;
        amend_in(&mut inner.approved, poi)?;
        Ok(StoreSnapshot {
            message: "Approved POI updated".to_string(),
            pois: inner.approved.clone(),
        })
    }

    async fn inspect(&self) -> Result<StoreInfo, AppError> {
        Ok(StoreInfo {
            backend: "memory".to_string(),
            location: "process memory".to_string(),
            exists: true,
            files: Vec::new(),
        })
    }
}
