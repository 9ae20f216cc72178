//! Liveness and store diagnostics.

use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{success, ApiResult};
use crate::store::StoreInfo;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ApiStatus {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// GET /api/test - Confirms the API is reachable.
pub async fn api_test() -> ApiResult<ApiStatus> {
    success(ApiStatus {
        message: "API is working".to_string(),
        timestamp: Utc::now(),
    })
}

/// GET /api/check-pois - Where the store lives and what it contains.
pub async fn check_pois(State(state): State<AppState>) -> ApiResult<StoreInfo> {
    let info = state.store.inspect().await?;
    tracing::debug!("Store check: {:?}", info);
    success(info)
}
