//! POI API endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use chrono::Utc;
use serde_json::Value;

use super::{success, ApiResult};
use crate::errors::{AppError, DenyReason};
use crate::models::{Actor, Poi, PoiSubmission, SubmitAction};
use crate::reconcile::policy::{authorize, Action, Transition};
use crate::store::{load_working_set, ApprovalOutcome, ApprovalSnapshot, StoreSnapshot};
use crate::AppState;

/// GET /api/pois-approved - Committed POIs.
pub async fn list_approved(State(state): State<AppState>) -> ApiResult<Vec<Poi>> {
    success(state.store.fetch_approved().await?)
}

/// GET /api/pois-draft - Pending POIs.
pub async fn list_draft(State(state): State<AppState>) -> ApiResult<Vec<Poi>> {
    success(state.store.fetch_draft().await?)
}

/// GET /api/pois - Both collections merged, draft wins, in render order.
pub async fn list_pois(State(state): State<AppState>) -> ApiResult<Vec<Poi>> {
    let working = load_working_set(state.store.as_ref()).await?;
    success(working.snapshot())
}

/// POST /api/save-poi - Create a POI, or edit it when the id already exists.
pub async fn save_poi(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<StoreSnapshot> {
    let submission = PoiSubmission::from_json(json_body(payload)?)?;
    let kind = state.config.view.categories.normalize(&submission.kind)?;

    let _gate = state.write_gate.lock().await;
    let working = load_working_set(state.store.as_ref()).await?;
    let now = Utc::now();

    let existing = submission.requested_id().and_then(|id| working.get(id));
    let Some(existing) = existing else {
        if submission.action == Some(SubmitAction::Update) {
            tracing::debug!("Update of unknown POI treated as create");
        }
        let poi = submission.into_draft(kind, actor.session.clone(), now);
        tracing::info!("Creating POI {} ({})", poi.id, poi.kind);
        return success(state.store.submit_create(poi).await?);
    };

    authorize(&actor, existing, Action::Edit)
        .map_err(|reason| denied(&actor, Action::Edit, &existing.id, reason))?;
    let edited = submission.changes(kind).applied_to(existing, now);

    let snapshot = if existing.approved {
        tracing::info!("Amending approved POI {}", edited.id);
        state.store.amend_approved(edited).await?
    } else {
        tracing::info!("Updating POI {}", edited.id);
        state.store.submit_update(edited).await?
    };
    success(snapshot)
}

/// POST /api/delete-poi - Remove a draft POI.
pub async fn delete_poi(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<StoreSnapshot> {
    let id = requested_id(&json_body(payload)?)?;

    let _gate = state.write_gate.lock().await;
    let working = load_working_set(state.store.as_ref()).await?;
    let existing = working
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("POI {} not found", id)))?;

    authorize(&actor, existing, Action::Delete)
        .map_err(|reason| denied(&actor, Action::Delete, &id, reason))?;

    let snapshot = state.store.submit_delete(&id).await?;
    tracing::info!("Deleted POI {}", id);
    success(snapshot)
}

/// POST /api/approve-poi - Move a draft POI into the approved collection.
pub async fn approve_poi(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<ApprovalSnapshot> {
    let id = requested_id(&json_body(payload)?)?;

    if !actor.elevated {
        return Err(denied(&actor, Action::Approve, &id, DenyReason::NotElevated));
    }

    let _gate = state.write_gate.lock().await;
    let working = load_working_set(state.store.as_ref()).await?;
    let existing = working
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("POI {} not found", id)))?;

    let transition = authorize(&actor, existing, Action::Approve)
        .map_err(|reason| denied(&actor, Action::Approve, &id, reason))?;

    match transition {
        Transition::Apply => {
            let snapshot = state.store.submit_approve(existing.clone()).await?;
            tracing::info!("Approved POI {}", id);
            success(snapshot)
        }
        Transition::AlreadyApproved => {
            tracing::info!("POI {} was already approved", id);
            let (draft, approved) =
                tokio::try_join!(state.store.fetch_draft(), state.store.fetch_approved())?;
            success(ApprovalSnapshot {
                outcome: ApprovalOutcome::AlreadyApproved,
                draft,
                approved,
            })
        }
    }
}

fn json_body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

fn requested_id(body: &Value) -> Result<String, AppError> {
    body.get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation("POI id is required".to_string()))
}

fn denied(actor: &Actor, action: Action, id: &str, reason: DenyReason) -> AppError {
    tracing::warn!(
        "Denied {} of POI {} for session {:?}: {}",
        action.as_str(),
        id,
        actor.session.as_ref().map(|s| s.as_str()),
        reason.as_str()
    );
    AppError::PermissionDenied(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_requested_id() {
        assert_eq!(requested_id(&json!({ "id": " poi-1 " })).unwrap(), "poi-1");
        assert!(matches!(requested_id(&json!({})), Err(AppError::Validation(_))));
        assert!(matches!(requested_id(&json!({ "id": "" })), Err(AppError::Validation(_))));
        assert!(matches!(requested_id(&json!({ "id": 7 })), Err(AppError::Validation(_))));
    }
}
