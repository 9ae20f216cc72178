//! Store client for a remote annotator server.

use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::{ApprovalSnapshot, PoiStore, StoreInfo, StoreSnapshot};
use crate::auth::{ADMIN_KEY_HEADER, SESSION_HEADER};
use crate::errors::{AppError, ErrorResponse};
use crate::models::{Poi, PoiSubmission, SessionId, SubmitAction};

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Talks to the `/api` routes of another annotator instance.
pub struct HttpStore {
    client: Client,
    base_url: String,
    session: RwLock<Option<SessionId>>,
    admin_key: Option<String>,
}

impl HttpStore {
    pub fn new(
        base_url: impl Into<String>,
        session: Option<SessionId>,
        admin_key: Option<String>,
    ) -> Result<Self, AppError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: RwLock::new(session),
            admin_key,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(session) = self.session.read().ok().and_then(|s| s.clone()) {
            builder = builder.header(SESSION_HEADER, session.as_str());
        }
        if let Some(key) = &self.admin_key {
            builder = builder.header(ADMIN_KEY_HEADER, key);
        }
        builder
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, AppError> {
        let response = self.request(Method::GET, path).send().await?;
        decode(response).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T, AppError> {
        tracing::debug!("POST {}{}", self.base_url, path);
        let response = self.request(Method::POST, path).json(&body).send().await?;
        decode(response).await
    }

    async fn save(&self, poi: &Poi, action: SubmitAction) -> Result<StoreSnapshot, AppError> {
        let body = serde_json::to_value(PoiSubmission::for_poi(poi, action))?;
        self.post("/api/save-poi", body).await
    }
}

/// Unwrap a `{success, data}` envelope or rebuild the server's error.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, AppError> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if status.is_success() {
        return serde_json::from_slice::<Envelope<T>>(&bytes)
            .map(|envelope| envelope.data)
            .map_err(|e| AppError::StoreUnavailable(format!("Unexpected store response: {}", e)));
    }

    match serde_json::from_slice::<ErrorResponse>(&bytes) {
        Ok(body) => Err(AppError::from_details(&body.error)),
        Err(_) => Err(AppError::StoreUnavailable(format!("Store responded with {}", status))),
    }
}

#[async_trait]
impl PoiStore for HttpStore {
    async fn fetch_approved(&self) -> Result<Vec<Poi>, AppError> {
        self.get("/api/pois-approved").await
    }

    async fn fetch_draft(&self) -> Result<Vec<Poi>, AppError> {
        self.get("/api/pois-draft").await
    }

    async fn submit_create(&self, poi: Poi) -> Result<StoreSnapshot, AppError> {
        self.save(&poi, SubmitAction::Create).await
    }

    async fn submit_update(&self, poi: Poi) -> Result<StoreSnapshot, AppError> {
        self.save(&poi, SubmitAction::Update).await
    }

    async fn submit_delete(&self, id: &str) -> Result<StoreSnapshot, AppError> {
        self.post("/api/delete-poi", json!({ "id": id })).await
    }

    async fn submit_approve(&self, poi: Poi) -> Result<ApprovalSnapshot, AppError> {
        self.post("/api/approve-poi", json!({ "id": poi.id })).await
    }

    // The server routes an elevated edit of an approved POI to its own amend.
    async fn amend_approved(&self, poi: Poi) -> Result<StoreSnapshot, AppError> {
        self.save(&poi, SubmitAction::Update).await
    }

    async fn inspect(&self) -> Result<StoreInfo, AppError> {
        self.get("/api/check-pois").await
    }

    fn set_session(&self, session: SessionId) {
        match self.session.write() {
            Ok(mut current) => *current = Some(session),
            Err(_) => tracing::error!("Session lock poisoned, keeping previous session"),
        }
    }
}
