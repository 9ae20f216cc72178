//! POI map annotator.
//!
//! Coordinate transforms between screen, map and logical space, the
//! approved/draft reconciliation engine, pluggable POI stores and the HTTP
//! server that fronts them.

pub mod api;
pub mod auth;
pub mod config;
pub mod controller;
pub mod errors;
pub mod geometry;
pub mod models;
pub mod reconcile;
pub mod store;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use config::Config;
use store::PoiStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PoiStore>,
    pub config: Arc<Config>,
    /// Held by write handlers so each check-then-write sees a consistent store.
    pub write_gate: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(store: Arc<dyn PoiStore>, config: Config) -> Self {
        Self {
            store,
            config: Arc::new(config),
            write_gate: Arc::new(Mutex::new(())),
        }
    }
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin_key = state.config.admin_key.clone();

    let api_routes = Router::new()
        .route("/test", get(api::api_test))
        .route("/check-pois", get(api::check_pois))
        // Reads
        .route("/pois", get(api::list_pois))
        .route("/pois-approved", get(api::list_approved))
        .route("/pois-draft", get(api::list_draft))
        // Writes
        .route("/save-poi", post(api::save_poi))
        .route("/delete-poi", post(api::delete_poi))
        .route("/approve-poi", post(api::approve_poi))
        .layer(middleware::from_fn(move |req, next| {
            auth::actor_layer(admin_key.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    let static_dir = &state.config.static_dir;
    let static_files = ServeDir::new(static_dir);

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .route_service("/", ServeFile::new(static_dir.join("default.html")))
        .fallback_service(static_files)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    timestamp: DateTime<Utc>,
}

/// Health check endpoint.
async fn health_check() -> Json<Health> {
    Json(Health {
        status: "healthy",
        timestamp: Utc::now(),
    })
}
