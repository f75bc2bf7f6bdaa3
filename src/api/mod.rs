use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post, put},
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::state::SharedState;

pub mod auth;
mod dashboard;
mod error;
mod invoices;
mod prompts;
mod system;
mod types;
mod users;
mod validation;

pub use error::ApiError;
pub use types::*;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Arc<RwLock<Config>> {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn exporter(&self) -> &crate::services::ExportWriter {
        &self.shared.exporter
    }

    #[must_use]
    pub fn invoice_service(&self) -> &crate::services::InvoiceService {
        &self.shared.invoice_service
    }

    #[must_use]
    pub fn mailer(&self) -> &crate::services::Mailer {
        &self.shared.mailer
    }

    pub async fn jwt_secret(&self) -> String {
        self.shared.config.read().await.auth.secret()
    }
}

pub fn create_app_state(shared: Arc<SharedState>) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
    })
}

pub async fn create_app_state_from_config(config: Config) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared))
}

pub async fn router(state: Arc<AppState>) -> Router {
    let (cors_origins, max_upload_bytes) = {
        let config = state.config().read().await;
        (
            config.server.cors_allowed_origins.clone(),
            config.storage.max_upload_bytes,
        )
    };

    let protected_routes = create_protected_router(max_upload_bytes).route_layer(
        middleware::from_fn_with_state(state.clone(), auth::auth_middleware),
    );

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/health", get(system::health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .with_state(state.clone());

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

fn create_protected_router(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/me", get(auth::me))
        .route("/invoices/manual", post(invoices::create_manual))
        .route(
            "/invoices/upload",
            post(invoices::upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/invoices", get(invoices::list))
        .route("/invoices/{id}", get(invoices::get))
        .route("/invoices/{id}", put(invoices::update))
        .route("/invoices/{id}/review", post(invoices::review))
        .route("/invoices/{id}/cancel", post(invoices::cancel))
        .route("/invoices/{id}/file", get(invoices::download_file))
        .route("/users", get(users::list))
        .route("/users/pending", get(users::pending))
        .route("/users/{id}/role", put(users::set_role))
        .route("/users/{id}/status", put(users::set_status))
        .route("/prompts/active", get(prompts::active))
        .route("/prompts", get(prompts::list))
        .route("/prompts", post(prompts::create))
        .route("/prompts/{id}", put(prompts::update))
        .route("/dashboard/stats", get(dashboard::stats))
}
