use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::services::QueryService;

pub mod error;
pub mod models;
pub mod routes;

pub use error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub query_service: Arc<QueryService>,
}

async fn health_check_handler() -> &'static str {
    "OK"
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers(Any);

    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin.");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Builds the HTTP API. An empty `cors_allowed_origins` allows any origin.
pub fn create_axum_router(
    query_service: Arc<QueryService>,
    cors_allowed_origins: &[String],
) -> Router {
    let app_state = Arc::new(AppState { query_service });

    Router::new()
        .route("/health", get(health_check_handler))
        .nest("/api", routes::samples_router())
        .layer(cors_layer(cors_allowed_origins))
        .with_state(app_state)
}
