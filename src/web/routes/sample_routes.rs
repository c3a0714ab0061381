use axum::{
    extract::{rejection::QueryRejection, OriginalUri, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use crate::services::PageRef;
use crate::web::models::{ListSamplesQuery, PaginatedSamplesResponse};
use crate::web::{AppError, AppState};

pub const NO_SAMPLES_MESSAGE: &str = "No samples available";

fn page_link(path: &str, page: PageRef) -> String {
    format!("{path}?limit={}&offset={}", page.limit, page.offset)
}

async fn list_samples_handler(
    State(app_state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    params: Result<Query<ListSamplesQuery>, QueryRejection>,
) -> Result<Json<PaginatedSamplesResponse>, AppError> {
    let Query(params) = params?;
    let page = app_state
        .query_service
        .list_samples(params.offset.unwrap_or(0), params.limit)
        .await?;

    let path = uri.path();
    Ok(Json(PaginatedSamplesResponse {
        count: page.count,
        next: page.next.map(|p| page_link(path, p)),
        previous: page.previous.map(|p| page_link(path, p)),
        results: page.results,
    }))
}

async fn last_sample_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Response, AppError> {
    match app_state.query_service.get_latest().await? {
        Some(sample) => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            sample.into_string(),
        )
            .into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "message": NO_SAMPLES_MESSAGE })),
        )
            .into_response()),
    }
}

pub fn samples_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/samples/", get(list_samples_handler))
        .route("/samples/last/", get(last_sample_handler))
}
