use std::future::Future;
use std::time::Instant;

use axum::{
    extract::{Json, Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::models::{AnalysesQuery, CompareRequest, ScrapeRequest, ScrapesQuery};
use crate::api::response;
use crate::compare::compare_with_competitor;
use crate::error::{AppError, Result};
use crate::scraper::validate_url;
use crate::AppState;

const DEFAULT_LIMIT: u32 = 5;
const MAX_LIMIT: u32 = 100;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/scrape", post(scrape_handler))
        .route("/api/compare", post(compare_handler))
        .route("/api/analyses", get(analyses_handler))
        .route("/api/scrapes", get(scrapes_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

/// Runs a handler body under the configured request deadline.
async fn respond<T, F>(state: &AppState, route: &'static str, work: F) -> Response
where
    T: Serialize,
    F: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let result = tokio::time::timeout(state.config.request_timeout, work).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(data)) => {
            info!(route, elapsed_ms, "Request completed");
            response::success(data).into_response()
        }
        Ok(Err(err)) => {
            warn!(route, elapsed_ms, kind = err.kind(), error = %err, "Request failed");
            err.into_response()
        }
        Err(_) => {
            warn!(route, elapsed_ms, "Request timed out");
            AppError::Timeout(format!(
                "processing exceeded {}s",
                state.config.request_timeout.as_secs()
            ))
            .into_response()
        }
    }
}

fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

async fn scrape_handler(
    State(state): State<AppState>,
    Json(req): Json<ScrapeRequest>,
) -> Response {
    respond(&state, "scrape", async {
        let url = validate_url(&req.url)?;
        state.fetcher.fetch(url).await
    })
    .await
}

async fn compare_handler(
    State(state): State<AppState>,
    Json(req): Json<CompareRequest>,
) -> Response {
    respond(&state, "compare", async {
        let your_url = validate_url(&req.your_url)?;
        let competitor_url = validate_url(&req.competitor_url)?;
        let analyzer = state.analyzer.as_ref().ok_or_else(|| {
            AppError::EmbeddingUnavailable("no embedding API key is configured".to_string())
        })?;

        compare_with_competitor(
            &state.fetcher,
            analyzer,
            &state.store,
            your_url,
            competitor_url,
        )
        .await
    })
    .await
}

async fn analyses_handler(
    State(state): State<AppState>,
    Query(query): Query<AnalysesQuery>,
) -> Response {
    respond(&state, "analyses", async {
        state.store.get_recent_analyses(clamp_limit(query.limit))
    })
    .await
}

async fn scrapes_handler(
    State(state): State<AppState>,
    Query(query): Query<ScrapesQuery>,
) -> Response {
    respond(&state, "scrapes", async {
        let url = validate_url(&query.url)?;
        state.store.get_scrapes_for_url(url, clamp_limit(query.limit))
    })
    .await
}
