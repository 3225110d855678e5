// =============================================================================
// HTTP API — Axum 0.7 (spec §6)
// =============================================================================
//
// Read-only except for force-refresh, no authentication (spec Non-goals).
// Router construction follows the teacher's `api/rest.rs` idiom: one
// `axum::Router`, permissive CORS via `tower_http`, `State<Arc<...>>`
// extraction, ad hoc `serde_json::json!` bodies.
// =============================================================================

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::models::Category;
use crate::scheduler::Scheduler;

pub fn router(scheduler: Arc<Scheduler>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/entries", get(entries))
        .route("/api/v1/news", get(news))
        .route("/api/v1/status", get(status))
        .route("/api/v1/sources", get(sources))
        .route("/api/v1/entries/:symbol/history", get(history))
        .route("/api/v1/refresh", post(refresh))
        .with_state(scheduler)
        .layer(cors)
}

#[derive(Debug, Deserialize)]
pub struct EntriesQuery {
    category: Option<String>,
    symbol: Option<String>,
}

async fn entries(
    State(scheduler): State<Arc<Scheduler>>,
    Query(q): Query<EntriesQuery>,
) -> impl IntoResponse {
    let snapshot = scheduler.snapshot.read();
    let category_filter = q.category.as_deref().and_then(|s| s.parse::<Category>().ok());
    let data: Vec<_> = snapshot
        .entries
        .iter()
        .filter(|e| category_filter.map(|c| c == e.category).unwrap_or(true))
        .filter(|e| {
            q.symbol
                .as_deref()
                .map(|s| e.symbol.to_lowercase().contains(&s.to_lowercase()))
                .unwrap_or(true)
        })
        .collect();
    Json(json!({ "data": data, "count": data.len() }))
}

#[derive(Debug, Deserialize)]
pub struct NewsQuery {
    category: Option<String>,
}

async fn news(State(scheduler): State<Arc<Scheduler>>, Query(q): Query<NewsQuery>) -> impl IntoResponse {
    // Category filter on /news goes straight to the store (already ranked by
    // published_at there) rather than the decay-ranked in-memory snapshot,
    // since `all_latest_news` backs the unfiltered snapshot but per-category
    // lookups are cheap, indexed single-category queries.
    match q.category.as_deref().and_then(|s| s.parse::<Category>().ok()) {
        Some(category) => match scheduler.store.news_by_category(category, crate::scheduler::snapshot::MAX_NEWS) {
            Ok(data) => Json(json!({ "data": &data, "count": data.len() })).into_response(),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response(),
        },
        None => {
            let snapshot = scheduler.snapshot.read();
            Json(json!({ "data": &snapshot.news, "count": snapshot.news.len() })).into_response()
        }
    }
}

async fn status(State(scheduler): State<Arc<Scheduler>>) -> impl IntoResponse {
    let snapshot = scheduler.snapshot.read();
    let uptime = Instant::now().saturating_duration_since(scheduler.started_at).as_secs();
    let total_entries_stored = scheduler.store.count_entries().unwrap_or(-1);
    Json(json!({
        "status": "ok",
        "uptime_seconds": uptime,
        "entry_count": snapshot.entries.len(),
        "news_count": snapshot.news.len(),
        "total_entries_stored": total_entries_stored,
    }))
}

async fn sources(State(scheduler): State<Arc<Scheduler>>) -> impl IntoResponse {
    let rows = match scheduler.store.source_statuses() {
        Ok(rows) => rows,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    };
    let now = chrono::Utc::now().timestamp();
    let data: Vec<_> = rows
        .into_iter()
        .map(|row| {
            let health = if row.error_count == 0 {
                "healthy"
            } else if row.error_count < 3 {
                "degraded"
            } else {
                "failing"
            };
            json!({
                "source_name": row.source_name,
                "source_kind": row.source_kind.to_string(),
                "last_fetched": row.last_fetched,
                "last_error": row.last_error,
                "error_count": row.error_count,
                "health": health,
                "seconds_ago": row.last_fetched.map(|t| now - t),
            })
        })
        .collect();
    Json(json!({ "data": data })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    limit: Option<usize>,
}

async fn history(
    State(scheduler): State<Arc<Scheduler>>,
    Path(symbol): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> impl IntoResponse {
    let limit = q.limit.unwrap_or(100);
    match scheduler.store.history(&symbol, limit) {
        Ok(data) => Json(json!({ "data": data, "count": data.len() })).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn refresh(State(scheduler): State<Arc<Scheduler>>) -> impl IntoResponse {
    scheduler.trigger_refresh();
    Json(json!({ "ok": true }))
}
