//! REST query surface
//!
//! Read-only endpoints the board (or an operator with curl) uses to
//! catch up after connecting: run listings, a single run's state, and
//! filtered log snapshots. All mutation flows through phases; these
//! handlers only read.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

use adw_core::LogLevel;
use adw_logs::LogFilter;

use crate::hub::Hub;

pub fn api_router() -> Router<Arc<Hub>> {
    Router::new()
        .route("/runs", get(list_runs))
        .route("/runs/:run_id", get(get_run))
        .route("/logs/:run_id", get(get_logs))
}

/// GET /api/runs - run ids with their current state
async fn list_runs(State(hub): State<Arc<Hub>>) -> Response {
    let run_ids = match hub.ctx.store.list_runs().await {
        Ok(ids) => ids,
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    };

    let mut runs = Vec::with_capacity(run_ids.len());
    for run_id in run_ids {
        if let Ok(state) = hub.ctx.store.load(&run_id).await {
            runs.push(state);
        }
    }
    Json(runs).into_response()
}

/// GET /api/runs/:run_id - one run's state record
async fn get_run(State(hub): State<Arc<Hub>>, Path(run_id): Path<String>) -> Response {
    match hub.ctx.store.load(&run_id).await {
        Ok(state) => Json(state).into_response(),
        Err(e) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    level: Option<LogLevel>,
    contains: Option<String>,
}

/// GET /api/logs/:run_id?level=error&contains=text - log snapshot
async fn get_logs(
    State(hub): State<Arc<Hub>>,
    Path(run_id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Response {
    let filter = if query.level.is_none() && query.contains.is_none() {
        None
    } else {
        Some(LogFilter {
            level: query.level,
            contains: query.contains,
        })
    };
    let entries = hub.ctx.logs.snapshot(&run_id, filter.as_ref());
    Json(entries).into_response()
}
