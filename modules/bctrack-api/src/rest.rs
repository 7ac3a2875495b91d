use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use bctrack_common::{sentiment, TrackerError};
use bctrack_store::{QueryFilter, ValidationPost};

use crate::AppState;

// --- Query structs ---

#[derive(Deserialize)]
pub struct RangeQuery {
    from: Option<String>,
    to: Option<String>,
    source: Option<String>,
}

#[derive(Deserialize)]
pub struct SideEffectsQuery {
    from: Option<String>,
    to: Option<String>,
    source: Option<String>,
    method: Option<String>,
}

#[derive(Deserialize)]
pub struct PostsQuery {
    method: String,
    limit: Option<i64>,
    from: Option<String>,
    to: Option<String>,
    source: Option<String>,
}

#[derive(Deserialize)]
pub struct ErrorsQuery {
    limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct ValidateQuery {
    section: Option<String>,
}

// --- Helpers ---

/// Turn `YYYY-MM-DD` bounds into an inclusive epoch-second range: `from` at
/// the start of its day, `to` at the end of its day.
fn build_filter(
    from: &Option<String>,
    to: &Option<String>,
    source: &Option<String>,
) -> Result<QueryFilter, String> {
    let parse = |s: &str| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| format!("invalid date: {s:?}"))
    };
    let from = match from {
        Some(s) => Some(parse(s)?.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp()),
        None => None,
    };
    let to = match to {
        Some(s) => Some(
            parse(s)?
                .and_hms_opt(23, 59, 59)
                .unwrap()
                .and_utc()
                .timestamp(),
        ),
        None => None,
    };
    Ok(QueryFilter {
        from,
        to,
        source: source.clone(),
    })
}

/// First 300 characters of a body for display next to the annotations.
fn preview(body: &str) -> String {
    body.chars().take(300).collect()
}

fn bad_request(message: String) -> axum::response::Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
}

fn internal_error(context: &str, e: TrackerError) -> axum::response::Response {
    warn!(error = %e, "Failed to {context}");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

// --- Handlers ---

pub async fn api_mentions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RangeQuery>,
) -> impl IntoResponse {
    let filter = match build_filter(&params.from, &params.to, &params.source) {
        Ok(f) => f,
        Err(msg) => return bad_request(msg),
    };

    let counts = match state.store.mention_counts(&filter).await {
        Ok(c) => c,
        Err(e) => return internal_error("load mention counts", e),
    };
    let daily_rows = match state.store.daily_counts(&filter, 10).await {
        Ok(d) => d,
        Err(e) => return internal_error("load daily counts", e),
    };
    let stats = match state.store.stats().await {
        Ok(s) => s,
        Err(e) => return internal_error("load stats", e),
    };

    let mut daily: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
    for row in daily_rows {
        daily.entry(row.day).or_default().insert(row.method, row.count);
    }

    Json(json!({
        "counts": counts,
        "daily": daily,
        "stats": stats,
    }))
    .into_response()
}

pub async fn api_sentiment(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RangeQuery>,
) -> impl IntoResponse {
    let filter = match build_filter(&params.from, &params.to, &params.source) {
        Ok(f) => f,
        Err(msg) => return bad_request(msg),
    };
    match state.store.sentiment_by_method(&filter).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => internal_error("load sentiment", e),
    }
}

pub async fn api_side_effects(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SideEffectsQuery>,
) -> impl IntoResponse {
    let filter = match build_filter(&params.from, &params.to, &params.source) {
        Ok(f) => f,
        Err(msg) => return bad_request(msg),
    };
    match state
        .store
        .side_effect_counts(&filter, params.method.as_deref())
        .await
    {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => internal_error("load side effects", e),
    }
}

pub async fn api_effect_matrix(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RangeQuery>,
) -> impl IntoResponse {
    let filter = match build_filter(&params.from, &params.to, &params.source) {
        Ok(f) => f,
        Err(msg) => return bad_request(msg),
    };
    match state.store.effect_matrix(&filter).await {
        Ok(cells) => {
            let mut matrix: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
            for cell in cells {
                matrix
                    .entry(cell.method)
                    .or_default()
                    .insert(cell.effect, cell.count);
            }
            Json(matrix).into_response()
        }
        Err(e) => internal_error("load effect matrix", e),
    }
}

pub async fn api_posts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PostsQuery>,
) -> impl IntoResponse {
    let filter = match build_filter(&params.from, &params.to, &params.source) {
        Ok(f) => f,
        Err(msg) => return bad_request(msg),
    };
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    match state.store.top_posts(&params.method, limit, &filter).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => internal_error("load posts", e),
    }
}

pub async fn api_post_comments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.comments_for_post(&id).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => internal_error("load comments", e),
    }
}

pub async fn api_post_side_effects(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.side_effects_for_post(&id).await {
        Ok(effects) => Json(effects).into_response(),
        Err(e) => internal_error("load post side effects", e),
    }
}

pub async fn api_errors(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ErrorsQuery>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    match state.store.recent_errors(limit).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => internal_error("load errors", e),
    }
}

/// How many annotated examples each validation section shows.
const VALIDATION_LIMIT: i64 = 3;

/// Annotated examples showing how the analysis read real stored posts:
/// match spans for the lexicons, a token-by-token breakdown for sentiment.
pub async fn api_validate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ValidateQuery>,
) -> impl IntoResponse {
    let full_text = |p: &ValidationPost| format!("{} {}", p.title, p.body);

    match params.section.as_deref().unwrap_or("sentiment") {
        "sentiment" => {
            let rows = match state.store.sentiment_examples(VALIDATION_LIMIT).await {
                Ok(rows) => rows,
                Err(e) => return internal_error("load validation examples", e),
            };
            let examples: Vec<_> = rows
                .iter()
                .map(|p| {
                    json!({
                        "post_id": p.id,
                        "title": p.title,
                        "text_preview": preview(&p.body),
                        "stored_score": p.sentiment,
                        "breakdown": sentiment::explain(&full_text(p)),
                    })
                })
                .collect();
            Json(examples).into_response()
        }
        "mentions" => {
            let rows = match state.store.mention_examples(VALIDATION_LIMIT).await {
                Ok(rows) => rows,
                Err(e) => return internal_error("load validation examples", e),
            };
            let lexicon = state.tracker.contraceptives();
            let examples: Vec<_> = rows
                .iter()
                .map(|p| {
                    json!({
                        "post_id": p.id,
                        "title": p.title,
                        "text_preview": preview(&p.body),
                        "matches": lexicon.explain(&full_text(p)),
                    })
                })
                .collect();
            Json(examples).into_response()
        }
        "side_effects" | "effects" | "heatmap" => {
            let rows = match state.store.effect_examples(VALIDATION_LIMIT).await {
                Ok(rows) => rows,
                Err(e) => return internal_error("load validation examples", e),
            };
            let examples: Vec<_> = rows
                .iter()
                .map(|p| {
                    let text = full_text(p);
                    json!({
                        "post_id": p.id,
                        "title": p.title,
                        "text_preview": preview(&p.body),
                        "side_effect_matches": state.tracker.side_effects().explain(&text),
                        "mention_matches": state.tracker.contraceptives().explain(&text),
                    })
                })
                .collect();
            Json(examples).into_response()
        }
        _ => Json(json!([])).into_response(),
    }
}

pub async fn api_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.stats().await {
        Ok(stats) => Json(json!({
            "running": state.tracker.is_running(),
            "stats": stats,
        }))
        .into_response(),
        Err(e) => internal_error("load status", e),
    }
}

/// Kick off an ingestion cycle in the background. A cycle already in flight
/// wins: the request is rejected, never queued. The lock is claimed before
/// spawning, so two simultaneous triggers can never both get a 202.
pub async fn api_trigger_cycle(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.tracker.claim_cycle().is_err() {
        return (
            StatusCode::CONFLICT,
            Json(json!({"error": "ingestion cycle already in progress"})),
        )
            .into_response();
    }

    let tracker = state.tracker.clone();
    tokio::spawn(async move {
        match tracker.run_claimed_cycle().await {
            Ok(stats) => info!("{stats}"),
            Err(e) => error!(error = %e, "Triggered cycle failed"),
        }
    });

    (StatusCode::ACCEPTED, Json(json!({"status": "started"}))).into_response()
}
