use std::io::Read;

use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{HeaderMap, Method, header};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use flate2::read::GzDecoder;
use logbook_core::error::LogbookError;
use logbook_core::model::{LogEntry, NewLogEntry};
use logbook_core::query::OldestRequest;
use logbook_store::Store;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;

use crate::response::ApiError;

#[derive(Clone)]
pub struct IngestState {
    pub store: Store,
    pub max_body_bytes: usize,
}

/// Producers may post a batch or a single entry.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IngestBody {
    Many(Vec<NewLogEntry>),
    One(Box<NewLogEntry>),
}

impl IngestBody {
    fn into_entries(self) -> Vec<NewLogEntry> {
        match self {
            Self::Many(entries) => entries,
            Self::One(entry) => vec![*entry],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestAck {
    pub accepted: usize,
}

pub fn router(store: Store, max_body_bytes: usize) -> Router {
    let state = IngestState {
        store,
        max_body_bytes,
    };
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    Router::new()
        .route("/logs", post(ingest_logs).get(oldest_logs))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .on_request(tower_http::trace::DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

async fn ingest_logs(
    State(state): State<IngestState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IngestAck>, ApiError> {
    let raw = if is_gzip(&headers) {
        gunzip(&body, state.max_body_bytes)?
    } else {
        body.to_vec()
    };

    let entries = serde_json::from_slice::<IngestBody>(&raw)
        .map_err(|e| LogbookError::Parse(format!("invalid log payload: {e}")))?
        .into_entries();

    let stored = state.store.insert_logs(&entries)?;
    tracing::debug!(count = stored.len(), "log batch ingested");
    Ok(Json(IngestAck {
        accepted: stored.len(),
    }))
}

async fn oldest_logs(
    State(state): State<IngestState>,
    Query(req): Query<OldestRequest>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    Ok(Json(state.store.oldest(&req)?))
}

fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("gzip"))
}

/// Inflates a gzip body, refusing output larger than `limit`.
fn gunzip(body: &[u8], limit: usize) -> Result<Vec<u8>, LogbookError> {
    let mut out = Vec::new();
    GzDecoder::new(body)
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| LogbookError::InvalidArgument(format!("invalid gzip body: {e}")))?;
    if out.len() > limit {
        return Err(LogbookError::InvalidArgument(format!(
            "decompressed body exceeds {limit} bytes"
        )));
    }
    Ok(out)
}
