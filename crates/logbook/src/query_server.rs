use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::Method;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use futures::Stream;
use logbook_core::filter::{FilterSpec, WindowDefaults};
use logbook_core::model::LogEntry;
use logbook_core::query::{
    LogPage, StatsRequest, StatsResponse, StatusResponse, SystemSummary, SystemsRequest,
};
use logbook_ingest::response::ApiError;
use logbook_store::Store;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::protocol::{ApiRequest, ApiResponse};

/// Line-protocol listeners on a Unix socket and a TCP port.
pub async fn run_query_server(
    store: Store,
    uds_path: PathBuf,
    tcp_addr: SocketAddr,
) -> anyhow::Result<()> {
    if let Some(parent) = uds_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("create uds parent dir")?;
    }
    if tokio::fs::metadata(&uds_path).await.is_ok() {
        let _ = tokio::fs::remove_file(&uds_path).await;
    }

    let uds_listener = UnixListener::bind(&uds_path).context("bind UDS query listener")?;
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = tokio::fs::metadata(&uds_path).await?.permissions();
        perms.set_mode(0o600);
        tokio::fs::set_permissions(&uds_path, perms).await?;
    }
    let tcp_listener = TcpListener::bind(tcp_addr)
        .await
        .with_context(|| format!("bind TCP query listener {tcp_addr}"))?;
    tracing::info!(uds = %uds_path.display(), tcp = %tcp_addr, "query socket listening");

    let uds_task = tokio::spawn(run_uds_loop(uds_listener, store.clone()));
    let tcp_task = tokio::spawn(run_tcp_loop(tcp_listener, store));

    tokio::select! {
        res = uds_task => {
            res??;
        }
        res = tcp_task => {
            res??;
        }
    }
    Ok(())
}

async fn run_uds_loop(listener: UnixListener, store: Store) -> anyhow::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let store = store.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_stream(BufReader::new(stream), store).await {
                tracing::warn!(error = ?err, "uds client request failed");
            }
        });
    }
}

async fn run_tcp_loop(listener: TcpListener, store: Store) -> anyhow::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let store = store.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_stream(BufReader::new(stream), store).await {
                tracing::warn!(error = ?err, "tcp client request failed");
            }
        });
    }
}

/// Answers one response line per request line until the client hangs up.
async fn handle_stream<T>(mut stream: BufReader<T>, store: Store) -> anyhow::Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        if stream.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<ApiRequest>(&line) {
            Ok(req) => handle_request(req, &store),
            Err(e) => ApiResponse::Error(format!("malformed request: {e}")),
        };
        let payload = serde_json::to_vec(&response)?;
        stream.get_mut().write_all(&payload).await?;
        stream.get_mut().write_all(b"\n").await?;
        stream.get_mut().flush().await?;
    }
}

fn handle_request(req: ApiRequest, store: &Store) -> ApiResponse {
    let resp = match req {
        ApiRequest::Query { filter, defaults } => {
            store.query(&filter, defaults).map(ApiResponse::Page)
        }
        ApiRequest::Get { id } => store.get_log(id).map(ApiResponse::Entry),
        ApiRequest::Systems(r) => store.distinct_systems(&r).map(ApiResponse::Systems),
        ApiRequest::SystemNames => store.system_names().map(ApiResponse::SystemNames),
        ApiRequest::Stats(r) => store.stats(&r).map(ApiResponse::Stats),
        ApiRequest::Oldest(r) => store.oldest(&r).map(ApiResponse::Entries),
        ApiRequest::Status => store.status().map(ApiResponse::Status),
    };

    resp.unwrap_or_else(|e| {
        if !e.is_client_error() {
            tracing::error!(error = %e, "query request failed");
        }
        ApiResponse::Error(e.to_string())
    })
}

pub async fn run_query_http_server(store: Store, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind query http {addr}"))?;
    tracing::info!(%addr, "query http listening");
    axum::serve(listener, http_router(store))
        .await
        .context("query http server failed")
}

pub fn http_router(store: Store) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);
    Router::new()
        .route("/v1/logs", get(api_logs))
        .route("/v1/logs/ui", get(ui_logs))
        .route("/v1/logs/{id}", get(log_by_id))
        .route("/v1/systems", get(systems))
        .route("/v1/systems/names", get(system_names))
        .route("/v1/stats", get(stats))
        .route("/v1/status", get(status))
        .route("/v1/tail", get(tail))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

async fn api_logs(
    State(store): State<Store>,
    Query(filter): Query<FilterSpec>,
) -> Result<Json<LogPage>, ApiError> {
    Ok(Json(store.query(&filter, WindowDefaults::Open)?))
}

async fn ui_logs(
    State(store): State<Store>,
    Query(filter): Query<FilterSpec>,
) -> Result<Json<LogPage>, ApiError> {
    Ok(Json(store.query(&filter, WindowDefaults::LastDay)?))
}

async fn log_by_id(
    State(store): State<Store>,
    Path(id): Path<i64>,
) -> Result<Json<LogEntry>, ApiError> {
    Ok(Json(store.get_log(id)?))
}

async fn systems(
    State(store): State<Store>,
    Query(req): Query<SystemsRequest>,
) -> Result<Json<Vec<SystemSummary>>, ApiError> {
    Ok(Json(store.distinct_systems(&req)?))
}

async fn system_names(State(store): State<Store>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(store.system_names()?))
}

async fn stats(
    State(store): State<Store>,
    Query(req): Query<StatsRequest>,
) -> Result<Json<StatsResponse>, ApiError> {
    Ok(Json(store.stats(&req)?))
}

async fn status(State(store): State<Store>) -> Result<Json<StatusResponse>, ApiError> {
    Ok(Json(store.status()?))
}

/// Streams newly committed entries that match the filter. Paging and sort
/// parameters are ignored.
async fn tail(
    State(store): State<Store>,
    Query(filter): Query<FilterSpec>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let predicate = filter.normalize(WindowDefaults::Open, Utc::now()).predicate;
    let mut rx = store.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(entry) => {
                    if !predicate.matches(&entry) {
                        continue;
                    }
                    match Event::default().json_data(&entry) {
                        Ok(event) => yield Ok::<_, Infallible>(event),
                        Err(err) => tracing::warn!(error = ?err, "tail event encode failed"),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "tail subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use futures::StreamExt;
    use tower::ServiceExt;

    use super::*;

    const LIMIT: usize = 1024 * 1024;

    async fn get_json(store: &Store, uri: &str) -> (StatusCode, serde_json::Value) {
        let res = http_router(store.clone())
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let body = to_bytes(res.into_body(), LIMIT).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    fn seeded() -> Store {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        store
            .insert_logs(&[
                testkit::entry_at("recent info", 2, now - chrono::Duration::minutes(5)),
                testkit::entry_at("recent error", 4, now - chrono::Duration::minutes(1)),
                testkit::entry_at("last week", 4, now - chrono::Duration::days(3)),
            ])
            .unwrap();
        store
    }

    #[tokio::test]
    async fn ui_variant_defaults_to_last_day() {
        let store = seeded();
        let (status, body) = get_json(&store, "/v1/logs/ui").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["items"][0]["message"], "recent error");
        assert!(body["window"]["from"].is_string());

        let (_, body) = get_json(&store, "/v1/logs").await;
        assert_eq!(body["total"], 3);
    }

    #[tokio::test]
    async fn query_string_filters_and_blanks() {
        let store = seeded();
        let (status, body) =
            get_json(&store, "/v1/logs?level=4&from=&sortDir=asc&pageSize=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["pageSize"], 1);
        assert_eq!(body["items"][0]["message"], "last week");

        let (status, _) = get_json(&store, "/v1/logs?level=loud").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn entry_lookup_and_not_found() {
        let store = seeded();
        let id = store.oldest(&Default::default()).unwrap()[0].id;

        let (status, body) = get_json(&store, &format!("/v1/logs/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "last week");

        let (status, body) = get_json(&store, "/v1/logs/999999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("999999"));
    }

    #[tokio::test]
    async fn stats_systems_and_status() {
        let store = seeded();

        let (_, body) = get_json(&store, "/v1/stats").await;
        assert_eq!(body["lastDay"]["Information"], 1);
        assert_eq!(body["lastDay"]["Error"], 1);
        assert_eq!(body["lastWeek"]["Total"], 3);

        let (_, body) = get_json(&store, "/v1/stats?from=2d").await;
        assert_eq!(body["period"]["Total"], 2);

        let (_, body) = get_json(&store, "/v1/systems").await;
        assert_eq!(body[0]["systemDetails"], "WS-01");
        assert_eq!(body[0]["count"], 3);

        let (_, body) = get_json(&store, "/v1/systems/names").await;
        assert_eq!(body, serde_json::json!(["WS-01"]));

        let (_, body) = get_json(&store, "/v1/status").await;
        assert_eq!(body["entries_count"], 3);
    }

    #[tokio::test]
    async fn blank_stats_bounds_select_an_open_period() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_logs(&[testkit::entry_at(
                "quarter ago",
                4,
                Utc::now() - chrono::Duration::days(90),
            )])
            .unwrap();

        let (status, body) = get_json(&store, "/v1/stats?from=&to=").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("lastDay").is_none());
        assert_eq!(body["period"]["Error"], 1);
        assert_eq!(body["period"]["Total"], 1);

        let (_, body) = get_json(&store, "/v1/stats").await;
        assert_eq!(body["lastMonth"]["Total"], 0);
    }

    #[tokio::test]
    async fn tail_streams_matching_entries() {
        let store = Store::open_in_memory().unwrap();
        let res = http_router(store.clone())
            .oneshot(Request::get("/v1/tail?level=4").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        store
            .insert_logs(&[
                testkit::entry_at("quiet", 2, Utc::now()),
                testkit::entry_at("loud", 4, Utc::now()),
            ])
            .unwrap();

        let mut frames = res.into_body().into_data_stream();
        let chunk = tokio::time::timeout(Duration::from_secs(5), frames.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        let data = text.trim().strip_prefix("data: ").unwrap();
        let entry: LogEntry = serde_json::from_str(data).unwrap();
        assert_eq!(entry.message, "loud");
    }

    #[test]
    fn line_protocol_maps_errors() {
        let store = seeded();
        match handle_request(ApiRequest::Get { id: 424242 }, &store) {
            ApiResponse::Error(msg) => assert!(msg.contains("not found")),
            other => panic!("unexpected response: {other:?}"),
        }
        match handle_request(ApiRequest::SystemNames, &store) {
            ApiResponse::SystemNames(names) => assert_eq!(names, ["WS-01"]),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    async fn read_response<R>(lines: &mut tokio::io::Lines<R>) -> ApiResponse
    where
        R: tokio::io::AsyncBufRead + Unpin,
    {
        let line = lines.next_line().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn line_protocol_serves_multiple_requests_per_connection() {
        let store = seeded();
        let (client, server) = tokio::io::duplex(64 * 1024);
        let server_task = tokio::spawn(handle_stream(BufReader::new(server), store));

        let (read, mut write) = tokio::io::split(client);
        let mut lines = BufReader::new(read).lines();
        for req in [ApiRequest::Status, ApiRequest::SystemNames] {
            let mut payload = serde_json::to_vec(&req).unwrap();
            payload.push(b'\n');
            write.write_all(&payload).await.unwrap();
        }
        write.write_all(b"{not json}\n").await.unwrap();

        assert!(matches!(
            read_response(&mut lines).await,
            ApiResponse::Status(s) if s.entries_count == 3
        ));
        assert!(matches!(
            read_response(&mut lines).await,
            ApiResponse::SystemNames(_)
        ));
        assert!(matches!(
            read_response(&mut lines).await,
            ApiResponse::Error(_)
        ));

        drop(write);
        drop(lines);
        server_task.await.unwrap().unwrap();
    }
}
