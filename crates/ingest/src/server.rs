use std::net::SocketAddr;

use logbook_core::error::{LogbookError, Result};
use logbook_store::Store;

use crate::http;

/// Serves `POST /logs` and `GET /logs` until the listener fails.
pub async fn run_ingest_server(store: Store, addr: SocketAddr, max_body_bytes: usize) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| LogbookError::Io(format!("failed to bind ingest http {addr}: {e}")))?;
    tracing::info!(%addr, "ingest http listening");

    axum::serve(listener, http::router(store, max_body_bytes))
        .await
        .map_err(|e| LogbookError::Ingest(format!("ingest http server failed: {e}")))
}
