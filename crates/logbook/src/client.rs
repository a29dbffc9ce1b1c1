use std::path::PathBuf;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UnixStream};

use crate::protocol::{ApiRequest, ApiResponse};

pub const DEFAULT_QUERY_TCP_ADDR: &str = "127.0.0.1:5082";

pub enum QueryClient {
    Uds(BufReader<UnixStream>),
    Tcp(BufReader<TcpStream>),
}

impl QueryClient {
    /// Explicit `--uds`, then `LOGBOOK_QUERY_UDS_PATH` if it accepts, then TCP
    /// at `--addr`, `LOGBOOK_QUERY_TCP_ADDR` or the default port.
    pub async fn connect(uds: Option<PathBuf>, addr: Option<String>) -> anyhow::Result<Self> {
        if let Some(path) = uds {
            let stream = UnixStream::connect(&path)
                .await
                .with_context(|| format!("connect UDS query server {}", path.display()))?;
            return Ok(Self::Uds(BufReader::new(stream)));
        }

        if addr.is_none()
            && let Ok(path) = std::env::var("LOGBOOK_QUERY_UDS_PATH")
            && let Ok(stream) = UnixStream::connect(path).await
        {
            return Ok(Self::Uds(BufReader::new(stream)));
        }

        let addr = addr
            .or_else(|| std::env::var("LOGBOOK_QUERY_TCP_ADDR").ok())
            .unwrap_or_else(|| DEFAULT_QUERY_TCP_ADDR.to_string());
        let stream = TcpStream::connect(&addr)
            .await
            .with_context(|| format!("connect query server TCP {addr}"))?;
        Ok(Self::Tcp(BufReader::new(stream)))
    }

    pub async fn request(&mut self, req: ApiRequest) -> anyhow::Result<ApiResponse> {
        match self {
            Self::Uds(stream) => round_trip(stream, &req).await,
            Self::Tcp(stream) => round_trip(stream, &req).await,
        }
    }
}

async fn round_trip<T>(stream: &mut BufReader<T>, req: &ApiRequest) -> anyhow::Result<ApiResponse>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut payload = serde_json::to_vec(req)?;
    payload.push(b'\n');
    stream.get_mut().write_all(&payload).await?;
    stream.get_mut().flush().await?;

    let mut line = String::new();
    if stream.read_line(&mut line).await? == 0 {
        anyhow::bail!("query server closed the connection");
    }
    serde_json::from_str(&line).context("decode query response")
}
