mod client;
mod output;
mod protocol;
mod query_server;
mod telemetry;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use logbook_core::config::Config;
use logbook_core::filter::{FilterSpec, WindowDefaults};
use logbook_core::model::{LogEntry, Severity};
use logbook_core::query::{OldestRequest, StatsRequest, SystemsRequest};
use logbook_core::time::parse_time_or_relative;
use logbook_store::Store;

use crate::client::QueryClient;
use crate::output::{
    print_entries_human, print_entry_human, print_page_human, print_stats_human,
    print_status_human, print_system_names_human, print_systems_human, print_tail_entry,
};
use crate::protocol::{ApiRequest, ApiResponse};
use crate::telemetry::{TelemetryConfig, init_cli_tracing, init_run_tracing, shutdown_tracing};

const DEFAULT_QUERY_HTTP_ADDR: &str = "127.0.0.1:5081";

#[derive(Parser, Debug)]
#[command(name = "logbook")]
#[command(about = "Structured log ingest and query service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    uds: Option<PathBuf>,

    #[arg(long, global = true)]
    addr: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run the ingest and query servers")]
    Run(RunArgs),
    #[command(about = "Page through stored entries")]
    Query {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        page: Option<i64>,
        #[arg(long)]
        page_size: Option<i64>,
        #[arg(long, help = "createdAt, level or programName")]
        sort_by: Option<String>,
        #[arg(long, help = "desc (default) or asc")]
        sort_dir: Option<String>,
        #[arg(long, help = "Default unset bounds to a 24h window")]
        ui: bool,
    },
    #[command(about = "Show one entry by id")]
    Get { id: i64 },
    #[command(about = "Summarize systems that have logged")]
    Systems {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        program: Option<String>,
        #[arg(long, help = "Only list distinct system names")]
        names: bool,
    },
    #[command(about = "Count entries per severity")]
    Stats {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
    #[command(about = "Show the earliest stored entries")]
    Oldest {
        #[arg(long)]
        count: Option<i64>,
    },
    Status,
    #[command(about = "Stream matching entries as they arrive")]
    Tail {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        http_addr: Option<String>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(long)]
    db_path: Option<PathBuf>,
    #[arg(long)]
    ingest_http_addr: Option<String>,
    #[arg(long)]
    query_http_addr: Option<String>,
    #[arg(long)]
    query_tcp_addr: Option<String>,
    #[arg(long)]
    query_uds_path: Option<PathBuf>,
}

impl RunArgs {
    fn apply(self, cfg: &mut Config) {
        if let Some(v) = self.db_path {
            cfg.db_path = v;
        }
        if let Some(v) = self.ingest_http_addr {
            cfg.ingest_http_addr = v;
        }
        if let Some(v) = self.query_http_addr {
            cfg.query_http_addr = v;
        }
        if let Some(v) = self.query_tcp_addr {
            cfg.query_tcp_addr = v;
        }
        if let Some(v) = self.query_uds_path {
            cfg.uds_path = v;
        }
    }
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    #[arg(long, help = "RFC3339, naive UTC timestamp, or a duration such as 2h")]
    from: Option<String>,
    #[arg(long)]
    to: Option<String>,
    #[arg(long, help = "Severity name or code, matched exactly")]
    level: Option<String>,
    #[arg(long)]
    program: Option<String>,
    #[arg(long)]
    program_version: Option<String>,
    #[arg(long)]
    windows_version: Option<String>,
    #[arg(long)]
    system: Option<String>,
    #[arg(long)]
    has_stack_trace: Option<bool>,
    #[arg(long)]
    search: Option<String>,
}

impl FilterArgs {
    fn into_filter(self) -> anyhow::Result<FilterSpec> {
        Ok(FilterSpec {
            from: parse_bound(self.from)?,
            to: parse_bound(self.to)?,
            level: self
                .level
                .map(|l| l.parse::<Severity>().map(Severity::code))
                .transpose()?,
            program_name: self.program,
            program_version: self.program_version,
            windows_version: self.windows_version,
            system_details: self.system,
            has_stack_trace: self.has_stack_trace,
            search: self.search,
            ..FilterSpec::default()
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let request = match cli.command {
        Commands::Run(args) => return run_server(args, TelemetryConfig::from_env()).await,
        Commands::Tail { filter, http_addr } => {
            init_cli_tracing();
            let addr = http_addr
                .or(cli.addr)
                .or_else(|| std::env::var("LOGBOOK_QUERY_HTTP_ADDR").ok())
                .unwrap_or_else(|| DEFAULT_QUERY_HTTP_ADDR.to_string());
            return run_tail(&addr, &filter.into_filter()?).await;
        }
        Commands::Query {
            filter,
            page,
            page_size,
            sort_by,
            sort_dir,
            ui,
        } => ApiRequest::Query {
            filter: FilterSpec {
                page,
                page_size,
                sort_by,
                sort_dir,
                ..filter.into_filter()?
            },
            defaults: if ui {
                WindowDefaults::LastDay
            } else {
                WindowDefaults::Open
            },
        },
        Commands::Get { id } => ApiRequest::Get { id },
        Commands::Systems {
            from,
            to,
            program,
            names,
        } => {
            if names {
                ApiRequest::SystemNames
            } else {
                ApiRequest::Systems(SystemsRequest {
                    from: parse_bound(from)?,
                    to: parse_bound(to)?,
                    program_name: program,
                })
            }
        }
        Commands::Stats { from, to } => ApiRequest::Stats(StatsRequest {
            from: parse_bound(from)?.map(Some),
            to: parse_bound(to)?.map(Some),
        }),
        Commands::Oldest { count } => ApiRequest::Oldest(OldestRequest { count }),
        Commands::Status => ApiRequest::Status,
    };

    init_cli_tracing();
    let mut client = QueryClient::connect(cli.uds, cli.addr).await?;
    let response = client.request(request).await?;
    print_response(response, cli.json)
}

async fn run_server(args: RunArgs, telemetry_cfg: TelemetryConfig) -> anyhow::Result<()> {
    let mut cfg = Config::load().context("load config")?;
    args.apply(&mut cfg);

    let store = Store::open(&cfg.db_path)
        .with_context(|| format!("open store {}", cfg.db_path.display()))?;
    init_run_tracing(telemetry_cfg, &store);

    eprintln!("logbook run");
    eprintln!("  db: {}", cfg.db_path.display());
    eprintln!("  ingest http: {}", cfg.ingest_http_addr);
    eprintln!("  query uds: {}", cfg.uds_path.display());
    eprintln!("  query tcp: {}", cfg.query_tcp_addr);
    eprintln!("  query http: {}", cfg.query_http_addr);

    let ingest_addr = parse_addr(&cfg.ingest_http_addr, "ingest_http_addr")?;
    let query_tcp_addr = parse_addr(&cfg.query_tcp_addr, "query_tcp_addr")?;
    let query_http_addr = parse_addr(&cfg.query_http_addr, "query_http_addr")?;

    let ingest_task = tokio::spawn(logbook_ingest::run_ingest_server(
        store.clone(),
        ingest_addr,
        cfg.ingest_max_body_bytes,
    ));
    let query_task = tokio::spawn(query_server::run_query_server(
        store.clone(),
        cfg.uds_path.clone(),
        query_tcp_addr,
    ));
    let query_http_task = tokio::spawn(query_server::run_query_http_server(
        store,
        query_http_addr,
    ));

    tokio::select! {
        res = ingest_task => {
            res??;
        }
        res = query_task => {
            res??;
        }
        res = query_http_task => {
            res??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    let _ = std::fs::remove_file(&cfg.uds_path);
    shutdown_tracing();
    Ok(())
}

fn parse_addr(raw: &str, field: &str) -> anyhow::Result<SocketAddr> {
    raw.parse()
        .with_context(|| format!("invalid {field}: {raw}"))
}

fn parse_bound(raw: Option<String>) -> anyhow::Result<Option<DateTime<Utc>>> {
    Ok(raw.map(|v| parse_time_or_relative(&v)).transpose()?)
}

async fn run_tail(addr: &str, filter: &FilterSpec) -> anyhow::Result<()> {
    let url = format!("http://{addr}/v1/tail");
    let mut response = reqwest::Client::new()
        .get(url)
        .query(filter)
        .send()
        .await
        .context("open tail stream")?;
    if !response.status().is_success() {
        anyhow::bail!(
            "tail stream request failed with status {}",
            response.status()
        );
    }

    let mut buffer = Vec::new();
    while let Some(chunk) = response.chunk().await.context("read tail stream chunk")? {
        buffer.extend_from_slice(&chunk);
        for entry in drain_sse_entries(&mut buffer) {
            print_tail_entry(&entry);
        }
    }
    Ok(())
}

/// Pops every complete SSE frame off `buffer` and decodes its data lines.
/// Bytes stay buffered until a frame is complete, so chunks may split a
/// character. Comments (keep-alives) and undecodable payloads are skipped.
fn drain_sse_entries(buffer: &mut Vec<u8>) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    while let Some(frame_end) = buffer.windows(2).position(|w| w == b"\n\n") {
        let frame: Vec<u8> = buffer.drain(..frame_end + 2).collect();
        let Ok(frame) = std::str::from_utf8(&frame) else {
            tracing::debug!("skipping tail frame with invalid utf8");
            continue;
        };
        for line in frame.lines() {
            if let Some(data) = line.strip_prefix("data:")
                && let Ok(entry) = serde_json::from_str::<LogEntry>(data.trim_start())
            {
                entries.push(entry);
            }
        }
    }
    entries
}

fn print_response(response: ApiResponse, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    match response {
        ApiResponse::Page(v) => print_page_human(&v),
        ApiResponse::Entry(v) => print_entry_human(&v),
        ApiResponse::Entries(v) => print_entries_human(&v),
        ApiResponse::Systems(v) => print_systems_human(&v),
        ApiResponse::SystemNames(v) => print_system_names_human(&v),
        ApiResponse::Stats(v) => print_stats_human(&v),
        ApiResponse::Status(v) => print_status_human(&v),
        ApiResponse::Error(e) => anyhow::bail!("{e}"),
    }
    Ok(())
}
