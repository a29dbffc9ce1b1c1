use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::sync::{Mutex, OnceLock};

use chrono::Utc;
use logbook_core::model::{NewLogEntry, Severity};
use logbook_store::Store;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace as sdktrace;
use tokio::sync::mpsc;
use tracing::{Event, Level, Subscriber};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const SELF_PROGRAM: &str = "logbook";
const SELF_FLUSH_BATCH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub self_observe: bool,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self {
            self_observe: std::env::var("LOGBOOK_SELF_OBSERVE")
                .is_ok_and(|v| is_truthy(&v)),
        }
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn init_cli_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .compact()
        .try_init();
}

pub fn init_run_tracing(cfg: TelemetryConfig, store: &Store) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .compact();

    let store_layer = cfg
        .self_observe
        .then(|| SelfObserveLayer::new(store.clone()));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(build_otlp_layer())
        .with(store_layer)
        .try_init();
}

pub fn shutdown_tracing() {
    if let Some(provider) = otlp_provider_slot()
        .lock()
        .ok()
        .and_then(|mut slot| slot.take())
    {
        let _ = provider.shutdown();
    }
}

fn build_otlp_layer<S>() -> Option<OpenTelemetryLayer<S, sdktrace::Tracer>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
        .ok()?;
    let provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();
    let tracer = provider.tracer(SELF_PROGRAM);

    if let Ok(mut slot) = otlp_provider_slot().lock() {
        *slot = Some(provider);
    }
    Some(tracing_opentelemetry::layer().with_tracer(tracer))
}

fn otlp_provider_slot() -> &'static Mutex<Option<sdktrace::SdkTracerProvider>> {
    static SLOT: OnceLock<Mutex<Option<sdktrace::SdkTracerProvider>>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(None))
}

/// Writes the server's own warnings and errors into its store so they show
/// up next to producer logs.
struct SelfObserveLayer {
    tx: mpsc::UnboundedSender<NewLogEntry>,
}

impl SelfObserveLayer {
    fn new(store: Store) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<NewLogEntry>();
        tokio::spawn(async move {
            let mut pending = Vec::new();
            while let Some(entry) = rx.recv().await {
                pending.push(entry);
                while pending.len() < SELF_FLUSH_BATCH {
                    match rx.try_recv() {
                        Ok(entry) => pending.push(entry),
                        Err(_) => break,
                    }
                }
                // Failures are dropped; logging them would feed back into this layer.
                let _ = store.insert_logs(&pending);
                pending.clear();
            }
        });
        Self { tx }
    }
}

impl<S> Layer<S> for SelfObserveLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let Some(severity) = self_severity(*meta.level()) else {
            return;
        };
        if meta.target().starts_with("logbook::telemetry") {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let _ = self.tx.send(self_entry(
            severity,
            meta.target(),
            visitor.into_message(meta.name()),
        ));
    }
}

fn self_severity(level: Level) -> Option<Severity> {
    match level {
        Level::ERROR => Some(Severity::Error),
        Level::WARN => Some(Severity::Warning),
        _ => None,
    }
}

fn self_entry(severity: Severity, target: &str, message: String) -> NewLogEntry {
    NewLogEntry {
        message,
        stack_trace: None,
        level: severity.code(),
        program_name: SELF_PROGRAM.to_string(),
        program_version: env!("CARGO_PKG_VERSION").to_string(),
        windows_version: std::env::consts::OS.to_string(),
        system_details: std::env::var("HOSTNAME").unwrap_or_else(|_| target.to_string()),
        created_at: Utc::now(),
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: BTreeMap<String, String>,
}

impl FieldVisitor {
    /// `message key=value ...`, falling back to the event name.
    fn into_message(self, fallback: &str) -> String {
        let mut out = self.message.unwrap_or_else(|| fallback.to_string());
        for (k, v) in self.fields {
            out.push_str(&format!(" {k}={v}"));
        }
        out
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(rendered);
        } else {
            self.fields.insert(field.name().to_string(), rendered);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields
                .insert(field.name().to_string(), value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use logbook_core::filter::{FilterSpec, WindowDefaults};

    use super::*;

    #[test]
    fn truthy_values() {
        for v in ["1", "true", "YES", " on "] {
            assert!(is_truthy(v), "{v}");
        }
        for v in ["0", "off", "", "store"] {
            assert!(!is_truthy(v), "{v}");
        }
    }

    #[test]
    fn only_warnings_and_errors_are_kept() {
        assert_eq!(self_severity(Level::ERROR), Some(Severity::Error));
        assert_eq!(self_severity(Level::WARN), Some(Severity::Warning));
        assert_eq!(self_severity(Level::INFO), None);
        assert_eq!(self_severity(Level::TRACE), None);
    }

    #[test]
    fn visitor_renders_fields_after_message() {
        let mut visitor = FieldVisitor::default();
        visitor.message = Some("store write failed".into());
        visitor.fields.insert("count".into(), "3".into());
        visitor.fields.insert("attempt".into(), "1".into());
        assert_eq!(
            visitor.into_message("event"),
            "store write failed attempt=1 count=3"
        );
        assert_eq!(FieldVisitor::default().into_message("event"), "event");
    }

    #[tokio::test]
    async fn self_observed_events_land_in_the_store() {
        let store = Store::open_in_memory().unwrap();
        let subscriber =
            tracing_subscriber::registry().with(SelfObserveLayer::new(store.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("ignored");
            tracing::warn!(queue = 7, "ingest slow");
        });

        let mut found = Vec::new();
        for _ in 0..50 {
            found = store
                .query(&FilterSpec::default(), WindowDefaults::Open)
                .unwrap()
                .items;
            if !found.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].program_name, "logbook");
        assert_eq!(found[0].level, 3);
        assert_eq!(found[0].message, "ingest slow queue=7");
    }
}
