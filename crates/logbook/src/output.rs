use chrono::{DateTime, SecondsFormat, Utc};
use logbook_core::model::{LogEntry, Severity, SeverityCounts};
use logbook_core::query::{LogPage, StatsResponse, StatusResponse, SystemSummary};
use owo_colors::OwoColorize;

pub fn print_page_human(v: &LogPage) {
    for entry in &v.items {
        println!("{}", entry_line(entry));
    }
    println!(
        "-- page {}/{} ({} entries, {} total) --",
        v.page,
        v.total_pages().max(1),
        v.items.len(),
        v.total
    );
    if let (Some(from), Some(to)) = (v.window.from, v.window.to) {
        println!("window={}..{}", ts(from), ts(to));
    }
}

pub fn print_entry_human(v: &LogEntry) {
    println!("id={}", v.id);
    println!("created_at={}", ts(v.created_at));
    println!("level={}", level_label(v.level));
    println!("program={} {}", v.program_name, v.program_version);
    println!("windows={}", v.windows_version);
    println!("system={}", v.system_details);
    println!("message={}", v.message);
    if let Some(trace) = v.stack_trace.as_deref().filter(|t| !t.is_empty()) {
        println!("stack_trace:");
        for line in trace.lines() {
            println!("  {line}");
        }
    }
}

pub fn print_entries_human(v: &[LogEntry]) {
    for entry in v {
        println!("{}", entry_line(entry));
    }
    println!("-- {} entries --", v.len());
}

pub fn print_systems_human(v: &[SystemSummary]) {
    for system in v {
        println!(
            "system=\"{}\" count={} last={}",
            system.system_details,
            system.count,
            ts(system.last_log_at)
        );
    }
    println!("-- {} systems --", v.len());
}

pub fn print_system_names_human(v: &[String]) {
    for name in v {
        println!("{name}");
    }
}

pub fn print_stats_human(v: &StatsResponse) {
    match v {
        StatsResponse::Rolling {
            last_day,
            last_week,
            last_month,
        } => {
            println!("{}", counts_line("last_day", last_day));
            println!("{}", counts_line("last_week", last_week));
            println!("{}", counts_line("last_month", last_month));
        }
        StatsResponse::Period { period } => println!("{}", counts_line("period", period)),
    }
}

pub fn print_status_human(v: &StatusResponse) {
    println!("db_path={}", v.db_path);
    println!("db_size_bytes={}", v.db_size_bytes);
    println!("entries={}", v.entries_count);
    if let Some(oldest) = v.oldest_at {
        println!("oldest={}", ts(oldest));
    }
    if let Some(newest) = v.newest_at {
        println!("newest={}", ts(newest));
    }
}

/// One coloured line per streamed entry.
pub fn print_tail_entry(entry: &LogEntry) {
    let level = level_label(entry.level);
    let level = match entry.severity() {
        Some(Severity::Trace) => level.blue().to_string(),
        Some(Severity::Debug) => level.bright_black().to_string(),
        Some(Severity::Information) => level.green().to_string(),
        Some(Severity::Warning) => level.yellow().to_string(),
        Some(Severity::Error) => level.red().to_string(),
        Some(Severity::Critical) | None => level.magenta().to_string(),
    };
    println!(
        "{} {} {} {} | {}",
        ts(entry.created_at),
        entry.system_details.cyan(),
        entry.program_name,
        level,
        entry.message
    );
}

fn entry_line(entry: &LogEntry) -> String {
    let trace = if entry.has_stack_trace() { " +trace" } else { "" };
    format!(
        "#{} {} {} {} {} {} | {}{}",
        entry.id,
        ts(entry.created_at),
        level_label(entry.level),
        entry.system_details,
        entry.program_name,
        entry.program_version,
        entry.message,
        trace
    )
}

fn counts_line(label: &str, counts: &SeverityCounts) -> String {
    let mut out = format!("{label}: total={}", counts.total);
    for severity in Severity::ALL {
        out.push_str(&format!(" {}={}", severity.name(), counts.get(severity)));
    }
    out
}

fn level_label(level: i32) -> String {
    Severity::from_code(level)
        .map(|s| s.name().to_ascii_uppercase())
        .unwrap_or_else(|| format!("LEVEL{level}"))
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
