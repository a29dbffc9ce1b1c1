use chrono::{DateTime, Duration, Utc};
use logbook_core::model::NewLogEntry;

/// A plain entry from a desktop updater on `WS-01`.
pub fn entry_at(message: &str, level: i32, created_at: DateTime<Utc>) -> NewLogEntry {
    NewLogEntry {
        message: message.to_string(),
        stack_trace: None,
        level,
        program_name: "Updater".to_string(),
        program_version: "2.4.1".to_string(),
        windows_version: "10.0.22631".to_string(),
        system_details: "WS-01".to_string(),
        created_at,
    }
}

const PROGRAMS: [(&str, &str); 3] = [
    ("Updater", "2.4.1"),
    ("SyncAgent", "1.9.0"),
    ("Backup", "3.0.2"),
];
const SYSTEMS: [(&str, &str); 3] = [
    ("WS-01", "10.0.22631"),
    ("WS-02", "10.0.19045"),
    ("LAB-PC", "10.0.19045"),
];

/// Forty entries spread over the two days before `now`, covering every
/// severity, a few programs and machines, and traces that are set, empty or
/// missing. Timestamps are whole minutes so they survive storage unchanged.
pub fn mixed_batch(now: DateTime<Utc>) -> Vec<NewLogEntry> {
    (0..40)
        .map(|i: i64| {
            let (program_name, program_version) = PROGRAMS[(i % 3) as usize];
            let (system_details, windows_version) = SYSTEMS[((i / 2) % 3) as usize];
            let level = (i % 6) as i32;
            let message = if i % 7 == 0 {
                format!("request timeout after {i}s")
            } else {
                format!("step {i} finished")
            };
            let stack_trace = match i % 5 {
                0 => Some(format!("System.TimeoutException\n   at Worker.Step{i}()")),
                1 => Some(String::new()),
                2 => Some("   at Program.Main()".to_string()),
                _ => None,
            };
            NewLogEntry {
                message,
                stack_trace,
                level,
                program_name: program_name.to_string(),
                program_version: program_version.to_string(),
                windows_version: windows_version.to_string(),
                system_details: system_details.to_string(),
                // Consecutive pairs share a timestamp.
                created_at: now - Duration::minutes(140 * (i / 2)),
            }
        })
        .collect()
}
