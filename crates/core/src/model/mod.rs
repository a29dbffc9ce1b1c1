pub mod entry;
pub mod severity;

pub use entry::{LogEntry, NewLogEntry};
pub use severity::{Severity, SeverityCounts};
