use logbook_core::filter::{FilterSpec, WindowDefaults};
use logbook_core::model::LogEntry;
use logbook_core::query::{
    LogPage, OldestRequest, StatsRequest, StatsResponse, StatusResponse, SystemSummary,
    SystemsRequest,
};
use serde::{Deserialize, Serialize};

/// One request per line on the TCP/UDS query socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApiRequest {
    Query {
        filter: FilterSpec,
        #[serde(default)]
        defaults: WindowDefaults,
    },
    Get {
        id: i64,
    },
    Systems(SystemsRequest),
    SystemNames,
    Stats(StatsRequest),
    Oldest(OldestRequest),
    Status,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApiResponse {
    Page(LogPage),
    Entry(LogEntry),
    Entries(Vec<LogEntry>),
    Systems(Vec<SystemSummary>),
    SystemNames(Vec<String>),
    Stats(StatsResponse),
    Status(StatusResponse),
    Error(String),
}
