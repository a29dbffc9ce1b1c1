pub mod http;
pub mod response;
pub mod server;

pub use server::run_ingest_server;
