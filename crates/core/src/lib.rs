pub mod config;
pub mod error;
pub mod filter;
pub mod model;
pub mod params;
pub mod query;
pub mod time;

pub use error::{LogbookError, Result};
