pub mod db;
pub mod query;
pub mod schema;
mod sql;
pub mod write;

pub use db::Store;
