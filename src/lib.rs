pub mod api;
pub mod blockchain;
pub mod cache;
pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod validation;

#[cfg(test)]
pub mod tests;

// Re-export specific items for convenience
pub use api::{ApiError, QueryService};
pub use config::{ChainConfig, Config};
pub use db::connection;
pub use db::query::{Filter, QueryParams, SortDirection};
pub use db::{EntityKind, StoreError};
