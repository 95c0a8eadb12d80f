//! Infrastructure layer for database connections, repositories and external integrations
//!
//! This module provides the SQLite store adapters, the transactional plan
//! executor, taxonomy feed adapters, configuration and logging.

pub mod catalog_repository;
pub mod config; // Configuration loading and defaults
pub mod database_connection;
pub mod dictionary_repository;
pub mod logging; // Logging infrastructure
pub mod plan_executor;
pub mod taxonomy_feed;

// Re-export commonly used items
pub use catalog_repository::SqliteCatalogRepository;
pub use config::{AppConfig, ConfigManager};
pub use database_connection::DatabaseConnection;
pub use dictionary_repository::SqliteDictionaryRepository;
pub use logging::{get_log_directory, init_logging_with_config};
pub use plan_executor::SqlitePlanExecutor;
pub use taxonomy_feed::{JsonFileTaxonomyFeed, StaticTaxonomyFeed};
