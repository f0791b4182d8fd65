pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod service;

pub use api::{build_router, AppState};
pub use config::{AppConfig, AuditPolicy};
pub use db::create_pool;
pub use models::{AuditResult, Bill, CatalogEntry, Issue, IssueType, LineItem, MatchResult, Region, Severity};
pub use service::{audit, AuditEngine, AuditError, Catalog, CatalogHandle};
