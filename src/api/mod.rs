pub mod error;
pub mod handlers;

pub use error::ApiError;
pub use handlers::*;

use crate::config::{AppConfig, CatalogConfig};
use crate::service::{
    build_drafter, build_extractor, AuditCache, AuditEngine, Catalog, CatalogHandle, LetterDrafter, TextExtractor,
};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceBuilder;

/// 请求体上限 (批量审计按数百张账单估算)
pub const MAX_REQUEST_BODY_BYTES: usize = 4 * 1024 * 1024;

/// 共享状态
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AuditEngine>,
    pub catalog: Arc<CatalogHandle>,
    pub cache: Arc<AuditCache>,
    pub drafter: Arc<dyn LetterDrafter>,
    pub extractor: Arc<dyn TextExtractor>,
    pub catalog_config: Arc<CatalogConfig>,
    pub pool: Option<PgPool>,
}

impl AppState {
    pub fn new(config: &AppConfig, catalog: Catalog, pool: Option<PgPool>) -> Self {
        Self {
            engine: Arc::new(AuditEngine::new(config.audit.clone())),
            catalog: Arc::new(CatalogHandle::new(catalog)),
            cache: Arc::new(AuditCache::default()),
            drafter: Arc::from(build_drafter(config.provider.drafter)),
            extractor: Arc::from(build_extractor(config.provider.extractor)),
            catalog_config: Arc::new(config.catalog.clone()),
            pool,
        }
    }
}

/// 构建路由
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/audit", post(handlers::audit_bill))
        .route("/api/audit/extracted", post(handlers::audit_extracted))
        .route("/api/audit/batch", post(handlers::audit_batch))
        .route("/api/audit/report.csv", post(handlers::audit_report_csv))
        .route("/api/procedures/search", get(handlers::search_procedures))
        .route("/api/catalog/reload", post(handlers::reload_catalog))
        .route("/api/letters/draft", post(handlers::draft_letter))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(handlers::log_request))
                .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES)),
        )
        .with_state(state)
}
