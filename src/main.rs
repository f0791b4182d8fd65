use bill_audit_engine::config::CatalogSource;
use bill_audit_engine::service::load_catalog;
use bill_audit_engine::{build_router, create_pool, db, AppConfig, AppState, Catalog};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 使用本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置：配置文件/AUDIT__* 失败时退回常用环境变量
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("配置加载失败 ({}), 使用环境变量默认配置", e);
            AppConfig::from_env()
        }
    };
    info!("Starting server with config: {:?}", config);

    // 数据库仅在配置了 URL 时连接
    let pool = match &config.database.url {
        Some(url) => Some(create_pool(url).await?),
        None => None,
    };

    // 目录表为空时写入内置种子数据
    if let (CatalogSource::Postgres, Some(pool)) = (config.catalog.source, pool.as_ref()) {
        db::ensure_schema(pool).await?;
        if db::count_procedures(pool).await? == 0 {
            let seed = Catalog::builtin()?;
            let inserted = db::insert_procedures(pool, seed.all()).await?;
            info!("procedures 表为空，已写入 {} 条内置参考价", inserted);
        }
    }

    let catalog = load_catalog(&config.catalog, pool.as_ref()).await?;
    let state = AppState::new(&config, catalog, pool);
    let app = build_router(state);

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/audit                - 审计单张账单");
    info!("  POST /api/audit/batch          - 批量审计");
    info!("  POST /api/audit/report.csv     - 问题清单 CSV");
    info!("  GET  /api/procedures/search    - 目录检索");
    info!("  POST /api/catalog/reload       - 重新加载目录");
    info!("  POST /api/letters/draft        - 起草申诉信");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
