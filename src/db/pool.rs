use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};
use std::str::FromStr;
use std::time::Duration;

// 仅用于目录加载
const MAX_CONNECTIONS: u32 = 5;
const SLOW_STATEMENT_THRESHOLD: Duration = Duration::from_secs(2);

/// 创建参考价目录库连接池
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let connect_options = PgConnectOptions::from_str(database_url)?
        .log_slow_statements(tracing::log::LevelFilter::Warn, SLOW_STATEMENT_THRESHOLD);

    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(connect_options)
        .await?;

    tracing::info!("数据库连接池已创建 (max_connections={})", MAX_CONNECTIONS);
    Ok(pool)
}
