use crate::models::{CatalogEntry, ProcedureRow};
use sqlx::PgPool;
use std::time::{Duration, Instant};

/// 建表 (已存在则跳过)
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS procedures (
            id              BIGSERIAL PRIMARY KEY,
            normalized_name TEXT NOT NULL UNIQUE,
            category        TEXT NOT NULL DEFAULT '',
            cghs_code       TEXT,
            government_rate NUMERIC(12, 2),
            package_rate    NUMERIC(12, 2),
            market_low      NUMERIC(12, 2),
            market_median   NUMERIC(12, 2),
            market_high     NUMERIC(12, 2),
            aliases         TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// 查询参考价目录 (按 id 保证顺序稳定)
pub async fn list_procedures(pool: &PgPool) -> Result<Vec<ProcedureRow>, sqlx::Error> {
    sqlx::query_as::<_, ProcedureRow>(
        r#"
        SELECT normalized_name,
               category,
               cghs_code,
               government_rate::numeric AS government_rate,
               package_rate::numeric    AS package_rate,
               market_low::numeric      AS market_low,
               market_median::numeric   AS market_median,
               market_high::numeric     AS market_high,
               aliases
        FROM procedures
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn count_procedures(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT count(*) FROM procedures")
        .fetch_one(pool)
        .await
}

/// 批量写入目录条目，名称冲突时跳过
pub async fn insert_procedures(pool: &PgPool, entries: &[CatalogEntry]) -> Result<u64, sqlx::Error> {
    if entries.is_empty() {
        return Ok(0);
    }

    tracing::debug!("开始构建批量插入语句, {} 条目录", entries.len());
    let start_time = Instant::now();

    let mut query_builder = sqlx::QueryBuilder::new(
        "INSERT INTO procedures (
            normalized_name, category, cghs_code,
            government_rate, package_rate,
            market_low, market_median, market_high,
            aliases
        ) ",
    );

    query_builder.push_values(entries, |mut b, entry| {
        let market = entry.market_rate_range.as_ref();
        b.push_bind(&entry.normalized_name)
            .push_bind(&entry.category)
            .push_bind(entry.code.as_deref())
            .push_bind(entry.government_rate.clone())
            .push_bind(entry.package_rate.clone())
            .push_bind(market.map(|m| m.low.clone()))
            .push_bind(market.map(|m| m.median.clone()))
            .push_bind(market.map(|m| m.high.clone()))
            .push_bind(if entry.aliases.is_empty() {
                None
            } else {
                Some(entry.aliases.join(","))
            });
    });
    query_builder.push(" ON CONFLICT (normalized_name) DO NOTHING");

    // 超时控制: 30秒
    let execute_result = tokio::time::timeout(
        Duration::from_secs(30),
        query_builder.build().execute(pool),
    )
    .await;

    match execute_result {
        Ok(Ok(result)) => {
            tracing::info!("✓ 目录写入成功, 影响 {} 行, 耗时: {:?}", result.rows_affected(), start_time.elapsed());
            Ok(result.rows_affected())
        }
        Ok(Err(e)) => {
            tracing::error!("✗ 目录写入失败, 耗时: {:?}, 错误: {:?}", start_time.elapsed(), e);
            Err(e)
        }
        Err(_) => {
            tracing::error!("✗ 目录写入超时 (>30秒)!");
            Err(sqlx::Error::PoolTimedOut)
        }
    }
}
