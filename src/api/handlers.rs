use super::{ApiError, AppState};
use crate::models::{AuditResult, Bill, ScoredProcedure};
use crate::service::{
    load_catalog, write_issues_csv, AuditCache, LetterRequest, LetterTone, PatientInfo, ProcedureMatcher,
};
use axum::{
    body::Bytes,
    extract::{Json, Query, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_SEARCH_LIMIT: usize = 10;
const MAX_SEARCH_LIMIT: usize = 50;

/// 单张审计响应
#[derive(Debug, Serialize)]
pub struct AuditResponse {
    pub success: bool,
    pub message: String,
    pub cached: bool,
    pub audited_at: String,
    pub result: AuditResult,
}

/// 批量请求体
#[derive(Debug, Deserialize)]
pub struct BatchAuditRequest {
    pub bills: Vec<Bill>,
}

#[derive(Debug, Serialize)]
pub struct BatchAuditResponse {
    pub success: bool,
    pub message: String,
    pub results: Vec<AuditResult>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<ScoredProcedure>,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub success: bool,
    pub message: String,
    pub procedures: usize,
    pub generation: u64,
}

/// 信函请求体
#[derive(Debug, Deserialize)]
pub struct LetterDraftRequest {
    pub bill: Bill,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub patient: Option<PatientInfo>,
}

#[derive(Debug, Serialize)]
pub struct LetterDraftResponse {
    pub success: bool,
    pub tone: LetterTone,
    pub letter: String,
    pub result: AuditResult,
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 请求日志
pub async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;
    tracing::info!("{} {} -> {} ({:?})", method, path, response.status().as_u16(), start.elapsed());
    response
}

/// 带缓存的审计，返回 (结果, 是否命中缓存)
fn audit_cached(state: &AppState, bill: &Bill) -> Result<(Arc<AuditResult>, bool), ApiError> {
    // 先取版本号再取快照：替换期间写入的结果以旧版本为键，不会再被命中
    let generation = state.catalog.generation();
    let catalog = state.catalog.snapshot();
    let key = AuditCache::key(bill, generation);

    if let Some(hit) = key.as_ref().and_then(|k| state.cache.get(k)) {
        tracing::debug!("审计缓存命中");
        return Ok((hit, true));
    }

    let result = Arc::new(state.engine.audit(bill, &catalog)?);
    if let Some(key) = key {
        state.cache.insert(key, Arc::clone(&result));
    }
    Ok((result, false))
}

fn audit_response(state: &AppState, bill: &Bill) -> Result<Response, ApiError> {
    let (result, cached) = audit_cached(state, bill)?;
    let response = AuditResponse {
        success: true,
        message: format!(
            "Audited {} line items: {} issues, score {}",
            bill.line_items.len(),
            result.issues.len(),
            result.score
        ),
        cached,
        audited_at: chrono::Local::now().to_rfc3339(),
        result: (*result).clone(),
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// 审计单张账单
pub async fn audit_bill(State(state): State<AppState>, Json(bill): Json<Bill>) -> Result<Response, ApiError> {
    audit_response(&state, &bill)
}

/// 审计上游原始文档：由配置选定的抽取器解析后审计
pub async fn audit_extracted(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let bill = state.extractor.extract(&body)?;
    tracing::debug!("抽取器 {} 解析出 {} 条明细", state.extractor.name(), bill.line_items.len());
    audit_response(&state, &bill)
}

/// 批量审计：rayon 并行，放在阻塞线程中执行
pub async fn audit_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchAuditRequest>,
) -> Result<Response, ApiError> {
    let count = req.bills.len();
    tracing::info!("收到批量审计请求: {} 张账单", count);
    let start = Instant::now();

    let engine = Arc::clone(&state.engine);
    let catalog = state.catalog.snapshot();
    let results = tokio::task::spawn_blocking(move || {
        req.bills
            .par_iter()
            .map(|bill| engine.audit(bill, &catalog))
            .collect::<Result<Vec<_>, _>>()
    })
    .await
    .map_err(|e| ApiError::Internal(format!("batch worker failed: {}", e)))??;

    let total_issues: usize = results.iter().map(|r| r.issues.len()).sum();
    tracing::info!("批量审计完成: {} 张账单, {} 个问题, 耗时 {:?}", count, total_issues, start.elapsed());

    let response = BatchAuditResponse {
        success: true,
        message: format!("Audited {} bills, {} issues found", count, total_issues),
        results,
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// 审计并以 CSV 返回问题清单
pub async fn audit_report_csv(State(state): State<AppState>, Json(bill): Json<Bill>) -> Result<Response, ApiError> {
    let (result, _) = audit_cached(&state, &bill)?;
    let mut buf = Vec::new();
    write_issues_csv(&result, &mut buf)?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        buf,
    )
        .into_response())
}

/// 目录检索
pub async fn search_procedures(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Response, ApiError> {
    if params.q.trim().is_empty() {
        return Err(ApiError::BadRequest("query parameter 'q' must not be empty".to_string()));
    }
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).min(MAX_SEARCH_LIMIT);

    let catalog = state.catalog.snapshot();
    let results = ProcedureMatcher::new(&catalog, state.engine.policy()).search(&params.q, limit);
    let response = SearchResponse { query: params.q, results };
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// 按配置重新加载目录；失败时保留旧目录
pub async fn reload_catalog(State(state): State<AppState>) -> Result<Response, ApiError> {
    let catalog = load_catalog(&state.catalog_config, state.pool.as_ref()).await?;
    let procedures = catalog.len();
    let generation = state.catalog.replace(catalog);
    state.cache.clear();
    tracing::info!("参考价目录已替换: {} 条, 版本 {}", procedures, generation);

    let response = ReloadResponse {
        success: true,
        message: format!("Reloaded {} procedures", procedures),
        procedures,
        generation,
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// 审计并起草申诉信
pub async fn draft_letter(
    State(state): State<AppState>,
    Json(req): Json<LetterDraftRequest>,
) -> Result<Response, ApiError> {
    let tone = match req.tone.as_deref() {
        Some(tone) => LetterTone::from_str(tone)?,
        None => LetterTone::default(),
    };

    let (result, _) = audit_cached(&state, &req.bill)?;
    let request = LetterRequest {
        result: &result,
        tone,
        patient: req.patient.as_ref(),
        date: chrono::Local::now().date_naive(),
    };
    let letter = state.drafter.draft(&request)?;

    let response = LetterDraftResponse {
        success: true,
        tone,
        letter,
        result: (*result).clone(),
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}
