use crate::config::AuditPolicy;
use crate::models::{AuditResult, Bill};
use crate::service::aggregator::AuditAggregator;
use crate::service::catalog::Catalog;
use crate::service::detectors::{default_detectors, IssueDetector};
use crate::service::matcher::ProcedureMatcher;
use std::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("reference price catalog is empty or unavailable")]
    CatalogUnavailable,
}

/// 审计引擎：匹配 → 检测 → 聚合
///
/// 同步、无副作用，可在多个线程间共享
pub struct AuditEngine {
    policy: AuditPolicy,
    detectors: Vec<Box<dyn IssueDetector>>,
}

impl AuditEngine {
    pub fn new(policy: AuditPolicy) -> Self {
        let detectors = default_detectors(&policy);
        Self { policy, detectors }
    }

    pub fn policy(&self) -> &AuditPolicy {
        &self.policy
    }

    /// 审计单张账单
    pub fn audit(&self, bill: &Bill, catalog: &Catalog) -> Result<AuditResult, AuditError> {
        if catalog.is_empty() {
            tracing::warn!("参考价目录为空，拒绝审计");
            return Err(AuditError::CatalogUnavailable);
        }

        let start = Instant::now();
        let bill = bill.screened();
        if bill.region.is_none() {
            tracing::debug!("账单未声明区域，推断为 {:?}", bill.resolved_region());
        }

        // 1. 明细匹配
        let matcher = ProcedureMatcher::new(catalog, &self.policy);
        let matches = matcher.match_items(&bill.line_items);
        let matched = matches.iter().filter(|m| m.is_matched()).count();
        tracing::debug!("匹配完成: {}/{} 条明细命中目录", matched, bill.line_items.len());

        // 2. 各检测器独立运行，按固定顺序收集
        let mut issues = Vec::new();
        for detector in &self.detectors {
            let found = detector.detect(&bill, &matches);
            if !found.is_empty() {
                tracing::debug!("检测器 {} 发现 {} 个问题", detector.name(), found.len());
            }
            issues.extend(found);
        }

        // 3. 聚合
        let result = AuditAggregator::new(&self.policy).aggregate(&bill, issues);

        tracing::info!(
            "审计完成: {} 条明细, {} 个问题, 评分 {}, 可节省 {}, 耗时 {:?}",
            bill.line_items.len(),
            result.issues.len(),
            result.score,
            result.potential_savings,
            start.elapsed()
        );

        Ok(result)
    }
}

impl Default for AuditEngine {
    fn default() -> Self {
        Self::new(AuditPolicy::default())
    }
}

/// 使用默认策略审计
pub fn audit(bill: &Bill, catalog: &Catalog) -> Result<AuditResult, AuditError> {
    AuditEngine::default().audit(bill, catalog)
}
