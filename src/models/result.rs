use crate::models::{CatalogEntry, Issue, Region, Severity};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// 明细行与目录条目的匹配结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub line_index: usize,
    pub entry: Option<CatalogEntry>,
    /// [0,1]，0 表示未匹配
    pub confidence: f64,
}

impl MatchResult {
    pub fn unmatched(line_index: usize) -> Self {
        Self {
            line_index,
            entry: None,
            confidence: 0.0,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.entry.is_some() && self.confidence > 0.0
    }
}

/// 搜索结果 (目录检索接口)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredProcedure {
    pub entry: CatalogEntry,
    pub score: f64,
}

/// 按严重程度统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSummary {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl IssueSummary {
    pub fn from_issues(issues: &[Issue]) -> Self {
        let mut summary = Self {
            total: issues.len(),
            ..Self::default()
        };
        for issue in issues {
            match issue.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
            }
        }
        summary
    }
}

/// 审计结果 (构建后不可变)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub score: u8,
    pub issues: Vec<Issue>,
    pub potential_savings: BigDecimal,
    pub region: Region,
    pub summary: IssueSummary,
}

impl AuditResult {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}
