use super::IssueDetector;
use crate::config::AuditPolicy;
use crate::models::money::{abs_diff, decimal_from_f64, format_amount};
use crate::models::{Bill, Issue, IssueType, MatchResult, Severity};
use crate::service::matcher::normalize;
use bigdecimal::BigDecimal;

/// 重复收费：相同描述 (及编码) 且金额在容差内
pub struct DuplicateDetector {
    tolerance: BigDecimal,
    material_amount: BigDecimal,
}

impl DuplicateDetector {
    pub fn new(policy: &AuditPolicy) -> Self {
        Self {
            tolerance: decimal_from_f64(policy.duplicate_amount_tolerance),
            material_amount: decimal_from_f64(policy.material_amount),
        }
    }
}

/// 首次出现的明细
struct FirstOccurrence {
    key: (String, String),
    amount: BigDecimal,
    line_index: usize,
    count: usize,
}

impl IssueDetector for DuplicateDetector {
    fn name(&self) -> &'static str {
        "duplicate"
    }

    fn detect(&self, bill: &Bill, _matches: &[MatchResult]) -> Vec<Issue> {
        let mut issues = Vec::new();
        let mut firsts: Vec<FirstOccurrence> = Vec::new();

        for (idx, item) in bill.line_items.iter().enumerate() {
            if !item.is_evaluable() {
                continue;
            }

            let key = (
                normalize(&item.description),
                item.procedure_code
                    .as_deref()
                    .map(|c| c.trim().to_uppercase())
                    .unwrap_or_default(),
            );

            let existing = firsts
                .iter_mut()
                .find(|f| f.key == key && abs_diff(&f.amount, &item.total_amount) <= self.tolerance);

            let Some(first) = existing else {
                firsts.push(FirstOccurrence {
                    key,
                    amount: item.total_amount.clone(),
                    line_index: idx,
                    count: 1,
                });
                continue;
            };

            first.count += 1;
            let severity = if item.total_amount > self.material_amount {
                Severity::Critical
            } else {
                Severity::High
            };

            tracing::debug!(
                "重复收费: 第 {} 行与第 {} 行相同 ('{}')",
                idx + 1, first.line_index + 1, item.description
            );

            issues.push(
                Issue::new(
                    IssueType::DuplicateCharge,
                    severity,
                    format!(
                        "Duplicate charge: '{}' ({}) on line {} repeats line {}",
                        item.description,
                        format_amount(bill.resolved_region(), &item.total_amount),
                        idx + 1,
                        first.line_index + 1
                    ),
                )
                .field(format!("line_items[{}]", idx))
                .expected("1")
                .actual(first.count.to_string())
                .impact(item.total_amount.clone())
                .on_line(idx),
            );
        }

        issues
    }
}
