use super::IssueDetector;
use crate::config::AuditPolicy;
use crate::models::money::{abs_diff, clamp_amount, decimal_from_f64, format_amount};
use crate::models::{Bill, Issue, IssueType, MatchResult, Severity};
use bigdecimal::{BigDecimal, Zero};

/// 算术校验：明细和 vs 小计、小计+税 vs 合计、数量×单价 vs 行金额
pub struct ArithmeticDetector {
    tolerance: BigDecimal,
}

impl ArithmeticDetector {
    pub fn new(policy: &AuditPolicy) -> Self {
        Self {
            tolerance: decimal_from_f64(policy.arithmetic_tolerance),
        }
    }

    /// 小计容差随明细数增长 (每行一个舍入单位)
    fn subtotal_tolerance(&self, item_count: usize) -> BigDecimal {
        &self.tolerance * BigDecimal::from(item_count.max(1) as u64)
    }

    fn check_subtotal(&self, bill: &Bill, issues: &mut Vec<Issue>) {
        let Some(stated) = &bill.subtotal else {
            return;
        };
        // 有明细金额被排除时明细和不可信
        if bill.line_items.is_empty() || bill.has_out_of_range_lines() {
            return;
        }

        let computed = bill.line_item_sum();
        let diff = abs_diff(&computed, stated);
        if diff > self.subtotal_tolerance(bill.line_items.len()) {
            tracing::debug!("小计不符: 明细和 {} vs 声明 {}", computed, stated);
            issues.push(
                Issue::new(
                    IssueType::ArithmeticMismatch,
                    Severity::High,
                    format!(
                        "Line items sum ({}) does not match stated subtotal ({})",
                        format_amount(bill.resolved_region(), &computed),
                        format_amount(bill.resolved_region(), stated)
                    ),
                )
                .field("subtotal")
                .expected(computed.to_string())
                .actual(stated.to_string())
                .impact(diff),
            );
        }
    }

    fn check_total(&self, bill: &Bill, issues: &mut Vec<Issue>) {
        let Some(stated) = &bill.total_amount else {
            return;
        };
        if bill.subtotal.is_none() && bill.has_out_of_range_lines() {
            return;
        }

        let zero = BigDecimal::zero();
        let base = bill.effective_subtotal();
        let tax = bill.tax_amount.clone().unwrap_or_else(BigDecimal::zero);
        let discount = bill.discount.clone().unwrap_or_else(BigDecimal::zero);
        let insurance = bill.insurance_paid.clone().unwrap_or_else(BigDecimal::zero);
        let expected = base + tax - discount - insurance;

        // 扣减后为负说明抽取数据不可用，不做判断
        if expected < zero {
            return;
        }

        let diff = abs_diff(&expected, stated);
        if diff > self.tolerance {
            tracing::debug!("合计不符: 计算值 {} vs 声明 {}", expected, stated);
            issues.push(
                Issue::new(
                    IssueType::ArithmeticMismatch,
                    Severity::High,
                    format!(
                        "Calculated total ({}) does not match stated total ({})",
                        format_amount(bill.resolved_region(), &expected),
                        format_amount(bill.resolved_region(), stated)
                    ),
                )
                .field("total_amount")
                .expected(expected.to_string())
                .actual(stated.to_string())
                .impact(diff),
            );
        }
    }

    fn check_line_items(&self, bill: &Bill, issues: &mut Vec<Issue>) {
        let zero = BigDecimal::zero();
        for (idx, item) in bill.line_items.iter().enumerate() {
            if !item.is_evaluable() || item.unit_amount <= zero {
                continue;
            }

            let expected = &item.unit_amount * BigDecimal::from(item.quantity);
            let diff = abs_diff(&expected, &item.total_amount);
            if diff > self.tolerance {
                issues.push(
                    Issue::new(
                        IssueType::ArithmeticMismatch,
                        Severity::Medium,
                        format!(
                            "Line item '{}': {} x {} does not equal {}",
                            item.description,
                            item.quantity,
                            format_amount(bill.resolved_region(), &item.unit_amount),
                            format_amount(bill.resolved_region(), &item.total_amount)
                        ),
                    )
                    .field(format!("line_items[{}]", idx))
                    .expected(expected.to_string())
                    .actual(item.total_amount.to_string())
                    .impact(clamp_amount(diff, &item.total_amount))
                    .on_line(idx),
                );
            }
        }
    }
}

impl IssueDetector for ArithmeticDetector {
    fn name(&self) -> &'static str {
        "arithmetic"
    }

    fn detect(&self, bill: &Bill, _matches: &[MatchResult]) -> Vec<Issue> {
        let mut issues = Vec::new();
        self.check_subtotal(bill, &mut issues);
        self.check_total(bill, &mut issues);
        self.check_line_items(bill, &mut issues);
        issues
    }
}
