use super::IssueDetector;
use crate::config::AuditPolicy;
use crate::models::money::{abs_diff, decimal_from_f64, format_amount, to_f64};
use crate::models::{Bill, Issue, IssueType, MatchResult, Severity};
use bigdecimal::{BigDecimal, Zero};

/// 税额校验：隐含税率是否落在地区税率区间内
pub struct TaxDetector {
    policy: AuditPolicy,
    tolerance: BigDecimal,
}

impl TaxDetector {
    pub fn new(policy: &AuditPolicy) -> Self {
        Self {
            policy: policy.clone(),
            tolerance: decimal_from_f64(policy.arithmetic_tolerance),
        }
    }
}

fn percent(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}

impl IssueDetector for TaxDetector {
    fn name(&self) -> &'static str {
        "tax"
    }

    fn detect(&self, bill: &Bill, _matches: &[MatchResult]) -> Vec<Issue> {
        let mut issues = Vec::new();
        let zero = BigDecimal::zero();

        let subtotal = bill.effective_subtotal();
        if subtotal <= zero {
            return issues;
        }
        let tax = bill.tax_amount.clone().unwrap_or_else(BigDecimal::zero);
        if tax < zero {
            // 负税额由输入校验报告
            return issues;
        }

        let region = bill.resolved_region();
        let band = self.policy.tax_band(region);
        let implied = to_f64(&tax) / to_f64(&subtotal);

        // 1. 税率区间
        let max_allowed = &subtotal * decimal_from_f64(band.max_rate);
        let min_allowed = &subtotal * decimal_from_f64(band.min_rate);
        if tax > &max_allowed + &self.tolerance {
            let excess = &tax - &max_allowed;
            tracing::debug!("税率超出区间: {:.4} > {:.4}", implied, band.max_rate);
            issues.push(
                Issue::new(
                    IssueType::TaxMismatch,
                    Severity::Medium,
                    format!(
                        "Tax of {} is {} of the subtotal, above the {} maximum for {:?} bills",
                        format_amount(region, &tax),
                        percent(implied),
                        percent(band.max_rate),
                        region
                    ),
                )
                .field("tax_amount")
                .expected(max_allowed.with_scale(2).to_string())
                .actual(tax.to_string())
                .impact(excess),
            );
        } else if &tax + &self.tolerance < min_allowed {
            issues.push(
                Issue::new(
                    IssueType::TaxMismatch,
                    Severity::Low,
                    format!(
                        "Tax is {} of the subtotal, below the {} minimum",
                        percent(implied),
                        percent(band.min_rate)
                    ),
                )
                .field("tax_amount")
                .expected(min_allowed.with_scale(2).to_string())
                .actual(tax.to_string()),
            );
        }

        // 2. 声明税率与税额是否一致
        if let Some(rate) = bill.stated_tax_rate() {
            let expected = &subtotal * decimal_from_f64(rate);
            let diff = abs_diff(&expected, &tax);
            if diff > self.tolerance {
                let mut issue = Issue::new(
                    IssueType::TaxMismatch,
                    Severity::Medium,
                    format!(
                        "Tax of {} does not match the stated rate {} on subtotal {}",
                        format_amount(region, &tax),
                        percent(rate),
                        format_amount(region, &subtotal)
                    ),
                )
                .field("tax_amount")
                .expected(expected.with_scale(2).to_string())
                .actual(tax.to_string());
                if tax > expected {
                    issue = issue.impact(diff);
                }
                issues.push(issue);
            }
        }

        issues
    }
}
