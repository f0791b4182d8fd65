use crate::config::AuditPolicy;
use crate::models::money::clamp_amount;
use crate::models::{AuditResult, Bill, Issue, IssueSummary, Severity};
use bigdecimal::{BigDecimal, Zero};
use std::collections::HashMap;

/// 聚合器：排序、评分、节省金额汇总
pub struct AuditAggregator<'a> {
    policy: &'a AuditPolicy,
}

impl<'a> AuditAggregator<'a> {
    pub fn new(policy: &'a AuditPolicy) -> Self {
        Self { policy }
    }

    /// 汇总所有检测器输出，生成不可变的审计结果
    ///
    /// 编号按检出顺序分配，随后按严重程度稳定排序
    pub fn aggregate(&self, bill: &Bill, mut issues: Vec<Issue>) -> AuditResult {
        for (idx, issue) in issues.iter_mut().enumerate() {
            issue.id = idx as u32 + 1;
        }
        issues.sort_by_key(|issue| issue.severity.rank());

        let score = self.score(&issues);
        let potential_savings = self.potential_savings(bill, &issues);
        let summary = IssueSummary::from_issues(&issues);

        AuditResult {
            score,
            issues,
            potential_savings,
            region: bill.resolved_region(),
            summary,
        }
    }

    /// 每档扣分 (MEDIUM/LOW 有上限)，从 100 饱和扣减
    pub fn score(&self, issues: &[Issue]) -> u8 {
        let count = |severity: Severity| issues.iter().filter(|i| i.severity == severity).count() as u32;

        let penalties = [
            count(Severity::Critical).saturating_mul(self.policy.critical_penalty),
            count(Severity::High).saturating_mul(self.policy.high_penalty),
            count(Severity::Medium)
                .saturating_mul(self.policy.medium_penalty)
                .min(self.policy.medium_penalty_cap),
            count(Severity::Low)
                .saturating_mul(self.policy.low_penalty)
                .min(self.policy.low_penalty_cap),
        ];

        let score = penalties
            .iter()
            .fold(100u32, |remaining, penalty| remaining.saturating_sub(*penalty));
        score.min(100) as u8
    }

    /// 节省金额账本
    ///
    /// - 明细级问题：同一行累计不超过该行金额
    /// - 账单级问题：同一字段只计一次，取最大影响
    /// - 结果限定在 [0, 账单合计]
    pub fn potential_savings(&self, bill: &Bill, issues: &[Issue]) -> BigDecimal {
        let zero = BigDecimal::zero();
        let mut attributed: HashMap<usize, BigDecimal> = HashMap::new();
        let mut bill_level: HashMap<String, BigDecimal> = HashMap::new();
        let mut line_total = BigDecimal::zero();

        for issue in issues {
            let Some(impact) = issue.amount_impact.as_ref().filter(|a| **a > zero) else {
                continue;
            };

            match issue.line_index.and_then(|idx| bill.line_items.get(idx).map(|item| (idx, item))) {
                Some((idx, item)) => {
                    let ceiling = if item.total_amount > zero {
                        item.total_amount.clone()
                    } else {
                        BigDecimal::zero()
                    };
                    let already = attributed.entry(idx).or_insert_with(BigDecimal::zero);
                    let room = clamp_amount(&ceiling - &*already, &ceiling);
                    let increment = if *impact < room { impact.clone() } else { room };
                    *already += &increment;
                    line_total += increment;
                }
                None => {
                    let key = issue
                        .field
                        .clone()
                        .unwrap_or_else(|| issue.issue_type.as_str().to_string());
                    let slot = bill_level.entry(key).or_insert_with(BigDecimal::zero);
                    if impact > slot {
                        *slot = impact.clone();
                    }
                }
            }
        }

        let bill_total = bill_level
            .values()
            .fold(BigDecimal::zero(), |acc, amount| acc + amount);
        let savings = clamp_amount(line_total + bill_total, &bill.savings_ceiling());

        tracing::debug!("节省金额: {} (上限 {})", savings, bill.savings_ceiling());
        savings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IssueType;
    use crate::service::detectors::fixtures::{bill, dec, item};

    fn issue(severity: Severity) -> Issue {
        Issue::new(IssueType::MissingField, severity, "test")
    }

    #[test]
    fn test_sort_by_severity_keeps_detection_order_and_ids() {
        let policy = AuditPolicy::default();
        let bill = bill(vec![item("CBC", 1, "80")]);
        let issues = vec![
            issue(Severity::Low).field("a"),
            issue(Severity::Critical).field("b"),
            issue(Severity::Low).field("c"),
            issue(Severity::High).field("d"),
        ];
        let result = AuditAggregator::new(&policy).aggregate(&bill, issues);
        let order: Vec<(u32, &str)> = result
            .issues
            .iter()
            .map(|i| (i.id, i.field.as_deref().unwrap_or_default()))
            .collect();
        assert_eq!(order, vec![(2, "b"), (4, "d"), (1, "a"), (3, "c")]);
        assert_eq!(result.summary.total, 4);
        assert_eq!(result.summary.low, 2);
    }

    #[test]
    fn test_score_penalties_and_caps() {
        let policy = AuditPolicy::default();
        let aggregator = AuditAggregator::new(&policy);

        assert_eq!(aggregator.score(&[]), 100);
        assert_eq!(aggregator.score(&[issue(Severity::Critical), issue(Severity::High)]), 70);

        // 20 个 LOW 扣分上限 20
        let lows: Vec<Issue> = (0..20).map(|_| issue(Severity::Low)).collect();
        assert_eq!(aggregator.score(&lows), 80);

        // 10 个 MEDIUM 扣分上限 40
        let mediums: Vec<Issue> = (0..10).map(|_| issue(Severity::Medium)).collect();
        assert_eq!(aggregator.score(&mediums), 60);

        let criticals: Vec<Issue> = (0..7).map(|_| issue(Severity::Critical)).collect();
        assert_eq!(aggregator.score(&criticals), 0);
    }

    #[test]
    fn test_line_savings_never_exceed_line_total() {
        let policy = AuditPolicy::default();
        let bill = bill(vec![item("CBC", 1, "500"), item("CBC", 1, "500")]);
        let issues = vec![
            Issue::new(IssueType::DuplicateCharge, Severity::High, "dup")
                .impact(dec("500"))
                .on_line(1),
            Issue::new(IssueType::Overcharge, Severity::Critical, "over")
                .impact(dec("420"))
                .on_line(1),
        ];
        let savings = AuditAggregator::new(&policy).potential_savings(&bill, &issues);
        assert_eq!(savings, dec("500"));
    }

    #[test]
    fn test_bill_level_issues_count_once_per_field() {
        let policy = AuditPolicy::default();
        let bill = bill(vec![item("Surgery", 1, "1000")]);
        let issues = vec![
            Issue::new(IssueType::TaxMismatch, Severity::Medium, "band")
                .field("tax_amount")
                .impact(dec("30")),
            Issue::new(IssueType::TaxMismatch, Severity::Medium, "rate")
                .field("tax_amount")
                .impact(dec("70")),
            Issue::new(IssueType::ArithmeticMismatch, Severity::High, "subtotal")
                .field("subtotal")
                .impact(dec("100")),
        ];
        let savings = AuditAggregator::new(&policy).potential_savings(&bill, &issues);
        assert_eq!(savings, dec("170"));
    }

    #[test]
    fn test_savings_clamped_to_bill_total() {
        let policy = AuditPolicy::default();
        let mut bill = bill(vec![item("Room", 1, "600")]);
        bill.total_amount = Some(dec("300"));
        let issues = vec![Issue::new(IssueType::Overcharge, Severity::Critical, "over")
            .impact(dec("550"))
            .on_line(0)];
        let savings = AuditAggregator::new(&policy).potential_savings(&bill, &issues);
        assert_eq!(savings, dec("300"));
    }
}
