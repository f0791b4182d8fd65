use super::IssueDetector;
use crate::config::AuditPolicy;
use crate::models::money::{clamp_amount, decimal_from_f64, format_amount, to_f64};
use crate::models::{city_multiplier, Bill, Issue, IssueType, MatchResult, Severity};
use bigdecimal::{BigDecimal, Zero};

/// 低于该倍数的超收 (仅在调低阈值时出现) 记为 LOW
const OVERCHARGE_MEDIUM_RATIO: f64 = 1.5;

/// 超收检测：实收单价 vs 基准价 (已按医院类型与城市调整)
pub struct OverchargeDetector {
    match_threshold: f64,
    flag_multiplier: f64,
    high_multiplier: f64,
    critical_multiplier: f64,
}

impl OverchargeDetector {
    pub fn new(policy: &AuditPolicy) -> Self {
        Self {
            match_threshold: policy.match_threshold,
            flag_multiplier: policy.overcharge_multiplier,
            high_multiplier: policy.high_multiplier,
            critical_multiplier: policy.critical_multiplier,
        }
    }

    fn severity(&self, ratio: f64) -> Severity {
        if ratio >= self.critical_multiplier {
            Severity::Critical
        } else if ratio >= self.high_multiplier {
            Severity::High
        } else if ratio >= OVERCHARGE_MEDIUM_RATIO {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// 医院类型 × 城市层级，十进制相乘避免浮点误差
fn facility_factor(bill: &Bill) -> BigDecimal {
    let hospital = bill.hospital_type.map(|h| h.multiplier()).unwrap_or(1.0);
    decimal_from_f64(hospital) * decimal_from_f64(city_multiplier(bill.city.as_deref()))
}

impl IssueDetector for OverchargeDetector {
    fn name(&self) -> &'static str {
        "overcharge"
    }

    fn detect(&self, bill: &Bill, matches: &[MatchResult]) -> Vec<Issue> {
        let mut issues = Vec::new();
        let zero = BigDecimal::zero();
        let factor = facility_factor(bill);

        for result in matches {
            if !result.is_matched() || result.confidence < self.match_threshold {
                continue;
            }
            let Some(entry) = &result.entry else {
                continue;
            };
            let Some(item) = bill.line_items.get(result.line_index) else {
                continue;
            };
            if !item.is_evaluable() {
                continue;
            }
            let Some((source, rate)) = entry.benchmark() else {
                continue;
            };

            let benchmark = rate * &factor;
            if benchmark <= zero {
                tracing::debug!("基准价为 0，跳过 '{}'", item.description);
                continue;
            }

            let charged = item.charged_per_unit();
            let ratio = to_f64(&charged) / to_f64(&benchmark);
            if ratio <= self.flag_multiplier {
                continue;
            }

            let excess = (&charged - &benchmark) * BigDecimal::from(item.quantity);
            let impact = clamp_amount(excess, &item.total_amount);
            let severity = self.severity(ratio);

            tracing::debug!(
                "超收: '{}' -> '{}' 实收 {} 基准 {} ({:.2}x, {})",
                item.description, entry.normalized_name, charged, benchmark, ratio, severity
            );

            issues.push(
                Issue::new(
                    IssueType::Overcharge,
                    severity,
                    format!(
                        "'{}' charged at {} per unit, {:.1}x the {} of {} for '{}'",
                        item.description,
                        format_amount(bill.resolved_region(), &charged),
                        ratio,
                        source.label(),
                        format_amount(bill.resolved_region(), &benchmark),
                        entry.normalized_name
                    ),
                )
                .field(format!("line_items[{}]", result.line_index))
                .expected(benchmark.with_scale(2).to_string())
                .actual(charged.with_scale(2).to_string())
                .impact(impact)
                .on_line(result.line_index),
            );
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CatalogEntry, HospitalType};
    use crate::service::detectors::fixtures::{bill, dec, item, matched, unmatched_all};

    fn detect(bill: &Bill, matches: &[MatchResult]) -> Vec<Issue> {
        OverchargeDetector::new(&AuditPolicy::default()).detect(bill, matches)
    }

    #[test]
    fn test_renal_function_overcharge_is_critical() {
        let bill = bill(vec![item("Renal Function Test", 1, "990")]);
        let issues = detect(&bill, &[matched(0, "renal function test", "250")]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert_eq!(issues[0].amount_impact, Some(dec("740")));
        assert_eq!(issues[0].expected_value.as_deref(), Some("250.00"));
    }

    #[test]
    fn test_within_multiplier_is_not_flagged() {
        let bill = bill(vec![item("CBC", 1, "120")]);
        assert!(detect(&bill, &[matched(0, "complete blood count", "80")]).is_empty());
    }

    #[test]
    fn test_unmatched_items_are_skipped() {
        let bill = bill(vec![item("Deluxe Suite", 1, "99999")]);
        assert!(detect(&bill, &unmatched_all(&bill)).is_empty());
    }

    #[test]
    fn test_severity_tiers() {
        let bill = bill(vec![item("A", 1, "210"), item("B", 1, "160")]);
        let issues = detect(&bill, &[matched(0, "a", "100"), matched(1, "b", "100")]);
        assert_eq!(issues[0].severity, Severity::High);
        assert_eq!(issues[1].severity, Severity::Medium);
        assert_eq!(issues[1].amount_impact, Some(dec("60")));
    }

    #[test]
    fn test_quantity_and_total_fallback() {
        let mut line = item("Ward Nursing", 3, "0");
        line.total_amount = dec("1200");
        let bill = bill(vec![line]);
        let issues = detect(&bill, &[matched(0, "ward nursing", "100")]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert_eq!(issues[0].amount_impact, Some(dec("900")));
    }

    #[test]
    fn test_facility_multiplier_raises_benchmark() {
        let mut bill = bill(vec![item("MRI Brain", 1, "12000")]);
        bill.hospital_type = Some(HospitalType::Private);
        bill.city = Some("Mumbai".to_string());
        // 3000 × 2.0 × 1.5 = 9000
        let result = MatchResult {
            line_index: 0,
            entry: Some(CatalogEntry::new("mri brain", "imaging").with_government_rate(dec("3000"))),
            confidence: 0.9,
        };
        assert!(detect(&bill, &[result]).is_empty());
    }

    #[test]
    fn test_market_median_fallback_and_low_confidence() {
        let bill = bill(vec![item("Private Room", 1, "9000")]);
        let entry = CatalogEntry::new("private room", "room")
            .with_market_range(dec("2000"), dec("3000"), dec("5000"));
        let result = MatchResult { line_index: 0, entry: Some(entry.clone()), confidence: 0.8 };
        let issues = detect(&bill, &[result]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].amount_impact, Some(dec("6000")));

        let weak = MatchResult { line_index: 0, entry: Some(entry), confidence: 0.4 };
        assert!(detect(&bill, &[weak]).is_empty());
    }
}
