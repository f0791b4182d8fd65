use super::IssueDetector;
use crate::config::AuditPolicy;
use crate::models::{Bill, Issue, IssueType, MatchResult, Severity};
use bigdecimal::{BigDecimal, Zero};

/// 输入校验：缺失或非法字段转为 MISSING_FIELD，而非报错
pub struct ValidationDetector {
    required_fields: Vec<String>,
    max_quantity: i64,
}

impl ValidationDetector {
    pub fn new(policy: &AuditPolicy) -> Self {
        Self {
            required_fields: policy.required_fields.clone(),
            max_quantity: policy.max_expected_quantity,
        }
    }

    fn metadata_value<'b>(bill: &'b Bill, field: &str) -> Option<Option<&'b str>> {
        let value = match field {
            "invoice_number" => bill.invoice_number.as_deref(),
            "patient_name" => bill.patient_name.as_deref(),
            "bill_date" => bill.bill_date.as_deref(),
            _ => return None,
        };
        Some(value)
    }
}

fn missing(field: impl Into<String>, severity: Severity, description: impl Into<String>) -> Issue {
    Issue::new(IssueType::MissingField, severity, description).field(field)
}

/// "line_items[3].total_amount" → 3
fn line_index_of(field: &str) -> Option<usize> {
    let rest = field.strip_prefix("line_items[")?;
    rest[..rest.find(']')?].parse().ok()
}

impl IssueDetector for ValidationDetector {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn detect(&self, bill: &Bill, _matches: &[MatchResult]) -> Vec<Issue> {
        let mut issues = Vec::new();
        let zero = BigDecimal::zero();

        // 0. 越界金额 (已在审计前清理)
        for field in bill.out_of_range_fields() {
            let mut issue = missing(
                field.clone(),
                Severity::Low,
                format!("Amount in '{}' is out of the supported range and was ignored", field),
            );
            if let Some(idx) = line_index_of(field) {
                issue = issue.on_line(idx);
            }
            issues.push(issue);
        }
        let cleared = |field: &str| bill.out_of_range_fields().iter().any(|f| f == field);

        // 1. 账单级字段
        if bill.total_amount.is_none() && !cleared("total_amount") {
            issues.push(missing(
                "total_amount",
                Severity::Medium,
                "Required field 'total_amount' is missing; bill total could not be verified",
            ));
        }
        if bill.line_items.is_empty() {
            issues.push(missing(
                "line_items",
                Severity::Medium,
                "Bill has no line items; charges could not be audited",
            ));
        }
        if bill.subtotal.as_ref().map_or(false, |s| *s < zero) {
            issues.push(
                missing("subtotal", Severity::Medium, "Subtotal is negative and cannot be evaluated")
                    .actual(bill.subtotal.as_ref().map(|s| s.to_string()).unwrap_or_default()),
            );
        }
        if bill.tax_amount.as_ref().map_or(false, |t| *t < zero) {
            issues.push(
                missing("tax_amount", Severity::Medium, "Tax amount is negative and cannot be evaluated")
                    .actual(bill.tax_amount.as_ref().map(|t| t.to_string()).unwrap_or_default()),
            );
        }

        // 2. 可配置的元数据必填项
        for field in &self.required_fields {
            match Self::metadata_value(bill, field) {
                Some(value) if value.map_or(true, |v| v.trim().is_empty()) => {
                    issues.push(missing(
                        field.clone(),
                        Severity::Medium,
                        format!("Required field '{}' is missing or empty", field),
                    ));
                }
                Some(_) => {}
                None => tracing::warn!("Unknown required field '{}' in audit policy, ignored", field),
            }
        }

        // 3. 明细行
        for (idx, item) in bill.line_items.iter().enumerate() {
            if item.description.trim().is_empty() {
                issues.push(
                    missing(
                        format!("line_items[{}].description", idx),
                        Severity::Low,
                        format!("Line item {} has no description; it could not be matched to a procedure", idx + 1),
                    )
                    .on_line(idx),
                );
            }
            if item.quantity < 1 {
                issues.push(
                    missing(
                        format!("line_items[{}].quantity", idx),
                        Severity::Low,
                        format!("Invalid quantity ({}) for '{}'", item.quantity, item.description),
                    )
                    .expected(">=1")
                    .actual(item.quantity.to_string())
                    .on_line(idx),
                );
            } else if item.quantity > self.max_quantity {
                issues.push(
                    missing(
                        format!("line_items[{}].quantity", idx),
                        Severity::Low,
                        format!(
                            "Unusually high quantity ({}) for '{}'; verify this is correct",
                            item.quantity, item.description
                        ),
                    )
                    .expected(format!("1-{}", self.max_quantity))
                    .actual(item.quantity.to_string())
                    .on_line(idx),
                );
            }
            if item.unit_amount < zero {
                issues.push(
                    missing(
                        format!("line_items[{}].unit_amount", idx),
                        Severity::Low,
                        format!("Negative unit amount for '{}'", item.description),
                    )
                    .actual(item.unit_amount.to_string())
                    .on_line(idx),
                );
            }
            if item.total_amount < zero {
                issues.push(
                    missing(
                        format!("line_items[{}].total_amount", idx),
                        Severity::Low,
                        format!("Negative total amount for '{}'", item.description),
                    )
                    .actual(item.total_amount.to_string())
                    .on_line(idx),
                );
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::detectors::fixtures::{bill, dec, item, unmatched_all};

    #[test]
    fn test_clean_bill_has_no_gaps() {
        let bill = bill(vec![item("CBC", 1, "80")]);
        let detector = ValidationDetector::new(&AuditPolicy::default());
        assert!(detector.detect(&bill, &unmatched_all(&bill)).is_empty());
    }

    #[test]
    fn test_missing_total_and_malformed_items() {
        let mut bill = bill(vec![item("CBC", 0, "80"), item("", 1, "-5")]);
        bill.total_amount = None;
        bill.subtotal = Some(dec("0"));
        let detector = ValidationDetector::new(&AuditPolicy::default());
        let issues = detector.detect(&bill, &unmatched_all(&bill));

        let fields: Vec<&str> = issues.iter().filter_map(|i| i.field.as_deref()).collect();
        assert_eq!(
            fields,
            vec![
                "total_amount",
                "line_items[0].quantity",
                "line_items[1].description",
                "line_items[1].unit_amount",
                "line_items[1].total_amount",
            ]
        );
        assert!(issues.iter().all(|i| i.issue_type == IssueType::MissingField));
        assert!(issues.iter().all(|i| i.amount_impact.is_none()));
    }

    #[test]
    fn test_required_metadata_fields() {
        let mut bill = bill(vec![item("CBC", 1, "80")]);
        bill.patient_name = Some("  ".to_string());
        bill.invoice_number = Some("INV-42".to_string());
        let policy = AuditPolicy {
            required_fields: vec!["invoice_number".into(), "patient_name".into(), "bill_date".into()],
            ..AuditPolicy::default()
        };
        let issues = ValidationDetector::new(&policy).detect(&bill, &unmatched_all(&bill));
        let fields: Vec<&str> = issues.iter().filter_map(|i| i.field.as_deref()).collect();
        assert_eq!(fields, vec!["patient_name", "bill_date"]);
    }

    #[test]
    fn test_unusually_high_quantity_is_low() {
        let bill = bill(vec![item("CBC", 500, "80"), item("Saline", 10, "50")]);
        let issues = ValidationDetector::new(&AuditPolicy::default()).detect(&bill, &unmatched_all(&bill));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Low);
        assert_eq!(issues[0].field.as_deref(), Some("line_items[0].quantity"));
        assert_eq!(issues[0].expected_value.as_deref(), Some("1-10"));
        assert_eq!(issues[0].actual_value.as_deref(), Some("500"));
    }

    #[test]
    fn test_out_of_range_amounts_are_reported_once() {
        let mut raw = bill(vec![item("CBC", 1, "80")]);
        raw.total_amount = Some(dec("1e400000000"));
        raw.line_items[0].unit_amount = dec("-1e400000000");
        let screened = raw.screened();
        let issues = ValidationDetector::new(&AuditPolicy::default()).detect(&screened, &unmatched_all(&screened));

        let fields: Vec<&str> = issues.iter().filter_map(|i| i.field.as_deref()).collect();
        assert_eq!(fields, vec!["total_amount", "line_items[0].unit_amount"]);
        assert!(issues.iter().all(|i| i.severity == Severity::Low));
        assert_eq!(issues[1].line_index, Some(0));
    }

    #[test]
    fn test_line_index_of() {
        assert_eq!(line_index_of("line_items[12].total_amount"), Some(12));
        assert_eq!(line_index_of("subtotal"), None);
    }

    #[test]
    fn test_negative_tax_is_flagged() {
        let mut bill = bill(vec![item("CBC", 1, "80")]);
        bill.tax_amount = Some(dec("-10"));
        let issues = ValidationDetector::new(&AuditPolicy::default()).detect(&bill, &unmatched_all(&bill));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field.as_deref(), Some("tax_amount"));
    }
}
