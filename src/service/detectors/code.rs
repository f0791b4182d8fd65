use super::IssueDetector;
use crate::models::{Bill, Issue, IssueType, MatchResult, Severity};

const MIN_CODE_LEN: usize = 2;
const MAX_CODE_LEN: usize = 12;

/// 编码格式：字母数字，允许 '.' 与 '-'
fn is_well_formed(code: &str) -> bool {
    (MIN_CODE_LEN..=MAX_CODE_LEN).contains(&code.chars().count())
        && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        && code.chars().any(|c| c.is_ascii_alphanumeric())
}

/// 编码比较：忽略大小写与分隔符
fn canonical(code: &str) -> String {
    code.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// 项目编码校验
pub struct CodeDetector;

impl IssueDetector for CodeDetector {
    fn name(&self) -> &'static str {
        "code"
    }

    fn detect(&self, bill: &Bill, matches: &[MatchResult]) -> Vec<Issue> {
        let mut issues = Vec::new();

        for (idx, item) in bill.line_items.iter().enumerate() {
            let Some(code) = item.procedure_code.as_deref().map(str::trim) else {
                continue;
            };
            if code.is_empty() {
                continue;
            }

            if !is_well_formed(code) {
                issues.push(
                    Issue::new(
                        IssueType::CodeInvalid,
                        Severity::Low,
                        format!("Procedure code '{}' on '{}' is not a valid code", code, item.description),
                    )
                    .field(format!("line_items[{}].procedure_code", idx))
                    .actual(code)
                    .on_line(idx),
                );
                continue;
            }

            let catalog_code = matches
                .iter()
                .find(|m| m.line_index == idx && m.is_matched())
                .and_then(|m| m.entry.as_ref())
                .and_then(|entry| entry.code.as_deref());

            if let Some(expected) = catalog_code {
                if canonical(expected) != canonical(code) {
                    tracing::debug!("编码不一致: 第 {} 行 {} vs 目录 {}", idx + 1, code, expected);
                    issues.push(
                        Issue::new(
                            IssueType::CodeInvalid,
                            Severity::Medium,
                            format!(
                                "Procedure code '{}' does not match '{}' for '{}'",
                                code, expected, item.description
                            ),
                        )
                        .field(format!("line_items[{}].procedure_code", idx))
                        .expected(expected)
                        .actual(code)
                        .on_line(idx),
                    );
                }
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::detectors::fixtures::{bill, item, matched, unmatched_all};

    #[test]
    fn test_code_format() {
        assert!(is_well_formed("CGHS-1234"));
        assert!(is_well_formed("85025"));
        assert!(is_well_formed("A1.2"));
        assert!(!is_well_formed("X"));
        assert!(!is_well_formed("CODE WITH SPACE"));
        assert!(!is_well_formed("ABCDEFGHIJKLM"));
        assert!(!is_well_formed("--"));
    }

    #[test]
    fn test_malformed_code_is_low() {
        let bill = bill(vec![item("CBC", 1, "80").with_code("#??"), item("ECG", 1, "100")]);
        let issues = CodeDetector.detect(&bill, &unmatched_all(&bill));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Low);
        assert_eq!(issues[0].line_index, Some(0));
    }

    #[test]
    fn test_code_conflicting_with_catalog() {
        let bill = bill(vec![
            item("CBC", 1, "80").with_code("lab-101"),
            item("ECG", 1, "100").with_code("LAB-999"),
        ]);
        let mut first = matched(0, "complete blood count", "80");
        first.entry = first.entry.map(|e| e.with_code("LAB101"));
        let mut second = matched(1, "electrocardiogram", "100");
        second.entry = second.entry.map(|e| e.with_code("LAB-200"));

        let issues = CodeDetector.detect(&bill, &[first, second]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Medium);
        assert_eq!(issues[0].expected_value.as_deref(), Some("LAB-200"));
        assert_eq!(issues[0].line_index, Some(1));
    }
}
