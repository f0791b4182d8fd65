use crate::models::money::format_amount;
use crate::models::{AuditResult, Severity};
use std::fmt::Write as _;
use std::io;

/// 文本摘要
pub fn render_summary(result: &AuditResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Audit score: {}/100", result.score);
    let _ = writeln!(
        out,
        "Potential savings: {}",
        format_amount(result.region, &result.potential_savings)
    );

    if result.is_clean() {
        out.push_str("No issues found.\n");
        return out;
    }

    let counts: Vec<String> = Severity::ALL
        .iter()
        .map(|s| {
            let n = result.issues.iter().filter(|i| i.severity == *s).count();
            (s, n)
        })
        .filter(|(_, n)| *n > 0)
        .map(|(s, n)| format!("{} {}", n, s))
        .collect();
    let _ = writeln!(out, "Issues: {} ({})", result.summary.total, counts.join(", "));

    for issue in &result.issues {
        let _ = write!(out, "  #{} [{}] {}: {}", issue.id, issue.severity, issue.issue_type, issue.description);
        if let Some(amount) = &issue.amount_impact {
            let _ = write!(out, " ({})", format_amount(result.region, amount));
        }
        out.push('\n');
    }
    out
}

/// 问题清单导出为 CSV
pub fn write_issues_csv<W: io::Write>(result: &AuditResult, writer: W) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record([
        "id",
        "type",
        "severity",
        "line_index",
        "field",
        "expected_value",
        "actual_value",
        "amount_impact",
        "description",
    ])?;

    for issue in &result.issues {
        wtr.write_record([
            issue.id.to_string(),
            issue.issue_type.to_string(),
            issue.severity.to_string(),
            issue.line_index.map(|i| i.to_string()).unwrap_or_default(),
            issue.field.clone().unwrap_or_default(),
            issue.expected_value.clone().unwrap_or_default(),
            issue.actual_value.clone().unwrap_or_default(),
            issue
                .amount_impact
                .as_ref()
                .map(|a| a.with_scale(2).to_string())
                .unwrap_or_default(),
            issue.description.clone(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
