use bigdecimal::BigDecimal;
use bill_audit_engine::models::HospitalType;
use bill_audit_engine::{
    audit, AuditEngine, AuditError, AuditPolicy, Bill, Catalog, CatalogEntry, CatalogHandle, IssueType, LineItem,
    Region, Severity,
};
use std::str::FromStr;

fn dec(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

fn item(description: &str, quantity: i64, unit: &str) -> LineItem {
    LineItem::new(description, quantity, dec(unit))
}

fn builtin() -> Catalog {
    Catalog::builtin().unwrap()
}

fn count(result: &bill_audit_engine::AuditResult, issue_type: IssueType) -> usize {
    result.issues.iter().filter(|i| i.issue_type == issue_type).count()
}

#[test]
fn test_clean_bill_scores_100() {
    let bill = Bill::from_items(
        Region::India,
        vec![
            item("Complete Blood Count", 1, "80"),
            item("ECG", 1, "100"),
            item("Lipid Profile", 1, "200"),
        ],
    );
    let result = audit(&bill, &builtin()).unwrap();
    assert!(result.is_clean(), "unexpected issues: {:?}", result.issues);
    assert_eq!(result.score, 100);
    assert_eq!(result.potential_savings, BigDecimal::from(0));
    assert_eq!(result.summary.total, 0);
}

#[test]
fn test_duplicate_cbc_lines() {
    let bill = Bill::from_items(Region::India, vec![item("CBC Test", 1, "500"), item("CBC Test", 1, "500")]);
    let result = audit(&bill, &builtin()).unwrap();

    let duplicates: Vec<_> = result
        .issues
        .iter()
        .filter(|i| i.issue_type == IssueType::DuplicateCharge)
        .collect();
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0].amount_impact, Some(dec("500")));

    // 第二行：重复 500 + 超收 420，合计不超过该行 500
    assert_eq!(result.potential_savings, dec("920"));
}

#[test]
fn test_renal_function_overcharge() {
    let bill = Bill::from_items(Region::India, vec![item("Renal Function Test", 1, "990")]);
    let result = audit(&bill, &builtin()).unwrap();

    assert_eq!(result.issues.len(), 1);
    let issue = &result.issues[0];
    assert_eq!(issue.issue_type, IssueType::Overcharge);
    assert_eq!(issue.severity, Severity::Critical);
    assert_eq!(issue.amount_impact, Some(dec("740")));
    assert_eq!(issue.id, 1);
    assert_eq!(result.score, 80);
    assert_eq!(result.potential_savings, dec("740"));
}

#[test]
fn test_alias_matches_overcharge() {
    let bill = Bill::from_items(Region::India, vec![item("KFT", 1, "990")]);
    let result = audit(&bill, &builtin()).unwrap();
    assert_eq!(count(&result, IssueType::Overcharge), 1);
}

#[test]
fn test_subtotal_mismatch() {
    let mut bill = Bill::from_items(Region::India, vec![item("Pharmacy", 1, "600"), item("Consumables", 1, "350")]);
    bill.subtotal = Some(dec("850.00"));
    bill.total_amount = Some(dec("850.00"));
    let result = audit(&bill, &builtin()).unwrap();

    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].issue_type, IssueType::ArithmeticMismatch);
    assert_eq!(result.issues[0].amount_impact, Some(dec("100.00")));
}

#[test]
fn test_unmatched_procedure_is_not_overcharge() {
    let bill = Bill::from_items(Region::India, vec![item("Deluxe Suite Upgrade", 1, "99999")]);
    let result = audit(&bill, &builtin()).unwrap();
    assert_eq!(count(&result, IssueType::Overcharge), 0);
    assert!(result.is_clean());
}

#[test]
fn test_india_tax_above_band() {
    let mut bill = Bill::from_items(Region::India, vec![item("Cataract Surgery", 1, "15000")]);
    bill.tax_amount = Some(dec("2700"));
    bill.total_amount = Some(dec("17700"));
    let result = audit(&bill, &builtin()).unwrap();

    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].issue_type, IssueType::TaxMismatch);
    // 15000 的 3%
    assert_eq!(result.issues[0].amount_impact, Some(dec("450")));
}

#[test]
fn test_score_and_savings_bounds() {
    let mut bill = Bill::from_items(
        Region::India,
        vec![
            item("ICU per day", 1, "90000"),
            item("ICU per day", 1, "90000"),
            item("MRI Brain", 1, "30000"),
            item("", 0, "-5"),
            item("CT Scan Head", 2, "9000").with_code("??"),
        ],
    );
    bill.subtotal = Some(dec("1000"));
    bill.tax_amount = Some(dec("50000"));
    bill.total_amount = Some(dec("5000"));
    let result = audit(&bill, &builtin()).unwrap();

    assert!(result.score <= 100);
    assert!(result.potential_savings >= BigDecimal::from(0));
    assert!(result.potential_savings <= dec("5000"));
    assert_eq!(result.summary.total, result.issues.len());

    let ranks: Vec<u8> = result.issues.iter().map(|i| i.severity.rank()).collect();
    let mut sorted = ranks.clone();
    sorted.sort();
    assert_eq!(ranks, sorted);
}

#[test]
fn test_identical_inputs_give_identical_results() {
    let mut bill = Bill::from_items(
        Region::India,
        vec![item("CBC", 1, "500"), item("CBC", 1, "500"), item("Renal Function Test", 1, "990")],
    );
    bill.hospital_type = Some(HospitalType::Private);
    let catalog = builtin();
    let engine = AuditEngine::new(AuditPolicy::default());
    assert_eq!(engine.audit(&bill, &catalog).unwrap(), engine.audit(&bill, &catalog).unwrap());
}

#[test]
fn test_empty_catalog_is_hard_error() {
    let bill = Bill::from_items(Region::India, vec![item("CBC", 1, "80")]);
    assert!(matches!(audit(&bill, &Catalog::empty()), Err(AuditError::CatalogUnavailable)));
}

#[test]
fn test_catalog_reload_keeps_old_snapshot() {
    let handle = CatalogHandle::new(builtin());
    let before = handle.snapshot();
    let generation = handle.replace(
        Catalog::from_entries(vec![
            CatalogEntry::new("renal function test", "laboratory").with_government_rate(dec("900")),
        ])
        .unwrap(),
    );
    assert_eq!(generation, 2);

    let bill = Bill::from_items(Region::India, vec![item("Renal Function Test", 1, "990")]);
    let old = audit(&bill, &before).unwrap();
    let new = audit(&bill, &handle.snapshot()).unwrap();
    assert_eq!(count(&old, IssueType::Overcharge), 1);
    assert_eq!(count(&new, IssueType::Overcharge), 0);
    assert_eq!(before.len(), builtin().len());
}

#[test]
fn test_private_metro_hospital_raises_benchmark() {
    let mut bill = Bill::from_items(Region::India, vec![item("Renal Function Test", 1, "990")]);
    bill.hospital_type = Some(HospitalType::Private);
    bill.city = Some("Bengaluru".to_string());
    // 250 × 2.0 × 1.5 = 750，990/750 < 1.5
    let result = audit(&bill, &builtin()).unwrap();
    assert!(result.is_clean());
}

#[test]
fn test_us_bill_with_tax() {
    let mut bill = Bill::from_items(Region::Us, vec![item("Office Visit", 1, "200")]);
    bill.tax_amount = Some(dec("16"));
    bill.total_amount = Some(dec("216"));
    let result = audit(&bill, &builtin()).unwrap();
    assert_eq!(count(&result, IssueType::TaxMismatch), 1);
    assert_eq!(result.potential_savings, dec("16"));
}

#[test]
fn test_generic_consultation_resolves_to_first_catalog_entry() {
    // "consultation" 同时是 OPD 与专科会诊的子集，并列时取目录靠前的 OPD (300)
    let bill = Bill::from_items(Region::India, vec![item("Consultation Fee", 1, "500")]);
    let result = audit(&bill, &builtin()).unwrap();

    assert_eq!(result.issues.len(), 1);
    let issue = &result.issues[0];
    assert_eq!(issue.issue_type, IssueType::Overcharge);
    assert_eq!(issue.severity, Severity::Medium);
    assert_eq!(issue.expected_value.as_deref(), Some("300.00"));
    assert_eq!(issue.amount_impact, Some(dec("200")));

    let specialist = Bill::from_items(Region::India, vec![item("Specialist Consultation", 1, "500")]);
    assert!(audit(&specialist, &builtin()).unwrap().is_clean());
}

#[test]
fn test_unusually_high_quantity_is_flagged() {
    let bill = Bill::from_items(Region::India, vec![item("CBC", 500, "80")]);
    let result = audit(&bill, &builtin()).unwrap();
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].issue_type, IssueType::MissingField);
    assert_eq!(result.issues[0].severity, Severity::Low);
    assert_eq!(result.issues[0].expected_value.as_deref(), Some("1-10"));
    assert_eq!(result.score, 98);
}

#[test]
fn test_region_inferred_when_absent() {
    let mut bill = Bill::from_items(Region::India, vec![item("Office Visit", 1, "200")]);
    bill.region = None;
    bill.currency = Some("INR".to_string());
    bill.tax_amount = Some(dec("16"));
    bill.total_amount = Some(dec("216"));
    // 8% 在印度区间内
    let result = audit(&bill, &builtin()).unwrap();
    assert_eq!(result.region, Region::India);
    assert_eq!(count(&result, IssueType::TaxMismatch), 0);

    bill.currency = Some("USD".to_string());
    let result = audit(&bill, &builtin()).unwrap();
    assert_eq!(result.region, Region::Us);
    assert_eq!(count(&result, IssueType::TaxMismatch), 1);
}
