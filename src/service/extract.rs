use crate::config::ExtractorKind;
use crate::models::money::is_sane_amount;
use crate::models::Bill;
use bigdecimal::BigDecimal;
use serde_json::Value;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("document is empty")]
    Empty,
    #[error("malformed bill document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("field '{field}' has unreadable amount '{value}'")]
    InvalidAmount { field: String, value: String },
}

/// 账单抽取能力 (OCR / 版面解析由上游完成)
pub trait TextExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, document: &[u8]) -> Result<Bill, ExtractionError>;
}

pub fn build_extractor(kind: ExtractorKind) -> Box<dyn TextExtractor> {
    match kind {
        ExtractorKind::Json => Box::new(JsonBillExtractor),
    }
}

const BILL_AMOUNT_FIELDS: &[&str] = &["subtotal", "tax_amount", "total_amount", "discount", "insurance_paid"];
const LINE_AMOUNT_FIELDS: &[&str] = &["unit_amount", "total_amount"];
const CURRENCY_MARKERS: &[&str] = &["₹", "$", "rs.", "rs", "inr", "usd"];

/// 解析金额文本："₹1,200.50"、"Rs. 990"、"$12.00 USD"
pub fn parse_amount(text: &str) -> Option<BigDecimal> {
    let mut cleaned = text.trim().to_lowercase();
    for marker in CURRENCY_MARKERS {
        cleaned = cleaned.replace(marker, "");
    }
    let cleaned: String = cleaned.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return None;
    }
    BigDecimal::from_str(&cleaned).ok()
}

/// 上游结构化 JSON 抽取器：容忍字符串形式的金额
pub struct JsonBillExtractor;

impl JsonBillExtractor {
    fn normalize_amount(object: &mut serde_json::Map<String, Value>, field: &str, path: &str) -> Result<(), ExtractionError> {
        let Some(Value::String(text)) = object.get(field) else {
            return Ok(());
        };
        if text.trim().is_empty() {
            object.insert(field.to_string(), Value::Null);
            return Ok(());
        }
        // 越界金额无法安全展开为文本，按不可读处理
        let amount = parse_amount(text).filter(is_sane_amount).ok_or_else(|| ExtractionError::InvalidAmount {
            field: path.to_string(),
            value: text.clone(),
        })?;
        object.insert(field.to_string(), Value::String(amount.to_string()));
        Ok(())
    }

    fn normalize(mut document: Value) -> Result<Value, ExtractionError> {
        // 兼容 {"bill": {...}} 包装
        if let Some(inner) = document.get_mut("bill").map(Value::take) {
            document = inner;
        }

        if let Some(object) = document.as_object_mut() {
            for field in BILL_AMOUNT_FIELDS {
                Self::normalize_amount(object, field, field)?;
            }
            if let Some(Value::Array(items)) = object.get_mut("line_items") {
                for (idx, item) in items.iter_mut().enumerate() {
                    if let Some(item) = item.as_object_mut() {
                        for field in LINE_AMOUNT_FIELDS {
                            Self::normalize_amount(item, field, &format!("line_items[{}].{}", idx, field))?;
                        }
                    }
                }
            }
        }
        Ok(document)
    }
}

impl TextExtractor for JsonBillExtractor {
    fn name(&self) -> &'static str {
        "json"
    }

    fn extract(&self, document: &[u8]) -> Result<Bill, ExtractionError> {
        if document.iter().all(u8::is_ascii_whitespace) {
            return Err(ExtractionError::Empty);
        }

        let raw: Value = serde_json::from_slice(document)?;
        let bill: Bill = serde_json::from_value(Self::normalize(raw)?)?;
        tracing::debug!("抽取账单: {} 条明细, 区域 {:?}", bill.line_items.len(), bill.region);
        Ok(bill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Region;

    #[test]
    fn test_parse_amount_variants() {
        assert_eq!(parse_amount("₹1,200.50"), Some(BigDecimal::from_str("1200.50").unwrap()));
        assert_eq!(parse_amount("Rs. 990"), Some(BigDecimal::from(990)));
        assert_eq!(parse_amount("$12.00 USD"), Some(BigDecimal::from(12)));
        assert_eq!(parse_amount("n/a"), None);
        assert_eq!(parse_amount("  "), None);
    }

    #[test]
    fn test_extracts_wrapped_bill_with_string_amounts() {
        let doc = r#"{
            "bill": {
                "region": "IN",
                "line_items": [
                    {"description": "Renal Function Test", "quantity": 1, "unit_amount": "Rs 990", "total_amount": "₹990.00"}
                ],
                "subtotal": "990",
                "tax_amount": "",
                "total_amount": "₹ 990.00"
            }
        }"#;
        let bill = JsonBillExtractor.extract(doc.as_bytes()).unwrap();
        assert_eq!(bill.region, Some(Region::India));
        assert_eq!(bill.line_items[0].total_amount, BigDecimal::from(990));
        assert!(bill.tax_amount.is_none());
        assert_eq!(bill.total_amount, Some(BigDecimal::from(990)));
    }

    #[test]
    fn test_extraction_errors() {
        assert!(matches!(JsonBillExtractor.extract(b"  \n"), Err(ExtractionError::Empty)));
        assert!(matches!(JsonBillExtractor.extract(b"{not json"), Err(ExtractionError::Json(_))));

        let doc = br#"{"line_items": [{"description": "X", "total_amount": "abc"}]}"#;
        match build_extractor(ExtractorKind::Json).extract(doc) {
            Err(ExtractionError::InvalidAmount { field, .. }) => assert_eq!(field, "line_items[0].total_amount"),
            other => panic!("unexpected: {:?}", other),
        }

        let doc = r#"{"line_items": [{"description": "CBC", "total_amount": "Rs 1e400000000"}]}"#;
        assert!(matches!(
            JsonBillExtractor.extract(doc.as_bytes()),
            Err(ExtractionError::InvalidAmount { .. })
        ));
    }
}
