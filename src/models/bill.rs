use crate::models::money::is_sane_amount;
use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Cow;

/// 市场区域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    #[serde(alias = "IN", alias = "india")]
    India,
    #[serde(alias = "USA", alias = "us")]
    Us,
}

impl Region {
    pub fn currency_symbol(&self) -> &'static str {
        match self {
            Region::India => "₹",
            Region::Us => "$",
        }
    }
}

/// 医院类型 (用于基准价调整)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HospitalType {
    Government,
    CghsEmpaneled,
    Private,
    Corporate,
    NabhAccredited,
}

pub const GOVERNMENT_HOSPITAL_MULTIPLIER: f64 = 1.0;
pub const CGHS_EMPANELED_HOSPITAL_MULTIPLIER: f64 = 1.2;
pub const PRIVATE_HOSPITAL_MULTIPLIER: f64 = 2.0;
pub const NABH_HOSPITAL_MULTIPLIER: f64 = 2.5;
pub const CORPORATE_HOSPITAL_MULTIPLIER: f64 = 3.0;
pub const METRO_CITY_MULTIPLIER: f64 = 1.5;

const METRO_CITIES: &[&str] = &[
    "delhi", "new delhi", "mumbai", "bombay", "bangalore", "bengaluru",
    "chennai", "madras", "kolkata", "calcutta", "hyderabad", "pune",
    "ahmedabad", "gurgaon", "gurugram", "noida", "ghaziabad",
];

impl HospitalType {
    /// 宽松解析抽取结果中的医院类型，无法识别时返回 None
    pub fn parse(value: &str) -> Option<Self> {
        let key = value.trim().to_lowercase().replace([' ', '-'], "_");
        match key.as_str() {
            "government" | "govt" | "gov" | "public" => Some(HospitalType::Government),
            "cghs" | "cghs_empaneled" | "cghs_empanelled" | "empaneled" | "ayushman" | "pmjay" => {
                Some(HospitalType::CghsEmpaneled)
            }
            "private" => Some(HospitalType::Private),
            "corporate" | "chain" => Some(HospitalType::Corporate),
            "nabh" | "nabh_accredited" | "accredited" => Some(HospitalType::NabhAccredited),
            _ => None,
        }
    }

    /// 相对 CGHS 费率的倍数
    pub fn multiplier(&self) -> f64 {
        match self {
            HospitalType::Government => GOVERNMENT_HOSPITAL_MULTIPLIER,
            HospitalType::CghsEmpaneled => CGHS_EMPANELED_HOSPITAL_MULTIPLIER,
            HospitalType::Private => PRIVATE_HOSPITAL_MULTIPLIER,
            HospitalType::Corporate => CORPORATE_HOSPITAL_MULTIPLIER,
            HospitalType::NabhAccredited => NABH_HOSPITAL_MULTIPLIER,
        }
    }
}

/// 用于推断区域的印度城市 (含全部一线城市)
const INDIAN_CITIES: &[&str] = &[
    "jaipur", "lucknow", "surat", "kanpur", "nagpur", "indore", "thane",
    "bhopal", "patna", "chandigarh",
];

/// 常见 GST 税率
const GST_RATES: &[f64] = &[0.05, 0.12, 0.18, 0.28];

/// 无其他线索时，超过该合计视为卢比账单
const INR_TOTAL_HINT: i64 = 50_000;

fn is_indian_city(city: &str) -> bool {
    let city = city.trim().to_lowercase();
    METRO_CITIES.contains(&city.as_str()) || INDIAN_CITIES.contains(&city.as_str())
}

/// 5 位纯数字编码视为 CPT
fn is_cpt_code(code: &str) -> bool {
    let code = code.trim();
    code.len() == 5 && code.bytes().all(|b| b.is_ascii_digit())
}

/// 未知医院类型不拒绝整张账单，记录后按未知处理
fn lenient_hospital_type<'de, D>(deserializer: D) -> Result<Option<HospitalType>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(text)) if text.trim().is_empty() => None,
        Some(serde_json::Value::String(text)) => {
            let parsed = HospitalType::parse(&text);
            if parsed.is_none() {
                tracing::warn!("无法识别的医院类型 '{}'，按未知处理", text);
            }
            parsed
        }
        Some(other) => {
            tracing::warn!("医院类型字段格式错误 ({})，按未知处理", other);
            None
        }
    })
}

/// 城市层级倍数：仅一线大都市上浮
pub fn city_multiplier(city: Option<&str>) -> f64 {
    match city {
        Some(c) if METRO_CITIES.contains(&c.trim().to_lowercase().as_str()) => METRO_CITY_MULTIPLIER,
        _ => 1.0,
    }
}

fn default_quantity() -> i64 {
    1
}

/// 账单明细行 (来自外部 OCR/LLM 抽取)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default)]
    pub unit_amount: BigDecimal,
    pub total_amount: BigDecimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure_code: Option<String>,
    /// 金额越界，已归零且不参与任何比价
    #[serde(skip)]
    pub(crate) out_of_range: bool,
}

impl LineItem {
    pub fn new(description: impl Into<String>, quantity: i64, unit_amount: BigDecimal) -> Self {
        let total_amount = &unit_amount * BigDecimal::from(quantity);
        Self {
            description: description.into(),
            quantity,
            unit_amount,
            total_amount,
            procedure_code: None,
            out_of_range: false,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.procedure_code = Some(code.into());
        self
    }

    /// 数量与金额均合法时才参与比价
    pub fn is_evaluable(&self) -> bool {
        !self.out_of_range
            && self.quantity >= 1
            && self.unit_amount >= BigDecimal::zero()
            && self.total_amount >= BigDecimal::zero()
            && !self.description.trim().is_empty()
    }

    /// 单价：优先使用显式单价，否则 total / quantity
    pub fn charged_per_unit(&self) -> BigDecimal {
        if self.unit_amount > BigDecimal::zero() {
            self.unit_amount.clone()
        } else if self.quantity > 1 {
            &self.total_amount / BigDecimal::from(self.quantity)
        } else {
            self.total_amount.clone()
        }
    }
}

/// 账单 (审计输入)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub subtotal: Option<BigDecimal>,
    #[serde(default)]
    pub tax_amount: Option<BigDecimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<f64>,
    #[serde(default)]
    pub total_amount: Option<BigDecimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<BigDecimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance_paid: Option<BigDecimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_hospital_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub hospital_type: Option<HospitalType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bill_date: Option<String>,
    /// 因越界被清理的金额字段路径 (参与缓存键，不接受外部输入)
    #[serde(default, skip_deserializing, skip_serializing_if = "Vec::is_empty")]
    pub(crate) out_of_range_fields: Vec<String>,
}

impl Bill {
    /// 由明细构建账单，小计/合计取明细之和，税额为 0
    pub fn from_items(region: Region, line_items: Vec<LineItem>) -> Self {
        let subtotal = line_items
            .iter()
            .fold(BigDecimal::zero(), |acc, item| acc + &item.total_amount);
        Self {
            line_items,
            subtotal: Some(subtotal.clone()),
            tax_amount: Some(BigDecimal::zero()),
            tax_rate: None,
            total_amount: Some(subtotal),
            discount: None,
            insurance_paid: None,
            region: Some(region),
            currency: None,
            hospital_type: None,
            city: None,
            invoice_number: None,
            patient_name: None,
            bill_date: None,
            out_of_range_fields: Vec::new(),
        }
    }

    /// 明细金额之和
    pub fn line_item_sum(&self) -> BigDecimal {
        self.line_items
            .iter()
            .fold(BigDecimal::zero(), |acc, item| acc + &item.total_amount)
    }

    /// 小计：优先使用账单声明值
    pub fn effective_subtotal(&self) -> BigDecimal {
        self.subtotal.clone().unwrap_or_else(|| self.line_item_sum())
    }

    /// 节省金额上限：声明合计，缺失时取明细之和
    pub fn savings_ceiling(&self) -> BigDecimal {
        let ceiling = self.total_amount.clone().unwrap_or_else(|| self.line_item_sum());
        if ceiling < BigDecimal::zero() {
            BigDecimal::zero()
        } else {
            ceiling
        }
    }

    /// 声明税率：大于 1 视为百分数 (18 → 0.18)
    pub fn stated_tax_rate(&self) -> Option<f64> {
        self.tax_rate
            .filter(|r| r.is_finite() && *r >= 0.0)
            .map(|r| if r > 1.0 { r / 100.0 } else { r })
    }

    /// 账单区域：显式字段优先，否则按币种、城市、医院类型、GST 税率、CPT 编码、金额量级推断，
    /// 仍无法判断时按 US 处理
    pub fn resolved_region(&self) -> Region {
        if let Some(region) = self.region {
            return region;
        }

        match self.currency.as_deref().map(|c| c.trim().to_uppercase()).as_deref() {
            Some("INR") | Some("RS") | Some("₹") => return Region::India,
            Some("USD") | Some("$") => return Region::Us,
            _ => {}
        }
        if self.city.as_deref().map_or(false, is_indian_city) {
            return Region::India;
        }
        if matches!(
            self.hospital_type,
            Some(HospitalType::Government) | Some(HospitalType::CghsEmpaneled)
        ) {
            return Region::India;
        }
        if let Some(rate) = self.stated_tax_rate() {
            if GST_RATES.iter().any(|gst| (gst - rate).abs() < 1e-9) {
                return Region::India;
            }
        }
        let has_cpt = self
            .line_items
            .iter()
            .any(|item| item.procedure_code.as_deref().map_or(false, is_cpt_code));
        if has_cpt {
            return Region::Us;
        }
        let total = self
            .total_amount
            .as_ref()
            .filter(|t| is_sane_amount(t))
            .and_then(|t| t.to_i64())
            .unwrap_or(0);
        if total > INR_TOTAL_HINT {
            return Region::India;
        }
        Region::Us
    }

    /// 是否有明细因金额越界被排除
    pub fn has_out_of_range_lines(&self) -> bool {
        self.line_items.iter().any(|item| item.out_of_range)
    }

    /// 因越界被清理的金额字段路径
    pub fn out_of_range_fields(&self) -> &[String] {
        &self.out_of_range_fields
    }

    /// 清理越界金额：账单级字段置空，明细金额归零并退出比价，
    /// 字段路径记入 `out_of_range_fields` 交由输入校验报告
    pub fn screened(&self) -> Cow<'_, Bill> {
        let bill_level_ok = [
            &self.subtotal,
            &self.tax_amount,
            &self.total_amount,
            &self.discount,
            &self.insurance_paid,
        ]
        .into_iter()
        .all(|value| value.as_ref().map_or(true, is_sane_amount));
        let lines_ok = self
            .line_items
            .iter()
            .all(|item| is_sane_amount(&item.unit_amount) && is_sane_amount(&item.total_amount));
        if bill_level_ok && lines_ok {
            return Cow::Borrowed(self);
        }

        let mut bill = self.clone();
        let mut cleared = Vec::new();
        for (field, value) in [
            ("subtotal", &mut bill.subtotal),
            ("tax_amount", &mut bill.tax_amount),
            ("total_amount", &mut bill.total_amount),
            ("discount", &mut bill.discount),
            ("insurance_paid", &mut bill.insurance_paid),
        ] {
            if value.as_ref().map_or(false, |v| !is_sane_amount(v)) {
                *value = None;
                cleared.push(field.to_string());
            }
        }
        for (idx, item) in bill.line_items.iter_mut().enumerate() {
            for (field, amount) in [("unit_amount", &mut item.unit_amount), ("total_amount", &mut item.total_amount)] {
                if !is_sane_amount(amount) {
                    *amount = BigDecimal::zero();
                    item.out_of_range = true;
                    cleared.push(format!("line_items[{}].{}", idx, field));
                }
            }
        }

        tracing::warn!("账单含越界金额，已排除: {:?}", cleared);
        bill.out_of_range_fields.extend(cleared);
        Cow::Owned(bill)
    }

    /// 医院类型 × 城市层级 的基准价倍数
    pub fn facility_multiplier(&self) -> f64 {
        let hospital = self.hospital_type.map(|h| h.multiplier()).unwrap_or(1.0);
        hospital * city_multiplier(self.city.as_deref())
    }
}
