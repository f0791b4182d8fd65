use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 市场价区间
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRateRange {
    pub low: BigDecimal,
    pub median: BigDecimal,
    pub high: BigDecimal,
}

/// 基准价来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BenchmarkSource {
    Government,
    Package,
    MarketMedian,
}

impl BenchmarkSource {
    pub fn label(&self) -> &'static str {
        match self {
            BenchmarkSource::Government => "CGHS rate",
            BenchmarkSource::Package => "PMJAY package rate",
            BenchmarkSource::MarketMedian => "market median",
        }
    }
}

/// 参考价目录条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub normalized_name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub government_rate: Option<BigDecimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_rate: Option<BigDecimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_rate_range: Option<MarketRateRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl CatalogEntry {
    pub fn new(normalized_name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            normalized_name: normalized_name.into(),
            category: category.into(),
            government_rate: None,
            package_rate: None,
            market_rate_range: None,
            code: None,
            aliases: Vec::new(),
        }
    }

    pub fn with_government_rate(mut self, rate: BigDecimal) -> Self {
        self.government_rate = Some(rate);
        self
    }

    pub fn with_package_rate(mut self, rate: BigDecimal) -> Self {
        self.package_rate = Some(rate);
        self
    }

    pub fn with_market_range(mut self, low: BigDecimal, median: BigDecimal, high: BigDecimal) -> Self {
        self.market_rate_range = Some(MarketRateRange { low, median, high });
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// 基准价：政府费率 → 套餐费率 → 市场中位价
    pub fn benchmark(&self) -> Option<(BenchmarkSource, &BigDecimal)> {
        if let Some(rate) = &self.government_rate {
            return Some((BenchmarkSource::Government, rate));
        }
        if let Some(rate) = &self.package_rate {
            return Some((BenchmarkSource::Package, rate));
        }
        self.market_rate_range
            .as_ref()
            .map(|range| (BenchmarkSource::MarketMedian, &range.median))
    }

    /// 校验条目：名称非空、至少一个基准价、费率非负
    pub fn validate(&self) -> Result<(), String> {
        if self.normalized_name.trim().is_empty() {
            return Err("empty procedure name".to_string());
        }
        if self.benchmark().is_none() {
            return Err("no benchmark rate".to_string());
        }
        let zero = BigDecimal::zero();
        let negative = self.government_rate.as_ref().map_or(false, |r| *r < zero)
            || self.package_rate.as_ref().map_or(false, |r| *r < zero)
            || self.market_rate_range.as_ref().map_or(false, |m| {
                m.low < zero || m.median < zero || m.high < zero
            });
        if negative {
            return Err("negative rate".to_string());
        }
        Ok(())
    }
}

/// procedures 表的一行
#[derive(Debug, Clone, FromRow)]
pub struct ProcedureRow {
    pub normalized_name: String,
    pub category: String,
    pub cghs_code: Option<String>,
    pub government_rate: Option<BigDecimal>,
    pub package_rate: Option<BigDecimal>,
    pub market_low: Option<BigDecimal>,
    pub market_median: Option<BigDecimal>,
    pub market_high: Option<BigDecimal>,
    pub aliases: Option<String>,
}

impl From<ProcedureRow> for CatalogEntry {
    fn from(row: ProcedureRow) -> Self {
        // 三个市场价字段齐全时才构成区间
        let market_rate_range = match (row.market_low, row.market_median, row.market_high) {
            (Some(low), Some(median), Some(high)) => Some(MarketRateRange { low, median, high }),
            _ => None,
        };
        let aliases = row
            .aliases
            .map(|a| {
                a.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        CatalogEntry {
            normalized_name: row.normalized_name,
            category: row.category,
            government_rate: row.government_rate,
            package_rate: row.package_rate,
            market_rate_range,
            code: row.cghs_code,
            aliases,
        }
    }
}
