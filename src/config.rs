use crate::models::Region;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// 匹配
pub const MATCH_CONFIDENCE_THRESHOLD: f64 = 0.6;
pub const MATCH_TIE_EPSILON: f64 = 0.01;

// 超收倍数
pub const OVERCHARGE_FLAG_MULTIPLIER: f64 = 1.5;
pub const OVERCHARGE_HIGH_MULTIPLIER: f64 = 2.0;
pub const OVERCHARGE_CRITICAL_MULTIPLIER: f64 = 3.0;

// 重复收费
pub const DUPLICATE_AMOUNT_TOLERANCE: f64 = 0.01;
pub const DUPLICATE_MATERIAL_AMOUNT: f64 = 5000.0;

// 算术
pub const ARITHMETIC_TOLERANCE: f64 = 0.01;

// 单行数量超过该值提示核对
pub const HIGH_QUANTITY_THRESHOLD: i64 = 10;

// 税率区间
pub const INDIA_MAX_TAX_RATE: f64 = 0.15;
pub const US_MAX_TAX_RATE: f64 = 0.0;

// 评分扣分
pub const CRITICAL_PENALTY: u32 = 20;
pub const HIGH_PENALTY: u32 = 10;
pub const MEDIUM_PENALTY: u32 = 5;
pub const LOW_PENALTY: u32 = 2;
pub const MEDIUM_PENALTY_CAP: u32 = 40;
pub const LOW_PENALTY_CAP: u32 = 20;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub catalog: CatalogConfig,
    pub audit: AuditPolicy,
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 仅当目录来源为 postgres 时需要
    pub url: Option<String>,
}

/// 参考价目录来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CatalogSource {
    #[default]
    Builtin,
    Json,
    Csv,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CatalogConfig {
    pub source: CatalogSource,
    pub path: Option<PathBuf>,
}

/// 税率区间
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxBand {
    pub min_rate: f64,
    pub max_rate: f64,
}

/// 审计策略：所有阈值集中于此，便于审阅与测试
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditPolicy {
    pub match_threshold: f64,
    pub tie_epsilon: f64,
    pub overcharge_multiplier: f64,
    pub high_multiplier: f64,
    pub critical_multiplier: f64,
    pub duplicate_amount_tolerance: f64,
    pub material_amount: f64,
    pub arithmetic_tolerance: f64,
    pub max_expected_quantity: i64,
    pub india_tax_band: TaxBand,
    pub us_tax_band: TaxBand,
    pub critical_penalty: u32,
    pub high_penalty: u32,
    pub medium_penalty: u32,
    pub low_penalty: u32,
    pub medium_penalty_cap: u32,
    pub low_penalty_cap: u32,
    /// 额外必填的元数据字段 (invoice_number / patient_name / bill_date)
    pub required_fields: Vec<String>,
}

impl Default for AuditPolicy {
    fn default() -> Self {
        Self {
            match_threshold: MATCH_CONFIDENCE_THRESHOLD,
            tie_epsilon: MATCH_TIE_EPSILON,
            overcharge_multiplier: OVERCHARGE_FLAG_MULTIPLIER,
            high_multiplier: OVERCHARGE_HIGH_MULTIPLIER,
            critical_multiplier: OVERCHARGE_CRITICAL_MULTIPLIER,
            duplicate_amount_tolerance: DUPLICATE_AMOUNT_TOLERANCE,
            material_amount: DUPLICATE_MATERIAL_AMOUNT,
            arithmetic_tolerance: ARITHMETIC_TOLERANCE,
            max_expected_quantity: HIGH_QUANTITY_THRESHOLD,
            india_tax_band: TaxBand {
                min_rate: 0.0,
                max_rate: INDIA_MAX_TAX_RATE,
            },
            us_tax_band: TaxBand {
                min_rate: 0.0,
                max_rate: US_MAX_TAX_RATE,
            },
            critical_penalty: CRITICAL_PENALTY,
            high_penalty: HIGH_PENALTY,
            medium_penalty: MEDIUM_PENALTY,
            low_penalty: LOW_PENALTY,
            medium_penalty_cap: MEDIUM_PENALTY_CAP,
            low_penalty_cap: LOW_PENALTY_CAP,
            required_fields: Vec::new(),
        }
    }
}

impl AuditPolicy {
    pub fn tax_band(&self, region: Region) -> TaxBand {
        match region {
            Region::India => self.india_tax_band,
            Region::Us => self.us_tax_band,
        }
    }
}

/// 信函起草实现
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DrafterKind {
    #[default]
    Template,
}

/// 账单抽取实现
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    #[default]
    Json,
}

/// 外部能力提供方，启动时一次性选定
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    pub drafter: DrafterKind,
    pub extractor: ExtractorKind,
}

impl AppConfig {
    /// 加载配置：默认值 → bill-audit.toml (可选) → AUDIT__* 环境变量
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("bill-audit").required(false))
            .add_source(
                config::Environment::with_prefix("AUDIT")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("audit.required_fields")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<AppConfig>()
    }

    /// 从常用环境变量加载配置
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("SERVER_HOST") {
            config.server.host = host;
        }
        if let Some(port) = std::env::var("SERVER_PORT").ok().and_then(|p| p.parse().ok()) {
            config.server.port = port;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = Some(url);
        }
        if let Ok(path) = std::env::var("CATALOG_PATH") {
            let path = PathBuf::from(path);
            config.catalog.source = match path.extension().and_then(|e| e.to_str()) {
                Some("csv") => CatalogSource::Csv,
                _ => CatalogSource::Json,
            };
            config.catalog.path = Some(path);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_constants() {
        let policy = AuditPolicy::default();
        assert_eq!(policy.match_threshold, 0.6);
        assert_eq!(policy.overcharge_multiplier, 1.5);
        assert_eq!(policy.critical_multiplier, 3.0);
        assert_eq!(policy.max_expected_quantity, 10);
        assert_eq!(policy.tax_band(Region::India).max_rate, 0.15);
        assert_eq!(policy.tax_band(Region::Us).max_rate, 0.0);
        assert!(policy.required_fields.is_empty());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{"server": {"port": 9000}, "audit": {"overcharge_multiplier": 2.0}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.audit.overcharge_multiplier, 2.0);
        assert_eq!(config.audit.match_threshold, 0.6);
        assert_eq!(config.catalog.source, CatalogSource::Builtin);
        assert_eq!(config.provider.drafter, DrafterKind::Template);
    }
}
