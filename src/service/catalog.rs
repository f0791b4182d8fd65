use crate::config::{CatalogConfig, CatalogSource};
use crate::db::queries;
use crate::models::{CatalogEntry, MarketRateRange};
use crate::service::matcher::{normalize, normalize_tokens};
use bigdecimal::BigDecimal;
use indexmap::IndexMap;
use serde::Deserialize;
use sqlx::PgPool;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

const BUILTIN_RATES: &str = include_str!("../../data/reference_rates.json");

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog source: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid catalog CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("catalog query failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid catalog entry '{name}': {reason}")]
    InvalidEntry { name: String, reason: String },
    #[error("catalog source produced no entries")]
    Empty,
    #[error("catalog source not configured: {0}")]
    MissingSource(String),
}

/// 参考价目录 (构建后只读)
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    /// 归一化名称/别名 -> 条目下标，保持目录顺序
    index: IndexMap<String, usize>,
    /// 每个条目的匹配词组 (名称 + 别名)
    match_keys: Vec<Vec<Vec<String>>>,
}

impl Catalog {
    /// 空目录：所有查询均返回空
    pub fn empty() -> Self {
        Self::default()
    }

    /// 从条目构建目录，任一条目非法则整体失败
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Result<Self, CatalogError> {
        let mut catalog = Self::empty();

        for entry in entries {
            entry.validate().map_err(|reason| CatalogError::InvalidEntry {
                name: entry.normalized_name.clone(),
                reason,
            })?;

            let key = normalize(&entry.normalized_name);
            if catalog.index.contains_key(&key) {
                tracing::warn!("目录中重复的项目 '{}'，保留首个", entry.normalized_name);
                continue;
            }

            let position = catalog.entries.len();
            let mut keys = vec![normalize_tokens(&entry.normalized_name)];
            catalog.index.insert(key, position);
            for alias in &entry.aliases {
                let alias_key = normalize(alias);
                if alias_key.is_empty() {
                    continue;
                }
                catalog.index.entry(alias_key).or_insert(position);
                keys.push(normalize_tokens(alias));
            }

            catalog.match_keys.push(keys);
            catalog.entries.push(entry);
        }

        Ok(catalog)
    }

    /// 内置 CGHS/PMJAY 种子数据
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json_str(BUILTIN_RATES)
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(json)?;
        non_empty(Self::from_entries(entries)?)
    }

    pub fn from_json_path(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// CSV 列: normalized_name,category,government_rate,package_rate,market_low,market_median,market_high,code,aliases
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, CatalogError> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut entries = Vec::new();
        for record in csv_reader.deserialize::<CsvRecord>() {
            entries.push(record?.into_entry());
        }
        non_empty(Self::from_entries(entries)?)
    }

    pub fn from_csv_path(path: &Path) -> Result<Self, CatalogError> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    /// 从 procedures 表加载
    pub async fn from_postgres(pool: &PgPool) -> Result<Self, CatalogError> {
        let rows = queries::list_procedures(pool).await?;
        let entries = rows.into_iter().map(CatalogEntry::from).collect();
        non_empty(Self::from_entries(entries)?)
    }

    /// 按名称查找 (名称先归一化，别名同样生效)
    pub fn lookup(&self, name: &str) -> Option<&CatalogEntry> {
        self.index
            .get(&normalize(name))
            .and_then(|&position| self.entries.get(position))
    }

    pub fn all(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (条目, 匹配词组) 按目录顺序迭代
    pub(crate) fn match_candidates(&self) -> impl Iterator<Item = (&CatalogEntry, &[Vec<String>])> {
        self.entries
            .iter()
            .zip(self.match_keys.iter().map(|keys| keys.as_slice()))
    }
}

fn non_empty(catalog: Catalog) -> Result<Catalog, CatalogError> {
    if catalog.is_empty() {
        Err(CatalogError::Empty)
    } else {
        Ok(catalog)
    }
}

#[derive(Debug, Deserialize)]
struct CsvRecord {
    normalized_name: String,
    #[serde(default)]
    category: String,
    government_rate: Option<BigDecimal>,
    package_rate: Option<BigDecimal>,
    market_low: Option<BigDecimal>,
    market_median: Option<BigDecimal>,
    market_high: Option<BigDecimal>,
    code: Option<String>,
    aliases: Option<String>,
}

impl CsvRecord {
    fn into_entry(self) -> CatalogEntry {
        let market_rate_range = match (self.market_low, self.market_median, self.market_high) {
            (Some(low), Some(median), Some(high)) => Some(MarketRateRange { low, median, high }),
            _ => None,
        };
        let aliases = self
            .aliases
            .map(|a| {
                a.split(';')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        CatalogEntry {
            normalized_name: self.normalized_name,
            category: self.category,
            government_rate: self.government_rate,
            package_rate: self.package_rate,
            market_rate_range,
            code: self.code.filter(|c| !c.is_empty()),
            aliases,
        }
    }
}

/// 按配置加载目录
pub async fn load_catalog(config: &CatalogConfig, pool: Option<&PgPool>) -> Result<Catalog, CatalogError> {
    let catalog = match config.source {
        CatalogSource::Builtin => Catalog::builtin()?,
        CatalogSource::Json => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| CatalogError::MissingSource("catalog.path".to_string()))?;
            Catalog::from_json_path(path)?
        }
        CatalogSource::Csv => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| CatalogError::MissingSource("catalog.path".to_string()))?;
            Catalog::from_csv_path(path)?
        }
        CatalogSource::Postgres => {
            let pool = pool.ok_or_else(|| CatalogError::MissingSource("database.url".to_string()))?;
            Catalog::from_postgres(pool).await?
        }
    };

    tracing::info!("Loaded reference catalog: {} procedures ({:?})", catalog.len(), config.source);
    Ok(catalog)
}

/// 目录句柄：整体替换 (copy-and-swap)，进行中的审计持有旧快照
#[derive(Debug)]
pub struct CatalogHandle {
    current: RwLock<Arc<Catalog>>,
    generation: AtomicU64,
}

impl CatalogHandle {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
            generation: AtomicU64::new(1),
        }
    }

    pub fn snapshot(&self) -> Arc<Catalog> {
        let guard = self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&*guard)
    }

    /// 替换目录，返回新的版本号
    pub fn replace(&self, catalog: Catalog) -> u64 {
        let next = Arc::new(catalog);
        {
            let mut guard = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = next;
        }
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, rate: i64) -> CatalogEntry {
        CatalogEntry::new(name, "laboratory").with_government_rate(BigDecimal::from(rate))
    }

    #[test]
    fn test_lookup_normalizes_name_and_aliases() {
        let catalog = Catalog::from_entries(vec![
            entry("renal function test", 250).with_alias("KFT"),
            entry("lipid profile", 150),
        ])
        .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.lookup("Renal Function Test").unwrap().normalized_name, "renal function test");
        assert_eq!(catalog.lookup("kft").unwrap().normalized_name, "renal function test");
        assert_eq!(catalog.lookup("LIPID-PROFILE").unwrap().normalized_name, "lipid profile");
        assert!(catalog.lookup("mri brain").is_none());
    }

    #[test]
    fn test_invalid_entry_fails_whole_catalog() {
        let result = Catalog::from_entries(vec![entry("cbc", 80), CatalogEntry::new("ecg", "cardiology")]);
        assert!(matches!(result, Err(CatalogError::InvalidEntry { ref name, .. }) if name == "ecg"));
    }

    #[test]
    fn test_duplicate_names_keep_first() {
        let catalog = Catalog::from_entries(vec![entry("cbc", 80), entry("CBC", 999)]).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.lookup("cbc").unwrap().government_rate, Some(BigDecimal::from(80)));
    }

    #[test]
    fn test_empty_catalog_fails_closed() {
        let catalog = Catalog::empty();
        assert!(catalog.is_empty());
        assert!(catalog.lookup("cbc").is_none());
        assert!(catalog.all().is_empty());
        assert!(matches!(Catalog::from_json_str("[]"), Err(CatalogError::Empty)));
    }

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = Catalog::builtin().unwrap();
        assert!(catalog.len() > 20);
        let rft = catalog.lookup("kidney function test").unwrap();
        assert_eq!(rft.government_rate, Some(BigDecimal::from(250)));
        let cataract = catalog.lookup("cataract surgery").unwrap();
        assert!(cataract.government_rate.is_none());
        assert_eq!(cataract.package_rate, Some(BigDecimal::from(15000)));
    }

    #[test]
    fn test_csv_loader() {
        let data = "\
normalized_name,category,government_rate,package_rate,market_low,market_median,market_high,code,aliases
renal function test,laboratory,250,,350,400,450,L-201,kft;rft
appendectomy,general surgery,,20000,,,,,
";
        let catalog = Catalog::from_csv_reader(data.as_bytes()).unwrap();
        assert_eq!(catalog.len(), 2);
        let rft = catalog.lookup("rft").unwrap();
        assert_eq!(rft.code.as_deref(), Some("L-201"));
        assert_eq!(rft.market_rate_range.as_ref().unwrap().median, BigDecimal::from(400));
        let appendectomy = catalog.lookup("appendectomy").unwrap();
        assert!(appendectomy.code.is_none());
        assert_eq!(appendectomy.package_rate, Some(BigDecimal::from(20000)));
    }

    #[test]
    fn test_handle_swap_keeps_old_snapshot() {
        let handle = CatalogHandle::new(Catalog::from_entries(vec![entry("cbc", 80)]).unwrap());
        let before = handle.snapshot();
        assert_eq!(handle.generation(), 1);

        let generation = handle.replace(Catalog::from_entries(vec![entry("cbc", 90), entry("ecg", 100)]).unwrap());
        assert_eq!(generation, 2);
        assert_eq!(handle.generation(), 2);

        assert_eq!(before.len(), 1);
        assert_eq!(before.lookup("cbc").unwrap().government_rate, Some(BigDecimal::from(80)));
        assert_eq!(handle.snapshot().len(), 2);
    }
}
