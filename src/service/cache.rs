use crate::models::{AuditResult, Bill};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// 默认最多缓存的审计结果数
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

pub type CacheKey = ([u8; 32], u64);

/// 审计结果缓存：账单内容哈希 + 目录版本
///
/// 目录替换后版本号变化，旧结果自然失效
pub struct AuditCache {
    entries: DashMap<CacheKey, Arc<AuditResult>>,
    capacity: usize,
}

impl AuditCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
        }
    }

    /// 账单序列化失败时返回 None (不缓存)
    ///
    /// 先清理越界金额再序列化，避免展开超大数值
    pub fn key(bill: &Bill, generation: u64) -> Option<CacheKey> {
        let bill = bill.screened();
        let bytes = serde_json::to_vec(&*bill).ok()?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Some((hasher.finalize().into(), generation))
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<AuditResult>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn insert(&self, key: CacheKey, result: Arc<AuditResult>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity {
            // 满了整体清空
            tracing::debug!("审计缓存已满 ({} 条)，清空", self.entries.len());
            self.entries.clear();
        }
        self.entries.insert(key, result);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AuditCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
