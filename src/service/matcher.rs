use crate::config::AuditPolicy;
use crate::models::{CatalogEntry, LineItem, MatchResult, ScoredProcedure};
use crate::service::catalog::Catalog;
use std::collections::BTreeSet;

/// 明细描述中常见的无区分度词
const FILLER_WORDS: &[&str] = &[
    "test", "tests", "charge", "charges", "fee", "fees", "of", "for", "and", "the", "rs", "inr",
];

/// 归一化为词序列：小写、标点转空格、去除填充词
/// 若去除后为空则保留原词
pub fn normalize_tokens(text: &str) -> Vec<String> {
    let lowered: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let all: Vec<String> = lowered.split_whitespace().map(str::to_string).collect();
    let kept: Vec<String> = all
        .iter()
        .filter(|token| !FILLER_WORDS.contains(&token.as_str()))
        .cloned()
        .collect();

    if kept.is_empty() {
        all
    } else {
        kept
    }
}

pub fn normalize(text: &str) -> String {
    normalize_tokens(text).join(" ")
}

/// 基于最长公共子序列的 indel 相似度，返回 [0,1]
fn indel_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let mut previous = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }

    (2 * previous[b.len()]) as f64 / total as f64
}

/// token-set ratio：对词序不敏感，且一方词集为另一方子集时视为完全匹配
pub fn token_set_ratio(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let set_a: BTreeSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: BTreeSet<&str> = b.iter().map(String::as_str).collect();

    let common: Vec<&str> = set_a.intersection(&set_b).copied().collect();
    let only_a: Vec<&str> = set_a.difference(&set_b).copied().collect();
    let only_b: Vec<&str> = set_b.difference(&set_a).copied().collect();

    // 单词描述 (如 "consultation") 与所有含该词的条目并列满分，由决胜规则取目录靠前者
    if !common.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 1.0;
    }

    let joined_common = common.join(" ");
    let combined_a = join_sections(&joined_common, &only_a.join(" "));
    let combined_b = join_sections(&joined_common, &only_b.join(" "));

    let mut best = indel_ratio(&combined_a, &combined_b);
    if !joined_common.is_empty() {
        best = best
            .max(indel_ratio(&joined_common, &combined_a))
            .max(indel_ratio(&joined_common, &combined_b));
    }
    best
}

fn join_sections(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (_, true) => head.to_string(),
        _ => format!("{} {}", head, tail),
    }
}

/// 模糊匹配器：描述 -> 目录条目
pub struct ProcedureMatcher<'a> {
    catalog: &'a Catalog,
    threshold: f64,
    tie_epsilon: f64,
}

impl<'a> ProcedureMatcher<'a> {
    pub fn new(catalog: &'a Catalog, policy: &AuditPolicy) -> Self {
        Self {
            catalog,
            threshold: policy.match_threshold,
            tie_epsilon: policy.tie_epsilon,
        }
    }

    /// 条目得分：名称与别名中的最高分
    fn score_entry(query: &[String], keys: &[Vec<String>]) -> f64 {
        keys.iter()
            .map(|key| token_set_ratio(query, key))
            .fold(0.0, f64::max)
    }

    /// 匹配单条描述；低于阈值视为未匹配
    pub fn match_description(&self, line_index: usize, description: &str) -> MatchResult {
        let query = normalize_tokens(description);
        if query.is_empty() {
            return MatchResult::unmatched(line_index);
        }

        let scored: Vec<(&CatalogEntry, f64)> = self
            .catalog
            .match_candidates()
            .map(|(entry, keys)| (entry, Self::score_entry(&query, keys)))
            .collect();

        let best_score = scored.iter().map(|(_, s)| *s).fold(0.0, f64::max);
        if best_score < self.threshold {
            tracing::debug!(
                "未匹配: '{}' 最高分 {:.3} 低于阈值 {:.2}",
                description, best_score, self.threshold
            );
            return MatchResult::unmatched(line_index);
        }

        // 决胜：分数在 epsilon 内优先有政府费率的条目，其次按目录顺序
        let contenders = scored
            .iter()
            .filter(|(_, s)| best_score - *s <= self.tie_epsilon);
        let chosen = contenders
            .clone()
            .find(|(entry, _)| entry.government_rate.is_some())
            .or_else(|| contenders.clone().next());

        match chosen {
            Some((entry, score)) => {
                tracing::debug!(
                    "匹配: '{}' -> '{}' (置信度 {:.3})",
                    description, entry.normalized_name, score
                );
                MatchResult {
                    line_index,
                    entry: Some((*entry).clone()),
                    confidence: score.clamp(0.0, 1.0),
                }
            }
            None => MatchResult::unmatched(line_index),
        }
    }

    /// 对账单所有明细逐条匹配
    pub fn match_items(&self, items: &[LineItem]) -> Vec<MatchResult> {
        items
            .iter()
            .enumerate()
            .map(|(idx, item)| self.match_description(idx, &item.description))
            .collect()
    }

    /// 检索前 N 个候选 (分数降序，同分按目录顺序)
    pub fn search(&self, query: &str, limit: usize) -> Vec<ScoredProcedure> {
        let tokens = normalize_tokens(query);
        if tokens.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, ScoredProcedure)> = self
            .catalog
            .match_candidates()
            .enumerate()
            .map(|(position, (entry, keys))| {
                let score = Self::score_entry(&tokens, keys);
                (position, ScoredProcedure { entry: entry.clone(), score })
            })
            .filter(|(_, s)| s.score > 0.0)
            .collect();

        scored.sort_by(|(pa, a), (pb, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| pa.cmp(pb))
        });
        scored.into_iter().take(limit).map(|(_, s)| s).collect()
    }
}
