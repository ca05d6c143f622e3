//! カタログ照合モジュール
//!
//! 正規化済みの商品名をカタログ索引に対して段階的に照合する。
//!
//! ## 照合ティア（先に成功したものを採用）
//! 1. 完全一致
//! 2. ベンダーコード除去後の一致
//! 3. 数量注記を除いたキーワード一致
//! 4. 部分一致（長さ差の制限付き）
//! 5. トークン類似度
//! 6. 編集距離フォールバック

use crate::normalizer::{extract_keywords, normalize, strip_common_prefixes};
use crate::similarity::{edit_distance_similarity, similarity};
use crate::types::{CatalogRecord, MatchType};
use std::collections::HashMap;

const KEYWORD_MIN_CHARS: usize = 5;
const PARTIAL_MAX_LENGTH_DIFF: f64 = 0.6;
const SUGGESTION_MIN_SCORE: f64 = 0.2;

/// ジョブ単位のカタログ索引（構築後は読み取り専用）
#[derive(Debug)]
pub struct CatalogIndex<'a> {
    records: &'a [CatalogRecord],
    /// records と同じ並びの正規化タイトル
    normalized_titles: Vec<String>,
    /// records と同じ並びのキーワードタイトル
    keyword_titles: Vec<String>,
    /// 正規化タイトル → レコード番号（出現順）
    buckets: Vec<Bucket>,
    bucket_by_key: HashMap<String, usize>,
}

#[derive(Debug)]
struct Bucket {
    key: String,
    stripped_key: String,
    members: Vec<usize>,
}

impl<'a> CatalogIndex<'a> {
    /// 全タイトルを一度だけ正規化して索引を構築
    pub fn build(records: &'a [CatalogRecord]) -> Self {
        let mut normalized_titles = Vec::with_capacity(records.len());
        let mut keyword_titles = Vec::with_capacity(records.len());
        let mut buckets: Vec<Bucket> = Vec::new();
        let mut bucket_by_key: HashMap<String, usize> = HashMap::new();

        for (i, record) in records.iter().enumerate() {
            let key = normalize(&record.title);
            keyword_titles.push(extract_keywords(&key));

            match bucket_by_key.get(&key) {
                Some(&b) => buckets[b].members.push(i),
                None => {
                    bucket_by_key.insert(key.clone(), buckets.len());
                    buckets.push(Bucket {
                        stripped_key: strip_common_prefixes(&key),
                        key: key.clone(),
                        members: vec![i],
                    });
                }
            }

            normalized_titles.push(key);
        }

        Self {
            records,
            normalized_titles,
            keyword_titles,
            buckets,
            bucket_by_key,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 正規化タイトルのバケット数
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// 正規化タイトルに一致するレコード（ファイル順）
    pub fn bucket(&self, key: &str) -> Vec<&'a CatalogRecord> {
        self.bucket_by_key
            .get(key)
            .map(|&b| {
                self.buckets[b]
                    .members
                    .iter()
                    .map(|&i| &self.records[i])
                    .collect()
            })
            .unwrap_or_default()
    }

    fn first_in_bucket(&self, key: &str) -> Option<&'a CatalogRecord> {
        self.bucket_by_key
            .get(key)
            .map(|&b| self.bucket_head(b))
    }

    fn bucket_head(&self, bucket: usize) -> &'a CatalogRecord {
        &self.records[self.buckets[bucket].members[0]]
    }
}

/// 照合結果
///
/// `record` が `None` なのは `match_type == NoMatch` のときに限る。
/// `similarity` は `match_type == Similarity` のときだけ入る。
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult<'a> {
    pub incoming_name: String,
    pub record: Option<&'a CatalogRecord>,
    pub match_type: MatchType,
    pub similarity: Option<f64>,
}

impl<'a> MatchResult<'a> {
    fn found(incoming_name: &str, record: &'a CatalogRecord, match_type: MatchType) -> Self {
        Self {
            incoming_name: incoming_name.to_string(),
            record: Some(record),
            match_type,
            similarity: None,
        }
    }

    fn similar(incoming_name: &str, record: &'a CatalogRecord, score: f64) -> Self {
        Self {
            incoming_name: incoming_name.to_string(),
            record: Some(record),
            match_type: MatchType::Similarity,
            similarity: Some(score),
        }
    }

    fn none(incoming_name: &str) -> Self {
        Self {
            incoming_name: incoming_name.to_string(),
            record: None,
            match_type: MatchType::NoMatch,
            similarity: None,
        }
    }

    pub fn is_match(&self) -> bool {
        self.record.is_some()
    }
}

/// 照合ティア
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    Exact,
    PrefixStripped,
    Keywords,
    Partial,
    TokenSimilarity,
    EditDistance,
}

/// 照合設定（ティア順と閾値）
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    pub tiers: Vec<MatchTier>,
    /// トークン類似度の採用閾値（超過で採用）
    pub similarity_threshold: f64,
    /// トークン類似度がこれ未満なら編集距離も試す
    pub edit_distance_trigger: f64,
    /// 編集距離類似度の採用閾値（超過で採用）
    pub edit_distance_threshold: f64,
}

impl MatcherConfig {
    /// プレビュー用（編集距離なし）
    pub fn preview() -> Self {
        Self {
            tiers: vec![
                MatchTier::Exact,
                MatchTier::PrefixStripped,
                MatchTier::Keywords,
                MatchTier::Partial,
                MatchTier::TokenSimilarity,
            ],
            ..Self::sync()
        }
    }

    /// 在庫反映用（編集距離フォールバックあり）
    pub fn sync() -> Self {
        Self {
            tiers: vec![
                MatchTier::Exact,
                MatchTier::PrefixStripped,
                MatchTier::Keywords,
                MatchTier::Partial,
                MatchTier::TokenSimilarity,
                MatchTier::EditDistance,
            ],
            similarity_threshold: 0.4,
            edit_distance_trigger: 0.6,
            edit_distance_threshold: 0.75,
        }
    }

    fn uses(&self, tier: MatchTier) -> bool {
        self.tiers.contains(&tier)
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self::sync()
    }
}

/// 段階的照合器
#[derive(Debug, Clone, Default)]
pub struct CascadingMatcher {
    config: MatcherConfig,
}

impl CascadingMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// 生の商品名を照合する（失敗しない。該当なしは NoMatch）
    pub fn match_name<'a>(&self, raw_name: &str, index: &CatalogIndex<'a>) -> MatchResult<'a> {
        let name = normalize(raw_name);
        if name.is_empty() || index.is_empty() {
            return MatchResult::none(raw_name);
        }

        // ティア5の候補（編集距離との比較のため保留することがある）
        let mut token_best: Option<(usize, f64)> = None;

        for tier in &self.config.tiers {
            let found = match tier {
                MatchTier::Exact => index
                    .first_in_bucket(&name)
                    .map(|r| MatchResult::found(raw_name, r, MatchType::Exact)),
                MatchTier::PrefixStripped => match_prefix_stripped(&name, index)
                    .map(|r| MatchResult::found(raw_name, r, MatchType::PrefixRemoved)),
                MatchTier::Keywords => match_keywords(&name, index)
                    .map(|r| MatchResult::found(raw_name, r, MatchType::Keywords)),
                MatchTier::Partial => match_partial(&name, index)
                    .map(|r| MatchResult::found(raw_name, r, MatchType::Partial)),
                MatchTier::TokenSimilarity => {
                    token_best = best_by(&name, index, similarity);
                    match token_best {
                        Some((i, score)) if score > self.config.similarity_threshold => {
                            let defer = self.config.uses(MatchTier::EditDistance)
                                && score < self.config.edit_distance_trigger;
                            if defer {
                                None
                            } else {
                                Some(MatchResult::similar(raw_name, &index.records[i], score))
                            }
                        }
                        _ => None,
                    }
                }
                MatchTier::EditDistance => self.match_edit_distance(raw_name, &name, index, token_best),
            };

            if let Some(result) = found {
                return result;
            }
        }

        // 保留していたトークン類似度の候補
        match token_best {
            Some((i, score)) if score > self.config.similarity_threshold => {
                MatchResult::similar(raw_name, &index.records[i], score)
            }
            _ => MatchResult::none(raw_name),
        }
    }

    fn match_edit_distance<'a>(
        &self,
        raw_name: &str,
        name: &str,
        index: &CatalogIndex<'a>,
        token_best: Option<(usize, f64)>,
    ) -> Option<MatchResult<'a>> {
        let token_score = token_best.map(|(_, s)| s).unwrap_or(0.0);
        if token_score >= self.config.edit_distance_trigger {
            return None;
        }

        let (i, score) = best_by(name, index, edit_distance_similarity)?;
        if score > self.config.edit_distance_threshold && score > token_score {
            Some(MatchResult::similar(raw_name, &index.records[i], score))
        } else {
            None
        }
    }

    /// 未照合の名前に対する候補（類似度の高い順）
    pub fn suggest<'a>(
        &self,
        raw_name: &str,
        index: &CatalogIndex<'a>,
        limit: usize,
    ) -> Vec<(&'a CatalogRecord, f64)> {
        let name = normalize(raw_name);
        if name.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f64)> = index
            .normalized_titles
            .iter()
            .enumerate()
            .map(|(i, title)| (i, similarity(&name, title)))
            .filter(|(_, score)| *score > SUGGESTION_MIN_SCORE)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(i, score)| (&index.records[i], score))
            .collect()
    }
}

fn match_prefix_stripped<'a>(name: &str, index: &CatalogIndex<'a>) -> Option<&'a CatalogRecord> {
    let stripped = strip_common_prefixes(name);
    if stripped == name {
        return None;
    }

    index
        .buckets
        .iter()
        .position(|b| b.stripped_key == stripped)
        .map(|b| index.bucket_head(b))
}

fn match_keywords<'a>(name: &str, index: &CatalogIndex<'a>) -> Option<&'a CatalogRecord> {
    let keywords = extract_keywords(name);
    if keywords == name || keywords.chars().count() <= KEYWORD_MIN_CHARS {
        return None;
    }

    index
        .keyword_titles
        .iter()
        .position(|t| *t == keywords)
        .map(|i| &index.records[i])
}

fn match_partial<'a>(name: &str, index: &CatalogIndex<'a>) -> Option<&'a CatalogRecord> {
    let name_len = name.chars().count() as f64;

    index
        .buckets
        .iter()
        .position(|b| {
            let key_len = b.key.chars().count() as f64;
            let avg = (key_len + name_len) / 2.0;
            if avg == 0.0 || b.key.is_empty() {
                return false;
            }
            let contains = b.key.contains(name) || name.contains(b.key.as_str());
            contains && (key_len - name_len).abs() / avg < PARTIAL_MAX_LENGTH_DIFF
        })
        .map(|b| index.bucket_head(b))
}

/// フラットなレコード列を走査してスコア最大のものを返す（同点は先勝ち）
fn best_by(
    name: &str,
    index: &CatalogIndex<'_>,
    score_fn: fn(&str, &str) -> f64,
) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, title) in index.normalized_titles.iter().enumerate() {
        let score = score_fn(name, title);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((i, score));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(titles: &[&str]) -> Vec<CatalogRecord> {
        titles
            .iter()
            .enumerate()
            .map(|(i, t)| CatalogRecord::new(format!("p{}", i + 1), *t))
            .collect()
    }

    #[test]
    fn test_index_buckets_collisions() {
        let records = catalog(&["Хмель Cascade", "хмель  cascade!", "Солод"]);
        let index = CatalogIndex::build(&records);

        assert_eq!(index.len(), 3);
        assert_eq!(index.bucket_count(), 2);
        let bucket = index.bucket("хмель cascade");
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket[0].id, "p1");
        assert_eq!(bucket[1].id, "p2");
    }

    #[test]
    fn test_exact_match_wins_over_similarity() {
        let records = catalog(&["Хмель Cascade 100г", "Хмель Каскад 100 г"]);
        let index = CatalogIndex::build(&records);
        let matcher = CascadingMatcher::default();

        let result = matcher.match_name("хмель cascade 100г", &index);
        assert_eq!(result.match_type, MatchType::Exact);
        assert_eq!(result.record.map(|r| r.id.as_str()), Some("p1"));
        assert_eq!(result.similarity, None);
    }

    #[test]
    fn test_exact_returns_first_of_bucket() {
        let records = catalog(&["Солод Pilsner", "СОЛОД pilsner"]);
        let index = CatalogIndex::build(&records);
        let result = CascadingMatcher::default().match_name("солод pilsner", &index);
        assert_eq!(result.record.map(|r| r.id.as_str()), Some("p1"));
    }

    #[test]
    fn test_prefix_removed_match() {
        let records = catalog(&["Дрожжи спиртовые Турбо"]);
        let index = CatalogIndex::build(&records);

        let result = CascadingMatcher::default().match_name("АВ Дрожжи спиртовые Турбо", &index);
        assert_eq!(result.match_type, MatchType::PrefixRemoved);
        assert!(result.is_match());
    }

    #[test]
    fn test_keywords_match() {
        let records = catalog(&["Пробка корковая"]);
        let index = CatalogIndex::build(&records);

        let result = CascadingMatcher::default().match_name("Пробка корковая, 100 шт", &index);
        assert_eq!(result.match_type, MatchType::Keywords);
    }

    #[test]
    fn test_keywords_requires_long_residual() {
        // 残りが5文字以下ならキーワード照合しない
        let records = catalog(&["Сахар"]);
        let index = CatalogIndex::build(&records);
        let matcher = CascadingMatcher::new(MatcherConfig {
            tiers: vec![MatchTier::Keywords],
            ..MatcherConfig::sync()
        });

        let result = matcher.match_name("Сахар 1 кг", &index);
        assert_eq!(result.match_type, MatchType::NoMatch);
    }

    #[test]
    fn test_partial_match() {
        let records = catalog(&["Кега пивная 30 литров"]);
        let index = CatalogIndex::build(&records);

        let result = CascadingMatcher::default().match_name("Кега пивная 30", &index);
        assert_eq!(result.match_type, MatchType::Partial);
    }

    #[test]
    fn test_partial_rejects_large_length_difference() {
        let records = catalog(&["Кега пивная из нержавеющей стали на 30 литров"]);
        let index = CatalogIndex::build(&records);
        let matcher = CascadingMatcher::new(MatcherConfig {
            tiers: vec![MatchTier::Partial],
            ..MatcherConfig::sync()
        });

        let result = matcher.match_name("Кега", &index);
        assert_eq!(result.match_type, MatchType::NoMatch);
    }

    #[test]
    fn test_similarity_match_records_score() {
        let records = catalog(&["Дрожжи спиртовые Турбо 24", "Солод Pilsner"]);
        let index = CatalogIndex::build(&records);

        let result = CascadingMatcher::default().match_name("Турбо дрожжи спиртовые", &index);
        assert_eq!(result.match_type, MatchType::Similarity);
        assert_eq!(result.record.map(|r| r.id.as_str()), Some("p1"));
        let score = result.similarity.unwrap();
        assert!(score > 0.4);
    }

    #[test]
    fn test_edit_distance_fallback_only_in_sync_profile() {
        // 単語は一致しないが綴りが近い
        let records = catalog(&["Дрожжи Гельмшток"]);
        let index = CatalogIndex::build(&records);

        let sync = CascadingMatcher::new(MatcherConfig::sync()).match_name("Дрожи Гельмшток", &index);
        assert_eq!(sync.match_type, MatchType::Similarity);
        assert!(sync.similarity.unwrap() > 0.75);

        // プレビューはトークン類似度のみ: 1/3 + 語順ボーナス0.2
        let preview = CascadingMatcher::new(MatcherConfig::preview()).match_name("Дрожи Гельмшток", &index);
        assert_eq!(preview.match_type, MatchType::Similarity);
        assert!((preview.similarity.unwrap() - 8.0 / 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_held_token_candidate_returned_when_edit_distance_fails() {
        // トークン 0.533（0.4〜0.6）、編集距離 ちょうど0.75（閾値を超えない）
        let records = catalog(&["Чай яблочный"]);
        let index = CatalogIndex::build(&records);
        assert_eq!(edit_distance_similarity("сок яблочный", "чай яблочный"), 0.75);

        let result = CascadingMatcher::new(MatcherConfig::sync()).match_name("Сок яблочный", &index);
        assert_eq!(result.match_type, MatchType::Similarity);
        assert_eq!(result.record.map(|r| r.id.as_str()), Some("p1"));
        assert!((result.similarity.unwrap() - 8.0 / 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_edit_distance_must_beat_token_score() {
        let records = catalog(&["Дрожжи спиртовые Турбо 24"]);
        let index = CatalogIndex::build(&records);
        let name = "турбо дрожжи спиртовые";
        let title = "дрожжи спиртовые турбо 24";
        let token = similarity(name, title);
        let edit = edit_distance_similarity(name, title);
        assert!(edit > 0.1 && edit < token);

        // 編集距離は閾値を超えるが、トークン類似度より低いので採用しない
        let matcher = CascadingMatcher::new(MatcherConfig {
            edit_distance_trigger: 0.9,
            edit_distance_threshold: 0.1,
            ..MatcherConfig::sync()
        });
        let result = matcher.match_name("Турбо дрожжи спиртовые", &index);
        assert_eq!(result.match_type, MatchType::Similarity);
        assert_eq!(result.similarity, Some(token));
    }

    #[test]
    fn test_short_leading_word_is_not_a_vendor_code() {
        let records = catalog(&["Чай яблочный"]);
        let index = CatalogIndex::build(&records);
        let matcher = CascadingMatcher::new(MatcherConfig {
            tiers: vec![MatchTier::Exact, MatchTier::PrefixStripped],
            ..MatcherConfig::sync()
        });

        let result = matcher.match_name("Сок яблочный", &index);
        assert_eq!(result.match_type, MatchType::NoMatch);
    }

    #[test]
    fn test_no_match() {
        let records = catalog(&["Хмель Cascade", "Солод Pilsner"]);
        let index = CatalogIndex::build(&records);

        let result = CascadingMatcher::default().match_name("Бутылка стеклянная", &index);
        assert_eq!(result.match_type, MatchType::NoMatch);
        assert!(result.record.is_none());
        assert!(result.similarity.is_none());
    }

    #[test]
    fn test_empty_inputs() {
        let records = catalog(&["Хмель"]);
        let index = CatalogIndex::build(&records);
        assert_eq!(CascadingMatcher::default().match_name("!!!", &index).match_type, MatchType::NoMatch);

        let empty: Vec<CatalogRecord> = Vec::new();
        let index = CatalogIndex::build(&empty);
        assert_eq!(CascadingMatcher::default().match_name("Хмель", &index).match_type, MatchType::NoMatch);
    }

    #[test]
    fn test_suggest() {
        let records = catalog(&["Хмель Cascade 100г", "Хмель Citra 100г", "Солод Pilsner"]);
        let index = CatalogIndex::build(&records);

        let suggestions = CascadingMatcher::default().suggest("Хмель Mosaic 100г", &index, 3);
        assert_eq!(suggestions.len(), 2);
        assert!(suggestions.iter().all(|(r, _)| r.title.starts_with("Хмель")));
        assert!(suggestions[0].1 >= suggestions[1].1);
    }
}
