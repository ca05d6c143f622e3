//! 類似度計算
//!
//! - トークン一致率 + 語順ボーナス
//! - 編集距離（レーベンシュタイン）ベースのフォールバック

use std::collections::HashSet;

const ORDER_BONUS_WEIGHT: f64 = 0.2;
const CONTAINMENT_RATIO: f64 = 0.7;
const CONTAINMENT_SCORE: f64 = 0.7;

/// 正規化済みの2つの名前の類似度（0.0〜1.0）
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let tokens_a = tokenize(a);
    let tokens_b = tokenize(b);

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return containment_score(a, b);
    }

    let set_a: HashSet<&str> = tokens_a.iter().copied().collect();
    let set_b: HashSet<&str> = tokens_b.iter().copied().collect();

    let common: HashSet<&str> = set_a.intersection(&set_b).copied().collect();
    if common.is_empty() {
        return 0.0;
    }
    let union = set_a.union(&set_b).count();
    let word_similarity = common.len() as f64 / union as f64;

    // 共通トークンの相対的な並び順を比較
    let order_a = common_in_order(&tokens_a, &common);
    let order_b = common_in_order(&tokens_b, &common);
    let same_position = order_a
        .iter()
        .zip(order_b.iter())
        .filter(|(x, y)| x == y)
        .count();
    let bonus = same_position as f64 / common.len() as f64 * ORDER_BONUS_WEIGHT;

    (word_similarity + bonus).min(1.0)
}

/// 編集距離ベースの類似度
pub fn edit_distance_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }

    let distance = levenshtein_distance(a, b);
    1.0 - (distance as f64 / max_len as f64)
}

/// 空白区切りで2文字以上のトークンのみ
fn tokenize(s: &str) -> Vec<&str> {
    s.split_whitespace()
        .filter(|t| t.chars().count() > 1)
        .collect()
}

fn common_in_order<'a>(tokens: &[&'a str], common: &HashSet<&str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    tokens
        .iter()
        .copied()
        .filter(|t| common.contains(t) && seen.insert(*t))
        .collect()
}

fn containment_score(a: &str, b: &str) -> f64 {
    let (shorter, longer) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };

    if !longer.contains(shorter) {
        return 0.0;
    }

    let ratio = shorter.chars().count() as f64 / longer.chars().count() as f64;
    if ratio > CONTAINMENT_RATIO {
        CONTAINMENT_SCORE
    } else {
        0.0
    }
}

/// レーベンシュタイン距離を計算
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    // 2行分だけ保持
    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for i in 1..=a_len {
        curr[0] = i;
        for j in 1..=b_len {
            let cost = if a_chars[i - 1] == b_chars[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}
