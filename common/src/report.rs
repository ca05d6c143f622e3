//! 照合結果の集計
//!
//! ジョブ終了時に一度だけ返される ReconciliationResult と、
//! 処理中に件数・サンプルを積み上げる ReportBuilder。

use crate::types::MatchType;
use serde::{Deserialize, Serialize};

/// 確認用サンプルの既定件数
pub const DEFAULT_SAMPLE_LIMIT: usize = 50;

/// ジョブの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    /// 照合のみ（書き込みなし）
    Preview,
    /// 在庫を反映
    #[default]
    Apply,
}

/// 照合できた行のサンプル
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSample {
    /// シート上の行番号（1始まり）
    pub row: usize,
    pub incoming_name: String,
    pub catalog_id: String,
    pub matched_title: String,
    pub match_type: MatchType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    pub quantity: u64,
}

/// 候補タイトル
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub catalog_id: String,
    pub title: String,
    pub score: f64,
}

/// 照合できなかった行のサンプル
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmatchedSample {
    pub row: usize,
    pub incoming_name: String,
    pub quantity: u64,
    pub suggestions: Vec<Suggestion>,
}

/// 照合ティア別の件数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchTypeCounts {
    pub exact: usize,
    pub prefix_removed: usize,
    pub keywords: usize,
    pub partial: usize,
    pub similarity: usize,
}

impl MatchTypeCounts {
    pub fn record(&mut self, match_type: MatchType) {
        match match_type {
            MatchType::Exact => self.exact += 1,
            MatchType::PrefixRemoved => self.prefix_removed += 1,
            MatchType::Keywords => self.keywords += 1,
            MatchType::Partial => self.partial += 1,
            MatchType::Similarity => self.similarity += 1,
            MatchType::NoMatch => {}
        }
    }

    pub fn total(&self) -> usize {
        self.exact + self.prefix_removed + self.keywords + self.partial + self.similarity
    }
}

/// 照合ジョブの最終結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    pub mode: JobMode,
    /// 更新をコミットした商品数（プレビューでは更新予定数）
    pub updated: usize,
    /// 照合できなかった行数
    pub not_found: usize,
    /// ゼロ化した商品数
    pub set_to_zero: usize,
    /// 失敗バッチに含まれていた更新指示の数
    pub errors: usize,
    pub total_rows: usize,
    pub matched_rows: usize,
    pub skipped_rows: usize,
    pub failed_batches: usize,
    pub match_types: MatchTypeCounts,
    pub matches: Vec<MatchSample>,
    pub unmatched: Vec<UnmatchedSample>,
    pub error_messages: Vec<String>,
    /// 進捗の受信側が切断された
    pub cancelled: bool,
}

impl ReconciliationResult {
    pub fn has_errors(&self) -> bool {
        self.errors > 0 || self.failed_batches > 0
    }
}

/// 処理中に結果を積み上げる
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    sample_limit: usize,
    result: ReconciliationResult,
}

impl ReportBuilder {
    pub fn new(mode: JobMode, sample_limit: usize) -> Self {
        Self {
            sample_limit,
            result: ReconciliationResult {
                mode,
                ..Default::default()
            },
        }
    }

    pub fn set_total_rows(&mut self, total: usize) {
        self.result.total_rows = total;
    }

    pub fn record_skipped(&mut self) {
        self.result.skipped_rows += 1;
    }

    pub fn record_match(&mut self, sample: MatchSample) {
        self.result.matched_rows += 1;
        self.result.match_types.record(sample.match_type);
        if self.result.matches.len() < self.sample_limit {
            self.result.matches.push(sample);
        }
    }

    /// 未照合行を記録（候補はサンプル枠に余裕があるときだけ必要）
    pub fn record_unmatched(&mut self, sample: impl FnOnce() -> UnmatchedSample) {
        self.result.not_found += 1;
        if self.result.unmatched.len() < self.sample_limit {
            self.result.unmatched.push(sample());
        }
    }

    pub fn record_updated(&mut self, count: usize) {
        self.result.updated += count;
    }

    pub fn record_zeroed(&mut self, count: usize) {
        self.result.set_to_zero += count;
    }

    /// 失敗したバッチを記録
    pub fn record_failed_batch(&mut self, instructions: usize, message: impl Into<String>) {
        self.result.failed_batches += 1;
        self.result.errors += instructions;
        if self.result.error_messages.len() < self.sample_limit {
            self.result.error_messages.push(message.into());
        }
    }

    pub fn mark_cancelled(&mut self) {
        self.result.cancelled = true;
    }

    pub fn snapshot(&self) -> &ReconciliationResult {
        &self.result
    }

    pub fn finish(self) -> ReconciliationResult {
        self.result
    }
}
