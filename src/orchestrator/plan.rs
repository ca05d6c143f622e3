//! 行の照合と更新指示の積み上げ

use super::{JobSettings, JobState};
use crate::progress::{EventPayload, Progress};
use log::{debug, info};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use stock_sync_common::{
    extract_rows, is_noise_name, parse_quantity, CascadingMatcher, CatalogIndex, CatalogRecord,
    IncomingRow, MatchResult, MatchSample, ReportBuilder, SheetLayout, Suggestion, UnmatchedSample,
    UpdateInstruction,
};

/// 未照合行に付ける候補の最大数
const MAX_SUGGESTIONS: usize = 3;

/// 在庫表から導いた更新指示（商品IDごとに1件、後の行が優先）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdatePlan {
    pub updates: Vec<UpdateInstruction>,
    positions: HashMap<String, usize>,
    /// 今回のジョブで照合された商品ID
    pub matched_ids: HashSet<String>,
}

impl UpdatePlan {
    /// 更新指示を追加（同じ商品IDなら上書き）
    pub fn push(&mut self, instruction: UpdateInstruction) {
        self.matched_ids.insert(instruction.catalog_id.clone());
        match self.positions.get(&instruction.catalog_id) {
            Some(&i) => self.updates[i] = instruction,
            None => {
                self.positions
                    .insert(instruction.catalog_id.clone(), self.updates.len());
                self.updates.push(instruction);
            }
        }
    }

    /// 照合されなかった商品のゼロ化指示
    pub fn missing_from(&self, records: &[CatalogRecord]) -> Vec<UpdateInstruction> {
        let mut seen = HashSet::new();
        records
            .iter()
            .filter(|r| !self.matched_ids.contains(&r.id) && seen.insert(r.id.as_str()))
            .map(|r| UpdateInstruction::zeroed(r.id.clone()))
            .collect()
    }
}

/// 行照合に必要なものをまとめて所有する（ブロッキングスレッドへ移すため）
pub(super) struct RowJob {
    pub grid: Vec<Vec<String>>,
    pub layout: SheetLayout,
    pub records: Vec<CatalogRecord>,
    pub matcher: CascadingMatcher,
    pub settings: JobSettings,
    pub report: ReportBuilder,
    pub progress: Progress,
    pub span: (u8, u8),
}

/// 行照合の結果（カタログはゼロ化ポリシーで再利用する）
pub(super) struct PlannedRows {
    pub plan: UpdatePlan,
    pub report: ReportBuilder,
    pub records: Vec<CatalogRecord>,
}

impl RowJob {
    /// 索引を作り全行を照合する
    ///
    /// 行数とカタログ件数に比例して重いので `spawn_blocking` の中で呼ぶ。
    pub fn run(self) -> PlannedRows {
        let RowJob {
            grid,
            layout,
            records,
            matcher,
            settings,
            mut report,
            progress,
            span,
        } = self;

        let plan = {
            let index = CatalogIndex::build(&records);
            info!("索引: 商品{}件, 正規化名{}種", index.len(), index.bucket_count());

            progress.stage(JobState::ProcessingRows, span.0, "在庫表の行を照合しています");
            build_plan(&grid, &layout, &index, &matcher, &settings, &mut report, &progress, span)
        };

        PlannedRows { plan, report, records }
    }
}

/// 全データ行を照合して更新計画を作る
///
/// 進捗は `every_rows` 行ごと、または全体の5%ごとの早い方で送る。
#[allow(clippy::too_many_arguments)]
pub(super) fn build_plan<'a>(
    grid: &[Vec<String>],
    layout: &SheetLayout,
    index: &CatalogIndex<'a>,
    matcher: &CascadingMatcher,
    settings: &JobSettings,
    report: &mut ReportBuilder,
    progress: &Progress,
    span: (u8, u8),
) -> UpdatePlan {
    let rows = extract_rows(grid, layout);
    let header_name = grid
        .get(layout.header_row)
        .and_then(|row| row.get(layout.name_col))
        .map(String::as_str)
        .unwrap_or("");

    let total = rows.len();
    report.set_total_rows(total);
    let step = settings.progress_every_rows.min((total / 20).max(1)).max(1);

    // 並列照合の結果は行番号順のまま保持する
    let mut prematched: Option<Vec<Option<MatchResult<'a>>>> = if settings.parallel_matching {
        Some(
            rows.par_iter()
                .map(|row| {
                    (!is_noise_name(&row.raw_name, header_name))
                        .then(|| matcher.match_name(&row.raw_name, index))
                })
                .collect(),
        )
    } else {
        None
    };

    let mut plan = UpdatePlan::default();
    for (i, row) in rows.iter().enumerate() {
        if is_noise_name(&row.raw_name, header_name) {
            report.record_skipped();
        } else {
            let result = prematched
                .as_mut()
                .and_then(|all| all[i].take())
                .unwrap_or_else(|| matcher.match_name(&row.raw_name, index));
            apply_row(row, result, index, matcher, report, &mut plan);
        }

        let processed = i + 1;
        if processed % step == 0 || processed == total {
            let snapshot = report.snapshot();
            let (start, end) = span;
            let percent = start + ((end - start) as usize * processed / total) as u8;
            progress.emit(
                percent,
                format!("{}/{}行を照合しました", processed, total),
                Some(EventPayload::Rows {
                    processed,
                    total,
                    matched: snapshot.matched_rows,
                    not_found: snapshot.not_found,
                }),
            );
        }
    }

    debug!(
        "照合済み{}行 → 更新指示{}件（重複除去後）",
        report.snapshot().matched_rows,
        plan.updates.len()
    );
    plan
}

fn apply_row(
    row: &IncomingRow,
    result: MatchResult<'_>,
    index: &CatalogIndex<'_>,
    matcher: &CascadingMatcher,
    report: &mut ReportBuilder,
    plan: &mut UpdatePlan,
) {
    let quantity = parse_quantity(&row.raw_quantity);

    match result.record {
        Some(record) => {
            plan.push(UpdateInstruction::for_quantity(record.id.clone(), quantity));
            report.record_match(MatchSample {
                row: row.row_index + 1,
                incoming_name: row.raw_name.clone(),
                catalog_id: record.id.clone(),
                matched_title: record.title.clone(),
                match_type: result.match_type,
                similarity: result.similarity,
                quantity,
            });
        }
        None => {
            debug!("未照合: {}行目 {}", row.row_index + 1, row.raw_name);
            report.record_unmatched(|| UnmatchedSample {
                row: row.row_index + 1,
                incoming_name: row.raw_name.clone(),
                quantity,
                suggestions: matcher
                    .suggest(&row.raw_name, index, MAX_SUGGESTIONS)
                    .into_iter()
                    .map(|(record, score)| Suggestion {
                        catalog_id: record.id.clone(),
                        title: record.title.clone(),
                        score,
                    })
                    .collect(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let mut plan = UpdatePlan::default();
        plan.push(UpdateInstruction::for_quantity("p1", 5));
        plan.push(UpdateInstruction::for_quantity("p2", 1));
        plan.push(UpdateInstruction::for_quantity("p1", 20));

        assert_eq!(plan.updates.len(), 2);
        assert_eq!(plan.updates[0].new_stock, 20);
        assert_eq!(plan.updates[0].stock_status, stock_sync_common::StockStatus::Many);
    }

    #[test]
    fn test_missing_from_skips_matched() {
        let records = vec![
            CatalogRecord::new("p1", "a"),
            CatalogRecord::new("p2", "b"),
            CatalogRecord::new("p3", "c"),
        ];
        let mut plan = UpdatePlan::default();
        plan.push(UpdateInstruction::for_quantity("p1", 5));
        plan.push(UpdateInstruction::for_quantity("p1", 7));

        let zeroed = plan.missing_from(&records);
        let ids: Vec<&str> = zeroed.iter().map(|u| u.catalog_id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p3"]);
        assert!(zeroed.iter().all(|u| u.new_stock == 0 && !u.in_stock));
    }
}
