//! 照合ジョブ
//!
//! 在庫表の読み込みから在庫の一括反映までを1本の状態遷移として実行する:
//! Initializing → ReadingFile → DetectingStructure → LoadingCatalog →
//! BuildingIndex → ProcessingRows → ApplyingUpdates → ApplyingZeroPolicy → Completed
//!
//! どこで失敗しても Failed の終端イベントを1つだけ送る。

mod batches;
mod plan;

pub use plan::UpdatePlan;

use plan::PlannedRows;
use crate::codec::{check_extension, CalamineDecoder, Grid, SheetDecoder};
use crate::config::Config;
use crate::error::{Result, StockSyncError};
use crate::progress::{spawn_heartbeat, BatchPhase, EventSink, HeartbeatSchedule, Progress};
use crate::retry::RetryPolicy;
use crate::storage::CatalogStore;
use log::{error, info};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use stock_sync_common::{
    detect, CascadingMatcher, JobMode, MatcherConfig, ReconciliationResult,
    ReportBuilder, UpdateInstruction,
};

/// ジョブの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
    Initializing,
    ReadingFile,
    DetectingStructure,
    LoadingCatalog,
    BuildingIndex,
    ProcessingRows,
    ApplyingUpdates,
    ApplyingZeroPolicy,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Initializing => "initializing",
            JobState::ReadingFile => "readingFile",
            JobState::DetectingStructure => "detectingStructure",
            JobState::LoadingCatalog => "loadingCatalog",
            JobState::BuildingIndex => "buildingIndex",
            JobState::ProcessingRows => "processingRows",
            JobState::ApplyingUpdates => "applyingUpdates",
            JobState::ApplyingZeroPolicy => "applyingZeroPolicy",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Viewer,
}

/// 認証済みの呼び出し元
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub name: String,
    pub role: Role,
}

impl Caller {
    pub fn admin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: Role::Admin,
        }
    }

    pub fn viewer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: Role::Viewer,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// 呼び出し側が指定するオプション
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobOptions {
    /// 在庫表に無い商品を在庫0にする
    pub set_missing_to_zero: bool,
    pub mode: JobMode,
}

impl JobOptions {
    pub fn apply(set_missing_to_zero: bool) -> Self {
        Self {
            set_missing_to_zero,
            mode: JobMode::Apply,
        }
    }

    pub fn preview(set_missing_to_zero: bool) -> Self {
        Self {
            set_missing_to_zero,
            mode: JobMode::Preview,
        }
    }
}

/// ジョブの実行パラメータ
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub batch_size: usize,
    pub retry: RetryPolicy,
    /// バッチ間の待ち時間
    pub batch_delay: Duration,
    pub heartbeat: HeartbeatSchedule,
    pub progress_every_rows: usize,
    pub sample_limit: usize,
    pub parallel_matching: bool,
    pub continue_on_disconnect: bool,
}

impl Default for JobSettings {
    fn default() -> Self {
        Config::default().job_settings()
    }
}

/// アップロードされた在庫表
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(StockSyncError::FileNotFound(path.display().to_string()));
        }
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(file_name, bytes))
    }
}

// 各段階の進捗率
const PCT_READING: u8 = 5;
const PCT_DETECTING: u8 = 10;
const PCT_LOADING: u8 = 15;
const PCT_INDEXING: u8 = 20;
const PCT_ROWS_END: u8 = 70;
const PCT_PREVIEW_ROWS_END: u8 = 95;
const PCT_ZERO_POLICY: u8 = 90;
const PCT_ZERO_END: u8 = 99;

/// 照合ジョブの実行器
pub struct Reconciler<S, D = CalamineDecoder> {
    store: Arc<S>,
    decoder: Arc<D>,
    settings: JobSettings,
}

impl<S: CatalogStore> Reconciler<S, CalamineDecoder> {
    pub fn new(store: Arc<S>, settings: JobSettings) -> Self {
        Self::with_decoder(store, CalamineDecoder, settings)
    }
}

impl<S, D> Reconciler<S, D>
where
    S: CatalogStore,
    D: SheetDecoder + 'static,
{
    pub fn with_decoder(store: Arc<S>, decoder: D, settings: JobSettings) -> Self {
        Self {
            store,
            decoder: Arc::new(decoder),
            settings,
        }
    }

    /// ジョブを実行し、終端イベント（完了または失敗）を必ず送る
    pub async fn run<K: EventSink + 'static>(
        &self,
        caller: &Caller,
        upload: Upload,
        options: JobOptions,
        sink: K,
    ) -> Result<ReconciliationResult> {
        let progress = Progress::new(sink);
        let _heartbeat = spawn_heartbeat(progress.clone(), self.settings.heartbeat);

        match self.execute(caller, upload, options, &progress).await {
            Ok(result) => {
                info!(
                    "照合完了: 更新{} / 未照合{} / ゼロ化{} / エラー{}",
                    result.updated, result.not_found, result.set_to_zero, result.errors
                );
                progress.complete(result.clone());
                Ok(result)
            }
            Err(e) => {
                error!("照合ジョブ失敗: {}", e);
                progress.fail(e.to_string());
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        caller: &Caller,
        upload: Upload,
        options: JobOptions,
        progress: &Progress,
    ) -> Result<ReconciliationResult> {
        progress.stage(JobState::Initializing, 0, "ジョブを開始しています");
        authorize(caller)?;
        info!(
            "照合ジョブ開始: {} ({:?}, 在庫0化={})",
            upload.file_name, options.mode, options.set_missing_to_zero
        );

        progress.stage(
            JobState::ReadingFile,
            PCT_READING,
            format!("ファイルを読み込んでいます: {}", upload.file_name),
        );
        let grid = self.read_file(upload).await?;

        progress.stage(JobState::DetectingStructure, PCT_DETECTING, "シート構造を検出しています");
        let layout = detect(&grid)?;
        info!(
            "シート構造: ヘッダー{}行目, 商品名{}列目, 数量{}列目, データ開始{}行目",
            layout.header_row + 1,
            layout.name_col + 1,
            layout.qty_col + 1,
            layout.data_start_row + 1
        );

        progress.stage(JobState::LoadingCatalog, PCT_LOADING, "商品カタログを読み込んでいます");
        let records = self.store.list_all_products().await?;

        progress.stage(
            JobState::BuildingIndex,
            PCT_INDEXING,
            format!("{}件の商品を索引化しています", records.len()),
        );
        let matcher = CascadingMatcher::new(match options.mode {
            JobMode::Preview => MatcherConfig::preview(),
            JobMode::Apply => MatcherConfig::sync(),
        });
        let rows_end = match options.mode {
            JobMode::Preview => PCT_PREVIEW_ROWS_END,
            JobMode::Apply => PCT_ROWS_END,
        };

        // 行の照合はカタログ全件を走査するので別スレッドで行う
        let job = plan::RowJob {
            grid,
            layout,
            records,
            matcher,
            settings: self.settings.clone(),
            report: ReportBuilder::new(options.mode, self.settings.sample_limit),
            progress: progress.clone(),
            span: (PCT_INDEXING, rows_end),
        };
        let PlannedRows {
            plan,
            mut report,
            records,
        } = tokio::task::spawn_blocking(move || job.run())
            .await
            .map_err(|e| StockSyncError::Worker(e.to_string()))?;

        let zero_list: Vec<UpdateInstruction> = if options.set_missing_to_zero {
            plan.missing_from(&records)
        } else {
            Vec::new()
        };

        match options.mode {
            JobMode::Preview => {
                report.record_updated(plan.updates.len());
                report.record_zeroed(zero_list.len());
            }
            JobMode::Apply => {
                progress.stage(
                    JobState::ApplyingUpdates,
                    rows_end,
                    format!("{}件の在庫を反映しています", plan.updates.len()),
                );
                let committed = self
                    .apply_batches(BatchPhase::Updates, &plan.updates, (rows_end, PCT_ZERO_POLICY), &mut report, progress)
                    .await;
                report.record_updated(committed);

                if options.set_missing_to_zero && !report.snapshot().cancelled {
                    progress.stage(
                        JobState::ApplyingZeroPolicy,
                        PCT_ZERO_POLICY,
                        format!("在庫表に無い{}件の商品を在庫0にしています", zero_list.len()),
                    );
                    let zeroed = self
                        .apply_batches(BatchPhase::ZeroPolicy, &zero_list, (PCT_ZERO_POLICY, PCT_ZERO_END), &mut report, progress)
                        .await;
                    report.record_zeroed(zeroed);
                }
            }
        }

        Ok(report.finish())
    }

    async fn read_file(&self, upload: Upload) -> Result<Grid> {
        check_extension(&upload.file_name)?;
        if upload.bytes.is_empty() {
            return Err(StockSyncError::EmptyFile(upload.file_name));
        }

        let decoder = Arc::clone(&self.decoder);
        let bytes = upload.bytes;
        let grid = tokio::task::spawn_blocking(move || decoder.decode(&bytes))
            .await
            .map_err(|e| StockSyncError::Decode(e.to_string()))??;

        if grid.iter().all(|row| row.iter().all(|c| c.trim().is_empty())) {
            return Err(StockSyncError::EmptyFile(upload.file_name));
        }
        Ok(grid)
    }
}

fn authorize(caller: &Caller) -> Result<()> {
    if caller.is_admin() {
        Ok(())
    } else {
        Err(StockSyncError::Unauthorized(format!(
            "{} には在庫を更新する権限がありません",
            caller.name
        )))
    }
}
