//! バッチ単位の書き込み
//!
//! バッチは1つずつ順番に送る。一時的なエラーは再試行し、
//! 使い切ったバッチは記録して次へ進む。

use super::{Reconciler, SheetDecoder};
use crate::error::StorageError;
use crate::progress::{BatchPhase, EventPayload, Progress};
use crate::retry::{retry, RetryError};
use crate::storage::CatalogStore;
use log::{debug, warn};
use stock_sync_common::{ReportBuilder, UpdateInstruction};

impl BatchPhase {
    fn label(&self) -> &'static str {
        match self {
            BatchPhase::Updates => "在庫更新",
            BatchPhase::ZeroPolicy => "在庫0化",
        }
    }
}

impl<S, D> Reconciler<S, D>
where
    S: CatalogStore,
    D: SheetDecoder + 'static,
{
    /// 指示をバッチに分けて反映し、コミットできた件数を返す
    pub(super) async fn apply_batches(
        &self,
        phase: BatchPhase,
        instructions: &[UpdateInstruction],
        span: (u8, u8),
        report: &mut ReportBuilder,
        progress: &Progress,
    ) -> usize {
        let batches: Vec<&[UpdateInstruction]> =
            instructions.chunks(self.settings.batch_size.max(1)).collect();
        let total = batches.len();
        let mut committed = 0;

        for (n, batch) in batches.into_iter().enumerate() {
            if n > 0 && !self.settings.batch_delay.is_zero() {
                tokio::time::sleep(self.settings.batch_delay).await;
            }

            // 切断後は新しいバッチを送らない（送信済みのものは完了させている）
            if progress.is_closed() && !self.settings.continue_on_disconnect {
                warn!(
                    "{}: 受信側が切断されたため残り{}バッチを中止します",
                    phase.label(),
                    total - n
                );
                report.mark_cancelled();
                break;
            }

            let outcome = retry(&self.settings.retry, StorageError::is_transient, |attempt| {
                debug!(
                    "{} バッチ{}/{} ({}件) 試行{}",
                    phase.label(),
                    n + 1,
                    total,
                    batch.len(),
                    attempt
                );
                self.store.update_products_batch(batch)
            })
            .await;

            match outcome {
                Ok(()) => committed += batch.len(),
                Err(RetryError { error, attempts }) => {
                    warn!(
                        "{} バッチ{}/{}をスキップ（{}回試行）: {}",
                        phase.label(),
                        n + 1,
                        total,
                        attempts,
                        error
                    );
                    report.record_failed_batch(
                        batch.len(),
                        format!(
                            "{} バッチ{}/{}: {}（{}回試行）",
                            phase.label(),
                            n + 1,
                            total,
                            error,
                            attempts
                        ),
                    );
                }
            }

            let (start, end) = span;
            let done = n + 1;
            let percent = start + ((end - start) as usize * done / total) as u8;
            progress.emit(
                percent,
                format!("{} {}/{}バッチ", phase.label(), done, total),
                Some(EventPayload::Batches { phase, done, total }),
            );
        }

        committed
    }
}
