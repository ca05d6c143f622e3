//! 進捗チャネル
//!
//! ジョブから呼び出し側へ、順序付きの進捗イベントを一方向に送る。
//! 受信側が切断されても送信側は失敗しない（以降のイベントは捨てる）。

use crate::orchestrator::JobState;
use log::warn;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use stock_sync_common::ReconciliationResult;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// 進捗イベント `{ progress, message, ...payload }`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub progress: u8,
    pub message: String,
    #[serde(flatten)]
    pub payload: Option<EventPayload>,
}

impl ProgressEvent {
    pub fn is_heartbeat(&self) -> bool {
        matches!(self.payload, Some(EventPayload::Heartbeat { .. }))
    }

    /// 完了・失敗のどちらか
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.payload,
            Some(EventPayload::Completed { .. }) | Some(EventPayload::Failed { .. })
        )
    }

    pub fn result(&self) -> Option<&ReconciliationResult> {
        match &self.payload {
            Some(EventPayload::Completed { data, .. }) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.payload {
            Some(EventPayload::Failed { error }) => Some(error),
            _ => None,
        }
    }
}

/// どのバッチ処理か
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchPhase {
    Updates,
    ZeroPolicy,
}

/// イベントの付加情報
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Heartbeat {
        heartbeat: bool,
    },
    Stage {
        stage: JobState,
    },
    #[serde(rename_all = "camelCase")]
    Rows {
        processed: usize,
        total: usize,
        matched: usize,
        not_found: usize,
    },
    #[serde(rename_all = "camelCase")]
    Batches {
        phase: BatchPhase,
        done: usize,
        total: usize,
    },
    Completed {
        success: bool,
        data: ReconciliationResult,
    },
    Failed {
        error: String,
    },
}

/// 受信側が切断済み
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("進捗の受信側が切断されました")]
pub struct SinkClosed;

/// 順序付きイベントの送り先
pub trait EventSink: Send {
    fn send(&mut self, event: ProgressEvent) -> Result<(), SinkClosed>;
}

impl EventSink for mpsc::UnboundedSender<ProgressEvent> {
    fn send(&mut self, event: ProgressEvent) -> Result<(), SinkClosed> {
        mpsc::UnboundedSender::send(self, event).map_err(|_| SinkClosed)
    }
}

/// tokio の無制限チャネルで送受信の組を作る
pub fn channel() -> (
    mpsc::UnboundedSender<ProgressEvent>,
    mpsc::UnboundedReceiver<ProgressEvent>,
) {
    mpsc::unbounded_channel()
}

/// 1ジョブ分の送信状態
struct ProgressReporter {
    sink: Option<Box<dyn EventSink>>,
    last_percent: u8,
    last_sent: Instant,
    closed: bool,
    finished: bool,
}

impl ProgressReporter {
    fn deliver(&mut self, event: ProgressEvent) -> bool {
        let Some(sink) = self.sink.as_mut() else {
            return false;
        };
        match sink.send(event) {
            Ok(()) => {
                self.last_sent = Instant::now();
                true
            }
            Err(SinkClosed) => {
                warn!("進捗の受信側が切断されました。以降のイベントは破棄します");
                self.sink = None;
                self.closed = true;
                false
            }
        }
    }

    fn emit(&mut self, percent: u8, message: String, payload: Option<EventPayload>) -> bool {
        if self.finished {
            return false;
        }
        // 進捗率は単調非減少
        self.last_percent = self.last_percent.max(percent.min(100));
        let event = ProgressEvent {
            progress: self.last_percent,
            message,
            payload,
        };
        self.deliver(event)
    }

    fn finish(&mut self, progress: u8, message: String, payload: EventPayload) {
        if self.finished {
            return;
        }
        self.deliver(ProgressEvent {
            progress,
            message,
            payload: Some(payload),
        });
        self.finished = true;
        self.sink = None;
    }
}

/// 進捗の送信ハンドル（ハートビートのタスクと共有する）
#[derive(Clone)]
pub struct Progress {
    inner: Arc<Mutex<ProgressReporter>>,
}

impl Progress {
    pub fn new(sink: impl EventSink + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ProgressReporter {
                sink: Some(Box::new(sink)),
                last_percent: 0,
                last_sent: Instant::now(),
                closed: false,
                finished: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProgressReporter> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// イベントを送る（届かなかったら false）
    pub fn emit(&self, percent: u8, message: impl Into<String>, payload: Option<EventPayload>) -> bool {
        self.lock().emit(percent, message.into(), payload)
    }

    pub fn stage(&self, stage: JobState, percent: u8, message: impl Into<String>) -> bool {
        self.emit(percent, message, Some(EventPayload::Stage { stage }))
    }

    /// 内容のない生存確認
    pub fn heartbeat(&self) -> bool {
        let mut reporter = self.lock();
        let percent = reporter.last_percent;
        reporter.emit(
            percent,
            "処理中...".to_string(),
            Some(EventPayload::Heartbeat { heartbeat: true }),
        )
    }

    pub fn complete(&self, result: ReconciliationResult) {
        let message = if result.cancelled {
            "中断されました".to_string()
        } else {
            "完了しました".to_string()
        };
        self.lock().finish(
            100,
            message,
            EventPayload::Completed {
                success: true,
                data: result,
            },
        );
    }

    /// 失敗イベント（進捗率は0）
    pub fn fail(&self, error: impl Into<String>) {
        let error = error.into();
        self.lock().finish(0, error.clone(), EventPayload::Failed { error });
    }

    /// 受信側が切断されたか
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// まだイベントを送れる状態か
    pub fn is_active(&self) -> bool {
        let reporter = self.lock();
        !reporter.closed && !reporter.finished
    }

    fn idle_for(&self) -> Duration {
        self.lock().last_sent.elapsed()
    }
}

/// ハートビートの間隔（最初の数回は短く、以降は長く）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSchedule {
    pub initial: Duration,
    pub interval: Duration,
}

impl HeartbeatSchedule {
    /// `initial` 間隔で送る回数
    pub const INITIAL_PINGS: u32 = 3;

    pub fn delay_for(&self, tick: u32) -> Duration {
        if tick < Self::INITIAL_PINGS {
            self.initial
        } else {
            self.interval
        }
    }
}

impl Default for HeartbeatSchedule {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(10),
            interval: Duration::from_secs(30),
        }
    }
}

/// drop でハートビートのタスクを止める
pub struct HeartbeatGuard {
    handle: JoinHandle<()>,
}

impl Drop for HeartbeatGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// ハートビートを開始する
///
/// 直前のイベントから間隔以上空いたときだけ送る。
/// 受信側の切断またはジョブ終了で止まる。
pub fn spawn_heartbeat(progress: Progress, schedule: HeartbeatSchedule) -> HeartbeatGuard {
    let handle = tokio::spawn(async move {
        let mut tick = 0u32;
        loop {
            let delay = schedule.delay_for(tick);
            tokio::time::sleep(delay).await;
            if !progress.is_active() {
                break;
            }
            if progress.idle_for() >= delay {
                progress.heartbeat();
            }
            tick = tick.saturating_add(1);
        }
    });
    HeartbeatGuard { handle }
}
