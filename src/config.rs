use crate::error::{Result, StockSyncError};
use crate::orchestrator::JobSettings;
use crate::progress::HeartbeatSchedule;
use crate::retry::{BackoffKind, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 既定のカタログJSON
    pub catalog_path: Option<PathBuf>,
    pub batch_size: usize,
    /// 初回の書き込みに続く再試行の上限（3 なら最大4回書き込む）
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// fixed / exponential
    pub retry_backoff: BackoffKind,
    /// 指数バックオフの待ち時間の上限
    pub retry_max_delay_ms: u64,
    pub batch_delay_ms: u64,
    pub heartbeat_initial_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub progress_every_rows: usize,
    pub sample_limit: usize,
    pub parallel_matching: bool,
    /// 受信側が切断されても残りのバッチを書き込む
    pub continue_on_disconnect: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_path: None,
            batch_size: 10,
            max_retries: 3,
            retry_delay_ms: 1000,
            retry_backoff: BackoffKind::Fixed,
            retry_max_delay_ms: 10_000,
            batch_delay_ms: 100,
            heartbeat_initial_secs: 10,
            heartbeat_interval_secs: 30,
            progress_every_rows: 50,
            sample_limit: stock_sync_common::DEFAULT_SAMPLE_LIMIT,
            parallel_matching: false,
            continue_on_disconnect: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| StockSyncError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("stock-sync").join("config.json"))
    }

    pub fn set_catalog_path(&mut self, path: PathBuf) -> Result<()> {
        self.catalog_path = Some(path);
        self.save()
    }

    /// カタログのパスを決定（引数 > 設定ファイル）
    pub fn resolve_catalog(&self, explicit: Option<PathBuf>) -> Result<PathBuf> {
        explicit
            .or_else(|| self.catalog_path.clone())
            .ok_or_else(|| {
                StockSyncError::Config(
                    "カタログが指定されていません。`stock-sync config --set-catalog PATH` で設定してください".into(),
                )
            })
    }

    /// ジョブ設定に変換
    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            batch_size: self.batch_size.max(1),
            retry: RetryPolicy::with_retries(
                self.retry_backoff,
                self.max_retries,
                Duration::from_millis(self.retry_delay_ms),
                Duration::from_millis(self.retry_max_delay_ms),
            ),
            batch_delay: Duration::from_millis(self.batch_delay_ms),
            heartbeat: HeartbeatSchedule {
                initial: Duration::from_secs(self.heartbeat_initial_secs),
                interval: Duration::from_secs(self.heartbeat_interval_secs),
            },
            progress_every_rows: self.progress_every_rows.max(1),
            sample_limit: self.sample_limit,
            parallel_matching: self.parallel_matching,
            continue_on_disconnect: self.continue_on_disconnect,
        }
    }
}
