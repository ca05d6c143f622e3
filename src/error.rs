use stock_sync_common::DetectionFailure;
use thiserror::Error;

/// ストレージ層のエラー（再試行の判断に使う）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("一時的なストレージエラー: {0}")]
    Transient(String),

    #[error("ストレージエラー: {0}")]
    Permanent(String),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

#[derive(Error, Debug)]
pub enum StockSyncError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("対応していないファイル形式です: {0}（xlsx, xlsm, xlsb, xls, ods のみ）")]
    InvalidFileType(String),

    #[error("ファイルが空です: {0}")]
    EmptyFile(String),

    #[error("スプレッドシートの読み込みに失敗: {0}")]
    Decode(String),

    #[error("シート構造の検出に失敗: {0}")]
    Structure(#[from] DetectionFailure),

    #[error("照合処理が異常終了しました: {0}")]
    Worker(String),

    #[error("権限がありません: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] stock_sync_common::Error),
}

impl StockSyncError {
    /// 入力ファイル起因のエラーか（書き込みは一切行われていない）
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            StockSyncError::FileNotFound(_)
                | StockSyncError::InvalidFileType(_)
                | StockSyncError::EmptyFile(_)
                | StockSyncError::Decode(_)
                | StockSyncError::Structure(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StockSyncError>;
