//! stock-sync
//!
//! 在庫表（スプレッドシート）を商品カタログと照合し、在庫を一括反映する。

pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod export;
pub mod orchestrator;
pub mod progress;
pub mod retry;
pub mod storage;

pub use codec::{CalamineDecoder, SheetDecoder};
pub use error::{Result, StockSyncError, StorageError};
pub use orchestrator::{Caller, JobOptions, JobSettings, JobState, Reconciler, Upload};
pub use progress::{EventPayload, EventSink, ProgressEvent};
pub use storage::{CatalogStore, JsonCatalogStore, MemoryCatalogStore};
