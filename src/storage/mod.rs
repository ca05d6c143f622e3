//! カタログストレージ
//!
//! 商品の全件読み込みと、バッチ単位（全件成功か全件失敗）の在庫更新。

mod json_file;
mod memory;

pub use json_file::JsonCatalogStore;
pub use memory::MemoryCatalogStore;

use crate::error::StorageError;
use async_trait::async_trait;
use stock_sync_common::{CatalogRecord, UpdateInstruction};

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// 全商品を読み込む
    async fn list_all_products(&self) -> Result<Vec<CatalogRecord>, StorageError>;

    /// 1バッチ分の更新を1トランザクションで適用する
    ///
    /// 失敗時はバッチ内のどの更新も反映されない。
    async fn update_products_batch(&self, batch: &[UpdateInstruction]) -> Result<(), StorageError>;
}
