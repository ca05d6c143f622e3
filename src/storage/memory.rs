//! メモリ上のカタログ
//!
//! 組み込み利用やテスト向け。コミットされたバッチを記録する。

use super::CatalogStore;
use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use stock_sync_common::{CatalogRecord, StockStatus, UpdateInstruction};

#[derive(Debug, Default)]
struct State {
    records: Vec<CatalogRecord>,
    statuses: HashMap<String, StockStatus>,
    committed: Vec<Vec<UpdateInstruction>>,
}

#[derive(Debug, Default)]
pub struct MemoryCatalogStore {
    state: Mutex<State>,
}

impl MemoryCatalogStore {
    pub fn new(records: Vec<CatalogRecord>) -> Self {
        Self {
            state: Mutex::new(State {
                records,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 現在の商品一覧
    pub fn records(&self) -> Vec<CatalogRecord> {
        self.lock().records.clone()
    }

    pub fn stock_of(&self, id: &str) -> Option<u64> {
        self.lock().records.iter().find(|r| r.id == id).map(|r| r.stock)
    }

    pub fn status_of(&self, id: &str) -> Option<StockStatus> {
        self.lock().statuses.get(id).copied()
    }

    /// コミット済みバッチ（適用順）
    pub fn committed_batches(&self) -> Vec<Vec<UpdateInstruction>> {
        self.lock().committed.clone()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn list_all_products(&self) -> Result<Vec<CatalogRecord>, StorageError> {
        Ok(self.records())
    }

    async fn update_products_batch(&self, batch: &[UpdateInstruction]) -> Result<(), StorageError> {
        let mut state = self.lock();

        let positions: HashMap<&str, usize> = state
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.as_str(), i))
            .collect();
        let targets = batch
            .iter()
            .map(|u| {
                positions
                    .get(u.catalog_id.as_str())
                    .copied()
                    .ok_or_else(|| StorageError::Permanent(format!("不明な商品ID: {}", u.catalog_id)))
            })
            .collect::<Result<Vec<usize>, _>>()?;

        for (i, update) in targets.into_iter().zip(batch) {
            state.records[i].stock = update.new_stock;
            state.statuses.insert(update.catalog_id.clone(), update.stock_status);
        }
        state.committed.push(batch.to_vec());
        Ok(())
    }
}
