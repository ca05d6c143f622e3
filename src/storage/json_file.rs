//! JSONファイルによるカタログ
//!
//! 商品の配列をそのまま保存する。バッチごとに一時ファイルへ書き出してから
//! rename するため、途中で失敗しても元のファイルは壊れない。

use super::CatalogStore;
use crate::error::StorageError;
use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use stock_sync_common::{CatalogRecord, UpdateInstruction};
use tokio::sync::Mutex;

pub struct JsonCatalogStore {
    path: PathBuf,
    // 書き込みを直列化
    write_lock: Mutex<()>,
}

impl JsonCatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_values(&self) -> Result<Vec<Value>, StorageError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                StorageError::Permanent(format!("カタログが見つかりません: {}", self.path.display()))
            }
            _ => StorageError::Transient(format!("カタログ読み込みエラー: {}", e)),
        })?;

        serde_json::from_str(&content)
            .map_err(|e| StorageError::Permanent(format!("カタログのJSONが不正: {}", e)))
    }

    async fn write_values(&self, values: &[Value]) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(values)
            .map_err(|e| StorageError::Permanent(format!("JSON生成エラー: {}", e)))?;

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| StorageError::Transient(format!("一時ファイル書き込みエラー: {}", e)))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StorageError::Transient(format!("カタログ置き換えエラー: {}", e)))
    }
}

#[async_trait]
impl CatalogStore for JsonCatalogStore {
    async fn list_all_products(&self) -> Result<Vec<CatalogRecord>, StorageError> {
        self.read_values()
            .await?
            .into_iter()
            .map(|v| {
                serde_json::from_value(v)
                    .map_err(|e| StorageError::Permanent(format!("商品データが不正: {}", e)))
            })
            .collect()
    }

    async fn update_products_batch(&self, batch: &[UpdateInstruction]) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.read_values().await?;

        let positions: HashMap<String, usize> = values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.get("id").and_then(id_string).map(|id| (id, i)))
            .collect();

        // 先に全件検証（1件でも不明なIDがあればバッチ全体を拒否）
        let mut targets = Vec::with_capacity(batch.len());
        for update in batch {
            match positions.get(&update.catalog_id) {
                Some(&i) => targets.push((i, update)),
                None => {
                    return Err(StorageError::Permanent(format!(
                        "不明な商品ID: {}",
                        update.catalog_id
                    )))
                }
            }
        }

        let now = chrono::Local::now().to_rfc3339();
        for (i, update) in targets {
            if let Value::Object(product) = &mut values[i] {
                product.insert("stock".into(), Value::from(update.new_stock));
                product.insert("inStock".into(), Value::from(update.in_stock));
                product.insert("stockStatus".into(), Value::from(update.stock_status.as_str()));
                product.insert("updatedAt".into(), Value::from(now.clone()));
            }
        }

        self.write_values(&values).await?;
        debug!("{}件の在庫を書き込み: {}", batch.len(), self.path.display());
        Ok(())
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
