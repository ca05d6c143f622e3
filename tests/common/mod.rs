//! 統合テスト用の共通ヘルパー

#![allow(dead_code)]

use async_trait::async_trait;
use rust_xlsxwriter::Workbook;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use stock_sync::progress::ProgressEvent;
use stock_sync::retry::RetryPolicy;
use stock_sync::{CatalogStore, JobSettings, MemoryCatalogStore, StorageError};
use stock_sync_common::{CatalogRecord, UpdateInstruction};
use tokio::sync::mpsc::UnboundedReceiver;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 行データから xlsx のバイト列を作る（数値に読めるセルは数値で書く）
pub fn xlsx(rows: &[&[&str]]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            match cell.parse::<f64>() {
                Ok(n) => {
                    sheet.write_number(r as u32, c as u16, n).expect("write number");
                }
                Err(_) => {
                    sheet.write_string(r as u32, c as u16, *cell).expect("write string");
                }
            }
        }
    }
    workbook.save_to_buffer().expect("xlsx buffer")
}

/// 待ち時間なしの設定
pub fn fast_settings() -> JobSettings {
    JobSettings {
        retry: RetryPolicy::fixed(3, Duration::ZERO),
        batch_delay: Duration::ZERO,
        ..JobSettings::default()
    }
}

pub fn record(id: &str, title: &str, stock: u64) -> CatalogRecord {
    CatalogRecord {
        stock,
        ..CatalogRecord::new(id, title)
    }
}

/// 受信済みイベントをすべて取り出す
pub fn drain(rx: &mut UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// 書き込みの最初の数回を台本どおりに失敗させるストア
pub struct FlakyStore {
    pub inner: MemoryCatalogStore,
    script: Mutex<VecDeque<StorageError>>,
    update_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(records: Vec<CatalogRecord>, script: Vec<StorageError>) -> Self {
        Self {
            inner: MemoryCatalogStore::new(records),
            script: Mutex::new(script.into()),
            update_calls: AtomicUsize::new(0),
        }
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogStore for FlakyStore {
    async fn list_all_products(&self) -> Result<Vec<CatalogRecord>, StorageError> {
        self.inner.list_all_products().await
    }

    async fn update_products_batch(&self, batch: &[UpdateInstruction]) -> Result<(), StorageError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().expect("script lock").pop_front();
        match scripted {
            Some(error) => Err(error),
            None => self.inner.update_products_batch(batch).await,
        }
    }
}
