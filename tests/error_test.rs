//! エラーケーステスト
//!
//! 入力不正・権限なしは書き込み前に失敗し、失敗イベントで通知されることを検証

mod common;

use common::{drain, fast_settings, record, xlsx};
use std::sync::Arc;
use stock_sync::progress::{self, ProgressEvent};
use stock_sync::{Caller, JobOptions, MemoryCatalogStore, Reconciler, StockSyncError, Upload};
use stock_sync_common::DetectionFailure;

async fn run_failing(caller: Caller, upload: Upload) -> (StockSyncError, Vec<ProgressEvent>, Arc<MemoryCatalogStore>) {
    let store = Arc::new(MemoryCatalogStore::new(vec![record("p1", "Хмель Cascade", 3)]));
    let reconciler = Reconciler::new(Arc::clone(&store), fast_settings());
    let (tx, mut rx) = progress::channel();

    let err = reconciler
        .run(&caller, upload, JobOptions::apply(true), tx)
        .await
        .unwrap_err();
    (err, drain(&mut rx), store)
}

fn assert_failure_event(events: &[ProgressEvent]) {
    let last = events.last().expect("at least one event");
    assert!(last.is_terminal());
    assert_eq!(last.progress, 0);
    assert!(last.error().is_some());
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

/// 拡張子が表計算形式でない
#[tokio::test]
async fn test_wrong_extension_rejected_before_parsing() {
    let (err, events, store) = run_failing(
        Caller::admin("test"),
        Upload::new("stock.csv", b"name;qty\n".to_vec()),
    )
    .await;

    assert!(matches!(err, StockSyncError::InvalidFileType(_)));
    assert!(err.is_input_error());
    assert_failure_event(&events);
    assert!(store.committed_batches().is_empty());
}

/// 壊れたファイル
#[tokio::test]
async fn test_corrupt_workbook() {
    let (err, events, store) = run_failing(
        Caller::admin("test"),
        Upload::new("stock.xlsx", b"definitely not a zip".to_vec()),
    )
    .await;

    assert!(matches!(err, StockSyncError::Decode(_)));
    assert_failure_event(&events);
    assert!(store.committed_batches().is_empty());
}

/// 空のファイル
#[tokio::test]
async fn test_empty_upload() {
    let (err, events, _) = run_failing(Caller::admin("test"), Upload::new("stock.xlsx", Vec::new())).await;

    assert!(matches!(err, StockSyncError::EmptyFile(_)));
    assert_failure_event(&events);
}

/// 数量列が無い
#[tokio::test]
async fn test_missing_quantity_column() {
    let bytes = xlsx(&[&["Наименование", "Цена"], &["Хмель Cascade", "250"]]);
    let (err, events, store) = run_failing(Caller::admin("test"), Upload::new("stock.xlsx", bytes)).await;

    assert!(matches!(
        err,
        StockSyncError::Structure(DetectionFailure::QuantityColumnNotFound)
    ));
    assert_failure_event(&events);
    assert_eq!(store.stock_of("p1"), Some(3));
}

/// 管理者でない呼び出し元も、失敗イベントとして通知される
#[tokio::test]
async fn test_unauthorized_reported_through_channel() {
    let bytes = xlsx(&[&["Наименование", "Остаток"], &["Хмель Cascade", "5"]]);
    let (err, events, store) = run_failing(Caller::viewer("guest"), Upload::new("stock.xlsx", bytes)).await;

    assert!(matches!(err, StockSyncError::Unauthorized(_)));
    assert!(!err.is_input_error());
    assert_failure_event(&events);
    assert!(store.committed_batches().is_empty());
}
