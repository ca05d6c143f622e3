use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use stock_sync::cli::{Cli, Commands, ReportFormat};
use stock_sync::codec::{check_extension, CalamineDecoder, SheetDecoder};
use stock_sync::config::Config;
use stock_sync::progress::{self, ProgressEvent};
use stock_sync::{export, Caller, JobOptions, JsonCatalogStore, Reconciler, Upload};
use stock_sync_common::ReconciliationResult;
use tokio::sync::mpsc::UnboundedReceiver;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);
    let config = Config::load()?;

    match cli.command {
        Commands::Sync { file, catalog, set_missing_to_zero, json, report, format } => {
            if !json {
                println!("📦 stock-sync - 在庫反映\n");
            }
            let options = JobOptions::apply(set_missing_to_zero);
            run_job(&config, &file, catalog, options, json, report, format).await?;
        }

        Commands::Preview { file, catalog, set_missing_to_zero, json, report, format } => {
            if !json {
                println!("🔍 stock-sync - 照合プレビュー（書き込みなし）\n");
            }
            let options = JobOptions::preview(set_missing_to_zero);
            run_job(&config, &file, catalog, options, json, report, format).await?;
        }

        Commands::Detect { file } => {
            let upload = Upload::from_path(&file)?;
            check_extension(&upload.file_name)?;
            let grid = CalamineDecoder.decode(&upload.bytes)?;
            let layout = stock_sync_common::detect(&grid)?;
            let cell = |row: usize, col: usize| {
                grid.get(row).and_then(|r| r.get(col)).map(String::as_str).unwrap_or("")
            };

            println!("シート構造:");
            println!("  ヘッダー行: {}", layout.header_row + 1);
            println!("  商品名列: {} ({})", layout.name_col + 1, cell(layout.header_row, layout.name_col));
            println!("  数量列: {} ({})", layout.qty_col + 1, cell(layout.header_row, layout.qty_col));
            println!("  データ開始行: {}", layout.data_start_row + 1);
            println!("  データ行数: {}", grid.len().saturating_sub(layout.data_start_row));
        }

        Commands::Config { set_catalog, show } => {
            let mut config = config;

            if let Some(path) = set_catalog {
                config.set_catalog_path(path)?;
                println!("✔ カタログを設定しました");
            }

            if show {
                println!("設定: {}", Config::config_path()?.display());
                println!(
                    "  カタログ: {}",
                    config
                        .catalog_path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "未設定".to_string())
                );
                println!("  バッチサイズ: {}", config.batch_size);
                println!("  最大再試行回数: {}", config.max_retries);
                println!("  再試行間隔: {}ms ({:?})", config.retry_delay_ms, config.retry_backoff);
                println!("  バッチ間隔: {}ms", config.batch_delay_ms);
                println!("  並列照合: {}", if config.parallel_matching { "有効" } else { "無効" });
            }
        }
    }

    Ok(())
}

fn init_logger(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();
}

async fn run_job(
    config: &Config,
    file: &Path,
    catalog: Option<PathBuf>,
    options: JobOptions,
    json: bool,
    report: Option<PathBuf>,
    format: ReportFormat,
) -> anyhow::Result<()> {
    let catalog_path = config.resolve_catalog(catalog)?;
    let upload = Upload::from_path(file)?;
    let store = Arc::new(JsonCatalogStore::new(catalog_path));
    let reconciler = Reconciler::new(store, config.job_settings());

    let caller = Caller::admin(std::env::var("USER").unwrap_or_else(|_| "cli".to_string()));
    let (tx, rx) = progress::channel();
    let (outcome, ()) = tokio::join!(
        reconciler.run(&caller, upload, options, tx),
        render_progress(rx, json)
    );
    let result = outcome.with_context(|| format!("{} の照合に失敗しました", file.display()))?;

    if !json {
        print_summary(&result);
    }

    if let Some(output) = report {
        let path = export::export_report(&result, format, &output)?;
        if !json {
            println!("✔ レポート出力: {}", path.display());
        }
    }

    Ok(())
}

/// 進捗イベントを描画（`--json` のときは1行1イベント）
async fn render_progress(mut rx: UnboundedReceiver<ProgressEvent>, json: bool) {
    if json {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => log::warn!("進捗イベントのJSON化に失敗: {}", e),
            }
        }
        return;
    }

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    while let Some(event) = rx.recv().await {
        if event.is_heartbeat() {
            continue;
        }
        if let Some(error) = event.error() {
            bar.abandon_with_message(format!("✖ {}", error));
            continue;
        }
        bar.set_position(u64::from(event.progress));
        bar.set_message(event.message.clone());
        if event.is_terminal() {
            bar.finish_with_message(event.message);
        }
    }
}

fn print_summary(result: &ReconciliationResult) {
    let verb = match result.mode {
        stock_sync_common::JobMode::Preview => "更新予定",
        stock_sync_common::JobMode::Apply => "更新",
    };

    println!();
    println!("結果:");
    println!("  データ行: {}（スキップ {}）", result.total_rows, result.skipped_rows);
    println!("  照合: {} / 未照合: {}", result.matched_rows, result.not_found);
    println!(
        "    完全一致 {} / 接頭辞除去 {} / キーワード {} / 部分一致 {} / 類似度 {}",
        result.match_types.exact,
        result.match_types.prefix_removed,
        result.match_types.keywords,
        result.match_types.partial,
        result.match_types.similarity
    );
    println!("  {}: {}件", verb, result.updated);
    if result.set_to_zero > 0 {
        println!("  在庫0化: {}件", result.set_to_zero);
    }

    if result.has_errors() {
        println!("  ⚠ 失敗バッチ: {}（{}件）", result.failed_batches, result.errors);
        for message in &result.error_messages {
            println!("    - {}", message);
        }
    }
    if result.cancelled {
        println!("  ⚠ 途中で中断されました");
    }

    if !result.unmatched.is_empty() {
        println!("\n未照合（先頭{}件）:", result.unmatched.len());
        for sample in &result.unmatched {
            let hint = sample
                .suggestions
                .first()
                .map(|s| format!(" → 候補: {} ({:.2})", s.title, s.score))
                .unwrap_or_default();
            println!("  {}行目: {}{}", sample.row, sample.incoming_name, hint);
        }
    }

    println!("\n✅ 完了");
}
