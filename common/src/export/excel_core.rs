//! 照合レポートのExcel生成
//!
//! シート構成: 集計 / 照合済み / 未照合

use crate::error::{Error, Result};
use crate::report::ReconciliationResult;
use rust_xlsxwriter::*;
use std::path::Path;

const SUMMARY_SHEET: &str = "Summary";
const MATCHES_SHEET: &str = "Matches";
const UNMATCHED_SHEET: &str = "Unmatched";

/// レポートをバッファに生成
pub fn generate_report_buffer(result: &ReconciliationResult) -> std::result::Result<Vec<u8>, String> {
    let mut workbook = Workbook::new();

    let header_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0xF5F5F5))
        .set_border(FormatBorder::Hair)
        .set_border_color(Color::RGB(0xAAAAAA));

    // 集計
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(SUMMARY_SHEET)
            .map_err(|e| format!("シート名設定エラー: {}", e))?;
        sheet.set_column_width(0, 24.0)
            .map_err(|e| format!("列幅設定エラー: {}", e))?;

        let mode = match result.mode {
            crate::report::JobMode::Preview => "preview",
            crate::report::JobMode::Apply => "apply",
        };
        sheet.write_string_with_format(0, 0, "mode", &header_format)
            .map_err(|e| format!("書き込みエラー: {}", e))?;
        sheet.write_string(0, 1, mode)
            .map_err(|e| format!("書き込みエラー: {}", e))?;

        let counts: [(&str, usize); 8] = [
            ("updated", result.updated),
            ("notFound", result.not_found),
            ("setToZero", result.set_to_zero),
            ("errors", result.errors),
            ("totalRows", result.total_rows),
            ("matchedRows", result.matched_rows),
            ("skippedRows", result.skipped_rows),
            ("failedBatches", result.failed_batches),
        ];
        for (i, (label, value)) in counts.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_string_with_format(row, 0, *label, &header_format)
                .map_err(|e| format!("書き込みエラー: {}", e))?;
            sheet.write_number(row, 1, *value as f64)
                .map_err(|e| format!("書き込みエラー: {}", e))?;
        }

        let mut row = counts.len() as u32 + 2;
        for message in &result.error_messages {
            sheet.write_string(row, 0, message)
                .map_err(|e| format!("書き込みエラー: {}", e))?;
            row += 1;
        }
    }

    // 照合済み
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(MATCHES_SHEET)
            .map_err(|e| format!("シート名設定エラー: {}", e))?;
        let headers = ["row", "incoming name", "catalog id", "catalog title", "match type", "similarity", "quantity"];
        write_headers(sheet, &headers, &header_format)?;

        for (i, m) in result.matches.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_number(row, 0, m.row as f64)
                .and_then(|s| s.write_string(row, 1, &m.incoming_name))
                .and_then(|s| s.write_string(row, 2, &m.catalog_id))
                .and_then(|s| s.write_string(row, 3, &m.matched_title))
                .and_then(|s| s.write_string(row, 4, m.match_type.as_str()))
                .and_then(|s| s.write_number(row, 6, m.quantity as f64))
                .map_err(|e| format!("書き込みエラー: {}", e))?;
            if let Some(score) = m.similarity {
                sheet.write_number(row, 5, score)
                    .map_err(|e| format!("書き込みエラー: {}", e))?;
            }
        }
    }

    // 未照合
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(UNMATCHED_SHEET)
            .map_err(|e| format!("シート名設定エラー: {}", e))?;
        let headers = ["row", "incoming name", "quantity", "suggestions"];
        write_headers(sheet, &headers, &header_format)?;

        for (i, u) in result.unmatched.iter().enumerate() {
            let row = i as u32 + 1;
            let suggestions = u
                .suggestions
                .iter()
                .map(|s| format!("{} ({:.2})", s.title, s.score))
                .collect::<Vec<_>>()
                .join("; ");
            sheet.write_number(row, 0, u.row as f64)
                .and_then(|s| s.write_string(row, 1, &u.incoming_name))
                .and_then(|s| s.write_number(row, 2, u.quantity as f64))
                .and_then(|s| s.write_string(row, 3, &suggestions))
                .map_err(|e| format!("書き込みエラー: {}", e))?;
        }
    }

    workbook.save_to_buffer()
        .map_err(|e| format!("Excel保存エラー: {}", e))
}

fn write_headers(
    sheet: &mut Worksheet,
    headers: &[&str],
    format: &Format,
) -> std::result::Result<(), String> {
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, format)
            .map_err(|e| format!("ヘッダー書き込みエラー: {}", e))?;
    }
    Ok(())
}

/// レポートをファイルに保存
pub fn save_report(result: &ReconciliationResult, path: &Path) -> Result<()> {
    let buffer = generate_report_buffer(result).map_err(Error::Export)?;
    std::fs::write(path, buffer)?;
    Ok(())
}
