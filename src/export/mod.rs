//! 照合結果レポートの書き出し

use crate::cli::ReportFormat;
use crate::error::Result;
use std::path::{Path, PathBuf};
use stock_sync_common::export::excel_core;
use stock_sync_common::ReconciliationResult;

const DEFAULT_STEM: &str = "stock-sync-report";

fn output_path_for_format(output: &Path, extension: &str) -> PathBuf {
    if output.is_dir() || output.extension().is_none() {
        output.join(format!("{}.{}", DEFAULT_STEM, extension))
    } else {
        output.to_path_buf()
    }
}

/// レポートを書き出し、実際の出力パスを返す
pub fn export_report(result: &ReconciliationResult, format: ReportFormat, output: &Path) -> Result<PathBuf> {
    let path = output_path_for_format(output, format.extension());
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    match format {
        ReportFormat::Excel => excel_core::save_report(result, &path)?,
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(result)?;
            std::fs::write(&path, json)?;
        }
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_directory_output_gets_default_name() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = export_report(&ReconciliationResult::default(), ReportFormat::Json, dir.path()).unwrap();
        assert_eq!(path, dir.path().join("stock-sync-report.json"));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"notFound\""));
    }

    #[test]
    fn test_excel_report_written() {
        let dir = tempdir().expect("Failed to create temp dir");
        let target = dir.path().join("result.xlsx");
        let path = export_report(&ReconciliationResult::default(), ReportFormat::Excel, &target).unwrap();
        assert_eq!(path, target);
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
