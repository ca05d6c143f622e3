//! スプレッドシートの読み込み
//!
//! ワークブックのバイト列を、先頭シートの文字列グリッドに変換する。

use crate::error::{Result, StockSyncError};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;
use std::path::Path;

/// 行 × 列 のセル文字列
pub type Grid = Vec<Vec<String>>;

/// 受け付ける拡張子
pub const SUPPORTED_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// バイト列 → グリッド
pub trait SheetDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Grid>;
}

/// 拡張子を検査（解析の前に行う）
pub fn check_extension(file_name: &str) -> Result<()> {
    let ext = Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(StockSyncError::InvalidFileType(file_name.to_string()))
    }
}

/// calamine による実装
#[derive(Debug, Clone, Copy, Default)]
pub struct CalamineDecoder;

impl SheetDecoder for CalamineDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Grid> {
        let cursor = Cursor::new(bytes.to_vec());
        let mut workbook = open_workbook_auto_from_rs(cursor)
            .map_err(|e| StockSyncError::Decode(e.to_string()))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| StockSyncError::Decode("シートがありません".into()))?
            .map_err(|e| StockSyncError::Decode(e.to_string()))?;

        // Range は最初の使用セルから始まるので、シート上の行・列番号に揃える
        let (row_offset, col_offset) = range.start().unwrap_or((0, 0));
        let mut grid: Grid = vec![Vec::new(); row_offset as usize];
        grid.extend(range.rows().map(|row| {
            let mut cells = vec![String::new(); col_offset as usize];
            cells.extend(row.iter().map(cell_to_string));
            cells
        }));
        Ok(grid)
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => format_number(*f),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// 整数値の浮動小数は ".0" を付けない
fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_extension() {
        assert!(check_extension("stock.xlsx").is_ok());
        assert!(check_extension("STOCK.XLS").is_ok());
        assert!(check_extension("report.ods").is_ok());
        assert!(matches!(check_extension("stock.csv"), Err(StockSyncError::InvalidFileType(_))));
        assert!(check_extension("stock").is_err());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(12.0), "12");
        assert_eq!(format_number(12.5), "12.5");
        assert_eq!(format_number(-3.0), "-3");
    }

    #[test]
    fn test_cell_to_string() {
        assert_eq!(cell_to_string(&Data::Empty), "");
        assert_eq!(cell_to_string(&Data::String("Хмель".into())), "Хмель");
        assert_eq!(cell_to_string(&Data::Float(7.0)), "7");
        assert_eq!(cell_to_string(&Data::Int(42)), "42");
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = CalamineDecoder.decode(b"not a workbook");
        assert!(matches!(result, Err(StockSyncError::Decode(_))));
    }
}
