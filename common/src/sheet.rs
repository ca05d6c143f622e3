//! シート構造の自動検出
//!
//! 先頭15行からヘッダー行・商品名列・数量列を探し、
//! データ開始行を決定する。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 走査する最大行数
pub const SCAN_ROWS: usize = 15;

/// 商品名列の見出し（部分一致）
pub const NAME_MARKERS: &[&str] = &[
    "номенклатура",
    "наименование",
    "название",
    "товар",
    "product",
    "name",
];

/// 数量列の見出し（部分一致）
pub const QUANTITY_MARKERS: &[&str] = &[
    "остаток",
    "остатки",
    "количество",
    "кол-во",
    "stock",
    "qty",
    "quantity",
];

/// データ区画の目印（この行の次からデータ）
pub const DATA_SECTION_MARKERS: &[&str] = &["магазин", "склад"];

/// 検出されたシート構造
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetLayout {
    pub header_row: usize,
    pub name_col: usize,
    pub qty_col: usize,
    pub data_start_row: usize,
}

/// 検出失敗（例外ではなく結果として返す）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionFailure {
    #[error("ヘッダー行が見つかりません（先頭{0}行を走査）")]
    HeaderNotFound(usize),

    #[error("商品名の列が見つかりません")]
    NameColumnNotFound,

    #[error("数量（остаток）の列が見つかりません")]
    QuantityColumnNotFound,
}

/// グリッドからシート構造を検出する
pub fn detect(grid: &[Vec<String>]) -> Result<SheetLayout, DetectionFailure> {
    let mut name_col: Option<usize> = None;
    let mut qty_col: Option<usize> = None;
    let mut header_row: Option<usize> = None;

    for (row_idx, row) in grid.iter().take(SCAN_ROWS).enumerate() {
        let (row_name, row_qty) = scan_row(row);

        // 同じ行で両方そろえばその行の列を採用
        if let (Some(n), Some(q)) = (row_name, row_qty) {
            name_col = Some(n);
            qty_col = Some(q);
            header_row = Some(row_idx);
            break;
        }

        name_col = name_col.or(row_name);
        qty_col = qty_col.or(row_qty);
        if name_col.is_some() && qty_col.is_some() {
            header_row = Some(row_idx);
            break;
        }
    }

    let (header_row, name_col, qty_col) = match (header_row, name_col, qty_col) {
        (Some(h), Some(n), Some(q)) => (h, n, q),
        (_, None, None) => return Err(DetectionFailure::HeaderNotFound(SCAN_ROWS)),
        (_, None, _) => return Err(DetectionFailure::NameColumnNotFound),
        (_, _, None) => return Err(DetectionFailure::QuantityColumnNotFound),
        // 両方の列が見つかった時点でヘッダー行は確定する
        (None, Some(_), Some(_)) => return Err(DetectionFailure::HeaderNotFound(SCAN_ROWS)),
    };

    let data_start_row = find_data_section(grid, header_row).unwrap_or(header_row + 1);

    Ok(SheetLayout {
        header_row,
        name_col,
        qty_col,
        data_start_row,
    })
}

/// 1行分の見出しセルを走査（最初に見つかった列）
fn scan_row(row: &[String]) -> (Option<usize>, Option<usize>) {
    let mut name_col = None;
    let mut qty_col = None;

    for (col_idx, cell) in row.iter().enumerate() {
        let text = cell.trim().to_lowercase();
        if text.is_empty() {
            continue;
        }

        // "Количество товара" のようなセルは数量列を優先
        if contains_any(&text, QUANTITY_MARKERS) {
            qty_col = qty_col.or(Some(col_idx));
        } else if contains_any(&text, NAME_MARKERS) {
            name_col = name_col.or(Some(col_idx));
        }
    }

    (name_col, qty_col)
}

/// ヘッダー以降で「магазин」「склад」を含む行の次の行
fn find_data_section(grid: &[Vec<String>], header_row: usize) -> Option<usize> {
    grid.iter()
        .enumerate()
        .skip(header_row + 1)
        .take(SCAN_ROWS)
        .find(|(_, row)| {
            let joined = row.join(" ").to_lowercase();
            contains_any(&joined, DATA_SECTION_MARKERS)
        })
        .map(|(idx, _)| idx + 1)
}

fn contains_any(text: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| text.contains(m))
}
