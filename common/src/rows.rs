//! データ行の抽出と数量の解析

use crate::normalizer::normalize;
use crate::sheet::{SheetLayout, NAME_MARKERS};
use regex::Regex;

lazy_static::lazy_static! {
    // 先頭の数値部分（"5 шт" の "5 "）
    static ref LEADING_NUMBER_RE: Regex = Regex::new(r"^-?[\d\s'’.,]+").unwrap();
}

/// 集計行などのノイズ名
const NOISE_NAMES: &[&str] = &["итого", "итог", "всего", "total"];

/// スプレッドシートの1データ行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRow {
    /// グリッド上の行番号（0始まり）
    pub row_index: usize,
    pub raw_name: String,
    pub raw_quantity: String,
}

/// 検出済みレイアウトに従ってデータ行を取り出す
///
/// 列が欠けているセルは空文字として扱う。
pub fn extract_rows(grid: &[Vec<String>], layout: &SheetLayout) -> Vec<IncomingRow> {
    grid.iter()
        .enumerate()
        .skip(layout.data_start_row)
        .map(|(row_index, row)| IncomingRow {
            row_index,
            raw_name: cell(row, layout.name_col),
            raw_quantity: cell(row, layout.qty_col),
        })
        .collect()
}

fn cell(row: &[String], col: usize) -> String {
    row.get(col).map(|c| c.trim().to_string()).unwrap_or_default()
}

/// 照合対象外の名前か判定
///
/// 空・2文字未満・集計行・ヘッダーの繰り返しはスキップする。
pub fn is_noise_name(raw_name: &str, header_name: &str) -> bool {
    let name = normalize(raw_name);
    if name.chars().count() < 2 {
        return true;
    }
    if NOISE_NAMES.iter().any(|n| name == *n || name.starts_with(&format!("{} ", n))) {
        return true;
    }
    if !header_name.is_empty() && name == normalize(header_name) {
        return true;
    }
    NAME_MARKERS.contains(&name.as_str())
}

/// 数量を解析する（失敗時は0）
///
/// - 先頭の数値部分だけを読む（"5 шт" → 5）
/// - 空白・アポストロフィは桁区切りとして除去
/// - ドットとカンマが併用されていれば後ろにある方が小数点
/// - 片方だけなら1個は小数点、複数あれば桁区切り
/// - 小数は切り捨て、負数は0
pub fn parse_quantity(raw: &str) -> u64 {
    let Some(number) = LEADING_NUMBER_RE.find(raw.trim()) else {
        return 0;
    };
    let compact: String = number
        .as_str()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'' && *c != '’')
        .collect();
    let compact = compact.trim_end_matches(['.', ',']);
    if compact.is_empty() {
        return 0;
    }

    let decimal = match (compact.rfind('.'), compact.rfind(',')) {
        (Some(dot), Some(comma)) if dot > comma => compact.replace(',', ""),
        (Some(_), Some(_)) => compact.replace('.', "").replace(',', "."),
        (Some(_), None) if compact.matches('.').count() > 1 => compact.replace('.', ""),
        (None, Some(_)) if compact.matches(',').count() > 1 => compact.replace(',', ""),
        (None, Some(_)) => compact.replace(',', "."),
        _ => compact.to_string(),
    };

    match decimal.parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => value.floor() as u64,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("1 234,5"), 1234);
        assert_eq!(parse_quantity("abc"), 0);
        assert_eq!(parse_quantity(""), 0);
        assert_eq!(parse_quantity("12"), 12);
        assert_eq!(parse_quantity("7.9"), 7);
        assert_eq!(parse_quantity("-5"), 0);
        assert_eq!(parse_quantity("1,234.5"), 1234);
        assert_eq!(parse_quantity("1\u{a0}000"), 1000);
        assert_eq!(parse_quantity("NaN"), 0);
    }

    #[test]
    fn test_parse_quantity_with_unit_suffix() {
        assert_eq!(parse_quantity("5 шт"), 5);
        assert_eq!(parse_quantity("12 шт."), 12);
        assert_eq!(parse_quantity("5шт"), 5);
        assert_eq!(parse_quantity("2,5 кг"), 2);
        assert_eq!(parse_quantity("шт 5"), 0);
    }

    #[test]
    fn test_parse_quantity_mixed_separators() {
        assert_eq!(parse_quantity("1.234,5"), 1234);
        assert_eq!(parse_quantity("1,234.5"), 1234);
        assert_eq!(parse_quantity("1.234.567"), 1234567);
        assert_eq!(parse_quantity("1,234,567"), 1234567);
        assert_eq!(parse_quantity("1'234"), 1234);
        assert_eq!(parse_quantity("15."), 15);
    }

    #[test]
    fn test_is_noise_name() {
        assert!(is_noise_name("", "Номенклатура"));
        assert!(is_noise_name("x", "Номенклатура"));
        assert!(is_noise_name("Итого", "Номенклатура"));
        assert!(is_noise_name("ИТОГО по складу", "Номенклатура"));
        assert!(is_noise_name("Номенклатура", "Номенклатура"));
        assert!(is_noise_name("Наименование", ""));
        assert!(!is_noise_name("Хмель Cascade", "Номенклатура"));
        assert!(!is_noise_name("Итоговый набор", "Номенклатура"));
    }

    #[test]
    fn test_extract_rows() {
        let grid: Vec<Vec<String>> = vec![
            vec!["Товар".into(), "Остаток".into()],
            vec![" Хмель ".into(), "5".into()],
            vec!["Солод".into()],
        ];
        let layout = SheetLayout { header_row: 0, name_col: 0, qty_col: 1, data_start_row: 1 };
        let rows = extract_rows(&grid, &layout);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], IncomingRow { row_index: 1, raw_name: "Хмель".into(), raw_quantity: "5".into() });
        assert_eq!(rows[1].raw_quantity, "");
    }
}
