//! 商品名の正規化
//!
//! 表記ゆれ（大文字小文字・引用符・ダッシュ・空白）を吸収し、
//! 照合に使う比較キーを生成する。

use regex::Regex;

lazy_static::lazy_static! {
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
    // 単語文字（キリル文字を含む）・ハイフン・空白以外
    static ref DISALLOWED_RE: Regex = Regex::new(r"[^\w\s\-]").unwrap();
    // 先頭の2〜3文字のトークン（ベンダーコード候補）
    static ref PREFIX_RE: Regex = Regex::new(r"^([a-zа-яё]{2,3})[\s\-]+(\S.*)$").unwrap();
    // 数量・重量・容量の注記（例: ", 100 шт", "100г", "0,5 л"）
    static ref UNIT_RE: Regex = Regex::new(
        r"(?:,\s*)?\d+(?:[.,]\d+)?\s*(?:упак|уп|пак|шт|кг|гр|г|мл|л|мм|см|м|pcs|pc|kg|gr|g|ml|l|oz)\b\.?"
    ).unwrap();
    // "3 в 1" / "2 in 1"
    static ref IN_RE: Regex = Regex::new(r"\b\d+\s*(?:в|in)\s*\d+\b").unwrap();
    // "(12)"
    static ref PAREN_NUM_RE: Regex = Regex::new(r"\(\s*\d+(?:[.,]\d+)?\s*\)").unwrap();
}

/// 商品名を比較用に正規化する
///
/// 小文字化 → 空白の圧縮 → 引用符・ダッシュをASCIIへ → 記号除去 → 空白の圧縮 → trim
pub fn normalize(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let collapsed = WHITESPACE_RE.replace_all(&lower, " ");
    let canonical: String = collapsed.chars().map(canonical_punctuation).collect();
    let stripped = DISALLOWED_RE.replace_all(&canonical, "");
    WHITESPACE_RE.replace_all(&stripped, " ").trim().to_string()
}

fn canonical_punctuation(c: char) -> char {
    match c {
        '«' | '»' | '“' | '”' | '„' | '‟' | '″' => '"',
        '‘' | '’' | '‚' | '‛' | '′' | '`' | '´' => '\'',
        '—' | '–' | '‒' | '―' | '−' | '‐' | '‑' => '-',
        _ => c,
    }
}

/// 母音を含むがベンダーコードとして扱う略号
const VENDOR_PREFIXES: &[&str] = &["ав", "ао", "ип", "ооо", "оао", "зао"];

const VOWELS: &str = "aeiouyаеёиоуыэюя";

/// 先頭のベンダーコードを除去（正規化済みの名前を前提）
///
/// 既知の略号か、母音を含まない2〜3文字のトークンだけを除去する。
/// "сок" "чай" のような普通の単語はそのまま返す。
pub fn strip_common_prefixes(normalized: &str) -> String {
    match PREFIX_RE.captures(normalized) {
        Some(cap) if is_vendor_code(&cap[1]) => cap[2].trim().to_string(),
        _ => normalized.to_string(),
    }
}

fn is_vendor_code(token: &str) -> bool {
    VENDOR_PREFIXES.contains(&token) || !token.chars().any(|c| VOWELS.contains(c))
}

/// 数量注記を取り除いたキーワード部分を返す
pub fn extract_keywords(normalized: &str) -> String {
    let without_units = UNIT_RE.replace_all(normalized, " ");
    let without_in = IN_RE.replace_all(&without_units, " ");
    let without_parens = PAREN_NUM_RE.replace_all(&without_in, " ");
    WHITESPACE_RE.replace_all(&without_parens, " ").trim().to_string()
}
