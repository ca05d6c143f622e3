//! 在庫同期の型定義
//!
//! CLIとライブラリ利用側で共有される型:
//! - CatalogRecord: ストレージから読み込んだ商品
//! - UpdateInstruction: 1商品に対する在庫更新指示
//! - StockStatus / MatchType: 分類タグ

use serde::{Deserialize, Serialize};
use std::fmt;

/// カタログ商品（ジョブ中は不変のスナップショット）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRecord {
    /// 文字列・数値のどちらのIDも文字列として保持
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub sku: String,

    #[serde(default)]
    pub stock: u64,
}

impl CatalogRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Unsigned(u64),
        Signed(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Unsigned(n) => n.to_string(),
        RawId::Signed(n) => n.to_string(),
    })
}

/// 在庫ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StockStatus {
    #[serde(rename = "MANY")]
    Many,
    #[serde(rename = "ENOUGH")]
    Enough,
    #[serde(rename = "NONE")]
    Empty,
}

impl StockStatus {
    /// 数量から分類（0 → NONE, 1..=10 → ENOUGH, 11以上 → MANY）
    pub fn classify(quantity: u64) -> Self {
        match quantity {
            0 => StockStatus::Empty,
            1..=10 => StockStatus::Enough,
            _ => StockStatus::Many,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::Many => "MANY",
            StockStatus::Enough => "ENOUGH",
            StockStatus::Empty => "NONE",
        }
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 在庫更新指示
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInstruction {
    pub catalog_id: String,
    pub new_stock: u64,
    pub in_stock: bool,
    pub stock_status: StockStatus,
}

impl UpdateInstruction {
    /// 数量から更新指示を導出
    pub fn for_quantity(catalog_id: impl Into<String>, quantity: u64) -> Self {
        Self {
            catalog_id: catalog_id.into(),
            new_stock: quantity,
            in_stock: quantity > 0,
            stock_status: StockStatus::classify(quantity),
        }
    }

    /// 在庫ゼロ化の指示
    pub fn zeroed(catalog_id: impl Into<String>) -> Self {
        Self::for_quantity(catalog_id, 0)
    }
}

/// 照合ティアのタグ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    PrefixRemoved,
    Keywords,
    Partial,
    Similarity,
    #[serde(rename = "none")]
    NoMatch,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::PrefixRemoved => "prefix_removed",
            MatchType::Keywords => "keywords",
            MatchType::Partial => "partial",
            MatchType::Similarity => "similarity",
            MatchType::NoMatch => "none",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
