//! Stock Sync Common Library
//!
//! 在庫表と商品カタログの照合ロジック（I/Oを持たない部分）

pub mod types;
pub mod error;
pub mod normalizer;
pub mod similarity;
pub mod matcher;
pub mod sheet;
pub mod rows;
pub mod report;
pub mod export;

pub use types::{CatalogRecord, MatchType, StockStatus, UpdateInstruction};
pub use error::{Error, Result};
pub use normalizer::{extract_keywords, normalize, strip_common_prefixes};
pub use similarity::{edit_distance_similarity, similarity};
pub use matcher::{CascadingMatcher, CatalogIndex, MatchResult, MatchTier, MatcherConfig};
pub use sheet::{detect, DetectionFailure, SheetLayout};
pub use rows::{extract_rows, is_noise_name, parse_quantity, IncomingRow};
pub use report::{
    JobMode, MatchSample, MatchTypeCounts, ReconciliationResult, ReportBuilder, Suggestion,
    UnmatchedSample, DEFAULT_SAMPLE_LIMIT,
};
