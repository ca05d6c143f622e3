use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stock-sync")]
#[command(about = "在庫表と商品カタログの照合・在庫一括反映ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 在庫表を照合してカタログに在庫を反映
    Sync {
        /// 在庫表（xlsx/xlsm/xlsb/xls/ods）
        #[arg(required = true)]
        file: PathBuf,

        /// カタログJSON（省略時は設定ファイルの値）
        #[arg(short, long)]
        catalog: Option<PathBuf>,

        /// 在庫表に無い商品を在庫0にする
        #[arg(short = 'z', long)]
        set_missing_to_zero: bool,

        /// 進捗をJSON（1行1イベント）で出力
        #[arg(long)]
        json: bool,

        /// 結果レポートの出力先
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// レポート形式 (excel/json)
        #[arg(short, long, default_value = "excel")]
        format: ReportFormat,
    },

    /// 照合結果だけを確認（カタログは変更しない）
    Preview {
        /// 在庫表（xlsx/xlsm/xlsb/xls/ods）
        #[arg(required = true)]
        file: PathBuf,

        /// カタログJSON（省略時は設定ファイルの値）
        #[arg(short, long)]
        catalog: Option<PathBuf>,

        /// 在庫0化の対象件数も数える
        #[arg(short = 'z', long)]
        set_missing_to_zero: bool,

        /// 進捗をJSON（1行1イベント）で出力
        #[arg(long)]
        json: bool,

        /// 結果レポートの出力先
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// レポート形式 (excel/json)
        #[arg(short, long, default_value = "excel")]
        format: ReportFormat,
    },

    /// 在庫表のシート構造（ヘッダー行・列）を表示
    Detect {
        /// 在庫表
        #[arg(required = true)]
        file: PathBuf,
    },

    /// 設定を表示/編集
    Config {
        /// 既定のカタログJSONを設定
        #[arg(long)]
        set_catalog: Option<PathBuf>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Excel,
    Json,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Excel => "xlsx",
            ReportFormat::Json => "json",
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "excel" | "xlsx" => Ok(ReportFormat::Excel),
            "json" => Ok(ReportFormat::Json),
            _ => Err(format!("Unknown format: {}. Use excel or json", s)),
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportFormat::Excel => write!(f, "excel"),
            ReportFormat::Json => write!(f, "json"),
        }
    }
}
