use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "phenotype-match")]
#[command(about = "顔写真からの表現型ハイブリッド照合エンジン", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 設定ファイル（デフォルト: ~/.config/phenotype-match/config.json）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 1枚の顔写真をカタログと照合
    Match {
        /// 顔写真のパス
        #[arg(required = true)]
        image: PathBuf,

        /// 参照カタログJSONファイル
        #[arg(short, long)]
        catalog: PathBuf,

        /// 上位N件を出力（デフォルト: 設定値）
        #[arg(short = 'n', long)]
        top_n: Option<usize>,

        /// 出力JSONファイル（省略時は標準出力）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 表示形式 (table/json)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,

        /// Vision シグナルを使わない
        #[arg(long)]
        no_vision: bool,
    },

    /// フォルダ内の写真を順に照合してJSONを出力
    Batch {
        /// 写真フォルダのパス
        #[arg(required = true)]
        folder: PathBuf,

        /// 参照カタログJSONファイル
        #[arg(short, long)]
        catalog: PathBuf,

        /// 出力JSONファイル（デフォルト: 入力フォルダ/matches.json）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 上位N件
        #[arg(short = 'n', long)]
        top_n: Option<usize>,

        /// Vision シグナルを使わない
        #[arg(long)]
        no_vision: bool,
    },

    /// カタログの内容とシグナル充足状況を表示
    Catalog {
        /// 参照カタログJSONファイル
        #[arg(required = true)]
        file: PathBuf,
    },

    /// 設定を表示/編集
    Config {
        /// APIキーを設定
        #[arg(long)]
        set_api_key: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" | "t" => Ok(OutputFormat::Table),
            "json" | "j" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use table or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
