//! phenotype-match: 顔写真からの表現型ハイブリッド照合
//!
//! 照合ロジック本体は `phenotype_match_common`。このクレートは外部サービスの
//! クライアント、設定、並行取得とキャンセル、CLI を持つ。

pub mod cli;
pub mod config;
pub mod error;
pub mod matcher;
pub mod resilience;
pub mod scanner;
pub mod signals;
