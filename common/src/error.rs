//! エラー型定義

use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// 修復を試みてもパースできなかった構造化レスポンス
    #[error("Malformed JSON response: {0}")]
    MalformedJson(String),

    #[error("Invalid embedding shape: expected {expected} dimensions, got {actual}")]
    InvalidEmbeddingShape { expected: usize, actual: usize },

    /// NaN や無限大を含む埋め込み
    #[error("Embedding has a non-finite value at index {index}")]
    NonFiniteEmbedding { index: usize },

    #[error("Embedding length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("Catalog is empty")]
    EmptyCatalog,

    #[error("Duplicate candidate id in catalog: {0}")]
    DuplicateCandidate(String),

    /// 全候補に対して利用可能なシグナルがひとつも無い
    #[error("No signal available for any candidate")]
    NoSignalAvailable,
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error = Error::Io(io_error);
        let display = format!("{}", error);
        assert!(display.contains("IO error"));
        assert!(display.contains("file not found"));
    }

    #[test]
    fn test_error_display_json() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error = Error::Json(json_error);
        assert!(format!("{}", error).contains("JSON error"));
    }

    #[test]
    fn test_error_display_shape() {
        let error = Error::InvalidEmbeddingShape { expected: 512, actual: 128 };
        assert_eq!(
            format!("{}", error),
            "Invalid embedding shape: expected 512 dimensions, got 128"
        );
    }

    #[test]
    fn test_error_display_length_mismatch() {
        let error = Error::LengthMismatch { left: 3, right: 4 };
        assert_eq!(format!("{}", error), "Embedding length mismatch: 3 vs 4");
    }

    #[test]
    fn test_error_display_non_finite() {
        let error = Error::NonFiniteEmbedding { index: 2 };
        assert_eq!(
            format!("{}", error),
            "Embedding has a non-finite value at index 2"
        );
    }

    #[test]
    fn test_error_from_json() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: Error = json_error.into();
        assert!(matches!(error, Error::Json(_)));
    }

    #[test]
    fn test_no_signal_is_distinct() {
        let error = Error::NoSignalAvailable;
        let debug = format!("{:?}", error);
        assert!(debug.contains("NoSignalAvailable"));
    }
}
