use thiserror::Error;

/// 照合全体のタイムアウトを表す `Timeout::signal`
pub const OVERALL: &str = "overall";

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("APIキーが設定されていません。`phenotype-match config --set-api-key YOUR_KEY` で設定してください")]
    MissingApiKey,

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("フォルダが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("画像読み込みエラー: {0}")]
    ImageLoad(String),

    #[error("ランドマークサービスに接続できません: {0}")]
    LandmarkServiceUnavailable(String),

    #[error("顔が検出されませんでした")]
    NoFaceDetected,

    #[error("埋め込みサービスに接続できません: {0}")]
    EmbeddingServiceUnavailable(String),

    #[error("埋め込みの次元数が不正: 期待値 {expected}, 実際 {actual}")]
    InvalidEmbeddingShape { expected: usize, actual: usize },

    #[error("Visionサービスに接続できません: {0}")]
    VisionServiceUnavailable(String),

    #[error("Visionサービスの応答が空です")]
    NoResponse,

    #[error("APIレスポンスのパースに失敗: {0}")]
    MalformedJson(String),

    #[error("{signal} がタイムアウトしました ({seconds}秒)")]
    Timeout { signal: &'static str, seconds: u64 },

    #[error("照合がキャンセルされました")]
    Cancelled,

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] phenotype_match_common::Error),
}

impl MatchError {
    /// 照合全体を止めず「そのシグナルは無い」として扱うエラーか
    ///
    /// 照合全体のタイムアウト（`signal == OVERALL`）は含まない。
    pub fn is_signal_absent(&self) -> bool {
        match self {
            MatchError::Timeout { signal, .. } => *signal != OVERALL,
            _ => matches!(
                self,
                MatchError::NoFaceDetected
                    | MatchError::LandmarkServiceUnavailable(_)
                    | MatchError::EmbeddingServiceUnavailable(_)
                    | MatchError::VisionServiceUnavailable(_)
                    | MatchError::NoResponse
                    | MatchError::MalformedJson(_)
            ),
        }
    }

    /// 再試行で回復しうる一時的な障害か
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MatchError::LandmarkServiceUnavailable(_)
                | MatchError::EmbeddingServiceUnavailable(_)
                | MatchError::VisionServiceUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MatchError>;
