use crate::error::{MatchError, Result};
use phenotype_match_common::{FusionWeights, MeasurementWeights, EMBEDDING_DIM};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Vision APIキーの環境変数
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub vision_endpoint: String,
    pub vision_model: String,
    pub landmark_endpoint: String,
    pub embedding_endpoint: String,
    pub embedding_dim: usize,
    pub landmark_timeout_secs: u64,
    pub embedding_timeout_secs: u64,
    pub vision_timeout_secs: u64,
    pub overall_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub vision_top_k: usize,
    pub default_top_n: usize,
    pub max_image_size: u32,
    pub fusion_weights: FusionWeights,
    pub measurement_weights: MeasurementWeights,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            vision_endpoint: "https://generativelanguage.googleapis.com/v1beta/models".into(),
            vision_model: "gemini-2.0-flash".into(),
            landmark_endpoint: "http://localhost:8090/landmarks".into(),
            embedding_endpoint: "http://localhost:8091/embed".into(),
            embedding_dim: EMBEDDING_DIM,
            landmark_timeout_secs: 30,
            embedding_timeout_secs: 30,
            vision_timeout_secs: 90,
            overall_timeout_secs: 150,
            max_retries: 1,
            retry_backoff_ms: 500,
            vision_top_k: 5,
            default_top_n: 10,
            max_image_size: 1568,
            fusion_weights: FusionWeights::default(),
            measurement_weights: MeasurementWeights::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// ファイルが無ければ既定値
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str::<Config>(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| MatchError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("phenotype-match").join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        self.fusion_weights
            .validate()
            .map_err(|e| MatchError::Config(e.to_string()))?;

        if self.embedding_dim == 0 {
            return Err(MatchError::Config("embedding_dim は1以上が必要です".into()));
        }
        for (name, secs) in [
            ("landmark_timeout_secs", self.landmark_timeout_secs),
            ("embedding_timeout_secs", self.embedding_timeout_secs),
            ("vision_timeout_secs", self.vision_timeout_secs),
            ("overall_timeout_secs", self.overall_timeout_secs),
        ] {
            if secs == 0 {
                return Err(MatchError::Config(format!("{} は1以上が必要です", name)));
            }
        }
        Ok(())
    }

    /// 環境変数を優先
    pub fn get_api_key(&self) -> Result<String> {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                return Ok(key);
            }
        }
        self.api_key.clone().ok_or(MatchError::MissingApiKey)
    }

    pub fn landmark_timeout(&self) -> Duration {
        Duration::from_secs(self.landmark_timeout_secs)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding_timeout_secs)
    }

    pub fn vision_timeout(&self) -> Duration {
        Duration::from_secs(self.vision_timeout_secs)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_timeout_secs)
    }
}
