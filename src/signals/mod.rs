//! 照合シグナルの取得元
//!
//! ランドマーク・埋め込み・Vision の3つの外部サービスを trait で抽象化する。
//! 実装は HTTP クライアントだが、テストでは任意の実装に差し替えられる。

mod embedding;
mod landmark;
mod vision;

pub use embedding::EmbeddingClient;
pub use landmark::LandmarkClient;
pub use vision::VisionClient;

use crate::config::Config;
use crate::error::{MatchError, Result};
use crate::scanner::QueryImage;
use async_trait::async_trait;
use phenotype_match_common::{Embedding, FaceLandmarks, VisionVerdict};
use std::sync::Arc;

/// 顔ランドマーク検出
#[async_trait]
pub trait LandmarkSource: Send + Sync {
    async fn detect(&self, image: &QueryImage) -> Result<FaceLandmarks>;
}

/// 顔埋め込みベクトル
#[async_trait]
pub trait EmbeddingSource: Send + Sync {
    async fn embed(&self, image: &QueryImage) -> Result<Embedding>;
}

/// Vision LLM による候補判定
#[async_trait]
pub trait VisionSource: Send + Sync {
    async fn classify(&self, image: &QueryImage, labels: &[&str], top_k: usize) -> Result<VisionVerdict>;
}

/// 照合器に渡すシグナル取得元一式
#[derive(Clone, Default)]
pub struct SignalSources {
    pub landmarks: Option<Arc<dyn LandmarkSource>>,
    pub embedding: Option<Arc<dyn EmbeddingSource>>,
    pub vision: Option<Arc<dyn VisionSource>>,
}

impl SignalSources {
    /// 設定から HTTP クライアントを組み立てる
    ///
    /// APIキーが無ければ Vision は無効（警告のみ）。
    pub fn from_config(config: &Config) -> Result<Self> {
        let vision: Option<Arc<dyn VisionSource>> = match config.get_api_key() {
            Ok(key) => Some(Arc::new(VisionClient::new(
                &config.vision_endpoint,
                &config.vision_model,
                key,
            )?)),
            Err(MatchError::MissingApiKey) => {
                tracing::warn!("APIキー未設定のため Vision シグナルを使用しません");
                None
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            landmarks: Some(Arc::new(LandmarkClient::new(&config.landmark_endpoint)?)),
            embedding: Some(Arc::new(EmbeddingClient::new(
                &config.embedding_endpoint,
                config.embedding_dim,
            )?)),
            vision,
        })
    }
}

pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| MatchError::Config(format!("HTTPクライアントの初期化に失敗: {}", e)))
}
