use super::{http_client, LandmarkSource};
use crate::error::{MatchError, Result};
use crate::scanner::QueryImage;
use async_trait::async_trait;
use phenotype_match_common::FaceLandmarks;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LandmarkRequest {
    image: String,
    mime_type: &'static str,
}

#[derive(Deserialize)]
struct LandmarkResponse {
    #[serde(default)]
    faces: Vec<DetectedFace>,
}

#[derive(Deserialize)]
struct DetectedFace {
    landmarks: FaceLandmarks,
}

/// ランドマーク検出サービスのクライアント
///
/// `{"faces": [{"landmarks": {"noseTip": {"x":..,"y":..,"z":..}, ...}}]}` を受け取り、
/// 先頭の顔を採用する。
pub struct LandmarkClient {
    client: reqwest::Client,
    endpoint: String,
}

impl LandmarkClient {
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl LandmarkSource for LandmarkClient {
    async fn detect(&self, image: &QueryImage) -> Result<FaceLandmarks> {
        let request = LandmarkRequest {
            image: image.to_base64(),
            mime_type: QueryImage::MIME_TYPE,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| MatchError::LandmarkServiceUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MatchError::LandmarkServiceUnavailable(format!(
                "status {}",
                response.status()
            )));
        }

        let body: LandmarkResponse = response
            .json()
            .await
            .map_err(|e| MatchError::LandmarkServiceUnavailable(format!("不正なレスポンス: {}", e)))?;

        if body.faces.len() > 1 {
            tracing::debug!(faces = body.faces.len(), "複数の顔を検出、先頭を使用");
        }

        body.faces
            .into_iter()
            .next()
            .map(|f| f.landmarks)
            .filter(|l| !l.is_empty())
            .ok_or(MatchError::NoFaceDetected)
    }
}
