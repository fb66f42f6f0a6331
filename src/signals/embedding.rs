use super::{http_client, EmbeddingSource};
use crate::error::{MatchError, Result};
use crate::scanner::QueryImage;
use async_trait::async_trait;
use phenotype_match_common::{Embedding, Error as CommonError};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddingRequest {
    image: String,
    mime_type: &'static str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// 顔埋め込みサービスのクライアント
pub struct EmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
    dimension: usize,
}

impl EmbeddingClient {
    pub fn new(endpoint: &str, dimension: usize) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            endpoint: endpoint.to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingSource for EmbeddingClient {
    async fn embed(&self, image: &QueryImage) -> Result<Embedding> {
        let request = EmbeddingRequest {
            image: image.to_base64(),
            mime_type: QueryImage::MIME_TYPE,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| MatchError::EmbeddingServiceUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MatchError::EmbeddingServiceUnavailable(format!(
                "status {}",
                response.status()
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| MatchError::EmbeddingServiceUnavailable(format!("不正なレスポンス: {}", e)))?;

        Embedding::with_dimension(body.embedding, self.dimension).map_err(|e| match e {
            CommonError::InvalidEmbeddingShape { expected, actual } => {
                MatchError::InvalidEmbeddingShape { expected, actual }
            }
            other => MatchError::Common(other),
        })
    }
}
