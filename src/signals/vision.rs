use super::{http_client, VisionSource};
use crate::error::{MatchError, Result};
use crate::scanner::QueryImage;
use async_trait::async_trait;
use phenotype_match_common::{build_vision_prompt, parse_vision_response, VisionVerdict};
use serde::{Deserialize, Serialize};

/// Gemini generateContent リクエスト
#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GeminiResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .filter(|t| !t.trim().is_empty())
    }
}

/// Vision LLM（Gemini互換）のクライアント
pub struct VisionClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl VisionClient {
    pub fn new(endpoint: &str, model: &str, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }

    fn url(&self) -> String {
        format!("{}/{}:generateContent", self.endpoint, self.model)
    }

    async fn call_api(&self, request: &GeminiRequest) -> Result<String> {
        let response = self
            .client
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .json(request)
            .send()
            .await
            .map_err(|e| MatchError::VisionServiceUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            tracing::debug!(%status, body = %text, "Vision API エラー応答");
            return Err(MatchError::VisionServiceUnavailable(format!("status {}", status)));
        }

        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| MatchError::MalformedJson(e.to_string()))?;

        body.first_text().ok_or(MatchError::NoResponse)
    }
}

#[async_trait]
impl VisionSource for VisionClient {
    async fn classify(&self, image: &QueryImage, labels: &[&str], top_k: usize) -> Result<VisionVerdict> {
        let prompt = build_vision_prompt(labels, top_k);

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: prompt },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: QueryImage::MIME_TYPE.to_string(),
                            data: image.to_base64(),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                response_mime_type: "application/json".to_string(),
            },
        };

        let text = self.call_api(&request).await?;

        let parsed = parse_vision_response(&text, top_k).map_err(|e| {
            tracing::warn!(error = %e, "Vision 応答をパースできません");
            MatchError::MalformedJson(e.to_string())
        })?;

        if parsed.repaired {
            tracing::info!("途切れた Vision 応答を修復しました");
        }
        if parsed.dropped_entries > 0 {
            tracing::debug!(dropped = parsed.dropped_entries, "不正な候補を除外");
        }

        Ok(parsed.verdict)
    }
}
