//! HTTPクライアントのテスト（mockito サーバ相手）

use mockito::Matcher;
use phenotype_match::error::MatchError;
use phenotype_match::scanner::QueryImage;
use phenotype_match::signals::{
    EmbeddingClient, EmbeddingSource, LandmarkClient, LandmarkSource, VisionClient, VisionSource,
};
use phenotype_match_common::{Error as CommonError, LandmarkPoint};
use serde_json::json;

fn query_image() -> QueryImage {
    QueryImage::from_jpeg_bytes("face.jpg", vec![0xFF, 0xD8, 0xFF, 0xE0])
}

// =============================================
// 埋め込み
// =============================================

#[tokio::test]
async fn test_embedding_success() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/embed")
        .match_body(Matcher::PartialJson(json!({"mimeType": "image/jpeg"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"embedding": [0.1, 0.2, 0.3, 0.4]}).to_string())
        .create_async()
        .await;

    let client = EmbeddingClient::new(&format!("{}/embed", server.url()), 4).unwrap();
    let embedding = client.embed(&query_image()).await.unwrap();

    assert_eq!(embedding.dim(), 4);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_embedding_wrong_dimension_is_hard_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/embed")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"embedding": [0.1, 0.2, 0.3]}).to_string())
        .create_async()
        .await;

    let client = EmbeddingClient::new(&format!("{}/embed", server.url()), 512).unwrap();
    let err = client.embed(&query_image()).await.unwrap_err();

    assert!(matches!(
        err,
        MatchError::InvalidEmbeddingShape { expected: 512, actual: 3 }
    ));
    assert!(!err.is_signal_absent());
}

#[tokio::test]
async fn test_embedding_overflowing_value_is_hard_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/embed")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"embedding": [1e39, 0.0, 0.0, 0.0]}"#)
        .create_async()
        .await;

    let client = EmbeddingClient::new(&format!("{}/embed", server.url()), 4).unwrap();
    let err = client.embed(&query_image()).await.unwrap_err();

    assert!(matches!(
        err,
        MatchError::Common(CommonError::NonFiniteEmbedding { index: 0 })
    ));
    assert!(!err.is_signal_absent());
}

#[tokio::test]
async fn test_embedding_server_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/embed")
        .with_status(503)
        .create_async()
        .await;

    let client = EmbeddingClient::new(&format!("{}/embed", server.url()), 4).unwrap();
    let err = client.embed(&query_image()).await.unwrap_err();

    assert!(matches!(err, MatchError::EmbeddingServiceUnavailable(_)));
    assert!(err.is_signal_absent());
}

#[tokio::test]
async fn test_embedding_connection_refused() {
    // 予約済みポート（接続先なし）
    let client = EmbeddingClient::new("http://127.0.0.1:9/embed", 4).unwrap();
    let err = client.embed(&query_image()).await.unwrap_err();
    assert!(matches!(err, MatchError::EmbeddingServiceUnavailable(_)));
}

// =============================================
// ランドマーク
// =============================================

#[tokio::test]
async fn test_landmarks_first_face() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/landmarks")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "faces": [
                    {"landmarks": {
                        "noseTip": {"x": 0.5, "y": 0.5, "z": 0.1},
                        "menton": {"x": 0.5, "y": 0.9},
                        "unknownPoint": {"x": 0.0, "y": 0.0}
                    }},
                    {"landmarks": {"noseTip": {"x": 0.1, "y": 0.1}}}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = LandmarkClient::new(&format!("{}/landmarks", server.url())).unwrap();
    let landmarks = client.detect(&query_image()).await.unwrap();

    assert_eq!(landmarks.len(), 2);
    let nose = landmarks.get(LandmarkPoint::NoseTip).unwrap();
    assert_eq!(nose.x, 0.5);
    assert_eq!(landmarks.get(LandmarkPoint::Menton).unwrap().z, 0.0);
}

#[tokio::test]
async fn test_landmarks_no_face() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/landmarks")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"faces": []}"#)
        .create_async()
        .await;

    let client = LandmarkClient::new(&format!("{}/landmarks", server.url())).unwrap();
    let err = client.detect(&query_image()).await.unwrap_err();

    assert!(matches!(err, MatchError::NoFaceDetected));
    assert!(err.is_signal_absent());
}

// =============================================
// Vision
// =============================================

fn gemini_body(text: &str) -> String {
    json!({
        "candidates": [
            {"content": {"parts": [{"text": text}]}}
        ]
    })
    .to_string()
}

#[tokio::test]
async fn test_vision_success() {
    let mut server = mockito::Server::new_async().await;
    let text = r#"{"analysis": "narrow face", "primary_region": "Northern Europe",
        "matches": [
            {"phenotype": "Nordid", "confidence": 82, "reasoning": "tall narrow face"},
            {"name": "Alpinid", "confidence": "40%"}
        ]}"#;
    let mock = server
        .mock("POST", "/models/test-model:generateContent")
        .match_query(Matcher::UrlEncoded("key".into(), "secret".into()))
        .match_body(Matcher::PartialJson(json!({
            "generationConfig": {"responseMimeType": "application/json"}
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(gemini_body(text))
        .create_async()
        .await;

    let client = VisionClient::new(
        &format!("{}/models/", server.url()),
        "test-model",
        "secret".into(),
    )
    .unwrap();
    let verdict = client
        .classify(&query_image(), &["Nordid", "Alpinid", "Dinarid"], 5)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(verdict.analysis, "narrow face");
    assert_eq!(verdict.primary_region.as_deref(), Some("Northern Europe"));
    assert_eq!(verdict.matches.len(), 2);
    assert_eq!(verdict.matches[0].name, "Nordid");
    assert_eq!(verdict.matches[1].confidence, 40.0);
}

#[tokio::test]
async fn test_vision_truncated_response_is_repaired() {
    let mut server = mockito::Server::new_async().await;
    let text = r#"{"analysis": "ok", "matches": [{"phenotype": "Nordid", "confidence": 70}, {"phenotype": "Alpi"#;
    server
        .mock("POST", "/models/m:generateContent")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(gemini_body(text))
        .create_async()
        .await;

    let client = VisionClient::new(&format!("{}/models", server.url()), "m", "k".into()).unwrap();
    let verdict = client
        .classify(&query_image(), &["Nordid", "Alpinid"], 5)
        .await
        .unwrap();

    assert_eq!(verdict.matches.len(), 1);
    assert_eq!(verdict.matches[0].name, "Nordid");
}

#[tokio::test]
async fn test_vision_empty_response() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/models/m:generateContent")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"candidates": []}"#)
        .create_async()
        .await;

    let client = VisionClient::new(&format!("{}/models", server.url()), "m", "k".into()).unwrap();
    let err = client.classify(&query_image(), &["Nordid"], 5).await.unwrap_err();

    assert!(matches!(err, MatchError::NoResponse));
    assert!(err.is_signal_absent());
}

#[tokio::test]
async fn test_vision_garbage_is_malformed() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/models/m:generateContent")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(gemini_body("I cannot help with that."))
        .create_async()
        .await;

    let client = VisionClient::new(&format!("{}/models", server.url()), "m", "k".into()).unwrap();
    let err = client.classify(&query_image(), &["Nordid"], 5).await.unwrap_err();

    assert!(matches!(err, MatchError::MalformedJson(_)));
    assert!(err.is_signal_absent());
}

#[tokio::test]
async fn test_vision_http_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/models/m:generateContent")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_body("quota exceeded")
        .create_async()
        .await;

    let client = VisionClient::new(&format!("{}/models", server.url()), "m", "k".into()).unwrap();
    let err = client.classify(&query_image(), &["Nordid"], 5).await.unwrap_err();

    assert!(matches!(err, MatchError::VisionServiceUnavailable(_)));
}
