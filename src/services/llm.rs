use crate::core::config::Config;
use crate::core::state::InlineImage;
use crate::services::prompt::ImageRequest;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use thiserror::Error;

#[async_trait]
pub trait LlmClient: Send + Sync + Debug {
    /// Text generation constrained to `schema`; returns the raw JSON text.
    async fn generate_json(&self, prompt: &str, schema: &Value) -> Result<String>;

    /// One image for the request, or `None` when the model answered without an image.
    async fn generate_image(&self, request: &ImageRequest) -> Result<Option<InlineImage>>;
}

pub fn create_llm(config: &Config, api_key: &str) -> Result<Box<dyn LlmClient>> {
    let cfg = config.gemini()?;
    url::Url::parse(&cfg.base_url)
        .with_context(|| format!("Invalid Gemini base_url: {}", cfg.base_url))?;
    Ok(Box::new(GeminiClient::new(
        api_key,
        &cfg.base_url,
        &cfg.text_model,
        &cfg.image_model,
    )))
}

/// Remote failures, classified from the HTTP status and the structured error body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("daily quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("API key rejected: {0}")]
    InvalidCredential(String),

    #[error("Gemini API error {status}: {message}")]
    Service { status: u16, message: String },

    #[error("request to Gemini failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected Gemini response: {0}")]
    MalformedResponse(String),
}

// --- Gemini ---

#[derive(Debug)]
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    text_model: String,
    image_model: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: &str, base_url: &str, text_model: &str, image_model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            text_model: text_model.to_string(),
            image_model: image_model.to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn generate_content(&self, model: &str, body: &GeminiRequest) -> Result<GeminiResponse, ApiError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        log::debug!("POST {}", url);

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let response_text = resp.text().await?;

        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &response_text));
        }

        serde_json::from_str(&response_text).map_err(|e| {
            ApiError::MalformedResponse(format!("{}. Body: {}", e, response_text))
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<GeminiInlineData>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<GeminiImageConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiImageConfig {
    aspect_ratio: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    text: Option<String>,
    inline_data: Option<GeminiInlineData>,
}

#[derive(Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorBody,
}

#[derive(Deserialize)]
struct GeminiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<GeminiErrorDetail>,
}

#[derive(Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    violations: Vec<GeminiQuotaViolation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiQuotaViolation {
    #[serde(default)]
    quota_id: String,
}

/// Maps a non-success response to an [`ApiError`] using status codes and error details.
pub fn classify_error(http_status: u16, body: &str) -> ApiError {
    let envelope: GeminiErrorEnvelope = match serde_json::from_str(body) {
        Ok(e) => e,
        Err(_) => {
            return match http_status {
                401 => ApiError::InvalidCredential(body.to_string()),
                429 => ApiError::RateLimited(body.to_string()),
                _ => ApiError::Service {
                    status: http_status,
                    message: body.to_string(),
                },
            }
        }
    };
    let err = envelope.error;

    let key_invalid = err
        .details
        .iter()
        .any(|d| d.reason.as_deref() == Some("API_KEY_INVALID"));
    if key_invalid
        || http_status == 401
        || err.status == "UNAUTHENTICATED"
        || err.status == "PERMISSION_DENIED"
    {
        return ApiError::InvalidCredential(err.message);
    }

    if http_status == 429 || err.status == "RESOURCE_EXHAUSTED" {
        let daily = err
            .details
            .iter()
            .flat_map(|d| d.violations.iter())
            .any(|v| v.quota_id.contains("PerDay"));
        return if daily {
            ApiError::QuotaExhausted(err.message)
        } else {
            ApiError::RateLimited(err.message)
        };
    }

    ApiError::Service {
        status: http_status,
        message: err.message,
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate_json(&self, prompt: &str, schema: &Value) -> Result<String> {
        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: Some(prompt.to_string()),
                    inline_data: None,
                }],
            }],
            generation_config: GeminiGenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(schema.clone()),
                ..Default::default()
            },
        };

        let result = self.generate_content(&self.text_model, &request_body).await?;

        let first = result
            .candidates
            .first()
            .ok_or_else(|| ApiError::MalformedResponse("no candidates".to_string()))?;

        let text: String = first
            .content
            .iter()
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect();

        if text.trim().is_empty() {
            let reason = first.finish_reason.as_deref().unwrap_or("UNKNOWN");
            return Err(anyhow!(ApiError::MalformedResponse(format!(
                "empty text. Finish reason: {}",
                reason
            ))));
        }
        Ok(text)
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<Option<InlineImage>> {
        let mut parts = vec![GeminiPart {
            text: Some(request.prompt.clone()),
            inline_data: None,
        }];
        parts.extend(request.attachments.iter().map(|img| GeminiPart {
            text: None,
            inline_data: Some(GeminiInlineData {
                mime_type: img.mime_type.clone(),
                data: general_purpose::STANDARD.encode(&img.data),
            }),
        }));

        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts,
            }],
            generation_config: GeminiGenerationConfig {
                response_modalities: Some(vec!["IMAGE".to_string(), "TEXT".to_string()]),
                image_config: Some(GeminiImageConfig {
                    aspect_ratio: "16:9".to_string(),
                }),
                ..Default::default()
            },
        };

        let result = self.generate_content(&self.image_model, &request_body).await?;

        let inline = result
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().find_map(|p| p.inline_data));

        match inline {
            Some(data) => {
                let bytes = general_purpose::STANDARD
                    .decode(data.data.as_bytes())
                    .map_err(|e| ApiError::MalformedResponse(format!("bad image data: {}", e)))?;
                Ok(Some(InlineImage::new(data.mime_type, bytes)))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn client(server: &mockito::ServerGuard) -> GeminiClient {
        GeminiClient::new("test-key", &server.url(), "text-model", "image-model")
    }

    #[test]
    fn test_classify_daily_quota() {
        let body = r#"{"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED",
            "details": [{"@type": "type.googleapis.com/google.rpc.QuotaFailure",
                "violations": [{"quotaMetric": "generativelanguage.googleapis.com/generate_content_free_tier_requests",
                                "quotaId": "GenerateRequestsPerDayPerProjectPerModel-FreeTier"}]}]}}"#;
        assert!(matches!(classify_error(429, body), ApiError::QuotaExhausted(_)));
    }

    #[test]
    fn test_classify_short_term_rate_limit() {
        let body = r#"{"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED",
            "details": [{"@type": "type.googleapis.com/google.rpc.QuotaFailure",
                "violations": [{"quotaId": "GenerateRequestsPerMinutePerProjectPerModel-FreeTier"}]}]}}"#;
        assert!(matches!(classify_error(429, body), ApiError::RateLimited(_)));
        assert!(matches!(classify_error(429, "slow down"), ApiError::RateLimited(_)));
    }

    #[test]
    fn test_classify_invalid_key() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid. Please pass a valid API key.",
            "status": "INVALID_ARGUMENT",
            "details": [{"@type": "type.googleapis.com/google.rpc.ErrorInfo", "reason": "API_KEY_INVALID"}]}}"#;
        assert!(matches!(classify_error(400, body), ApiError::InvalidCredential(_)));
        let denied = r#"{"error": {"code": 403, "message": "denied", "status": "PERMISSION_DENIED"}}"#;
        assert!(matches!(classify_error(403, denied), ApiError::InvalidCredential(_)));
    }

    #[test]
    fn test_classify_other_errors() {
        // The message mentions quota, but only structured fields count.
        let body = r#"{"error": {"code": 500, "message": "quota backend unavailable", "status": "INTERNAL"}}"#;
        match classify_error(500, body) {
            ApiError::Service { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "quota backend unavailable");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(classify_error(503, "<html>"), ApiError::Service { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_generate_json_sends_schema() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let body = json!({
            "candidates": [{
                "content": {"parts": [{"text": "{\"characters\": [], "}, {"text": "\"scenes\": []}"}], "role": "model"},
                "finishReason": "STOP"
            }]
        });
        let mock = server
            .mock("POST", "/v1beta/models/text-model:generateContent")
            .match_header("x-goog-api-key", "test-key")
            .match_body(Matcher::PartialJson(json!({
                "generationConfig": {"responseMimeType": "application/json", "responseSchema": {"type": "OBJECT"}}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let text = client(&server)
            .generate_json("analyze", &json!({"type": "OBJECT"}))
            .await?;
        assert_eq!(text, "{\"characters\": [], \"scenes\": []}");
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_generate_json_blocked_response_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/text-model:generateContent")
            .with_status(200)
            .with_body(r#"{"candidates": [{"finishReason": "SAFETY", "index": 0}]}"#)
            .create_async()
            .await;

        let err = client(&server)
            .generate_json("analyze", &json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[tokio::test]
    async fn test_generate_image_roundtrips_attachments() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/image-model:generateContent")
            .match_body(Matcher::PartialJson(json!({
                "contents": [{"role": "user", "parts": [
                    {"text": "draw"},
                    {"inlineData": {"mimeType": "image/png", "data": "AQID"}}
                ]}],
                "generationConfig": {"responseModalities": ["IMAGE", "TEXT"], "imageConfig": {"aspectRatio": "16:9"}}
            })))
            .with_status(200)
            .with_body(
                json!({"candidates": [{"content": {"parts": [
                    {"text": "Here you go"},
                    {"inlineData": {"mimeType": "image/png", "data": "aGVsbG8="}}
                ]}}]})
                .to_string(),
            )
            .create_async()
            .await;

        let request = ImageRequest {
            prompt: "draw".to_string(),
            attachments: vec![InlineImage::new("image/png", vec![1, 2, 3])],
        };
        let image = client(&server).generate_image(&request).await?;
        assert_eq!(image, Some(InlineImage::new("image/png", b"hello".to_vec())));
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_generate_image_without_image_part() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/image-model:generateContent")
            .with_status(200)
            .with_body(r#"{"candidates": [{"content": {"parts": [{"text": "I cannot draw that"}]}}]}"#)
            .create_async()
            .await;

        let request = ImageRequest {
            prompt: "draw".to_string(),
            attachments: vec![],
        };
        assert!(client(&server).generate_image(&request).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_http_errors_surface_as_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/image-model:generateContent")
            .with_status(429)
            .with_body(r#"{"error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}}"#)
            .create_async()
            .await;

        let request = ImageRequest {
            prompt: "draw".to_string(),
            attachments: vec![],
        };
        let err = client(&server).generate_image(&request).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<ApiError>(), Some(ApiError::RateLimited(_))));
    }

    #[test]
    fn test_create_llm_rejects_bad_base_url() {
        let mut config = Config::default();
        config.llm.gemini.as_mut().unwrap().base_url = "not a url".to_string();
        assert!(create_llm(&config, "key").is_err());
        assert!(create_llm(&Config::default(), "key").is_ok());
    }
}
