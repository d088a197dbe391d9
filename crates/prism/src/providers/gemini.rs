//! Gemini-compatible streaming generation client

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::debug;

use super::types::{GenerateContentBody, UpstreamRequest};
use super::{ByteStream, GenerationProvider, UpstreamError};
use crate::config::{ConfigError, PrismConfig, ProviderConfig};
use crate::network::TimeoutConfig;

/// Longest error body kept in `UpstreamError::Status`
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Calls `{base_url}/v1beta/models/{model}:streamGenerateContent`
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(provider: &ProviderConfig, timeouts: &TimeoutConfig) -> Result<Self, ConfigError> {
        let api_key = provider.api_key().ok_or(ConfigError::MissingApiKey)?;

        // the overall request timeout is applied per task by the orchestrator
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect())
            .build()
            .map_err(|e| ConfigError::invalid_value("provider", e.to_string()))?;

        let endpoint = format!(
            "{}/v1beta/models/{}:streamGenerateContent",
            provider.base_url.trim_end_matches('/'),
            provider.model
        );

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.to_string(),
        })
    }

    pub fn from_config(config: &PrismConfig) -> Result<Self, ConfigError> {
        Self::new(&config.provider, &config.timeouts)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn stream_generate(&self, request: &UpstreamRequest) -> Result<ByteStream, UpstreamError> {
        let body = GenerateContentBody::from_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        debug!(endpoint = %self.endpoint, "upstream stream opened");
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(UpstreamError::from_reqwest))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Modality;
    use futures::TryStreamExt;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ENDPOINT_PATH: &str = "/v1beta/models/test-model:streamGenerateContent";

    fn provider_for(server: &MockServer) -> GeminiProvider {
        let config = ProviderConfig {
            api_key: Some("test-key".to_string()),
            base_url: format!("{}/", server.uri()),
            model: "test-model".to_string(),
            ..Default::default()
        };
        GeminiProvider::new(&config, &TimeoutConfig::default()).unwrap()
    }

    fn request() -> UpstreamRequest {
        UpstreamRequest {
            prompt: "a red fox".to_string(),
            modality: Modality::TextAndImage,
            aspect_ratio: "1:1".to_string(),
            image_size: "1k".to_string(),
        }
    }

    #[test]
    fn test_missing_api_key() {
        let err = GeminiProvider::new(&ProviderConfig::default(), &TimeoutConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));
    }

    #[test]
    fn test_endpoint_format() {
        let config = ProviderConfig {
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        let provider = GeminiProvider::new(&config, &TimeoutConfig::default()).unwrap();
        assert_eq!(
            provider.endpoint(),
            "https://aihubmix.com/gemini/v1beta/models/gemini-3-pro-image-preview:streamGenerateContent"
        );
    }

    #[tokio::test]
    async fn test_streams_response_body() {
        let server = MockServer::start().await;
        let body = r#"[{"candidates":[{"content":{"parts":[{"text":"hi"}]}}]}]"#;

        Mock::given(method("POST"))
            .and(path(ENDPOINT_PATH))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "contents": [{"role": "user", "parts": [{"text": "a red fox"}]}],
                "generationConfig": {"imageConfig": {"aspectRatio": "1:1"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let stream = provider.stream_generate(&request()).await.unwrap();
        let chunks: Vec<_> = stream.try_collect().await.unwrap();
        let received: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(received, body.as_bytes());
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        match provider.stream_generate(&request()).await {
            Err(UpstreamError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid api key");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let config = ProviderConfig {
            api_key: Some("k".to_string()),
            base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        let provider = GeminiProvider::new(&config, &TimeoutConfig::default()).unwrap();
        let result = provider.stream_generate(&request()).await;
        assert!(matches!(result, Err(UpstreamError::Connection(_))));
    }
}
