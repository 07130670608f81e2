// Chat-completions client for the vision AI tier
use crate::application::detection_services::VisionAnalysisService;
use crate::application::image_preprocessor::EncodedImage;
use crate::domain::defect::SourceTier;
use crate::domain::error::AnalysisError;
use anyhow::Context;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};

const TIER: SourceTier = SourceTier::RemoteVisionAi;
const MAX_TOKENS: u32 = 1500;

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpVisionClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpVisionClient {
    pub fn new(endpoint: &str, api_key: &str, model: &str) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .build()
            .context("Failed to build vision AI HTTP client")?;

        Ok(Self {
            http_client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    fn request_body(&self, image: &EncodedImage, prompt: &str) -> Value {
        let data_url = format!(
            "data:{};base64,{}",
            image.mime_type,
            general_purpose::STANDARD.encode(&image.bytes)
        );

        json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "response_format": { "type": "json_object" },
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": data_url, "detail": "high" } }
                ]
            }]
        })
    }
}

fn first_message(response: CompletionResponse) -> Result<String, AnalysisError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| AnalysisError::malformed(TIER, "completion carried no message content"))
}

#[async_trait]
impl VisionAnalysisService for HttpVisionClient {
    async fn describe(&self, image: &EncodedImage, prompt: &str) -> Result<String, AnalysisError> {
        tracing::debug!(
            "Sending {}x{} {} ({} bytes) to vision model {}",
            image.width,
            image.height,
            image.mime_type,
            image.bytes.len(),
            self.model
        );

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(image, prompt))
            .send()
            .await
            .map_err(|e| AnalysisError::unavailable(TIER, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::unavailable(TIER, format!("HTTP {}: {}", status, body)));
        }

        let completion = response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| AnalysisError::malformed(TIER, e.to_string()))?;
        first_message(completion)
    }
}
