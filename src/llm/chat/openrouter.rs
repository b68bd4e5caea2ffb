use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, error, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE } };
use serde::{ Deserialize, Serialize };
use serde_json::Value;

use super::{ BoxError, ByteStream, ChatClient };
use crate::error::RelayError;
use crate::llm::UpstreamConfig;
use crate::models::chat::ChatMessage;

pub const RATE_LIMIT_CODE: u64 = 429;

pub struct OpenRouterChatClient {
    http: HttpClient,
    config: UpstreamConfig,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct UpstreamErrorBody {
    error: Option<UpstreamErrorDetail>,
}

#[derive(Deserialize)]
struct UpstreamErrorDetail {
    code: Option<Value>,
}

/// True when an error body reports `error.code == 429`. Bodies that are not
/// JSON are never rate limits.
pub fn is_rate_limited(body: &str) -> bool {
    let parsed = match serde_json::from_str::<UpstreamErrorBody>(body) {
        Ok(parsed) => parsed,
        Err(_) => {
            return false;
        }
    };

    match parsed.error.and_then(|detail| detail.code) {
        Some(Value::Number(code)) => code.as_u64() == Some(RATE_LIMIT_CODE),
        Some(Value::String(code)) => code.trim() == RATE_LIMIT_CODE.to_string(),
        _ => false,
    }
}

impl OpenRouterChatClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, RelayError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "http-referer",
            HeaderValue::from_str(&config.site_url).map_err(|e|
                RelayError::Internal(format!("Invalid site URL '{}': {}", config.site_url, e))
            )?
        );
        headers.insert(
            "x-title",
            HeaderValue::from_str(&config.app_title).map_err(|e|
                RelayError::Internal(format!("Invalid app title '{}': {}", config.app_title, e))
            )?
        );

        let http = HttpClient::builder().default_headers(headers).build()?;

        Ok(Self { http, config })
    }

    pub fn from_config(config: &UpstreamConfig) -> Result<Self, RelayError> {
        Self::new(config.clone())
    }
}

#[async_trait]
impl ChatClient for OpenRouterChatClient {
    async fn stream_chat(
        &self,
        api_key: &str,
        messages: Vec<ChatMessage>
    ) -> Result<ByteStream, RelayError> {
        let auth_header = HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e|
            RelayError::Internal(format!("Invalid API key format: {}", e))
        )?;

        let req = CompletionRequest {
            model: &self.config.model,
            messages: &messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: true,
        };

        debug!("Sending {} message(s) to {}", messages.len(), self.config.base_url);
        let resp = self.http
            .post(&self.config.base_url)
            .header(AUTHORIZATION, auth_header)
            .json(&req)
            .send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("Upstream API error ({}): {}", status, body);
            if is_rate_limited(&body) {
                return Err(RelayError::RateLimited);
            }
            return Err(RelayError::Upstream { status: status.as_u16() });
        }

        if resp.content_length() == Some(0) {
            error!("Upstream answered {} without a response body", status);
            return Err(RelayError::NoResponseBody);
        }

        info!("Upstream stream opened ({})", status);
        let stream = resp.bytes_stream().map(|chunk| chunk.map_err(|e| Box::new(e) as BoxError));
        Ok(Box::pin(stream))
    }

    fn get_model(&self) -> String {
        self.config.model.clone()
    }

    fn get_base_url(&self) -> String {
        self.config.base_url.clone()
    }
}
