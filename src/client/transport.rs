use crate::llm::chat::{ BoxError, ByteStream };
use crate::models::chat::{ ChatMessage, RelayRequest };
use crate::server::api::CHAT_ROUTE;
use async_trait::async_trait;
use futures::StreamExt;
use log::debug;
use reqwest::Client as HttpClient;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The relay answered with a non-success status.
    #[error("relay responded with status {0}")]
    Status(u16),
    #[error("{0}")]
    Request(String),
    #[error("{0}")]
    Stream(String),
}

#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Sends the full history and returns the relay's text stream.
    async fn send(
        &self,
        api_key: &str,
        messages: Vec<ChatMessage>
    ) -> Result<ByteStream, TransportError>;
}

pub struct HttpRelayTransport {
    http: HttpClient,
    endpoint: String,
}

impl HttpRelayTransport {
    pub fn new(relay_url: &str) -> Result<Self, TransportError> {
        let http = HttpClient::builder()
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: format!("{}{}", relay_url.trim_end_matches('/'), CHAT_ROUTE),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RelayTransport for HttpRelayTransport {
    async fn send(
        &self,
        api_key: &str,
        messages: Vec<ChatMessage>
    ) -> Result<ByteStream, TransportError> {
        let body = RelayRequest { api_key: api_key.to_string(), messages };
        debug!("Posting {} message(s) to {}", body.messages.len(), self.endpoint);

        let resp = self.http
            .post(&self.endpoint)
            .json(&body)
            .send().await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let stream = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| Box::new(TransportError::Stream(e.to_string())) as BoxError));
        Ok(Box::pin(stream))
    }
}
