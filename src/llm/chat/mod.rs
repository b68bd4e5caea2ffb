pub mod openrouter;

use async_trait::async_trait;
use axum::body::Bytes;
use futures::Stream;
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use super::UpstreamConfig;
use self::openrouter::OpenRouterChatClient;
use crate::error::RelayError;
use crate::models::chat::ChatMessage;

pub type BoxError = Box<dyn StdError + Send + Sync>;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Starts one streaming completion and hands back the raw upstream body.
    /// Non-success statuses are turned into a [`RelayError`] before any byte
    /// is returned.
    async fn stream_chat(
        &self,
        api_key: &str,
        messages: Vec<ChatMessage>
    ) -> Result<ByteStream, RelayError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> String;
}

pub fn new_client(config: &UpstreamConfig) -> Result<Arc<dyn ChatClient>, RelayError> {
    let client = OpenRouterChatClient::from_config(config)?;
    Ok(Arc::new(client))
}
