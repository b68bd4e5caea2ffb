pub mod frame;

use crate::config::prompt::PromptConfig;
use crate::error::RelayError;
use crate::llm::chat::{ ByteStream, ChatClient };
use crate::models::chat::RelayRequest;
use log::{ info, warn };
use std::sync::Arc;
use uuid::Uuid;

/// Stateless per request: nothing from a conversation outlives the call.
#[derive(Clone)]
pub struct RelayService {
    client: Arc<dyn ChatClient>,
    prompt: Arc<PromptConfig>,
}

impl RelayService {
    pub fn new(client: Arc<dyn ChatClient>, prompt: Arc<PromptConfig>) -> Self {
        Self { client, prompt }
    }

    pub fn model(&self) -> String {
        self.client.get_model()
    }

    pub fn upstream_url(&self) -> String {
        self.client.get_base_url()
    }

    pub async fn relay(&self, request: RelayRequest) -> Result<ByteStream, RelayError> {
        let request_id = Uuid::new_v4();

        if request.api_key.trim().is_empty() {
            warn!("[{}] Rejected chat request without API key", request_id);
            return Err(RelayError::MissingCredential);
        }

        info!("[{}] Relaying {} message(s) upstream", request_id, request.messages.len());
        let messages = self.prompt.apply(request.messages);

        let upstream = match self.client.stream_chat(&request.api_key, messages).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("[{}] Upstream call failed: {}", request_id, e);
                return Err(e);
            }
        };

        Ok(frame::reframe(upstream))
    }
}
