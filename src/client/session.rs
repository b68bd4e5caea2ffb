use super::credentials::{ CredentialError, CredentialStore };
use super::transport::{ RelayTransport, TransportError };
use crate::models::chat::{ ChatMessage, Conversation };
use crate::relay::frame::Utf8Decoder;
use futures::StreamExt;
use log::{ debug, error, info };
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

pub const RATE_LIMITED_TEXT: &str = "Rate limited. Please try again shortly or upgrade your plan.";
pub const INVALID_KEY_TEXT: &str = "Invalid API key. Please check and try again.";
pub const SERVER_ERROR_TEXT: &str = "Server error. Please try again later.";
pub const SEND_FAILED_TEXT: &str = "Failed to send message";

/// User-facing copy for a non-success relay status.
pub fn describe_status(status: u16) -> &'static str {
    match status {
        429 => RATE_LIMITED_TEXT,
        401 => INVALID_KEY_TEXT,
        500 => SERVER_ERROR_TEXT,
        _ => SEND_FAILED_TEXT,
    }
}

fn describe_transport_error(err: &TransportError) -> String {
    match err {
        TransportError::Status(status) => describe_status(*status).to_string(),
        other => other.to_string(),
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TurnPhase {
    #[default]
    Idle,
    Sending,
    Streaming,
    Failed,
}

impl TurnPhase {
    pub fn is_busy(self) -> bool {
        matches!(self, TurnPhase::Sending | TurnPhase::Streaming)
    }
}

/// Immutable view of the session, published after every state change.
#[derive(Clone, Default)]
pub struct SessionSnapshot {
    pub conversation: Conversation,
    pub input: String,
    pub error: Option<String>,
    pub phase: TurnPhase,
    pub(crate) api_key: Option<String>,
}

impl SessionSnapshot {
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl fmt::Debug for SessionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSnapshot")
            .field("conversation", &self.conversation)
            .field("input", &self.input)
            .field("error", &self.error)
            .field("phase", &self.phase)
            .field("has_api_key", &self.has_api_key())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input, no credential, or a turn already in flight.
    Ignored,
    Completed(String),
    Failed(String),
}

pub struct ChatSession {
    transport: Arc<dyn RelayTransport>,
    credentials: Arc<dyn CredentialStore>,
    state: watch::Sender<SessionSnapshot>,
}

impl ChatSession {
    pub fn new(
        transport: Arc<dyn RelayTransport>,
        credentials: Arc<dyn CredentialStore>
    ) -> Result<Self, CredentialError> {
        let api_key = credentials.load()?.filter(|key| !key.trim().is_empty());
        let (state, _) = watch::channel(SessionSnapshot { api_key, ..SessionSnapshot::default() });
        Ok(Self { transport, credentials, state })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn set_input(&self, text: &str) {
        self.state.send_modify(|s| {
            s.input = text.to_string();
        });
    }

    /// Stores a new key and starts a fresh conversation. Blank keys and
    /// changes during an in-flight turn are ignored.
    pub fn set_api_key(&self, api_key: &str) -> Result<bool, CredentialError> {
        if api_key.trim().is_empty() {
            return Ok(false);
        }
        let mut previous = None;
        let accepted = self.state.send_if_modified(|s| {
            if s.phase.is_busy() {
                return false;
            }
            previous = s.api_key.take();
            *s = SessionSnapshot { api_key: Some(api_key.to_string()), ..SessionSnapshot::default() };
            true
        });
        if !accepted {
            return Ok(false);
        }

        if let Err(e) = self.credentials.save(api_key) {
            self.state.send_modify(|s| {
                s.api_key = previous;
            });
            return Err(e);
        }
        info!("API key updated, conversation cleared");
        Ok(true)
    }

    pub fn logout(&self) -> Result<bool, CredentialError> {
        let accepted = self.state.send_if_modified(|s| {
            if s.phase.is_busy() {
                return false;
            }
            *s = SessionSnapshot::default();
            true
        });
        if !accepted {
            return Ok(false);
        }

        self.credentials.clear()?;
        info!("API key cleared, conversation reset");
        Ok(true)
    }

    /// Runs one turn with the current input. The busy check and the move to
    /// `Sending` happen under the channel lock, so a concurrent second call
    /// sees the turn in flight and returns `Ignored`.
    pub async fn submit(&self) -> SubmitOutcome {
        let mut request: Option<(String, Vec<ChatMessage>)> = None;
        self.state.send_if_modified(|s| {
            if s.phase.is_busy() || s.input.trim().is_empty() {
                return false;
            }
            let Some(api_key) = s.api_key.clone() else {
                return false;
            };

            s.conversation = s.conversation
                .with_message(ChatMessage::user(s.input.as_str()))
                .with_message(ChatMessage::assistant(""));
            request = Some((api_key, s.conversation.without_trailing_placeholder().messages));
            s.input.clear();
            s.error = None;
            s.phase = TurnPhase::Sending;
            true
        });

        let Some((api_key, history)) = request else {
            debug!("Submit ignored");
            return SubmitOutcome::Ignored;
        };

        let mut guard = TurnGuard { state: &self.state, finished: false };
        let outcome = match self.stream_reply(&api_key, history).await {
            Ok(reply) => {
                self.state.send_modify(|s| {
                    s.phase = TurnPhase::Idle;
                });
                SubmitOutcome::Completed(reply)
            }
            Err(message) => {
                error!("Chat turn failed: {}", message);
                self.fail_turn(&message);
                SubmitOutcome::Failed(message)
            }
        };
        guard.finished = true;
        outcome
    }

    async fn stream_reply(&self, api_key: &str, history: Vec<ChatMessage>) -> Result<String, String> {
        let mut stream = self.transport
            .send(api_key, history).await
            .map_err(|e| describe_transport_error(&e))?;

        let mut decoder = Utf8Decoder::default();
        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| e.to_string())?;
            reply.push_str(&decoder.decode(&chunk));
            self.publish_reply(&reply);
        }

        let tail = decoder.finish();
        if !tail.is_empty() {
            reply.push_str(&tail);
            self.publish_reply(&reply);
        }
        Ok(reply)
    }

    fn publish_reply(&self, reply: &str) {
        self.state.send_modify(|s| {
            s.conversation = s.conversation.with_last_assistant_replaced(reply);
            s.phase = TurnPhase::Streaming;
        });
    }

    /// An untouched placeholder becomes the error entry. Text that already
    /// streamed in is kept and the error entry is appended after it.
    fn fail_turn(&self, message: &str) {
        let entry = format!("Error: {}", message);
        self.state.send_modify(|s| {
            let placeholder_empty = s.conversation.last().map(ChatMessage::is_placeholder).unwrap_or(false);
            s.conversation = if placeholder_empty {
                s.conversation.with_last_assistant_replaced(&entry)
            } else {
                s.conversation.with_message(ChatMessage::assistant(entry.as_str()))
            };
            s.error = Some(message.to_string());
            s.phase = TurnPhase::Failed;
        });
    }
}

/// Releases the session when a `submit` future is dropped mid-turn, so the
/// next turn is not blocked by a phase nobody will ever reset. Text that
/// already streamed in is kept; an untouched placeholder is removed.
struct TurnGuard<'a> {
    state: &'a watch::Sender<SessionSnapshot>,
    finished: bool,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.state.send_if_modified(|s| {
            if !s.phase.is_busy() {
                return false;
            }
            s.conversation = s.conversation.without_trailing_placeholder();
            s.phase = TurnPhase::Idle;
            true
        });
        debug!("Chat turn abandoned before completion");
    }
}
