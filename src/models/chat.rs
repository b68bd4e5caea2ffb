use serde::{ Deserialize, Deserializer, Serialize };

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn is_placeholder(&self) -> bool {
        self.role == Role::Assistant && self.content.is_empty()
    }
}

/// Ordered message history. Every mutation returns a new value and leaves
/// the receiver untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn with_message(&self, message: ChatMessage) -> Self {
        let mut messages = self.messages.clone();
        messages.push(message);
        Self { messages }
    }

    /// Replaces the content of the last message when it is an assistant
    /// message. Position and role stay the same.
    pub fn with_last_assistant_replaced(&self, content: &str) -> Self {
        let mut messages = self.messages.clone();
        if let Some(last) = messages.last_mut() {
            if last.role == Role::Assistant {
                last.content = content.to_string();
            }
        }
        Self { messages }
    }

    /// History as it goes over the wire: a trailing empty assistant entry is
    /// UI-only and never sent.
    pub fn without_trailing_placeholder(&self) -> Self {
        let mut messages = self.messages.clone();
        if messages.last().map(ChatMessage::is_placeholder).unwrap_or(false) {
            messages.pop();
        }
        Self { messages }
    }
}

impl From<Vec<ChatMessage>> for Conversation {
    fn from(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }
}

/// Body accepted by `POST /api/chat`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub api_key: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// A `null` key is the same as no key at all.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
    where D: Deserializer<'de>
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_last_keeps_position() {
        let conv = Conversation::new()
            .with_message(ChatMessage::user("question"))
            .with_message(ChatMessage::assistant(""));

        let updated = conv.with_last_assistant_replaced("Hel");
        assert_eq!(updated.len(), 2);
        assert_eq!(updated.messages[1], ChatMessage::assistant("Hel"));
        // the source snapshot is unchanged
        assert_eq!(conv.messages[1].content, "");
    }

    #[test]
    fn replace_last_ignores_user_tail() {
        let conv = Conversation::new().with_message(ChatMessage::user("question"));
        assert_eq!(conv.with_last_assistant_replaced("x"), conv);
    }

    #[test]
    fn placeholder_is_stripped_for_the_wire() {
        let conv = Conversation::new()
            .with_message(ChatMessage::user("a"))
            .with_message(ChatMessage::assistant("b"))
            .with_message(ChatMessage::user("c"))
            .with_message(ChatMessage::assistant(""));

        let wire = conv.without_trailing_placeholder();
        assert_eq!(wire.len(), 3);
        assert_eq!(wire.last(), Some(&ChatMessage::user("c")));

        let filled = conv.with_last_assistant_replaced("d");
        assert_eq!(filled.without_trailing_placeholder().len(), 4);
    }

    #[test]
    fn relay_request_uses_camel_case() {
        let req: RelayRequest = serde_json::from_str(
            r#"{"apiKey":"sk-1","messages":[{"role":"user","content":"hi"}]}"#
        ).unwrap();
        assert_eq!(req.api_key, "sk-1");
        assert_eq!(req.messages, vec![ChatMessage::user("hi")]);

        let missing: RelayRequest = serde_json::from_str(r#"{"messages":[]}"#).unwrap();
        assert!(missing.api_key.is_empty());

        let null: RelayRequest = serde_json::from_str(r#"{"apiKey":null,"messages":[]}"#).unwrap();
        assert!(null.api_key.is_empty());
    }
}
