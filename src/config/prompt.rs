use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use log::info;
use thiserror::Error;

use crate::cli::Args;
use crate::models::chat::ChatMessage;

pub const DEFAULT_SYSTEM_INSTRUCTION: &str =
    "You are Agri Help, an assistant for farmers, growers and agricultural students. \
Only answer questions about agriculture: crops, soil health, irrigation, fertilizers, pests and \
plant diseases, livestock, farm machinery, weather planning and farm economics. If a question is \
outside agriculture, politely say that you can only help with farming topics and invite the user \
to ask one. Keep answers practical and concise.";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt file IO error for '{path}': {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },
    #[error("Prompt JSON parsing error for '{path}': {source}")]
    JsonError {
        path: String,
        source: serde_json::Error,
    },
    #[error("Prompt file '{0}' has an empty system_instruction")]
    EmptyInstruction(String),
}

#[derive(Deserialize)]
struct PromptFile {
    system_instruction: String,
}

/// System instruction prefixed to every upstream conversation. Callers can
/// not edit it; `None` means the conversation is forwarded unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptConfig {
    pub system_instruction: Option<String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self { system_instruction: Some(DEFAULT_SYSTEM_INSTRUCTION.to_string()) }
    }
}

impl PromptConfig {
    pub fn disabled() -> Self {
        Self { system_instruction: None }
    }

    pub fn from_args(args: &Args) -> Result<Arc<Self>, PromptError> {
        if args.disable_system_prompt {
            info!("System instruction disabled, conversations are forwarded unchanged");
            return Ok(Arc::new(Self::disabled()));
        }
        match &args.prompts_path {
            Some(path) => load_prompts(path),
            None => Ok(Arc::new(Self::default())),
        }
    }

    pub fn system_message(&self) -> Option<ChatMessage> {
        self.system_instruction.as_deref().map(ChatMessage::system)
    }

    /// The fixed instruction (if any) followed by the caller's history.
    pub fn apply(&self, messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
        match self.system_message() {
            Some(system) => {
                let mut prefixed = Vec::with_capacity(messages.len() + 1);
                prefixed.push(system);
                prefixed.extend(messages);
                prefixed
            }
            None => messages,
        }
    }
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    let display = path.as_ref().display().to_string();
    let file_content = fs::read_to_string(&path).map_err(|source| PromptError::IoError {
        path: display.clone(),
        source,
    })?;
    let file: PromptFile = serde_json::from_str(&file_content).map_err(|source| {
        PromptError::JsonError { path: display.clone(), source }
    })?;

    let instruction = file.system_instruction.trim();
    if instruction.is_empty() {
        return Err(PromptError::EmptyInstruction(display));
    }
    info!("Loaded system instruction from {}", display);

    Ok(Arc::new(PromptConfig { system_instruction: Some(instruction.to_string()) }))
}
