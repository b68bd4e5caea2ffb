pub mod chat;

use crate::cli::Args;

pub const DEFAULT_UPSTREAM_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.1-70b-instruct";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_SITE_URL: &str = "http://localhost:3000";
pub const DEFAULT_APP_TITLE: &str = "AI Chatbot";

/// Fixed upstream settings. The caller's credential is not part of it: it
/// arrives with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Sent as `HTTP-Referer`, identification only.
    pub site_url: String,
    /// Sent as `X-Title`.
    pub app_title: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            site_url: DEFAULT_SITE_URL.to_string(),
            app_title: DEFAULT_APP_TITLE.to_string(),
        }
    }
}

impl UpstreamConfig {
    pub fn from_args(args: &Args) -> Self {
        let site_url = args.site_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SITE_URL.to_string());

        Self {
            base_url: args.upstream_url.clone(),
            model: args.chat_model.clone(),
            temperature: args.temperature,
            max_tokens: args.max_tokens,
            site_url,
            app_title: args.app_title.clone(),
        }
    }
}
