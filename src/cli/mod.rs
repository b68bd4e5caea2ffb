use clap::{ Parser, Subcommand };

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    // --- Relay Server Args ---
    /// Host address and port for the relay to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3000")]
    pub server_addr: String,

    // --- Upstream Provider Args ---
    /// Chat-completion endpoint the relay forwards to.
    #[arg(long, env = "UPSTREAM_URL", default_value = crate::llm::DEFAULT_UPSTREAM_URL)]
    pub upstream_url: String,

    /// Model name sent with every completion request.
    #[arg(long, env = "CHAT_MODEL", default_value = crate::llm::DEFAULT_MODEL)]
    pub chat_model: String,

    /// Sampling temperature sent upstream.
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.7")]
    pub temperature: f32,

    /// Maximum output length sent upstream.
    #[arg(long, env = "CHAT_MAX_TOKENS", default_value = "2048")]
    pub max_tokens: u32,

    /// Public origin of the site, sent upstream as the HTTP-Referer header.
    #[arg(long, env = "SITE_URL")]
    pub site_url: Option<String>,

    /// Application name sent upstream as the X-Title header.
    #[arg(long, env = "APP_TITLE", default_value = crate::llm::DEFAULT_APP_TITLE)]
    pub app_title: String,

    // --- Prompt Args ---
    /// Forward conversations without the fixed topic instruction.
    #[arg(long, env = "DISABLE_SYSTEM_PROMPT", default_value = "false")]
    pub disable_system_prompt: bool,

    /// Optional JSON file with a `system_instruction` field overriding the built-in one.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    // --- General App Args ---
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    /// Optional path to the TLS certificate file (PEM format) for enabling HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the relay server (default).
    Serve,
    /// Interactive terminal chat against a running relay.
    Chat(ChatArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ChatArgs {
    /// Base URL of the relay server.
    #[arg(long, env = "RELAY_URL", default_value = "http://127.0.0.1:3000")]
    pub relay_url: String,

    /// File the API key is persisted in between sessions.
    #[arg(long, env = "CREDENTIALS_PATH", default_value = ".agri-help/credentials.json")]
    pub credentials_path: String,
}
