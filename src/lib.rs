pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod relay;
pub mod server;

use cli::{ Args, Command };
use config::prompt::PromptConfig;
use log::info;
use relay::RelayService;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    match args.command.clone() {
        Some(Command::Chat(chat_args)) => client::repl::run_chat(chat_args).await,
        Some(Command::Serve) | None => serve(args).await,
    }
}

pub async fn serve(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let upstream = llm::UpstreamConfig::from_args(&args);
    let prompt = PromptConfig::from_args(&args)?;

    info!("--- Relay Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Upstream URL: {}", upstream.base_url);
    info!("Model: {}", upstream.model);
    info!("Temperature: {}", upstream.temperature);
    info!("Max Tokens: {}", upstream.max_tokens);
    info!("Site URL: {}", upstream.site_url);
    info!("System Instruction: {}", if prompt.system_instruction.is_some() {
        "enabled"
    } else {
        "disabled"
    });
    info!("TLS Enabled: {}", args.enable_tls);
    info!("---------------------------");

    let client = llm::chat::new_client(&upstream)?;
    let relay = Arc::new(RelayService::new(client, prompt));
    info!("Relaying to {} with model {}", relay.upstream_url(), relay.model());

    let server = Server::new(relay, args);
    server.run().await?;

    Ok(())
}
