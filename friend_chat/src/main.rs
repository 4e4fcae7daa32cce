use anyhow::Context;
use clap::Parser;
use tracing::info;

use friend_api::ApiClient;
use friend_chat::{config::Cli, logging, repl, ChatPage, ChatSession};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::configure_logging(&cli.log_level)?;

    let client = ApiClient::new(cli.client_config())
        .with_context(|| format!("failed to configure client for '{}'", cli.api_base))?;
    info!("Starting chat against {}", client.base_url());

    let session = ChatSession::new(client);
    let mut page = ChatPage::default();

    repl::run(&session, &mut page).await?;

    info!("Chat ended with {} messages", session.messages().len());
    Ok(())
}
