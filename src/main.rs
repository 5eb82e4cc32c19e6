use augmint_keeper::adapter::inbound::cli::{command::Cli, dispatch};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();
    dispatch::execute(cli).await?;
    Ok(())
}
