mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use stash_config::Config;

use crate::commands::App;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();

    let mut config = Config::load()?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }

    let app = App::open(&config).await?;
    if !matches!(cli.command, cli::Commands::Reconcile) {
        app.drop_orphans().await;
    }

    match cli.command {
        cli::Commands::Location(cmd) => commands::location::handle(cmd, &app).await,
        cli::Commands::Box(cmd) => commands::storage_box::handle(cmd, &app).await,
        cli::Commands::Item(cmd) => commands::item::handle(cmd, &app).await,
        cli::Commands::Export { output } => commands::migrate::export(&app, output).await,
        cli::Commands::Import { archive } => commands::migrate::import(&app, archive).await,
        cli::Commands::DiscardExport => commands::migrate::discard(&app).await,
        cli::Commands::Reconcile => commands::reconcile(&app).await,
    }
}
