//! ChatRelay binary entry point

use chatrelay::cli::{Cli, Commands, ModelCommands};
use chatrelay::commands;
use chatrelay::config::Config;
use chatrelay::error::Result;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "chatrelay=info",
        1 => "chatrelay=debug",
        _ => "chatrelay=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref(), &cli)?;

    match cli.command {
        Commands::Serve { bind, header_mode } => {
            commands::serve::run(&config, bind, header_mode).await
        }
        Commands::Chat { model, ephemeral } => {
            commands::chat::run(&config, model, ephemeral).await
        }
        Commands::Models { command } => match command {
            ModelCommands::List { json } => commands::models::list(&config, json).await,
        },
    }
}
