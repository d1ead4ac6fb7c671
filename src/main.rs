mod cli;
mod command;

use callbox::config::Config;
use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    callbox::observability::init_tracing();

    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Call(args) => command::call(config, args).await?,
        Commands::Config => command::print_config(&config)?,
    }

    Ok(())
}
