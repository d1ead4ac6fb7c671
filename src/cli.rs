use callbox::config::HumanDuration;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "callbox")]
#[command(about = "Declarative RPC client", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $CALLBOX_CONFIG, then config/callbox.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Perform one HTTP call through the client engine
    Call(CallArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Debug)]
pub struct CallArgs {
    /// Absolute URL; query pairs are sent as query parameters
    pub url: String,

    /// HTTP method
    #[arg(short = 'X', long = "request", default_value = "GET")]
    pub method: String,

    /// Extra header, as "Name: value"
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Request body
    #[arg(short = 'd', long = "data")]
    pub data: Option<String>,

    /// Send the body as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Retry transient failures and 429/5xx gateway statuses up to N times
    #[arg(long, value_name = "N")]
    pub retry: Option<u32>,

    /// Call timeout, e.g. 500ms or 5s
    #[arg(long)]
    pub timeout: Option<HumanDuration>,

    /// Correlation id for logs
    #[arg(long)]
    pub trace_id: Option<String>,

    /// How to decode the response
    #[arg(long, value_enum, default_value_t = OutputKind::Json)]
    pub output: OutputKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputKind {
    Json,
    Text,
    Bytes,
}
