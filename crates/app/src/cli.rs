//! Command-line interface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Ofisu - mirrors office room graphs into chat guilds
#[derive(Debug, Parser)]
#[command(name = "ofisu")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the Discord guild manager
    DiscordManager(DiscordManagerArgs),
}

#[derive(Debug, Clone, Args)]
pub struct DiscordManagerArgs {
    /// Directory containing `*.dot` office files
    #[arg(short = 'i', long, env = "OFISU_OFFICES")]
    pub offices: PathBuf,

    /// Discord bot token
    #[arg(short = 't', long, env = "OFISU_DISCORD_TOKEN", hide_env_values = true)]
    pub discord_token: String,

    /// Key-value store URL: `sqlite://<path>`, `sqlite::memory:` or `memory://`
    #[arg(short = 'r', long, env = "OFISU_STORE_URL")]
    pub store_url: String,

    /// Scheduler tick in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub tick_ms: u64,

    /// Deadline for one guild sync, in seconds
    #[arg(long, default_value_t = 120)]
    pub sync_timeout_secs: u64,

    /// Deadline for one REST call, in seconds
    #[arg(long, default_value_t = 30)]
    pub http_timeout_secs: u64,
}
