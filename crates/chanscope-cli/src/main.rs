use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod context;
mod render;
mod ui;

#[derive(Parser)]
#[command(name = "chanscope")]
#[command(about = "Find the core commenters of a channel.")]
#[command(version)]
struct Cli {
    /// Database file (defaults to <data dir>/chanscope.db)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Config file (defaults to <data dir>/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync a channel if due and print its core-user report
    Report {
        /// External chat id of the channel
        #[arg(value_name = "CHAT_ID", allow_negative_numbers = true)]
        chat_id: i64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Link a channel to an admin
    Link {
        /// External chat id of the channel
        #[arg(value_name = "CHAT_ID", allow_negative_numbers = true)]
        chat_id: i64,

        /// External user id of the admin
        #[arg(long, value_name = "ID")]
        admin: i64,

        /// Public channel username, with or without '@'
        #[arg(long)]
        username: Option<String>,
    },

    /// List channels linked to an admin
    Channels {
        /// External user id of the admin
        #[arg(long, value_name = "ID")]
        admin: i64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete comments that fell out of the analysis window
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so report output stays pipeable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let ctx = context::AppContext::open(cli.db, cli.config).await?;

    match cli.command {
        Commands::Report { chat_id, json } => commands::report::run(&ctx, chat_id, json).await,
        Commands::Link {
            chat_id,
            admin,
            username,
        } => commands::link::run(&ctx, chat_id, admin, username.as_deref()).await,
        Commands::Channels { admin, json } => commands::channels::run(&ctx, admin, json).await,
        Commands::Cleanup => commands::cleanup::run(&ctx).await,
    }
}
