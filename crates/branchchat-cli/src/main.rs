//! branchchat terminal client.
//!
//! Reads lines from stdin, prints conversation output on stdout and logs on
//! stderr.
//!
//! Usage:
//!   cargo run -p branchchat-cli
//!   cargo run -p branchchat-cli -- --endpoint http://127.0.0.1:3000/api/claude
//!   RUST_LOG=branchchat_kernel=debug cargo run -p branchchat-cli -- --config ./branchchat.rhai

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt};

use branchchat_cli::{Command, Repl, resolve_config};
use branchchat_kernel::Kernel;

/// Branching learning chat in the terminal.
#[derive(Parser, Debug)]
#[command(name = "branchchat")]
#[command(about = "Branching learning chat: dig into any phrase without losing your place")]
struct Args {
    /// Path to a branchchat.rhai config script
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Completion endpoint, overriding the config
    #[arg(long)]
    endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the conversation, so logs go to stderr
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into())
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args = Args::parse();
    let config = resolve_config(args.config.as_deref(), args.endpoint.as_deref())?;
    tracing::info!(endpoint = %config.endpoint, "starting branchchat");

    let repl = Repl::new(Arc::new(Kernel::with_http(config)));
    println!("Type a question to begin, /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match repl.execute(command).await {
            Ok(response) => {
                for line in &response.lines {
                    println!("{line}");
                }
                if response.quit {
                    break;
                }
            }
            Err(e) => println!("error: {e:#}"),
        }
    }

    tracing::info!("branchchat shutting down");
    Ok(())
}
