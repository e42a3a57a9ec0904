//! Cacher CLI
//!
//! Sends a single command to a Cacher server and prints the reply line.
//! Exits with a non-zero status when the server answers `ERROR`.

use anyhow::Context;
use cacher::client::Client;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

/// Command-line client for a Cacher server
#[derive(Parser, Debug)]
#[command(name = "cacher-cli", version = cacher::VERSION)]
struct Args {
    /// Server address
    #[arg(short, long, default_value_t = format!("{}:{}", cacher::DEFAULT_HOST, cacher::DEFAULT_PORT))]
    addr: String,

    /// Bound on the whole exchange, in seconds
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read the value of a key
    Get { key: String },

    /// Store a value (spaces are allowed in the value)
    Set {
        key: String,
        #[arg(required = true, num_args = 1..)]
        value: Vec<String>,
    },

    /// Delete a key
    Del { key: String },

    /// Expire a key at a unix timestamp in seconds
    Exp { key: String, timestamp: u64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let client = Client::new(&args.addr).with_timeout(Duration::from_secs(args.timeout));

    let response = match args.cmd {
        Command::Get { key } => client.get(key).await,
        Command::Set { key, value } => client.set(key, value.join(" ")).await,
        Command::Del { key } => client.del(key).await,
        Command::Exp { key, timestamp } => {
            let at = UNIX_EPOCH
                .checked_add(Duration::from_secs(timestamp))
                .context("timestamp out of range")?;
            if at <= SystemTime::now() {
                anyhow::bail!("timestamp {timestamp} is not in the future");
            }
            client.expire_at(key, at).await
        }
    }
    .with_context(|| format!("request to {} failed", client.addr()))?;

    println!("{}", response);

    if response.is_ok() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
