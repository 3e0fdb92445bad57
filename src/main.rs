//! cache-cascade: operational CLI for a configured cache cascade.
//!
//! Loads the level list from a JSON config file, builds the cascade, and
//! runs one cache operation against it. Useful for poking at a shared disk
//! level or smoke-testing a config before wiring it into a service.

use bytes::Bytes;
use clap::Parser;
use tracing::info;

use cache_cascade::config::{Cli, Command, Config};
use cache_cascade::{build_cascade, compute_once, Options};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "cache_cascade=debug"
    } else {
        "cache_cascade=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("cache-cascade v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(&cli.config)?;
    info!(levels = config.levels.len(), "Configuration loaded");

    let cascade = build_cascade(&config).await?;
    let options = Options::new();

    match cli.command {
        Command::Get { key } => match cascade.read(&key, &options).await? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(miss)"),
        },
        Command::Set { key, value } => {
            let outcomes = cascade.write(&key, Bytes::from(value), &options).await?;
            for (level, stored) in outcomes.iter().enumerate() {
                info!(level, stored, "write outcome");
            }
        }
        Command::Delete { key } => {
            let outcomes = cascade.delete(&key, &options).await?;
            for (level, was_present) in outcomes.iter().enumerate() {
                info!(level, was_present, "delete outcome");
            }
        }
        Command::Fetch { key, fallback } => {
            let value = cascade
                .fetch(
                    &key,
                    &options,
                    compute_once(move || async move { Ok(Bytes::from(fallback)) }),
                )
                .await?;
            println!("{}", String::from_utf8_lossy(&value));
        }
    }

    Ok(())
}
