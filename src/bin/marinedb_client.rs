use anyhow::{Context, Result};
use clap::Parser;
use marinedb::cli::{Console, run_client};
use marinedb::connection::DEFAULT_PORT;
use marinedb::connection::config::{DEFAULT_HOST, DEFAULT_RETRY_INTERVAL};
use marinedb::{ClientConfig, ClientSession};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "marinedb-client")]
#[command(about = "Interactive client for the MarineDB collection server")]
struct Cli {
    #[arg(long, env = "MARINEDB_HOST", default_value = DEFAULT_HOST)]
    host: String,

    #[arg(long, env = "MARINEDB_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Waiting-indicator step while the server is unavailable, in milliseconds
    #[arg(long, env = "MARINEDB_RETRY_MS", default_value_t = DEFAULT_RETRY_INTERVAL.as_millis() as u64)]
    retry_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("marinedb=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::new(&cli.host, cli.port)
        .retry_tick(Duration::from_millis(cli.retry_ms))
        .interactive(true);

    let mut session = ClientSession::connect(config)
        .await
        .context("connect to server")?;
    let mut console = Console::stdin();
    run_client(&mut session, &mut console)
        .await
        .context("client console")?;
    Ok(())
}
