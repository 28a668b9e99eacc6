use anyhow::{Context, Result};
use clap::Parser;
use marinedb::cli::input::END_OF_INPUT;
use marinedb::cli::{Console, ServerConsole};
use marinedb::client::WaitingIndicator;
use marinedb::connection::config::{
    DEFAULT_ADMIN_LOGIN, DEFAULT_HOST, DEFAULT_JOURNAL_FILE, check_port, parse_port_or_default,
};
use marinedb::storage::{DEFAULT_SNAPSHOT_FILE, DurabilityMode, JournalGateway, PersistenceGateway};
use marinedb::{Server, ServerConfig, SharedStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DATABASE_WAIT_PREFIX: &str = "Connect to the database's server";

#[derive(Parser)]
#[command(name = "marinedb")]
#[command(about = "Multi-user SpaceMarine collection server")]
struct Cli {
    #[arg(long, env = "MARINEDB_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Asked for on the console when absent
    #[arg(long, env = "MARINEDB_PORT")]
    port: Option<u16>,

    #[arg(long, env = "MARINEDB_WORKERS", default_value_t = 4)]
    workers: usize,

    #[arg(long, env = "MARINEDB_JOURNAL", default_value = DEFAULT_JOURNAL_FILE)]
    journal: PathBuf,

    #[arg(long, env = "MARINEDB_SNAPSHOT", default_value = DEFAULT_SNAPSHOT_FILE)]
    snapshot: PathBuf,

    /// Login the server console acts as
    #[arg(long, env = "MARINEDB_ADMIN", default_value = DEFAULT_ADMIN_LOGIN)]
    admin: String,

    /// fsync every journal entry instead of flushing it
    #[arg(long, env = "MARINEDB_SYNC")]
    sync: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("marinedb=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut console = Console::stdin();

    let Some(port) = resolve_port(cli.port, &mut console).await? else {
        println!("{}", END_OF_INPUT);
        return Ok(());
    };

    let config = ServerConfig::new()
        .host(&cli.host)
        .port(port)
        .workers(cli.workers)
        .journal_path(cli.journal)
        .snapshot_path(cli.snapshot)
        .admin_login(&cli.admin);
    let durability = if cli.sync {
        DurabilityMode::Sync
    } else {
        DurabilityMode::Flush
    };

    let server = Server::bind(config.clone())
        .await
        .with_context(|| format!("bind {}", config.bind_addr()))?;
    let local_addr = server.local_addr()?;

    let gateway: Arc<dyn PersistenceGateway> = Arc::new(open_journal(&config, durability).await?);
    let store = Arc::new(load_store(&config, gateway.as_ref()).await?);
    info!(records = store.len().await, "collection loaded");

    let handle = server
        .start(Arc::clone(&store), Arc::clone(&gateway))
        .context("start server")?;
    println!(
        "Server with IP: {}, Port: {} is working...",
        config.host,
        local_addr.port()
    );

    ServerConsole::new(
        &store,
        gateway.as_ref(),
        &config.admin_login,
        &config.snapshot_path,
    )
    .run(&mut console)
    .await
    .context("server console")?;

    let metrics = handle.metrics();
    handle.shutdown().await.context("stop server")?;
    info!(
        accepted = metrics.connections_accepted,
        requests = metrics.requests_handled,
        "server stopped"
    );
    Ok(())
}

/// Port from the flag, or asked for on the console. `None` at end of input.
async fn resolve_port<R: AsyncRead + Unpin>(
    flag: Option<u16>,
    console: &mut Console<R>,
) -> Result<Option<u16>> {
    if let Some(port) = flag {
        return Ok(Some(match check_port(port) {
            Ok(port) => port,
            Err(_) => {
                let (port, notice) = parse_port_or_default(&port.to_string());
                if let Some(notice) = notice {
                    eprintln!("{}", notice);
                }
                port
            }
        }));
    }

    let Some(answer) = console.read_line("Server's PORT:\n$").await? else {
        return Ok(None);
    };
    let (port, notice) = parse_port_or_default(&answer);
    if let Some(notice) = notice {
        eprintln!("{}", notice);
    }
    Ok(Some(port))
}

/// Opens the journal, waiting out transient failures.
async fn open_journal(config: &ServerConfig, durability: DurabilityMode) -> Result<JournalGateway> {
    let indicator = WaitingIndicator::new(DATABASE_WAIT_PREFIX, config.retry_interval);
    loop {
        match JournalGateway::open(&config.journal_path, durability, config.bcrypt_cost) {
            Ok(gateway) => {
                info!(path = %gateway.path().display(), "journal opened");
                return Ok(gateway);
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "journal unavailable, retrying");
                indicator.cycle().await;
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("open journal {}", config.journal_path.display()));
            }
        }
    }
}

async fn load_store(config: &ServerConfig, gateway: &dyn PersistenceGateway) -> Result<SharedStore> {
    let indicator = WaitingIndicator::new(DATABASE_WAIT_PREFIX, config.retry_interval);
    loop {
        match gateway.list_all_with_owners().await {
            Ok(records) => return SharedStore::hydrate(records).context("load collection"),
            Err(e) if e.is_transient() => {
                warn!(error = %e, "gateway unavailable, retrying");
                indicator.cycle().await;
            }
            Err(e) => return Err(e).context("read collection"),
        }
    }
}
