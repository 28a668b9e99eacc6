use crate::core::{MarineError, Result};
use crate::storage::DEFAULT_SNAPSHOT_FILE;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_JOURNAL_FILE: &str = "marinedb.journal";
pub const DEFAULT_ADMIN_LOGIN: &str = "admin";

/// Ports below this are reserved and refused.
pub const MIN_PORT: u16 = 1024;

/// Work factors bcrypt accepts.
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Checks that `port` is usable for the service.
pub fn check_port(port: u16) -> Result<u16> {
    if port < MIN_PORT {
        return Err(MarineError::validation(format!(
            "The port must be in range {}..=65535, got {}.",
            MIN_PORT, port
        )));
    }
    Ok(port)
}

/// Parses a console answer to "Server's PORT:". Empty input selects the
/// default; anything invalid falls back to it. The second value is the
/// notice to show when the default was chosen.
pub fn parse_port_or_default(input: &str) -> (u16, Option<String>) {
    let input = input.trim();
    let default_notice = format!("Server's default PORT: {}", DEFAULT_PORT);
    if input.is_empty() {
        return (DEFAULT_PORT, Some(default_notice));
    }
    let parsed = input
        .parse::<u16>()
        .map_err(|_| MarineError::validation(format!("'{}' is not a port number.", input)))
        .and_then(check_port);
    match parsed {
        Ok(port) => (port, None),
        Err(_) => (DEFAULT_PORT, Some(format!("Incorrect PORT\n{}", default_notice))),
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,

    pub port: u16,

    /// Number of workers in the request pool
    pub workers: usize,

    /// Upper bound on how long one multiplexer tick waits for activity
    pub tick_wait: Duration,

    /// Delay between attempts while the gateway is unavailable
    pub retry_interval: Duration,

    pub journal_path: PathBuf,

    /// Where `save` writes the JSON snapshot
    pub snapshot_path: PathBuf,

    /// Login the server console acts as
    pub admin_login: String,

    pub bcrypt_cost: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            workers: 4,
            tick_wait: Duration::from_millis(50),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            journal_path: PathBuf::from(DEFAULT_JOURNAL_FILE),
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_FILE),
            admin_login: DEFAULT_ADMIN_LOGIN.to_string(),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn tick_wait(mut self, wait: Duration) -> Self {
        self.tick_wait = wait;
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn journal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal_path = path.into();
        self
    }

    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = path.into();
        self
    }

    pub fn admin_login(mut self, login: &str) -> Self {
        self.admin_login = login.to_string();
        self
    }

    pub fn bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate configuration
    ///
    /// Port 0 is accepted so tests can bind an ephemeral port.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(MarineError::validation("Host cannot be empty"));
        }
        if self.port != 0 {
            check_port(self.port)?;
        }
        if self.workers == 0 {
            return Err(MarineError::validation("workers must be > 0"));
        }
        if self.tick_wait.is_zero() {
            return Err(MarineError::validation("tick_wait must be > 0"));
        }
        if self.admin_login.is_empty() {
            return Err(MarineError::validation("Admin login cannot be empty"));
        }
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.bcrypt_cost) {
            return Err(MarineError::validation(format!(
                "bcrypt cost must be in {}..={}",
                MIN_BCRYPT_COST, MAX_BCRYPT_COST
            )));
        }
        Ok(())
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Length of one waiting-indicator step while reconnecting
    pub retry_tick: Duration,
    /// Print connection banners and the waiting indicator on the console
    pub interactive: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            retry_tick: DEFAULT_RETRY_INTERVAL,
            interactive: false,
        }
    }
}

impl ClientConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            ..Self::default()
        }
    }

    pub fn retry_tick(mut self, tick: Duration) -> Self {
        self.retry_tick = tick;
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(MarineError::validation("Host cannot be empty"));
        }
        if self.port == 0 {
            return Err(MarineError::validation("Port cannot be 0"));
        }
        if self.retry_tick.is_zero() {
            return Err(MarineError::validation("retry_tick must be > 0"));
        }
        Ok(())
    }
}
