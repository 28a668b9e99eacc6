//! Client side of a connection: connect, handshake, then one request and one
//! reply at a time, reconnecting whenever the server goes away.

use super::waiting::{RECONNECT_PREFIX, WaitingIndicator};
use crate::connection::{ClientConfig, validate_login, validate_password};
use crate::core::{MarineError, Result};
use crate::protocol::{Command, Envelope, Reply, receive, send};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    /// Connected, no accepted credentials yet.
    Authenticating,
    Ready,
}

/// Accepted login and password, reused for every command envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Credentials {
    login: String,
    password: String,
}

pub struct ClientSession {
    config: ClientConfig,
    state: SessionState,
    stream: Option<TcpStream>,
    credentials: Option<Credentials>,
    indicator: WaitingIndicator,
    reconnects: u64,
}

impl ClientSession {
    pub fn new(config: ClientConfig) -> Self {
        let indicator = if config.interactive {
            WaitingIndicator::new(RECONNECT_PREFIX, config.retry_tick)
        } else {
            WaitingIndicator::hidden(config.retry_tick)
        };
        Self {
            config,
            state: SessionState::Disconnected,
            stream: None,
            credentials: None,
            indicator,
            reconnects: 0,
        }
    }

    /// Creates a session and polls until the server accepts the connection.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let mut session = Self::new(config);
        session.ensure_connected().await;
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn login(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.login.as_str())
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// How many times the session had to reconnect after losing the server.
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    pub async fn is_login_free(&mut self, login: &str) -> Result<bool> {
        validate_login(login)?;
        match self.round_trip(&Envelope::login_check(login)).await? {
            Reply::Bool(free) => Ok(free),
            other => Err(unexpected(&other, "Boolean")),
        }
    }

    /// Registers a new user and keeps the credentials for later requests.
    pub async fn register(&mut self, login: &str, password: &str) -> Result<()> {
        validate_login(login)?;
        validate_password(password)?;
        match self.round_trip(&Envelope::credentials(login, password)).await? {
            Reply::Nothing => {
                info!(login, "registered");
                self.accept(login, password);
                Ok(())
            }
            Reply::Bool(false) => Err(MarineError::Auth("The login isn't free.".into())),
            Reply::Fault(message) => Err(MarineError::Auth(message)),
            other => Err(unexpected(&other, "null")),
        }
    }

    /// Logs in as an existing user. `Ok(false)` means the password was wrong.
    pub async fn authenticate(&mut self, login: &str, password: &str) -> Result<bool> {
        validate_login(login)?;
        validate_password(password)?;
        match self.round_trip(&Envelope::credentials(login, password)).await? {
            Reply::Bool(true) => {
                info!(login, "authenticated");
                self.accept(login, password);
                Ok(true)
            }
            Reply::Bool(false) => Ok(false),
            Reply::Fault(message) => Err(MarineError::Auth(message)),
            // A free login was registered on the spot.
            Reply::Nothing => {
                self.accept(login, password);
                Ok(true)
            }
            other => Err(unexpected(&other, "Boolean")),
        }
    }

    /// Sends one command with the session's credentials and waits for its reply.
    ///
    /// If the connection drops on the way the session reconnects (reusing the
    /// credentials, no new handshake) and the command is reported as failed
    /// rather than resent, since the server may already have applied it.
    pub async fn request(&mut self, command: Command) -> Result<Reply> {
        let Some(credentials) = self.credentials.clone() else {
            return Err(MarineError::Auth("the session is not authenticated".into()));
        };
        let envelope = Envelope::command(command, credentials.login, credentials.password);
        self.round_trip(&envelope).await
    }

    /// Closes the connection. The session can still reconnect on the next request.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(error = %e, "shutdown failed");
            }
        }
        self.state = SessionState::Disconnected;
    }

    fn accept(&mut self, login: &str, password: &str) {
        self.credentials = Some(Credentials {
            login: login.to_string(),
            password: password.to_string(),
        });
        self.state = SessionState::Ready;
    }

    async fn round_trip(&mut self, envelope: &Envelope) -> Result<Reply> {
        self.ensure_connected().await;
        match self.exchange(envelope).await {
            Ok(reply) => Ok(reply),
            Err(e) if e.is_disconnect() => {
                self.on_connection_lost(&e);
                self.ensure_connected().await;
                self.reconnects += 1;
                Err(MarineError::Connection(format!(
                    "the connection was lost, {} may not have been executed",
                    describe(envelope)
                )))
            }
            Err(e) => Err(e),
        }
    }

    async fn exchange(&mut self, envelope: &Envelope) -> Result<Reply> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| MarineError::Connection("not connected".into()))?;
        send(stream, envelope).await?;
        receive(stream).await
    }

    fn on_connection_lost(&mut self, error: &MarineError) {
        warn!(addr = %self.config.server_addr(), error = %error, "connection lost");
        if self.config.interactive {
            eprintln!(
                "Server with IP: {}, Port: {} is unavailable.",
                self.config.host, self.config.port
            );
        }
        self.stream = None;
        self.state = SessionState::Disconnected;
    }

    /// Polls the server until a connection is established.
    async fn ensure_connected(&mut self) {
        if self.stream.is_some() {
            return;
        }
        let addr = self.config.server_addr();
        loop {
            self.state = SessionState::Connecting;
            match TcpStream::connect(&addr).await {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(error = %e, "set_nodelay failed");
                    }
                    if self.config.interactive {
                        println!(
                            "Connected to server with IP: {}, Port: {}...",
                            self.config.host, self.config.port
                        );
                    }
                    info!(%addr, "connected");
                    self.stream = Some(stream);
                    self.state = if self.credentials.is_some() {
                        SessionState::Ready
                    } else {
                        SessionState::Authenticating
                    };
                    return;
                }
                Err(e) => {
                    self.state = SessionState::Disconnected;
                    debug!(%addr, error = %e, "server unavailable, retrying");
                    self.indicator.cycle().await;
                }
            }
        }
    }
}

fn unexpected(reply: &Reply, expected: &str) -> MarineError {
    match reply {
        Reply::Fault(message) => MarineError::Execution(message.clone()),
        other => MarineError::protocol(format!(
            "Invalid object type returned: expected \"{}\", got {}.",
            expected,
            other.kind()
        )),
    }
}

fn describe(envelope: &Envelope) -> String {
    match &envelope.command {
        Some(command) => format!("'{}'", command.name()),
        None => "the handshake".to_string(),
    }
}
