use crate::core::{MarineError, Result};
use crate::protocol::Reply;
use crate::storage::PersistenceGateway;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tokio::task;
use tracing::{debug, info};

pub const MAX_CREDENTIAL_LEN: usize = 32;

lazy_static! {
    static ref LOGIN_PATTERN: Regex = Regex::new(r"^[a-zA-Z]+(_?[a-zA-Z0-9])*_?$")
        .expect("login pattern is a valid regex");
    static ref PASSWORD_PATTERN: Regex =
        Regex::new(r"^\w+$").expect("password pattern is a valid regex");
}

/// Hashes a password using bcrypt
///
/// Each hash includes a random salt, so the same password produces different hashes.
/// Runs on the blocking pool; callers must not hold store locks across it.
pub async fn hash_password(password: &str, cost: u32) -> Result<String> {
    let password = password.to_string();
    task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(join_err)?
        .map_err(MarineError::from)
}

/// Verifies password against bcrypt hash. A malformed hash never matches.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let (password, hash) = (password.to_string(), hash.to_string());
    task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .map_err(join_err)
}

fn join_err(err: task::JoinError) -> MarineError {
    MarineError::Execution(format!("password hashing task failed: {}", err))
}

/// Validates a login before it is sent anywhere
pub fn validate_login(login: &str) -> Result<()> {
    if login.is_empty() {
        return Err(MarineError::validation("Login needs to be not empty."));
    }
    if login.chars().count() > MAX_CREDENTIAL_LEN {
        return Err(MarineError::validation(
            "Login needs to have less or equals than 32 characters.",
        ));
    }
    if !login.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(MarineError::validation("Login needs to starting Latin character."));
    }
    if !LOGIN_PATTERN.is_match(login) {
        return Err(MarineError::validation(
            "Login needs to have only Latin characters, digits and underlines between Latin characters or digits.",
        ));
    }
    Ok(())
}

/// Validates password complexity
pub fn validate_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(MarineError::validation("Password needs to be not empty."));
    }
    if password.chars().count() > MAX_CREDENTIAL_LEN {
        return Err(MarineError::validation(
            "Password needs to have less or equals than 32 characters.",
        ));
    }
    if !password.is_ascii() || !PASSWORD_PATTERN.is_match(password) {
        return Err(MarineError::validation(
            "Password needs to have only Latin characters, digits and underlines.",
        ));
    }
    Ok(())
}

/// Per-connection authentication state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    AwaitingHandshake,
    Authenticated { login: String },
}

impl AuthState {
    pub fn login(&self) -> Option<&str> {
        match self {
            AuthState::Authenticated { login } => Some(login),
            AuthState::AwaitingHandshake => None,
        }
    }
}

/// Authentication manager
///
/// Answers handshake envelopes and gates commands, backed by the user table
/// of the persistence gateway.
pub struct AuthManager {
    gateway: Arc<dyn PersistenceGateway>,
}

impl AuthManager {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self { gateway }
    }

    /// Handles one handshake envelope (an envelope without a command).
    ///
    /// - no password: replies whether the login is free
    /// - password and free login: registers the user, replies nothing
    /// - password and taken login: replies whether the password is correct
    pub async fn handshake(
        &self,
        state: &mut AuthState,
        login: &str,
        password: Option<&str>,
    ) -> Result<Reply> {
        let Some(password) = password else {
            let free = self.gateway.is_login_free(login).await?;
            debug!(login, free, "login check");
            return Ok(Reply::Bool(free));
        };

        if self.gateway.is_login_free(login).await? {
            validate_login(login)?;
            validate_password(password)?;
            match self.gateway.register_user(login, password).await {
                Ok(()) => {
                    info!(login, "user registered");
                    *state = AuthState::Authenticated {
                        login: login.to_string(),
                    };
                    Ok(Reply::Nothing)
                }
                // Lost a registration race for the same login.
                Err(MarineError::Auth(reason)) => {
                    debug!(login, %reason, "registration refused");
                    Ok(Reply::Bool(false))
                }
                Err(e) => Err(e),
            }
        } else {
            let accepted = self.gateway.is_registered_user(login, password).await?;
            if accepted {
                info!(login, "user authenticated");
                *state = AuthState::Authenticated {
                    login: login.to_string(),
                };
            } else {
                debug!(login, "authentication refused");
            }
            Ok(Reply::Bool(accepted))
        }
    }

    /// Admits a command envelope. A connection that already authenticated as
    /// `login` passes without another check; otherwise the carried credentials
    /// are verified once and remembered.
    pub async fn authorize(
        &self,
        state: &mut AuthState,
        login: &str,
        password: Option<&str>,
    ) -> Result<()> {
        if state.login() == Some(login) {
            return Ok(());
        }

        let Some(password) = password else {
            return Err(MarineError::Auth(format!("'{}' is not authenticated", login)));
        };

        if self.gateway.is_registered_user(login, password).await? {
            debug!(login, "credentials accepted on command");
            *state = AuthState::Authenticated {
                login: login.to_string(),
            };
            Ok(())
        } else {
            Err(MarineError::Auth("Invalid login or password".into()))
        }
    }
}
