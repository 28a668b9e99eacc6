//! Interactive loops: the client console (over a [`ClientSession`]) and the
//! server console (executing directly against the store as the operator).

use super::grammar::{ConsoleLine, parse_line};
use super::input::{Console, END_OF_INPUT, read_marine};
use super::render::render;
use crate::client::ClientSession;
use crate::connection::{validate_login, validate_password};
use crate::core::{MarineError, Result, SpaceMarine};
use crate::executor::{self, ExecutionContext};
use crate::storage::{PersistenceGateway, SharedStore, save_snapshot};
use std::path::Path;
use tokio::io::AsyncRead;
use tracing::{error, info};

pub const COMMAND_PROMPT: &str = "$";

fn report(error: &MarineError) {
    match error {
        MarineError::Validation(message) | MarineError::Auth(message) => eprintln!("{}", message),
        other => eprintln!("{}", other),
    }
}

/// Reads the record for a composite command. `Ok(None)` at end of input,
/// `Ok(Some(None))` when the record was rejected and the command is dropped.
async fn read_record<R: AsyncRead + Unpin>(
    console: &mut Console<R>,
) -> Result<Option<Option<SpaceMarine>>> {
    match read_marine(console).await {
        Ok(Some(marine)) => Ok(Some(Some(marine))),
        Ok(None) => Ok(None),
        Err(e @ MarineError::Validation(_)) => {
            report(&e);
            Ok(Some(None))
        }
        Err(e) => Err(e),
    }
}

// ============================================================================
// Client console
// ============================================================================

enum Dialog {
    Done,
    Restart,
    EndOfInput,
}

/// Register or log in, then serve command lines until `exit` or end of input.
pub async fn run_client<R: AsyncRead + Unpin>(
    session: &mut ClientSession,
    console: &mut Console<R>,
) -> Result<()> {
    if !session.is_ready() && !login_dialog(session, console).await? {
        println!("{}", END_OF_INPUT);
        return Ok(());
    }

    loop {
        let Some(line) = console.read_line(COMMAND_PROMPT).await? else {
            println!("{}", END_OF_INPUT);
            return Ok(());
        };

        let command = match parse_line(&line) {
            Ok(ConsoleLine::Empty) => continue,
            Ok(ConsoleLine::Save) => {
                eprintln!("save: this command is not available on the client application.");
                continue;
            }
            Ok(ConsoleLine::Exit) => {
                session.close().await;
                return Ok(());
            }
            Ok(ConsoleLine::Run(command)) => command,
            Ok(ConsoleLine::WithRecord(kind)) => match read_record(console).await? {
                Some(Some(marine)) => kind.with(marine),
                Some(None) => continue,
                None => {
                    println!("{}", END_OF_INPUT);
                    return Ok(());
                }
            },
            Err(e) => {
                report(&e);
                continue;
            }
        };

        match session.request(command.clone()).await {
            Ok(reply) => render(&command, &reply).print(),
            Err(e) => report(&e),
        }
    }
}

/// Returns false if input ended before the session was authenticated.
async fn login_dialog<R: AsyncRead + Unpin>(
    session: &mut ClientSession,
    console: &mut Console<R>,
) -> Result<bool> {
    loop {
        let Some(answer) = console
            .read_line("Do you want to register (R) or authorizer(A):\n")
            .await?
        else {
            return Ok(false);
        };

        let outcome = match answer.trim().to_lowercase().as_str() {
            "r" | "register" => register_dialog(session, console).await?,
            "a" | "authorize" | "authorizer" => authorize_dialog(session, console).await?,
            _ => {
                eprintln!("You need to write R/A or register/authorizer");
                continue;
            }
        };

        match outcome {
            Dialog::Done => return Ok(true),
            Dialog::Restart => continue,
            Dialog::EndOfInput => return Ok(false),
        }
    }
}

fn login_field(raw: &str) -> Result<String> {
    validate_login(raw)?;
    Ok(raw.to_string())
}

fn password_field(raw: &str) -> Result<String> {
    validate_password(raw)?;
    Ok(raw.to_string())
}

async fn register_dialog<R: AsyncRead + Unpin>(
    session: &mut ClientSession,
    console: &mut Console<R>,
) -> Result<Dialog> {
    let login = loop {
        let Some(login) = console.read_value("Input your login:$", login_field).await? else {
            return Ok(Dialog::EndOfInput);
        };
        match session.is_login_free(&login).await {
            Ok(true) => break login,
            Ok(false) => eprintln!("The login isn't free."),
            Err(e) => report(&e),
        }
    };

    loop {
        let Some(password) = console
            .read_value("Input your password:$", password_field)
            .await?
        else {
            return Ok(Dialog::EndOfInput);
        };
        match session.register(&login, &password).await {
            Ok(()) => {
                println!("Hello, {}!", login);
                return Ok(Dialog::Done);
            }
            // Someone registered the login in the meantime.
            Err(e @ MarineError::Auth(_)) => {
                report(&e);
                return Ok(Dialog::Restart);
            }
            Err(e) => report(&e),
        }
    }
}

async fn authorize_dialog<R: AsyncRead + Unpin>(
    session: &mut ClientSession,
    console: &mut Console<R>,
) -> Result<Dialog> {
    let login = loop {
        let Some(login) = console.read_value("Input your login:$", login_field).await? else {
            return Ok(Dialog::EndOfInput);
        };
        match session.is_login_free(&login).await {
            Ok(false) => break login,
            Ok(true) => eprintln!("The login isn't exist."),
            Err(e) => report(&e),
        }
    };

    loop {
        let Some(password) = console
            .read_value("Input your password:$", password_field)
            .await?
        else {
            return Ok(Dialog::EndOfInput);
        };
        match session.authenticate(&login, &password).await {
            Ok(true) => {
                println!("Hello, {}!", login);
                return Ok(Dialog::Done);
            }
            Ok(false) => eprintln!("Incorrect password."),
            Err(e) => report(&e),
        }
    }
}

// ============================================================================
// Server console
// ============================================================================

/// The server's own console. Commands run with operator privilege, so
/// ownership checks do not apply.
pub struct ServerConsole<'a> {
    store: &'a SharedStore,
    gateway: &'a dyn PersistenceGateway,
    admin_login: &'a str,
    snapshot_path: &'a Path,
}

impl<'a> ServerConsole<'a> {
    pub fn new(
        store: &'a SharedStore,
        gateway: &'a dyn PersistenceGateway,
        admin_login: &'a str,
        snapshot_path: &'a Path,
    ) -> Self {
        Self {
            store,
            gateway,
            admin_login,
            snapshot_path,
        }
    }

    /// Serves lines until `exit` or end of input; both save the snapshot first.
    pub async fn run<R: AsyncRead + Unpin>(&self, console: &mut Console<R>) -> Result<()> {
        loop {
            let Some(line) = console.read_line(COMMAND_PROMPT).await? else {
                println!("{}", END_OF_INPUT);
                self.exit().await;
                return Ok(());
            };

            let command = match parse_line(&line) {
                Ok(ConsoleLine::Empty) => continue,
                Ok(ConsoleLine::Save) => {
                    self.save().await;
                    continue;
                }
                Ok(ConsoleLine::Exit) => {
                    self.exit().await;
                    return Ok(());
                }
                Ok(ConsoleLine::Run(command)) => command,
                Ok(ConsoleLine::WithRecord(kind)) => match read_record(console).await? {
                    Some(Some(marine)) => kind.with(marine),
                    Some(None) => continue,
                    None => {
                        println!("{}", END_OF_INPUT);
                        self.exit().await;
                        return Ok(());
                    }
                },
                Err(e) => {
                    report(&e);
                    continue;
                }
            };

            let ctx = ExecutionContext::operator(self.admin_login, self.store, self.gateway);
            match executor::execute(&ctx, command.clone()).await {
                Ok(reply) => render(&command, &reply).print(),
                Err(e) => {
                    error!(command = command.name(), error = %e, "console command failed");
                    report(&e);
                }
            }
        }
    }

    /// Writes the snapshot file. Returns whether it succeeded.
    pub async fn save(&self) -> bool {
        let records = self.store.snapshot().await;
        let path = self.snapshot_path.display();
        match save_snapshot(self.snapshot_path, &records) {
            Ok(()) => {
                info!(path = %path, records = records.len(), "snapshot saved");
                println!("Saving the collection to file \"{}\" is corrected.", path);
                true
            }
            Err(e) => {
                error!(path = %path, error = %e, "snapshot failed");
                eprintln!("Saving the collection to file \"{}\" is failed.", path);
                false
            }
        }
    }

    async fn exit(&self) {
        self.save().await;
        println!("Exit program.");
    }
}
