//! Session authentication and endpoint configuration shared by the server and
//! the client.

pub mod auth;
pub mod config;

pub use auth::{AuthManager, AuthState, validate_login, validate_password};
pub use config::{ClientConfig, ServerConfig, DEFAULT_PORT};
