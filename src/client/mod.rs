//! Client session and console helpers used by `marinedb-client`.

pub mod session;
pub mod waiting;

pub use session::{ClientSession, SessionState};
pub use waiting::WaitingIndicator;
