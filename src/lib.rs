// ============================================================================
// MarineDB Library
// ============================================================================

pub mod cli;
pub mod client;
pub mod connection;
pub mod core;
pub mod executor;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export main types for convenience
pub use core::{
    AstartesCategory, Chapter, Coordinates, MarineError, MarineId, MeleeWeapon, OwnedMarine,
    Result, SpaceMarine,
};
pub use protocol::{Command, Envelope, Reply};

// Re-export the server and client API
pub use client::{ClientSession, SessionState};
pub use connection::{ClientConfig, ServerConfig};
pub use server::{Server, ServerHandle};
pub use storage::{JournalGateway, MemoryGateway, PersistenceGateway, SharedStore};
