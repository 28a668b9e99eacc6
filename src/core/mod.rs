pub mod error;
pub mod types;

pub use error::{MarineError, Result};
pub use types::{
    AstartesCategory, Chapter, Coordinates, MarineId, MeleeWeapon, OwnedMarine, SpaceMarine,
    UNASSIGNED_ID,
};
