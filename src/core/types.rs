use super::error::{MarineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Record identifier assigned by the persistence gateway. `0` means "not assigned yet".
pub type MarineId = u64;

pub const UNASSIGNED_ID: MarineId = 0;

// ============================================================================
// Enumerations
// ============================================================================

/// Melee weapon kind. The declaration order is the total order used by
/// `count_greater_than_melee_weapon`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeleeWeapon {
    ChainSword,
    PowerSword,
    ChainAxe,
    Manreaper,
    PowerBlade,
}

impl MeleeWeapon {
    pub const ALL: [MeleeWeapon; 5] = [
        MeleeWeapon::ChainSword,
        MeleeWeapon::PowerSword,
        MeleeWeapon::ChainAxe,
        MeleeWeapon::Manreaper,
        MeleeWeapon::PowerBlade,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MeleeWeapon::ChainSword => "CHAIN_SWORD",
            MeleeWeapon::PowerSword => "POWER_SWORD",
            MeleeWeapon::ChainAxe => "CHAIN_AXE",
            MeleeWeapon::Manreaper => "MANREAPER",
            MeleeWeapon::PowerBlade => "POWER_BLADE",
        }
    }
}

impl fmt::Display for MeleeWeapon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeleeWeapon {
    type Err = MarineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|weapon| weapon.as_str() == s)
            .ok_or_else(|| MarineError::validation(format!("unknown melee weapon '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AstartesCategory {
    Scout,
    Aggressor,
    Assault,
    Chaplain,
    Helix,
}

impl AstartesCategory {
    pub const ALL: [AstartesCategory; 5] = [
        AstartesCategory::Scout,
        AstartesCategory::Aggressor,
        AstartesCategory::Assault,
        AstartesCategory::Chaplain,
        AstartesCategory::Helix,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AstartesCategory::Scout => "SCOUT",
            AstartesCategory::Aggressor => "AGGRESSOR",
            AstartesCategory::Assault => "ASSAULT",
            AstartesCategory::Chaplain => "CHAPLAIN",
            AstartesCategory::Helix => "HELIX",
        }
    }
}

impl fmt::Display for AstartesCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AstartesCategory {
    type Err = MarineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| MarineError::validation(format!("unknown astartes category '{}'", s)))
    }
}

// ============================================================================
// Record
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub name: String,
    pub parent_legion: Option<String>,
    pub marines_count: u32,
    pub world: Option<String>,
}

/// The collection element. `height` is the ordering key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceMarine {
    pub id: MarineId,
    pub name: String,
    pub coordinates: Coordinates,
    pub creation_date: DateTime<Utc>,
    pub health: Option<f64>,
    pub height: i64,
    pub category: Option<AstartesCategory>,
    pub melee_weapon: MeleeWeapon,
    pub chapter: Option<Chapter>,
}

impl SpaceMarine {
    /// Builds an unsaved marine; the gateway assigns the id on insertion.
    pub fn new(name: impl Into<String>, height: i64, melee_weapon: MeleeWeapon) -> Self {
        Self {
            id: UNASSIGNED_ID,
            name: name.into(),
            coordinates: Coordinates { x: 0.0, y: 0 },
            creation_date: Utc::now(),
            health: None,
            height,
            category: None,
            melee_weapon,
            chapter: None,
        }
    }

    pub fn with_id(mut self, id: MarineId) -> Self {
        self.id = id;
        self
    }

    /// Compares by ordering key only; used where the other side has no id yet.
    pub fn cmp_height(&self, other: &SpaceMarine) -> Ordering {
        self.height.cmp(&other.height)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(MarineError::validation("name cannot be empty"));
        }
        if let Some(health) = self.health {
            if !(health > 0.0) {
                return Err(MarineError::validation("health must be greater than 0"));
            }
        }
        if let Some(chapter) = &self.chapter {
            if chapter.name.trim().is_empty() {
                return Err(MarineError::validation("chapter name cannot be empty"));
            }
            if chapter.marines_count == 0 || chapter.marines_count > 1000 {
                return Err(MarineError::validation(
                    "chapter marines count must be between 1 and 1000",
                ));
            }
        }
        Ok(())
    }
}

/// A marine together with the login of the user who created it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedMarine {
    pub marine: SpaceMarine,
    pub owner: String,
}

impl OwnedMarine {
    pub fn new(marine: SpaceMarine, owner: impl Into<String>) -> Self {
        Self {
            marine,
            owner: owner.into(),
        }
    }

    pub fn id(&self) -> MarineId {
        self.marine.id
    }

    /// Position in the shared store: ascending height, ties broken by id.
    pub fn order_key(&self) -> (i64, MarineId) {
        (self.marine.height, self.marine.id)
    }

    pub fn is_owned_by(&self, login: &str) -> bool {
        self.owner == login
    }
}

impl fmt::Display for OwnedMarine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(SpaceMarine {{ id: {}, name: {}, height: {}, meleeWeapon: {} }}, {})",
            self.marine.id, self.marine.name, self.marine.height, self.marine.melee_weapon, self.owner
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_melee_weapon_total_order() {
        assert!(MeleeWeapon::ChainSword < MeleeWeapon::PowerSword);
        assert!(MeleeWeapon::Manreaper < MeleeWeapon::PowerBlade);
        let mut sorted = MeleeWeapon::ALL.to_vec();
        sorted.sort();
        assert_eq!(sorted, MeleeWeapon::ALL.to_vec());
    }

    #[test]
    fn test_melee_weapon_parse() {
        assert_eq!("CHAIN_AXE".parse::<MeleeWeapon>().unwrap(), MeleeWeapon::ChainAxe);
        assert!("chain_axe".parse::<MeleeWeapon>().is_err());
        assert!("LASGUN".parse::<MeleeWeapon>().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let mut marine = SpaceMarine::new("Titus", 180, MeleeWeapon::ChainSword);
        assert!(marine.validate().is_ok());

        marine.health = Some(0.0);
        assert!(marine.validate().is_err());

        marine.health = Some(10.0);
        marine.chapter = Some(Chapter {
            name: "Ultramarines".into(),
            parent_legion: None,
            marines_count: 1001,
            world: None,
        });
        assert!(marine.validate().is_err());

        let blank = SpaceMarine::new("  ", 1, MeleeWeapon::ChainSword);
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_order_key_breaks_ties_by_id() {
        let a = OwnedMarine::new(SpaceMarine::new("a", 5, MeleeWeapon::ChainSword).with_id(2), "u");
        let b = OwnedMarine::new(SpaceMarine::new("b", 5, MeleeWeapon::ChainSword).with_id(1), "u");
        assert!(b.order_key() < a.order_key());
    }
}
