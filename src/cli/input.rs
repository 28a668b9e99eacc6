//! Line input for the consoles and the interactive record reader.

use crate::core::{
    AstartesCategory, Chapter, Coordinates, MarineError, MeleeWeapon, Result, SpaceMarine,
};
use std::io::Write;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines, Stdin};

pub const END_OF_INPUT: &str = "Received the program end symbol.";

/// Prompted line reader over any async byte source.
pub struct Console<R> {
    lines: Lines<BufReader<R>>,
    prompts: bool,
}

impl Console<Stdin> {
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin())
    }
}

impl<R: AsyncRead + Unpin> Console<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            prompts: true,
        }
    }

    /// Reads without printing prompts (scripted input, tests).
    pub fn quiet(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            prompts: false,
        }
    }

    /// `Ok(None)` at end of input.
    pub async fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        if self.prompts {
            let mut out = std::io::stdout();
            write!(out, "{}", prompt)?;
            out.flush()?;
        }
        Ok(self.lines.next_line().await?)
    }

    /// Re-prompts until `parse` accepts the line. `Ok(None)` at end of input.
    pub async fn read_value<T, F>(&mut self, prompt: &str, mut parse: F) -> Result<Option<T>>
    where
        F: FnMut(&str) -> Result<T>,
    {
        loop {
            let Some(line) = self.read_line(prompt).await? else {
                return Ok(None);
            };
            match parse(line.trim()) {
                Ok(value) => return Ok(Some(value)),
                Err(MarineError::Validation(message)) => eprintln!("{}", message),
                Err(e) => return Err(e),
            }
        }
    }
}

// ============================================================================
// Field parsers
// ============================================================================

fn required_text(field: &str, raw: &str) -> Result<String> {
    if raw.is_empty() {
        Err(MarineError::validation(format!("{} needs to be not empty.", field)))
    } else {
        Ok(raw.to_string())
    }
}

fn optional_text(raw: &str) -> Option<String> {
    (!raw.is_empty()).then(|| raw.to_string())
}

fn number<T: FromStr>(field: &str, raw: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| MarineError::validation(format!("{} needs to be a number.", field)))
}

fn coordinate_x(raw: &str) -> Result<f64> {
    let x: f64 = number("X", raw)?;
    if x.is_finite() {
        Ok(x)
    } else {
        Err(MarineError::validation("X needs to be a finite number."))
    }
}

fn health(raw: &str) -> Result<Option<f64>> {
    if raw.is_empty() {
        return Ok(None);
    }
    let health: f64 = number("Health", raw)?;
    if health.is_finite() && health > 0.0 {
        Ok(Some(health))
    } else {
        Err(MarineError::validation("Health needs to be greater than 0."))
    }
}

fn category(raw: &str) -> Result<Option<AstartesCategory>> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.to_uppercase().parse().map(Some).map_err(|_| {
        MarineError::validation(format!(
            "Category needs to be one of: {}.",
            AstartesCategory::ALL.map(|c| c.as_str()).join(", ")
        ))
    })
}

fn melee_weapon(raw: &str) -> Result<MeleeWeapon> {
    raw.to_uppercase().parse().map_err(|_| {
        MarineError::validation(format!(
            "Melee weapon needs to be one of: {}.",
            MeleeWeapon::ALL.map(|w| w.as_str()).join(", ")
        ))
    })
}

fn marines_count(raw: &str) -> Result<u32> {
    let count: u32 = number("Marines count", raw)?;
    if (1..=1000).contains(&count) {
        Ok(count)
    } else {
        Err(MarineError::validation(
            "Marines count needs to be between 1 and 1000.",
        ))
    }
}

/// Reads a complete record field by field. `Ok(None)` at end of input.
pub async fn read_marine<R: AsyncRead + Unpin>(console: &mut Console<R>) -> Result<Option<SpaceMarine>> {
    macro_rules! field {
        ($prompt:expr, $parse:expr) => {
            match console.read_value($prompt, $parse).await? {
                Some(value) => value,
                None => return Ok(None),
            }
        };
    }

    let name = field!("Input name:$", |raw| required_text("Name", raw));
    let x = field!("Input coordinate X:$", coordinate_x);
    let y = field!("Input coordinate Y:$", |raw| number::<i64>("Y", raw));
    let health = field!("Input health (empty for none):$", health);
    let height = field!("Input height:$", |raw| number::<i64>("Height", raw));
    let category = field!("Input category (empty for none):$", category);
    let melee_weapon = field!("Input melee weapon:$", melee_weapon);

    let chapter_name = field!("Input chapter's name (empty for none):$", |raw| {
        Ok(optional_text(raw))
    });
    let chapter = match chapter_name {
        Some(name) => {
            let parent_legion = field!("Input chapter's parent legion (empty for none):$", |raw| {
                Ok(optional_text(raw))
            });
            let marines_count = field!("Input chapter's marines count:$", marines_count);
            let world = field!("Input chapter's world (empty for none):$", |raw| {
                Ok(optional_text(raw))
            });
            Some(Chapter {
                name,
                parent_legion,
                marines_count,
                world,
            })
        }
        None => None,
    };

    let mut marine = SpaceMarine::new(name, height, melee_weapon);
    marine.coordinates = Coordinates { x, y };
    marine.health = health;
    marine.category = category;
    marine.chapter = chapter;
    marine.validate()?;
    Ok(Some(marine))
}
