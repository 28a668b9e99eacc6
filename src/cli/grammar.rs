//! Console line grammar shared by the client and the server console.
//!
//! Parsing is purely local: arity and argument errors are reported as
//! validation errors carrying the usage message, before anything is sent.

use crate::core::{MarineError, MarineId, MeleeWeapon, Result, SpaceMarine};
use crate::protocol::Command;

/// A command that still needs a record typed in after the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordCommand {
    Add,
    Update(MarineId),
    AddIfMin,
    RemoveGreater,
}

impl RecordCommand {
    pub fn with(self, marine: SpaceMarine) -> Command {
        match self {
            RecordCommand::Add => Command::Add(marine),
            RecordCommand::Update(id) => Command::Update { id, marine },
            RecordCommand::AddIfMin => Command::AddIfMin(marine),
            RecordCommand::RemoveGreater => Command::RemoveGreater(marine),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleLine {
    Empty,
    Run(Command),
    WithRecord(RecordCommand),
    Save,
    Exit,
}

pub const COMMAND_NAMES: [&str; 14] = [
    "info",
    "show",
    "add",
    "update",
    "remove_by_id",
    "clear",
    "save",
    "exit",
    "remove_head",
    "add_if_min",
    "remove_greater",
    "remove_any_by_height",
    "average_of_height",
    "count_greater_than_melee_weapon",
];

fn usage(message: &str) -> MarineError {
    MarineError::validation(message)
}

fn no_args(name: &str, args: &[&str]) -> Result<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(usage(&format!("{}: this command hasn't parameters.", name)))
    }
}

fn composite_only(name: &str, args: &[&str]) -> Result<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(usage(&format!(
            "{}: this command has one composite parameter {{element}}.",
            name
        )))
    }
}

/// Positive record id.
fn parse_id(raw: &str) -> Option<MarineId> {
    raw.parse::<MarineId>().ok().filter(|id| *id > 0)
}

pub fn parse_line(line: &str) -> Result<ConsoleLine> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(ConsoleLine::Empty);
    };
    let args: Vec<&str> = words.collect();

    let parsed = match name {
        "info" => {
            no_args(name, &args)?;
            ConsoleLine::Run(Command::Info)
        }
        "show" => {
            no_args(name, &args)?;
            ConsoleLine::Run(Command::Show)
        }
        "add" => {
            composite_only(name, &args)?;
            ConsoleLine::WithRecord(RecordCommand::Add)
        }
        "update" => {
            let message = "update: this command has one easy \"ID\" and one composite {element} parameters.";
            let [raw] = args.as_slice() else {
                return Err(usage(message));
            };
            let id = parse_id(raw).ok_or_else(|| usage(message))?;
            ConsoleLine::WithRecord(RecordCommand::Update(id))
        }
        "remove_by_id" => {
            let [raw] = args.as_slice() else {
                return Err(usage("remove_by_id: this command has one easy parameter \"ID\"."));
            };
            let id = parse_id(raw)
                .ok_or_else(|| usage("remove_by_id: the command's parameter is a positive number."))?;
            ConsoleLine::Run(Command::RemoveById(id))
        }
        "clear" => {
            no_args(name, &args)?;
            ConsoleLine::Run(Command::Clear)
        }
        "save" => {
            no_args(name, &args)?;
            ConsoleLine::Save
        }
        "exit" => {
            no_args(name, &args)?;
            ConsoleLine::Exit
        }
        "remove_head" => {
            no_args(name, &args)?;
            ConsoleLine::Run(Command::RemoveHead)
        }
        "add_if_min" => {
            composite_only(name, &args)?;
            ConsoleLine::WithRecord(RecordCommand::AddIfMin)
        }
        "remove_greater" => {
            composite_only(name, &args)?;
            ConsoleLine::WithRecord(RecordCommand::RemoveGreater)
        }
        "remove_any_by_height" => match args.as_slice() {
            [] => ConsoleLine::Run(Command::RemoveAnyByHeight(0)),
            [raw] => {
                let height = raw.parse::<i64>().map_err(|_| {
                    usage("remove_any_by_height: the command's parameter is a number.")
                })?;
                ConsoleLine::Run(Command::RemoveAnyByHeight(height))
            }
            _ => {
                return Err(usage(
                    "remove_any_by_height: this command has one easy \"Height\" or hasn't parameter.",
                ));
            }
        },
        "average_of_height" => {
            no_args(name, &args)?;
            ConsoleLine::Run(Command::AverageOfHeight)
        }
        "count_greater_than_melee_weapon" => {
            let [raw] = args.as_slice() else {
                return Err(usage(
                    "count_greater_than_melee_weapon: this command has one easy parameter \"MeleeWeapon\".",
                ));
            };
            let weapon = raw.parse::<MeleeWeapon>().map_err(|_| {
                usage("count_greater_than_melee_weapon: this command has one easy parameter \"MeleeWeapon\" type of enumeration.")
            })?;
            ConsoleLine::Run(Command::CountGreaterThan(weapon))
        }
        other => {
            return Err(usage(&format!(
                "{}: unknown command. Available commands: {}.",
                other,
                COMMAND_NAMES.join(", ")
            )));
        }
    };
    Ok(parsed)
}
