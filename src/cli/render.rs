use crate::protocol::{Command, Reply};

/// Where a reply's text belongs on the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Out(String),
    Err(String),
    Silent,
}

/// Reply shape each command is answered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expected {
    Text,
    Nothing,
    MaybeOwned,
}

fn expected_for(command: &Command) -> Expected {
    match command {
        Command::Show | Command::Info | Command::AverageOfHeight | Command::CountGreaterThan(_) => {
            Expected::Text
        }
        Command::RemoveHead => Expected::MaybeOwned,
        Command::Add(_)
        | Command::Update { .. }
        | Command::RemoveById(_)
        | Command::RemoveGreater(_)
        | Command::RemoveAnyByHeight(_)
        | Command::AddIfMin(_)
        | Command::Clear => Expected::Nothing,
    }
}

/// Turns the reply to `command` into console output.
pub fn render(command: &Command, reply: &Reply) -> Output {
    if let Reply::Fault(message) = reply {
        return Output::Err(message.clone());
    }
    match (expected_for(command), reply) {
        (Expected::Text, Reply::Text(text)) => Output::Out(text.clone()),
        (Expected::Nothing, Reply::Nothing) => Output::Silent,
        (Expected::MaybeOwned, Reply::Nothing) => Output::Silent,
        (Expected::MaybeOwned, Reply::Owned(record)) => Output::Out(record.to_string()),
        (Expected::Text, _) => mismatch("String"),
        (Expected::Nothing, _) => mismatch("null"),
        (Expected::MaybeOwned, _) => mismatch("Optional<Pair<SpaceMarine, String>>"),
    }
}

fn mismatch(expected: &str) -> Output {
    Output::Err(format!("Invalid object type returned: expected \"{}\".", expected))
}

impl Output {
    pub fn print(&self) {
        match self {
            Output::Out(text) => println!("{}", text),
            Output::Err(text) => eprintln!("{}", text),
            Output::Silent => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MeleeWeapon, OwnedMarine, SpaceMarine};

    #[test]
    fn test_render() {
        assert_eq!(
            render(&Command::Info, &Reply::Text("ok".into())),
            Output::Out("ok".into())
        );
        assert_eq!(render(&Command::Clear, &Reply::Nothing), Output::Silent);
        assert_eq!(render(&Command::RemoveHead, &Reply::Nothing), Output::Silent);

        let record = OwnedMarine::new(SpaceMarine::new("a", 1, MeleeWeapon::ChainAxe).with_id(4), "bob");
        assert_eq!(
            render(&Command::RemoveHead, &Reply::Owned(record.clone())),
            Output::Out(record.to_string())
        );
    }

    #[test]
    fn test_render_mismatch_and_fault() {
        assert_eq!(
            render(&Command::Show, &Reply::Nothing),
            Output::Err("Invalid object type returned: expected \"String\".".into())
        );
        assert_eq!(
            render(&Command::Clear, &Reply::Bool(true)),
            Output::Err("Invalid object type returned: expected \"null\".".into())
        );
        assert_eq!(
            render(&Command::Clear, &Reply::Fault("denied".into())),
            Output::Err("denied".into())
        );
    }
}
