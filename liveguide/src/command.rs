use liveguide_core::models::ScheduleId;

/// A command read from stdin.
#[derive(Debug, PartialEq)]
pub enum Command {
    Show,
    Hide,
    Status,
    Get(ScheduleId),
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = match (words.next()?, words.next()) {
            ("show", None) => Command::Show,
            ("hide", None) => Command::Hide,
            ("status", None) => Command::Status,
            ("get", Some(id)) => Command::Get(id.into()),
            ("quit" | "exit", None) => Command::Quit,
            _ => return None,
        };
        match words.next() {
            Some(_) => None,
            None => Some(command),
        }
    }
}

// </coverage:exclude>
