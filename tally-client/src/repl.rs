//! Line parsing for the interactive front end.

use tally_core::{Operation, Task};

/// What a line of user input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Connect { host: String, port: u16 },
    Submit(Task),
    Quit,
}

/// The usage banner, printed at startup and on unparseable input.
pub const USAGE: &str = "Usage:
  quit                  : terminates the program
  connect <host> <port> : connects to a remote server
  <x> + <y>             : adds two integers
  <x> - <y>             : subtracts two integers
";

fn parse_int(word: &str) -> Result<i64, String> {
    word.parse::<i64>()
        .map_err(|_| format!("\"{word}\" is not an integer"))
}

/// Parse one input line. `Ok(None)` for blank lines; `Err` carries a
/// message for the user.
pub fn parse_line(line: &str) -> Result<Option<ReplCommand>, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        [] => Ok(None),
        ["quit"] => Ok(Some(ReplCommand::Quit)),
        ["connect", host, port] => {
            let port: u16 = port
                .parse()
                .map_err(|_| format!("\"{port}\" is not a valid port"))?;
            Ok(Some(ReplCommand::Connect {
                host: (*host).to_string(),
                port,
            }))
        }
        [x, "+", y] => Ok(Some(ReplCommand::Submit(Task::new(
            Operation::Add,
            parse_int(x)?,
            parse_int(y)?,
        )))),
        [x, "-", y] => Ok(Some(ReplCommand::Submit(Task::new(
            Operation::Subtract,
            parse_int(x)?,
            parse_int(y)?,
        )))),
        _ => Err(format!("unknown command: \"{}\"", line.trim())),
    }
}
