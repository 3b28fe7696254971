//! Slash commands of the interactive chat

use std::path::PathBuf;

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text to send
    Message(String),
    Cancel,
    Regenerate,
    /// Show version `n` (1-based) of the last reply
    Version(usize),
    /// Copy code block `n` (1-based) of the last reply
    Copy(usize),
    Models,
    Clear,
    /// Write the last reply as a standalone HTML page
    Html(PathBuf),
    Help,
    Quit,
    /// Unknown command or bad argument, with a message for the user
    Invalid(String),
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Message(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match name {
            "cancel" | "stop" => Command::Cancel,
            "regen" | "regenerate" => Command::Regenerate,
            "version" | "v" => {
                parse_index(arg, "/version <n>").map_or_else(Command::Invalid, Command::Version)
            }
            "copy" => parse_index(arg, "/copy <n>").map_or_else(Command::Invalid, Command::Copy),
            "models" => Command::Models,
            "clear" => Command::Clear,
            "html" if !arg.is_empty() => Command::Html(PathBuf::from(arg)),
            "html" => Command::Invalid("usage: /html <path>".to_string()),
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => Command::Invalid(format!("unknown command /{other}, try /help")),
        }
    }
}

fn parse_index(arg: &str, usage: &str) -> Result<usize, String> {
    match arg.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(format!("usage: {usage} (n starts at 1)")),
    }
}

pub const HELP: &str = "\
Type a message and press enter to send it.
  /cancel        stop the reply being generated (or press Ctrl-C)
  /regen         generate a new version of the last reply
  /version <n>   show version n of the last reply
  /copy <n>      copy code block n of the last reply
  /models        list the server's models
  /clear         start over
  /html <path>   save the last reply as an HTML page
  /quit          leave";
