//! Operator console
//!
//! Reads one command per line and drives the session through a
//! `SessionHandle`. Stands in for a UI: start, stop, mute, unmute, status
//! and quit.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::session::SessionHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    Stop,
    Mute,
    Unmute,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown command '{0}' (try 'help')")]
pub struct UnknownCommand(String);

impl FromStr for ConsoleCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" | "s" => Ok(ConsoleCommand::Start),
            "stop" | "x" => Ok(ConsoleCommand::Stop),
            "mute" | "m" => Ok(ConsoleCommand::Mute),
            "unmute" | "u" => Ok(ConsoleCommand::Unmute),
            "status" | "?" => Ok(ConsoleCommand::Status),
            "help" | "h" => Ok(ConsoleCommand::Help),
            "quit" | "exit" | "q" => Ok(ConsoleCommand::Quit),
            _ => Err(UnknownCommand(s.trim().to_string())),
        }
    }
}

impl fmt::Display for ConsoleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsoleCommand::Start => "start",
            ConsoleCommand::Stop => "stop",
            ConsoleCommand::Mute => "mute",
            ConsoleCommand::Unmute => "unmute",
            ConsoleCommand::Status => "status",
            ConsoleCommand::Help => "help",
            ConsoleCommand::Quit => "quit",
        };
        f.write_str(name)
    }
}

const HELP: &str = "Commands: start (s), stop (x), mute (m), unmute (u), status (?), help (h), quit (q)";

/// Read commands from `input` until `quit` or end of input
pub async fn run_console<R>(handle: &SessionHandle, input: R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    println!("{}", HELP);
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<ConsoleCommand>() {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        log::debug!("Console: {}", command);

        match command {
            ConsoleCommand::Start => match handle.start().await {
                Ok(()) => println!("Recording"),
                Err(e) => println!("Could not start: {}", e),
            },
            ConsoleCommand::Stop => handle.stop().await,
            ConsoleCommand::Mute => handle.mute().await,
            ConsoleCommand::Unmute => handle.unmute().await,
            ConsoleCommand::Status => print_status(handle),
            ConsoleCommand::Help => println!("{}", HELP),
            ConsoleCommand::Quit => break,
        }
    }

    log::info!("Console: input closed");
    Ok(())
}

fn print_status(handle: &SessionHandle) {
    match serde_json::to_string_pretty(&handle.status()) {
        Ok(json) => println!("{}", json),
        Err(e) => log::warn!("Console: failed to serialize status: {}", e),
    }
}
