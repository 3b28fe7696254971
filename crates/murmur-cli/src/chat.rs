//! Interactive chat loop
//!
//! Reads prompt lines from stdin, streams replies to stdout as plain text,
//! and keeps the session's rendered markup for `/html` and `/copy`.

use std::io::Write;

use anyhow::{Context, Result};
use murmur_core::{ChatSession, ConnectionStatus, MessageId, SessionPhase};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;

use crate::clipboard::SystemClipboard;
use crate::commands::{Command, HELP};
use crate::page::standalone_page;

type InputLines = Lines<BufReader<Stdin>>;

pub async fn run(mut session: ChatSession) -> Result<()> {
    let models = session.refresh_models().await;
    match session.connection_status() {
        ConnectionStatus::Failure { message } => {
            println!("Server not reachable ({message}). Messages will fail until it is up.");
        }
        _ => println!(
            "Connected to {} ({} models), using {}",
            session.config().base_url(),
            models.len(),
            session.model()
        ),
    }
    println!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut clipboard = SystemClipboard::default();

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match Command::parse(&line) {
            Command::Empty => {}
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::Invalid(message) => println!("{message}"),
            Command::Message(text) => {
                let id = session.submit_message(&text)?;
                stream_reply(&mut session, id, &mut lines).await?;
            }
            Command::Cancel => println!("Nothing is being generated."),
            Command::Regenerate => match last_reply(&session) {
                Some(id) => match session.regenerate(id) {
                    Ok(()) => stream_reply(&mut session, id, &mut lines).await?,
                    Err(e) => println!("{e}"),
                },
                None => println!("No reply to regenerate yet."),
            },
            Command::Version(n) => match last_reply(&session) {
                Some(id) => match session.navigate_to_version(id, n - 1) {
                    Ok(()) => print_message(&session, id),
                    Err(e) => println!("{e}"),
                },
                None => println!("No reply yet."),
            },
            Command::Copy(n) => match last_reply(&session) {
                Some(id) => match session.copy_code(id, n - 1, &mut clipboard) {
                    Ok(()) => println!("Copied code block {n}."),
                    Err(e) => println!("{e}"),
                },
                None => println!("No reply yet."),
            },
            Command::Models => {
                let models = session.refresh_models().await;
                if models.is_empty() {
                    println!("No models listed ({:?}).", session.connection_status());
                }
                for model in models {
                    let marker = if model.id == session.model() { "*" } else { " " };
                    println!("{marker} {}", model.id);
                }
            }
            Command::Clear => {
                session.clear_session();
                println!("Cleared.");
            }
            Command::Html(path) => match last_reply(&session).and_then(|id| session.render(id)) {
                Some(output) => {
                    let page = standalone_page(&output.html, &session.config().render);
                    std::fs::write(&path, page)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Wrote {}", path.display());
                }
                None => println!("No reply yet."),
            },
        }
    }

    session.cancel_generation();
    info!("Chat loop finished");
    Ok(())
}

/// Print the reply as it streams. Ctrl-C or a `/cancel` line stops it.
async fn stream_reply(
    session: &mut ChatSession,
    id: MessageId,
    lines: &mut InputLines,
) -> Result<()> {
    let mut shown = String::new();
    loop {
        tokio::select! {
            more = session.step() => {
                show_progress(session, id, &mut shown)?;
                if !more {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                session.cancel_generation();
                break;
            }
            line = lines.next_line() => {
                match interrupt_for(line?.as_deref()) {
                    Interrupt::Cancel => {
                        session.cancel_generation();
                        break;
                    }
                    Interrupt::Ignored(notice) => println!("\n[{notice}]"),
                    Interrupt::Nothing => {}
                }
            }
        }
    }
    show_progress(session, id, &mut shown)?;
    println!();
    match session.last_outcome() {
        Some(SessionPhase::Cancelled) => println!("[cancelled]"),
        Some(SessionPhase::Errored) => println!("[failed]"),
        _ => {}
    }
    Ok(())
}

/// Effect of a line typed while a reply is streaming
#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    Cancel,
    /// Dropped, with a notice for the user
    Ignored(&'static str),
    Nothing,
}

/// `/cancel` and end of input stop the reply; anything else is not run
fn interrupt_for(line: Option<&str>) -> Interrupt {
    match line.map(Command::parse) {
        None | Some(Command::Cancel) => Interrupt::Cancel,
        Some(Command::Empty) => Interrupt::Nothing,
        Some(Command::Message(_)) => {
            Interrupt::Ignored("still replying, message not sent; /cancel first")
        }
        Some(_) => Interrupt::Ignored("still replying, only /cancel works now"),
    }
}

/// Print whatever text arrived since the last call
fn show_progress(session: &ChatSession, id: MessageId, shown: &mut String) -> Result<()> {
    let Some(message) = session.message(id) else {
        return Ok(());
    };
    let content = message.display_content();
    let mut stdout = std::io::stdout();
    if let Some(new) = content.strip_prefix(shown.as_str()) {
        if !new.is_empty() {
            write!(stdout, "{new}")?;
        }
    } else {
        // Content was replaced (error description)
        write!(stdout, "\n{content}")?;
    }
    stdout.flush()?;
    *shown = content.to_string();
    Ok(())
}

fn last_reply(session: &ChatSession) -> Option<MessageId> {
    session
        .messages()
        .iter()
        .rev()
        .find(|m| m.role() == murmur_core::ai::Role::Assistant)
        .map(|m| m.id())
}

fn print_message(session: &ChatSession, id: MessageId) {
    if let Some(message) = session.message(id) {
        println!(
            "[version {}/{}]\n{}",
            message.current_version_index() + 1,
            message.version_count(),
            message.display_content()
        );
    }
}
