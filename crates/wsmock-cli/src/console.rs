//! Interactive console for a running server.
//!
//! One task multiplexes stdin lines, server events and Ctrl+C. Console
//! words (`list`, `use`, `close`, `db show`, `help`, `quit`) are handled
//! here; every other line is a data command for the selected connection.

use colored::Colorize;
use std::collections::BTreeSet;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use wsmock_core::{parse_command, Command, SessionId};
use wsmock_server::{LogEvent, LogKind, ServerEvent, ServerHandle};

const HELP: &str = "\
Console:
  list                  show connections
  use <id>              select a connection
  close [id]            close a connection (default: selected)
  db show               print the backing store
  help                  show this help
  quit | exit           stop the server

Data commands (sent to the selected connection):
  <Enter>               resend the unmodified data
  merge {...}           shallow-merge into the served object
  deepmerge {...}       recursive merge
  append [...]          append to the served array
  <json>                send this value instead
  db set <path> <value> write into the backing store";

#[derive(Debug, Error, PartialEq)]
pub enum ConsoleError {
    #[error("usage: use <id>")]
    MissingId,

    #[error("invalid connection ID: {0}")]
    InvalidId(String),
}

/// A line of console input.
#[derive(Debug, PartialEq)]
pub enum ConsoleInput<'a> {
    List,
    Use(SessionId),
    Close(Option<SessionId>),
    DbShow,
    Help,
    Quit,
    /// Anything else, for the command parser.
    Command(&'a str),
}

pub fn parse_input(line: &str) -> Result<ConsoleInput<'_>, ConsoleError> {
    let mut words = line.split_whitespace();
    let first = words.next();
    let second = words.next();
    let rest = words.next();

    let input = match (first, second, rest) {
        (Some("list"), None, _) => ConsoleInput::List,
        (Some("help"), None, _) => ConsoleInput::Help,
        (Some("quit" | "exit"), None, _) => ConsoleInput::Quit,
        (Some("db"), Some("show"), None) => ConsoleInput::DbShow,
        (Some("use"), None, _) => return Err(ConsoleError::MissingId),
        (Some("use"), Some(id), None) => ConsoleInput::Use(parse_id(id)?),
        (Some("close"), None, _) => ConsoleInput::Close(None),
        (Some("close"), Some(id), None) => ConsoleInput::Close(Some(parse_id(id)?)),
        _ => ConsoleInput::Command(line),
    };
    Ok(input)
}

fn parse_id(word: &str) -> Result<SessionId, ConsoleError> {
    word.parse()
        .map_err(|_| ConsoleError::InvalidId(word.to_string()))
}

/// The connection data commands are sent to.
///
/// The newest live connection is picked up whenever nothing is selected:
/// when the first connection arrives, and again when the selected one
/// closes.
#[derive(Debug, Default)]
struct Selection {
    current: Option<SessionId>,
    live: BTreeSet<SessionId>,
}

impl Selection {
    /// Follows connections opening and closing. Returns a notice when the
    /// selection changed.
    fn observe(&mut self, event: &ServerEvent) -> Option<LogEvent> {
        match event {
            ServerEvent::ConnectionNew(session) => {
                self.live.insert(session.id);
                if self.current.is_some() {
                    return None;
                }
                self.current = Some(session.id);
            }
            ServerEvent::ConnectionClose(session) => {
                self.live.remove(&session.id);
                if self.current != Some(session.id) {
                    return None;
                }
                self.current = self.live.last().copied();
            }
            _ => return None,
        }

        Some(match self.current {
            Some(id) => LogEvent::info(format!("Selected connection {}", id)),
            None => LogEvent::info("No connection selected"),
        })
    }
}

enum Flow {
    Continue,
    Quit,
}

struct Console {
    handle: ServerHandle,
    selection: Selection,
}

/// Runs the console until `quit`, end of input, Ctrl+C, or the event
/// stream closing.
pub async fn run(handle: ServerHandle, mut events: broadcast::Receiver<ServerEvent>) {
    let mut console = Console {
        handle,
        selection: Selection::default(),
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                debug!("Interrupted");
                break;
            }

            event = events.recv() => match event {
                Ok(event) => console.on_event(&event),
                Err(RecvError::Lagged(missed)) => {
                    warn!("Console fell behind, {} events dropped", missed);
                }
                Err(RecvError::Closed) => break,
            },

            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Flow::Quit = console.on_line(&line).await {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            },
        }
    }
}

impl Console {
    fn on_event(&mut self, event: &ServerEvent) {
        print_log(&LogEvent::from(event));
        if let Some(notice) = self.selection.observe(event) {
            print_log(&notice);
        }
    }

    async fn on_line(&mut self, line: &str) -> Flow {
        match parse_input(line) {
            Ok(ConsoleInput::Quit) => return Flow::Quit,
            Ok(ConsoleInput::Help) => println!("{}", HELP),
            Ok(ConsoleInput::List) => self.list().await,
            Ok(ConsoleInput::Use(id)) => self.select(id).await,
            Ok(ConsoleInput::Close(id)) => self.close(id).await,
            Ok(ConsoleInput::DbShow) => self.show_db().await,
            Ok(ConsoleInput::Command(line)) => self.command(line).await,
            Err(e) => print_log(&LogEvent::error(e.to_string())),
        }
        Flow::Continue
    }

    async fn list(&self) {
        let sessions = self.handle.get_connections().await;
        if sessions.is_empty() {
            println!("{}", "No active connections".dimmed());
            return;
        }

        println!("Connections ({}):", sessions.len());
        for session in sessions {
            let marker = if self.selection.current == Some(session.id) {
                "▶".green()
            } else {
                " ".normal()
            };
            println!(
                "{} ID: {} | Path: {} | Sent: {} | Received: {}",
                marker,
                session.id.to_string().cyan(),
                session.path,
                session.messages_sent,
                session.messages_received
            );
        }
    }

    async fn select(&mut self, id: SessionId) {
        let known = self
            .handle
            .get_connections()
            .await
            .iter()
            .any(|session| session.id == id);

        if known {
            self.selection.current = Some(id);
            print_log(&LogEvent::info(format!("Selected connection {}", id)));
        } else {
            print_log(&LogEvent::error(format!("No connection with ID {}", id)));
        }
    }

    async fn close(&self, id: Option<SessionId>) {
        match id.or(self.selection.current) {
            Some(id) => self.handle.close_connection(id).await,
            None => print_log(&LogEvent::error("No connection selected")),
        }
    }

    async fn show_db(&self) {
        match self.handle.get_db_content().await {
            Ok(content) => println!("{}", content),
            Err(e) => print_log(&LogEvent::error(e.to_string())),
        }
    }

    async fn command(&self, line: &str) {
        let command = match parse_command(line) {
            Ok(command) => command,
            Err(e) => {
                warn!("Rejected command {:?}: {}", line, e);
                print_log(&LogEvent::error(e.to_string()));
                return;
            }
        };

        let transform = match command {
            Some(Command::SetPath { path, value }) => {
                match self.handle.update_db_value(&path, value).await {
                    Ok(()) => print_log(&LogEvent::success(format!("Updated {}", path))),
                    Err(e) => print_log(&LogEvent::error(e.to_string())),
                }
                return;
            }
            Some(Command::Transform(transform)) => Some(transform),
            None => None,
        };

        match self.selection.current {
            Some(id) => self.handle.send_data(id, transform.as_ref()).await,
            None => print_log(&LogEvent::error("No connection selected")),
        }
    }
}

fn print_log(log: &LogEvent) {
    let time = log.timestamp.format("%H:%M:%S").to_string().dimmed();
    let text = match log.kind {
        LogKind::Info => log.text.normal(),
        LogKind::Success => log.text.green(),
        LogKind::Error => log.text.red(),
    };
    println!("[{}] {}", time, text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use wsmock_core::ConnectionRegistry;

    fn session(id_hint: usize) -> wsmock_core::Session {
        let mut registry = ConnectionRegistry::new();
        let mut id = 0;
        for _ in 0..id_hint {
            id = registry.add((), "/");
        }
        registry.get(id).unwrap().clone()
    }

    #[test]
    fn test_parse_console_words() {
        assert_eq!(parse_input("list"), Ok(ConsoleInput::List));
        assert_eq!(parse_input("  help "), Ok(ConsoleInput::Help));
        assert_eq!(parse_input("quit"), Ok(ConsoleInput::Quit));
        assert_eq!(parse_input("exit"), Ok(ConsoleInput::Quit));
        assert_eq!(parse_input("db show"), Ok(ConsoleInput::DbShow));
        assert_eq!(parse_input("use 3"), Ok(ConsoleInput::Use(3)));
        assert_eq!(parse_input("close"), Ok(ConsoleInput::Close(None)));
        assert_eq!(parse_input("close 2"), Ok(ConsoleInput::Close(Some(2))));
    }

    #[test]
    fn test_parse_bad_ids() {
        assert_eq!(parse_input("use"), Err(ConsoleError::MissingId));
        assert_eq!(
            parse_input("use two"),
            Err(ConsoleError::InvalidId("two".into()))
        );
        assert_eq!(
            parse_input("close -1"),
            Err(ConsoleError::InvalidId("-1".into()))
        );
    }

    #[test]
    fn test_other_lines_go_to_command_parser() {
        for line in [
            "",
            r#"merge {"id":2}"#,
            "db set settings.theme dark",
            "db show everything",
            r#"{"list": true}"#,
        ] {
            assert_eq!(parse_input(line), Ok(ConsoleInput::Command(line)));
        }
    }

    #[test]
    fn test_newest_connection_is_selected_when_idle() {
        let mut selection = Selection::default();
        let first = session(1);
        let second = session(2);

        assert!(selection
            .observe(&ServerEvent::ConnectionNew(first.clone()))
            .is_some());
        assert_eq!(selection.current, Some(first.id));

        assert!(selection
            .observe(&ServerEvent::ConnectionNew(second.clone()))
            .is_none());
        assert_eq!(selection.current, Some(first.id));
    }

    #[test]
    fn test_closing_last_selected_connection_clears_selection() {
        let mut selection = Selection::default();
        let first = session(1);
        selection.observe(&ServerEvent::ConnectionNew(first.clone()));

        let notice = selection
            .observe(&ServerEvent::ConnectionClose(first))
            .unwrap();
        assert_eq!(notice.kind, LogKind::Info);
        assert_eq!(notice.text, "No connection selected");
        assert_eq!(selection.current, None);
    }

    #[test]
    fn test_closing_selected_connection_falls_back_to_newest() {
        let mut selection = Selection::default();
        let (first, second, third) = (session(1), session(2), session(3));
        for s in [&first, &second, &third] {
            selection.observe(&ServerEvent::ConnectionNew(s.clone()));
        }
        assert_eq!(selection.current, Some(first.id));

        assert!(selection
            .observe(&ServerEvent::ConnectionClose(second.clone()))
            .is_none());
        assert_eq!(selection.current, Some(first.id));

        let notice = selection
            .observe(&ServerEvent::ConnectionClose(first))
            .unwrap();
        assert_eq!(notice.text, format!("Selected connection {}", third.id));
        assert_eq!(selection.current, Some(third.id));
    }
}
