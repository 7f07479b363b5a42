pub mod echo;
pub mod executable;
pub mod ping;

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::vec;
use thiserror::Error as ThisError;

use crate::commands::executable::Executable;
use crate::frame::Frame;

use echo::Echo;
use ping::{Ping, PingEcho};

/// A command implementation. Receives the request elements that follow the command name.
pub type Handler = Box<dyn Fn(Vec<Frame>) -> Frame + Send + Sync>;

/// The dispatch table: command name to handler. Names are case-insensitive and stored uppercase.
///
/// The table is built once, before the server starts, and only read afterwards, so it can be
/// shared between connections without locking.
pub struct Commands {
    handlers: HashMap<String, Handler>,
}

impl Commands {
    /// An empty table. Every request is answered with an unknown command error.
    pub fn new() -> Commands {
        Commands {
            handlers: HashMap::new(),
        }
    }

    /// The reference command set with PING replying with its argument, if any.
    pub fn with_ping_echo() -> Commands {
        Commands::default().with_command::<PingEcho>("PING")
    }

    /// Registers `handler` under `name`, replacing any previous handler for that name.
    pub fn with_handler<F>(mut self, name: &str, handler: F) -> Commands
    where
        F: Fn(Vec<Frame>) -> Frame + Send + Sync + 'static,
    {
        self.handlers.insert(name.to_uppercase(), Box::new(handler));
        self
    }

    /// Registers a command type under `name`. Argument errors found while parsing the command are
    /// turned into error replies.
    pub fn with_command<C>(self, name: &str) -> Commands
    where
        C: for<'a> TryFrom<&'a mut CommandParser, Error = CommandParserError> + Executable + 'static,
    {
        let command = name.to_lowercase();

        self.with_handler(name, move |args| {
            let parser = &mut CommandParser::new(command.as_str(), args);
            match C::try_from(parser) {
                Ok(cmd) => cmd.exec(),
                Err(err) => err.into(),
            }
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(&name.to_uppercase())
    }

    /// Runs the request through its handler. Always produces exactly one reply: problems with the
    /// request itself are reported as error frames.
    pub fn dispatch(&self, request: Frame) -> Frame {
        self.try_dispatch(request).unwrap_or_else(Frame::from)
    }

    fn try_dispatch(&self, request: Frame) -> Result<Frame, CommandParserError> {
        // Clients send commands to the Redis server as RESP arrays.
        let mut parts = match request {
            Frame::Array(parts) => parts.into_iter(),
            frame => {
                return Err(CommandParserError::InvalidRequest {
                    actual: frame.kind(),
                })
            }
        };

        let command_name = parse_command_name(&mut parts)?;
        let handler = self
            .handlers
            .get(&command_name.to_uppercase())
            .ok_or_else(|| CommandParserError::unknown_command(&command_name))?;

        Ok(handler(parts.collect()))
    }
}

impl Default for Commands {
    /// PING and ECHO.
    fn default() -> Self {
        Commands::new()
            .with_command::<Ping>("PING")
            .with_command::<Echo>("ECHO")
    }
}

impl fmt::Debug for Commands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("Commands").field("names", &names).finish()
    }
}

fn parse_command_name(parts: &mut vec::IntoIter<Frame>) -> Result<String, CommandParserError> {
    match parts.next() {
        Some(Frame::Bulk(bytes)) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Some(Frame::Simple(s)) => Ok(s),
        Some(frame) => Err(CommandParserError::InvalidFrame {
            expected: "command name",
            actual: frame.kind(),
        }),
        None => Err(CommandParserError::EmptyRequest),
    }
}

/// Walks the arguments of a single command.
pub struct CommandParser {
    command: String,
    parts: vec::IntoIter<Frame>,
}

impl CommandParser {
    pub fn new(command: impl Into<String>, args: Vec<Frame>) -> CommandParser {
        CommandParser {
            command: command.into(),
            parts: args.into_iter(),
        }
    }

    /// True once every argument has been consumed.
    pub fn is_empty(&self) -> bool {
        self.parts.len() == 0
    }

    pub fn next_bytes(&mut self) -> Result<Bytes, CommandParserError> {
        let frame = self.parts.next().ok_or_else(|| self.wrong_arity())?;

        match frame {
            // Both `Simple` and `Bulk` representation may be strings.
            Frame::Simple(s) => Ok(Bytes::from(s)),
            Frame::Bulk(bytes) => Ok(bytes),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string",
                actual: frame.kind(),
            }),
        }
    }

    /// Fails if arguments are left over.
    pub fn finish(&mut self) -> Result<(), CommandParserError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self.wrong_arity())
        }
    }

    fn wrong_arity(&self) -> CommandParserError {
        CommandParserError::WrongNumberOfArguments {
            command: self.command.clone(),
        }
    }
}

/// Problems with a request whose framing was valid. These are reported back to the client and
/// the connection stays open.
#[derive(Debug, ThisError, PartialEq)]
pub enum CommandParserError {
    #[error("ERR Protocol error: expected array, got {actual}")]
    InvalidRequest { actual: &'static str },
    #[error("ERR Protocol error: empty command")]
    EmptyRequest,
    #[error("ERR Protocol error: invalid frame, expected {expected}, got {actual}")]
    InvalidFrame {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("ERR unknown command '{command}'")]
    UnknownCommand { command: String },
    #[error("ERR wrong number of arguments for '{command}' command")]
    WrongNumberOfArguments { command: String },
}

impl CommandParserError {
    fn unknown_command(name: &str) -> CommandParserError {
        // The name is echoed back inside a simple error, which cannot carry line breaks.
        CommandParserError::UnknownCommand {
            command: name.replace(['\r', '\n'], " "),
        }
    }
}

impl From<CommandParserError> for Frame {
    fn from(err: CommandParserError) -> Frame {
        Frame::Error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(parts: &[&str]) -> Frame {
        Frame::Array(
            parts
                .iter()
                .map(|part| Frame::Bulk(Bytes::copy_from_slice(part.as_bytes())))
                .collect(),
        )
    }

    #[test]
    fn dispatch_ping() {
        let commands = Commands::default();

        let reply = commands.dispatch(request(&["PING"]));

        assert_eq!(reply, Frame::Simple("PONG".to_string()));
    }

    #[test]
    fn dispatch_is_case_insensitive() {
        let commands = Commands::default();

        assert_eq!(
            commands.dispatch(request(&["ping"])),
            Frame::Simple("PONG".to_string())
        );
        assert_eq!(
            commands.dispatch(request(&["eChO", "hey"])),
            Frame::Bulk(Bytes::from("hey"))
        );
    }

    #[test]
    fn dispatch_echo() {
        let commands = Commands::default();

        let reply = commands.dispatch(request(&["ECHO", "hello"]));

        assert_eq!(reply, Frame::Bulk(Bytes::from("hello")));
    }

    #[test]
    fn dispatch_echo_without_argument() {
        let commands = Commands::default();

        let reply = commands.dispatch(request(&["ECHO"]));

        assert_eq!(
            reply,
            Frame::Error("ERR wrong number of arguments for 'echo' command".to_string())
        );
    }

    #[test]
    fn dispatch_unknown_command() {
        let commands = Commands::default();

        let reply = commands.dispatch(request(&["FOOO", "bar"]));

        assert_eq!(
            reply,
            Frame::Error("ERR unknown command 'FOOO'".to_string())
        );
    }

    #[test]
    fn dispatch_unknown_command_strips_line_breaks() {
        let commands = Commands::default();

        let reply = commands.dispatch(request(&["FO\r\nO"]));

        assert_eq!(
            reply,
            Frame::Error("ERR unknown command 'FO  O'".to_string())
        );
    }

    #[test]
    fn dispatch_non_array_request() {
        let commands = Commands::default();

        let reply = commands.dispatch(Frame::Simple("PING".to_string()));

        assert_eq!(
            reply,
            Frame::Error("ERR Protocol error: expected array, got simple string".to_string())
        );
    }

    #[test]
    fn dispatch_empty_request() {
        let commands = Commands::default();

        let reply = commands.dispatch(Frame::Array(vec![]));

        assert_eq!(
            reply,
            Frame::Error("ERR Protocol error: empty command".to_string())
        );
    }

    #[test]
    fn dispatch_non_string_command_name() {
        let commands = Commands::default();

        let reply = commands.dispatch(Frame::Array(vec![Frame::Integer(1)]));

        assert!(matches!(reply, Frame::Error(ref msg) if msg.starts_with("ERR Protocol error")));
    }

    #[test]
    fn dispatch_simple_string_command_name() {
        let commands = Commands::default();

        let reply = commands.dispatch(Frame::Array(vec![Frame::Simple("PING".to_string())]));

        assert_eq!(reply, Frame::Simple("PONG".to_string()));
    }

    #[test]
    fn empty_table_knows_no_command() {
        let commands = Commands::new();

        let reply = commands.dispatch(request(&["PING"]));

        assert_eq!(
            reply,
            Frame::Error("ERR unknown command 'PING'".to_string())
        );
    }

    #[test]
    fn custom_handler() {
        let commands = Commands::default()
            .with_handler("count", |args| Frame::Integer(args.len() as i64));

        assert!(commands.contains("COUNT"));
        assert_eq!(
            commands.dispatch(request(&["COUNT", "a", "b", "c"])),
            Frame::Integer(3)
        );
        // Built-ins are still there.
        assert_eq!(
            commands.dispatch(request(&["PING"])),
            Frame::Simple("PONG".to_string())
        );
    }

    #[test]
    fn ping_echo_table() {
        let commands = Commands::with_ping_echo();

        assert_eq!(
            commands.dispatch(request(&["PING", "hello"])),
            Frame::Bulk(Bytes::from("hello"))
        );
        assert_eq!(
            commands.dispatch(request(&["PING"])),
            Frame::Simple("PONG".to_string())
        );
    }

    #[test]
    fn debug_lists_command_names() {
        let commands = Commands::default();

        assert_eq!(
            format!("{:?}", commands),
            r#"Commands { names: ["ECHO", "PING"] }"#
        );
    }
}
