use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;

/// Returns PONG. An optional message is accepted and ignored.
///
/// Ref: <https://redis.io/docs/latest/commands/ping>
#[derive(Debug, PartialEq)]
pub struct Ping;

impl Executable for Ping {
    fn exec(self) -> Frame {
        Frame::Simple("PONG".to_string())
    }
}

impl TryFrom<&mut CommandParser> for Ping {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        parse_payload(parser)?;
        Ok(Self)
    }
}

/// Returns PONG if no argument is provided, otherwise return a copy of the argument as a bulk.
#[derive(Debug, PartialEq)]
pub struct PingEcho {
    pub payload: Option<Bytes>,
}

impl Executable for PingEcho {
    fn exec(self) -> Frame {
        self.payload
            .map_or(Frame::Simple("PONG".to_string()), Frame::Bulk)
    }
}

impl TryFrom<&mut CommandParser> for PingEcho {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let payload = parse_payload(parser)?;
        Ok(Self { payload })
    }
}

fn parse_payload(parser: &mut CommandParser) -> Result<Option<Bytes>, CommandParserError> {
    let payload = if parser.is_empty() {
        None
    } else {
        Some(parser.next_bytes()?)
    };
    parser.finish()?;

    Ok(payload)
}
