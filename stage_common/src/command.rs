//! The operator command grammar.
//!
//! Commands arrive on the command topic as UTF-8 text, slash-delimited and
//! case-sensitive. The set is closed and small, so payloads are parsed into
//! a tagged [`Command`] value before dispatch; the dispatcher then matches
//! exhaustively and never compares strings again.
//!
//! | Command | Form |
//! |---|---|
//! | STATUS | `STATUS` |
//! | SET_RATE | `SET_RATE/<hz>` |
//! | SET_AMP | `SET_AMP/<axis>/<mV>` |
//! | SET_FREQ | `SET_FREQ/<axis>/<mHz>` |
//! | MOVE | `MOVE/<axis>/<pos>` |
//! | STOP | `STOP/<axis>` |

use thiserror::Error;

use crate::axis::AxisId;
use crate::wire::Scope;

/// A parsed operator command.
///
/// `SET_RATE` carries its argument unvalidated; the dispatcher applies the
/// [100, 15000] Hz range check so an out-of-range rate gets its own detail
/// string rather than a format error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Publish a status snapshot.
    Status,
    /// Change the sampling rate [Hz].
    SetRate(i64),
    /// Set the drive amplitude on one axis [mV].
    SetAmp(AxisId, i32),
    /// Set the drive frequency on one axis [mHz].
    SetFreq(AxisId, i32),
    /// Set a target position and enable closed-loop motion.
    Move(AxisId, i32),
    /// Disable closed-loop motion; the axis stays powered.
    Stop(AxisId),
}

impl Command {
    /// Wire subject for the result message.
    #[inline]
    pub const fn subject(self) -> &'static str {
        match self {
            Command::Status => "STATUS",
            Command::SetRate(_) => "SET_RATE",
            Command::SetAmp(..) => "SET_AMP",
            Command::SetFreq(..) => "SET_FREQ",
            Command::Move(..) => "MOVE",
            Command::Stop(_) => "STOP",
        }
    }

    /// Result scope: the named axis for axis-scoped commands, `ALL` otherwise.
    #[inline]
    pub const fn scope(self) -> Scope {
        match self {
            Command::Status | Command::SetRate(_) => Scope::All,
            Command::SetAmp(axis, _)
            | Command::SetFreq(axis, _)
            | Command::Move(axis, _)
            | Command::Stop(axis) => Scope::Axis(axis),
        }
    }

    /// Parse a raw command payload.
    pub fn parse(input: &str) -> Result<Self, CommandParseError> {
        let mut parts = input.split('/');
        let verb = parts.next().unwrap_or("");

        match verb {
            "STATUS" => match parts.next() {
                None => Ok(Command::Status),
                Some(_) => Err(CommandParseError::BadFormat("STATUS")),
            },
            "SET_RATE" => {
                let rate: i64 = parse_int("SET_RATE", &mut parts)?;
                expect_end("SET_RATE", &mut parts)?;
                Ok(Command::SetRate(rate))
            }
            "SET_AMP" => {
                let axis = parse_axis("SET_AMP", &mut parts)?;
                let millivolts: i32 = parse_int("SET_AMP", &mut parts)?;
                expect_end("SET_AMP", &mut parts)?;
                Ok(Command::SetAmp(axis, millivolts))
            }
            "SET_FREQ" => {
                let axis = parse_axis("SET_FREQ", &mut parts)?;
                let millihertz: i32 = parse_int("SET_FREQ", &mut parts)?;
                expect_end("SET_FREQ", &mut parts)?;
                Ok(Command::SetFreq(axis, millihertz))
            }
            "MOVE" => {
                let axis = parse_axis("MOVE", &mut parts)?;
                let position: i32 = parse_int("MOVE", &mut parts)?;
                expect_end("MOVE", &mut parts)?;
                Ok(Command::Move(axis, position))
            }
            "STOP" => {
                let axis = parse_axis("STOP", &mut parts)?;
                expect_end("STOP", &mut parts)?;
                Ok(Command::Stop(axis))
            }
            _ => Err(CommandParseError::UnknownCommand(input.to_string())),
        }
    }
}

/// Why a command payload was rejected.
///
/// The `Display` strings double as the result detail field, so they match
/// what operators see on the result topic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    /// The leading verb is not part of the grammar.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Wrong arity or a non-integer argument for a known verb.
    #[error("Invalid {0} command format")]
    BadFormat(&'static str),

    /// A known verb named an axis outside {X, Y, Z, R}.
    #[error("Invalid axis name")]
    UnknownAxis(&'static str),
}

impl CommandParseError {
    /// Wire subject for the failure result.
    pub fn subject(&self) -> &'static str {
        match self {
            CommandParseError::UnknownCommand(_) => "UNKNOWN",
            CommandParseError::BadFormat(verb) | CommandParseError::UnknownAxis(verb) => verb,
        }
    }
}

fn parse_axis<'a>(
    verb: &'static str,
    parts: &mut impl Iterator<Item = &'a str>,
) -> Result<AxisId, CommandParseError> {
    let token = parts.next().ok_or(CommandParseError::BadFormat(verb))?;
    token
        .parse()
        .map_err(|_| CommandParseError::UnknownAxis(verb))
}

fn parse_int<'a, T: std::str::FromStr>(
    verb: &'static str,
    parts: &mut impl Iterator<Item = &'a str>,
) -> Result<T, CommandParseError> {
    parts
        .next()
        .and_then(|token| token.parse().ok())
        .ok_or(CommandParseError::BadFormat(verb))
}

fn expect_end<'a>(
    verb: &'static str,
    parts: &mut impl Iterator<Item = &'a str>,
) -> Result<(), CommandParseError> {
    match parts.next() {
        None => Ok(()),
        Some(_) => Err(CommandParseError::BadFormat(verb)),
    }
}
