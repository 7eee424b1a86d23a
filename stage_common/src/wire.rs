//! Bus wire formats.
//!
//! Two payload shapes leave the service:
//!
//! - **Position lines** — `<timestamp_ns>/<X>/<Y>/<Z>/<R>`, one line per
//!   sample, fields rendered as decimal integers or the literal `NaN` when
//!   the corresponding valid-mask bit is clear. The publisher batches lines
//!   with `\n` separators into a single message.
//! - **Result messages** —
//!   `<timestamp_ns>/<channel>/<subject>/<scope>/<outcome>/<detail>`.
//!   The detail field is free-form and may itself contain `/` and `\n`;
//!   consumers treat everything after the fifth slash as one field.

use std::fmt::{self, Write};

use crate::axis::AxisId;
use crate::sample::PositionSample;

/// Worst-case position line length: 20 digits of u64 timestamp, four
/// 11-character i32 fields, four separators.
pub const MAX_LINE_LEN: usize = 20 + 4 * (1 + 11);

/// Fixed-capacity buffer holding one formatted position line.
pub type LineBuf = heapless::String<{ MAX_LINE_LEN + 8 }>;

/// Render one sample as a position line into `out`.
///
/// Appends to whatever `out` already holds; callers batching lines write a
/// `\n` between samples themselves. The only error source is the writer
/// running out of room, which cannot happen for a [`LineBuf`].
pub fn write_position_line<W: Write>(sample: &PositionSample, out: &mut W) -> fmt::Result {
    write!(out, "{}", sample.timestamp_ns)?;
    for axis in AxisId::ALL {
        out.write_char('/')?;
        match sample.position(axis) {
            Some(position) => write!(out, "{position}")?,
            None => out.write_str("NaN")?,
        }
    }
    Ok(())
}

/// Result message channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Outcome of an operator command.
    Command,
    /// Status snapshot (the STATUS command reply).
    Status,
    /// Events outside the command grammar.
    Error,
}

impl Channel {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Channel::Command => "COMMAND",
            Channel::Status => "STATUS",
            Channel::Error => "ERROR",
        }
    }
}

/// Result message scope: a single axis, all axes, or the system itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// A single named axis.
    Axis(AxisId),
    /// All axes.
    All,
    /// The service rather than any axis.
    System,
}

impl Scope {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Scope::Axis(axis) => axis.as_str(),
            Scope::All => "ALL",
            Scope::System => "SYSTEM",
        }
    }
}

/// Command outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed,
}

impl Outcome {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "SUCCESS",
            Outcome::Failed => "FAILED",
        }
    }
}

/// One structured result, published at QoS 1 on the result topic.
///
/// Every accepted command payload produces exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultMessage {
    /// Monotonic emit time [ns since process-start epoch].
    pub timestamp_ns: u64,
    /// Message channel.
    pub channel: Channel,
    /// Command or event kind, e.g. `MOVE`, `SET_RATE`, `SYSTEM_INFO`.
    pub subject: &'static str,
    /// Axis name, `ALL`, or `SYSTEM`.
    pub scope: Scope,
    /// Success or failure.
    pub outcome: Outcome,
    /// Free-form human detail.
    pub detail: String,
}

impl ResultMessage {
    /// Encode to the slash-delimited wire form.
    pub fn encode(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}/{}",
            self.timestamp_ns,
            self.channel.as_str(),
            self.subject,
            self.scope.as_str(),
            self.outcome.as_str(),
            self.detail,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(sample: &PositionSample) -> String {
        let mut out = String::new();
        write_position_line(sample, &mut out).unwrap();
        out
    }

    #[test]
    fn all_valid_line() {
        let mut s = PositionSample::at(1_735_689_123_457_789_000);
        s.record(AxisId::X, 999_730);
        s.record(AxisId::Y, 12);
        s.record(AxisId::Z, -224_330);
        s.record(AxisId::R, -600_530);
        assert_eq!(line(&s), "1735689123457789000/999730/12/-224330/-600530");
    }

    #[test]
    fn invalid_axis_renders_nan() {
        let mut s = PositionSample::at(1_735_689_123_457_789_000);
        s.record(AxisId::X, 999_730);
        s.record(AxisId::Z, -224_330);
        s.record(AxisId::R, -600_530);
        assert_eq!(line(&s), "1735689123457789000/999730/NaN/-224330/-600530");
    }

    #[test]
    fn all_invalid_line_keeps_timestamp() {
        let s = PositionSample::at(7);
        assert_eq!(line(&s), "7/NaN/NaN/NaN/NaN");
    }

    #[test]
    fn worst_case_fits_line_buf() {
        let mut s = PositionSample::at(u64::MAX);
        for axis in AxisId::ALL {
            s.record(axis, i32::MIN);
        }
        let mut buf = LineBuf::new();
        write_position_line(&s, &mut buf).unwrap();
        assert!(buf.len() <= MAX_LINE_LEN);
    }

    #[test]
    fn result_message_encoding() {
        let msg = ResultMessage {
            timestamp_ns: 123,
            channel: Channel::Command,
            subject: "MOVE",
            scope: Scope::Axis(AxisId::X),
            outcome: Outcome::Success,
            detail: "Movement started to 1000".to_string(),
        };
        assert_eq!(msg.encode(), "123/COMMAND/MOVE/X/SUCCESS/Movement started to 1000");
    }

    #[test]
    fn detail_may_contain_slashes_and_newlines() {
        let msg = ResultMessage {
            timestamp_ns: 9,
            channel: Channel::Status,
            subject: "SYSTEM_INFO",
            scope: Scope::All,
            outcome: Outcome::Success,
            detail: "line one\nBuffer Usage: 0/4096".to_string(),
        };
        let encoded = msg.encode();
        let fields: Vec<&str> = encoded.splitn(6, '/').collect();
        assert_eq!(fields.len(), 6);
        assert_eq!(fields[5], "line one\nBuffer Usage: 0/4096");
    }
}
