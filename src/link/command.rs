//! Inbound command parsing
//!
//! Grammar: `CMD:<int>,<int>`. Lines without the prefix are channel noise and
//! are ignored; a prefixed line without the comma is a format error.

use thiserror::Error;

use crate::actuator::Angle;

pub const COMMAND_PREFIX: &str = "CMD:";

/// Target angles for both actuators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub angle_a: Angle,
    pub angle_b: Angle,
}

impl Command {
    /// Text echoed back to the host once the command is applied
    pub fn confirmation(&self) -> String {
        format!("A: {}°, B: {}°\r\n", self.angle_a, self.angle_b)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid command format: {line}")]
    MissingSeparator { line: String },
}

/// Parses one line
///
/// `Ok(None)` means the line is not addressed to us. Out-of-range values are
/// clamped, never rejected.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    let Some(args) = line.strip_prefix(COMMAND_PREFIX) else {
        return Ok(None);
    };

    let Some((first, second)) = args.split_once(',') else {
        return Err(CommandError::MissingSeparator {
            line: line.to_string(),
        });
    };

    Ok(Some(Command {
        angle_a: Angle::clamped(parse_int_or_zero(first)),
        angle_b: Angle::clamped(parse_int_or_zero(second)),
    }))
}

/// Lenient integer conversion
///
/// Skips leading whitespace, takes an optional sign and then as many ASCII
/// digits as follow. Anything after the digits is ignored, no digits at all
/// gives 0, and values beyond `i64` saturate. The host is first-party, so
/// the leniency is kept on purpose.
pub fn parse_int_or_zero(text: &str) -> i64 {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let mut value: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        let digit = (b - b'0') as i64;
        value = if negative {
            value.saturating_mul(10).saturating_sub(digit)
        } else {
            value.saturating_mul(10).saturating_add(digit)
        };
    }
    value
}
