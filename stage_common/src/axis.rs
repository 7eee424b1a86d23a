//! Logical axis identifiers.
//!
//! The stage exposes four logical axes: three linear (X/Y/Z, positions in
//! nanometres) and one rotational (R, positions in micro-degrees). Each axis
//! owns one bit of the sample valid-mask.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Logical axis tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AxisId {
    /// Linear X [nm].
    X = 0,
    /// Linear Y [nm].
    Y = 1,
    /// Linear Z [nm].
    Z = 2,
    /// Rotational R [µ°].
    R = 3,
}

impl AxisId {
    /// All axes in valid-mask bit order.
    pub const ALL: [AxisId; 4] = [AxisId::X, AxisId::Y, AxisId::Z, AxisId::R];

    /// Valid-mask bit for this axis (bit0=X, bit1=Y, bit2=Z, bit3=R).
    #[inline]
    pub const fn mask_bit(self) -> u8 {
        1 << self as u8
    }

    /// Canonical upper-case name, as it appears on the wire.
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            AxisId::X => "X",
            AxisId::Y => "Y",
            AxisId::Z => "Z",
            AxisId::R => "R",
        }
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an axis token is not one of `X`, `Y`, `Z`, `R`.
///
/// Axis names are case-sensitive on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown axis name")]
pub struct UnknownAxis;

impl FromStr for AxisId {
    type Err = UnknownAxis;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "X" => Ok(AxisId::X),
            "Y" => Ok(AxisId::Y),
            "Z" => Ok(AxisId::Z),
            "R" => Ok(AxisId::R),
            _ => Err(UnknownAxis),
        }
    }
}
