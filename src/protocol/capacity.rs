//! Capability level negotiated during the handshake.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol capability level agreed between client and server.
///
/// The level is an ordinal: the handshake settles on the smaller of what
/// the client asks for and what the server supports. Levels this crate has
/// no name for are carried through untouched as [`Capacity::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Capacity {
    /// No compression, timestamp, timespan or UUID.
    V0,
    /// Compression, timestamp and timespan.
    V1,
    /// Adds UUID. The default.
    V3,
    /// Messages over 2GB; each vector still holds at most 2 billion items.
    V5,
    /// Messages over 2GB and vectors longer than 2 billion items.
    V6,
    /// Any other level, including the reserved 2 and 4.
    Other(u8),
}

impl Capacity {
    /// Level to request when the server's support is unknown.
    pub const DEFAULT: Capacity = Capacity::V3;

    /// Raw byte sent on the wire.
    pub fn as_u8(self) -> u8 {
        match self {
            Capacity::V0 => 0,
            Capacity::V1 => 1,
            Capacity::V3 => 3,
            Capacity::V5 => 5,
            Capacity::V6 => 6,
            Capacity::Other(b) => b,
        }
    }

    /// Whether vector counts are 64-bit at this level.
    #[inline]
    pub fn has_wide_counts(self) -> bool {
        matches!(self, Capacity::V5 | Capacity::V6)
    }

    /// The lower of two levels, by ordinal.
    pub fn min(self, other: Capacity) -> Capacity {
        Capacity::from(self.as_u8().min(other.as_u8()))
    }
}

impl Default for Capacity {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u8> for Capacity {
    fn from(b: u8) -> Self {
        match b {
            0 => Capacity::V0,
            1 => Capacity::V1,
            3 => Capacity::V3,
            5 => Capacity::V5,
            6 => Capacity::V6,
            other => Capacity::Other(other),
        }
    }
}

impl From<Capacity> for u8 {
    fn from(c: Capacity) -> Self {
        c.as_u8()
    }
}

impl PartialOrd for Capacity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Capacity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_u8().cmp(&other.as_u8())
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capacity::Other(b) => write!(f, "Capacity({})", b),
            known => write!(f, "Capacity_V{}", known.as_u8()),
        }
    }
}
