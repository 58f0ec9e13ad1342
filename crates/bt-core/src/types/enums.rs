//! Enumerations used throughout the simulator.
//!
//! [`Side`] carries the one-byte tag used by the tape format, so decoding a
//! record never needs a lookup table.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Trade / order side
// ---------------------------------------------------------------------------

/// Buy or sell direction of a trade or order.
///
/// Old tape segments predate side tagging, so `Unknown` is a legitimate value
/// for trades. Orders are always `Buy` or `Sell`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    Buy = b'b',
    Sell = b's',
    Unknown = b' ',
}

impl Side {
    /// Decode a tape side tag. Anything other than `b'b'` / `b's'` is `Unknown`.
    #[inline]
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            b'b' => Self::Buy,
            b's' => Self::Sell,
            _ => Self::Unknown,
        }
    }

    /// The tape tag for this side.
    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// `+1.0` for buy, `-1.0` for sell, `0.0` for unknown.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
            Self::Unknown => 0.0,
        }
    }

    /// The other side. `Unknown` stays `Unknown`.
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
            Self::Unknown => Self::Unknown,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Position side
// ---------------------------------------------------------------------------

/// Direction of an open margin position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
    /// No position is open.
    #[default]
    Unknown,
}

impl PositionSide {
    /// The other direction. `Unknown` stays `Unknown`.
    pub fn flipped(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
            Self::Unknown => Self::Unknown,
        }
    }

    /// Order side that opens a position in this direction.
    pub fn opening_side(self) -> Side {
        match self {
            Self::Long => Side::Buy,
            Self::Short => Side::Sell,
            Self::Unknown => Side::Unknown,
        }
    }

    /// Order side that closes a position in this direction.
    pub fn closing_side(self) -> Side {
        self.opening_side().opposite()
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
            Self::Unknown => write!(f, "FLAT"),
        }
    }
}
