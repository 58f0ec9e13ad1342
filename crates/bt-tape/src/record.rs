//! Binary trade record codec.
//!
//! A tape file is a plain concatenation of fixed-size, packed, little-endian
//! records. There is no header and no padding.
//!
//! # Record layout (25 bytes)
//!
//! | Offset | Size | Field    | Description                              |
//! |--------|------|----------|------------------------------------------|
//! | 0      | 4    | time     | i32, epoch seconds                       |
//! | 4      | 4    | trade_id | u32                                      |
//! | 8      | 8    | price    | i64, fixed point × 1e8                   |
//! | 16     | 8    | amount   | i64, fixed point × 1e8                   |
//! | 24     | 1    | side     | `b'b'` buy, `b's'` sell, other = unknown |

use bt_core::{Side, Trade, from_fixed, to_fixed};

/// Size of one encoded record in bytes.
pub const RECORD_SIZE: usize = 25;

/// Trade id of a known-corrupt record in historical QSHUSD data. Records with
/// this id are dropped before they reach the simulation clock.
pub const KNOWN_BAD_TRADE_ID: u32 = 105_316_808;

/// One raw tape record, fields exactly as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeRecord {
    pub time: i32,
    pub trade_id: u32,
    pub price: i64,
    pub amount: i64,
    pub side: u8,
}

impl TradeRecord {
    /// Decode a record from its 25-byte encoding.
    pub fn decode(buf: &[u8; RECORD_SIZE]) -> Self {
        Self {
            time: read_i32_le(buf, 0),
            trade_id: read_u32_le(buf, 4),
            price: read_i64_le(buf, 8),
            amount: read_i64_le(buf, 16),
            side: buf[24],
        }
    }

    /// Encode the record into its 25-byte form.
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.time.to_le_bytes());
        buf[4..8].copy_from_slice(&self.trade_id.to_le_bytes());
        buf[8..16].copy_from_slice(&self.price.to_le_bytes());
        buf[16..24].copy_from_slice(&self.amount.to_le_bytes());
        buf[24] = self.side;
        buf
    }

    #[inline]
    pub fn is_known_bad(&self) -> bool {
        self.trade_id == KNOWN_BAD_TRADE_ID
    }

    /// Normalize into a [`Trade`] with decimal price and amount.
    pub fn to_trade(&self) -> Trade {
        Trade::new(
            i64::from(self.time),
            self.trade_id,
            from_fixed(self.price),
            from_fixed(self.amount),
            Side::from_tag(self.side),
        )
    }

    /// Build a record from a trade. Times outside `i32` are clamped.
    pub fn from_trade(trade: &Trade) -> Self {
        Self {
            time: trade.time.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
            trade_id: trade.id,
            price: to_fixed(trade.price),
            amount: to_fixed(trade.amount),
            side: trade.side.tag(),
        }
    }
}

/// Read a little-endian i32 from a byte slice.
#[inline]
fn read_i32_le(data: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(data[offset..offset + 4].try_into().unwrap_or([0; 4]))
}

/// Read a little-endian u32 from a byte slice.
#[inline]
fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap_or([0; 4]))
}

/// Read a little-endian i64 from a byte slice.
#[inline]
fn read_i64_le(data: &[u8], offset: usize) -> i64 {
    i64::from_le_bytes(data[offset..offset + 8].try_into().unwrap_or([0; 8]))
}
