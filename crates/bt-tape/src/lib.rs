//! # bt-tape
//!
//! Historical trade tape input for the backtester.
//!
//! - [`record`]: the 25-byte binary record layout and its codec
//! - [`reader`]: [`TapeReader`], an iterator of [`Trade`](bt_core::Trade)s
//!   over one or more tape files

pub mod reader;
pub mod record;

pub use reader::TapeReader;
pub use record::{KNOWN_BAD_TRADE_ID, RECORD_SIZE, TradeRecord};
