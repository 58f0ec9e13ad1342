//! Core data types: enums, tape trades, orders and positions.

pub mod enums;
pub mod market_data;
pub mod trading;

pub use enums::*;
pub use market_data::*;
pub use trading::*;
