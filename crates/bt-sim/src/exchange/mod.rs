//! Simulated exchanges.
//!
//! | Exchange           | Orders            | Balances                        |
//! |--------------------|-------------------|---------------------------------|
//! | [`SpotExchange`]   | limit + marketable | cash / coin, with reservations |
//! | [`MarginExchange`] | marketable only   | cash + one signed position      |

pub mod margin;
pub mod spot;

pub use margin::MarginExchange;
pub use spot::SpotExchange;
