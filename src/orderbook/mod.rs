pub mod orderbook;
pub mod snapshot;

pub use orderbook::{BookEntry, OrderBook};
pub use snapshot::{OrderBookSnapshot, PriceLevel};
