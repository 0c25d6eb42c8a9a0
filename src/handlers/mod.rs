pub mod ipo;
pub mod orders;
pub mod queries;
pub mod settlement;

pub use ipo::{IpoSeedingHandler, MARKET_MAKER_ID};
pub use orders::{OrderCommandHandler, PlaceOrderOutcome};
pub use queries::QueryHandler;
pub use settlement::SettlementHandler;
