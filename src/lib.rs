//! Matching and settlement engine for a simulated stock exchange.
//!
//! Orders flow through [`handlers::OrderCommandHandler`], which matches
//! them against per-instrument books held by [`registry::OrderBookRegistry`]
//! and hands resulting trades to [`handlers::SettlementHandler`] for
//! portfolio and cash updates. New listings are bootstrapped by
//! [`handlers::IpoSeedingHandler`].

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod lock;
pub mod orderbook;
pub mod persistence;
pub mod pricing;
pub mod registry;
pub mod types;
