//! Market data connectors.
//!
//! Every connector implements [`common::MarketDataSource`] so the engine can
//! run against a live exchange or against candles held in memory.

pub mod connectors;

pub use connectors::{BinanceConnector, StaticMarketData};
