pub mod binance;
pub mod static_source;

pub use binance::BinanceConnector;
pub use static_source::StaticMarketData;
