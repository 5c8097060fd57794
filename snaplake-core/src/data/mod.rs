//! Source connectors: the `SourceConnector` trait, the shared HTTP fetcher and
//! circuit breaker, the CoinGecko and Binance connectors, and normalization of
//! their responses into records.

pub mod binance;
pub mod circuit_breaker;
pub mod coingecko;
pub mod connector;
pub mod http;
pub mod normalize;

#[cfg(test)]
pub(crate) mod test_server;

pub use binance::BinanceConnector;
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use coingecko::CoinGeckoConnector;
pub use connector::{
    ConnectorError, FetchRequest, RawResponse, SourceConnector, StaticConnector, KLINE_INTERVALS,
    MAX_KLINES_LIMIT, MAX_MARKETS_PER_PAGE,
};
pub use http::{backoff_delay, HttpFetcher, HttpSettings, MAX_BACKOFF, MAX_RETRIES};
pub use normalize::normalize;
