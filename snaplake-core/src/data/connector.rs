//! Source connector trait, fetch requests and structured error types.
//!
//! A `SourceConnector` abstracts one external market-data API so tasks can be
//! wired to real HTTP connectors or to canned responses in tests. Connectors
//! return the raw JSON body; turning it into records is `normalize`'s job.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{DataKind, Dimensions};
use crate::error::CoreError;

/// Klines intervals accepted by Binance.
pub const KLINE_INTERVALS: &[&str] = &[
    "1s", "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w",
    "1M",
];

/// Largest page Binance serves for klines.
pub const MAX_KLINES_LIMIT: u32 = 1000;

/// Largest page CoinGecko serves for `coins/markets`.
pub const MAX_MARKETS_PER_PAGE: u32 = 250;

/// Quote currency that spot-price identity depends on.
pub const REQUIRED_VS_CURRENCY: &str = "usd";

/// What to fetch from a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FetchRequest {
    SpotPrices {
        coin_ids: Vec<String>,
        vs_currencies: Vec<String>,
    },
    #[serde(rename = "tickers_24h")]
    Tickers24h { symbols: Vec<String> },
    Klines {
        symbol: String,
        interval: String,
        limit: u32,
    },
    /// One page of coins ordered by market cap.
    Markets {
        vs_currency: String,
        per_page: u32,
        #[serde(default = "first_page")]
        page: u32,
    },
}

fn first_page() -> u32 {
    1
}

impl FetchRequest {
    pub fn kind(&self) -> DataKind {
        match self {
            FetchRequest::SpotPrices { .. } => DataKind::SpotPrices,
            FetchRequest::Tickers24h { .. } => DataKind::Tickers,
            FetchRequest::Klines { .. } => DataKind::Ohlcv,
            FetchRequest::Markets { .. } => DataKind::MarketData,
        }
    }

    /// Extra partition dimensions, in key order.
    pub fn dimensions(&self) -> Dimensions {
        match self {
            FetchRequest::Klines {
                symbol, interval, ..
            } => vec![
                ("symbol".to_string(), symbol.clone()),
                ("interval".to_string(), interval.clone()),
            ],
            _ => Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            FetchRequest::SpotPrices {
                coin_ids,
                vs_currencies,
            } => {
                non_empty_list("coin_ids", coin_ids)?;
                non_empty_list("vs_currencies", vs_currencies)?;
                if !vs_currencies.iter().any(|c| c == REQUIRED_VS_CURRENCY) {
                    return Err(CoreError::invalid(format!(
                        "vs_currencies must include '{REQUIRED_VS_CURRENCY}'"
                    )));
                }
            }
            FetchRequest::Tickers24h { symbols } => non_empty_list("symbols", symbols)?,
            FetchRequest::Klines {
                symbol,
                interval,
                limit,
            } => {
                if symbol.trim().is_empty() {
                    return Err(CoreError::invalid("klines symbol must not be empty"));
                }
                if !KLINE_INTERVALS.contains(&interval.as_str()) {
                    return Err(CoreError::invalid(format!(
                        "unknown klines interval '{interval}'"
                    )));
                }
                if *limit == 0 || *limit > MAX_KLINES_LIMIT {
                    return Err(CoreError::invalid(format!(
                        "klines limit must be in 1..={MAX_KLINES_LIMIT}, got {limit}"
                    )));
                }
            }
            FetchRequest::Markets {
                vs_currency,
                per_page,
                page,
            } => {
                if vs_currency.trim().is_empty() {
                    return Err(CoreError::invalid("markets vs_currency must not be empty"));
                }
                if *per_page == 0 || *per_page > MAX_MARKETS_PER_PAGE {
                    return Err(CoreError::invalid(format!(
                        "markets per_page must be in 1..={MAX_MARKETS_PER_PAGE}, got {per_page}"
                    )));
                }
                if *page == 0 {
                    return Err(CoreError::invalid("markets page starts at 1"));
                }
            }
        }
        Ok(())
    }
}

fn non_empty_list(what: &str, items: &[String]) -> Result<(), CoreError> {
    if items.is_empty() {
        return Err(CoreError::invalid(format!("{what} must not be empty")));
    }
    if items.iter().any(|s| s.trim().is_empty()) {
        return Err(CoreError::invalid(format!("{what} contains an empty entry")));
    }
    Ok(())
}

/// Raw structured response, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub source: String,
    pub body: Value,
}

/// Structured error types for connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by source (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("hard stop: source has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("{connector} cannot serve a {kind} request")]
    Unsupported { connector: String, kind: DataKind },

    #[error("connector configuration: {0}")]
    InvalidConfig(String),

    #[error("connector error: {0}")]
    Other(String),
}

impl ConnectorError {
    /// True for failures that may clear up on a later run.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::NetworkUnreachable(_)
                | ConnectorError::RateLimited { .. }
                | ConnectorError::HttpStatus { .. }
                | ConnectorError::CircuitBreakerTripped
                | ConnectorError::Other(_)
        )
    }
}

/// Trait for market-data sources (CoinGecko, Binance, test doubles).
pub trait SourceConnector: Send + Sync {
    /// Source name; becomes the `source=` partition segment.
    fn name(&self) -> &str;

    fn fetch(&self, request: &FetchRequest) -> Result<RawResponse, ConnectorError>;

    /// Check if the source is currently available (not rate-limited, not blocked).
    fn is_available(&self) -> bool;
}

/// Connector that serves a fixed body. Used for dry runs and tests.
pub struct StaticConnector {
    name: String,
    body: Value,
}

impl StaticConnector {
    pub fn new(name: impl Into<String>, body: Value) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

impl SourceConnector for StaticConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, _request: &FetchRequest) -> Result<RawResponse, ConnectorError> {
        Ok(RawResponse {
            source: self.name.clone(),
            body: self.body.clone(),
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}
