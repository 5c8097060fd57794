//! Binance spot connector (`/ticker/24hr`, `/klines`).
//!
//! Tickers are fetched one symbol per call with a short pause between calls;
//! the responses are collected into one JSON array. A tripped breaker stops
//! the loop early and fails the whole fetch.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::circuit_breaker::CircuitBreaker;
use super::connector::{ConnectorError, FetchRequest, RawResponse, SourceConnector, MAX_KLINES_LIMIT};
use super::http::{HttpFetcher, HttpSettings};

pub const SOURCE: &str = "binance";
pub const DEFAULT_BASE_URL: &str = "https://api.binance.com/api/v3";
const API_KEY_HEADER: &str = "x-mbx-apikey";

/// Pause between per-symbol ticker calls.
pub const DEFAULT_SYMBOL_PAUSE: Duration = Duration::from_millis(100);

pub struct BinanceConnector {
    http: HttpFetcher,
    base_url: String,
    symbol_pause: Duration,
}

impl BinanceConnector {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        settings: &HttpSettings,
    ) -> Result<Self, ConnectorError> {
        let headers: Vec<(&'static str, String)> =
            api_key.into_iter().map(|k| (API_KEY_HEADER, k)).collect();
        let breaker = Arc::new(CircuitBreaker::for_source(SOURCE));
        Ok(Self {
            http: HttpFetcher::new(settings, &headers, breaker)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            symbol_pause: DEFAULT_SYMBOL_PAUSE,
        })
    }

    pub fn with_symbol_pause(mut self, pause: Duration) -> Self {
        self.symbol_pause = pause;
        self
    }

    fn tickers(&self, symbols: &[String]) -> Result<Value, ConnectorError> {
        let url = format!("{}/ticker/24hr", self.base_url);
        let mut out = Vec::with_capacity(symbols.len());
        for (i, symbol) in symbols.iter().enumerate() {
            if i > 0 && !self.symbol_pause.is_zero() {
                std::thread::sleep(self.symbol_pause);
            }
            let ticker = self
                .http
                .get_json(&url, &[("symbol", symbol.clone())])
                .map_err(|e| match e {
                    ConnectorError::HttpStatus { status: 400, .. } => {
                        ConnectorError::SymbolNotFound {
                            symbol: symbol.clone(),
                        }
                    }
                    other => other,
                })?;
            debug!(symbol = %symbol, "ticker fetched");
            out.push(ticker);
        }
        Ok(Value::Array(out))
    }

    fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Value, ConnectorError> {
        let url = format!("{}/klines", self.base_url);
        let query = [
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.min(MAX_KLINES_LIMIT).to_string()),
        ];
        self.http.get_json(&url, &query).map_err(|e| match e {
            ConnectorError::HttpStatus { status: 400, .. } => ConnectorError::SymbolNotFound {
                symbol: symbol.to_string(),
            },
            other => other,
        })
    }
}

impl SourceConnector for BinanceConnector {
    fn name(&self) -> &str {
        SOURCE
    }

    fn fetch(&self, request: &FetchRequest) -> Result<RawResponse, ConnectorError> {
        let body = match request {
            FetchRequest::Tickers24h { symbols } => self.tickers(symbols)?,
            FetchRequest::Klines {
                symbol,
                interval,
                limit,
            } => self.klines(symbol, interval, *limit)?,
            FetchRequest::SpotPrices { .. } | FetchRequest::Markets { .. } => {
                return Err(ConnectorError::Unsupported {
                    connector: SOURCE.into(),
                    kind: request.kind(),
                })
            }
        };
        Ok(RawResponse {
            source: SOURCE.into(),
            body,
        })
    }

    fn is_available(&self) -> bool {
        self.http.is_available()
    }
}
