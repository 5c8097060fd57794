//! CoinGecko connector (`/simple/price`, `/coins/markets`).

use std::sync::Arc;

use super::circuit_breaker::CircuitBreaker;
use super::connector::{
    ConnectorError, FetchRequest, RawResponse, SourceConnector, MAX_MARKETS_PER_PAGE,
};
use super::http::{HttpFetcher, HttpSettings};

pub const SOURCE: &str = "coingecko";
pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";
const API_KEY_HEADER: &str = "x-cg-pro-api-key";

pub struct CoinGeckoConnector {
    http: HttpFetcher,
    base_url: String,
}

impl CoinGeckoConnector {
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
        })
    }

    fn simple_price_query(coin_ids: &[String], vs_currencies: &[String]) -> Vec<(&'static str, String)> {
        vec![
            ("ids", coin_ids.join(",")),
            ("vs_currencies", vs_currencies.join(",")),
            ("include_market_cap", "true".into()),
            ("include_24hr_vol", "true".into()),
            ("include_24hr_change", "true".into()),
            ("include_last_updated_at", "true".into()),
        ]
    }

    fn markets_query(vs_currency: &str, per_page: u32, page: u32) -> Vec<(&'static str, String)> {
        vec![
            ("vs_currency", vs_currency.to_string()),
            ("order", "market_cap_desc".into()),
            ("per_page", per_page.min(MAX_MARKETS_PER_PAGE).to_string()),
            ("page", page.max(1).to_string()),
            ("sparkline", "false".into()),
            ("price_change_percentage", "1h,24h,7d".into()),
        ]
    }
}

impl SourceConnector for CoinGeckoConnector {
    fn name(&self) -> &str {
        SOURCE
    }

    fn fetch(&self, request: &FetchRequest) -> Result<RawResponse, ConnectorError> {
        let (url, query) = match request {
            FetchRequest::SpotPrices {
                coin_ids,
                vs_currencies,
            } => (
                format!("{}/simple/price", self.base_url),
                Self::simple_price_query(coin_ids, vs_currencies),
            ),
            FetchRequest::Markets {
                vs_currency,
                per_page,
                page,
            } => (
                format!("{}/coins/markets", self.base_url),
                Self::markets_query(vs_currency, *per_page, *page),
            ),
            _ => {
                return Err(ConnectorError::Unsupported {
                    connector: SOURCE.into(),
                    kind: request.kind(),
                })
            }
        };
        let body = self.http.get_json(&url, &query)?;
        Ok(RawResponse {
            source: SOURCE.into(),
            body,
        })
    }

    fn is_available(&self) -> bool {
        self.http.is_available()
    }
}
