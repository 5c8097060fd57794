//! Data kinds and their identity fields.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the derived identity field holding `collected_at` truncated to the minute.
pub const COLLECTED_MINUTE: &str = "collected_minute";

/// What a batch contains. Also the first partition segment and the file-name stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    /// Spot prices per coin (CoinGecko `simple/price`).
    SpotPrices,
    /// Rolling 24h ticker statistics per symbol (Binance `ticker/24hr`).
    Tickers,
    /// OHLCV candlesticks (Binance `klines`).
    Ohlcv,
    /// Per-coin market overview ranked by market cap (CoinGecko `coins/markets`).
    MarketData,
}

impl DataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::SpotPrices => "spot_prices",
            DataKind::Tickers => "tickers",
            DataKind::Ohlcv => "ohlcv",
            DataKind::MarketData => "market_data",
        }
    }

    /// Record fields that decide whether two observations are the same event.
    ///
    /// Spot prices carry no event time of their own, so their identity also
    /// includes [`COLLECTED_MINUTE`]: the same price seen twice within one
    /// minute is one observation, seen in two different minutes it is two.
    pub fn identity_fields(&self) -> &'static [&'static str] {
        match self {
            DataKind::SpotPrices => &["coin_id", "price_usd", COLLECTED_MINUTE],
            DataKind::Tickers => &["symbol", "close_time", "last_price"],
            DataKind::Ohlcv => &["symbol", "open_time"],
            DataKind::MarketData => &["coin_id", "last_updated"],
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spot_prices" => Ok(DataKind::SpotPrices),
            "tickers" => Ok(DataKind::Tickers),
            "ohlcv" => Ok(DataKind::Ohlcv),
            "market_data" => Ok(DataKind::MarketData),
            other => Err(format!("unknown data kind '{other}'")),
        }
    }
}
