//! Normalization: raw source JSON to flat [`Record`]s.
//!
//! Pure functions over `serde_json::Value`, one per data kind. Each emits at
//! most one record per identity per call; repeated coins or symbols in the
//! response are dropped after their first occurrence.
//!
//! Field layouts:
//! - spot_prices: `coin_id`, then per quote currency `price_{c}`,
//!   `market_cap_{c}`, `volume_24h_{c}`, `change_24h_pct_{c}`, then
//!   `last_updated_at`.
//! - tickers: Binance 24h ticker fields in snake_case, numbers parsed from
//!   strings, epoch-millisecond times as timestamps.
//! - ohlcv: `symbol`, `interval`, then the kline columns minus the unused one.
//! - market_data: `coin_id`, `symbol`, `name`, `vs_currency`, the CoinGecko
//!   market columns, then `last_updated`. Coins without `last_updated` are
//!   skipped since it is half of their identity.

use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use super::connector::{ConnectorError, FetchRequest};
use crate::domain::{Record, Scalar};

/// Normalize a response for `request`. `collected_at` stamps every record.
pub fn normalize(
    request: &FetchRequest,
    body: &Value,
    collected_at: DateTime<Utc>,
) -> Result<Vec<Record>, ConnectorError> {
    match request {
        FetchRequest::SpotPrices {
            coin_ids,
            vs_currencies,
        } => spot_prices(coin_ids, vs_currencies, body, collected_at),
        FetchRequest::Tickers24h { .. } => tickers(body, collected_at),
        FetchRequest::Klines {
            symbol, interval, ..
        } => klines(symbol, interval, body, collected_at),
        FetchRequest::Markets { vs_currency, .. } => markets(vs_currency, body, collected_at),
    }
}

fn format_changed(msg: impl Into<String>) -> ConnectorError {
    ConnectorError::ResponseFormatChanged(msg.into())
}

/// A number, or a string holding one (Binance quotes every decimal as a string).
fn number(value: Option<&Value>) -> Scalar {
    match value {
        Some(Value::Number(n)) => n.as_f64().map_or(Scalar::Null, Scalar::Float),
        Some(Value::String(s)) => s.parse::<f64>().map_or(Scalar::Null, Scalar::Float),
        _ => Scalar::Null,
    }
}

fn integer(value: Option<&Value>) -> Scalar {
    value.and_then(Value::as_i64).map_or(Scalar::Null, Scalar::Int)
}

fn millis(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(Value::as_i64)
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

fn text(value: Option<&Value>) -> Scalar {
    value.and_then(Value::as_str).map_or(Scalar::Null, Scalar::from)
}

fn rfc3339(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn seconds(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(Value::as_i64)
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
}

// ── CoinGecko simple/price ──────────────────────────────────────────

fn spot_prices(
    coin_ids: &[String],
    vs_currencies: &[String],
    body: &Value,
    collected_at: DateTime<Utc>,
) -> Result<Vec<Record>, ConnectorError> {
    let coins = body
        .as_object()
        .ok_or_else(|| format_changed("simple/price body is not an object"))?;

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(coin_ids.len());
    for coin_id in coin_ids {
        if !seen.insert(coin_id.as_str()) {
            continue;
        }
        let Some(quote) = coins.get(coin_id) else {
            warn!(coin_id = %coin_id, "coin missing from simple/price response");
            continue;
        };
        let quote = quote
            .as_object()
            .ok_or_else(|| format_changed(format!("quote for '{coin_id}' is not an object")))?;
        if !matches!(number(quote.get("usd")), Scalar::Float(_)) {
            warn!(coin_id = %coin_id, "coin has no usd price; skipping");
            continue;
        }
        records.push(spot_record(coin_id, quote, vs_currencies, collected_at));
    }
    Ok(records)
}

fn spot_record(
    coin_id: &str,
    quote: &Map<String, Value>,
    vs_currencies: &[String],
    collected_at: DateTime<Utc>,
) -> Record {
    let mut record = Record::new(collected_at).with_field("coin_id", coin_id);
    for c in vs_currencies {
        record = record
            .with_field(format!("price_{c}"), number(quote.get(c.as_str())))
            .with_field(format!("market_cap_{c}"), number(quote.get(&format!("{c}_market_cap"))))
            .with_field(format!("volume_24h_{c}"), number(quote.get(&format!("{c}_24h_vol"))))
            .with_field(
                format!("change_24h_pct_{c}"),
                number(quote.get(&format!("{c}_24h_change"))),
            );
    }
    record.with_field("last_updated_at", seconds(quote.get("last_updated_at")))
}

// ── Binance ticker/24hr ─────────────────────────────────────────────

const TICKER_DECIMALS: &[(&str, &str)] = &[
    ("priceChange", "price_change"),
    ("priceChangePercent", "price_change_pct"),
    ("weightedAvgPrice", "weighted_avg_price"),
    ("prevClosePrice", "prev_close_price"),
    ("lastPrice", "last_price"),
    ("lastQty", "last_qty"),
    ("bidPrice", "bid_price"),
    ("askPrice", "ask_price"),
    ("openPrice", "open_price"),
    ("highPrice", "high_price"),
    ("lowPrice", "low_price"),
    ("volume", "volume"),
    ("quoteVolume", "quote_volume"),
];

fn tickers(body: &Value, collected_at: DateTime<Utc>) -> Result<Vec<Record>, ConnectorError> {
    let items: Vec<&Value> = match body {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![body],
        _ => return Err(format_changed("ticker/24hr body is neither array nor object")),
    };

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(items.len());
    for item in items {
        let ticker = item
            .as_object()
            .ok_or_else(|| format_changed("ticker entry is not an object"))?;
        let symbol = ticker
            .get("symbol")
            .and_then(Value::as_str)
            .ok_or_else(|| format_changed("ticker entry has no symbol"))?;
        let close_time = millis(ticker.get("closeTime"))
            .ok_or_else(|| format_changed(format!("ticker {symbol} has no closeTime")))?;
        if !seen.insert(symbol.to_string()) {
            continue;
        }

        let mut record = Record::new(collected_at).with_field("symbol", symbol);
        for (raw, name) in TICKER_DECIMALS {
            record = record.with_field(*name, number(ticker.get(*raw)));
        }
        records.push(
            record
                .with_field("open_time", millis(ticker.get("openTime")))
                .with_field("close_time", close_time)
                .with_field("first_trade_id", integer(ticker.get("firstId")))
                .with_field("last_trade_id", integer(ticker.get("lastId")))
                .with_field("trades", integer(ticker.get("count"))),
        );
    }
    Ok(records)
}

// ── Binance klines ──────────────────────────────────────────────────

fn klines(
    symbol: &str,
    interval: &str,
    body: &Value,
    collected_at: DateTime<Utc>,
) -> Result<Vec<Record>, ConnectorError> {
    let rows = body
        .as_array()
        .ok_or_else(|| format_changed("klines body is not an array"))?;

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let cells = row
            .as_array()
            .filter(|c| c.len() >= 11)
            .ok_or_else(|| format_changed(format!("kline {i} is not an array of 11+ cells")))?;
        let open_time = millis(cells.first())
            .ok_or_else(|| format_changed(format!("kline {i} has no open time")))?;
        if !seen.insert(open_time) {
            continue;
        }

        let decimal = |idx: usize| number(cells.get(idx));
        records.push(
            Record::new(collected_at)
                .with_field("symbol", symbol)
                .with_field("interval", interval)
                .with_field("open_time", open_time)
                .with_field("open", decimal(1))
                .with_field("high", decimal(2))
                .with_field("low", decimal(3))
                .with_field("close", decimal(4))
                .with_field("volume", decimal(5))
                .with_field("close_time", millis(cells.get(6)))
                .with_field("quote_volume", decimal(7))
                .with_field("trades", integer(cells.get(8)))
                .with_field("taker_buy_base", decimal(9))
                .with_field("taker_buy_quote", decimal(10)),
        );
    }
    Ok(records)
}

// ── CoinGecko coins/markets ─────────────────────────────────────────

const MARKET_DECIMALS: &[(&str, &str)] = &[
    ("current_price", "current_price"),
    ("market_cap", "market_cap"),
    ("fully_diluted_valuation", "fully_diluted_valuation"),
    ("total_volume", "total_volume"),
    ("high_24h", "high_24h"),
    ("low_24h", "low_24h"),
    ("price_change_24h", "price_change_24h"),
    ("price_change_percentage_24h", "price_change_pct_24h"),
    ("price_change_percentage_1h_in_currency", "price_change_pct_1h"),
    ("price_change_percentage_7d_in_currency", "price_change_pct_7d"),
    ("market_cap_change_24h", "market_cap_change_24h"),
    ("market_cap_change_percentage_24h", "market_cap_change_pct_24h"),
    ("circulating_supply", "circulating_supply"),
    ("total_supply", "total_supply"),
    ("max_supply", "max_supply"),
    ("ath", "ath"),
    ("atl", "atl"),
];

fn markets(
    vs_currency: &str,
    body: &Value,
    collected_at: DateTime<Utc>,
) -> Result<Vec<Record>, ConnectorError> {
    let coins = body
        .as_array()
        .ok_or_else(|| format_changed("coins/markets body is not an array"))?;

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(coins.len());
    for coin in coins {
        let coin = coin
            .as_object()
            .ok_or_else(|| format_changed("market entry is not an object"))?;
        let coin_id = coin
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| format_changed("market entry has no id"))?;
        let Some(last_updated) = rfc3339(coin.get("last_updated")) else {
            warn!(coin_id = %coin_id, "market entry has no last_updated; skipping");
            continue;
        };
        if !seen.insert(coin_id.to_string()) {
            continue;
        }

        let mut record = Record::new(collected_at)
            .with_field("coin_id", coin_id)
            .with_field("symbol", text(coin.get("symbol")))
            .with_field("name", text(coin.get("name")))
            .with_field("vs_currency", vs_currency)
            .with_field("market_cap_rank", integer(coin.get("market_cap_rank")));
        for (raw, name) in MARKET_DECIMALS {
            record = record.with_field(*name, number(coin.get(*raw)));
        }
        records.push(record.with_field("last_updated", last_updated));
    }
    Ok(records)
}
