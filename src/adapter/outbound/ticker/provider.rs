//! Exchange-specific ticker endpoints and response parsing.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

/// Supported public ticker APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickerProvider {
    Kraken,
    Bitstamp,
    Coinbase,
}

/// Fields extracted from one ticker response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTicker {
    pub last_trade_price: Option<Decimal>,
    /// Exchange-reported time, if the API provides one.
    pub time: Option<DateTime<Utc>>,
}

impl TickerProvider {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Kraken => "Kraken",
            Self::Bitstamp => "Bitstamp",
            Self::Coinbase => "Coinbase",
        }
    }

    /// ETH ticker URL quoted in `symbol`.
    #[must_use]
    pub fn default_url(self, symbol: &str) -> String {
        let lower = symbol.to_ascii_lowercase();
        match self {
            Self::Kraken => format!("https://api.kraken.com/0/public/Ticker?pair=eth{lower}"),
            Self::Bitstamp => format!("https://www.bitstamp.net/api/v2/ticker/eth{lower}"),
            Self::Coinbase => format!("https://api.pro.coinbase.com/products/eth-{lower}/ticker"),
        }
    }

    /// Extract the last trade price from a response body.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the body does not have the
    /// provider's shape.
    pub fn parse(self, body: &Value) -> Result<ParsedTicker, String> {
        match self {
            Self::Kraken => parse_kraken(body),
            Self::Bitstamp => parse_bitstamp(body),
            Self::Coinbase => parse_coinbase(body),
        }
    }
}

impl fmt::Display for TickerProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn decimal_field(value: &Value, field: &str) -> Result<Option<Decimal>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Decimal::from_str(s)
            .map(Some)
            .map_err(|e| format!("{field}: {e}")),
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .map(Some)
            .map_err(|e| format!("{field}: {e}")),
        other => Err(format!("{field}: unexpected {other}")),
    }
}

// https://docs.kraken.com/rest/#operation/getTickerInformation
fn parse_kraken(body: &Value) -> Result<ParsedTicker, String> {
    if let Some(errors) = body["error"].as_array() {
        if !errors.is_empty() {
            return Err(format!("Kraken returned error: {}", Value::Array(errors.clone())));
        }
    }
    let pair = body["result"]
        .as_object()
        .and_then(|result| result.values().next())
        .ok_or_else(|| "Kraken response has no result pair".to_string())?;
    Ok(ParsedTicker {
        last_trade_price: decimal_field(&pair["c"][0], "c[0]")?,
        time: None,
    })
}

fn parse_bitstamp(body: &Value) -> Result<ParsedTicker, String> {
    let time = match &body["timestamp"] {
        Value::String(s) => s.parse::<i64>().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
    .and_then(|secs| DateTime::from_timestamp(secs, 0));
    Ok(ParsedTicker {
        last_trade_price: decimal_field(&body["last"], "last")?,
        time,
    })
}

fn parse_coinbase(body: &Value) -> Result<ParsedTicker, String> {
    let time = body["time"]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc));
    Ok(ParsedTicker {
        last_trade_price: decimal_field(&body["price"], "price")?,
        time,
    })
}
