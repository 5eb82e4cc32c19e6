//! External market price feeds.

mod http;
mod provider;

pub use http::{HttpTicker, HttpTickerSettings};
pub use provider::{ParsedTicker, TickerProvider};
