use thiserror::Error;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Errors raised while talking to the ledger node.
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    #[error("connection to node not confirmed within {timeout_ms} ms")]
    ConnectTimeout { timeout_ms: u64 },

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("not connected to node")]
    NotConnected,

    #[error("connection closed: {0}")]
    Closed(String),

    #[error("node returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("request {method} timed out")]
    RequestTimeout { method: String },

    #[error("failed to decode node response: {0}")]
    Decode(String),
}

/// Transaction submission errors with structured variants.
#[derive(Error, Debug, Clone)]
pub enum TxError {
    #[error("failed to sign transaction: {0}")]
    Signing(String),

    #[error("node rejected transaction: {0}")]
    Dispatch(String),

    #[error("cannot encode call: {0}")]
    Encoding(String),

    #[error("{label} {outcome}")]
    Unsuccessful { label: &'static str, outcome: String },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Tx(#[from] TxError),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ABI decoding error: {0}")]
    Abi(#[from] alloy_sol_types::Error),

    #[error("shutdown did not finish within {timeout_ms} ms")]
    ShutdownTimeout { timeout_ms: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(Box::new(err))
    }
}
