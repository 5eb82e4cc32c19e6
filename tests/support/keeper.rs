use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use augmint_keeper::infrastructure::config::{Config, SigningKeys};
use augmint_keeper::infrastructure::orchestration::Keeper;
use augmint_keeper::port::TickerFeed;
use augmint_keeper::testkit::config::TEST_KEY;
use augmint_keeper::testkit::contracts::MarketFixture;
use augmint_keeper::testkit::ledger::{mine_transactions, ScriptedNode};
use augmint_keeper::testkit::ticker::StaticTicker;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Token base units per ETH returned by `convertFromWei`.
pub const CONVERSION_RATE: u64 = 4_000_000;

/// Stored oracle rate of 187.30 with the default 2 decimals.
pub const STORED_RATE: u64 = 18_730;

/// Config for a keeper running against a scripted node: fast reconnects,
/// one confirmation, no rate timer, status written into `dir`.
pub fn config(dir: &Path) -> Config {
    let status_path = dir.join("status.json");
    let toml = format!(
        r#"
exit_timeout_ms = 5000

[ledger]
url = "ws://scripted"
connection_check_interval_ms = 0
reconnect_delay_ms = 50

[transactions]
success_confirmations = 1
poll_interval_ms = 10
timeout_secs = 30

[contracts]
exchange = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee"
rates = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"

[rates]
check_interval_ms = 0

[status]
path = {:?}
interval_secs = 1
"#,
        status_path.display().to_string()
    );
    let mut config = Config::parse_toml(&toml).expect("test config parses");
    config.keys = SigningKeys {
        matchmaker: Some(TEST_KEY.to_string()),
        ratesfeeder: Some(TEST_KEY.to_string()),
    };
    config
}

pub struct Running {
    pub node: Arc<ScriptedNode>,
    pub market: Arc<MarketFixture>,
    pub ticker: Arc<StaticTicker>,
    pub keeper: Keeper,
    pub shutdown: watch::Sender<bool>,
    pub tasks: Vec<JoinHandle<()>>,
}

impl Running {
    /// Flip the shutdown channel and wait for every task.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        tokio::time::timeout(Duration::from_secs(5), self.keeper.shutdown(self.tasks))
            .await
            .expect("keeper stops in time");
    }
}

/// Wire a keeper over a scripted node and spawn its tasks. Nothing is
/// connected yet.
pub fn start(config: &Config, price: Option<Decimal>) -> Running {
    let node = ScriptedNode::new();
    let market = MarketFixture::new();
    market.set_conversion_rate(CONVERSION_RATE);
    market.set_stored_rate(STORED_RATE, 1_500_000_000);
    market.install(node.rpc());
    mine_transactions(node.rpc(), true);

    let ticker = StaticTicker::new("scripted");
    ticker.set_price(price);
    let feeds = vec![Arc::clone(&ticker) as Arc<dyn TickerFeed>];

    let keeper = Keeper::with_transport(config, node.clone(), feeds).expect("keeper wires");
    let (shutdown, shutdown_rx) = watch::channel(false);
    let tasks = keeper.spawn(&shutdown_rx);

    Running {
        node,
        market,
        ticker,
        keeper,
        shutdown,
        tasks,
    }
}

/// Poll `condition` until it holds, panicking after five seconds.
pub async fn wait_until<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

/// Await `future`, panicking after five seconds.
pub async fn within<F: Future>(what: &str, future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}
