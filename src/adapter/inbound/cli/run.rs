//! Handler for the `run` command.

use std::path::Path;

use tracing::info;

use crate::adapter::inbound::cli::output;
use crate::error::Result;
use crate::infrastructure::config::Config;
use crate::infrastructure::orchestration;

/// Load the config, start logging and run until signalled.
pub async fn execute(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    config.init_logging();

    if !output::is_quiet() && !output::is_json() {
        output::header(env!("CARGO_PKG_VERSION"));
        output::field("Config", config_path.display());
        output::field("Node", &config.ledger.url);
        output::field("Status file", config.status.path.display());
    }

    info!(config = %config_path.display(), "Configuration loaded");
    orchestration::run(config).await
}
