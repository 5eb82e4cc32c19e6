//! Handler for the `status` command.

use std::path::{Path, PathBuf};

use crate::adapter::inbound::cli::command::StatusArgs;
use crate::adapter::inbound::cli::output;
use crate::application::status::read_status;
use crate::error::Result;
use crate::infrastructure::config::{Config, StatusConfig};

/// Print the status file of a running (or last run) keeper.
pub fn execute(config_path: &Path, args: &StatusArgs) -> Result<()> {
    let path = resolve_path(config_path, args);
    match read_status(&path) {
        Ok(report) => {
            output::document(&report);
            Ok(())
        }
        Err(e) => {
            output::error(&format!("Cannot read status file {}: {e}", path.display()));
            Err(e)
        }
    }
}

/// `--file`, else `status.path` from a loadable config, else the default.
fn resolve_path(config_path: &Path, args: &StatusArgs) -> PathBuf {
    if let Some(file) = &args.file {
        return file.clone();
    }
    Config::load(config_path)
        .map(|config| config.status.path)
        .unwrap_or_else(|_| StatusConfig::default().path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_file_wins() {
        let args = StatusArgs {
            file: Some(PathBuf::from("/var/run/keeper.json")),
        };
        assert_eq!(
            resolve_path(Path::new("/nonexistent.toml"), &args),
            PathBuf::from("/var/run/keeper.json")
        );
    }

    #[test]
    fn unreadable_config_falls_back_to_default() {
        let path = resolve_path(Path::new("/nonexistent.toml"), &StatusArgs::default());
        assert_eq!(path, PathBuf::from("status.json"));
    }

    #[test]
    fn config_status_path_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[ledger]
url = "ws://localhost:8545"

[contracts]
exchange = "0x0000000000000000000000000000000000000001"
rates = "0x0000000000000000000000000000000000000002"

[status]
path = "/srv/keeper/status.json"
"#,
        )
        .unwrap();
        let path = resolve_path(&config_path, &StatusArgs::default());
        assert_eq!(path, PathBuf::from("/srv/keeper/status.json"));
    }
}
