//! CLI command implementations.

pub mod event;
pub mod forget;
pub mod init;
pub mod session;
pub mod status;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use track_client::{HttpTransport, MockTransport, Tracker, TrackerConfig};

pub use event::EventArgs;

/// Configuration file written by `init`.
pub const CONFIG_FILE: &str = "config.toml";

/// Path of the configuration file in `data_dir`.
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}

/// Load the configuration written by `init`, pointed at `data_dir`.
pub fn load_config(data_dir: &Path) -> Result<TrackerConfig> {
    let path = config_path(data_dir);
    if !path.exists() {
        anyhow::bail!("Tracker not initialized. Run 'track-cli init --app-token <token>' first.");
    }
    let config = TrackerConfig::from_file(&path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    Ok(config.with_data_dir(data_dir))
}

/// Start a tracker on the data directory.
pub async fn open_tracker(data_dir: &Path, use_mock: bool) -> Result<Tracker> {
    let config = load_config(data_dir)?;

    let tracker = if use_mock {
        Tracker::initialize(config, MockTransport::new()).await
    } else {
        let transport = HttpTransport::new(&config.delivery.base_url, config.request_timeout())
            .context("Failed to create HTTP transport")?;
        Tracker::initialize(config, transport).await
    };

    tracker.context("Failed to start tracker")
}

/// Wait until nothing is queued or `wait` runs out.
///
/// Returns the number of packages still queued. Those stay on disk and go
/// out on the next run.
pub async fn wait_for_delivery(tracker: &Tracker, wait: Duration) -> Result<usize> {
    let deadline = Instant::now() + wait;
    loop {
        let status = tracker.status().await.context("Tracker stopped")?;
        if status.queued == 0 && !status.in_flight {
            return Ok(0);
        }
        if Instant::now() >= deadline {
            return Ok(status.queued);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Wait for delivery, report what is left and shut the tracker down.
pub async fn finish(tracker: Tracker, wait: Duration) -> Result<()> {
    let pending = wait_for_delivery(&tracker, wait).await?;
    if pending > 0 {
        println!("  {} package(s) still queued; they will be sent next time.", pending);
    }
    tracker.shutdown().await.context("Failed to shut down tracker")
}

/// Split a `key=value` argument.
pub fn parse_pair(arg: &str) -> Result<(String, String)> {
    let (key, value) = arg
        .split_once('=')
        .with_context(|| format!("Expected KEY=VALUE, got '{}'", arg))?;
    if key.is_empty() {
        anyhow::bail!("Empty key in '{}'", arg);
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_pair_splits_on_first_equals() {
        assert_eq!(
            parse_pair("sku=gold=1").unwrap(),
            ("sku".to_string(), "gold=1".to_string())
        );
        assert_eq!(
            parse_pair("empty=").unwrap(),
            ("empty".to_string(), String::new())
        );
    }

    #[test]
    fn parse_pair_rejects_bad_input() {
        assert!(parse_pair("novalue").is_err());
        assert!(parse_pair("=value").is_err());
    }

    #[test]
    fn load_config_without_init_fails() {
        let dir = tempdir().unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not initialized"));
    }

    #[tokio::test]
    async fn open_tracker_uses_data_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(config_path(dir.path()), "[tracker]\napp_token = \"abc123\"\n").unwrap();

        let tracker = open_tracker(dir.path(), true).await.unwrap();
        tracker.shutdown().await.unwrap();

        assert!(dir.path().join("state.json").exists());
    }
}
