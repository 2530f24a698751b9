//! Write a tracker configuration.

use anyhow::{Context, Result};
use std::path::Path;
use track_client::TrackerConfig;
use track_types::Environment;

use super::config_path;

/// Run the init command.
pub async fn run(
    data_dir: &Path,
    app_token: &str,
    environment: Environment,
    base_url: Option<&str>,
) -> Result<()> {
    let path = config_path(data_dir);
    if path.exists() {
        anyhow::bail!(
            "Tracker already initialized. Delete {} to reinitialize.",
            path.display()
        );
    }

    let mut config = TrackerConfig::new(app_token).with_environment(environment);
    if let Some(url) = base_url {
        config = config.with_base_url(url);
    }
    config.validate().context("Invalid configuration")?;

    let toml = config.to_toml()?;
    tokio::fs::write(&path, toml)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Tracker initialized successfully!");
    println!();
    println!("  App token:   {}", config.tracker.app_token);
    println!("  Environment: {}", environment.as_str());
    println!("  Collector:   {}", config.delivery.base_url);
    println!("  Data dir:    {}", data_dir.display());
    println!();
    println!("Next steps:");
    println!("  1. Record a visit: track-cli session");
    println!("  2. Track an event: track-cli event <token>");

    Ok(())
}
