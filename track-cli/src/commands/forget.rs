//! Ask the collector to forget this install.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;

use super::{open_tracker, wait_for_delivery};

/// Run the forget-me command.
pub async fn run(data_dir: &Path, use_mock: bool, wait: Duration) -> Result<()> {
    let tracker = open_tracker(data_dir, use_mock).await?;

    tracker
        .gdpr_forget_me()
        .await
        .context("Failed to request forget")?;
    println!("Forget request queued. Tracking is now disabled for this install.");

    let pending = wait_for_delivery(&tracker, wait).await?;
    if pending == 0 {
        println!("  Collector notified; local data wiped.");
    } else {
        println!("  Not delivered yet; it will be sent next time.");
    }

    tracker
        .shutdown()
        .await
        .context("Failed to shut down tracker")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::config_path;
    use tempfile::tempdir;
    use track_client::SdkState;
    use track_types::Event;

    #[tokio::test]
    async fn forget_disables_tracking_for_good() {
        let dir = tempdir().unwrap();
        std::fs::write(config_path(dir.path()), "[tracker]\napp_token = \"abc123\"\n").unwrap();

        run(dir.path(), true, Duration::from_secs(5)).await.unwrap();

        let tracker = open_tracker(dir.path(), true).await.unwrap();
        tracker.track_event(Event::new("abc123")).await.unwrap();
        let status = tracker.status().await.unwrap();
        assert_eq!(status.state, SdkState::Disabled);
        assert!(status.activity.gdpr_forgotten);
        assert_eq!(status.activity.event_count(), 0);
        tracker.shutdown().await.unwrap();
    }
}
