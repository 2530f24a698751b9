//! Record one foreground visit.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;

use super::{finish, open_tracker};

/// Run the session command.
///
/// Brings the app to the foreground and back, so the collector sees a
/// session (or subsession) followed by a session end.
pub async fn run(data_dir: &Path, use_mock: bool, wait: Duration) -> Result<()> {
    let tracker = open_tracker(data_dir, use_mock).await?;

    tracker.start().await.context("Failed to start session")?;
    tracker.on_pause().await.context("Failed to end session")?;

    let status = tracker.status().await.context("Tracker stopped")?;
    println!("Visit recorded.");
    println!("  Sessions:    {}", status.activity.session_count());
    println!("  Subsessions: {}", status.activity.subsession_count());

    finish(tracker, wait).await
}
