//! Show tracker status.

use anyhow::{Context, Result};
use std::path::Path;
use track_client::{SdkState, TrackerStatus};

use super::{config_path, open_tracker};

/// Run the status command.
pub async fn run(data_dir: &Path, use_mock: bool) -> Result<()> {
    println!("=== track-cli status ===");
    println!();

    if !config_path(data_dir).exists() {
        println!("Tracker: NOT INITIALIZED");
        println!();
        println!("Run 'track-cli init --app-token <token>' to initialize.");
        return Ok(());
    }

    let tracker = open_tracker(data_dir, use_mock).await?;
    let status = tracker.status().await.context("Tracker stopped")?;
    tracker
        .shutdown()
        .await
        .context("Failed to shut down tracker")?;

    print!("{}", render(&status));
    Ok(())
}

fn state_label(state: SdkState) -> &'static str {
    match state {
        SdkState::Disabled => "DISABLED",
        SdkState::Active => "ACTIVE",
        SdkState::Backgrounded => "BACKGROUND",
        SdkState::Paused => "OFFLINE",
    }
}

/// Render a status snapshot as text.
fn render(status: &TrackerStatus) -> String {
    let activity = &status.activity;
    let mut out = String::new();

    out.push_str("Install:\n");
    out.push_str(&format!("  ID:          {}\n", activity.install_id()));
    out.push_str(&format!("  State:       {}\n", state_label(status.state)));
    if activity.gdpr_forgotten {
        out.push_str("  Forgotten:   yes\n");
    }
    out.push('\n');

    out.push_str("Counters:\n");
    out.push_str(&format!("  Sessions:    {}\n", activity.session_count()));
    out.push_str(&format!("  Subsessions: {}\n", activity.subsession_count()));
    out.push_str(&format!("  Events:      {}\n", activity.event_count()));
    out.push_str(&format!("  Time spent:  {}s\n", activity.time_spent() / 1000));
    out.push('\n');

    out.push_str(&format!("Queue: {} package(s)\n", status.queued));
    out.push('\n');

    match &status.attribution {
        Some(update) => {
            let attribution = &update.attribution;
            out.push_str(&format!("Attribution (seq {}):\n", update.seq));
            if attribution.is_empty() {
                out.push_str("  (no details)\n");
            }
            let fields = [
                ("Tracker", &attribution.tracker_name),
                ("Network", &attribution.network),
                ("Campaign", &attribution.campaign),
                ("Adgroup", &attribution.adgroup),
                ("Creative", &attribution.creative),
            ];
            for (label, value) in fields {
                if let Some(value) = value {
                    out.push_str(&format!("  {:<12} {}\n", format!("{}:", label), value));
                }
            }
        }
        None => out.push_str("Attribution: none yet\n"),
    }

    out
}
