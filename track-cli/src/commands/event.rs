//! Track one event.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use track_types::Event;

use super::{finish, open_tracker, parse_pair};

/// Event options collected from the command line.
#[derive(Debug, Clone, Default)]
pub struct EventArgs {
    /// Event token.
    pub token: String,
    /// Amount and currency.
    pub revenue: Option<(f64, String)>,
    /// Revenue deduplication id.
    pub dedup: Option<String>,
    /// Callback parameters as `key=value`.
    pub params: Vec<String>,
    /// Partner parameters as `key=value`.
    pub partner: Vec<String>,
}

impl EventArgs {
    /// Build the event these arguments describe.
    pub fn to_event(&self) -> Result<Event> {
        let mut event = Event::new(&self.token);
        if let Some((amount, currency)) = &self.revenue {
            event = event.with_revenue(*amount, currency);
        }
        if let Some(id) = &self.dedup {
            event = event.with_deduplication_id(id);
        }
        for param in &self.params {
            let (key, value) = parse_pair(param)?;
            event = event.with_callback_param(&key, &value);
        }
        for param in &self.partner {
            let (key, value) = parse_pair(param)?;
            event = event.with_partner_param(&key, &value);
        }
        Ok(event)
    }
}

/// Run the event command.
pub async fn run(data_dir: &Path, args: EventArgs, use_mock: bool, wait: Duration) -> Result<()> {
    let event = args.to_event()?;
    event.validate().context("Invalid event")?;

    let tracker = open_tracker(data_dir, use_mock).await?;

    tracker
        .track_event(event)
        .await
        .context("Failed to track event")?;

    let status = tracker.status().await.context("Tracker stopped")?;
    println!("Event '{}' tracked.", args.token);
    println!("  Event count: {}", status.activity.event_count());

    finish(tracker, wait).await
}
