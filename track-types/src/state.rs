//! Persisted per-install activity state.

use serde::{Deserialize, Serialize};

use crate::ids::InstallId;

/// Schema version written alongside persisted state.
///
/// Bump when a change needs more than "missing fields take their default".
pub const STATE_VERSION: u32 = 1;

/// Identifiers, counters and flags for one install.
///
/// Counters only ever grow: they are private and change only through the
/// `begin_*`/`record_*`/`accrue_*` methods. The install id is fixed at
/// creation. Flags are plain fields.
///
/// All timestamps and durations are in milliseconds. A timestamp of 0 means
/// "never".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityState {
    install_id: InstallId,
    #[serde(default)]
    session_count: u64,
    #[serde(default)]
    subsession_count: u64,
    #[serde(default)]
    event_count: u64,
    #[serde(default)]
    session_length: u64,
    #[serde(default)]
    time_spent: u64,
    #[serde(default)]
    last_activity: u64,
    #[serde(default)]
    last_session_start: u64,
    #[serde(default)]
    last_interval: u64,
    /// Tracking is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Delivery is held back because the host is offline.
    #[serde(default)]
    pub offline: bool,
    /// An attribution request was scheduled and has not completed yet.
    #[serde(default)]
    pub ask_in_pending: bool,
    /// The install asked to be forgotten; tracking stays off for good.
    #[serde(default)]
    pub gdpr_forgotten: bool,
}

fn default_enabled() -> bool {
    true
}

impl ActivityState {
    /// Create state for a brand new install.
    pub fn new() -> Self {
        Self::with_install_id(InstallId::random())
    }

    /// Create fresh state for a known install id.
    pub fn with_install_id(install_id: InstallId) -> Self {
        Self {
            install_id,
            session_count: 0,
            subsession_count: 0,
            event_count: 0,
            session_length: 0,
            time_spent: 0,
            last_activity: 0,
            last_session_start: 0,
            last_interval: 0,
            enabled: true,
            offline: false,
            ask_in_pending: false,
            gdpr_forgotten: false,
        }
    }

    /// The install identifier.
    pub fn install_id(&self) -> InstallId {
        self.install_id
    }

    /// Number of sessions started.
    pub fn session_count(&self) -> u64 {
        self.session_count
    }

    /// Number of foreground entries over the install's lifetime. A new
    /// session counts as one.
    pub fn subsession_count(&self) -> u64 {
        self.subsession_count
    }

    /// Number of events tracked.
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Wall time since the current session started, as last accounted.
    pub fn session_length(&self) -> u64 {
        self.session_length
    }

    /// Foreground time in the current session.
    pub fn time_spent(&self) -> u64 {
        self.time_spent
    }

    /// Last time any activity was recorded.
    pub fn last_activity(&self) -> u64 {
        self.last_activity
    }

    /// Start time of the current session.
    pub fn last_session_start(&self) -> u64 {
        self.last_session_start
    }

    /// Gap between the previous session's last activity and this session.
    pub fn last_interval(&self) -> u64 {
        self.last_interval
    }

    /// Start a new session at `now`, remembering the gap since last activity.
    pub fn begin_session(&mut self, now: u64, interval: u64) {
        self.session_count = self.session_count.saturating_add(1);
        self.subsession_count = self.subsession_count.saturating_add(1);
        self.session_length = 0;
        self.time_spent = 0;
        self.last_interval = interval;
        self.last_session_start = now;
        self.last_activity = now;
    }

    /// Start a new subsession within the current session.
    pub fn begin_subsession(&mut self, now: u64) {
        self.subsession_count = self.subsession_count.saturating_add(1);
        self.touch(now);
    }

    /// Record one tracked event and return the new event count.
    pub fn record_event(&mut self) -> u64 {
        self.event_count = self.event_count.saturating_add(1);
        self.event_count
    }

    /// Add foreground time up to `now` and refresh the activity timestamp.
    ///
    /// Time only accrues when `now` is after the last activity.
    pub fn accrue_foreground(&mut self, now: u64) {
        if self.last_activity > 0 && now > self.last_activity {
            let delta = now - self.last_activity;
            self.time_spent = self.time_spent.saturating_add(delta);
        }
        self.touch(now);
    }

    /// Refresh the activity timestamp and session length without adding
    /// foreground time.
    pub fn touch(&mut self, now: u64) {
        if self.last_session_start > 0 && now > self.last_session_start {
            self.session_length = self.session_length.max(now - self.last_session_start);
        }
        self.last_activity = now;
    }
}

impl Default for ActivityState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_enabled_and_empty() {
        let state = ActivityState::new();
        assert!(state.enabled);
        assert!(!state.offline);
        assert_eq!(state.session_count(), 0);
        assert_eq!(state.event_count(), 0);
        assert_eq!(state.last_activity(), 0);
    }

    #[test]
    fn begin_session_resets_per_session_durations() {
        let mut state = ActivityState::new();
        state.begin_session(1_000, 0);
        state.begin_subsession(2_000);
        state.accrue_foreground(3_000);

        state.begin_session(100_000, 97_000);

        assert_eq!(state.session_count(), 2);
        assert_eq!(state.subsession_count(), 3);
        assert_eq!(state.time_spent(), 0);
        assert_eq!(state.session_length(), 0);
        assert_eq!(state.last_interval(), 97_000);
        assert_eq!(state.last_session_start(), 100_000);
    }

    #[test]
    fn record_event_counts_up() {
        let mut state = ActivityState::new();
        assert_eq!(state.record_event(), 1);
        assert_eq!(state.record_event(), 2);
        assert_eq!(state.event_count(), 2);
    }

    #[test]
    fn foreground_time_accrues_forward_only() {
        let mut state = ActivityState::new();
        state.begin_session(1_000, 0);
        state.accrue_foreground(4_000);
        assert_eq!(state.time_spent(), 3_000);
        assert_eq!(state.session_length(), 3_000);

        // Clock went backwards: no time added, length kept.
        state.accrue_foreground(2_000);
        assert_eq!(state.time_spent(), 3_000);
        assert_eq!(state.session_length(), 3_000);
        assert_eq!(state.last_activity(), 2_000);
    }

    #[test]
    fn install_id_survives_json() {
        let state = ActivityState::new();
        let json = serde_json::to_string(&state).unwrap();
        let restored: ActivityState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn older_state_without_new_fields_loads() {
        let id = InstallId::random();
        let json = format!(r#"{{"install_id":"{}","session_count":4}}"#, id);
        let state: ActivityState = serde_json::from_str(&json).unwrap();

        assert_eq!(state.install_id(), id);
        assert_eq!(state.session_count(), 4);
        assert!(state.enabled);
        assert!(!state.gdpr_forgotten);
    }

    #[test]
    fn newer_state_with_unknown_fields_loads() {
        let id = InstallId::random();
        let json = format!(
            r#"{{"install_id":"{}","event_count":2,"push_token":"x"}}"#,
            id
        );
        let state: ActivityState = serde_json::from_str(&json).unwrap();
        assert_eq!(state.event_count(), 2);
    }
}
