//! Tracker lifecycle state machine for tally-track.
//!
//! This module provides a pure, side-effect-free state machine for the
//! tracker's enabled/offline/foreground lifecycle. The state machine takes
//! events as input and produces a new lifecycle plus a list of actions to
//! execute.
//!
//! The actual I/O (persisting state, pausing delivery, running timers) is
//! performed by track-client, not by this module.

/// Externally visible tracker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkState {
    /// Tracking switched off (by the host or by a forget request).
    Disabled,
    /// Enabled, online, app in the foreground.
    Active,
    /// Enabled, online, app in the background.
    Backgrounded,
    /// Enabled but offline: events queue, nothing is delivered.
    Paused,
}

/// Lifecycle flags. Cheap to copy; transitions consume and return it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    /// Host wants tracking on.
    pub enabled: bool,
    /// Host reported no connectivity.
    pub offline: bool,
    /// App is in the foreground.
    pub foreground: bool,
    /// The install asked to be forgotten.
    pub forgotten: bool,
    /// Deliver packages while backgrounded.
    pub send_in_background: bool,
}

impl Lifecycle {
    /// Create a lifecycle for a freshly initialized tracker (background,
    /// enabled and online unless persisted state says otherwise).
    pub fn new(enabled: bool, offline: bool, forgotten: bool, send_in_background: bool) -> Self {
        Self {
            enabled: enabled && !forgotten,
            offline,
            foreground: false,
            forgotten,
            send_in_background,
        }
    }

    /// Current externally visible state.
    pub fn state(&self) -> SdkState {
        if !self.enabled || self.forgotten {
            SdkState::Disabled
        } else if self.offline {
            SdkState::Paused
        } else if self.foreground {
            SdkState::Active
        } else {
            SdkState::Backgrounded
        }
    }

    /// Tracking calls are accepted.
    pub fn accepts_tracking(&self) -> bool {
        self.enabled && !self.forgotten
    }

    /// Queued packages may be delivered.
    ///
    /// A forgotten install keeps delivering so the forget request itself
    /// reaches the collector.
    pub fn delivery_allowed(&self) -> bool {
        if self.offline {
            return false;
        }
        if self.forgotten {
            return true;
        }
        self.enabled && (self.foreground || self.send_in_background)
    }

    /// The foreground timer should be running.
    pub fn timer_running(&self) -> bool {
        self.accepts_tracking() && self.foreground
    }

    /// Process an event and return the new lifecycle plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (track-client)
    /// is responsible for executing the returned actions, in order.
    pub fn on_event(self, event: LifecycleEvent) -> (Self, Vec<Action>) {
        let before = self;
        let mut after = self;

        match event {
            LifecycleEvent::Resumed => after.foreground = true,
            LifecycleEvent::Backgrounded => after.foreground = false,
            LifecycleEvent::EnabledChanged(enabled) => {
                // Forgetting is final.
                if !after.forgotten {
                    after.enabled = enabled;
                }
            }
            LifecycleEvent::OfflineChanged(offline) => after.offline = offline,
            LifecycleEvent::ForgetRequested => {
                after.forgotten = true;
                after.enabled = false;
            }
        }

        let mut actions = Vec::new();

        match event {
            LifecycleEvent::Resumed if after.accepts_tracking() => {
                actions.push(Action::TrackResume);
            }
            LifecycleEvent::Backgrounded if before.foreground && after.accepts_tracking() => {
                actions.push(Action::TrackPause);
            }
            _ => {}
        }

        match (before.timer_running(), after.timer_running()) {
            (false, true) => actions.push(Action::StartForegroundTimer),
            (true, false) => actions.push(Action::StopForegroundTimer),
            _ => {}
        }

        match (before.delivery_allowed(), after.delivery_allowed()) {
            (true, false) => actions.push(Action::PauseDelivery),
            (false, true) => actions.push(Action::ResumeDelivery),
            _ => {}
        }

        if before.enabled != after.enabled
            || before.offline != after.offline
            || before.forgotten != after.forgotten
        {
            actions.push(Action::PersistFlags);
        }

        (after, actions)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new(true, false, false, true)
    }
}

/// Events that can occur in the tracker lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// App came to the foreground (or tracking was started).
    Resumed,
    /// App went to the background.
    Backgrounded,
    /// Host switched tracking on or off.
    EnabledChanged(bool),
    /// Host switched offline mode on or off.
    OfflineChanged(bool),
    /// Host asked to forget this install.
    ForgetRequested,
}

/// Actions to be executed by track-client.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Run session accounting for a resume (may start a session).
    TrackResume,
    /// Run session accounting for a pause and emit a session-end package.
    TrackPause,
    /// Start the periodic foreground timer.
    StartForegroundTimer,
    /// Stop the periodic foreground timer.
    StopForegroundTimer,
    /// Stop handing packages to the network.
    PauseDelivery,
    /// Start handing packages to the network again.
    ResumeDelivery,
    /// Persist the enabled/offline/forgotten flags.
    PersistFlags,
}
