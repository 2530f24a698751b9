//! Session accounting.
//!
//! Decides whether a return to the foreground starts a new session, a new
//! subsession, or simply continues the current one, and applies the result
//! to [`ActivityState`].

use std::time::Duration;
use track_types::ActivityState;

/// Thresholds separating sessions and subsessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    /// A gap longer than this starts a new session.
    pub session_interval: Duration,
    /// A gap longer than this (but within the session interval) starts a
    /// new subsession.
    pub subsession_interval: Duration,
}

impl Default for SessionWindow {
    fn default() -> Self {
        Self {
            session_interval: Duration::from_secs(30 * 60),
            subsession_interval: Duration::from_secs(1),
        }
    }
}

/// How a resume was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// No activity was ever recorded: this is the first session.
    FirstSession,
    /// The gap exceeded the session interval.
    NewSession {
        /// Gap since last activity in milliseconds.
        interval: u64,
    },
    /// The gap exceeded the subsession interval only.
    Subsession,
    /// The gap was too short to count as leaving the app.
    Continued,
    /// The clock is behind the last recorded activity.
    ClockSkew,
}

impl ResumeOutcome {
    /// True if this resume starts a session and needs a session package.
    pub fn starts_session(&self) -> bool {
        matches!(self, Self::FirstSession | Self::NewSession { .. })
    }
}

impl SessionWindow {
    /// Classify a resume at `now` without changing anything.
    pub fn classify(&self, state: &ActivityState, now: u64) -> ResumeOutcome {
        if state.session_count() == 0 || state.last_activity() == 0 {
            return ResumeOutcome::FirstSession;
        }
        if now < state.last_activity() {
            return ResumeOutcome::ClockSkew;
        }
        let interval = now - state.last_activity();
        if interval > millis(self.session_interval) {
            ResumeOutcome::NewSession { interval }
        } else if interval > millis(self.subsession_interval) {
            ResumeOutcome::Subsession
        } else {
            ResumeOutcome::Continued
        }
    }

    /// Classify a resume at `now` and apply it to the state.
    pub fn resume(&self, state: &mut ActivityState, now: u64) -> ResumeOutcome {
        let outcome = self.classify(state, now);
        match outcome {
            ResumeOutcome::FirstSession => state.begin_session(now, 0),
            ResumeOutcome::NewSession { interval } => state.begin_session(now, interval),
            ResumeOutcome::Subsession => state.begin_subsession(now),
            // The app never really left: count the gap as foreground time.
            ResumeOutcome::Continued => state.accrue_foreground(now),
            ResumeOutcome::ClockSkew => state.touch(now),
        }
        outcome
    }
}

/// Account foreground time up to a pause or a timer tick.
pub fn accrue(state: &mut ActivityState, now: u64) {
    state.accrue_foreground(now);
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
