//! Attribution tracking for tally-track.
//!
//! Attribution answers can arrive out of order: a slow response to an old
//! request may land after a newer one. Each answer carries a sequence
//! indicator and the tracker keeps only the highest one seen, much like a
//! cursor that never moves backwards.

use track_types::{Attribution, AttributionUpdate};

/// Keeps the newest attribution seen so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributionTracker {
    /// Sequence of the stored attribution (0 = nothing stored).
    seq: u64,
    /// The stored attribution.
    current: Option<Attribution>,
}

impl AttributionTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker resuming from a persisted update.
    pub fn with_update(update: AttributionUpdate) -> Self {
        Self {
            seq: update.seq,
            current: Some(update.attribution),
        }
    }

    /// Offer an update. Returns true if it replaced the stored attribution.
    ///
    /// Updates whose sequence is not strictly greater than the stored one
    /// are ignored, so duplicates and late arrivals never win. An update
    /// with a newer sequence but identical content still advances the
    /// sequence and returns false.
    pub fn apply(&mut self, update: AttributionUpdate) -> bool {
        if update.seq <= self.seq {
            return false;
        }
        self.seq = update.seq;
        let changed = self.current.as_ref() != Some(&update.attribution);
        self.current = Some(update.attribution);
        changed
    }

    /// Sequence of the stored attribution.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// The stored attribution.
    pub fn current(&self) -> Option<&Attribution> {
        self.current.as_ref()
    }

    /// Stored attribution with its sequence, for persistence.
    pub fn snapshot(&self) -> Option<AttributionUpdate> {
        self.current
            .clone()
            .map(|attribution| AttributionUpdate::new(self.seq, attribution))
    }

    /// Forget everything.
    pub fn reset(&mut self) {
        self.seq = 0;
        self.current = None;
    }
}
