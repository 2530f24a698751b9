//! Install attribution data.

use serde::{Deserialize, Serialize};

/// Marketing source credited for the install.
///
/// Every field is optional: collectors fill in what they know.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attribution {
    /// Tracker token.
    pub tracker_token: Option<String>,
    /// Tracker name.
    pub tracker_name: Option<String>,
    /// Ad network.
    pub network: Option<String>,
    /// Campaign.
    pub campaign: Option<String>,
    /// Ad group.
    pub adgroup: Option<String>,
    /// Creative.
    pub creative: Option<String>,
    /// Click label.
    pub click_label: Option<String>,
}

impl Attribution {
    /// True if no field is set.
    pub fn is_empty(&self) -> bool {
        self.tracker_token.is_none()
            && self.tracker_name.is_none()
            && self.network.is_none()
            && self.campaign.is_none()
            && self.adgroup.is_none()
            && self.creative.is_none()
            && self.click_label.is_none()
    }
}

/// An attribution received from the collector, tagged with its sequence.
///
/// Sequences come from the collector and grow with every newer answer; a
/// client keeps only the update with the highest sequence it has seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionUpdate {
    /// Sequence indicator. Higher is newer.
    pub seq: u64,
    /// The attribution itself.
    pub attribution: Attribution,
}

impl AttributionUpdate {
    /// Create an update.
    pub fn new(seq: u64, attribution: Attribution) -> Self {
        Self { seq, attribution }
    }
}
