//! Package kinds and deployment environments.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of work a package represents.
///
/// Each kind is delivered to its own collector endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// A new session began.
    SessionStart,
    /// The app went to the background.
    SessionEnd,
    /// A tracked in-app event.
    Event,
    /// A request for the install's attribution.
    AttributionRequest,
    /// A request to forget this install.
    GdprForgetMe,
}

impl ActivityKind {
    /// Collector endpoint path for this kind.
    pub fn path(&self) -> &'static str {
        match self {
            Self::SessionStart => "/session",
            Self::SessionEnd => "/session_end",
            Self::Event => "/event",
            Self::AttributionRequest => "/attribution",
            Self::GdprForgetMe => "/gdpr_forget_device",
        }
    }

    /// Short name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStart => "session",
            Self::SessionEnd => "session_end",
            Self::Event => "event",
            Self::AttributionRequest => "attribution",
            Self::GdprForgetMe => "gdpr",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment environment reported with every package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Test traffic, kept apart from production data by the collector.
    #[default]
    Sandbox,
    /// Live traffic.
    Production,
}

impl Environment {
    /// Wire name of the environment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
