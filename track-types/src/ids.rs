//! Identity types for tally-track.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A unique identifier for one installation of the host application.
///
/// UUID v4, generated on first activation and never changed afterwards.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstallId(uuid::Uuid);

impl InstallId {
    /// Create a new random InstallId.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse an InstallId from its hyphenated string form.
    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(Self)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl fmt::Display for InstallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for InstallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstallId({})", &self.to_string()[..8])
    }
}

/// A unique identifier for a queued package.
///
/// Used to match delivery outcomes to the package that was in flight.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(uuid::Uuid);

impl PackageId {
    /// Create a new random PackageId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the raw bytes of this PackageId.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Default for PackageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackageId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_id_is_uuid_v4() {
        let id = InstallId::random();
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn install_id_parse_roundtrip() {
        let id = InstallId::random();
        let parsed = InstallId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn install_id_parse_rejects_garbage() {
        assert!(InstallId::parse("not-a-uuid").is_none());
    }

    #[test]
    fn install_id_serializes_as_string() {
        let id = InstallId::random();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }

    #[test]
    fn package_ids_are_unique() {
        assert_ne!(PackageId::new(), PackageId::new());
        assert_eq!(PackageId::new().as_bytes().len(), 16);
    }
}
