//! Error types for track-client.

use thiserror::Error;
use track_types::ValidationError;

use crate::config::ConfigError;

/// Main error type returned by [`Tracker`](crate::Tracker) calls.
#[derive(Debug, Error)]
pub enum TrackError {
    /// Input rejected before anything was queued.
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// Persisting state or queue failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The queue is at capacity.
    #[error("queue full ({capacity} packages)")]
    QueueFull {
        /// Configured capacity.
        capacity: usize,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The tracker task has stopped.
    #[error("tracker stopped")]
    Closed,
}

/// Storage layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing a file failed.
    #[error("I/O error on {name}: {source}")]
    Io {
        /// Record name (e.g. "queue").
        name: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A record could not be encoded or decoded.
    #[error("serialization error on {name}: {source}")]
    Serialization {
        /// Record name.
        name: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// A record was written by a newer build.
    #[error("{name} has version {found}, this build reads up to {supported}")]
    UnsupportedVersion {
        /// Record name.
        name: String,
        /// Version found in the file.
        found: u32,
        /// Highest version this build understands.
        supported: u32,
    },

    /// Failure injected by [`MemoryStorage`](crate::storage::MemoryStorage).
    #[error("injected failure on {name}")]
    Injected {
        /// Record name.
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TrackError::QueueFull { capacity: 3 };
        assert_eq!(err.to_string(), "queue full (3 packages)");

        let err = TrackError::from(StorageError::UnsupportedVersion {
            name: "state".into(),
            found: 9,
            supported: 1,
        });
        assert_eq!(
            err.to_string(),
            "storage error: state has version 9, this build reads up to 1"
        );

        let err = TrackError::from(ValidationError::MissingEventToken);
        assert_eq!(err.to_string(), "invalid input: missing event token");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<TrackError>();
    }
}
