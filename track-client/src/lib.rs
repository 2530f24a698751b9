//! # track-client
//!
//! Async tracker for tally-track.
//!
//! This is the library host applications embed to report sessions and
//! events and to receive attribution.
//!
//! ## Features
//!
//! - **Durable queue**: every package is persisted before the call returns
//! - **Single-flight delivery**: one request at a time, retried with
//!   exponential backoff and jitter
//! - **Transport abstraction**: pluggable transport layer (HTTP, mock)
//! - **Pure state machines**: uses track-core for session and lifecycle logic
//!
//! ## Example
//!
//! ```ignore
//! use track_client::{HttpTransport, Tracker, TrackerConfig};
//! use track_types::Event;
//!
//! let config = TrackerConfig::new("abc123").with_data_dir("/var/lib/myapp/tally");
//! let transport = HttpTransport::new(&config.delivery.base_url, config.request_timeout())?;
//! let tracker = Tracker::initialize(config, transport).await?;
//!
//! tracker.start().await?;
//! tracker.track_event(Event::new("abc123").with_revenue(0.99, "EUR")).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod activity;
pub mod config;
pub mod error;
pub mod package_handler;
pub mod request;
pub mod storage;
pub mod transport;

pub use activity::{Tracker, TrackerStatus};
pub use config::{ConfigError, TrackerConfig};
pub use error::{StorageError, TrackError};
pub use package_handler::PackageHandler;
pub use request::{DeliveryOutcome, RequestHandler, ResponseData};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use track_core::SdkState;
pub use transport::{
    DeliveryRequest, DeliveryResponse, HttpTransport, MockTransport, Transport, TransportError,
};
