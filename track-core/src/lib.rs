//! # track-core
//!
//! Pure logic for tally-track (no I/O, instant tests).
//!
//! This crate implements the state machines and algorithms for activity
//! tracking without any network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. Time is always passed in as a millisecond timestamp
//! rather than read from the clock. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (network, disk, timers) is performed by `track-client`,
//! which interprets the actions produced by these state machines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attribution;
pub mod backoff;
pub mod builder;
pub mod lifecycle;
pub mod queue;
pub mod session;

pub use attribution::AttributionTracker;
pub use backoff::Backoff;
pub use builder::{build, validate_app_token, BuildContext, PackageRequest};
pub use lifecycle::{Action, Lifecycle, LifecycleEvent, SdkState};
pub use queue::{FailureOutcome, PackageQueue, QueueError};
pub use session::{ResumeOutcome, SessionWindow};
