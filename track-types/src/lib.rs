//! # track-types
//!
//! Data model for the tally-track activity tracking library.
//!
//! This crate provides the foundational types used across all tally-track crates:
//! - [`InstallId`], [`PackageId`] - Identity types
//! - [`ActivityKind`], [`ActivityPackage`] - Queued units of work
//! - [`ActivityState`] - Persisted per-install counters and flags
//! - [`Event`] - Schema for a tracked event
//! - [`Attribution`], [`AttributionUpdate`] - Install attribution data
//! - [`ValidationError`] - Error type for rejected input

#![warn(missing_docs)]
#![warn(clippy::all)]

mod attribution;
mod error;
mod event;
mod ids;
mod kind;
mod package;
mod state;

pub use attribution::{Attribution, AttributionUpdate};
pub use error::ValidationError;
pub use event::{Event, Revenue};
pub use ids::{InstallId, PackageId};
pub use kind::{ActivityKind, Environment};
pub use package::{ActivityPackage, ParamValue, Parameters};
pub use state::{ActivityState, STATE_VERSION};
