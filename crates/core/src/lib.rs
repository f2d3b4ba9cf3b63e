//! Shared building blocks for the Toolbird tracker: options and live
//! configuration, the error type, and the JSON payloads sent to the
//! collection endpoint.

pub mod config;
pub mod error;
pub mod types;

pub use crate::config::{TrackerConfig, TrackerOptions};
pub use error::{TrackerError, TrackerResult};
pub use types::{EventData, EventPayload, EventValue, IdentityData, IdentityPayload, PAGEVIEW};
